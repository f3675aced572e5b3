//! Budget calculator
//!
//! Pure arithmetic over won amounts: percentage splits of a total, the
//! remainder after allocations, and a single percentage of an amount.

use super::{wrong_request, Tool, ToolInput, ToolKind, ToolOutput, ToolRequest};
use crate::error::OrchestrationError;
use crate::models::{format_won, BudgetSplit, MAX_AMOUNT_WON};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CalcRequest {
    /// Allocate percentages of `total` to categories.
    Split { total: i64, splits: Vec<BudgetSplit> },
    /// What is left of `total` after the given allocations.
    Remainder { total: i64, allocations: Vec<Allocation> },
    /// `percentage` of `amount`.
    Percentage { amount: i64, percentage: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub category: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalcResult {
    pub total: i64,
    pub allocations: Vec<Allocation>,
    /// Unallocated part of the total; negative when over-allocated.
    pub remainder: i64,
    /// Result of a percentage operation
    pub value: Option<i64>,
}

impl CalcRequest {
    pub fn validate(&self) -> Result<()> {
        match self {
            CalcRequest::Split { total, splits } => {
                check_total(*total)?;
                if splits.is_empty() {
                    return Err(calc_error("split needs at least one category"));
                }
                let mut seen = HashSet::new();
                let mut sum = 0.0;
                for split in splits {
                    check_percentage(split.percentage)?;
                    if !seen.insert(split.category.as_str()) {
                        return Err(calc_error(&format!(
                            "category '{}' appears twice in the split",
                            split.category
                        )));
                    }
                    sum += split.percentage;
                }
                if sum > 100.0 + f64::EPSILON {
                    let parts: Vec<String> = splits
                        .iter()
                        .map(|s| format!("{} {}%", s.category, s.percentage))
                        .collect();
                    return Err(calc_error(&format!("{} add up to {}%", parts.join(" + "), sum)));
                }
                Ok(())
            }
            CalcRequest::Remainder { total, allocations } => {
                check_total(*total)?;
                if let Some(negative) = allocations.iter().find(|a| a.amount < 0) {
                    return Err(calc_error(&format!(
                        "allocation for '{}' is negative",
                        negative.category
                    )));
                }
                if let Some(huge) = allocations.iter().find(|a| a.amount > MAX_AMOUNT_WON) {
                    return Err(calc_error(&format!(
                        "allocation for '{}' is above {}",
                        huge.category,
                        format_won(MAX_AMOUNT_WON)
                    )));
                }
                Ok(())
            }
            CalcRequest::Percentage { amount, percentage } => {
                check_total(*amount)?;
                check_percentage(*percentage)
            }
        }
    }
}

fn check_total(total: i64) -> Result<()> {
    if total < 0 {
        return Err(calc_error(&format!("budget cannot be negative ({})", total)));
    }
    if total > MAX_AMOUNT_WON {
        return Err(calc_error(&format!(
            "budget is above {}",
            format_won(MAX_AMOUNT_WON)
        )));
    }
    Ok(())
}

fn check_percentage(percentage: f64) -> Result<()> {
    if !percentage.is_finite() {
        return Err(calc_error("percentage is not a finite number"));
    }
    if !(0.0..=100.0).contains(&percentage) {
        return Err(calc_error(&format!("percentage {} is outside 0-100", percentage)));
    }
    Ok(())
}

fn calc_error(message: &str) -> OrchestrationError {
    OrchestrationError::CalculationError(message.to_string())
}

fn share(amount: i64, percentage: f64) -> i64 {
    (amount as f64 * percentage / 100.0).round() as i64
}

fn allocated_sum(allocations: &[Allocation]) -> Result<i64> {
    allocations
        .iter()
        .try_fold(0i64, |acc, a| acc.checked_add(a.amount))
        .ok_or_else(|| calc_error("allocations overflow the budget range"))
}

fn remainder(total: i64, allocated: i64) -> Result<i64> {
    total
        .checked_sub(allocated)
        .ok_or_else(|| calc_error("remainder is out of range"))
}

/// Evaluate a validated request.
pub fn calculate(request: &CalcRequest) -> Result<CalcResult> {
    request.validate()?;

    let result = match request {
        CalcRequest::Split { total, splits } => {
            let allocations: Vec<Allocation> = splits
                .iter()
                .map(|s| Allocation {
                    category: s.category.clone(),
                    amount: share(*total, s.percentage),
                })
                .collect();
            let left = remainder(*total, allocated_sum(&allocations)?)?;
            CalcResult {
                total: *total,
                allocations,
                remainder: left,
                value: None,
            }
        }
        CalcRequest::Remainder { total, allocations } => {
            CalcResult {
                total: *total,
                allocations: allocations.clone(),
                remainder: remainder(*total, allocated_sum(allocations)?)?,
                value: None,
            }
        }
        CalcRequest::Percentage { amount, percentage } => {
            let value = share(*amount, *percentage);
            CalcResult {
                total: *amount,
                allocations: Vec::new(),
                remainder: amount - value,
                value: Some(value),
            }
        }
    };

    Ok(result)
}

pub struct CalculatorTool;

#[async_trait::async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Split a total budget by percentages, compute remainders and percentages in won"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Calculator
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ToolRequest::Calculator(request) = &input.request else {
            return Err(wrong_request(self.name(), &input.request));
        };
        calculate(request).map(ToolOutput::Calculator)
    }
}
