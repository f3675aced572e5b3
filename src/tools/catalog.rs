//! Catalog lookup
//!
//! Offerings for a category, filtered by a budget range and ordered
//! region-match first, then ascending price (unknown price last), then
//! offering id. An empty result is a valid answer, not an error.

use super::{wrong_request, Tool, ToolInput, ToolKind, ToolOutput, ToolRequest};
use crate::error::OrchestrationError;
use crate::models::{Offering, OfferingMatch, Vendor};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;

pub const MAX_CATALOG_LIMIT: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogQuery {
    pub category: String,
    pub region: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub limit: u32,
}

impl CatalogQuery {
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(OrchestrationError::InvalidToolInput(
                "catalog lookup needs a category".to_string(),
            ));
        }
        if !(1..=MAX_CATALOG_LIMIT).contains(&self.limit) {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "catalog limit {} is outside 1..={}",
                self.limit, MAX_CATALOG_LIMIT
            )));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(OrchestrationError::InvalidToolInput(format!(
                    "price range {}..{} is empty",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// An offering joined with the vendor that sells it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub offering: Offering,
    pub vendor: Vendor,
}

/// Read-mostly catalog backend.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every offering in `category`; ordering is applied by the caller.
    async fn entries(&self, category: &str) -> Result<Vec<CatalogEntry>>;
}

/// Filter and order candidate entries for a query.
pub fn rank(query: &CatalogQuery, entries: Vec<CatalogEntry>) -> Vec<OfferingMatch> {
    let region = query.region.as_deref().map(str::to_lowercase);

    let mut matches: Vec<(Option<i64>, OfferingMatch)> = entries
        .into_iter()
        .filter(|e| e.offering.category == query.category)
        .filter_map(|e| {
            let price = e.offering.price.or(e.vendor.min_price);
            if let Some(price) = price {
                if query.min_price.map_or(false, |min| price < min)
                    || query.max_price.map_or(false, |max| price > max)
                {
                    return None;
                }
            }
            let region_match = match (&region, &e.vendor.region) {
                (Some(wanted), Some(actual)) => actual.to_lowercase().contains(wanted.as_str()),
                _ => false,
            };
            Some((
                price,
                OfferingMatch {
                    offering: e.offering,
                    vendor_name: e.vendor.name,
                    vendor_region: e.vendor.region,
                    region_match,
                },
            ))
        })
        .collect();

    matches.sort_by(|(price_a, a), (price_b, b)| {
        b.region_match
            .cmp(&a.region_match)
            .then_with(|| match (price_a, price_b) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.offering.offering_id.cmp(&b.offering.offering_id))
    });

    matches
        .into_iter()
        .take(query.limit as usize)
        .map(|(_, m)| m)
        .collect()
}

pub struct CatalogLookupTool {
    source: Arc<dyn CatalogSource>,
}

impl CatalogLookupTool {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl Tool for CatalogLookupTool {
    fn name(&self) -> &'static str {
        "catalog_lookup"
    }

    fn description(&self) -> &'static str {
        "Find vendor offerings by category, region and budget range"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::CatalogLookup
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ToolRequest::CatalogLookup(query) = &input.request else {
            return Err(wrong_request(self.name(), &input.request));
        };
        let entries = self.source.entries(&query.category).await?;
        Ok(ToolOutput::CatalogLookup(rank(query, entries)))
    }
}

// =============================
// In-memory catalog
// =============================

/// Process-wide catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    vendors: Vec<Vendor>,
    offerings: Vec<Offering>,
}

impl InMemoryCatalog {
    pub fn new(vendors: Vec<Vendor>, offerings: Vec<Offering>) -> Self {
        Self { vendors, offerings }
    }

    /// Small seeded catalog used when no database is configured.
    pub fn demo() -> Self {
        let vendor = |id: i64, kind: &str, name: &str, region: &str, min_price: i64| Vendor {
            vendor_id: id,
            vendor_type: kind.to_string(),
            name: name.to_string(),
            region: Some(region.to_string()),
            min_price: Some(min_price),
        };
        let offering = |id: i64, vendor_id: i64, category: &str, package: &str, price: Option<i64>| {
            Offering {
                offering_id: id,
                vendor_id,
                category: category.to_string(),
                package_name: package.to_string(),
                price,
                metadata: json!({}),
            }
        };

        let vendors = vec![
            vendor(1, "hall", "Grand Ariel Hall", "Gangnam", 25_000_000),
            vendor(2, "hall", "Cheongdam Maison", "Cheongdam", 32_000_000),
            vendor(3, "hall", "Seoul Garden Wedding", "Jamsil", 18_000_000),
            vendor(4, "studio", "Studio Lumiere", "Gangnam", 1_800_000),
            vendor(5, "studio", "Mono Snap Studio", "Seongsu", 1_200_000),
            vendor(6, "dress", "Atelier Blanc", "Cheongdam", 2_500_000),
            vendor(7, "dress", "Rose Bridal", "Gangnam", 1_600_000),
            vendor(8, "makeup", "Glow Makeup Lab", "Cheongdam", 700_000),
            vendor(9, "makeup", "Hongdae Hair & Makeup", "Hongdae", 450_000),
            vendor(10, "honeymoon", "Blue Lagoon Travel", "Seoul", 5_000_000),
            vendor(11, "jewelry", "Maison de Bague", "Apgujeong", 1_500_000),
            vendor(12, "invitation", "Paper Moments", "Hongdae", 200_000),
        ];

        let offerings = vec![
            offering(101, 1, "hall", "Ariel Grand Ballroom (200 guests)", Some(28_000_000)),
            offering(102, 1, "hall", "Ariel Chapel (120 guests)", Some(25_000_000)),
            offering(103, 2, "hall", "Maison Garden Ceremony", Some(34_000_000)),
            offering(104, 3, "hall", "Garden Hall Standard", Some(18_000_000)),
            offering(105, 3, "hall", "Garden Hall Premium", None),
            offering(201, 4, "studio", "Lumiere Classic Album", Some(1_800_000)),
            offering(202, 4, "studio", "Lumiere Premium Album", Some(2_600_000)),
            offering(203, 5, "studio", "Mono Snap Outdoor", Some(1_200_000)),
            offering(301, 6, "dress", "Blanc Couture 3 Dresses", Some(2_500_000)),
            offering(302, 7, "dress", "Rose Basic 2 Dresses", Some(1_600_000)),
            offering(401, 8, "makeup", "Glow Bride & Groom", Some(700_000)),
            offering(402, 9, "makeup", "Hongdae Bridal Makeup", Some(450_000)),
            offering(501, 10, "honeymoon", "Maldives 6 Nights", Some(7_500_000)),
            offering(502, 10, "honeymoon", "Bali 5 Nights", Some(5_000_000)),
            offering(601, 11, "jewelry", "Couple Rings Gold", Some(1_500_000)),
            offering(701, 12, "invitation", "Letterpress 200 Cards", Some(200_000)),
        ];

        Self { vendors, offerings }
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn entries(&self, category: &str) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .offerings
            .iter()
            .filter(|o| o.category == category)
            .filter_map(|o| {
                self.vendors
                    .iter()
                    .find(|v| v.vendor_id == o.vendor_id)
                    .map(|v| CatalogEntry {
                        offering: o.clone(),
                        vendor: v.clone(),
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn query(category: &str, region: Option<&str>) -> CatalogQuery {
        CatalogQuery {
            category: category.to_string(),
            region: region.map(str::to_string),
            min_price: None,
            max_price: None,
            limit: 10,
        }
    }

    async fn lookup(q: CatalogQuery) -> Vec<OfferingMatch> {
        let tool = CatalogLookupTool::new(Arc::new(InMemoryCatalog::demo()));
        let input = ToolInput::new(Uuid::new_v4(), ToolRequest::CatalogLookup(q));
        match tool.execute(&input).await.unwrap() {
            ToolOutput::CatalogLookup(matches) => matches,
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_region_match_first_then_price() {
        let matches = lookup(query("hall", Some("Gangnam"))).await;
        let ids: Vec<i64> = matches.iter().map(|m| m.offering.offering_id).collect();
        // Gangnam offerings by price, then the rest by price; 105 prices at
        // its vendor's minimum and ties with 104 on id
        assert_eq!(ids, vec![102, 101, 104, 105, 103]);
        assert!(matches[0].region_match);
        assert!(!matches[2].region_match);
    }

    #[tokio::test]
    async fn test_unknown_price_falls_back_to_vendor_minimum() {
        // 105 has no price of its own; vendor 3 starts at 18,000,000
        let mut q = query("hall", None);
        q.max_price = Some(20_000_000);
        let ids: Vec<i64> = lookup(q).await.iter().map(|m| m.offering.offering_id).collect();
        assert_eq!(ids, vec![104, 105]);
    }

    #[test]
    fn test_unknown_price_sorts_last() {
        let vendor = Vendor {
            vendor_id: 1,
            vendor_type: "dress".into(),
            name: "V".into(),
            region: None,
            min_price: None,
        };
        let entry = |id, price| CatalogEntry {
            offering: Offering {
                offering_id: id,
                vendor_id: 1,
                category: "dress".into(),
                package_name: format!("p{}", id),
                price,
                metadata: json!({}),
            },
            vendor: vendor.clone(),
        };
        let ranked = rank(
            &query("dress", None),
            vec![entry(3, None), entry(2, Some(900)), entry(1, Some(900))],
        );
        let ids: Vec<i64> = ranked.iter().map(|m| m.offering.offering_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_identical_queries_are_stable() {
        let first = lookup(query("studio", Some("Seongsu"))).await;
        let second = lookup(query("studio", Some("Seongsu"))).await;
        assert_eq!(first, second);
        assert_eq!(first[0].vendor_name, "Mono Snap Studio");
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let mut q = query("jewelry", None);
        q.max_price = Some(10);
        assert!(lookup(q).await.is_empty());
    }

    #[tokio::test]
    async fn test_limit_is_applied() {
        let mut q = query("hall", None);
        q.limit = 2;
        assert_eq!(lookup(q).await.len(), 2);
    }

    #[test]
    fn test_validation() {
        let mut q = query("hall", None);
        q.limit = 0;
        assert!(q.validate().is_err());
        q.limit = 21;
        assert!(q.validate().is_err());
        let mut q = query(" ", None);
        assert!(q.validate().is_err());
        q.category = "hall".into();
        q.min_price = Some(10);
        q.max_price = Some(5);
        assert!(q.validate().is_err());
    }
}
