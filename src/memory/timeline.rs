//! Standard wedding checklist
//!
//! Milestones generated backwards from the wedding date.

use crate::models::{Milestone, MilestoneSource};
use chrono::{Duration, NaiveDate};

/// Days relative to the wedding date, and what is due then.
pub const STANDARD_CHECKLIST: &[(i64, &str)] = &[
    (-340, "Tour and book the wedding hall"),
    (-300, "Consult and sign studio, dress and makeup"),
    (-250, "Groom's suit consultation"),
    (-180, "Pick shoot dresses, fit the groom's suit"),
    (-150, "Rehearsal photo shoot"),
    (-50, "Select photos, order invitations"),
    (-35, "Wedding dress fitting"),
    (-30, "D-30 check"),
    (-1, "Pack hanbok, final checklist"),
    (0, "Wedding day"),
];

/// Every standard milestone for a wedding on `wedding_date`.
pub fn standard_milestones(wedding_date: NaiveDate) -> Vec<(String, NaiveDate)> {
    STANDARD_CHECKLIST
        .iter()
        .map(|(offset, title)| (title.to_string(), wedding_date + Duration::days(*offset)))
        .collect()
}

/// Standard milestones not yet present as system milestones, plus how many
/// were skipped.
pub fn plan_generation(existing: &[Milestone], wedding_date: NaiveDate) -> (Vec<(String, NaiveDate)>, usize) {
    let mut skipped = 0;
    let planned = standard_milestones(wedding_date)
        .into_iter()
        .filter(|(title, _)| {
            let present = existing
                .iter()
                .any(|m| m.source == MilestoneSource::System && &m.title == title);
            if present {
                skipped += 1;
            }
            !present
        })
        .collect();
    (planned, skipped)
}

/// Days from `today` until the wedding; negative once it has passed.
pub fn days_until(today: NaiveDate, wedding_date: NaiveDate) -> i64 {
    (wedding_date - today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_offsets() {
        let milestones = standard_milestones(date(2026, 5, 23));
        assert_eq!(milestones.len(), 10);
        assert_eq!(milestones[0].1, date(2025, 6, 17));
        assert_eq!(milestones[8].1, date(2026, 5, 22));
        assert_eq!(milestones[9], ("Wedding day".to_string(), date(2026, 5, 23)));
    }

    #[test]
    fn test_existing_system_titles_are_skipped() {
        let user_id = Uuid::new_v4();
        let existing = vec![
            Milestone {
                milestone_id: 1,
                user_id,
                title: "Wedding day".into(),
                due_date: date(2026, 5, 23),
                completed: false,
                source: MilestoneSource::System,
                notes: None,
            },
            // a user milestone with the same title does not count
            Milestone {
                milestone_id: 2,
                user_id,
                title: "D-30 check".into(),
                due_date: date(2026, 4, 23),
                completed: false,
                source: MilestoneSource::User,
                notes: None,
            },
        ];

        let (planned, skipped) = plan_generation(&existing, date(2026, 5, 23));
        assert_eq!(skipped, 1);
        assert_eq!(planned.len(), 9);
        assert!(planned.iter().any(|(t, _)| t == "D-30 check"));
    }

    #[test]
    fn test_days_until() {
        assert_eq!(days_until(date(2026, 5, 1), date(2026, 5, 23)), 22);
        assert_eq!(days_until(date(2026, 5, 24), date(2026, 5, 23)), -1);
    }
}
