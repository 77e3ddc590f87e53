//! Duty calendar entity (spec.md §3 "DutyCalendar entry").

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// `(tenant_id, duty_id, date, users[])` per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyCalendarEntry {
    pub tenant_id: String,
    pub duty_id: String,
    pub date: NaiveDate,
    pub users: Vec<String>,
}

/// A duty calendar is looked up by date (spec §4.6.e).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DutyCalendar {
    pub entries: Vec<DutyCalendarEntry>,
}

impl DutyCalendar {
    #[must_use]
    pub fn users_on(&self, date: NaiveDate) -> Vec<String> {
        self.entries
            .iter()
            .find(|e| e.date == date)
            .map(|e| e.users.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_empty_when_no_entry_for_date() {
        let cal = DutyCalendar::default();
        assert!(cal.users_on(NaiveDate::from_ymd_opt(2026, 7, 31).unwrap()).is_empty());
    }

    #[test]
    fn finds_entry_by_date() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let cal = DutyCalendar {
            entries: vec![DutyCalendarEntry {
                tenant_id: "t1".into(),
                duty_id: "d1".into(),
                date,
                users: vec!["alice".into()],
            }],
        };
        assert_eq!(cal.users_on(date), vec!["alice".to_string()]);
    }
}
