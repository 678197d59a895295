use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

pub use strum::IntoEnumIterator;

pub type SessionTypeString = String;

/// One leaderboard contest cadence. Every period boundary is computed in
/// UTC so the windows are identical for every user regardless of server
/// locale.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Overall,
}

impl SessionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionType::Daily => "daily",
            SessionType::Weekly => "weekly",
            SessionType::Monthly => "monthly",
            SessionType::Yearly => "yearly",
            SessionType::Overall => "overall",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(SessionType::Daily),
            "weekly" => Some(SessionType::Weekly),
            "monthly" => Some(SessionType::Monthly),
            "yearly" => Some(SessionType::Yearly),
            "overall" => Some(SessionType::Overall),
            _ => None,
        }
    }

    /// Calendar identity of the period containing `now`.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        let date = now.date_naive();
        match self {
            SessionType::Daily => date.format("%Y-%m-%d").to_string(),
            SessionType::Weekly => {
                // Number the Sunday-started week by the ISO week of its
                // Monday, so keys line up with the familiar ISO numbering.
                let week = (week_anchor(date) + Days::new(1)).iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            SessionType::Monthly => date.format("%Y-%m").to_string(),
            SessionType::Yearly => date.format("%Y").to_string(),
            SessionType::Overall => "all-time".to_string(),
        }
    }

    /// Deterministic session identity, e.g. `weekly-2024-W41`.
    pub fn session_key(&self, now: DateTime<Utc>) -> String {
        format!("{}-{}", self.as_str(), self.period_key(now))
    }

    /// UTC start and end instants of the period containing `now`. The end
    /// is the last millisecond of the period.
    pub fn session_bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = now.date_naive();
        let (start, next_start) = match self {
            SessionType::Daily => (date, date + Days::new(1)),
            SessionType::Weekly => {
                let anchor = week_anchor(date);
                (anchor, anchor + Days::new(7))
            }
            SessionType::Monthly => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
                (first, first + Months::new(1))
            }
            SessionType::Yearly => {
                let first = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
                (first, first + Months::new(12))
            }
            SessionType::Overall => return overall_bounds(),
        };
        (
            utc_midnight(start),
            utc_midnight(next_start) - chrono::Duration::milliseconds(1),
        )
    }

    /// Fixed per-cadence rank-refresh interval. Deliberately not
    /// configurable.
    pub const fn update_interval(&self) -> Duration {
        match self {
            SessionType::Daily => Duration::from_secs(5 * 60),
            SessionType::Weekly => Duration::from_secs(6 * 60 * 60),
            SessionType::Monthly => Duration::from_secs(12 * 60 * 60),
            SessionType::Yearly => Duration::from_secs(24 * 60 * 60),
            SessionType::Overall => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    pub const fn update_interval_minutes(&self) -> u32 {
        (self.update_interval().as_secs() / 60) as u32
    }
}

// Weeks start on Sunday, not the ISO Monday.
fn week_anchor(date: NaiveDate) -> NaiveDate {
    date - Days::new(date.weekday().num_days_from_sunday() as u64)
}

fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

// The overall session never expires in practice; the far-past start predates
// GitHub itself.
fn overall_bounds() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default(),
        Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .single()
            .unwrap_or_default()
            + chrono::Duration::milliseconds(999),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid RFC 3339 timestamp")
    }

    #[test]
    fn period_keys_follow_the_utc_calendar() {
        let now = at("2024-10-10T12:00:00Z");
        assert_eq!(SessionType::Daily.period_key(now), "2024-10-10");
        assert_eq!(SessionType::Monthly.period_key(now), "2024-10");
        assert_eq!(SessionType::Yearly.period_key(now), "2024");
        assert_eq!(SessionType::Overall.period_key(now), "all-time");
        assert_eq!(
            SessionType::Weekly.session_key(now),
            "weekly-2024-W41".to_string()
        );
    }

    #[test]
    fn session_key_is_stable_within_a_period_and_changes_across_it() {
        let before = at("2024-10-10T23:59:59Z");
        let after = at("2024-10-11T00:00:01Z");
        assert_eq!(
            SessionType::Daily.session_key(before),
            SessionType::Daily.session_key(at("2024-10-10T00:00:01Z"))
        );
        assert_ne!(
            SessionType::Daily.session_key(before),
            SessionType::Daily.session_key(after)
        );
    }

    #[test]
    fn weeks_start_on_sunday() {
        // 2024-10-10 is a Thursday; 2024-10-06 the preceding Sunday.
        let thursday = at("2024-10-10T12:00:00Z");
        let sunday = at("2024-10-06T00:00:00Z");
        assert_eq!(
            SessionType::Weekly.session_key(thursday),
            SessionType::Weekly.session_key(sunday)
        );
        // The Saturday before belongs to the previous week.
        let saturday = at("2024-10-05T23:59:59Z");
        assert_ne!(
            SessionType::Weekly.session_key(thursday),
            SessionType::Weekly.session_key(saturday)
        );
    }

    #[test]
    fn daily_bounds_cover_exactly_one_utc_day() {
        let now = at("2024-10-10T15:30:00Z");
        let (start, end) = SessionType::Daily.session_bounds(now);
        assert_eq!(start, at("2024-10-10T00:00:00Z"));
        assert_eq!(end, at("2024-10-10T23:59:59.999Z"));
    }

    #[test]
    fn weekly_bounds_run_sunday_through_saturday() {
        let now = at("2024-10-10T12:00:00Z");
        let (start, end) = SessionType::Weekly.session_bounds(now);
        assert_eq!(start, at("2024-10-06T00:00:00Z"));
        assert_eq!(end, at("2024-10-12T23:59:59.999Z"));
    }

    #[test]
    fn monthly_and_yearly_bounds() {
        let now = at("2024-02-15T00:00:00Z");
        let (start, end) = SessionType::Monthly.session_bounds(now);
        assert_eq!(start, at("2024-02-01T00:00:00Z"));
        assert_eq!(end, at("2024-02-29T23:59:59.999Z"));

        let (start, end) = SessionType::Yearly.session_bounds(now);
        assert_eq!(start, at("2024-01-01T00:00:00Z"));
        assert_eq!(end, at("2024-12-31T23:59:59.999Z"));
    }

    #[test]
    fn overall_bounds_never_expire_in_practice() {
        let now = Utc::now();
        let (start, end) = SessionType::Overall.session_bounds(now);
        assert!(start < now);
        assert!(end > now + chrono::Duration::days(365 * 100));
    }

    #[test]
    fn year_boundary_week_keys_stay_deterministic() {
        // 2024-12-31 (Tuesday) anchors to Sunday 2024-12-29; 2025-01-01
        // falls in the same Sunday week.
        assert_eq!(
            SessionType::Weekly.session_key(at("2024-12-31T10:00:00Z")),
            SessionType::Weekly.session_key(at("2025-01-01T10:00:00Z"))
        );
    }

    #[test]
    fn update_intervals_follow_the_fixed_table() {
        assert_eq!(SessionType::Daily.update_interval_minutes(), 5);
        assert_eq!(SessionType::Weekly.update_interval_minutes(), 6 * 60);
        assert_eq!(SessionType::Monthly.update_interval_minutes(), 12 * 60);
        assert_eq!(SessionType::Yearly.update_interval_minutes(), 24 * 60);
        assert_eq!(SessionType::Overall.update_interval_minutes(), 7 * 24 * 60);
    }
}
