use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionType;

/// One user's aggregated GitHub metrics, captured wholesale on each
/// refresh. Both the rich and the degraded fetch path reduce to this
/// shape; absent fields come back as zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStatsSnapshot {
    pub contributions_today: u32,
    pub contributions_this_week: u32,
    pub contributions_this_month: u32,
    pub contributions_this_year: u32,
    pub total_contributions: u32,
    pub total_stars: u32,
    pub total_forks: u32,
    pub total_repositories: u32,
    pub followers: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_prs: u32,
    pub merged_prs: u32,
    pub total_issues: u32,
    pub total_reviews: u32,
    /// Contributions to repositories the user does not own.
    pub external_contributions: u32,
    /// Distinct primary languages across owned repositories.
    pub languages: u32,
    pub account_created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl UserStatsSnapshot {
    /// Overall point total. Feeds the power level and the leaderboard
    /// `score` column.
    pub fn points(&self) -> u64 {
        self.total_contributions as u64 * 2
            + self.merged_prs as u64 * 10
            + self.total_reviews as u64 * 8
            + self.total_issues as u64 * 5
            + self.total_stars as u64 * 3
            + self.followers as u64
    }

    /// Period-scoped activity count backing the leaderboard `commits`
    /// column for the given cadence.
    pub const fn contributions_for(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Daily => self.contributions_today,
            SessionType::Weekly => self.contributions_this_week,
            SessionType::Monthly => self.contributions_this_month,
            SessionType::Yearly => self.contributions_this_year,
            SessionType::Overall => self.total_contributions,
        }
    }

    pub fn account_age_years(&self, now: DateTime<Utc>) -> u32 {
        let days = (now - self.account_created_at).num_days();
        (days.max(0) / 365) as u32
    }
}
