use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{SessionTypeString, UserStatsSnapshot};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_type: SessionTypeString,
    pub session_key: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub update_interval_minutes: i32,
    pub last_update_at: DateTime<Utc>,
    pub next_update_at: DateTime<Utc>,
}

/// Insert payload for a freshly rotated-in session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_type: SessionTypeString,
    pub session_key: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub update_interval_minutes: i32,
    pub last_update_at: DateTime<Utc>,
    pub next_update_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub commits: i64,
    pub score: i64,
    pub rank: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Leaderboard row joined with the owning user, as served by the read API.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RankedEntryRecord {
    pub user_id: i64,
    pub login: String,
    pub commits: i64,
    pub score: i64,
    pub rank: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AchievementRow {
    pub key: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserAchievementRecord {
    pub achievement_key: String,
    pub level: i32,
    pub value: i64,
    pub next_requirement: i64,
    pub progress: i64,
    pub max_progress: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// Raw `github_stats` row; counts are stored as INT and widened back out.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsRecord {
    pub contributions_today: i32,
    pub contributions_this_week: i32,
    pub contributions_this_month: i32,
    pub contributions_this_year: i32,
    pub total_contributions: i32,
    pub total_stars: i32,
    pub total_forks: i32,
    pub total_repositories: i32,
    pub followers: i32,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_prs: i32,
    pub merged_prs: i32,
    pub total_issues: i32,
    pub total_reviews: i32,
    pub external_contributions: i32,
    pub languages: i32,
    pub account_created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl From<StatsRecord> for UserStatsSnapshot {
    fn from(record: StatsRecord) -> Self {
        Self {
            contributions_today: record.contributions_today as u32,
            contributions_this_week: record.contributions_this_week as u32,
            contributions_this_month: record.contributions_this_month as u32,
            contributions_this_year: record.contributions_this_year as u32,
            total_contributions: record.total_contributions as u32,
            total_stars: record.total_stars as u32,
            total_forks: record.total_forks as u32,
            total_repositories: record.total_repositories as u32,
            followers: record.followers as u32,
            current_streak: record.current_streak as u32,
            longest_streak: record.longest_streak as u32,
            total_prs: record.total_prs as u32,
            merged_prs: record.merged_prs as u32,
            total_issues: record.total_issues as u32,
            total_reviews: record.total_reviews as u32,
            external_contributions: record.external_contributions as u32,
            languages: record.languages as u32,
            account_created_at: record.account_created_at,
            fetched_at: record.fetched_at,
        }
    }
}
