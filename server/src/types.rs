use serde::{Deserialize, Serialize};
use shared::{power_level_from_points, Tier};

use crate::db::types::RankedEntryRecord;

/// Presentation ordering for leaderboard reads. Stored ranks always follow
/// the canonical `(commits, score, updated_at)` ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    #[default]
    Commits,
    Score,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PaginatedResponse<T: Serialize> {
    pub records: Vec<T>,
    pub page: u64,
    pub total_pages: u64,
    pub limit: u64,
    pub total_records: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(records: Vec<T>, page: u64, limit: u64, total_records: u64) -> Self {
        let limit = limit.max(1);
        let extra_page = if total_records % limit == 0 { 0 } else { 1 };
        let total_pages = (total_records / limit) + extra_page;
        Self {
            records,
            page,
            total_pages,
            limit,
            total_records,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubMeta {
    pub login: String,
    pub image: String,
}

impl GithubMeta {
    pub fn new(login: String) -> Self {
        let image = format!("https://github.com/{}.png", login);
        Self { login, image }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderboardEntryResponse {
    pub user: GithubMeta,
    pub rank: Option<u32>,
    pub commits: u64,
    pub score: u64,
    pub power_level: u32,
    pub tier: Tier,
}

impl From<RankedEntryRecord> for LeaderboardEntryResponse {
    fn from(record: RankedEntryRecord) -> Self {
        let power_level = power_level_from_points(record.score.max(0) as u64);
        Self {
            user: GithubMeta::new(record.login),
            rank: record.rank.map(|r| r as u32),
            commits: record.commits.max(0) as u64,
            score: record.score.max(0) as u64,
            power_level,
            tier: Tier::from_level(power_level),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPositionResponse {
    pub rank: Option<u32>,
    pub commits: u64,
    pub score: u64,
}
