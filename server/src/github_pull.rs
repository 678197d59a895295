use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use octocrab::Octocrab;
use serde_json::Value;
use shared::{SessionType, UserStatsSnapshot};
use tracing::{instrument, warn};

/// Hard ceiling on one stats fetch, rich and degraded paths combined.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("no GitHub credentials configured")]
    MissingCredentials,
    #[error("GitHub request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Github(#[from] octocrab::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// External source of per-user statistics. The production implementation
/// talks to GitHub; tests substitute their own.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_user_stats(&self, login: &str) -> Result<UserStatsSnapshot, StatsError>;
}

pub struct GithubClient {
    octocrab: Option<Octocrab>,
}

impl GithubClient {
    /// A missing token is not fatal here; every fetch will report
    /// `MissingCredentials` instead, and the orchestrator counts those
    /// per user.
    pub fn new(token: Option<String>) -> anyhow::Result<Self> {
        let octocrab = match token {
            Some(token) => Some(Octocrab::builder().personal_token(token).build()?),
            None => None,
        };
        Ok(Self { octocrab })
    }

    pub fn has_credentials(&self) -> bool {
        self.octocrab.is_some()
    }

    /// One GraphQL round trip: profile, repository aggregates, windowed
    /// contribution counts and the contribution calendar for streaks.
    async fn fetch_rich(
        &self,
        octocrab: &Octocrab,
        login: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStatsSnapshot, StatsError> {
        let (day_start, _) = SessionType::Daily.session_bounds(now);
        let (week_start, _) = SessionType::Weekly.session_bounds(now);
        let (month_start, _) = SessionType::Monthly.session_bounds(now);
        let (year_start, _) = SessionType::Yearly.session_bounds(now);

        let query = r#"
            query($login: String!, $day: DateTime!, $week: DateTime!, $month: DateTime!, $year: DateTime!) {
              user(login: $login) {
                createdAt
                followers { totalCount }
                repositories(first: 100, ownerAffiliations: OWNER) {
                  totalCount
                  nodes { stargazerCount forkCount primaryLanguage { name } }
                }
                repositoriesContributedTo(contributionTypes: [COMMIT, PULL_REQUEST]) { totalCount }
                pullRequests { totalCount }
                mergedPullRequests: pullRequests(states: MERGED) { totalCount }
                issues { totalCount }
                contributions: contributionsCollection {
                  restrictedContributionsCount
                  totalPullRequestReviewContributions
                  contributionCalendar {
                    totalContributions
                    weeks { contributionDays { date contributionCount } }
                  }
                }
                day: contributionsCollection(from: $day) {
                  contributionCalendar { totalContributions }
                }
                week: contributionsCollection(from: $week) {
                  contributionCalendar { totalContributions }
                }
                month: contributionsCollection(from: $month) {
                  contributionCalendar { totalContributions }
                }
                year: contributionsCollection(from: $year) {
                  contributionCalendar { totalContributions }
                }
              }
            }
        "#;

        let payload = serde_json::json!({
            "query": query,
            "variables": {
                "login": login,
                "day": day_start.to_rfc3339(),
                "week": week_start.to_rfc3339(),
                "month": month_start.to_rfc3339(),
                "year": year_start.to_rfc3339(),
            },
        });

        let response: Value = octocrab.graphql(&payload).await?;
        let user = response
            .pointer("/data/user")
            .filter(|user| !user.is_null())
            .ok_or_else(|| anyhow::anyhow!("GitHub user {login} not found in GraphQL response"))?;

        let mut total_stars = 0u32;
        let mut total_forks = 0u32;
        let mut languages = HashSet::new();
        if let Some(nodes) = user.pointer("/repositories/nodes").and_then(Value::as_array) {
            for node in nodes {
                total_stars += count(node, "/stargazerCount");
                total_forks += count(node, "/forkCount");
                if let Some(language) = node.pointer("/primaryLanguage/name").and_then(Value::as_str)
                {
                    languages.insert(language.to_string());
                }
            }
        }

        let calendar_days = contribution_days(user);
        let (current_streak, longest_streak) =
            compute_streaks(&calendar_days, now.date_naive());

        let account_created_at = user
            .pointer("/createdAt")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
            .unwrap_or_default();

        let year_contributions = count(user, "/contributions/contributionCalendar/totalContributions");

        Ok(UserStatsSnapshot {
            contributions_today: count(user, "/day/contributionCalendar/totalContributions"),
            contributions_this_week: count(user, "/week/contributionCalendar/totalContributions"),
            contributions_this_month: count(user, "/month/contributionCalendar/totalContributions"),
            contributions_this_year: count(user, "/year/contributionCalendar/totalContributions"),
            // The calendar only reaches back a year; restricted counts are
            // folded in so private activity still weighs.
            total_contributions: year_contributions
                + count(user, "/contributions/restrictedContributionsCount"),
            total_stars,
            total_forks,
            total_repositories: count(user, "/repositories/totalCount"),
            followers: count(user, "/followers/totalCount"),
            current_streak,
            longest_streak,
            total_prs: count(user, "/pullRequests/totalCount"),
            merged_prs: count(user, "/mergedPullRequests/totalCount"),
            total_issues: count(user, "/issues/totalCount"),
            total_reviews: count(user, "/contributions/totalPullRequestReviewContributions"),
            external_contributions: count(user, "/repositoriesContributedTo/totalCount"),
            languages: languages.len() as u32,
            account_created_at,
            fetched_at: now,
        })
    }

    /// REST fallback when the GraphQL query is unavailable. Windowed
    /// contribution counts and streaks cannot be derived here and come
    /// back zero; callers tolerate the reduced shape.
    async fn fetch_degraded(
        &self,
        octocrab: &Octocrab,
        login: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStatsSnapshot, StatsError> {
        let profile = octocrab.users(login).profile().await?;

        let repos = octocrab
            .search()
            .repositories(&format!("user:{login}"))
            .per_page(100)
            .send()
            .await?;
        let mut total_stars = 0u32;
        let mut total_forks = 0u32;
        let mut languages = HashSet::new();
        for repo in &repos.items {
            total_stars += repo.stargazers_count.unwrap_or_default();
            total_forks += repo.forks_count.unwrap_or_default();
            if let Some(language) = repo.language.as_ref().and_then(Value::as_str) {
                languages.insert(language.to_string());
            }
        }

        let total_prs = self.search_count(octocrab, &format!("author:{login} type:pr")).await?;
        let merged_prs = self
            .search_count(octocrab, &format!("author:{login} type:pr is:merged"))
            .await?;
        let total_issues = self
            .search_count(octocrab, &format!("author:{login} type:issue"))
            .await?;

        Ok(UserStatsSnapshot {
            total_stars,
            total_forks,
            total_repositories: repos.total_count.unwrap_or_default() as u32,
            followers: profile.followers as u32,
            total_prs,
            merged_prs,
            total_issues,
            account_created_at: profile.created_at,
            fetched_at: now,
            ..Default::default()
        })
    }

    async fn search_count(&self, octocrab: &Octocrab, query: &str) -> Result<u32, StatsError> {
        let page = octocrab
            .search()
            .issues_and_pull_requests(query)
            .per_page(1)
            .send()
            .await?;
        Ok(page.total_count.unwrap_or_default() as u32)
    }
}

#[async_trait]
impl StatsSource for GithubClient {
    #[instrument(skip(self))]
    async fn fetch_user_stats(&self, login: &str) -> Result<UserStatsSnapshot, StatsError> {
        let octocrab = self
            .octocrab
            .as_ref()
            .ok_or(StatsError::MissingCredentials)?;
        let now = Utc::now();

        let fetch = async {
            match self.fetch_rich(octocrab, login, now).await {
                Ok(snapshot) => Ok(snapshot),
                Err(e) => {
                    warn!("Rich stats query failed for {login}, falling back to REST: {e:#}");
                    self.fetch_degraded(octocrab, login, now).await
                }
            }
        };

        tokio::time::timeout(FETCH_TIMEOUT, fetch)
            .await
            .map_err(|_| StatsError::Timeout(FETCH_TIMEOUT))?
    }
}

fn count(value: &Value, pointer: &str) -> u32 {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .unwrap_or_default() as u32
}

fn contribution_days(user: &Value) -> Vec<(NaiveDate, u32)> {
    let mut days = Vec::new();
    let Some(weeks) = user
        .pointer("/contributions/contributionCalendar/weeks")
        .and_then(Value::as_array)
    else {
        return days;
    };
    for week in weeks {
        let Some(week_days) = week.pointer("/contributionDays").and_then(Value::as_array) else {
            continue;
        };
        for day in week_days {
            let Some(date) = day
                .pointer("/date")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<NaiveDate>().ok())
            else {
                continue;
            };
            days.push((date, count(day, "/contributionCount")));
        }
    }
    days
}

/// Current and longest daily-contribution streaks over the calendar
/// window. A day with no contributions yet does not break the current
/// streak until the day is over, so a run ending yesterday still counts.
pub fn compute_streaks(days: &[(NaiveDate, u32)], today: NaiveDate) -> (u32, u32) {
    let active: BTreeSet<NaiveDate> = days
        .iter()
        .filter(|(_, contributions)| *contributions > 0)
        .map(|(date, _)| *date)
        .collect();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for day in &active {
        run = match previous {
            Some(p) if *day == p + Days::new(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }

    let mut cursor = if active.contains(&today) {
        today
    } else {
        today - Days::new(1)
    };
    let mut current = 0u32;
    while active.contains(&cursor) {
        current += 1;
        cursor = cursor - Days::new(1);
    }

    (current, longest)
}
