use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::{LevelCurve, LevelProgress, UserStatsSnapshot};

/// A leveled progression axis. Each category carries its own requirement
/// curve and reads one metric off the stats snapshot.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Followers,
    Stars,
    Contributions,
    Streak,
    Repositories,
    Issues,
    PullRequests,
    Reviews,
    ExternalContributions,
    LanguageDiversity,
    AccountAge,
}

/// How a category turns a metric value into a level. Account age is the
/// one linear axis: one level per year, no curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelScale {
    Curve(LevelCurve),
    PerYear,
}

impl LevelScale {
    pub fn level_for_value(&self, value: u64) -> u32 {
        match self {
            LevelScale::Curve(curve) => curve.level_for_value(value),
            LevelScale::PerYear => value.min(u32::MAX as u64) as u32,
        }
    }

    pub fn requirement_for_level(&self, level: u32) -> u64 {
        match self {
            LevelScale::Curve(curve) => curve.requirement_for_level(level),
            LevelScale::PerYear => level as u64,
        }
    }

    pub fn progress(&self, value: u64) -> LevelProgress {
        match self {
            LevelScale::Curve(curve) => curve.progress(value),
            LevelScale::PerYear => LevelProgress {
                level: self.level_for_value(value),
                progress: 0,
                remaining: 1,
            },
        }
    }
}

impl AchievementCategory {
    pub const fn key(&self) -> &'static str {
        match self {
            AchievementCategory::Followers => "followers",
            AchievementCategory::Stars => "stars",
            AchievementCategory::Contributions => "contributions",
            AchievementCategory::Streak => "streak",
            AchievementCategory::Repositories => "repositories",
            AchievementCategory::Issues => "issues",
            AchievementCategory::PullRequests => "pull_requests",
            AchievementCategory::Reviews => "reviews",
            AchievementCategory::ExternalContributions => "external_contributions",
            AchievementCategory::LanguageDiversity => "language_diversity",
            AchievementCategory::AccountAge => "account_age",
        }
    }

    pub const fn scale(&self) -> LevelScale {
        match self {
            AchievementCategory::Followers => LevelScale::Curve(LevelCurve::new(5.0, 1.5, 20, 0.08)),
            AchievementCategory::Stars => LevelScale::Curve(LevelCurve::new(10.0, 1.6, 22, 0.08)),
            AchievementCategory::Contributions => {
                LevelScale::Curve(LevelCurve::new(30.0, 1.5, 25, 0.06))
            }
            AchievementCategory::Streak => LevelScale::Curve(LevelCurve::new(3.0, 1.3, 15, 0.10)),
            AchievementCategory::Repositories => {
                LevelScale::Curve(LevelCurve::new(2.0, 1.4, 18, 0.08))
            }
            AchievementCategory::Issues => LevelScale::Curve(LevelCurve::new(5.0, 1.5, 20, 0.08)),
            AchievementCategory::PullRequests => {
                LevelScale::Curve(LevelCurve::new(5.0, 1.5, 20, 0.08))
            }
            AchievementCategory::Reviews => LevelScale::Curve(LevelCurve::new(4.0, 1.5, 20, 0.08)),
            AchievementCategory::ExternalContributions => {
                LevelScale::Curve(LevelCurve::new(3.0, 1.5, 20, 0.08))
            }
            AchievementCategory::LanguageDiversity => {
                LevelScale::Curve(LevelCurve::new(1.5, 1.8, 8, 0.12))
            }
            AchievementCategory::AccountAge => LevelScale::PerYear,
        }
    }

    /// The snapshot metric driving this category. Account age is measured
    /// as of the snapshot's fetch time so the value is stable per fetch.
    pub fn metric_value(&self, stats: &UserStatsSnapshot) -> u64 {
        match self {
            AchievementCategory::Followers => stats.followers as u64,
            AchievementCategory::Stars => stats.total_stars as u64,
            AchievementCategory::Contributions => stats.total_contributions as u64,
            AchievementCategory::Streak => stats.longest_streak as u64,
            AchievementCategory::Repositories => stats.total_repositories as u64,
            AchievementCategory::Issues => stats.total_issues as u64,
            AchievementCategory::PullRequests => stats.total_prs as u64,
            AchievementCategory::Reviews => stats.total_reviews as u64,
            AchievementCategory::ExternalContributions => stats.external_contributions as u64,
            AchievementCategory::LanguageDiversity => stats.languages as u64,
            AchievementCategory::AccountAge => {
                stats.account_age_years(stats.fetched_at) as u64
            }
        }
    }
}

/// One-shot badges. Each flag is a single predicate over the snapshot,
/// checked by explicit match rather than any generic criteria blob.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum BadgeFlag {
    FirstPullRequest,
    FirstMergedPullRequest,
    FirstIssue,
    FirstReview,
    PopularRepo,
    Polyglot,
    CenturyStreak,
}

impl BadgeFlag {
    pub const fn key(&self) -> &'static str {
        match self {
            BadgeFlag::FirstPullRequest => "badge-first-pr",
            BadgeFlag::FirstMergedPullRequest => "badge-first-merged-pr",
            BadgeFlag::FirstIssue => "badge-first-issue",
            BadgeFlag::FirstReview => "badge-first-review",
            BadgeFlag::PopularRepo => "badge-popular-repo",
            BadgeFlag::Polyglot => "badge-polyglot",
            BadgeFlag::CenturyStreak => "badge-century-streak",
        }
    }

    pub const fn is_satisfied(&self, stats: &UserStatsSnapshot) -> bool {
        match self {
            BadgeFlag::FirstPullRequest => stats.total_prs >= 1,
            BadgeFlag::FirstMergedPullRequest => stats.merged_prs >= 1,
            BadgeFlag::FirstIssue => stats.total_issues >= 1,
            BadgeFlag::FirstReview => stats.total_reviews >= 1,
            BadgeFlag::PopularRepo => stats.total_stars >= 16,
            BadgeFlag::Polyglot => stats.languages >= 5,
            BadgeFlag::CenturyStreak => stats.longest_streak >= 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AchievementKind {
    Leveled { category: AchievementCategory },
    Badge { flag: BadgeFlag },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchievementDef {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: AchievementKind,
}

impl AchievementDef {
    pub const fn kind_str(&self) -> &'static str {
        match self.kind {
            AchievementKind::Leveled { .. } => "leveled",
            AchievementKind::Badge { .. } => "badge",
        }
    }

    pub const fn category_key(&self) -> Option<&'static str> {
        match self.kind {
            AchievementKind::Leveled { category } => Some(category.key()),
            AchievementKind::Badge { .. } => None,
        }
    }
}

const fn leveled(
    key: &'static str,
    name: &'static str,
    description: &'static str,
    category: AchievementCategory,
) -> AchievementDef {
    AchievementDef {
        key,
        name,
        description,
        kind: AchievementKind::Leveled { category },
    }
}

const fn badge(
    name: &'static str,
    description: &'static str,
    flag: BadgeFlag,
) -> AchievementDef {
    AchievementDef {
        key: flag.key(),
        name,
        description,
        kind: AchievementKind::Badge { flag },
    }
}

/// Every achievement the system knows about. Static configuration, synced
/// into storage at startup so definitions can be listed alongside user
/// progress.
pub const ACHIEVEMENT_REGISTRY: &[AchievementDef] = &[
    leveled(
        "followers",
        "Crowd Pleaser",
        "Gather followers on GitHub",
        AchievementCategory::Followers,
    ),
    leveled(
        "stars",
        "Star Gazer",
        "Collect stars across your repositories",
        AchievementCategory::Stars,
    ),
    leveled(
        "contributions",
        "Commit Machine",
        "Rack up contributions",
        AchievementCategory::Contributions,
    ),
    leveled(
        "streak",
        "On Fire",
        "Keep your longest contribution streak growing",
        AchievementCategory::Streak,
    ),
    leveled(
        "repositories",
        "Architect",
        "Publish repositories",
        AchievementCategory::Repositories,
    ),
    leveled(
        "issues",
        "Bug Hunter",
        "Open issues",
        AchievementCategory::Issues,
    ),
    leveled(
        "pull_requests",
        "Merge Master",
        "Open pull requests",
        AchievementCategory::PullRequests,
    ),
    leveled(
        "reviews",
        "Code Guardian",
        "Review pull requests",
        AchievementCategory::Reviews,
    ),
    leveled(
        "external_contributions",
        "Community Builder",
        "Contribute to repositories you do not own",
        AchievementCategory::ExternalContributions,
    ),
    leveled(
        "language_diversity",
        "Polyglot Path",
        "Ship code in more languages",
        AchievementCategory::LanguageDiversity,
    ),
    leveled(
        "account_age",
        "Veteran",
        "One level per year on GitHub",
        AchievementCategory::AccountAge,
    ),
    badge(
        "First Pull",
        "Opened a pull request",
        BadgeFlag::FirstPullRequest,
    ),
    badge(
        "Shipped It",
        "Got a pull request merged",
        BadgeFlag::FirstMergedPullRequest,
    ),
    badge("Reporter", "Opened an issue", BadgeFlag::FirstIssue),
    badge("Second Opinion", "Reviewed a pull request", BadgeFlag::FirstReview),
    badge(
        "Starstruck",
        "Collected 16 stars",
        BadgeFlag::PopularRepo,
    ),
    badge(
        "Polyglot",
        "Shipped code in 5 languages",
        BadgeFlag::Polyglot,
    ),
    badge(
        "Centurion",
        "Hit a 100 day contribution streak",
        BadgeFlag::CenturyStreak,
    ),
];
