use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use shared::{AchievementKind, UserStatsSnapshot, ACHIEVEMENT_REGISTRY};
use tracing::{debug, instrument};

use crate::db::types::UserAchievementRecord;
use crate::db::Store;

/// Emitted the first time a progress record is created for a user. Later
/// level-ups are silent in-place updates, not new unlock events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockedAchievement {
    pub key: String,
    pub name: String,
    pub level: u32,
}

pub struct AchievementEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for AchievementEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> AchievementEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Mirrors the static registry into storage so definitions can be
    /// listed alongside user progress.
    pub async fn sync_registry(&self) -> anyhow::Result<()> {
        self.store
            .sync_achievement_definitions(ACHIEVEMENT_REGISTRY)
            .await
    }

    /// Recomputes every category and badge for one user against their
    /// latest stats snapshot. A user without a snapshot has nothing to
    /// evaluate; that is not an error.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, user_id: i64) -> anyhow::Result<Vec<UnlockedAchievement>> {
        let Some(stats) = self.store.get_github_stats(user_id).await? else {
            debug!("No stats snapshot for user {user_id}, skipping achievement evaluation");
            return Ok(Vec::new());
        };

        let existing: HashMap<String, UserAchievementRecord> = self
            .store
            .get_user_achievements(user_id)
            .await?
            .into_iter()
            .map(|record| (record.achievement_key.clone(), record))
            .collect();

        let mut unlocked = Vec::new();
        for def in ACHIEVEMENT_REGISTRY {
            match def.kind {
                AchievementKind::Leveled { category } => {
                    let record = leveled_record(def.key, category, &stats, existing.get(def.key));
                    let level = record.level as u32;
                    self.store.upsert_user_achievement(user_id, &record).await?;
                    if !existing.contains_key(def.key) {
                        // A fresh progress record counts as unlocked right
                        // away, even at level 0.
                        unlocked.push(UnlockedAchievement {
                            key: def.key.to_string(),
                            name: def.name.to_string(),
                            level,
                        });
                    }
                }
                AchievementKind::Badge { flag } => {
                    if existing.contains_key(def.key) || !flag.is_satisfied(&stats) {
                        continue;
                    }
                    let record = UserAchievementRecord {
                        achievement_key: def.key.to_string(),
                        level: 1,
                        value: 1,
                        next_requirement: 0,
                        progress: 1,
                        max_progress: 1,
                        unlocked_at: stats.fetched_at,
                    };
                    self.store.upsert_user_achievement(user_id, &record).await?;
                    unlocked.push(UnlockedAchievement {
                        key: def.key.to_string(),
                        name: def.name.to_string(),
                        level: 1,
                    });
                }
            }
        }

        if !unlocked.is_empty() {
            debug!("User {user_id} unlocked {} achievements", unlocked.len());
        }
        Ok(unlocked)
    }
}

/// The record is a cache of a pure function of `value`: level, requirement
/// and progress are all recomputed from the metric on every pass.
fn leveled_record(
    key: &str,
    category: shared::AchievementCategory,
    stats: &UserStatsSnapshot,
    existing: Option<&UserAchievementRecord>,
) -> UserAchievementRecord {
    let scale = category.scale();
    let value = category.metric_value(stats);
    let progress = scale.progress(value);
    UserAchievementRecord {
        achievement_key: key.to_string(),
        level: progress.level as i32,
        value: value as i64,
        next_requirement: scale.requirement_for_level(progress.level + 1) as i64,
        progress: progress.progress as i64,
        max_progress: (progress.progress + progress.remaining) as i64,
        unlocked_at: existing.map(|r| r.unlocked_at).unwrap_or(stats.fetched_at),
    }
}
