use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use shared::{IntoEnumIterator, SessionType};
use tracing::{error, info, instrument, warn};

use crate::achievements::AchievementEngine;
use crate::db::types::{SessionRecord, UserRecord};
use crate::db::Store;
use crate::github_pull::{StatsError, StatsSource};
use crate::health_monitor::HealthMonitor;
use crate::leaderboard::LeaderboardRanker;
use crate::sessions::SessionScheduler;

/// Batch size and delay are GitHub rate-limit pacing, not a performance
/// knob.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300_000),
            batch_size: 5,
            batch_delay: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum UserOutcome {
    Updated,
    Skipped,
    Failed,
}

/// The single process-wide refresh loop: pulls every user's stats in
/// rate-limited batches, feeds the achievement engine and updates every
/// active leaderboard session.
pub struct BackgroundOrchestrator<S> {
    store: Arc<S>,
    source: Arc<dyn StatsSource>,
    achievements: AchievementEngine<S>,
    sessions: SessionScheduler<S>,
    ranker: LeaderboardRanker<S>,
    config: OrchestratorConfig,
    health: Option<Arc<HealthMonitor>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl<S> Clone for BackgroundOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: self.source.clone(),
            achievements: self.achievements.clone(),
            sessions: self.sessions.clone(),
            ranker: self.ranker.clone(),
            config: self.config.clone(),
            health: self.health.clone(),
            running: self.running.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<S: Store> BackgroundOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        source: Arc<dyn StatsSource>,
        config: OrchestratorConfig,
        health: Option<Arc<HealthMonitor>>,
    ) -> Self {
        Self {
            achievements: AchievementEngine::new(store.clone()),
            sessions: SessionScheduler::new(store.clone()),
            ranker: LeaderboardRanker::new(store.clone()),
            store,
            source,
            config,
            health,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(orchestrator.config.interval);
            while !orchestrator.stop.load(Ordering::Relaxed) {
                interval.tick().await;
                if let Some(health) = &orchestrator.health {
                    health.im_alive("background-update");
                }
                match orchestrator.run_once().await {
                    Ok(Some(summary)) => info!(
                        "Background update finished: {}/{} updated, {} skipped, {} failed",
                        summary.updated, summary.total, summary.skipped, summary.failed
                    ),
                    Ok(None) => {}
                    Err(e) => error!("Background update failed: {e:#}"),
                }
            }
        });
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Runs one full pass over all users. Returns `None` when another run
    /// is already in flight; overlapping invocations are no-ops, never
    /// queued.
    pub async fn run_once(&self) -> anyhow::Result<Option<RunSummary>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Background update already in progress, skipping this trigger");
            return Ok(None);
        }
        let result = self.run_users().await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    #[instrument(skip(self))]
    async fn run_users(&self) -> anyhow::Result<RunSummary> {
        let users = self.store.get_users().await?;

        let mut sessions = Vec::new();
        for session_type in SessionType::iter() {
            sessions.push(self.sessions.ensure_active_session(session_type).await?);
        }

        let mut summary = RunSummary {
            total: users.len(),
            ..Default::default()
        };
        for (index, batch) in users.chunks(self.config.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            // Fire the whole batch, await the whole batch; the rows
            // re-derive their own consistency on write.
            let outcomes =
                join_all(batch.iter().map(|user| self.process_user(user, &sessions))).await;
            for outcome in outcomes {
                match outcome {
                    UserOutcome::Updated => summary.updated += 1,
                    UserOutcome::Skipped => summary.skipped += 1,
                    UserOutcome::Failed => summary.failed += 1,
                }
            }
        }
        Ok(summary)
    }

    async fn process_user(&self, user: &UserRecord, sessions: &[SessionRecord]) -> UserOutcome {
        let snapshot = match self.source.fetch_user_stats(&user.login).await {
            Ok(snapshot) => snapshot,
            Err(StatsError::MissingCredentials) => {
                error!("No GitHub credentials available to refresh {}", user.login);
                return UserOutcome::Failed;
            }
            Err(e) => {
                warn!("Skipping {} this round: {e:#}", user.login);
                return UserOutcome::Skipped;
            }
        };

        if let Err(e) = self.store.upsert_github_stats(user.id, &snapshot).await {
            error!("Failed to store stats for {}: {e:#}", user.login);
            return UserOutcome::Failed;
        }
        if let Err(e) = self.achievements.evaluate(user.id).await {
            error!("Failed to evaluate achievements for {}: {e:#}", user.login);
            return UserOutcome::Failed;
        }

        for session in sessions {
            let Some(session_type) = SessionType::from_str(&session.session_type) else {
                warn!("Unknown session type {} in storage", session.session_type);
                continue;
            };
            let commits = snapshot.contributions_for(session_type);
            if let Err(e) = self
                .ranker
                .upsert_entry(user.id, session, commits, snapshot.points())
                .await
            {
                error!(
                    "Failed to update {} leaderboard for {}: {e:#}",
                    session.session_type, user.login
                );
                return UserOutcome::Failed;
            }
        }
        UserOutcome::Updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::types::RankMetric;
    use async_trait::async_trait;
    use chrono::Utc;
    use shared::UserStatsSnapshot;

    struct FakeStatsSource {
        failing_login: Option<String>,
    }

    #[async_trait]
    impl StatsSource for FakeStatsSource {
        async fn fetch_user_stats(&self, login: &str) -> Result<UserStatsSnapshot, StatsError> {
            if self.failing_login.as_deref() == Some(login) {
                return Err(StatsError::Other(anyhow::anyhow!("rate limited")));
            }
            Ok(UserStatsSnapshot {
                contributions_today: 1,
                contributions_this_week: 2,
                contributions_this_month: 3,
                contributions_this_year: 4,
                total_contributions: login.len() as u32 * 10,
                total_prs: 2,
                merged_prs: 1,
                fetched_at: Utc::now(),
                ..Default::default()
            })
        }
    }

    struct NoCredentialsSource;

    #[async_trait]
    impl StatsSource for NoCredentialsSource {
        async fn fetch_user_stats(&self, _login: &str) -> Result<UserStatsSnapshot, StatsError> {
            Err(StatsError::MissingCredentials)
        }
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        source: Arc<dyn StatsSource>,
    ) -> BackgroundOrchestrator<MemoryStore> {
        let config = OrchestratorConfig {
            interval: Duration::from_millis(50),
            batch_size: 2,
            batch_delay: Duration::from_millis(1),
        };
        BackgroundOrchestrator::new(store, source, config, None)
    }

    #[tokio::test]
    async fn a_full_run_updates_stats_achievements_and_all_session_types() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.upsert_user("alice").await.expect("user");
        store.upsert_user("bob").await.expect("user");
        let orchestrator = orchestrator(store.clone(), Arc::new(FakeStatsSource {
            failing_login: None,
        }));

        let summary = orchestrator
            .run_once()
            .await
            .expect("run")
            .expect("not skipped");
        assert_eq!(summary.total, 2);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 0);

        assert!(store
            .get_github_stats(alice)
            .await
            .expect("stats")
            .is_some());
        assert!(!store
            .get_user_achievements(alice)
            .await
            .expect("achievements")
            .is_empty());

        for session_type in SessionType::iter() {
            let sessions = store
                .get_active_sessions(session_type.as_str())
                .await
                .expect("sessions");
            assert_eq!(sessions.len(), 1, "{} session missing", session_type.as_str());
            let (entries, total) = store
                .get_session_entries(sessions[0].id, RankMetric::Commits, 0, 10)
                .await
                .expect("entries");
            assert_eq!(total, 2);
            assert!(entries.iter().all(|e| e.rank.is_some()));
        }
    }

    #[tokio::test]
    async fn one_failing_user_does_not_abort_the_batch() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("alice").await.expect("user");
        store.upsert_user("broken").await.expect("user");
        let carol = store.upsert_user("carol").await.expect("user");
        let orchestrator = orchestrator(store.clone(), Arc::new(FakeStatsSource {
            failing_login: Some("broken".to_string()),
        }));

        let summary = orchestrator
            .run_once()
            .await
            .expect("run")
            .expect("not skipped");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.skipped, 1);

        // The user after the failing one still got processed.
        assert!(store
            .get_github_stats(carol)
            .await
            .expect("stats")
            .is_some());
    }

    #[tokio::test]
    async fn missing_credentials_count_as_errors_not_skips() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("alice").await.expect("user");
        let orchestrator = orchestrator(store.clone(), Arc::new(NoCredentialsSource));

        let summary = orchestrator
            .run_once()
            .await
            .expect("run")
            .expect("not skipped");
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn an_overlapping_run_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("alice").await.expect("user");
        let orchestrator = orchestrator(store, Arc::new(FakeStatsSource {
            failing_login: None,
        }));

        orchestrator.running.store(true, Ordering::SeqCst);
        let result = orchestrator.run_once().await.expect("run");
        assert!(result.is_none(), "overlapping run must be skipped");

        orchestrator.running.store(false, Ordering::SeqCst);
        assert!(orchestrator.run_once().await.expect("run").is_some());
    }

    #[tokio::test]
    async fn second_run_refreshes_rather_than_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.upsert_user("alice").await.expect("user");
        let orchestrator = orchestrator(store.clone(), Arc::new(FakeStatsSource {
            failing_login: None,
        }));

        orchestrator.run_once().await.expect("first run");
        orchestrator.run_once().await.expect("second run");

        let sessions = store.get_active_sessions("daily").await.expect("sessions");
        assert_eq!(sessions.len(), 1);
        let (_, total) = store
            .get_session_entries(sessions[0].id, RankMetric::Commits, 0, 10)
            .await
            .expect("entries");
        assert_eq!(total, 1);
        assert!(store
            .get_user_entry(alice, sessions[0].id)
            .await
            .expect("entry")
            .is_some());
    }
}
