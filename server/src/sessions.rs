use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{IntoEnumIterator, SessionType};
use tracing::{error, info, instrument, warn};

use crate::db::types::{NewSession, SessionRecord};
use crate::db::Store;

/// Owns the lifecycle of leaderboard sessions: one active contest window
/// per cadence, rotated when its calendar period ends. There is no paused
/// state; stopping just halts the timers.
pub struct SessionScheduler<S> {
    store: Arc<S>,
    stop: Arc<AtomicBool>,
}

impl<S> Clone for SessionScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<S: Store> SessionScheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn ensure_active_session(
        &self,
        session_type: SessionType,
    ) -> anyhow::Result<SessionRecord> {
        self.ensure_active_session_at(session_type, Utc::now()).await
    }

    /// Returns the active session whose key matches the current period,
    /// repairing whatever it finds on the way: duplicate actives are
    /// deactivated, stale ones are rotated out (entries deleted), and a
    /// fresh session is created when none fits.
    ///
    /// Key mismatch doubles as the expiry check: a session whose key no
    /// longer matches `now` is necessarily past its end date, since both
    /// derive from the same UTC period.
    #[instrument(skip(self))]
    pub async fn ensure_active_session_at(
        &self,
        session_type: SessionType,
        now: DateTime<Utc>,
    ) -> anyhow::Result<SessionRecord> {
        let expected_key = session_type.session_key(now);
        let mut active = self.store.get_active_sessions(session_type.as_str()).await?;

        if let Some(position) = active.iter().position(|s| s.session_key == expected_key) {
            let current = active.swap_remove(position);
            for extra in active {
                warn!(
                    "Found duplicate active {} session {}, deactivating",
                    session_type.as_str(),
                    extra.session_key
                );
                self.retire(&extra).await?;
            }
            return Ok(current);
        }

        for stale in &active {
            info!(
                "Rotating out expired {} session {}",
                session_type.as_str(),
                stale.session_key
            );
            self.retire(stale).await?;
        }
        // Sweep anything that slipped in between the read and the writes.
        self.store
            .deactivate_sessions(session_type.as_str())
            .await?;

        let (start_date, end_date) = session_type.session_bounds(now);
        let interval = chrono::Duration::from_std(session_type.update_interval())?;
        let session = self
            .store
            .create_session(&NewSession {
                session_type: session_type.as_str().to_string(),
                session_key: expected_key,
                start_date,
                end_date,
                update_interval_minutes: session_type.update_interval_minutes() as i32,
                last_update_at: now,
                next_update_at: now + interval,
            })
            .await?;
        Ok(session)
    }

    /// Rotated-out entries are deleted, not archived: they hold per-period
    /// activity that must not leak into the next period's rankings.
    async fn retire(&self, session: &SessionRecord) -> anyhow::Result<()> {
        let removed = self.store.delete_entries_for_session(session.id).await?;
        self.store.deactivate_session(session.id).await?;
        if removed > 0 {
            info!(
                "Deleted {removed} leaderboard entries from retired session {}",
                session.session_key
            );
        }
        Ok(())
    }

    /// Timer body for one cadence: rotate if the period rolled over, then
    /// refresh ranks for the live session.
    pub async fn refresh(&self, session_type: SessionType) -> anyhow::Result<()> {
        let now = Utc::now();
        let session = self.ensure_active_session_at(session_type, now).await?;
        // Stale ranks are acceptable; a failed refresh must not unwind the
        // session rotation.
        if let Err(e) = self.store.recompute_session_ranks(session.id).await {
            error!(
                "Failed to recompute ranks for session {}: {e:#}",
                session.session_key
            );
        }
        let interval = chrono::Duration::from_std(session_type.update_interval())?;
        self.store
            .touch_session(session.id, now, now + interval)
            .await?;
        Ok(())
    }

    /// Spawns one refresh timer per cadence.
    pub fn start(&self) {
        for session_type in SessionType::iter() {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(session_type.update_interval());
                while !scheduler.stop.load(Ordering::Relaxed) {
                    interval.tick().await;
                    if let Err(e) = scheduler.refresh(session_type).await {
                        error!(
                            "Failed to refresh {} leaderboard session: {e:#}",
                            session_type.as_str()
                        );
                    }
                }
            });
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
