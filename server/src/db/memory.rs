use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use shared::{AchievementDef, UserStatsSnapshot};
use tokio::sync::Mutex;

use crate::types::RankMetric;

use super::types::{
    AchievementRow, EntryRecord, NewSession, RankedEntryRecord, SessionRecord, UserAchievementRecord,
    UserRecord,
};
use super::Store;

/// Map-backed [`Store`] with the same upsert-and-repair semantics as the
/// Postgres implementation. Backs the engine tests; no database required.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_session_id: i64,
    next_entry_id: i64,
    users: Vec<UserRecord>,
    stats: HashMap<i64, UserStatsSnapshot>,
    achievement_defs: Vec<AchievementRow>,
    user_achievements: HashMap<(i64, String), UserAchievementRecord>,
    sessions: Vec<SessionRecord>,
    entries: Vec<EntryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn canonical_order(a: &EntryRecord, b: &EntryRecord) -> std::cmp::Ordering {
    b.commits
        .cmp(&a.commits)
        .then(b.score.cmp(&a.score))
        .then(a.updated_at.cmp(&b.updated_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, login: &str) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.iter().find(|u| u.login == login) {
            return Ok(user.id);
        }
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.users.push(UserRecord {
            id,
            login: login.to_string(),
        });
        Ok(id)
    }

    async fn get_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        Ok(self.inner.lock().await.users.clone())
    }

    async fn get_github_stats(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Option<UserStatsSnapshot>> {
        Ok(self.inner.lock().await.stats.get(&user_id).cloned())
    }

    async fn upsert_github_stats(
        &self,
        user_id: i64,
        snapshot: &UserStatsSnapshot,
    ) -> anyhow::Result<()> {
        self.inner
            .lock()
            .await
            .stats
            .insert(user_id, snapshot.clone());
        Ok(())
    }

    async fn sync_achievement_definitions(&self, defs: &[AchievementDef]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        for def in defs {
            let row = AchievementRow {
                key: def.key.to_string(),
                name: def.name.to_string(),
                description: def.description.to_string(),
                kind: def.kind_str().to_string(),
                category: def.category_key().map(str::to_string),
            };
            match inner.achievement_defs.iter_mut().find(|r| r.key == row.key) {
                Some(existing) => *existing = row,
                None => inner.achievement_defs.push(row),
            }
        }
        Ok(())
    }

    async fn get_all_achievements(&self) -> anyhow::Result<Vec<AchievementRow>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .achievement_defs
            .iter()
            .cloned()
            .sorted_by(|a, b| a.key.cmp(&b.key))
            .collect())
    }

    async fn get_user_achievements(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Vec<UserAchievementRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .user_achievements
            .iter()
            .filter(|((id, _), _)| *id == user_id)
            .map(|(_, record)| record.clone())
            .sorted_by(|a, b| a.achievement_key.cmp(&b.achievement_key))
            .collect())
    }

    async fn upsert_user_achievement(
        &self,
        user_id: i64,
        record: &UserAchievementRecord,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let key = (user_id, record.achievement_key.clone());
        match inner.user_achievements.get_mut(&key) {
            Some(existing) => {
                let unlocked_at = existing.unlocked_at;
                *existing = record.clone();
                // unlocked_at survives updates, like the SQL upsert.
                existing.unlocked_at = unlocked_at;
            }
            None => {
                inner.user_achievements.insert(key, record.clone());
            }
        }
        Ok(())
    }

    async fn get_active_sessions(
        &self,
        session_type: &str,
    ) -> anyhow::Result<Vec<SessionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .iter()
            .filter(|s| s.session_type == session_type && s.is_active)
            .cloned()
            .sorted_by(|a, b| b.id.cmp(&a.id))
            .collect())
    }

    async fn create_session(&self, session: &NewSession) -> anyhow::Result<SessionRecord> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_key == session.session_key)
        {
            existing.is_active = true;
            return Ok(existing.clone());
        }
        inner.next_session_id += 1;
        let record = SessionRecord {
            id: inner.next_session_id,
            session_type: session.session_type.clone(),
            session_key: session.session_key.clone(),
            start_date: session.start_date,
            end_date: session.end_date,
            is_active: true,
            update_interval_minutes: session.update_interval_minutes,
            last_update_at: session.last_update_at,
            next_update_at: session.next_update_at,
        };
        inner.sessions.push(record.clone());
        Ok(record)
    }

    async fn deactivate_session(&self, session_id: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_sessions(&self, session_type: &str) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut deactivated = 0;
        for session in inner
            .sessions
            .iter_mut()
            .filter(|s| s.session_type == session_type && s.is_active)
        {
            session.is_active = false;
            deactivated += 1;
        }
        Ok(deactivated)
    }

    async fn touch_session(
        &self,
        session_id: i64,
        last_update_at: DateTime<Utc>,
        next_update_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.last_update_at = last_update_at;
            session.next_update_at = next_update_at;
        }
        Ok(())
    }

    async fn upsert_leaderboard_entry(
        &self,
        user_id: i64,
        session_id: i64,
        commits: i64,
        score: i64,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        if let Some(entry) = inner
            .entries
            .iter_mut()
            .find(|e| e.user_id == user_id && e.session_id == session_id)
        {
            entry.commits = commits;
            entry.score = score;
            entry.updated_at = now;
            return Ok(());
        }
        inner.next_entry_id += 1;
        let id = inner.next_entry_id;
        inner.entries.push(EntryRecord {
            id,
            user_id,
            session_id,
            commits,
            score,
            rank: None,
            updated_at: now,
        });
        Ok(())
    }

    async fn dedupe_user_entries(&self, user_id: i64, session_id: i64) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().await;
        let keep = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.session_id == session_id)
            .max_by_key(|e| (e.updated_at, e.id))
            .map(|e| e.id);
        let Some(keep) = keep else { return Ok(0) };
        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| !(e.user_id == user_id && e.session_id == session_id && e.id != keep));
        Ok((before - inner.entries.len()) as u64)
    }

    async fn prune_user_entries(
        &self,
        user_id: i64,
        session_type: &str,
        keep_session_id: i64,
    ) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().await;
        let same_type: Vec<i64> = inner
            .sessions
            .iter()
            .filter(|s| s.session_type == session_type)
            .map(|s| s.id)
            .collect();
        let before = inner.entries.len();
        inner.entries.retain(|e| {
            !(e.user_id == user_id
                && e.session_id != keep_session_id
                && same_type.contains(&e.session_id))
        });
        Ok((before - inner.entries.len()) as u64)
    }

    async fn delete_entries_for_session(&self, session_id: i64) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.session_id != session_id);
        Ok((before - inner.entries.len()) as u64)
    }

    async fn recompute_session_ranks(&self, session_id: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let ranked: Vec<i64> = inner
            .entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .sorted_by(|a, b| canonical_order(a, b))
            .map(|e| e.id)
            .collect();
        for (position, id) in ranked.into_iter().enumerate() {
            if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) {
                entry.rank = Some(position as i32 + 1);
            }
        }
        Ok(())
    }

    async fn get_session_entries(
        &self,
        session_id: i64,
        metric: RankMetric,
        page: i64,
        limit: i64,
    ) -> anyhow::Result<(Vec<RankedEntryRecord>, i64)> {
        let inner = self.inner.lock().await;
        let logins: HashMap<i64, String> = inner
            .users
            .iter()
            .map(|u| (u.id, u.login.clone()))
            .collect();
        let all: Vec<&EntryRecord> = inner
            .entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .sorted_by(|a, b| match metric {
                RankMetric::Commits => canonical_order(a, b),
                RankMetric::Score => b
                    .score
                    .cmp(&a.score)
                    .then(b.commits.cmp(&a.commits))
                    .then(a.updated_at.cmp(&b.updated_at)),
            })
            .collect();
        let total = all.len() as i64;
        let records = all
            .into_iter()
            .skip((page * limit).max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|e| RankedEntryRecord {
                user_id: e.user_id,
                login: logins.get(&e.user_id).cloned().unwrap_or_default(),
                commits: e.commits,
                score: e.score,
                rank: e.rank,
                updated_at: e.updated_at,
            })
            .collect();
        Ok((records, total))
    }

    async fn get_user_entry(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> anyhow::Result<Option<EntryRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .find(|e| e.user_id == user_id && e.session_id == session_id)
            .cloned())
    }
}
