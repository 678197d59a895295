use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{AchievementDef, UserStatsSnapshot};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::instrument;

use crate::types::RankMetric;

pub mod memory;
pub mod types;

use types::{
    AchievementRow, EntryRecord, NewSession, RankedEntryRecord, SessionRecord, StatsRecord,
    UserAchievementRecord, UserRecord,
};

/// The narrow repository interface the engines are written against. The
/// relational store is the sole synchronization point: every invariant is
/// carried by a unique constraint plus idempotent upsert-and-repair, never
/// by in-process locks.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn upsert_user(&self, login: &str) -> anyhow::Result<i64>;
    async fn get_users(&self) -> anyhow::Result<Vec<UserRecord>>;

    async fn get_github_stats(&self, user_id: i64)
        -> anyhow::Result<Option<UserStatsSnapshot>>;
    async fn upsert_github_stats(
        &self,
        user_id: i64,
        snapshot: &UserStatsSnapshot,
    ) -> anyhow::Result<()>;

    async fn sync_achievement_definitions(&self, defs: &[AchievementDef]) -> anyhow::Result<()>;
    async fn get_all_achievements(&self) -> anyhow::Result<Vec<AchievementRow>>;
    async fn get_user_achievements(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Vec<UserAchievementRecord>>;
    async fn upsert_user_achievement(
        &self,
        user_id: i64,
        record: &UserAchievementRecord,
    ) -> anyhow::Result<()>;

    async fn get_active_sessions(&self, session_type: &str)
        -> anyhow::Result<Vec<SessionRecord>>;
    async fn create_session(&self, session: &NewSession) -> anyhow::Result<SessionRecord>;
    async fn deactivate_session(&self, session_id: i64) -> anyhow::Result<()>;
    async fn deactivate_sessions(&self, session_type: &str) -> anyhow::Result<u64>;
    async fn touch_session(
        &self,
        session_id: i64,
        last_update_at: DateTime<Utc>,
        next_update_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn upsert_leaderboard_entry(
        &self,
        user_id: i64,
        session_id: i64,
        commits: i64,
        score: i64,
    ) -> anyhow::Result<()>;
    /// Deletes every row for `(user_id, session_id)` beyond the most
    /// recently updated one. Structurally impossible to need given the
    /// unique constraint, but the write path refuses to tolerate more
    /// than one row silently.
    async fn dedupe_user_entries(&self, user_id: i64, session_id: i64) -> anyhow::Result<u64>;
    /// Deletes the user's entries under the same session type but a
    /// different (stale) session.
    async fn prune_user_entries(
        &self,
        user_id: i64,
        session_type: &str,
        keep_session_id: i64,
    ) -> anyhow::Result<u64>;
    async fn delete_entries_for_session(&self, session_id: i64) -> anyhow::Result<u64>;
    /// Reassigns `rank = 1..N` for the whole session in one atomic bulk
    /// update ordered by `(commits DESC, score DESC, updated_at ASC)`.
    async fn recompute_session_ranks(&self, session_id: i64) -> anyhow::Result<()>;
    async fn get_session_entries(
        &self,
        session_id: i64,
        metric: RankMetric,
        page: i64,
        limit: i64,
    ) -> anyhow::Result<(Vec<RankedEntryRecord>, i64)>;
    async fn get_user_entry(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> anyhow::Result<Option<EntryRecord>>;
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "id, session_type, session_key, start_date, end_date, is_active, \
     update_interval_minutes, last_update_at, next_update_at";

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn upsert_user(&self, login: &str) -> anyhow::Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (login)
            VALUES ($1)
            ON CONFLICT (login) DO UPDATE
            SET login = EXCLUDED.login
            RETURNING id
            "#,
        )
        .bind(login)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        Ok(
            sqlx::query_as::<_, UserRecord>("SELECT id, login FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn get_github_stats(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Option<UserStatsSnapshot>> {
        let record = sqlx::query_as::<_, StatsRecord>(
            r#"
            SELECT contributions_today, contributions_this_week, contributions_this_month,
                   contributions_this_year, total_contributions, total_stars, total_forks,
                   total_repositories, followers, current_streak, longest_streak, total_prs,
                   merged_prs, total_issues, total_reviews, external_contributions, languages,
                   account_created_at, fetched_at
            FROM github_stats
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[instrument(skip(self, snapshot))]
    async fn upsert_github_stats(
        &self,
        user_id: i64,
        snapshot: &UserStatsSnapshot,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO github_stats (user_id, contributions_today, contributions_this_week,
                contributions_this_month, contributions_this_year, total_contributions,
                total_stars, total_forks, total_repositories, followers, current_streak,
                longest_streak, total_prs, merged_prs, total_issues, total_reviews,
                external_contributions, languages, account_created_at, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20)
            ON CONFLICT (user_id) DO UPDATE
            SET contributions_today = EXCLUDED.contributions_today,
                contributions_this_week = EXCLUDED.contributions_this_week,
                contributions_this_month = EXCLUDED.contributions_this_month,
                contributions_this_year = EXCLUDED.contributions_this_year,
                total_contributions = EXCLUDED.total_contributions,
                total_stars = EXCLUDED.total_stars,
                total_forks = EXCLUDED.total_forks,
                total_repositories = EXCLUDED.total_repositories,
                followers = EXCLUDED.followers,
                current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                total_prs = EXCLUDED.total_prs,
                merged_prs = EXCLUDED.merged_prs,
                total_issues = EXCLUDED.total_issues,
                total_reviews = EXCLUDED.total_reviews,
                external_contributions = EXCLUDED.external_contributions,
                languages = EXCLUDED.languages,
                account_created_at = EXCLUDED.account_created_at,
                fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(user_id)
        .bind(snapshot.contributions_today as i32)
        .bind(snapshot.contributions_this_week as i32)
        .bind(snapshot.contributions_this_month as i32)
        .bind(snapshot.contributions_this_year as i32)
        .bind(snapshot.total_contributions as i32)
        .bind(snapshot.total_stars as i32)
        .bind(snapshot.total_forks as i32)
        .bind(snapshot.total_repositories as i32)
        .bind(snapshot.followers as i32)
        .bind(snapshot.current_streak as i32)
        .bind(snapshot.longest_streak as i32)
        .bind(snapshot.total_prs as i32)
        .bind(snapshot.merged_prs as i32)
        .bind(snapshot.total_issues as i32)
        .bind(snapshot.total_reviews as i32)
        .bind(snapshot.external_contributions as i32)
        .bind(snapshot.languages as i32)
        .bind(snapshot.account_created_at)
        .bind(snapshot.fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sync_achievement_definitions(&self, defs: &[AchievementDef]) -> anyhow::Result<()> {
        for def in defs {
            sqlx::query(
                r#"
                INSERT INTO achievements (key, name, description, kind, category)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (key) DO UPDATE
                SET name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    kind = EXCLUDED.kind,
                    category = EXCLUDED.category
                "#,
            )
            .bind(def.key)
            .bind(def.name)
            .bind(def.description)
            .bind(def.kind_str())
            .bind(def.category_key())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_all_achievements(&self) -> anyhow::Result<Vec<AchievementRow>> {
        Ok(sqlx::query_as::<_, AchievementRow>(
            "SELECT key, name, description, kind, category FROM achievements ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_user_achievements(
        &self,
        user_id: i64,
    ) -> anyhow::Result<Vec<UserAchievementRecord>> {
        Ok(sqlx::query_as::<_, UserAchievementRecord>(
            r#"
            SELECT achievement_key, level, value, next_requirement, progress, max_progress,
                   unlocked_at
            FROM user_achievements
            WHERE user_id = $1
            ORDER BY achievement_key
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self, record))]
    async fn upsert_user_achievement(
        &self,
        user_id: i64,
        record: &UserAchievementRecord,
    ) -> anyhow::Result<()> {
        // unlocked_at is set once on insert and never rewritten.
        sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_key, level, value,
                next_requirement, progress, max_progress, unlocked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, achievement_key) DO UPDATE
            SET level = EXCLUDED.level,
                value = EXCLUDED.value,
                next_requirement = EXCLUDED.next_requirement,
                progress = EXCLUDED.progress,
                max_progress = EXCLUDED.max_progress
            "#,
        )
        .bind(user_id)
        .bind(&record.achievement_key)
        .bind(record.level)
        .bind(record.value)
        .bind(record.next_requirement)
        .bind(record.progress)
        .bind(record.max_progress)
        .bind(record.unlocked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_active_sessions(
        &self,
        session_type: &str,
    ) -> anyhow::Result<Vec<SessionRecord>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM leaderboard_sessions \
             WHERE session_type = $1 AND is_active ORDER BY id DESC"
        );
        Ok(sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(session_type)
            .fetch_all(&self.pool)
            .await?)
    }

    #[instrument(skip(self, session), fields(session_key = %session.session_key))]
    async fn create_session(&self, session: &NewSession) -> anyhow::Result<SessionRecord> {
        // The session key is the unique identity of a contest window, so
        // two racing creators converge on the same row.
        let sql = format!(
            r#"
            INSERT INTO leaderboard_sessions (session_type, session_key, start_date, end_date,
                is_active, update_interval_minutes, last_update_at, next_update_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7)
            ON CONFLICT (session_key) DO UPDATE
            SET is_active = TRUE
            RETURNING {SESSION_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(&session.session_type)
            .bind(&session.session_key)
            .bind(session.start_date)
            .bind(session.end_date)
            .bind(session.update_interval_minutes)
            .bind(session.last_update_at)
            .bind(session.next_update_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn deactivate_session(&self, session_id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE leaderboard_sessions SET is_active = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_sessions(&self, session_type: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE leaderboard_sessions SET is_active = FALSE \
             WHERE session_type = $1 AND is_active",
        )
        .bind(session_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn touch_session(
        &self,
        session_id: i64,
        last_update_at: DateTime<Utc>,
        next_update_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE leaderboard_sessions SET last_update_at = $2, next_update_at = $3 \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(last_update_at)
        .bind(next_update_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_leaderboard_entry(
        &self,
        user_id: i64,
        session_id: i64,
        commits: i64,
        score: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries (user_id, session_id, commits, score, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (user_id, session_id) DO UPDATE
            SET commits = EXCLUDED.commits,
                score = EXCLUDED.score,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(commits)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dedupe_user_entries(&self, user_id: i64, session_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM leaderboard_entries
            WHERE user_id = $1 AND session_id = $2
              AND id <> (
                SELECT id FROM leaderboard_entries
                WHERE user_id = $1 AND session_id = $2
                ORDER BY updated_at DESC, id DESC
                LIMIT 1
              )
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_user_entries(
        &self,
        user_id: i64,
        session_type: &str,
        keep_session_id: i64,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM leaderboard_entries le
            USING leaderboard_sessions s
            WHERE le.session_id = s.id
              AND le.user_id = $1
              AND s.session_type = $2
              AND le.session_id <> $3
            "#,
        )
        .bind(user_id)
        .bind(session_type)
        .bind(keep_session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_entries_for_session(&self, session_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM leaderboard_entries WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn recompute_session_ranks(&self, session_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE leaderboard_entries AS le
            SET rank = ranked.new_rank
            FROM (
                SELECT id, ROW_NUMBER() OVER (
                    ORDER BY commits DESC, score DESC, updated_at ASC
                ) AS new_rank
                FROM leaderboard_entries
                WHERE session_id = $1
            ) AS ranked
            WHERE le.id = ranked.id
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session_entries(
        &self,
        session_id: i64,
        metric: RankMetric,
        page: i64,
        limit: i64,
    ) -> anyhow::Result<(Vec<RankedEntryRecord>, i64)> {
        let order = match metric {
            RankMetric::Commits => "e.commits DESC, e.score DESC, e.updated_at ASC",
            RankMetric::Score => "e.score DESC, e.commits DESC, e.updated_at ASC",
        };
        let sql = format!(
            "SELECT e.user_id, u.login, e.commits, e.score, e.rank, e.updated_at \
             FROM leaderboard_entries e \
             JOIN users u ON u.id = e.user_id \
             WHERE e.session_id = $1 \
             ORDER BY {order} \
             LIMIT $2 OFFSET $3"
        );
        let records = sqlx::query_as::<_, RankedEntryRecord>(&sql)
            .bind(session_id)
            .bind(limit)
            .bind(page * limit)
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leaderboard_entries WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((records, total))
    }

    async fn get_user_entry(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> anyhow::Result<Option<EntryRecord>> {
        Ok(sqlx::query_as::<_, EntryRecord>(
            r#"
            SELECT id, user_id, session_id, commits, score, rank, updated_at
            FROM leaderboard_entries
            WHERE user_id = $1 AND session_id = $2
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
