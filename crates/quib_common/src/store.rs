//! SQLite-backed persistence for users, creatures, activity history and
//! token claims.
//!
//! Single connection behind a mutex; every multi-row mutation runs inside
//! a transaction. The stage transition write is conditioned on the stage
//! value the caller last read, so two racing advances cannot both apply.

use crate::error::{QuibError, Result};
use crate::personality::{PersonalityProfile, VisualTraits};
use crate::stages::EvolutionStage;
use crate::types::{
    Creature, ConversationRecord, EngagementLevel, EvolutionLogEntry, TaskRecord, TaskType,
    TokenClaim, User,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QuibError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| QuibError::Storage(format!("open {}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QuibError::Storage(format!("open in-memory db: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement; nothing to salvage.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                username TEXT UNIQUE,
                wallet TEXT UNIQUE,
                password_hash TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS creatures (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                current_stage TEXT NOT NULL,
                mood_score REAL NOT NULL DEFAULT 50.0,
                xp INTEGER NOT NULL DEFAULT 0,
                last_evolution TEXT,
                personality TEXT NOT NULL,
                visual_traits TEXT NOT NULL,
                user_keywords TEXT NOT NULL DEFAULT '[]',
                daily_chat_count INTEGER NOT NULL DEFAULT 0,
                total_chats INTEGER NOT NULL DEFAULT 0,
                missed_days INTEGER NOT NULL DEFAULT 0,
                last_chat_date TEXT,
                engagement_level TEXT NOT NULL DEFAULT 'medium',
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                task_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                response TEXT NOT NULL,
                sentiment_score REAL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS evolution_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                from_stage TEXT NOT NULL,
                to_stage TEXT NOT NULL,
                reason TEXT NOT NULL,
                date TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS token_claims (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                claimed INTEGER NOT NULL DEFAULT 0,
                claimed_at TEXT,
                tx_hash TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, task_type, completed);
            CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_evolution_log_user ON evolution_log(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_token_claims_user ON token_claims(user_id, claimed);
            "#,
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn create_user(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        password_hash: Option<&str>,
        wallet: Option<&str>,
    ) -> Result<User> {
        let conn = self.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (id, email, username, wallet, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, email, username, wallet, password_hash, now, now],
        )
        .map_err(map_account_conflict)?;

        Ok(User {
            id,
            email: email.map(str::to_string),
            username: username.map(str::to_string),
            wallet: wallet.map(str::to_string),
            password_hash: password_hash.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    /// Create an account together with its creature in one transaction.
    /// Signup never leaves an account behind without a creature; a
    /// failure on either insert rolls back both.
    pub fn create_account(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        password_hash: Option<&str>,
        wallet: Option<&str>,
        personality: &PersonalityProfile,
        visual_traits: &VisualTraits,
    ) -> Result<User> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(QuibError::from)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        tx.execute(
            "INSERT INTO users (id, email, username, wallet, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, email, username, wallet, password_hash, now, now],
        )
        .map_err(map_account_conflict)?;

        tx.execute(
            "INSERT INTO creatures (id, user_id, current_stage, mood_score, xp, personality, visual_traits, user_keywords)
             VALUES (?1, ?2, ?3, 50.0, 0, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                id,
                EvolutionStage::Hatchling.as_str(),
                serde_json::to_string(personality)?,
                serde_json::to_string(visual_traits)?,
                serde_json::to_string(&personality.user_keywords)?,
            ],
        )?;

        tx.commit().map_err(QuibError::from)?;

        Ok(User {
            id,
            email: email.map(str::to_string),
            username: username.map(str::to_string),
            wallet: wallet.map(str::to_string),
            password_hash: password_hash.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_user(&self, user_id: &str) -> Result<User> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, email, username, wallet, password_hash, created_at, updated_at
             FROM users WHERE id = ?1",
            params![user_id],
            user_from_row,
        )
        .optional()?
        .ok_or(QuibError::UserNotFound)
    }

    /// Look up an account by email or username, for login.
    pub fn find_user_by_identity(&self, identity: &str) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT id, email, username, wallet, password_hash, created_at, updated_at
                 FROM users WHERE email = ?1 OR username = ?1",
                params![identity],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_wallet(&self, wallet: &str) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT id, email, username, wallet, password_hash, created_at, updated_at
                 FROM users WHERE wallet = ?1",
                params![wallet],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Whether another account already holds the given email or username.
    pub fn identity_taken(
        &self,
        excluding_user: &str,
        email: Option<&str>,
        username: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users
             WHERE id != ?1
               AND ((?2 IS NOT NULL AND email = ?2) OR (?3 IS NOT NULL AND username = ?3))",
            params![excluding_user, email, username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn update_user_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
        username: Option<&str>,
    ) -> Result<User> {
        {
            let conn = self.lock();
            let changed = conn.execute(
                "UPDATE users SET
                     email = COALESCE(?2, email),
                     username = COALESCE(?3, username),
                     updated_at = ?4
                 WHERE id = ?1",
                params![user_id, email, username, Utc::now()],
            )?;
            if changed == 0 {
                return Err(QuibError::UserNotFound);
            }
        }
        self.get_user(user_id)
    }

    /// Rewrite an account's creation time. Admin/test fixture support;
    /// account age gates are derived from this value.
    pub fn set_user_created_at(&self, user_id: &str, when: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE users SET created_at = ?2 WHERE id = ?1",
            params![user_id, when],
        )?;
        if changed == 0 {
            return Err(QuibError::UserNotFound);
        }
        Ok(())
    }

    pub fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![user_id, password_hash, Utc::now()],
        )?;
        if changed == 0 {
            return Err(QuibError::UserNotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Creatures
    // ------------------------------------------------------------------

    /// Create the creature for a new account. Every account gets exactly
    /// one, starting as a Hatchling with neutral mood.
    pub fn create_creature(
        &self,
        user_id: &str,
        personality: &PersonalityProfile,
        visual_traits: &VisualTraits,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO creatures (id, user_id, current_stage, mood_score, xp, personality, visual_traits, user_keywords)
             VALUES (?1, ?2, ?3, 50.0, 0, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                EvolutionStage::Hatchling.as_str(),
                serde_json::to_string(personality)?,
                serde_json::to_string(visual_traits)?,
                serde_json::to_string(&personality.user_keywords)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_creature(&self, user_id: &str) -> Result<Creature> {
        let conn = self.lock();
        conn.query_row(
            "SELECT c.id, c.user_id, c.current_stage, c.mood_score, c.xp, c.last_evolution,
                    c.personality, c.visual_traits, c.user_keywords,
                    c.daily_chat_count, c.total_chats, c.missed_days, c.last_chat_date,
                    c.engagement_level, u.created_at
             FROM creatures c JOIN users u ON u.id = c.user_id
             WHERE c.user_id = ?1",
            params![user_id],
            creature_from_row,
        )
        .optional()?
        .ok_or(QuibError::CreatureNotFound)
    }

    pub fn set_mood(&self, user_id: &str, mood_score: f64) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET mood_score = ?2 WHERE user_id = ?1",
            params![user_id, mood_score],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    pub fn add_xp(&self, user_id: &str, amount: i64) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET xp = xp + ?2 WHERE user_id = ?1",
            params![user_id, amount],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    /// Administrative XP reset, the only path that lowers XP.
    pub fn reset_xp(&self, user_id: &str) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET xp = 0 WHERE user_id = ?1",
            params![user_id],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    pub fn set_personality(&self, user_id: &str, profile: &PersonalityProfile) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET personality = ?2 WHERE user_id = ?1",
            params![user_id, serde_json::to_string(profile)?],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    pub fn set_visual_traits(&self, user_id: &str, traits: &VisualTraits) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET visual_traits = ?2 WHERE user_id = ?1",
            params![user_id, serde_json::to_string(traits)?],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    /// Merge newly observed keywords into the creature's memory,
    /// deduplicated, keeping insertion order.
    pub fn merge_keywords(&self, user_id: &str, keywords: &[String]) -> Result<Vec<String>> {
        if keywords.is_empty() {
            return Ok(self.get_creature(user_id)?.user_keywords);
        }
        let mut merged = self.get_creature(user_id)?.user_keywords;
        for kw in keywords {
            if !merged.contains(kw) {
                merged.push(kw.clone());
            }
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE creatures SET user_keywords = ?2 WHERE user_id = ?1",
            params![user_id, serde_json::to_string(&merged)?],
        )?;
        Ok(merged)
    }

    pub fn update_engagement(
        &self,
        user_id: &str,
        daily_chat_count: i64,
        total_chats: i64,
        missed_days: i64,
        last_chat_date: NaiveDate,
        level: EngagementLevel,
    ) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE creatures SET daily_chat_count = ?2, total_chats = ?3, missed_days = ?4,
                    last_chat_date = ?5, engagement_level = ?6
             WHERE user_id = ?1",
            params![
                user_id,
                daily_chat_count,
                total_chats,
                missed_days,
                last_chat_date,
                level.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(QuibError::CreatureNotFound);
        }
        Ok(())
    }

    /// Apply a stage transition atomically: stage mutation, history append
    /// and reward creation commit together or not at all.
    ///
    /// The stage update is conditioned on `expected_stage`, the value the
    /// caller read before deciding to advance. A concurrent advance that
    /// won the race leaves the row at a different stage and this call
    /// fails with `ConcurrentModification` without touching anything.
    pub fn apply_transition(
        &self,
        user_id: &str,
        expected_stage: EvolutionStage,
        next_stage: EvolutionStage,
        xp_bonus: i64,
        reason: &str,
        reward_amount: u64,
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(QuibError::from)?;
        let now = Utc::now();

        let changed = tx.execute(
            "UPDATE creatures
             SET current_stage = ?3, last_evolution = ?4, xp = xp + ?5
             WHERE user_id = ?1 AND current_stage = ?2",
            params![
                user_id,
                expected_stage.as_str(),
                next_stage.as_str(),
                now,
                xp_bonus
            ],
        )?;

        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM creatures WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(if exists.is_some() {
                QuibError::ConcurrentModification
            } else {
                QuibError::CreatureNotFound
            });
        }

        tx.execute(
            "INSERT INTO evolution_log (user_id, from_stage, to_stage, reason, date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                expected_stage.as_str(),
                next_stage.as_str(),
                reason,
                now
            ],
        )?;

        if reward_amount > 0 {
            tx.execute(
                "INSERT INTO token_claims (id, user_id, amount, claimed, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    reward_amount as i64,
                    now
                ],
            )?;
        }

        tx.commit().map_err(QuibError::from)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Record a completed task. Submissions are completions; there is no
    /// pending-task state.
    pub fn create_task(
        &self,
        user_id: &str,
        task_type: TaskType,
        title: &str,
        description: Option<&str>,
    ) -> Result<TaskRecord> {
        let conn = self.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO tasks (id, user_id, task_type, title, description, completed, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![id, user_id, task_type.as_str(), title, description, now],
        )?;
        Ok(TaskRecord {
            id,
            user_id: user_id.to_string(),
            task_type,
            title: title.to_string(),
            description: description.map(str::to_string),
            completed: true,
            completed_at: Some(now),
            created_at: now,
        })
    }

    pub fn count_completed_tasks(&self, user_id: &str, task_type: TaskType) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ?1 AND task_type = ?2 AND completed = 1",
            params![user_id, task_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_tasks(&self, user_id: &str, page: u32, limit: u32) -> Result<(Vec<TaskRecord>, i64)> {
        let conn = self.lock();
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, task_type, title, description, completed, completed_at, created_at
             FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let tasks = stmt
            .query_map(params![user_id, limit as i64, offset], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok((tasks, total))
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub fn create_conversation(
        &self,
        user_id: &str,
        message: &str,
        response: &str,
        sentiment_score: Option<f64>,
    ) -> Result<ConversationRecord> {
        let conn = self.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO conversations (id, user_id, message, response, sentiment_score, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, user_id, message, response, sentiment_score, now],
        )?;
        Ok(ConversationRecord {
            id,
            user_id: user_id.to_string(),
            message: message.to_string(),
            response: response.to_string(),
            sentiment_score,
            timestamp: now,
        })
    }

    pub fn count_conversations(&self, user_id: &str) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Most recent conversations, newest first.
    pub fn recent_conversations(&self, user_id: &str, n: u32) -> Result<Vec<ConversationRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, message, response, sentiment_score, timestamp
             FROM conversations WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, n as i64], conversation_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_conversations(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<ConversationRecord>, i64)> {
        let conn = self.lock();
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, message, response, sentiment_score, timestamp
             FROM conversations WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64, offset], conversation_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok((rows, total))
    }

    /// Average sentiment over the `n` most recent scored conversations.
    /// None when the creature has never been chatted with.
    pub fn average_recent_sentiment(&self, user_id: &str, n: u32) -> Result<Option<f64>> {
        let conn = self.lock();
        let avg = conn.query_row(
            "SELECT AVG(sentiment_score) FROM (
                 SELECT sentiment_score FROM conversations
                 WHERE user_id = ?1 AND sentiment_score IS NOT NULL
                 ORDER BY timestamp DESC LIMIT ?2
             )",
            params![user_id, n as i64],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    // ------------------------------------------------------------------
    // Evolution history
    // ------------------------------------------------------------------

    pub fn list_evolution_log(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<EvolutionLogEntry>, i64)> {
        let conn = self.lock();
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, from_stage, to_stage, reason, date
             FROM evolution_log WHERE user_id = ?1 ORDER BY date DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64, offset], evolution_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total = conn.query_row(
            "SELECT COUNT(*) FROM evolution_log WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok((rows, total))
    }

    // ------------------------------------------------------------------
    // Token claims
    // ------------------------------------------------------------------

    pub fn pending_claims(&self, user_id: &str) -> Result<Vec<TokenClaim>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, amount, claimed, claimed_at, tx_hash, created_at
             FROM token_claims WHERE user_id = ?1 AND claimed = 0 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], claim_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn total_claimable(&self, user_id: &str) -> Result<u64> {
        let conn = self.lock();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM token_claims WHERE user_id = ?1 AND claimed = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    pub fn claim_history(&self, user_id: &str) -> Result<Vec<TokenClaim>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, amount, claimed, claimed_at, tx_hash, created_at
             FROM token_claims WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], claim_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark a claim settled. A claim that has already been processed is
    /// immutable; re-claims are refused, as is processing someone else's
    /// claim.
    pub fn process_claim(&self, claim_id: &str, user_id: &str, tx_hash: &str) -> Result<TokenClaim> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(QuibError::from)?;

        let claim = tx
            .query_row(
                "SELECT id, user_id, amount, claimed, claimed_at, tx_hash, created_at
                 FROM token_claims WHERE id = ?1",
                params![claim_id],
                claim_from_row,
            )
            .optional()?
            .ok_or(QuibError::ClaimNotFound)?;

        if claim.user_id != user_id {
            return Err(QuibError::ClaimNotFound);
        }
        if claim.claimed {
            return Err(QuibError::ClaimAlreadyProcessed);
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE token_claims SET claimed = 1, claimed_at = ?2, tx_hash = ?3
             WHERE id = ?1 AND claimed = 0",
            params![claim_id, now, tx_hash],
        )?;
        tx.commit().map_err(QuibError::from)?;

        Ok(TokenClaim {
            claimed: true,
            claimed_at: Some(now),
            tx_hash: Some(tx_hash.to_string()),
            ..claim
        })
    }
}

fn map_account_conflict(e: rusqlite::Error) -> QuibError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            QuibError::DuplicateAccount("email, username or wallet already registered".to_string())
        }
        other => other.into(),
    }
}

// ----------------------------------------------------------------------
// Row mappers
// ----------------------------------------------------------------------

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        wallet: row.get(3)?,
        password_hash: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn creature_from_row(row: &Row<'_>) -> rusqlite::Result<Creature> {
    let stage: String = row.get(2)?;
    let personality: String = row.get(6)?;
    let visual_traits: String = row.get(7)?;
    let keywords: String = row.get(8)?;
    let engagement: String = row.get(13)?;
    Ok(Creature {
        id: row.get(0)?,
        user_id: row.get(1)?,
        current_stage: stage.parse().unwrap_or(EvolutionStage::Hatchling),
        mood_score: row.get(3)?,
        xp: row.get(4)?,
        last_evolution: row.get(5)?,
        personality: serde_json::from_str(&personality).unwrap_or(serde_json::Value::Null),
        visual_traits: serde_json::from_str(&visual_traits).unwrap_or(serde_json::Value::Null),
        user_keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        daily_chat_count: row.get(9)?,
        total_chats: row.get(10)?,
        missed_days: row.get(11)?,
        last_chat_date: row.get(12)?,
        engagement_level: engagement.parse().unwrap_or(EngagementLevel::Medium),
        owner_created_at: row.get(14)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let task_type: String = row.get(2)?;
    Ok(TaskRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_type: task_type.parse().unwrap_or(TaskType::Custom),
        title: row.get(3)?,
        description: row.get(4)?,
        completed: row.get(5)?,
        completed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRecord> {
    Ok(ConversationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        response: row.get(3)?,
        sentiment_score: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn evolution_from_row(row: &Row<'_>) -> rusqlite::Result<EvolutionLogEntry> {
    let from: String = row.get(2)?;
    let to: String = row.get(3)?;
    Ok(EvolutionLogEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        from_stage: from.parse().unwrap_or(EvolutionStage::Egg),
        to_stage: to.parse().unwrap_or(EvolutionStage::Egg),
        reason: row.get(4)?,
        date: row.get(5)?,
    })
}

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<TokenClaim> {
    let amount: i64 = row.get(2)?;
    Ok(TokenClaim {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: amount.max(0) as u64,
        claimed: row.get(3)?,
        claimed_at: row.get(4)?,
        tx_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}
