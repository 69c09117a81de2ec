//! SQLite-backed word and history store
//!
//! The adapter owns schema creation and the handful of queries the game
//! needs: pick a word, list every candidate for AI scoring, append one
//! history record per player per round, and read a player's recent records
//! back. Stroke telemetry is written here too but never read by the server.
//!
//! History persistence is best-effort: a failed insert is logged by the
//! caller and never affects the round outcome.

use log::warn;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Fallback word when the store is empty or unreadable.
const DEFAULT_WORD: &str = "apple";

/// Starter dictionary installed on first launch.
const SEED_WORDS: [&str; 15] = [
    "apple",
    "banana",
    "watermelon",
    "car",
    "mouse",
    "computer",
    "ocean",
    "mountain",
    "sun",
    "moon",
    "house",
    "tree",
    "dog",
    "cat",
    "bird",
];

/// One row of a player's game history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub game_id: i32,
    pub word: String,
    pub user_guess: String,
    pub game_time: String,
}

#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Opens (creating if missing) the database file and prepares the schema.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.init_schema().await?;
        Ok(repo)
    }

    /// In-memory database for tests. Single connection, since each SQLite
    /// `:memory:` connection is its own database.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.init_schema().await?;
        Ok(repo)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word TEXT UNIQUE NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS history (
                record_id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER,
                word TEXT,
                username TEXT,
                user_guess TEXT,
                game_time TEXT)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS drawing_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER,
                x INTEGER,
                y INTEGER,
                action INTEGER,
                color_r INTEGER,
                color_g INTEGER,
                color_b INTEGER,
                timestamp INTEGER)",
        )
        .execute(&self.pool)
        .await?;

        let count: i64 = sqlx::query("SELECT count(*) FROM words")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if count == 0 {
            for word in SEED_WORDS {
                sqlx::query("INSERT INTO words (word) VALUES (?)")
                    .bind(word)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Picks a uniformly random dictionary word, falling back to a fixed
    /// default when the table is empty or the query fails.
    pub async fn pick_word(&self) -> String {
        let row = sqlx::query("SELECT word FROM words ORDER BY RANDOM() LIMIT 1")
            .fetch_optional(&self.pool)
            .await;
        match row {
            Ok(Some(row)) => row.get(0),
            Ok(None) => DEFAULT_WORD.to_string(),
            Err(e) => {
                warn!("Word lookup failed, using default: {}", e);
                DEFAULT_WORD.to_string()
            }
        }
    }

    /// Every dictionary word, for the AI candidate list.
    pub async fn list_candidates(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT word FROM words")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    /// Appends one per-player record for a finished round.
    pub async fn append_history(
        &self,
        game_id: i32,
        word: &str,
        nickname: &str,
        guess_or_role: &str,
        timestamp: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO history (game_id, word, username, user_guess, game_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(game_id)
        .bind(word)
        .bind(nickname)
        .bind(guess_or_role)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` records for a nickname, newest first.
    pub async fn list_history(
        &self,
        nickname: &str,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT game_id, word, user_guess, game_time FROM history
             WHERE username = ? ORDER BY record_id DESC LIMIT ?",
        )
        .bind(nickname)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| HistoryRecord {
                game_id: row.get(0),
                word: row.get(1),
                user_guess: row.get(2),
                game_time: row.get(3),
            })
            .collect())
    }

    /// Write-only stroke telemetry. Nothing reads this back.
    pub async fn append_drawing(
        &self,
        game_id: i32,
        x: u16,
        y: u16,
        action: u8,
        r: u8,
        g: u8,
        b: u8,
        timestamp: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO drawing_data (game_id, x, y, action, color_r, color_g, color_b, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game_id)
        .bind(i32::from(x))
        .bind(i32::from(y))
        .bind(i32::from(action))
        .bind(i32::from(r))
        .bind(i32::from(g))
        .bind(i32::from(b))
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
