//! SQLite-backed store with vector recall.
//!
//! Two tables: `observations` (one row per record) and `obs_embeddings`
//! (one little-endian f32 BLOB per record, cascade-deleted). The database
//! is opened lazily with WAL journaling; new columns are added on open via
//! idempotent ALTER statements so old databases keep working.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Emotion, MemoryKind, MemoryRecord};
use crate::{EmbedFn, StoreError};

const BASE_DDL: &str = "
CREATE TABLE IF NOT EXISTS observations (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    direction TEXT NOT NULL DEFAULT 'unknown'
);
CREATE INDEX IF NOT EXISTS idx_obs_timestamp ON observations(timestamp);
CREATE INDEX IF NOT EXISTS idx_obs_date ON observations(date);

CREATE TABLE IF NOT EXISTS obs_embeddings (
    obs_id TEXT PRIMARY KEY REFERENCES observations(id) ON DELETE CASCADE,
    vector BLOB NOT NULL
);
";

// Columns added after the initial schema shipped. Applied unconditionally;
// a "duplicate column name" error means the column already exists.
const MIGRATION_COLUMNS: &[(&str, &str)] = &[
    ("kind", "TEXT NOT NULL DEFAULT 'observation'"),
    ("emotion", "TEXT NOT NULL DEFAULT 'neutral'"),
    ("image_path", "TEXT"),
    ("image_data", "TEXT"),
];

struct Inner {
    db_path: PathBuf,
    conn: Mutex<Option<Connection>>,
    embed: Mutex<Option<EmbedFn>>,
}

/// Handle to the observation memory. Cheap to clone; all clones share one
/// connection. Blocking SQL work is pushed onto the blocking pool by the
/// `*_async` wrappers so a save never stalls the agent loop.
#[derive(Clone)]
pub struct ObservationStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ObservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationStore")
            .field("db_path", &self.inner.db_path)
            .field(
                "has_embed_fn",
                &self.inner.embed.lock().map(|g| g.is_some()).unwrap_or(false),
            )
            .finish()
    }
}

impl ObservationStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(Inner {
                db_path: db_path.as_ref().to_path_buf(),
                conn: Mutex::new(None),
                embed: Mutex::new(None),
            }),
        }
    }

    /// Install the embedding backend. Without one, recall skips the vector
    /// tier and goes straight to substring/recency fallback.
    pub fn set_embed_fn(&self, f: EmbedFn) {
        info!("embedding backend configured");
        *self.inner.embed.lock().expect("embed lock") = Some(f);
    }

    fn embed(&self, prefixed: &str) -> Option<Vec<f32>> {
        let guard = self.inner.embed.lock().expect("embed lock");
        guard.as_ref().and_then(|f| f(prefixed))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.conn.lock().expect("conn lock");
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        f(guard.as_ref().expect("connection just opened"))
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.inner.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let conn = Connection::open_with_flags(
            &self.inner.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(BASE_DDL)?;
        for (name, decl) in MIGRATION_COLUMNS {
            let sql = format!("ALTER TABLE observations ADD COLUMN {name} {decl}");
            match conn.execute(&sql, []) {
                Ok(_) => debug!(column = name, "memory schema migrated"),
                Err(e) if e.to_string().contains("duplicate column") => {}
                Err(e) => return Err(e.into()),
            }
        }
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_obs_kind ON observations(kind)",
            [],
        )?;
        Ok(conn)
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Save one record and its embedding in a single transaction.
    pub fn save(
        &self,
        content: &str,
        direction: &str,
        kind: MemoryKind,
        emotion: Emotion,
        image_data: Option<&str>,
    ) -> Result<String, StoreError> {
        let vector = self.embed(&format!("passage: {content}"));
        let id = Uuid::new_v4().to_string();
        let now = Local::now();
        self.with_conn(|conn| {
            conn.execute("BEGIN IMMEDIATE", [])?;
            let result = (|| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO observations \
                     (id, content, timestamp, date, time, direction, kind, emotion, image_data) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id,
                        content,
                        now.to_rfc3339(),
                        now.format("%Y-%m-%d").to_string(),
                        now.format("%H:%M").to_string(),
                        direction,
                        kind.as_str(),
                        emotion.as_str(),
                        image_data,
                    ],
                )?;
                let blob = encode_vector(vector.as_deref().unwrap_or(&[]));
                conn.execute(
                    "INSERT INTO obs_embeddings (obs_id, vector) VALUES (?1, ?2)",
                    params![id, blob],
                )?;
                Ok(())
            })();
            match result {
                Ok(()) => {
                    conn.execute("COMMIT", [])?;
                    Ok(())
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    Err(e)
                }
            }
        })?;
        info!(content = %truncate(content, 60), kind = kind.as_str(), "saved memory");
        Ok(id)
    }

    /// Delete a record; the embedding goes with it via cascade.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM observations WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    pub fn count(&self) -> usize {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |r| r.get(0))?;
            Ok(n as usize)
        })
        .unwrap_or(0)
    }

    // ── Recall ────────────────────────────────────────────────────────────

    /// Semantic top-n recall with graceful degradation.
    ///
    /// Tier 1: cosine similarity over stored embeddings (ties by recency).
    /// Tier 2: substring match over whitespace tokens of length ≥ 2.
    /// Tier 3: the n most recent records.
    /// Scores are only set on the tier-1 path. Never raises.
    pub fn recall(&self, query: &str, n: usize, kind: Option<MemoryKind>) -> Vec<MemoryRecord> {
        if n == 0 {
            return Vec::new();
        }
        match self.recall_inner(query, n, kind) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "recall failed");
                Vec::new()
            }
        }
    }

    fn recall_inner(
        &self,
        query: &str,
        n: usize,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let query_vec = self.embed(&format!("query: {query}"));

        if let Some(qv) = query_vec {
            let mut scored = self.with_conn(|conn| {
                let kind_clause = kind_filter_sql(kind, "WHERE");
                let sql = format!(
                    "SELECT o.id, o.content, o.timestamp, o.date, o.time, o.direction, \
                            o.kind, o.emotion, o.image_data, e.vector \
                     FROM observations o JOIN obs_embeddings e ON o.id = e.obs_id {kind_clause}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    let blob: Vec<u8> = row.get(9)?;
                    Ok((row_to_record(row)?, decode_vector(&blob)))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    let (mut record, vector) = row?;
                    if vector.is_empty() || vector.len() != qv.len() {
                        continue;
                    }
                    record.score = Some(dot(&qv, &vector));
                    out.push(record);
                }
                Ok(out)
            })?;

            if !scored.is_empty() {
                // Similarity first; recency breaks ties.
                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.timestamp.cmp(&a.timestamp))
                });
                scored.truncate(n);
                return Ok(scored);
            }
        }

        // Tier 2: token substring match.
        let tokens: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.chars().count() >= 2)
            .take(4)
            .collect();
        if !tokens.is_empty() {
            let records = self.with_conn(|conn| {
                let like_clause = tokens
                    .iter()
                    .map(|_| "content LIKE ?")
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let kind_clause = kind_filter_sql(kind, "AND");
                let sql = format!(
                    "SELECT id, content, timestamp, date, time, direction, kind, emotion, image_data \
                     FROM observations WHERE ({like_clause}) {kind_clause} \
                     ORDER BY timestamp DESC LIMIT {n}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<String> = tokens.iter().map(|t| format!("%{t}%")).collect();
                let rows = stmt.query_map(
                    rusqlite::params_from_iter(params.iter()),
                    |row| row_to_record(row),
                )?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            })?;
            if !records.is_empty() {
                return Ok(records);
            }
        }

        // Tier 3: plain recency.
        self.most_recent(n, kind)
    }

    fn most_recent(
        &self,
        n: usize,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.with_conn(|conn| {
            let kind_clause = kind_filter_sql(kind, "WHERE");
            let sql = format!(
                "SELECT id, content, timestamp, date, time, direction, kind, emotion, image_data \
                 FROM observations {kind_clause} ORDER BY timestamp DESC LIMIT {n}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row_to_record(row))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
    }

    /// Most recent records whose kind is `feeling` or `conversation`.
    pub fn recent_feelings(&self, n: usize) -> Vec<MemoryRecord> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, content, timestamp, date, time, direction, kind, emotion, image_data \
                 FROM observations WHERE kind IN ('feeling', 'conversation') \
                 ORDER BY timestamp DESC LIMIT {n}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row_to_record(row))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
        .unwrap_or_default()
    }

    pub fn recall_self_model(&self, n: usize) -> Vec<MemoryRecord> {
        self.most_recent(n, Some(MemoryKind::SelfModel)).unwrap_or_default()
    }

    pub fn recall_curiosities(&self, n: usize) -> Vec<MemoryRecord> {
        self.most_recent(n, Some(MemoryKind::Curiosity)).unwrap_or_default()
    }

    // ── Async wrappers ────────────────────────────────────────────────────
    //
    // SQL and embedding both block; each call runs on the blocking pool so
    // the single logical agent loop stays responsive.

    pub async fn save_async(
        &self,
        content: String,
        direction: String,
        kind: MemoryKind,
        emotion: Emotion,
        image_data: Option<String>,
    ) -> Result<String, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.save(&content, &direction, kind, emotion, image_data.as_deref())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    pub async fn recall_async(
        &self,
        query: String,
        n: usize,
        kind: Option<MemoryKind>,
    ) -> Vec<MemoryRecord> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.recall(&query, n, kind))
            .await
            .unwrap_or_default()
    }

    pub async fn recent_feelings_async(&self, n: usize) -> Vec<MemoryRecord> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.recent_feelings(n))
            .await
            .unwrap_or_default()
    }

    pub async fn recall_self_model_async(&self, n: usize) -> Vec<MemoryRecord> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.recall_self_model(n))
            .await
            .unwrap_or_default()
    }

    pub async fn recall_curiosities_async(&self, n: usize) -> Vec<MemoryRecord> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.recall_curiosities(n))
            .await
            .unwrap_or_default()
    }
}

fn kind_filter_sql(kind: Option<MemoryKind>, prefix: &str) -> String {
    match kind {
        Some(k) => format!("{prefix} kind = '{}'", k.as_str()),
        None => String::new(),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MemoryRecord, rusqlite::Error> {
    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        timestamp: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        direction: row.get(5)?,
        kind: MemoryKind::parse(&row.get::<_, String>(6)?),
        emotion: Emotion::parse(&row.get::<_, String>(7)?),
        image_data: row.get(8)?,
        score: None,
    })
}

// ── Vector helpers ────────────────────────────────────────────────────────

fn encode_vector(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Vectors are unit length by the encoder contract, so the dot product is
/// the cosine similarity.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
