//! SQLite memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::{MemoryBackend, MemoryRecord};

/// Agent memory store on a single SQLite connection.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
}

impl SqliteMemory {
    /// Open (and bootstrap) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| TroupeError::Memory(e.to_string()))?;
        Self::bootstrap(conn)
    }

    /// Fully in-memory store — used in tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| TroupeError::Memory(e.to_string()))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agent_memories (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_agent
                ON agent_memories (agent_id, created_at);",
        )
        .map_err(|e| TroupeError::Memory(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total stored memories across all agents.
    pub fn memory_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM agent_memories", [], |r| {
            r.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }
}

#[async_trait]
impl MemoryBackend for SqliteMemory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record(&self, agent_id: &str, content: &str, metadata: Value) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TroupeError::Memory(e.to_string()))?;
        conn.execute(
            "INSERT INTO agent_memories (id, agent_id, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                uuid::Uuid::new_v4().to_string(),
                agent_id,
                content,
                metadata.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| TroupeError::Memory(e.to_string()))?;
        Ok(())
    }

    async fn recent(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TroupeError::Memory(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, agent_id, content, metadata, created_at
                 FROM agent_memories
                 WHERE agent_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| TroupeError::Memory(e.to_string()))?;

        let rows = stmt
            .query_map(rusqlite::params![agent_id, limit as i64], |row| {
                let metadata: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(MemoryRecord {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    content: row.get(2)?,
                    metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
                    created_at: created_at
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| TroupeError::Memory(e.to_string()))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
