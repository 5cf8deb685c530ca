//! SQLite-backed chunk store
//!
//! Canonical record of chunk text, metadata and embeddings. The vector index
//! is rebuilt from here, so a chunk counts as processed once it is saved.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::content_hash;
use crate::types::Chunk;

/// Per-file counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunkCounts {
    pub file_id: String,
    pub chunks: usize,
    pub embedded: usize,
}

/// SQLite chunk store
#[derive(Clone)]
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
}

type ChunkRow = (String, String, String, i64, String, Option<Vec<u8>>, String);

const SELECT_COLUMNS: &str =
    "SELECT id, project_id, file_id, chunk_order, content, embedding, metadata FROM chunks";

impl ChunkStore {
    /// Create or open the store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open chunk store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests and ephemeral runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                chunk_order INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (project_id, file_id, chunk_order)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_project_file ON chunks(project_id, file_id);
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to create schema: {}", e)))?;

        Ok(())
    }

    /// Insert chunks in one transaction; nothing is written if any insert fails
    pub fn save_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage(format!("Failed to begin transaction: {}", e)))?;

        let inserted = insert_chunks(&tx, chunks)?;

        tx.commit()
            .map_err(|e| Error::storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(inserted)
    }

    /// Delete a file's chunks and insert new ones in one transaction
    ///
    /// Returns `(deleted, inserted)`.
    pub fn replace_file(
        &self,
        project_id: &str,
        file_id: &str,
        chunks: &[Chunk],
    ) -> Result<(usize, usize)> {
        if let Some(stray) = chunks
            .iter()
            .find(|c| c.project_id != project_id || c.file_id != file_id)
        {
            return Err(Error::invalid_input(format!(
                "chunk {} belongs to {}/{}, not {}/{}",
                stray.id, stray.project_id, stray.file_id, project_id, file_id
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage(format!("Failed to begin transaction: {}", e)))?;

        let deleted = tx
            .execute(
                "DELETE FROM chunks WHERE project_id = ?1 AND file_id = ?2",
                params![project_id, file_id],
            )
            .map_err(|e| Error::storage(format!("Failed to delete chunks: {}", e)))?;
        let inserted = insert_chunks(&tx, chunks)?;

        tx.commit()
            .map_err(|e| Error::storage(format!("Failed to commit transaction: {}", e)))?;
        Ok((deleted, inserted))
    }

    /// All chunks of a file, by ascending order
    pub fn get_by_file(&self, project_id: &str, file_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE project_id = ?1 AND file_id = ?2 ORDER BY chunk_order",
                SELECT_COLUMNS
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id, file_id], read_row)
            .map_err(|e| Error::storage(format!("Failed to query chunks: {}", e)))?;

        let chunks = rows
            .map(|row| row.map_err(Error::from).and_then(row_to_chunk))
            .collect::<Result<Vec<_>>>();
        chunks
    }

    /// A page of a project's chunks ordered by file then order
    pub fn get_by_project(&self, project_id: &str, limit: usize, offset: usize) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE project_id = ?1 ORDER BY file_id, chunk_order LIMIT ?2 OFFSET ?3",
                SELECT_COLUMNS
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id, limit as i64, offset as i64], read_row)
            .map_err(|e| Error::storage(format!("Failed to query chunks: {}", e)))?;

        let chunks = rows
            .map(|row| row.map_err(Error::from).and_then(row_to_chunk))
            .collect::<Result<Vec<_>>>();
        chunks
    }

    /// Look up chunks by ID within a project
    pub fn get_by_ids(&self, project_id: &str, ids: &[Uuid]) -> Result<HashMap<Uuid, Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{} WHERE project_id = ?1 AND id = ?2", SELECT_COLUMNS))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let mut rows = stmt
                .query_map(params![project_id, id.to_string()], read_row)
                .map_err(|e| Error::storage(format!("Failed to query chunk: {}", e)))?;
            if let Some(row) = rows.next() {
                let chunk = row_to_chunk(row?)?;
                found.insert(chunk.id, chunk);
            }
        }
        Ok(found)
    }

    /// Attach embeddings to chunks that have none yet; returns rows updated
    ///
    /// Existing embeddings are never overwritten.
    pub fn attach_embeddings(
        &self,
        project_id: &str,
        file_id: &str,
        embeddings: &[(Uuid, Vec<f32>)],
    ) -> Result<usize> {
        if embeddings.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage(format!("Failed to begin transaction: {}", e)))?;

        let mut updated = 0;
        {
            let mut stmt = tx
                .prepare(
                    "UPDATE chunks SET embedding = ?1 \
                     WHERE id = ?2 AND project_id = ?3 AND file_id = ?4 AND embedding IS NULL",
                )
                .map_err(|e| Error::storage(format!("Failed to prepare statement: {}", e)))?;

            for (id, vector) in embeddings {
                updated += stmt
                    .execute(params![
                        encode_embedding(vector),
                        id.to_string(),
                        project_id,
                        file_id
                    ])
                    .map_err(|e| Error::storage(format!("Failed to attach embedding: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(updated)
    }

    /// Delete a file's chunks; returns how many were removed
    pub fn delete_by_file(&self, project_id: &str, file_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM chunks WHERE project_id = ?1 AND file_id = ?2",
            params![project_id, file_id],
        )
        .map_err(|e| Error::storage(format!("Failed to delete chunks: {}", e)))
    }

    /// Delete every chunk of a project
    pub fn delete_project(&self, project_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM chunks WHERE project_id = ?1", params![project_id])
            .map_err(|e| Error::storage(format!("Failed to delete project chunks: {}", e)))
    }

    /// Number of chunks stored for a file
    pub fn count(&self, project_id: &str, file_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE project_id = ?1 AND file_id = ?2",
                params![project_id, file_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    /// Number of chunks stored for a project
    pub fn count_project(&self, project_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    /// Chunk and embedding counts for every file in a project
    pub fn file_counts(&self, project_id: &str) -> Result<Vec<FileChunkCounts>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT file_id, COUNT(*), COUNT(embedding) FROM chunks \
                 WHERE project_id = ?1 GROUP BY file_id ORDER BY file_id",
            )
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(FileChunkCounts {
                    file_id: row.get(0)?,
                    chunks: row.get::<_, i64>(1)? as usize,
                    embedded: row.get::<_, i64>(2)? as usize,
                })
            })
            .map_err(|e| Error::storage(format!("Failed to query file counts: {}", e)))?;

        let counts = rows
            .map(|row| row.map_err(Error::from))
            .collect::<Result<Vec<_>>>();
        counts
    }

    /// Check the database answers queries
    pub fn health_check(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

fn insert_chunks(tx: &Transaction<'_>, chunks: &[Chunk]) -> Result<usize> {
    let mut stmt = tx
        .prepare(
            r#"
            INSERT INTO chunks (
                id, project_id, file_id, chunk_order, content, content_hash,
                embedding, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .map_err(|e| Error::storage(format!("Failed to prepare statement: {}", e)))?;

    let now = Utc::now().to_rfc3339();
    for chunk in chunks {
        let metadata = serde_json::to_string(&chunk.metadata)?;
        stmt.execute(params![
            chunk.id.to_string(),
            chunk.project_id,
            chunk.file_id,
            chunk.order as i64,
            chunk.text,
            content_hash(&chunk.text),
            chunk.embedding.as_deref().map(encode_embedding),
            metadata,
            &now,
        ])
        .map_err(|e| {
            Error::storage(format!(
                "Failed to insert chunk {} of {}/{}: {}",
                chunk.order, chunk.project_id, chunk.file_id, e
            ))
        })?;
    }

    Ok(chunks.len())
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn row_to_chunk(row: ChunkRow) -> Result<Chunk> {
    let (id, project_id, file_id, order, text, embedding, metadata) = row;

    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::storage(format!("Invalid chunk id '{}': {}", id, e)))?;
    let embedding = embedding.map(|bytes| decode_embedding(&bytes)).transpose()?;
    let metadata = serde_json::from_str(&metadata)?;

    Ok(Chunk {
        id,
        project_id,
        file_id,
        order: order as u32,
        text,
        embedding,
        metadata,
    })
}

/// Little-endian f32 bytes
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::storage(format!(
            "Embedding blob has {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceInfo;

    fn chunks(project: &str, file: &str, n: u32) -> Vec<Chunk> {
        let source = SourceInfo::new(project, file);
        (0..n)
            .map(|i| Chunk::new(&source, i, format!("chunk text {}", i), 0, 12))
            .collect()
    }

    #[test]
    fn test_save_and_get_ordered() {
        let store = ChunkStore::in_memory().unwrap();
        let mut batch = chunks("p", "a.txt", 4);
        batch.reverse();
        batch[0] = batch[0].clone().with_embedding(vec![0.5, -0.25, 1.0]);

        assert_eq!(store.save_batch(&batch).unwrap(), 4);

        let loaded = store.get_by_file("p", "a.txt").unwrap();
        let orders: Vec<u32> = loaded.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(loaded[3].embedding, Some(vec![0.5, -0.25, 1.0]));
        assert!(loaded[0].embedding.is_none());
        assert_eq!(loaded[1].char_range(), Some((0, 12)));
    }

    #[test]
    fn test_duplicate_order_rolls_back_batch() {
        let store = ChunkStore::in_memory().unwrap();
        store.save_batch(&chunks("p", "a", 2)).unwrap();

        // Same (project, file, order) again: whole batch is rejected
        let err = store.save_batch(&chunks("p", "a", 3)).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.count("p", "a").unwrap(), 2);
    }

    #[test]
    fn test_replace_file() {
        let store = ChunkStore::in_memory().unwrap();
        store.save_batch(&chunks("p", "a", 5)).unwrap();
        store.save_batch(&chunks("p", "b", 2)).unwrap();

        let (deleted, inserted) = store.replace_file("p", "a", &chunks("p", "a", 3)).unwrap();
        assert_eq!((deleted, inserted), (5, 3));
        assert_eq!(store.count("p", "a").unwrap(), 3);
        assert_eq!(store.count("p", "b").unwrap(), 2);

        assert!(matches!(
            store.replace_file("p", "a", &chunks("p", "other", 1)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_delete_and_counts() {
        let store = ChunkStore::in_memory().unwrap();
        store.save_batch(&chunks("p", "a", 3)).unwrap();
        store.save_batch(&chunks("p", "b", 2)).unwrap();
        store.save_batch(&chunks("q", "a", 1)).unwrap();

        assert_eq!(store.count_project("p").unwrap(), 5);
        assert_eq!(store.delete_by_file("p", "a").unwrap(), 3);
        assert_eq!(store.count("p", "a").unwrap(), 0);
        assert_eq!(store.count("q", "a").unwrap(), 1);
        assert_eq!(store.delete_project("p").unwrap(), 2);
        assert_eq!(store.count_project("p").unwrap(), 0);
    }

    #[test]
    fn test_attach_embeddings_only_fills_missing() {
        let store = ChunkStore::in_memory().unwrap();
        let mut batch = chunks("p", "a", 2);
        batch[0] = batch[0].clone().with_embedding(vec![1.0, 0.0]);
        store.save_batch(&batch).unwrap();

        let updated = store
            .attach_embeddings(
                "p",
                "a",
                &[(batch[0].id, vec![9.0, 9.0]), (batch[1].id, vec![0.0, 1.0])],
            )
            .unwrap();
        assert_eq!(updated, 1);

        let loaded = store.get_by_file("p", "a").unwrap();
        assert_eq!(loaded[0].embedding, Some(vec![1.0, 0.0]));
        assert_eq!(loaded[1].embedding, Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_file_counts_and_lookup() {
        let store = ChunkStore::in_memory().unwrap();
        let mut a = chunks("p", "a", 3);
        a[1] = a[1].clone().with_embedding(vec![1.0]);
        store.save_batch(&a).unwrap();
        store.save_batch(&chunks("p", "b", 1)).unwrap();

        let counts = store.file_counts("p").unwrap();
        assert_eq!(
            counts,
            vec![
                FileChunkCounts { file_id: "a".into(), chunks: 3, embedded: 1 },
                FileChunkCounts { file_id: "b".into(), chunks: 1, embedded: 0 },
            ]
        );

        let found = store.get_by_ids("p", &[a[2].id, Uuid::new_v4()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&a[2].id].text, "chunk text 2");
        assert!(store.get_by_ids("other", &[a[2].id]).unwrap().is_empty());

        let page = store.get_by_project("p", 2, 1).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!((page[0].file_id.as_str(), page[0].order), ("a", 1));
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chunks.db");
        {
            let store = ChunkStore::new(&path).unwrap();
            store.save_batch(&chunks("p", "a", 2)).unwrap();
        }
        let store = ChunkStore::new(&path).unwrap();
        assert_eq!(store.count("p", "a").unwrap(), 2);
        assert!(store.health_check());
    }
}
