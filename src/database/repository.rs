//! Raw SQL operations against the `rag_chunks` table. `sqlx` +
//! `pgvector::Vector` and `search_user_documents`-style queries carried
//! over, adapted to this core's chunk schema and to the
//! atomic-replace-per-note ingestion contract.

use super::models::{ChunkRow, ChunkSearchRow, NoteMetaRow, UserStatsRow};
use super::pool::DbPool;
use anyhow::Result;
use pgvector::Vector;
use tracing::debug;

pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Atomic replace: delete the note's existing chunks and insert the new
    /// set inside one transaction, so no reader ever observes a partial
    /// chunk set for the note.
    pub async fn upsert_chunks(&self, note_id: &str, user_id: &str, chunks: &[ChunkRow]) -> Result<()> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM rag_chunks WHERE note_id = $1 AND user_id = $2")
            .bind(note_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO rag_chunks
                    (chunk_id, note_id, user_id, chunk_idx, content, token_count, embedding)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.note_id)
            .bind(&chunk.user_id)
            .bind(chunk.chunk_idx)
            .bind(&chunk.content)
            .bind(chunk.token_count)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(note_id, chunk_count = chunks.len(), "upserted chunks (atomic replace)");
        Ok(())
    }

    pub async fn delete_note(&self, note_id: &str, user_id: &str) -> Result<()> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM rag_chunks WHERE note_id = $1 AND user_id = $2")
            .bind(note_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM rag_note_meta WHERE note_id = $1 AND user_id = $2")
            .bind(note_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Upserts the citation-relevant fields of a note. Called on every
    /// ingestion alongside `upsert_chunks`, independent of the atomic
    /// chunk-replace transaction — a stale title briefly visible after a
    /// rename is harmless, unlike a stale chunk set.
    pub async fn upsert_note_meta(&self, meta: &NoteMetaRow) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO rag_note_meta (note_id, user_id, title, preacher, scripture_refs, tags)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (note_id, user_id) DO UPDATE SET
                 title = EXCLUDED.title,
                 preacher = EXCLUDED.preacher,
                 scripture_refs = EXCLUDED.scripture_refs,
                 tags = EXCLUDED.tags"#,
        )
        .bind(&meta.note_id)
        .bind(&meta.user_id)
        .bind(&meta.title)
        .bind(&meta.preacher)
        .bind(&meta.scripture_refs)
        .bind(&meta.tags)
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    pub async fn get_notes_meta(&self, user_id: &str, note_ids: &[String]) -> Result<Vec<NoteMetaRow>> {
        if note_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, NoteMetaRow>(
            r#"SELECT note_id, user_id, title, preacher, scripture_refs, tags
               FROM rag_note_meta
               WHERE user_id = $1 AND note_id = ANY($2)"#,
        )
        .bind(user_id)
        .bind(note_ids)
        .fetch_all(self.pool.get_pool())
        .await?;
        Ok(rows)
    }

    /// Cosine-distance nearest-neighbor search, always filtered server-side
    /// by `user_id` — a result for another user here would be a correctness
    /// violation, not just a privacy one.
    pub async fn search(&self, user_id: &str, query_vec: Vector, k: i64) -> Result<Vec<ChunkSearchRow>> {
        let rows = sqlx::query_as::<_, ChunkSearchRow>(
            r#"SELECT
                chunk_id,
                note_id,
                user_id,
                chunk_idx,
                content,
                token_count,
                1 - (embedding <=> $2) AS similarity
               FROM rag_chunks
               WHERE user_id = $1
               ORDER BY embedding <=> $2
               LIMIT $3"#,
        )
        .bind(user_id)
        .bind(query_vec)
        .bind(k)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!(user_id, found = rows.len(), "vector search");
        Ok(rows)
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStatsRow> {
        let row = sqlx::query_as::<_, UserStatsRow>(
            r#"SELECT
                count(*) AS total,
                count(*) FILTER (WHERE embedding IS NOT NULL) AS with_embeddings
               FROM rag_chunks
               WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(row)
    }
}
