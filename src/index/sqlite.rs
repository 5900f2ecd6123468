//! SQLite-backed [`VectorIndex`].
//!
//! One database file holds any number of named collections. Each collection
//! row carries its distance-metric tag; records store the chunk text, the
//! embedding as a little-endian f32 BLOB, and the chunk metadata as JSON.
//! Queries fetch the collection's vectors and score them in Rust —
//! brute-force, which is fine at the corpus sizes this tool targets.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::Embedder;
use crate::models::ChunkMetadata;
use crate::similarity::DistanceMetric;

use super::{blob_to_vec, distance, vec_to_blob, IndexQueryResult, VectorIndex};

/// Open the index database, creating the file and schema if missing.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name     TEXT PRIMARY KEY,
            distance TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id         TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            document   TEXT NOT NULL,
            embedding  BLOB NOT NULL,
            metadata   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Drop a single collection: its records and its metric registration.
/// Other collections in the same database file are untouched.
pub async fn drop_collection(pool: &SqlitePool, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM records WHERE collection = ?")
        .bind(name)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM collections WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete the entire index storage location, WAL siblings included.
/// Removal errors are ignored — a missing file is already purged.
pub fn purge_storage(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut target = path.as_os_str().to_owned();
        target.push(suffix);
        let _ = std::fs::remove_file(Path::new(&target));
    }
}

/// A named collection bound to a distance metric and an embedding function.
pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    metric: DistanceMetric,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    /// Bind to `collection`, registering it on first use.
    ///
    /// Fails if the collection already exists under a different distance
    /// metric — records scored under one metric are not comparable under
    /// another.
    pub async fn open_or_create(
        pool: SqlitePool,
        collection: &str,
        metric: DistanceMetric,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT distance FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&pool)
                .await?;

        match stored {
            Some(tag) if tag != metric.label() => anyhow::bail!(
                "collection '{}' was created with distance '{}', configured '{}'",
                collection,
                tag,
                metric.label()
            ),
            Some(_) => {}
            None => {
                sqlx::query("INSERT INTO collections (name, distance) VALUES (?, ?)")
                    .bind(collection)
                    .bind(metric.label())
                    .execute(&pool)
                    .await?;
            }
        }

        Ok(Self {
            pool,
            collection: collection.to_string(),
            metric,
            embedder,
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder =
            sqlx::QueryBuilder::new("SELECT id FROM records WHERE collection = ");
        builder.push_bind(&self.collection);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }

    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        anyhow::ensure!(
            ids.len() == documents.len() && ids.len() == metadatas.len(),
            "upsert arrays must be parallel"
        );

        // Embed outside the transaction; the write itself stays atomic.
        let mut vectors = Vec::with_capacity(documents.len());
        for doc in documents {
            vectors.push(self.embedder.embed(doc).await?);
        }

        let mut tx = self.pool.begin().await?;
        for (i, id) in ids.iter().enumerate() {
            let metadata_json = serde_json::to_string(&metadatas[i])?;
            sqlx::query(
                r#"
                INSERT INTO records (id, collection, document, embedding, metadata)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata
                "#,
            )
            .bind(id)
            .bind(&self.collection)
            .bind(&documents[i])
            .bind(vec_to_blob(&vectors[i]))
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<IndexQueryResult> {
        let query_vec = self.embedder.embed(text).await?;

        let rows = sqlx::query(
            "SELECT document, embedding, metadata FROM records WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f64, &sqlx::sqlite::SqliteRow)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                (distance(&query_vec, &stored, self.metric), row)
            })
            .collect();

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut result = IndexQueryResult::default();
        for (dist, row) in scored {
            let metadata_json: String = row.get("metadata");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| "corrupt metadata JSON in index record")?;
            result.documents.push(row.get("document"));
            result.distances.push(dist);
            result.metadatas.push(metadata);
        }
        Ok(result)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
