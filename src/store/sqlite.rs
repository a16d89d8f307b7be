//! Sqlite-backed gift and testimonial store.
//!
//! In-process storage using sqlite for rows and brute-force cosine
//! similarity over embedding BLOBs for the two search functions.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{Gift, GiftMatch, NewGift, SimilarityIndex, StoreError, Testimonial, TestimonialMatch};
use crate::core::config::AppPaths;

#[derive(Clone)]
pub struct SqliteGiftStore {
    pool: SqlitePool,
}

impl SqliteGiftStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, StoreError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS gifts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                category TEXT,
                price REAL,
                image_url TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_gifts_name ON gifts(name)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS testimonials (
                id TEXT PRIMARY KEY,
                gift_id TEXT REFERENCES gifts(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                situation TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_testimonials_gift ON testimonials(gift_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_gift(row: &sqlx::sqlite::SqliteRow) -> Gift {
        Gift {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            category: row.get("category"),
            price: row.get("price"),
            image_url: row.get("image_url"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    // -- gifts ------------------------------------------------------------

    pub async fn insert_gift(
        &self,
        new: &NewGift,
        embedding: Option<&[f32]>,
    ) -> Result<Gift, StoreError> {
        let id = Uuid::new_v4().to_string();
        let blob = embedding.map(Self::serialize_embedding);

        sqlx::query(
            "INSERT INTO gifts (id, name, description, category, price, image_url, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.category)
        .bind(new.price)
        .bind(&new.image_url)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        let gift = self.get_gift(&id).await?;
        gift.ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn get_gift(&self, id: &str) -> Result<Option<Gift>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, category, price, image_url, is_active,
                    created_at, updated_at
             FROM gifts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_gift))
    }

    pub async fn find_gift_by_name(&self, name: &str) -> Result<Option<Gift>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, category, price, image_url, is_active,
                    created_at, updated_at
             FROM gifts WHERE name = ?1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_gift))
    }

    pub async fn list_gifts(&self, limit: usize) -> Result<Vec<Gift>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, description, category, price, image_url, is_active,
                    created_at, updated_at
             FROM gifts
             WHERE is_active = 1
             ORDER BY created_at DESC
             LIMIT ?1",
        )
        .bind(limit.max(1) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_gift).collect())
    }

    /// Returns every gift, active or not. Used by the embedding backfill.
    pub async fn list_all_gifts(&self) -> Result<Vec<Gift>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, description, category, price, image_url, is_active,
                    created_at, updated_at
             FROM gifts
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_gift).collect())
    }

    /// Resolves the given ids to gifts, preserving the input order and
    /// dropping ids with no matching row.
    pub async fn gifts_by_ids(&self, ids: &[String]) -> Result<Vec<Gift>, StoreError> {
        let mut gifts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(gift) = self.get_gift(id).await? {
                gifts.push(gift);
            } else {
                tracing::warn!("Recommended gift id {} has no catalog row", id);
            }
        }
        Ok(gifts)
    }

    pub async fn delete_gift(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM gifts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_gift_embedding(
        &self,
        id: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let blob = Self::serialize_embedding(embedding);
        sqlx::query(
            "UPDATE gifts
             SET embedding = ?2, updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds a gift by name, creating a bare row (no embedding) if absent.
    pub async fn find_or_create_gift(&self, name: &str) -> Result<Gift, StoreError> {
        if let Some(gift) = self.find_gift_by_name(name).await? {
            return Ok(gift);
        }

        let new = NewGift {
            name: name.to_string(),
            description: None,
            category: None,
            price: None,
            image_url: None,
        };
        self.insert_gift(&new, None).await
    }

    // -- testimonials -----------------------------------------------------

    pub async fn insert_testimonial(
        &self,
        gift_id: Option<&str>,
        title: &str,
        content: &str,
        situation: &str,
        embedding: &[f32],
    ) -> Result<Testimonial, StoreError> {
        let id = Uuid::new_v4().to_string();
        let blob = Self::serialize_embedding(embedding);

        sqlx::query(
            "INSERT INTO testimonials (id, gift_id, title, content, situation, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&id)
        .bind(gift_id)
        .bind(title)
        .bind(content)
        .bind(situation)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT t.id, t.gift_id, g.name AS gift_name, t.title, t.content,
                    t.situation, t.created_at
             FROM testimonials t
             LEFT JOIN gifts g ON g.id = t.gift_id
             WHERE t.id = ?1",
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_to_testimonial(&row))
    }

    pub async fn list_testimonials(&self, limit: usize) -> Result<Vec<Testimonial>, StoreError> {
        let rows = sqlx::query(
            "SELECT t.id, t.gift_id, g.name AS gift_name, t.title, t.content,
                    t.situation, t.created_at
             FROM testimonials t
             LEFT JOIN gifts g ON g.id = t.gift_id
             ORDER BY t.created_at DESC
             LIMIT ?1",
        )
        .bind(limit.max(1) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_testimonial).collect())
    }

    fn row_to_testimonial(row: &sqlx::sqlite::SqliteRow) -> Testimonial {
        Testimonial {
            id: row.get("id"),
            gift_id: row.get("gift_id"),
            gift_name: row.get("gift_name"),
            title: row.get("title"),
            content: row.get("content"),
            situation: row.get("situation"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl SimilarityIndex for SqliteGiftStore {
    async fn match_testimonials(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<TestimonialMatch>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, gift_id, title, content, situation, embedding
             FROM testimonials
             WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<TestimonialMatch> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let similarity = Self::cosine_similarity(query_embedding, &stored);
                if similarity < threshold {
                    return None;
                }

                Some(TestimonialMatch {
                    id: row.get("id"),
                    gift_id: row.get("gift_id"),
                    title: row.get("title"),
                    content: row.get("content"),
                    situation: row.get("situation"),
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count.max(1));

        Ok(scored)
    }

    async fn match_gifts(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<GiftMatch>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, description, category, price, embedding
             FROM gifts
             WHERE is_active = 1 AND embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<GiftMatch> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let similarity = Self::cosine_similarity(query_embedding, &stored);
                if similarity < threshold {
                    return None;
                }

                Some(GiftMatch {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    category: row.get("category"),
                    price: row.get("price"),
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count.max(1));

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteGiftStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteGiftStore::with_path(dir.path().join("giftwise-test.db"))
            .await
            .unwrap();
        (dir, store)
    }

    fn make_gift(name: &str) -> NewGift {
        NewGift {
            name: name.to_string(),
            description: Some(format!("{} description", name)),
            category: None,
            price: Some(3000.0),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_gift() {
        let (_dir, store) = test_store().await;

        let gift = store
            .insert_gift(&make_gift("Coffee grinder"), Some(&[1.0, 0.0]))
            .await
            .unwrap();
        assert!(gift.is_active);

        let fetched = store.get_gift(&gift.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Coffee grinder");
        assert_eq!(fetched.price, Some(3000.0));
    }

    #[tokio::test]
    async fn match_gifts_filters_orders_and_caps() {
        let (_dir, store) = test_store().await;

        store
            .insert_gift(&make_gift("Exact"), Some(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_gift(&make_gift("Close"), Some(&[0.9, 0.1]))
            .await
            .unwrap();
        store
            .insert_gift(&make_gift("Far"), Some(&[0.0, 1.0]))
            .await
            .unwrap();

        let matches = store.match_gifts(&[1.0, 0.0], 0.5, 5).await.unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Exact", "Close"]);
        assert!(matches[0].similarity >= matches[1].similarity);

        let capped = store.match_gifts(&[1.0, 0.0], 0.5, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].name, "Exact");
    }

    #[tokio::test]
    async fn match_gifts_skips_rows_without_embedding() {
        let (_dir, store) = test_store().await;

        store.insert_gift(&make_gift("Bare"), None).await.unwrap();
        store
            .insert_gift(&make_gift("Indexed"), Some(&[1.0, 0.0]))
            .await
            .unwrap();

        let matches = store.match_gifts(&[1.0, 0.0], 0.0, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "Indexed");
    }

    #[tokio::test]
    async fn testimonial_roundtrip_with_gift_name() {
        let (_dir, store) = test_store().await;

        let gift = store.find_or_create_gift("Tea set").await.unwrap();
        let testimonial = store
            .insert_testimonial(
                Some(&gift.id),
                "Perfect for my aunt",
                "She loved the ceremony of it.",
                "60th birthday",
                &[0.5, 0.5],
            )
            .await
            .unwrap();
        assert_eq!(testimonial.gift_name.as_deref(), Some("Tea set"));

        let listed = store.list_testimonials(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Perfect for my aunt");

        let matches = store
            .match_testimonials(&[0.5, 0.5], 0.5, 5)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].gift_id.as_deref(), Some(gift.id.as_str()));
        assert!(matches[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn gifts_by_ids_preserves_order_and_drops_missing() {
        let (_dir, store) = test_store().await;

        let a = store.insert_gift(&make_gift("A"), None).await.unwrap();
        let b = store.insert_gift(&make_gift("B"), None).await.unwrap();

        let ids = vec![b.id.clone(), "missing".to_string(), a.id.clone()];
        let gifts = store.gifts_by_ids(&ids).await.unwrap();
        let names: Vec<&str> = gifts.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn embedding_backfill_updates_row() {
        let (_dir, store) = test_store().await;

        let gift = store.insert_gift(&make_gift("Bare"), None).await.unwrap();
        let before = store.match_gifts(&[1.0, 0.0], 0.0, 5).await.unwrap();
        assert!(before.is_empty());

        store
            .update_gift_embedding(&gift.id, &[1.0, 0.0])
            .await
            .unwrap();
        let after = store.match_gifts(&[1.0, 0.0], 0.0, 5).await.unwrap();
        assert_eq!(after.len(), 1);
    }
}
