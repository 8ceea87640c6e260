//! The [`ImageStore`] seam and its Postgres implementation.
//!
//! The store is assumed safe for concurrent independent writes; the
//! pipeline performs no cross-job locking around it.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{GeneratedImageRecord, VariantRecord};

/// Errors surfaced by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// No base image row exists for the given request id.
    #[error("No generated image found for request {0}")]
    BaseNotFound(String),

    /// A record could not be serialized for storage.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Persistence interface for generated images.
///
/// Both operations are awaited to completion by the task runner before it
/// reports success; a failure becomes a `db_error` outcome for that job
/// only.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Insert the record of one completed initial generation.
    async fn insert_generated(&self, record: &GeneratedImageRecord) -> Result<(), StoreError>;

    /// Append a variant refinement to the base image identified by
    /// `base_request_id`.
    async fn attach_variant(
        &self,
        base_request_id: &str,
        record: &VariantRecord,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// [`ImageStore`] backed by the `generated_images` table.
///
/// Spec and result payloads are stored as JSONB; variants accumulate in a
/// JSONB array on the base row.
pub struct PgImageStore {
    pool: PgPool,
}

impl PgImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageStore for PgImageStore {
    async fn insert_generated(&self, record: &GeneratedImageRecord) -> Result<(), StoreError> {
        let spec = serde_json::to_value(&record.spec)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let result = serde_json::to_value(&record.result)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO generated_images (request_id, shot_type, spec, result, created_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(&record.result.request_id)
        .bind(&record.shot_type)
        .bind(spec)
        .bind(result)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            request_id = %record.result.request_id,
            shot_type = %record.shot_type,
            "Inserted generated image record"
        );
        Ok(())
    }

    async fn attach_variant(
        &self,
        base_request_id: &str,
        record: &VariantRecord,
    ) -> Result<(), StoreError> {
        let variant = serde_json::to_value(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let affected = sqlx::query(
            "UPDATE generated_images \
             SET variants = COALESCE(variants, '[]'::jsonb) || $2::jsonb, \
                 updated_at = NOW() \
             WHERE request_id = $1",
        )
        .bind(base_request_id)
        .bind(variant)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::BaseNotFound(base_request_id.to_string()));
        }

        tracing::info!(
            request_id = base_request_id,
            variant_label = %record.variant_label,
            "Attached variant record"
        );
        Ok(())
    }
}
