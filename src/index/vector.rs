//! Vector index gateway and in-memory cosine reference implementation.
//!
//! The trait mirrors a hosted ANN collection (Qdrant-style points with
//! payloads); the in-memory implementation is an exact brute-force cosine
//! scan, parallelized with rayon, which doubles as the ground truth the
//! approximate backends are measured against.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{CancelToken, TenantId};
use crate::embedding::cosine_similarity;
use crate::error::{Error, ExternalError, Result};

/// Payload stored alongside every vector point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorPayload {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Document the chunk belongs to.
    pub document_id: Uuid,
    /// Chunk text.
    pub text: String,
}

/// A raw vector search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Matching chunk (point id).
    pub chunk_id: Uuid,
    /// Raw cosine similarity in [-1, 1].
    pub score: f32,
    /// Stored payload.
    pub payload: VectorPayload,
}

/// Vector index collaborator contract.
///
/// Point ids are chunk ids; payloads carry at minimum
/// `{tenant, document_id, text}`. All operations are tenant-scoped.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the tenant's collection if it does not exist. Idempotent.
    async fn ensure_collection(&self, tenant: &TenantId) -> Result<()>;

    /// Configured vector dimension; upserts with any other dimension are
    /// rejected.
    fn dimensions(&self) -> usize;

    /// Inserts or replaces one point.
    async fn upsert_vector(&self, id: Uuid, vector: &[f32], payload: VectorPayload) -> Result<()>;

    /// Inserts or replaces a batch of points.
    async fn bulk_upsert(&self, points: Vec<(Uuid, Vec<f32>, VectorPayload)>) -> Result<()>;

    /// Cosine search over the tenant's collection, descending score,
    /// ties broken by ascending chunk id.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Vec<VectorHit>>;

    /// Removes one point.
    async fn delete_vector(&self, id: Uuid, tenant: &TenantId) -> Result<()>;

    /// Removes every point of a document.
    async fn delete_document_vectors(&self, document_id: Uuid, tenant: &TenantId) -> Result<()>;
}

type PointMap = HashMap<Uuid, (Vec<f32>, VectorPayload)>;

/// In-memory per-tenant brute-force cosine index.
pub struct MemoryVectorIndex {
    dimensions: usize,
    tenants: RwLock<HashMap<TenantId, PointMap>>,
}

impl MemoryVectorIndex {
    /// Creates an empty index accepting vectors of `dimensions`.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points stored for a tenant.
    #[must_use]
    pub fn point_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .read()
            .map(|tenants| tenants.get(tenant).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(ExternalError::VectorDimension {
                expected: self.dimensions,
                actual: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<TenantId, PointMap>>> {
        self.tenants.read().map_err(|_| {
            ExternalError::VectorUnavailable {
                reason: "collection lock poisoned".to_string(),
            }
            .into()
        })
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<TenantId, PointMap>>> {
        self.tenants.write().map_err(|_| {
            ExternalError::VectorUnavailable {
                reason: "collection lock poisoned".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_collection(&self, tenant: &TenantId) -> Result<()> {
        self.write_lock()?.entry(tenant.clone()).or_default();
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert_vector(&self, id: Uuid, vector: &[f32], payload: VectorPayload) -> Result<()> {
        self.check_dimension(vector)?;
        self.write_lock()?
            .entry(payload.tenant.clone())
            .or_default()
            .insert(id, (vector.to_vec(), payload));
        Ok(())
    }

    async fn bulk_upsert(&self, points: Vec<(Uuid, Vec<f32>, VectorPayload)>) -> Result<()> {
        for (_, vector, _) in &points {
            self.check_dimension(vector)?;
        }
        let mut tenants = self.write_lock()?;
        for (id, vector, payload) in points {
            tenants
                .entry(payload.tenant.clone())
                .or_default()
                .insert(id, (vector, payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Vec<VectorHit>> {
        self.check_dimension(query)?;
        if top_k == 0 {
            return Err(Error::invalid_input("top_k must be >= 1"));
        }
        cancel.check()?;

        let tenants = self.read_lock()?;
        let Some(points) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorHit> = points
            .par_iter()
            .map(|(id, (vector, payload))| VectorHit {
                chunk_id: *id,
                score: cosine_similarity(query, vector),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_vector(&self, id: Uuid, tenant: &TenantId) -> Result<()> {
        if let Some(points) = self.write_lock()?.get_mut(tenant) {
            points.remove(&id);
        }
        Ok(())
    }

    async fn delete_document_vectors(&self, document_id: Uuid, tenant: &TenantId) -> Result<()> {
        if let Some(points) = self.write_lock()?.get_mut(tenant) {
            points.retain(|_, (_, payload)| payload.document_id != document_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    fn payload(doc: Uuid, text: &str) -> VectorPayload {
        VectorPayload {
            tenant: tenant(),
            document_id: doc,
            text: text.to_string(),
        }
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        index
            .upsert_vector(Uuid::new_v4(), &unit(4, 0), payload(doc, "x-axis"))
            .await
            .unwrap();
        index
            .upsert_vector(Uuid::new_v4(), &unit(4, 1), payload(doc, "y-axis"))
            .await
            .unwrap();
        index
            .upsert_vector(
                Uuid::new_v4(),
                &[0.9, 0.1, 0.0, 0.0],
                payload(doc, "near-x"),
            )
            .await
            .unwrap();

        let hits = index
            .search(&unit(4, 0), 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].payload.text, "x-axis");
        assert_eq!(hits[1].payload.text, "near-x");
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_search_tie_broken_by_chunk_id() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        index
            .upsert_vector(id_a, &unit(4, 0), payload(doc, "a"))
            .await
            .unwrap();
        index
            .upsert_vector(id_b, &unit(4, 0), payload(doc, "b"))
            .await
            .unwrap();
        let hits = index
            .search(&unit(4, 0), 2, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(hits[0].chunk_id < hits[1].chunk_id);
    }

    #[tokio::test]
    async fn test_dimension_rejected_on_upsert_and_search() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        let err = index
            .upsert_vector(Uuid::new_v4(), &[1.0, 0.0], payload(doc, "short"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::External(ExternalError::VectorDimension { .. })
        ));
        assert!(
            index
                .search(&[1.0, 0.0], 3, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        index
            .upsert_vector(Uuid::new_v4(), &unit(4, 0), payload(doc, "t1 only"))
            .await
            .unwrap();
        let other = TenantId::new("t2").unwrap();
        let hits = index
            .search(&unit(4, 0), 5, &other, &CancelToken::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_vectors() {
        let index = MemoryVectorIndex::new(4);
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index
            .bulk_upsert(vec![
                (Uuid::new_v4(), unit(4, 0), payload(doc_a, "a0")),
                (Uuid::new_v4(), unit(4, 1), payload(doc_a, "a1")),
                (Uuid::new_v4(), unit(4, 2), payload(doc_b, "b0")),
            ])
            .await
            .unwrap();
        index.delete_document_vectors(doc_a, &tenant()).await.unwrap();
        assert_eq!(index.point_count(&tenant()), 1);
    }

    #[tokio::test]
    async fn test_delete_vector() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        let id = Uuid::new_v4();
        index
            .upsert_vector(id, &unit(4, 0), payload(doc, "x"))
            .await
            .unwrap();
        index.delete_vector(id, &tenant()).await.unwrap();
        assert_eq!(index.point_count(&tenant()), 0);
    }

    #[tokio::test]
    async fn test_bulk_upsert_rejects_any_bad_dimension() {
        let index = MemoryVectorIndex::new(4);
        let doc = Uuid::new_v4();
        let result = index
            .bulk_upsert(vec![
                (Uuid::new_v4(), unit(4, 0), payload(doc, "good")),
                (Uuid::new_v4(), vec![1.0], payload(doc, "bad")),
            ])
            .await;
        assert!(result.is_err());
        // Atomic: nothing was written.
        assert_eq!(index.point_count(&tenant()), 0);
    }

    #[tokio::test]
    async fn test_search_zero_top_k_rejected() {
        let index = MemoryVectorIndex::new(4);
        assert!(
            index
                .search(&unit(4, 0), 0, &tenant(), &CancelToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_ensure_collection_idempotent() {
        let index = MemoryVectorIndex::new(4);
        index.ensure_collection(&tenant()).await.unwrap();
        index.ensure_collection(&tenant()).await.unwrap();
        assert_eq!(index.point_count(&tenant()), 0);
    }
}
