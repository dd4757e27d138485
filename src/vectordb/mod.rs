//! Company vector index (funnel stage 1).
//!
//! [`VectorIndex::query`] returns neighbours ordered by cosine similarity, highest
//! first, ties in insertion order. An empty answer is a normal result: the funnel
//! reads it as "no semantic candidates" and falls back to full-population scoring.

pub mod error;
pub mod memory;
pub mod qdrant;


pub use error::{VectorIndexError, VectorIndexResult};
pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantVectorIndex;

use serde::{Deserialize, Serialize};

use crate::model::{Company, CompanyId};

pub const DEFAULT_COLLECTION_NAME: &str = "funnel_companies";

/// Payload stored next to each vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
}

impl From<&Company> for IndexMetadata {
    fn from(company: &Company) -> Self {
        Self {
            name: company.name.clone(),
            sector: company.sector.clone(),
        }
    }
}

/// One neighbour returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: CompanyId,
    /// Cosine similarity in `[min_similarity, 1]`.
    pub similarity: f32,
    pub metadata: IndexMetadata,
}

pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the vector for `id`. A replaced id keeps its original
    /// insertion position for tie-breaking.
    fn upsert(
        &self,
        id: CompanyId,
        vector: &[f32],
        metadata: IndexMetadata,
    ) -> impl std::future::Future<Output = VectorIndexResult<()>> + Send;

    /// At most `top_k` neighbours with similarity `>= min_similarity`.
    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> impl std::future::Future<Output = VectorIndexResult<Vec<IndexHit>>> + Send;

    fn len(&self) -> impl std::future::Future<Output = VectorIndexResult<usize>> + Send;

    fn dimension(&self) -> usize;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Sorts by similarity descending; `sort_by` is stable so equal scores keep the
/// order of `hits` (callers pass insertion order).
pub(crate) fn rank_hits(hits: &mut Vec<IndexHit>, top_k: usize) {
    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(top_k);
}
