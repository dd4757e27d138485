use std::collections::HashMap;

use half::f16;
use parking_lot::RwLock;

use super::{IndexHit, IndexMetadata, VectorIndex, VectorIndexResult, cosine_similarity, rank_hits};
use crate::constants::validate_embedding_dim;
use crate::model::CompanyId;

struct StoredPoint {
    id: CompanyId,
    vector: Vec<f16>,
    metadata: IndexMetadata,
}

#[derive(Default)]
struct Points {
    /// Insertion order.
    rows: Vec<StoredPoint>,
    positions: HashMap<CompanyId, usize>,
}

/// Brute-force cosine index holding vectors as f16.
pub struct InMemoryVectorIndex {
    dimension: usize,
    points: RwLock<Points>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: RwLock::new(Points::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().rows.is_empty()
    }

    pub fn clear(&self) {
        *self.points.write() = Points::default();
    }
}

impl std::fmt::Debug for InMemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorIndex")
            .field("dimension", &self.dimension)
            .field("points", &self.points.read().rows.len())
            .finish()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        id: CompanyId,
        vector: &[f32],
        metadata: IndexMetadata,
    ) -> VectorIndexResult<()> {
        validate_embedding_dim(self.dimension, vector.len())?;
        let vector: Vec<f16> = vector.iter().copied().map(f16::from_f32).collect();

        let mut points = self.points.write();
        match points.positions.get(&id).copied() {
            Some(pos) => {
                let row = &mut points.rows[pos];
                row.vector = vector;
                row.metadata = metadata;
            }
            None => {
                let pos = points.rows.len();
                points.rows.push(StoredPoint {
                    id,
                    vector,
                    metadata,
                });
                points.positions.insert(id, pos);
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> VectorIndexResult<Vec<IndexHit>> {
        validate_embedding_dim(self.dimension, vector.len())?;

        let points = self.points.read();
        let mut hits: Vec<IndexHit> = points
            .rows
            .iter()
            .filter_map(|row| {
                let stored: Vec<f32> = row.vector.iter().map(|v| v.to_f32()).collect();
                let similarity = cosine_similarity(vector, &stored);
                (similarity >= min_similarity).then(|| IndexHit {
                    id: row.id,
                    similarity: similarity.min(1.0),
                    metadata: row.metadata.clone(),
                })
            })
            .collect();
        drop(points);

        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn len(&self) -> VectorIndexResult<usize> {
        Ok(self.points.read().rows.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
