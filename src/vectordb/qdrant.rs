use std::collections::HashMap;

use chrono::Utc;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, GetPointsBuilder, PointId, PointStruct,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    IndexHit, IndexMetadata, VectorIndex, VectorIndexError, VectorIndexResult, rank_hits,
};
use crate::constants::validate_embedding_dim;
use crate::model::CompanyId;

const PAYLOAD_NAME: &str = "name";
const PAYLOAD_SECTOR: &str = "sector";
/// First write time in microseconds; orders equal-score hits by insertion.
const PAYLOAD_SEQ: &str = "seq";

/// [`VectorIndex`] over a Qdrant collection (cosine distance, UUID point ids).
#[derive(Clone)]
pub struct QdrantVectorIndex {
    client: Qdrant,
    url: String,
    collection: String,
    dimension: usize,
}

impl std::fmt::Debug for QdrantVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorIndex")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl QdrantVectorIndex {
    /// Connects and creates the collection if it does not exist yet.
    pub async fn connect(url: &str, collection: &str, dimension: usize) -> VectorIndexResult<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorIndexError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let index = Self {
            client,
            url: url.to_string(),
            collection: collection.to_string(),
            dimension,
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> VectorIndexResult<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| self.collection_error(e))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| self.collection_error(e))?;
            info!(collection = %self.collection, dimension = self.dimension, "Created collection");
        }
        Ok(())
    }

    /// The `seq` of a point already in the collection.
    async fn existing_seq(&self, id: CompanyId) -> VectorIndexResult<Option<i64>> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![PointId::from(id.to_string())])
                    .with_payload(true),
            )
            .await
            .map_err(|e| self.upsert_error(e))?;

        Ok(response
            .result
            .iter()
            .find_map(|point| payload_seq(&point.payload)))
    }

    fn upsert_error(&self, e: qdrant_client::QdrantError) -> VectorIndexError {
        VectorIndexError::UpsertFailed {
            collection: self.collection.clone(),
            message: e.to_string(),
        }
    }

    fn collection_error(&self, e: qdrant_client::QdrantError) -> VectorIndexError {
        VectorIndexError::CollectionFailed {
            collection: self.collection.clone(),
            message: e.to_string(),
        }
    }
}

/// Decodes a scored point; points without a UUID id are skipped.
fn hit_from_scored_point(point: ScoredPoint) -> Option<(IndexHit, i64)> {
    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(raw)) => Uuid::parse_str(&raw).ok()?,
        _ => return None,
    };

    let payload = point.payload;
    let name = payload
        .get(PAYLOAD_NAME)
        .and_then(|v| v.as_str())
        .cloned()
        .unwrap_or_default();
    let sector = payload
        .get(PAYLOAD_SECTOR)
        .and_then(|v| v.as_str())
        .cloned();
    let seq = payload_seq(&payload).unwrap_or(i64::MAX);

    Some((
        IndexHit {
            id,
            similarity: point.score.min(1.0),
            metadata: IndexMetadata { name, sector },
        },
        seq,
    ))
}

pub(super) fn payload_seq(payload: &HashMap<String, Value>) -> Option<i64> {
    payload.get(PAYLOAD_SEQ).and_then(|v| v.as_integer())
}

/// Point payload for a company. `seq` is the first write time of the id.
pub(super) fn company_payload(metadata: IndexMetadata, seq: i64) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert(PAYLOAD_NAME.to_string(), metadata.name.into());
    if let Some(sector) = metadata.sector {
        payload.insert(PAYLOAD_SECTOR.to_string(), sector.into());
    }
    payload.insert(PAYLOAD_SEQ.to_string(), seq.into());
    payload
}

impl VectorIndex for QdrantVectorIndex {
    async fn upsert(
        &self,
        id: CompanyId,
        vector: &[f32],
        metadata: IndexMetadata,
    ) -> VectorIndexResult<()> {
        validate_embedding_dim(self.dimension, vector.len())?;

        let seq = match self.existing_seq(id).await? {
            Some(seq) => seq,
            None => Utc::now().timestamp_micros(),
        };
        let payload = company_payload(metadata, seq);
        let point = PointStruct::new(id.to_string(), vector.to_vec(), payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| self.upsert_error(e))?;

        debug!(company_id = %id, "Upserted company vector");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> VectorIndexResult<Vec<IndexHit>> {
        validate_embedding_dim(self.dimension, vector.len())?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .with_payload(true)
                    .score_threshold(min_similarity),
            )
            .await
            .map_err(|e| VectorIndexError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        let mut decoded: Vec<(IndexHit, i64)> = response
            .result
            .into_iter()
            .filter_map(hit_from_scored_point)
            .collect();
        decoded.sort_by_key(|(_, seq)| *seq);

        let mut hits: Vec<IndexHit> = decoded.into_iter().map(|(hit, _)| hit).collect();
        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn len(&self) -> VectorIndexResult<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| VectorIndexError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
