//! Two-stage semantic search over video segments.
//!
//! Stage 1 scores every candidate in the cheap low-dimensional recall
//! space and keeps the top slice above a similarity floor. Stage 2
//! rescores only those survivors in the precise rerank space and combines
//! both similarities into the final ranking. Queries without a rerank
//! vector fall back to single-stage recall ordering.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::SearchConfig,
    db::{DbError, DbPool},
    models::{SegmentFilter, VideoSegment},
};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search query: {0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// A search query over segments, already embedded by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentQuery {
    /// Query vector in the recall space.
    pub recall_vector: Vec<f32>,
    /// Query vector in the rerank space. Absent means single-stage search.
    #[serde(default)]
    pub rerank_vector: Option<Vec<f32>>,
    /// Restrict to these attachments.
    #[serde(default)]
    pub attachment_ids: Option<Vec<uuid::Uuid>>,
    #[serde(default)]
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
    /// Override the configured stage-1 survivor count.
    #[serde(default)]
    pub recall_count: Option<usize>,
    /// Override the configured stage-1 similarity floor.
    #[serde(default)]
    pub recall_threshold: Option<f32>,
    /// Override the configured rerank weight.
    #[serde(default)]
    pub rerank_weight: Option<f32>,
    /// Override the configured final result count.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A segment with its scores.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSegment {
    pub segment: VideoSegment,
    /// Cosine similarity in the recall space.
    pub recall_score: f32,
    /// Cosine similarity in the rerank space, when that stage ran and the
    /// segment has a rerank vector.
    pub rerank_score: Option<f32>,
    /// Final ranking score.
    pub score: f32,
}

pub struct SearchService {
    db: Arc<DbPool>,
    config: SearchConfig,
    recall_dimensions: usize,
    rerank_dimensions: usize,
}

impl SearchService {
    pub fn new(
        db: Arc<DbPool>,
        config: SearchConfig,
        recall_dimensions: usize,
        rerank_dimensions: usize,
    ) -> Self {
        Self {
            db,
            config,
            recall_dimensions,
            rerank_dimensions,
        }
    }

    pub async fn search(&self, query: SegmentQuery) -> Result<Vec<RankedSegment>, SearchError> {
        // A wrong-length query would score 0 against every stored vector
        // and come back as an empty result; reject it before the DB scan.
        if query.recall_vector.len() != self.recall_dimensions {
            return Err(SearchError::Validation(format!(
                "recall_vector must have {} dimensions, got {}",
                self.recall_dimensions,
                query.recall_vector.len()
            )));
        }
        if let Some(rerank) = &query.rerank_vector
            && rerank.len() != self.rerank_dimensions
        {
            return Err(SearchError::Validation(format!(
                "rerank_vector must have {} dimensions, got {}",
                self.rerank_dimensions,
                rerank.len()
            )));
        }

        let filter = SegmentFilter {
            attachment_ids: query.attachment_ids.clone(),
            created_after: query.created_after,
            created_before: query.created_before,
        };
        let candidates = self.db.segments().list_candidates(&filter).await?;

        let recall_count = query.recall_count.unwrap_or(self.config.recall_count);
        let recall_threshold = query
            .recall_threshold
            .unwrap_or(self.config.recall_threshold);

        // Stage 1: recall-space similarity against every candidate.
        let mut survivors: Vec<RankedSegment> = candidates
            .into_iter()
            .filter_map(|segment| {
                let vector = segment.recall_vector.as_deref()?;
                if vector.len() != query.recall_vector.len() {
                    return None;
                }
                let recall_score = cosine_similarity(&query.recall_vector, vector);
                if recall_score < recall_threshold {
                    return None;
                }
                Some(RankedSegment {
                    segment,
                    recall_score,
                    rerank_score: None,
                    score: recall_score,
                })
            })
            .collect();
        survivors.sort_by(|a, b| b.recall_score.total_cmp(&a.recall_score));
        survivors.truncate(recall_count);

        // Stage 2: rerank-space rescoring of the survivors only.
        if let Some(rerank_query) = &query.rerank_vector {
            let weight = query.rerank_weight.unwrap_or(self.config.rerank_weight);
            for ranked in &mut survivors {
                let rerank_score = ranked
                    .segment
                    .rerank_vector
                    .as_deref()
                    .filter(|v| v.len() == rerank_query.len())
                    .map(|v| cosine_similarity(rerank_query, v));
                ranked.rerank_score = rerank_score;
                // Segments without a rerank vector keep their recall score
                // so a partial embedding is still findable.
                ranked.score = match rerank_score {
                    Some(rerank) => (1.0 - weight) * ranked.recall_score + weight * rerank,
                    None => ranked.recall_score,
                };
            }
            survivors.sort_by(|a, b| b.score.total_cmp(&a.score));
        }

        let limit = query.limit.unwrap_or(self.config.final_count);
        survivors.truncate(limit);
        Ok(survivors)
    }
}

/// Cosine similarity of two equal-length vectors. Zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{db::test_db, models::NewVideoSegment};

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    /// Unit 2-d recall vector at `angle` radians from the query axis.
    fn recall_at(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin()]
    }

    /// Service over tiny 2-dim recall / 3-dim rerank spaces.
    fn service(db: Arc<DbPool>) -> SearchService {
        SearchService::new(db, SearchConfig::default(), 2, 3)
    }

    fn query(recall: Vec<f32>, rerank: Option<Vec<f32>>) -> SegmentQuery {
        SegmentQuery {
            recall_vector: recall,
            rerank_vector: rerank,
            attachment_ids: None,
            created_after: None,
            created_before: None,
            recall_count: None,
            recall_threshold: None,
            rerank_weight: None,
            limit: None,
        }
    }

    fn segment(
        attachment_id: Uuid,
        index: i32,
        recall: Option<Vec<f32>>,
        rerank: Option<Vec<f32>>,
    ) -> NewVideoSegment {
        NewVideoSegment {
            attachment_id,
            segment_index: index,
            start_time_secs: index as f64 * 60.0,
            end_time_secs: (index + 1) as f64 * 60.0,
            content_text: format!("segment {}", index),
            word_count: 100,
            recall_vector: recall,
            rerank_vector: rerank,
        }
    }

    #[tokio::test]
    async fn test_two_stage_reranks_recall_survivors() {
        let db = test_db().await;
        let attachment = Uuid::new_v4();

        // 100 segments fanned across the recall space. Only those within
        // ~53 degrees of the query axis pass the 0.6 threshold. Rerank
        // vectors are arranged so stage 2 inverts the stage-1 order.
        let count = 100;
        let segments: Vec<NewVideoSegment> = (0..count)
            .map(|i| {
                let angle = (i as f32) * std::f32::consts::PI / (count as f32);
                let rerank = vec![(i as f32) / (count as f32), 1.0, 0.0];
                segment(attachment, i as i32, Some(recall_at(angle)), Some(rerank))
            })
            .collect();
        db.segments()
            .replace_for_attachment(attachment, segments)
            .await
            .unwrap();

        let service = service(Arc::clone(&db));
        let results = service
            .search(query(vec![1.0, 0.0], Some(vec![1.0, 0.0, 0.0])))
            .await
            .unwrap();

        assert_eq!(results.len(), 10);
        for ranked in &results {
            assert!(ranked.recall_score >= 0.6);
            assert!(ranked.rerank_score.is_some());
        }
        // Final order follows the combined score, descending.
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Stage 2 changed the order: the best recall segment (index 0) is
        // not the final winner because its rerank vector is the weakest.
        assert_ne!(results[0].segment.segment_index, 0);
    }

    #[tokio::test]
    async fn test_threshold_filters_stage_one() {
        let db = test_db().await;
        let attachment = Uuid::new_v4();
        db.segments()
            .replace_for_attachment(
                attachment,
                vec![
                    segment(attachment, 0, Some(vec![1.0, 0.0]), None),
                    // Orthogonal to the query, similarity 0.
                    segment(attachment, 1, Some(vec![0.0, 1.0]), None),
                ],
            )
            .await
            .unwrap();

        let service = service(Arc::clone(&db));
        let results = service
            .search(query(vec![1.0, 0.0], None))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.segment_index, 0);
        assert!(results[0].rerank_score.is_none());

        // A per-query threshold override widens the stage-1 net.
        let results = service
            .search(SegmentQuery {
                recall_threshold: Some(0.0),
                ..query(vec![1.0, 0.0], None)
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_segments_keep_recall_score_in_stage_two() {
        let db = test_db().await;
        let attachment = Uuid::new_v4();
        db.segments()
            .replace_for_attachment(
                attachment,
                vec![
                    segment(attachment, 0, Some(vec![0.9, 0.1]), Some(vec![1.0, 0.0, 0.0])),
                    // No rerank vector; survives on recall score alone.
                    segment(attachment, 1, Some(vec![1.0, 0.0]), None),
                ],
            )
            .await
            .unwrap();

        let service = service(Arc::clone(&db));
        let results = service
            .search(query(vec![1.0, 0.0], Some(vec![1.0, 0.0, 0.0])))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let partial = results
            .iter()
            .find(|r| r.segment.segment_index == 1)
            .unwrap();
        assert!(partial.rerank_score.is_none());
        assert!((partial.score - partial.recall_score).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_attachment_filter_restricts_candidates() {
        let db = test_db().await;
        let wanted = Uuid::new_v4();
        let other = Uuid::new_v4();
        db.segments()
            .replace_for_attachment(wanted, vec![segment(wanted, 0, Some(vec![1.0, 0.0]), None)])
            .await
            .unwrap();
        db.segments()
            .replace_for_attachment(other, vec![segment(other, 0, Some(vec![1.0, 0.0]), None)])
            .await
            .unwrap();

        let service = service(Arc::clone(&db));
        let results = service
            .search(SegmentQuery {
                attachment_ids: Some(vec![wanted]),
                ..query(vec![1.0, 0.0], None)
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.attachment_id, wanted);
    }

    #[tokio::test]
    async fn test_empty_query_vector_is_rejected() {
        let db = test_db().await;
        let service = service(db);
        let err = service
            .search(query(vec![], None))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_wrong_dimension_query_is_rejected() {
        let db = test_db().await;
        let attachment = Uuid::new_v4();
        db.segments()
            .replace_for_attachment(attachment, vec![segment(attachment, 0, Some(vec![1.0, 0.0]), None)])
            .await
            .unwrap();
        let service = service(db);

        // A 5-dim query against the 2-dim recall space must error, not
        // silently match nothing.
        let err = service
            .search(query(vec![1.0, 0.0, 0.0, 0.0, 0.0], None))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));

        // Same for the rerank space.
        let err = service
            .search(query(vec![1.0, 0.0], Some(vec![1.0, 0.0])))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }
}
