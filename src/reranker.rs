use candle_core::{Device, Tensor};
use rayon::prelude::*;

use crate::{
    chunking::chunk_doc_id,
    embedding::matrix_tensor,
    embedding_db::EmbeddingDb,
    error::Result,
};

/// A candidate document rescored by ColBERT.
#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub doc_num_id: u64,
    pub score: f32,
}

/// A first-stage hit to rescore: document key and its chunk count.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub doc_num_id: u64,
    pub chunks: u64,
}

/// Rerank candidates by ColBERT MaxSim.
///
/// A document scores as its best chunk. Candidates without any stored
/// embedding are dropped. Returns documents sorted by score descending.
pub fn rerank(
    query_embedding: &Tensor,
    candidates: &[Candidate],
    embedding_db: &EmbeddingDb,
) -> Result<Vec<RankedDocument>> {
    let query = query_embedding.to_device(&Device::Cpu)?;

    let mut ranked: Vec<RankedDocument> = candidates
        .par_iter()
        .filter_map(|candidate| {
            let ids: Vec<u64> = (0..candidate.chunks.max(1) as usize)
                .map(|i| chunk_doc_id(candidate.doc_num_id, i))
                .collect();
            let matrices = match embedding_db.batch_load(&ids) {
                Ok(matrices) => matrices,
                Err(e) => {
                    tracing::warn!(
                        doc = candidate.doc_num_id,
                        "cannot load embeddings: {e}"
                    );
                    return None;
                }
            };

            let score = matrices
                .into_iter()
                .filter_map(|(_, matrix)| matrix)
                .filter_map(|matrix| matrix_tensor(matrix).ok())
                .filter_map(|chunk| maxsim(&query, &chunk).ok())
                .reduce(f32::max)?;

            Some(RankedDocument {
                doc_num_id: candidate.doc_num_id,
                score,
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(ranked)
}

/// MaxSim between a `[Q, D]` query matrix and a `[T, D]` document matrix:
/// the sum over query tokens of the best dot product with any document token.
fn maxsim(query_embedding: &Tensor, doc_embedding: &Tensor) -> Result<f32> {
    let sim_matrix = query_embedding.matmul(&doc_embedding.t()?)?;
    let score = sim_matrix.max(1)?.sum_all()?.to_scalar::<f32>()?;
    Ok(score)
}
