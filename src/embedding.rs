use candle_core::{Device, Tensor};
use kdam::{BarExt, tqdm};

use crate::{
    embedding_db::{EmbeddingDb, EmbeddingMatrix},
    error::{Error, Result},
    model_manager::ModelManager,
};

/// Chunks encoded per model call.
const ENCODE_BATCH_SIZE: usize = 16;

/// Encode `(chunk_id, text)` pairs with ColBERT and store the matrices.
///
/// Returns the number of chunks embedded.
pub fn embed_and_store(
    model: &mut ModelManager,
    db: &EmbeddingDb,
    chunks: &[(u64, String)],
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let mut bar =
        tqdm!(total = chunks.len(), desc = "Embedding", unit = " chunks");
    let mut stored = 0;

    for batch in chunks.chunks(ENCODE_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = model.encode_documents(&texts)?;

        // [batch, tokens, dim]; shorter inputs are zero-padded.
        let (batch_size, _num_tokens, dimension) = embeddings.dims3()?;
        if batch_size != batch.len() {
            return Err(Error::Model(format!(
                "model returned {batch_size} embeddings for {} inputs",
                batch.len()
            )));
        }

        let mut entries = Vec::with_capacity(batch_size);
        for (i, (chunk_id, _)) in batch.iter().enumerate() {
            let flat = embeddings.get(i)?.flatten_all()?.to_vec1::<f32>()?;
            entries.push((*chunk_id, trim_padding(flat, dimension)?));
        }
        db.batch_store(&entries)?;

        stored += batch_size;
        if let Err(e) = bar.update(batch_size) {
            tracing::debug!("progress bar update failed: {e}");
        }
    }

    eprintln!();
    Ok(stored)
}

/// Drop all-zero token rows left by batch padding.
fn trim_padding(flat: Vec<f32>, dimension: usize) -> Result<EmbeddingMatrix> {
    let dimension = dimension.max(1);
    let data: Vec<f32> = flat
        .chunks_exact(dimension)
        .filter(|row| row.iter().any(|v| *v != 0.0))
        .flatten()
        .copied()
        .collect();
    let num_tokens = data.len() / dimension;

    EmbeddingMatrix::new(num_tokens as u32, dimension as u32, data)
}

/// A stored matrix as a `[tokens, dim]` tensor on the CPU.
pub fn matrix_tensor(matrix: EmbeddingMatrix) -> Result<Tensor> {
    let shape = (matrix.num_tokens as usize, matrix.dimension as usize);
    Ok(Tensor::from_vec(matrix.data, shape, &Device::Cpu)?)
}
