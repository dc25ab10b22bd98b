use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Owns the ColBERT encoder. The model is downloaded (or read from a local
/// directory) on first use, so opening a BM25-only index never touches it.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl ModelManager {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model: None,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            tracing::info!(model = %self.model_id, "loading ColBERT model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(|e| {
                    Error::Model(format!(
                        "failed to load {}: {e}",
                        self.model_id
                    ))
                })?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Model("model not loaded".to_string()))
    }

    /// Encode document texts into per-token embeddings `[batch, tokens, dim]`.
    pub fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        model
            .encode(texts, false)
            .map_err(|e| Error::Model(format!("document encoding failed: {e}")))
    }

    /// Encode a query into a `[tokens, dim]` embedding matrix.
    pub fn encode_query(&mut self, query: &str) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        let embeddings = model
            .encode(&[query.to_string()], true)
            .map_err(|e| Error::Model(format!("query encoding failed: {e}")))?;
        Ok(embeddings.squeeze(0)?)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
