//! Token counting for request budgeting

use tiktoken_rs::CoreBPE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("Unknown model: {model_name}")]
    UnknownModel { model_name: String },
}

/// Counts the tokens a piece of text costs against the request budget
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// BPE tokenizer matching the upstream model's encoding
pub struct TiktokenCounter {
    bpe: CoreBPE,
    model_name: String,
}

impl TiktokenCounter {
    pub fn for_model(model_name: &str) -> Result<Self, TokenizerError> {
        tracing::debug!(model = model_name, "Loading BPE for token counting");
        let bpe = tiktoken_rs::get_bpe_from_model(model_name).map_err(|_| {
            TokenizerError::UnknownModel {
                model_name: model_name.to_string(),
            }
        })?;

        Ok(Self {
            bpe,
            model_name: model_name.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}
