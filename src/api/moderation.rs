//! Moderation endpoint type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Moderation request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModerationRequest {
    pub input: String,
}

/// Moderation response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModerationResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub results: Vec<ModerationResult>,
}

/// Classification of a single input
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModerationResult {
    pub flagged: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
}

impl ModerationResult {
    /// Names of the categories the input was flagged for
    pub fn flagged_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|&(_, &hit)| hit)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
