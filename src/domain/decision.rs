//! Shared vocabulary between the Decision Pipeline and the provider
//! capabilities (ML predictor, sentiment source) that feed it.

use crate::domain::fx_types::SignalKind;
use serde::{Deserialize, Serialize};

/// A directional opinion with a confidence, as returned by `Predictor` or
/// `SentimentSource`. `label` is informational (e.g. a sentiment bucket
/// name) and not consulted by the fusion rules themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOpinion {
    pub kind: SignalKind,
    pub confidence: f64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FusionFlags {
    pub use_ml: bool,
    pub use_sentiment: bool,
}
