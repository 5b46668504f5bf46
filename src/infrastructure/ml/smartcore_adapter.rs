//! `Predictor` adapter backed by a `smartcore` random forest regressor,
//! grounded in the teacher's `SmartCorePredictor` (JSON-serialized model,
//! falls back to neutral when the file is absent). The model internals
//! are out of scope (spec.md §1 non-goal); this adapter only owns the
//! feature vector → `ProviderOpinion` translation.

use crate::domain::decision::ProviderOpinion;
use crate::domain::fx_ports::Predictor;
use crate::domain::fx_types::{Bar, SignalKind};
use async_trait::async_trait;
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fs::File;
use std::io::Read as _;
use std::path::PathBuf;
use tracing::{error, info, warn};

type Model = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct SmartCorePredictor {
    model: Option<Model>,
}

impl SmartCorePredictor {
    pub fn load(model_path: PathBuf) -> Self {
        if !model_path.exists() {
            warn!(path = ?model_path, "ML model file not found, predictor will report neutral");
            return Self { model: None };
        }
        match File::open(&model_path).and_then(|mut f| {
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            Ok(buf)
        }) {
            Ok(bytes) => match serde_json::from_slice::<Model>(&bytes) {
                Ok(model) => {
                    info!(path = ?model_path, "loaded ML model");
                    Self { model: Some(model) }
                }
                Err(e) => {
                    error!(path = ?model_path, error = %e, "failed to deserialize ML model");
                    Self { model: None }
                }
            },
            Err(e) => {
                error!(path = ?model_path, error = %e, "failed to read ML model file");
                Self { model: None }
            }
        }
    }

    /// Five-feature momentum/volatility summary from the closed-bar
    /// series: last three close-to-close returns, range/close ratio of
    /// the last bar, and the simple 5-bar vs 20-bar return spread.
    fn features(bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let n = closes.len();
        let ret = |lag: usize| -> f64 {
            if n > lag && closes[n - 1 - lag] != 0.0 {
                (closes[n - 1] - closes[n - 1 - lag]) / closes[n - 1 - lag]
            } else {
                0.0
            }
        };
        let last_bar = bars.last();
        let range_ratio = last_bar
            .map(|b| if b.close != 0.0 { (b.high - b.low) / b.close } else { 0.0 })
            .unwrap_or(0.0);
        vec![ret(1), ret(3), ret(5), range_ratio, ret(5) - ret(20)]
    }
}

#[async_trait]
impl Predictor for SmartCorePredictor {
    async fn predict(&self, _instrument: &str, bars: &[Bar]) -> anyhow::Result<ProviderOpinion> {
        let Some(model) = &self.model else {
            return Ok(ProviderOpinion { kind: SignalKind::Hold, confidence: 0.0, label: "no model loaded".to_string() });
        };
        let feature_vec = Self::features(bars);
        let matrix = DenseMatrix::from_2d_vec(&vec![feature_vec])
            .map_err(|e| anyhow::anyhow!("feature matrix build failed: {e}"))?;
        let predictions = model
            .predict(&matrix)
            .map_err(|e| anyhow::anyhow!("random forest prediction failed: {e}"))?;
        let score = *predictions.first().ok_or_else(|| anyhow::anyhow!("no prediction returned"))?;

        let kind = if score > 0.1 {
            SignalKind::Buy
        } else if score < -0.1 {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        };
        Ok(ProviderOpinion { kind, confidence: score.abs().min(1.0), label: "smartcore_random_forest".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Bar {
        Bar { open_time: chrono::Utc::now(), open: close, high: close + 0.001, low: close - 0.001, close, volume: 1.0 }
    }

    #[tokio::test]
    async fn missing_model_reports_neutral_hold() {
        let predictor = SmartCorePredictor::load(PathBuf::from("/nonexistent/model.json"));
        let bars: Vec<Bar> = (0..10).map(|i| bar(1.0 + i as f64 * 0.0001)).collect();
        let opinion = predictor.predict("EURUSD", &bars).await.unwrap();
        assert_eq!(opinion.kind, SignalKind::Hold);
        assert_eq!(opinion.confidence, 0.0);
    }

    #[test]
    fn feature_vector_has_five_elements() {
        let bars: Vec<Bar> = (0..25).map(|i| bar(1.0 + i as f64 * 0.0001)).collect();
        assert_eq!(SmartCorePredictor::features(&bars).len(), 5);
    }
}
