//! Decision Pipeline (spec.md §4.5): fuses the technical signal with
//! optional ML and sentiment opinions. Pure function of its inputs —
//! provider failures are handled by the caller, which passes `None`.

use crate::domain::decision::{FusionFlags, ProviderOpinion};
use crate::domain::fx_types::{Signal, SignalKind};

pub fn fuse(
    technical: &Signal,
    ml: Option<&ProviderOpinion>,
    sentiment: Option<&ProviderOpinion>,
    flags: FusionFlags,
    min_confidence: f64,
) -> Signal {
    let mut result = technical.clone();

    if let (Some(m), true) = (ml, flags.use_ml) {
        apply_ml(&mut result, technical, m);
    }

    if let (Some(s), true) = (sentiment, flags.use_sentiment) {
        apply_sentiment(&mut result, s);
    }

    if result.kind != SignalKind::Hold && result.confidence < min_confidence {
        downgrade_to_hold(&mut result, "below confidence threshold");
    }

    result
}

fn apply_ml(result: &mut Signal, technical: &Signal, ml: &ProviderOpinion) {
    result.ml_enhanced = true;
    result.ml_confidence = Some(ml.confidence);

    if technical.kind == SignalKind::Hold && ml.kind != SignalKind::Hold && ml.confidence >= 0.65 {
        result.kind = ml.kind;
        result.confidence = 0.7 * ml.confidence;
        result.reason = "ML promoted a HOLD to directional".to_string();
        carry_brackets_for_kind(result, technical);
    } else if technical.kind.is_directional() && technical.kind == ml.kind {
        result.confidence = 0.3 * technical.confidence + 0.7 * ml.confidence;
    } else if technical.kind.is_directional() && ml.kind.is_directional() && technical.kind != ml.kind {
        result.kind = ml.kind;
        result.confidence = 0.7 * ml.confidence * 0.85;
        result.reason = "ML overrode disagreeing technical signal".to_string();
        carry_brackets_for_kind(result, technical);
    }
}

/// When ML flips or promotes the signal's direction, the SL/TP distances
/// computed by the technical strategy are kept but re-anchored to the new
/// side so the bracket invariant still holds.
fn carry_brackets_for_kind(result: &mut Signal, technical: &Signal) {
    if result.kind == technical.kind {
        return;
    }
    let ref_price = result.ref_price;
    let (sl_dist, tp_dist) = match (technical.stop_loss, technical.take_profit) {
        (Some(sl), Some(tp)) => ((ref_price - sl).abs(), (tp - ref_price).abs()),
        _ => return,
    };
    match result.kind {
        SignalKind::Buy => {
            result.stop_loss = Some(ref_price - sl_dist);
            result.take_profit = Some(ref_price + tp_dist);
        }
        SignalKind::Sell => {
            result.stop_loss = Some(ref_price + sl_dist);
            result.take_profit = Some(ref_price - tp_dist);
        }
        SignalKind::Hold => {
            result.stop_loss = None;
            result.take_profit = None;
        }
    }
}

fn apply_sentiment(result: &mut Signal, sentiment: &ProviderOpinion) {
    result.sentiment_label = Some(sentiment.label.clone());
    result.sentiment_confidence = Some(sentiment.confidence);

    if result.kind == SignalKind::Hold {
        return;
    }

    if sentiment.kind == result.kind {
        let factor = (1.0 + 0.2 * sentiment.confidence).min(1.2);
        result.confidence = (result.confidence * factor).min(1.0);
    } else if sentiment.kind.opposes(result.kind) && sentiment.confidence >= 0.7 {
        downgrade_to_hold(result, "sentiment veto");
    }
}

fn downgrade_to_hold(result: &mut Signal, reason: &str) {
    result.kind = SignalKind::Hold;
    result.stop_loss = None;
    result.take_profit = None;
    result.confidence = 0.0;
    result.reason = reason.to_string();
}
