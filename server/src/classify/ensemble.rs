use std::collections::HashMap;

use entity::sea_orm_active_enums::EmailCategory;
use serde::{Deserialize, Serialize};

use crate::{
    db_core::prelude::DatabaseConnection,
    error::AppResult,
    provider::StructuredCompletion,
    server_config::{cfg, LayerWeights},
};

use super::{
    clamp_unit, history::HistoryClassifier, model::ModelClassifier, rules, EmailToClassify,
    LayerKind, LayerScore,
};

const ALL_AGREE_BOOST: f32 = 0.20;
const MAJORITY_BOOST: f32 = 0.10;
const DISAGREEMENT_PENALTY: f32 = 0.20;

/// The single combined verdict for a message, with the per-layer trace kept
/// for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleVerdict {
    pub category: EmailCategory,
    pub importance: f32,
    pub confidence: f32,
    pub needs_review: bool,
    /// Variance across the confidences of the layers that scored; used by
    /// the review router.
    pub variance: f32,
    pub bootstrap: bool,
    pub layer_trace: Vec<LayerScore>,
}

pub struct EnsembleClassifier;

impl EnsembleClassifier {
    /// Runs the three layers and combines them. The rule layer is a pure
    /// local function and the history layer a single indexed lookup; the
    /// model layer runs last so its prompt can carry their verdicts as
    /// context. A decisive rule-layer spam verdict short-circuits the rest.
    pub async fn classify<P>(
        conn: &DatabaseConnection,
        provider: &P,
        email: &EmailToClassify,
        bootstrap: bool,
    ) -> AppResult<EnsembleVerdict>
    where
        P: StructuredCompletion + ?Sized,
    {
        let rule = rules::classify(email);

        if rule.category == Some(EmailCategory::Spam) && rule.confidence >= 0.95 {
            return Ok(EnsembleVerdict {
                category: EmailCategory::Spam,
                importance: rule.importance,
                confidence: rule.confidence,
                needs_review: false,
                variance: 0.0,
                bootstrap,
                layer_trace: vec![rule],
            });
        }

        let history = HistoryClassifier::classify(
            conn,
            &email.account_id,
            &email.sender,
            &email.sender_domain,
        )
        .await?;

        let skip_model = cfg.classification.smart_llm_skip && smart_skip_applies(&rule, &history);

        let mut layer_trace = vec![rule, history];
        if skip_model {
            tracing::debug!("Skipping model layer for {}: deterministic layers agree", email.email_id);
        } else {
            let model = ModelClassifier::classify(
                provider,
                email,
                &layer_trace[0],
                &layer_trace[1],
            )
            .await;
            layer_trace.push(model);
        }

        Ok(combine(layer_trace, bootstrap))
    }
}

/// The deterministic layers can settle a message without the model when they
/// agree confidently on something unimportant.
fn smart_skip_applies(rule: &LayerScore, history: &LayerScore) -> bool {
    !rule.is_null()
        && !history.is_null()
        && rule.category == history.category
        && rule.confidence >= 0.70
        && history.confidence >= 0.70
        && rule.importance.max(history.importance) <= 0.80
}

fn weight_for(layer: LayerKind, weights: &LayerWeights) -> f32 {
    match layer {
        LayerKind::Rule => weights.rule,
        LayerKind::History => weights.history,
        LayerKind::Model => weights.model,
    }
}

/// Weighted combination per the ensemble contract: null-score weights are
/// redistributed proportionally, category is chosen by agreement precedence,
/// and the agreement boost/penalty is applied after the weighted sum.
pub fn combine(layer_trace: Vec<LayerScore>, bootstrap: bool) -> EnsembleVerdict {
    let weights = if bootstrap {
        cfg.classification.weights.bootstrap
    } else {
        cfg.classification.weights.steady
    };

    let active: Vec<&LayerScore> = layer_trace.iter().filter(|s| !s.is_null()).collect();

    if active.is_empty() {
        return EnsembleVerdict {
            category: EmailCategory::NiceToKnow,
            importance: 0.5,
            confidence: 0.0,
            needs_review: true,
            variance: 0.0,
            bootstrap,
            layer_trace,
        };
    }

    let total_weight: f32 = active.iter().map(|s| weight_for(s.layer, &weights)).sum();
    let effective = |s: &LayerScore| weight_for(s.layer, &weights) / total_weight;

    let importance = clamp_unit(active.iter().map(|s| effective(s) * s.importance).sum());
    let mut confidence: f32 = active.iter().map(|s| effective(s) * s.confidence).sum();

    let mut needs_review = false;
    let category = if active.len() == 1 {
        active[0].category.unwrap()
    } else {
        let mut counts: HashMap<EmailCategory, usize> = HashMap::new();
        for score in &active {
            *counts.entry(score.category.unwrap()).or_insert(0) += 1;
        }

        if counts.len() == 1 {
            // The full boost needs all three layers in agreement; two
            // agreeing while the third abstained is still only a majority.
            if active.len() == 3 {
                confidence += ALL_AGREE_BOOST;
            } else {
                confidence += MAJORITY_BOOST;
            }
            active[0].category.unwrap()
        } else if let Some((majority, _)) = counts.iter().find(|(_, n)| **n >= 2) {
            confidence += MAJORITY_BOOST;
            *majority
        } else {
            confidence -= DISAGREEMENT_PENALTY;
            needs_review = true;
            active
                .iter()
                .max_by(|a, b| effective(a).partial_cmp(&effective(b)).unwrap())
                .and_then(|s| s.category)
                .unwrap()
        }
    };

    let confidence = clamp_unit(confidence);

    let mean_confidence: f32 =
        active.iter().map(|s| s.confidence).sum::<f32>() / active.len() as f32;
    let variance = active
        .iter()
        .map(|s| (s.confidence - mean_confidence).powi(2))
        .sum::<f32>()
        / active.len() as f32;

    EnsembleVerdict {
        category,
        importance,
        confidence,
        needs_review,
        variance,
        bootstrap,
        layer_trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(layer: LayerKind, category: EmailCategory, importance: f32, confidence: f32) -> LayerScore {
        LayerScore {
            layer,
            category: Some(category),
            importance,
            confidence,
            reasoning: "test".to_string(),
            processing_time_ms: 1,
            model_provider: None,
        }
    }

    #[test]
    fn all_agree_boost_applies_to_weighted_sum() {
        // All three agree with equal confidence: final is the weighted sum
        // (== that confidence) plus the all-agree boost.
        let verdict = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.6),
                score(LayerKind::History, EmailCategory::Newsletter, 0.3, 0.6),
                score(LayerKind::Model, EmailCategory::Newsletter, 0.3, 0.6),
            ],
            false,
        );

        assert_eq!(verdict.category, EmailCategory::Newsletter);
        assert!((verdict.confidence - 0.8).abs() < 1e-6);
        assert!(!verdict.needs_review);
        assert_eq!(verdict.variance, 0.0);
    }

    #[test]
    fn two_of_three_agreement_takes_majority_with_smaller_boost() {
        let verdict = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.65),
                score(LayerKind::History, EmailCategory::Important, 0.8, 0.80),
                score(LayerKind::Model, EmailCategory::Important, 0.7, 0.70),
            ],
            false,
        );

        assert_eq!(verdict.category, EmailCategory::Important);
        // 0.2*0.65 + 0.3*0.80 + 0.5*0.70 = 0.72, plus 0.10 majority boost
        assert!((verdict.confidence - 0.82).abs() < 1e-5);
        assert!(!verdict.needs_review);
    }

    #[test]
    fn full_disagreement_penalizes_and_flags_review() {
        let verdict = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.65),
                score(LayerKind::History, EmailCategory::Important, 0.8, 0.80),
                score(LayerKind::Model, EmailCategory::NiceToKnow, 0.5, 0.70),
            ],
            false,
        );

        // Steady phase: model carries the largest weight (0.50).
        assert_eq!(verdict.category, EmailCategory::NiceToKnow);
        // 0.72 weighted sum minus the 0.20 disagreement penalty.
        assert!((verdict.confidence - 0.52).abs() < 1e-5);
        assert!(verdict.needs_review);
        assert!(verdict.variance > 0.0);
    }

    #[test]
    fn null_layer_weight_redistributes_proportionally() {
        let verdict = combine(
            vec![
                LayerScore::null(LayerKind::Rule, "no match"),
                score(LayerKind::History, EmailCategory::Important, 0.9, 0.8),
                score(LayerKind::Model, EmailCategory::Important, 0.7, 0.6),
            ],
            false,
        );

        // history 0.3 and model 0.5 renormalize to 0.375 / 0.625. Only two
        // layers scored, so their agreement earns the majority boost, not
        // the full-panel one.
        let expected_conf = 0.375 * 0.8 + 0.625 * 0.6 + MAJORITY_BOOST;
        assert!((verdict.confidence - expected_conf).abs() < 1e-5);
        let expected_importance = 0.375 * 0.9 + 0.625 * 0.7;
        assert!((verdict.importance - expected_importance).abs() < 1e-5);
    }

    #[test]
    fn degraded_layer_cannot_outboost_full_agreement() {
        let full_panel = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Important, 0.8, 0.8),
                score(LayerKind::History, EmailCategory::Important, 0.8, 0.8),
                score(LayerKind::Model, EmailCategory::Important, 0.8, 0.8),
            ],
            false,
        );
        let degraded = combine(
            vec![
                LayerScore::null(LayerKind::Rule, "no match"),
                score(LayerKind::History, EmailCategory::Important, 0.8, 0.8),
                score(LayerKind::Model, EmailCategory::Important, 0.8, 0.8),
            ],
            false,
        );

        // Identical layer confidences: the weighted sums match, so the
        // boost is the only difference.
        assert!((full_panel.confidence - 1.0).abs() < 1e-6);
        assert!((degraded.confidence - 0.9).abs() < 1e-6);
        assert!(degraded.confidence < full_panel.confidence);
    }

    #[test]
    fn single_active_layer_gets_no_boost() {
        let verdict = combine(
            vec![
                LayerScore::null(LayerKind::Rule, "no match"),
                LayerScore::null(LayerKind::History, "no history"),
                score(LayerKind::Model, EmailCategory::ActionRequired, 0.7, 0.72),
            ],
            false,
        );

        assert_eq!(verdict.category, EmailCategory::ActionRequired);
        assert!((verdict.confidence - 0.72).abs() < 1e-6);
        assert!(!verdict.needs_review);
    }

    #[test]
    fn all_null_layers_produce_zero_confidence_review_verdict() {
        let verdict = combine(
            vec![
                LayerScore::null(LayerKind::Rule, "no match"),
                LayerScore::null(LayerKind::History, "no history"),
                LayerScore::null(LayerKind::Model, "model down"),
            ],
            false,
        );

        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.needs_review);
    }

    #[test]
    fn bootstrap_weights_favor_the_model() {
        let trace = vec![
            score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.9),
            score(LayerKind::History, EmailCategory::Important, 0.8, 0.9),
            score(LayerKind::Model, EmailCategory::NiceToKnow, 0.5, 0.9),
        ];

        let bootstrap = combine(trace.clone(), true);
        let steady = combine(trace, false);

        // Disagreement in both phases: model wins both, but bootstrap leans
        // harder on it for importance.
        assert_eq!(bootstrap.category, EmailCategory::NiceToKnow);
        assert_eq!(steady.category, EmailCategory::NiceToKnow);
        assert!(bootstrap.bootstrap);
        let b_imp = 0.30 * 0.3 + 0.10 * 0.8 + 0.60 * 0.5;
        assert!((bootstrap.importance - b_imp).abs() < 1e-5);
    }

    #[test]
    fn clamping_keeps_confidence_in_unit_range() {
        let verdict = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Spam, 0.0, 0.95),
                score(LayerKind::History, EmailCategory::Spam, 0.0, 1.0),
                score(LayerKind::Model, EmailCategory::Spam, 0.0, 1.0),
            ],
            false,
        );

        assert_eq!(verdict.confidence, 1.0);
    }

    #[test]
    fn smart_skip_needs_confident_agreement_on_unimportant_mail() {
        let rule = score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.70);
        let history = score(LayerKind::History, EmailCategory::Newsletter, 0.3, 0.75);
        assert!(smart_skip_applies(&rule, &history));

        let disagreeing = score(LayerKind::History, EmailCategory::Important, 0.8, 0.9);
        assert!(!smart_skip_applies(&rule, &disagreeing));

        let low_confidence = score(LayerKind::History, EmailCategory::Newsletter, 0.3, 0.5);
        assert!(!smart_skip_applies(&rule, &low_confidence));

        let important = score(LayerKind::History, EmailCategory::Newsletter, 0.9, 0.8);
        assert!(!smart_skip_applies(&rule, &important));

        let null = LayerScore::null(LayerKind::History, "none");
        assert!(!smart_skip_applies(&rule, &null));
    }

    #[test]
    fn two_layer_disagreement_flags_review() {
        // Smart-skip case: only rule and history ran and they disagree.
        let verdict = combine(
            vec![
                score(LayerKind::Rule, EmailCategory::Newsletter, 0.3, 0.7),
                score(LayerKind::History, EmailCategory::Important, 0.8, 0.8),
            ],
            false,
        );

        // History carries the larger weight in steady phase.
        assert_eq!(verdict.category, EmailCategory::Important);
        assert!(verdict.needs_review);
    }
}
