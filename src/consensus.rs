//! Weighted-voting consensus over provider responses
//!
//! Consensus here is representative selection, not text synthesis: each
//! valid response is scored by its normalized vote weight (configured
//! priority blended with observed latency) plus its average token-set
//! similarity to the other responses, and the winner's text is returned
//! verbatim. Degenerate inputs (no valid responses, a single response,
//! identical responses) are normal outcomes, never errors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::ProviderResponse;
use crate::registry::ProviderConfig;

/// Fixed confidence when only one provider produced a usable answer.
pub const SINGLE_RESPONSE_CONFIDENCE: f64 = 0.7;

/// Confidence ceiling: even perfect agreement keeps residual uncertainty.
pub const CONFIDENCE_CAP: f64 = 0.95;

/// Sentinel text when no provider produced a usable answer.
pub const NO_RESPONSE_TEXT: &str = "Unable to generate a response from any provider.";

/// Priority assumed for a response whose provider is missing from the
/// snapshot (should not happen through normal dispatch).
const DEFAULT_PRIORITY: u8 = 3;

const PRIORITY_SHARE: f64 = 0.6;
const LATENCY_SHARE: f64 = 0.4;
const LATENCY_SCALE_MS: f64 = 5000.0;
const LATENCY_WEIGHT_FLOOR: f64 = 0.1;

/// Normalized trust score assigned to one provider's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteWeight {
    pub provider: String,
    /// In [0, 1]; a breakdown of length > 1 sums to 1.0.
    pub weight: f64,
}

/// The synthesized outcome of a consensus dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// The selected representative answer, verbatim from one provider.
    pub consensus_text: String,
    /// Overall trust in the answer, in [0, 0.95].
    pub confidence: f64,
    /// Every dispatch attempt, failures included, for audit.
    pub responses: Vec<ProviderResponse>,
    /// Human-readable explanation of the outcome.
    pub reasoning: String,
    /// Normalized weight per valid response, in `responses` order.
    pub vote_breakdown: Vec<VoteWeight>,
}

/// Token-set (Jaccard) similarity between two texts.
///
/// Tokens are lowercased whitespace splits; tokens of two characters or
/// fewer are discarded. Similarity is |intersection| / |union|, or 0 when
/// both sets are empty. Symmetric by construction.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Compute a consensus over the full response set.
///
/// `providers` is the enabled-provider snapshot the responses were
/// dispatched against; it supplies each provider's configured priority.
/// Total over every input: degenerate sets produce low/zero-confidence
/// results, never errors.
pub fn evaluate(responses: Vec<ProviderResponse>, providers: &[ProviderConfig]) -> ConsensusResult {
    let valid_indices: Vec<usize> = responses
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_valid())
        .map(|(i, _)| i)
        .collect();

    debug!(
        responses = responses.len(),
        valid = valid_indices.len(),
        "evaluating consensus"
    );

    match valid_indices.len() {
        0 => ConsensusResult {
            consensus_text: NO_RESPONSE_TEXT.to_string(),
            confidence: 0.0,
            responses,
            reasoning: "No provider produced a usable answer.".to_string(),
            vote_breakdown: Vec::new(),
        },
        1 => {
            let sole = &responses[valid_indices[0]];
            let reasoning = format!(
                "Only {} ({}) produced a usable answer; confidence reduced for lack of corroboration.",
                sole.provider, sole.model
            );
            let vote_breakdown = vec![VoteWeight {
                provider: sole.provider.clone(),
                weight: 1.0,
            }];
            ConsensusResult {
                consensus_text: sole.text.clone(),
                confidence: SINGLE_RESPONSE_CONFIDENCE,
                reasoning,
                vote_breakdown,
                responses,
            }
        }
        _ => weighted_vote(responses, &valid_indices, providers),
    }
}

fn weighted_vote(
    responses: Vec<ProviderResponse>,
    valid_indices: &[usize],
    providers: &[ProviderConfig],
) -> ConsensusResult {
    let valid: Vec<&ProviderResponse> = valid_indices.iter().map(|&i| &responses[i]).collect();
    let n = valid.len();

    // Mean pairwise similarity of each response against the others.
    let mut avg_similarity = vec![0.0f64; n];
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..n {
            if i != j {
                sum += token_similarity(&valid[i].text, &valid[j].text);
            }
        }
        avg_similarity[i] = sum / (n - 1) as f64;
    }

    // Raw weight blends configured priority with observed latency. The
    // latency term floors at 0.1 so no provider is zero-weighted purely
    // for being slow.
    let raw_weights: Vec<f64> = valid
        .iter()
        .map(|r| {
            let priority = priority_of(providers, &r.provider) as f64;
            let priority_weight = ((5.0 - priority) / 4.0).max(0.0);
            let latency_weight =
                (1.0 - r.latency_ms as f64 / LATENCY_SCALE_MS).max(LATENCY_WEIGHT_FLOOR);
            PRIORITY_SHARE * priority_weight + LATENCY_SHARE * latency_weight
        })
        .collect();

    let total: f64 = raw_weights.iter().sum();
    let weights: Vec<f64> = if total > 0.0 {
        raw_weights.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    };

    // Selection: half weight, half agreement. Strict comparison keeps
    // ties deterministic — first seen wins.
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..n {
        let score = 0.5 * weights[i] + 0.5 * avg_similarity[i];
        if score > best_score {
            best = i;
            best_score = score;
        }
    }

    let overall_similarity: f64 = avg_similarity.iter().sum::<f64>() / n as f64;
    let confidence = (0.5 + 0.5 * overall_similarity).min(CONFIDENCE_CAP);

    let agreement = if overall_similarity > 0.7 {
        "high"
    } else if overall_similarity > 0.4 {
        "moderate"
    } else {
        "low"
    };

    let winner = valid[best];
    let reasoning = format!(
        "{} providers responded with {} agreement; selected {} ({}) at {:.0}% confidence.",
        n,
        agreement,
        winner.provider,
        winner.model,
        confidence * 100.0
    );

    debug!(
        winner = %winner.provider,
        confidence,
        agreement,
        "consensus selected"
    );

    let vote_breakdown: Vec<VoteWeight> = valid
        .iter()
        .zip(weights.iter())
        .map(|(r, &weight)| VoteWeight {
            provider: r.provider.clone(),
            weight,
        })
        .collect();

    ConsensusResult {
        consensus_text: winner.text.clone(),
        confidence,
        reasoning,
        vote_breakdown,
        responses,
    }
}

fn priority_of(providers: &[ProviderConfig], name: &str) -> u8 {
    providers
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.priority)
        .unwrap_or(DEFAULT_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ProviderError, ProviderFault};

    fn provider(name: &str, priority: u8) -> ProviderConfig {
        ProviderConfig::new(name, format!("{name}-model"), priority, "http://test")
    }

    fn ok(name: &str, text: &str, latency_ms: u64) -> ProviderResponse {
        ProviderResponse::success(name, format!("{name}-model"), text, latency_ms)
    }

    fn failed(name: &str) -> ProviderResponse {
        ProviderResponse::failure(
            name,
            format!("{name}-model"),
            ProviderError::new(name, ProviderFault::Network("down".to_string())),
            50,
        )
    }

    #[test]
    fn test_similarity_symmetric() {
        let pairs = [
            ("the sky is blue", "blue sky above"),
            ("completely different words", "nothing shared here"),
            ("", "some text"),
            ("identical phrase here", "identical phrase here"),
        ];
        for (a, b) in pairs {
            assert_eq!(token_similarity(a, b), token_similarity(b, a));
        }
    }

    #[test]
    fn test_similarity_short_tokens_discarded() {
        // "is", "a", "an" are all length <= 2 and drop out entirely
        assert_eq!(token_similarity("is a an", "a an is"), 0.0);
        assert_eq!(token_similarity("the cat", "the dog"), 1.0 / 3.0);
    }

    #[test]
    fn test_similarity_counts_characters_not_bytes() {
        // "dí" is two characters but three bytes; it must still be
        // discarded, leaving both token sets empty
        assert_eq!(token_similarity("dí so", "dí no"), 0.0);
        // multibyte tokens longer than two characters participate normally
        assert_eq!(
            token_similarity("crème brûlée", "crème fraîche"),
            1.0 / 3.0
        );
    }

    #[test]
    fn test_similarity_identical_token_sets() {
        let a = "the sky is blue and clear today";
        let b = "today the sky is clear and blue";
        assert_eq!(token_similarity(a, b), 1.0);
    }

    #[test]
    fn test_zero_valid_responses_sentinel() {
        let result = evaluate(vec![failed("a"), failed("b")], &[provider("a", 1)]);
        assert_eq!(result.consensus_text, NO_RESPONSE_TEXT);
        assert_eq!(result.confidence, 0.0);
        assert!(result.vote_breakdown.is_empty());
        assert_eq!(result.responses.len(), 2);
    }

    #[test]
    fn test_empty_input_sentinel() {
        let result = evaluate(Vec::new(), &[]);
        assert_eq!(result.confidence, 0.0);
        assert!(result.responses.is_empty());
    }

    #[test]
    fn test_single_valid_response() {
        let result = evaluate(
            vec![ok("solo", "the answer", 100), failed("down")],
            &[provider("solo", 1), provider("down", 2)],
        );
        assert_eq!(result.consensus_text, "the answer");
        assert_eq!(result.confidence, SINGLE_RESPONSE_CONFIDENCE);
        assert_eq!(result.vote_breakdown.len(), 1);
        assert_eq!(result.vote_breakdown[0].provider, "solo");
        assert_eq!(result.vote_breakdown[0].weight, 1.0);
        assert!(result.reasoning.contains("solo"));
    }

    #[test]
    fn test_empty_text_is_not_valid() {
        let result = evaluate(
            vec![ok("blank", "   ", 10), ok("real", "actual words here", 10)],
            &[provider("blank", 1), provider("real", 2)],
        );
        // blank response is excluded, leaving the single-valid path
        assert_eq!(result.consensus_text, "actual words here");
        assert_eq!(result.confidence, SINGLE_RESPONSE_CONFIDENCE);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let result = evaluate(
            vec![
                ok("a", "first answer text", 120),
                ok("b", "second answer text", 900),
                ok("c", "third answer text", 2400),
            ],
            &[provider("a", 1), provider("b", 2), provider("c", 3)],
        );
        let sum: f64 = result.vote_breakdown.iter().map(|v| v.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(result
            .vote_breakdown
            .iter()
            .all(|v| (0.0..=1.0).contains(&v.weight)));
    }

    #[test]
    fn test_agreeing_pair_weighted_by_priority_and_latency() {
        let providers = [provider("a", 1), provider("b", 2), provider("c", 3)];
        let result = evaluate(
            vec![
                ok("a", "the sky is blue and clear today", 200),
                ok("b", "today the sky is clear and blue", 800),
                failed("c"),
            ],
            &providers,
        );

        // identical token sets: raw weights 0.984 / 0.786
        let wa = result.vote_breakdown[0].weight;
        let wb = result.vote_breakdown[1].weight;
        assert!((wa - 0.984 / 1.770).abs() < 1e-3);
        assert!((wb - 0.786 / 1.770).abs() < 1e-3);
        assert!((wa - 0.556).abs() < 1e-3);
        assert!((wb - 0.444).abs() < 1e-3);

        // a's higher weight wins; confidence capped
        assert_eq!(result.consensus_text, "the sky is blue and clear today");
        assert_eq!(result.confidence, CONFIDENCE_CAP);
        assert!(result.reasoning.contains("high"));
        assert!(result.reasoning.contains("a-model"));
        // all three attempts remain visible for audit
        assert_eq!(result.responses.len(), 3);
    }

    #[test]
    fn test_selection_deterministic() {
        let providers = [provider("a", 1), provider("b", 1)];
        let build = || {
            vec![
                ok("a", "shared identical answer", 100),
                ok("b", "shared identical answer", 100),
            ]
        };
        let first = evaluate(build(), &providers);
        let second = evaluate(build(), &providers);
        assert_eq!(first.consensus_text, second.consensus_text);
        // perfect tie: first-seen wins
        assert_eq!(first.vote_breakdown[0].provider, "a");
        assert_eq!(first.consensus_text, "shared identical answer");
    }

    #[test]
    fn test_confidence_bounds() {
        // total disagreement
        let low = evaluate(
            vec![
                ok("a", "alpha bravo charlie", 100),
                ok("b", "delta echo foxtrot", 100),
            ],
            &[provider("a", 1), provider("b", 2)],
        );
        assert!(low.confidence >= 0.0 && low.confidence <= CONFIDENCE_CAP);
        assert!((low.confidence - 0.5).abs() < 1e-9);
        assert!(low.reasoning.contains("low"));

        // perfect agreement stays capped below 1.0
        let high = evaluate(
            vec![
                ok("a", "same tokens everywhere", 100),
                ok("b", "same tokens everywhere", 100),
            ],
            &[provider("a", 1), provider("b", 2)],
        );
        assert_eq!(high.confidence, CONFIDENCE_CAP);
    }

    #[test]
    fn test_slow_provider_keeps_floor_weight() {
        // 60 s latency drives the latency term to the 0.1 floor, not zero
        let result = evaluate(
            vec![
                ok("fast", "common answer tokens", 100),
                ok("slow", "common answer tokens", 60_000),
            ],
            &[provider("fast", 1), provider("slow", 1)],
        );
        let slow_weight = result.vote_breakdown[1].weight;
        assert!(slow_weight > 0.0);
        // raw: fast = 0.6 + 0.4*0.98 = 0.992, slow = 0.6 + 0.4*0.1 = 0.64
        assert!((slow_weight - 0.64 / (0.992 + 0.64)).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_order_matches_responses() {
        let result = evaluate(
            vec![
                ok("z", "one shared phrase", 100),
                failed("mid"),
                ok("a", "one shared phrase", 100),
            ],
            &[provider("z", 1), provider("mid", 2), provider("a", 3)],
        );
        let order: Vec<&str> = result
            .vote_breakdown
            .iter()
            .map(|v| v.provider.as_str())
            .collect();
        assert_eq!(order, vec!["z", "a"]);
    }
}
