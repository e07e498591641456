//! Solution ranking
//!
//! ```text
//! score = similarity
//!       - unsatisfiable * UNSATISFIABLE_PENALTY
//!       + (complete ? COMPLETENESS_BONUS : 0)
//!       + clamp(pattern_delta, -MAX_ADJUST, MAX_ADJUST)
//! ```
//!
//! Config validation guarantees `2 * MAX_ADJUST < PENALTY + BONUS`, so no
//! pattern adjustment can lift an incomplete candidate over a complete one
//! with a similar similarity score.

use crate::config::RankingConfig;
use crate::types::{ResourceTypeRef, SolutionCandidate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Components of a candidate's final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    /// Total subtracted for unsatisfiable requirements (non-negative)
    pub unsatisfiable_penalty: f64,
    pub completeness_bonus: f64,
    /// Applied pattern delta, after clamping
    pub pattern_adjustment: f64,
    /// Requested pattern delta exceeded `max_adjust`
    pub clipped: bool,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.similarity - self.unsatisfiable_penalty
            + self.completeness_bonus
            + self.pattern_adjustment
    }
}

/// Organizational pattern nudge for one primary type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAdjustment {
    pub delta: f64,
    pub rationale: String,
}

impl PatternAdjustment {
    pub fn new(delta: f64, rationale: impl Into<String>) -> Self {
        Self {
            delta,
            rationale: rationale.into(),
        }
    }
}

/// Pattern adjustments keyed by primary type
pub type PatternAdjustments = BTreeMap<ResourceTypeRef, PatternAdjustment>;

/// Scores and orders solution candidates
#[derive(Debug, Clone, Default)]
pub struct SolutionRanker {
    config: RankingConfig,
}

impl SolutionRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Fill `score`, `breakdown` and score rationale of one candidate
    pub fn score(&self, candidate: &mut SolutionCandidate, adjustment: Option<&PatternAdjustment>) {
        let similarity = if candidate.similarity.is_finite() {
            candidate.similarity
        } else {
            0.0
        };
        let unsatisfiable = candidate.unsatisfiable.len();
        let unsatisfiable_penalty = unsatisfiable as f64 * self.config.unsatisfiable_penalty;
        let completeness_bonus = if unsatisfiable == 0 {
            self.config.completeness_bonus
        } else {
            0.0
        };

        let requested = adjustment
            .map(|a| a.delta)
            .filter(|d| d.is_finite())
            .unwrap_or(0.0);
        let max_adjust = self.config.max_adjust;
        let pattern_adjustment = requested.clamp(-max_adjust, max_adjust);
        let clipped = pattern_adjustment != requested;

        let breakdown = ScoreBreakdown {
            similarity,
            unsatisfiable_penalty,
            completeness_bonus,
            pattern_adjustment,
            clipped,
        };
        candidate.score = breakdown.total();

        candidate.rationale.push(format!("similarity {similarity:.2} to intent"));
        if unsatisfiable > 0 {
            candidate.rationale.push(format!(
                "-{unsatisfiable_penalty:.2} for {unsatisfiable} unsatisfiable requirement(s)"
            ));
        } else {
            candidate
                .rationale
                .push(format!("+{completeness_bonus:.2} all requirements satisfiable"));
        }
        if candidate.truncated {
            candidate
                .rationale
                .push("dependency resolution stopped at the depth bound".to_string());
        }
        if let Some(adjustment) = adjustment
            && pattern_adjustment != 0.0
        {
            let mut line = format!("{pattern_adjustment:+.2} pattern: {}", adjustment.rationale);
            if clipped {
                line.push_str(&format!(" (clipped from {requested:+.2})"));
            }
            candidate.rationale.push(line);
        }

        candidate.breakdown = Some(breakdown);
    }

    /// Score every candidate and sort best first.
    ///
    /// The order is a pure function of the candidate set: input order never
    /// matters.
    pub fn rank(
        &self,
        candidates: Vec<SolutionCandidate>,
        adjustments: &PatternAdjustments,
    ) -> Vec<SolutionCandidate> {
        let mut ranked: Vec<SolutionCandidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                let adjustment = find_adjustment(adjustments, &candidate.primary);
                self.score(&mut candidate, adjustment);
                candidate
            })
            .collect();
        ranked.sort_by(compare_candidates);
        ranked
    }
}

/// Exact match first, then any adjustment for the same kind and group
fn find_adjustment<'a>(
    adjustments: &'a PatternAdjustments,
    primary: &ResourceTypeRef,
) -> Option<&'a PatternAdjustment> {
    adjustments.get(primary).or_else(|| {
        adjustments
            .iter()
            .find(|(r, _)| r.same_kind_and_group(primary))
            .map(|(_, a)| a)
    })
}

/// Score descending, then fewer resources, then primary `(kind, group, version)`
fn compare_candidates(a: &SolutionCandidate, b: &SolutionCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.total_resources().cmp(&b.total_resources()))
        .then_with(|| a.primary.cmp(&b.primary))
        .then_with(|| a.required.cmp(&b.required))
        .then_with(|| a.optional.cmp(&b.optional))
}
