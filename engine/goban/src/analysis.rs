//! Typed analysis output shared by the inference engine, the search, and
//! the report generator.

use serde::{Deserialize, Serialize};

use crate::coord::Player;

/// One suggested move with its probability mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSuggestion {
    /// Display coordinate ("D4", "Q16") or the pass token.
    pub vertex: String,
    pub probability: f32,
}

/// The result of analysing one position.
///
/// `move_suggestions` is sorted by probability descending; probabilities
/// are non-negative and sum to at most one after ko filtering. Win rate
/// and score lead are always expressed in Black's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub move_suggestions: Vec<MoveSuggestion>,
    pub win_rate: f32,
    pub score_lead: f32,
    pub current_turn: Player,
    /// Per-point ownership in [-1, 1], Black positive, row-major.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Vec<f32>>,
    pub visits: u32,
}

impl AnalysisResult {
    /// The highest-probability suggestion, if any survived filtering.
    pub fn top_move(&self) -> Option<&MoveSuggestion> {
        self.move_suggestions.first()
    }

    /// 1-based rank of a vertex in the suggestion list; 0 when absent.
    pub fn rank_of(&self, vertex: &str) -> usize {
        self.move_suggestions
            .iter()
            .position(|s| s.vertex == vertex)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(suggestions: &[(&str, f32)]) -> AnalysisResult {
        AnalysisResult {
            move_suggestions: suggestions
                .iter()
                .map(|(v, p)| MoveSuggestion {
                    vertex: v.to_string(),
                    probability: *p,
                })
                .collect(),
            win_rate: 0.5,
            score_lead: 0.0,
            current_turn: Player::B,
            ownership: None,
            visits: 1,
        }
    }

    #[test]
    fn test_rank_of() {
        let r = result_with(&[("D4", 0.4), ("Q16", 0.3), ("pass", 0.1)]);
        assert_eq!(r.rank_of("D4"), 1);
        assert_eq!(r.rank_of("pass"), 3);
        assert_eq!(r.rank_of("K10"), 0);
    }

    #[test]
    fn test_serde_camel_case() {
        let r = result_with(&[("D4", 0.4)]);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("moveSuggestions"));
        assert!(json.contains("winRate"));
        assert!(json.contains("scoreLead"));
        assert!(!json.contains("ownership"));
    }
}
