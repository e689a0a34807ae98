//! Raw network output decoding into [`AnalysisResult`].
//!
//! The network emits everything in the current player's frame; results
//! are converted to Black's frame here so every consumer sees one
//! convention.

use goban::{AnalysisResult, Coord, MoveSuggestion, Player, Vertex};

/// Number of suggestions reported per analysis.
pub const TOP_MOVES: usize = 10;

/// Index into the misc-value head holding the score-mean output.
const MISC_SCORE_INDEX: usize = 2;
/// The score head is trained against score divided by this factor.
const SCORE_SCALE: f32 = 20.0;

/// One position's raw output slices, already split out of the batch.
#[derive(Debug)]
pub struct RawOutputs<'a> {
    /// Policy logits, length `size*size + 1`; the final entry is pass.
    pub policy: &'a [f32],
    /// Value head logits: win, loss, no-result.
    pub value: &'a [f32],
    /// Misc-value head; position 2 is the scaled score mean.
    pub misc: &'a [f32],
    /// Ownership head, length `size*size`, current-player positive.
    pub ownership: Option<&'a [f32]>,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|&v| v / sum).collect()
    } else {
        exps
    }
}

/// Decode one position's outputs into Black's frame, apply the ko
/// filter, and renormalise the surviving suggestions.
pub fn decode_outputs(
    raw: &RawOutputs<'_>,
    board_size: usize,
    current_turn: Player,
    ko: Option<Coord>,
    visits: u32,
) -> AnalysisResult {
    let area = board_size * board_size;

    // Policy head: softmax, then the top entries as suggestions.
    let probabilities = softmax(raw.policy);
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_unstable_by(|&a, &b| {
        probabilities[b]
            .partial_cmp(&probabilities[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut move_suggestions: Vec<MoveSuggestion> = order
        .into_iter()
        .take(TOP_MOVES)
        .map(|index| {
            let vertex = if index == area {
                Vertex::Pass
            } else {
                Vertex::Play(Coord::from_index(index, board_size))
            };
            MoveSuggestion {
                vertex: vertex.to_display(board_size),
                probability: probabilities[index],
            }
        })
        .collect();

    // Ko filter: drop the forbidden vertex for the side to move, then
    // renormalise what remains to sum to one.
    if let Some(ko) = ko {
        let forbidden = ko.to_display(board_size);
        move_suggestions.retain(|s| s.vertex != forbidden);
        let total: f32 = move_suggestions.iter().map(|s| s.probability).sum();
        if total > 0.0 {
            for suggestion in &mut move_suggestions {
                suggestion.probability /= total;
            }
        }
    }

    // Value head: softmax over (win, loss, no-result); first component is
    // the current player's win probability.
    let value_probs = softmax(raw.value);
    let current_win = value_probs.first().copied().unwrap_or(0.5);
    let win_rate = match current_turn {
        Player::B => current_win,
        Player::W => 1.0 - current_win,
    };

    let score_lead = raw
        .misc
        .get(MISC_SCORE_INDEX)
        .map(|&v| v * SCORE_SCALE * current_turn.sign() as f32)
        .unwrap_or(0.0);

    let ownership = raw.ownership.map(|values| {
        values
            .iter()
            .map(|&v| {
                let black_frame = v * current_turn.sign() as f32;
                black_frame.clamp(-1.0, 1.0)
            })
            .collect()
    });

    AnalysisResult {
        move_suggestions,
        win_rate,
        score_lead,
        current_turn,
        ownership,
        visits,
    }
}
