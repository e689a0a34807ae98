//! Evaluator seam between the search and the neural engine.
//!
//! The search only needs one operation: analyse a position and hand back
//! suggestions plus a Black-frame win rate. The production implementation
//! is the ONNX inference engine; tests use the stubs below.

use thiserror::Error;

use goban::{AnalysisResult, MoveSuggestion, Position, Vertex};

/// Errors that can occur during leaf evaluation.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),
}

/// Anything that can evaluate a position into an [`AnalysisResult`].
///
/// Takes `&mut self`: evaluators own scratch buffers and caches, and the
/// single-threaded worker serialises all calls.
pub trait PositionEvaluator {
    fn evaluate(&mut self, position: &Position) -> Result<AnalysisResult, EvaluatorError>;
}

/// Uniform evaluator: equal probability over every empty point plus
/// pass, neutral win rate. Useful for exercising the search without a
/// model.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator {
    /// Number of evaluations performed, observable by tests.
    pub calls: u32,
}

impl PositionEvaluator for UniformEvaluator {
    fn evaluate(&mut self, position: &Position) -> Result<AnalysisResult, EvaluatorError> {
        self.calls += 1;
        let size = position.size();
        let mut vertices: Vec<Vertex> = Vec::new();
        for (i, &v) in position.board.grid().iter().enumerate() {
            if v == 0 {
                vertices.push(Vertex::Play(goban::Coord::from_index(i, size)));
            }
        }
        vertices.push(Vertex::Pass);

        let probability = 1.0 / vertices.len() as f32;
        let move_suggestions = vertices
            .into_iter()
            .take(10)
            .map(|vertex| MoveSuggestion {
                vertex: vertex.to_display(size),
                probability,
            })
            .collect();

        Ok(AnalysisResult {
            move_suggestions,
            win_rate: 0.5,
            score_lead: 0.0,
            current_turn: position.to_play,
            ownership: None,
            visits: 1,
        })
    }
}
