//! PUCT search.
//!
//! Each simulation selects a path from the root by maximal PUCT score,
//! expands and evaluates the leaf with the network, and backs the
//! Black-frame win rate up the recorded path. The tree lives for one
//! search only; results are assembled from root visit counts.

use thiserror::Error;
use tracing::trace;

use goban::{AnalysisResult, MoveSuggestion, Position, Vertex};

use crate::evaluator::{EvaluatorError, PositionEvaluator};
use crate::node::NodeId;
use crate::tree::Tree;

/// Exploration constant of the PUCT selection rule.
pub const DEFAULT_C_PUCT: f32 = 1.5;

/// Errors that can occur during search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Total visits to spend, including the root expansion.
    pub num_visits: u32,
    pub c_puct: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_visits: 32,
            c_puct: DEFAULT_C_PUCT,
        }
    }
}

impl SearchConfig {
    pub fn with_visits(mut self, visits: u32) -> Self {
        self.num_visits = visits;
        self
    }

    pub fn with_c_puct(mut self, c_puct: f32) -> Self {
        self.c_puct = c_puct;
        self
    }
}

/// One search over one root position.
pub struct Search<'a, E: PositionEvaluator> {
    tree: Tree,
    root_position: Position,
    evaluator: &'a mut E,
    config: SearchConfig,
    /// The root's own network evaluation: score lead and ownership are
    /// per-position quantities and come from here, never averaged.
    root_eval: Option<AnalysisResult>,
}

impl<'a, E: PositionEvaluator> Search<'a, E> {
    pub fn new(root_position: Position, evaluator: &'a mut E, config: SearchConfig) -> Self {
        Self {
            tree: Tree::new(),
            root_position,
            evaluator,
            config,
            root_eval: None,
        }
    }

    /// Run all visits and assemble the result.
    pub fn run(&mut self) -> Result<AnalysisResult, SearchError> {
        let visits = self.config.num_visits.max(1);
        for _ in 0..visits {
            self.simulate()?;
        }
        Ok(self.assemble())
    }

    /// The search tree, for inspection in tests.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn simulate(&mut self) -> Result<(), SearchError> {
        let mut path = vec![self.tree.root()];
        let mut position = self.root_position.clone();
        let mut current = self.tree.root();

        let value = loop {
            // Two consecutive passes end the game; evaluate without
            // expanding.
            if position.two_passes() {
                break self.evaluate_recording_root(&position, current)?;
            }

            if !self.tree.get(current).expanded {
                break self.expand(current, &position)?;
            }

            let Some(child) = self
                .tree
                .select_child(current, self.config.c_puct, position.to_play)
            else {
                // Expanded but childless: nothing playable survived the
                // legality filter here.
                break self.evaluate_recording_root(&position, current)?;
            };

            let vertex = self.tree.get(child).vertex;
            match position.play(vertex) {
                Ok(next) => {
                    position = next;
                    path.push(child);
                    current = child;
                }
                Err(err) => {
                    // The coarse filter missed a rule interaction; the
                    // path is truncated and the leaf treated as terminal
                    // at its running average.
                    trace!(vertex = %vertex.to_display(position.size()), error = %err,
                        "selection hit an unplayable move, truncating path");
                    break self.tree.get(current).mean_value();
                }
            }
        };

        self.tree.backup(&path, value);
        Ok(())
    }

    /// Expand a leaf: evaluate it, then create children for the top
    /// policy moves that are a pass or plausibly legal (unoccupied and
    /// not the ko vertex for the moving side).
    fn expand(&mut self, id: NodeId, position: &Position) -> Result<f32, SearchError> {
        let result = self.evaluator.evaluate(position)?;
        let size = position.size();

        for suggestion in &result.move_suggestions {
            let Some(vertex) = Vertex::from_display(&suggestion.vertex, size) else {
                continue;
            };
            let playable = match vertex {
                Vertex::Pass => true,
                Vertex::Play(coord) => position.is_plausibly_legal(coord),
            };
            if playable {
                self.tree.add_child(id, vertex, suggestion.probability);
            }
        }
        self.tree.get_mut(id).expanded = true;

        let value = result.win_rate;
        if id == self.tree.root() && self.root_eval.is_none() {
            self.root_eval = Some(result);
        }
        Ok(value)
    }

    /// Evaluate a terminal-ish leaf, keeping the evaluation when the
    /// leaf is the root itself.
    fn evaluate_recording_root(
        &mut self,
        position: &Position,
        id: NodeId,
    ) -> Result<f32, SearchError> {
        let result = self.evaluator.evaluate(position)?;
        let value = result.win_rate;
        if id == self.tree.root() && self.root_eval.is_none() {
            self.root_eval = Some(result);
        }
        Ok(value)
    }

    /// Top children by visit count, visit share as probability; win rate
    /// from the root average; score lead and ownership from the root's
    /// single evaluation.
    fn assemble(&self) -> AnalysisResult {
        let size = self.root_position.size();
        let root = self.tree.get(self.tree.root());

        let ranked = self.tree.ranked_root_children();
        let total_child_visits: u32 = ranked.iter().map(|&id| self.tree.get(id).visits).sum();
        let move_suggestions: Vec<MoveSuggestion> = ranked
            .iter()
            .take(10)
            .map(|&id| {
                let node = self.tree.get(id);
                let probability = if total_child_visits > 0 {
                    node.visits as f32 / total_child_visits as f32
                } else {
                    0.0
                };
                MoveSuggestion {
                    vertex: node.vertex.to_display(size),
                    probability,
                }
            })
            .collect();

        let (score_lead, ownership) = match &self.root_eval {
            Some(eval) => (eval.score_lead, eval.ownership.clone()),
            None => (0.0, None),
        };

        AnalysisResult {
            move_suggestions,
            win_rate: root.mean_value(),
            score_lead,
            current_turn: self.root_position.to_play,
            ownership,
            visits: root.visits,
        }
    }
}

/// Convenience wrapper running one full search.
pub fn run_search<E: PositionEvaluator>(
    position: &Position,
    evaluator: &mut E,
    config: SearchConfig,
) -> Result<AnalysisResult, SearchError> {
    Search::new(position.clone(), evaluator, config).run()
}
