//! Monte Carlo Tree Search over a policy-value network.
//!
//! This crate implements the small PUCT search the analysis engine runs
//! when a request asks for more than one visit. Each simulation has
//! three phases:
//!
//! 1. **Selection**: descend from the root by maximal PUCT score,
//!    converting the stored Black-frame values to the moving player's
//!    frame at each step
//! 2. **Expansion & evaluation**: evaluate the leaf with the network and
//!    create children for its top policy moves that pass the coarse
//!    legality filter
//! 3. **Backup**: add the Black-frame win rate to every node on the
//!    recorded path
//!
//! The tree is arena-allocated and lives for exactly one search.

pub mod evaluator;
pub mod node;
pub mod search;
pub mod tree;

pub use evaluator::{EvaluatorError, PositionEvaluator, UniformEvaluator};
pub use node::{Node, NodeId};
pub use search::{run_search, Search, SearchConfig, SearchError, DEFAULT_C_PUCT};
pub use tree::Tree;
