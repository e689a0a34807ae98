//! ONNX model rewriter for constrained compute back-ends.
//!
//! Rewrites a serialised ONNX model so that graph-capture and
//! coprocessor back-ends can compile it end to end: symbolic dimensions
//! are pinned to static values, and the two operators such back-ends
//! cannot execute natively (Softplus, LogSoftmax) are decomposed into
//! supported primitives. The rewriter works directly on the protobuf
//! wire format against a hand-maintained schema subset; a parse failure
//! never fails the caller, it simply returns the input unchanged.

pub mod proto;
pub mod rewrite;

pub use rewrite::{
    inspect_first_input, rewrite_model, ModelInputInfo, RewriteOptions, RewriteOutcome,
    SHARED_ONE_NAME,
};
