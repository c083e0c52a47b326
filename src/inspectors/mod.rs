//! EVM execution inspectors
//!
//! One inspector lives here: the call tracer that rebuilds the frame tree
//! of a replayed transaction with ABI decoding, state-variable snapshots
//! and source-line annotation. It implements the seam traits in
//! [`crate::traits`], so the replay loop takes any inspector with the
//! same capabilities.

pub mod call_tracer;

pub use call_tracer::{CallTraceOutput, CallTracer};
