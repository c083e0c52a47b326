//! Call-frame tracing inspector
//!
//! [`CallTracer`] hooks revm execution and rebuilds the transaction's
//! call tree: one [`CallFrame`] per call or creation, with raw and
//! ABI-decoded input/output, pre/post state-variable snapshots and, for
//! failed frames, the originating source line resolved through the
//! matched artifact's source map.
//!
//! The implementation is split across submodules:
//! - `inspector`: revm `Inspector` hook implementation
//! - `trace`: frame completion and error localization
//! - `traits`: [`Reset`]/[`TraceOutput`] seam implementations
//!
//! # Frame bookkeeping
//!
//! Frames are built in an arena vector; a stack of [`OpenFrame`] records
//! tracks the open ones. When a frame completes it moves from the arena
//! into its parent's child list, so once execution finishes the arena
//! holds exactly the sealed root.
//!
//! [`Reset`]: crate::traits::Reset
//! [`TraceOutput`]: crate::traits::TraceOutput

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

use revm::context::{ContextTr, JournalTr};

use crate::artifact::{ContractRegistry, PreparedContract};
use crate::types::{CallFrame, DecodedArgument};

mod inspector;
mod trace;
mod traits;

/// Bookkeeping for one frame still executing
#[derive(Debug, Clone)]
struct OpenFrame {
    /// Position of the frame in the arena
    index: usize,
    /// Account whose storage the frame reads and writes
    storage_address: Address,
    /// Artifact matched against the executing bytecode, if any
    contract: Option<Arc<PreparedContract>>,
    /// Byte offset of the last executed instruction
    last_pc: Option<usize>,
}

/// Inspector reconstructing the call tree of one replayed transaction
///
/// Holds a registry of prepared contract artifacts; whenever a frame
/// starts, the executing bytecode is matched against the registry and a
/// hit supplies the ABI for decoding, the state-variable list for
/// snapshots and the source map for revert annotation. Unmatched frames
/// are still traced, just without annotation.
#[derive(Debug, Clone)]
pub struct CallTracer {
    /// Arena of frames being built; drains into the root as frames seal
    frames: Vec<CallFrame>,
    /// Stack of open frames, innermost last
    call_stack: Vec<OpenFrame>,
    /// Artifact resolution memo per executing address
    resolved: HashMap<Address, Option<Arc<PreparedContract>>>,
    registry: Arc<ContractRegistry>,
    /// Frame-return events that arrived with no open frame
    excess_returns: usize,
}

/// Final output of one traced replay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTraceOutput {
    /// The sealed root frame; `None` when nothing executed
    pub root: Option<CallFrame>,
    /// Path to the deepest frame where a failure originated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_trace_address: Option<Vec<usize>>,
    /// Frame-return events with no matching frame entry
    pub excess_returns: usize,
}

impl CallTracer {
    /// New tracer resolving artifacts from `registry`
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        CallTracer {
            frames: Vec::new(),
            call_stack: Vec::new(),
            resolved: HashMap::new(),
            registry,
            excess_returns: 0,
        }
    }

    /// Frames still in the arena; after a completed replay this is the
    /// sealed root alone
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Frame-return events that had no open frame to close
    pub fn excess_returns(&self) -> usize {
        self.excess_returns
    }

    /// Match `code` against the registry, memoized per address
    ///
    /// Within one transaction an address's runtime code is fixed once
    /// observed, so the memo never goes stale during a replay.
    fn resolve_contract(&mut self, address: Address, code: &[u8]) -> Option<Arc<PreparedContract>> {
        if let Some(cached) = self.resolved.get(&address) {
            return cached.clone();
        }
        let matched = if code.is_empty() {
            None
        } else {
            self.registry.match_code(code)
        };
        self.resolved.insert(address, matched.clone());
        matched
    }

    /// Read every resolved state variable of `contract` at `address`
    ///
    /// Reads go through the journaled state, so uncommitted writes of the
    /// transaction are visible. Returns the raw storage words and their
    /// decoded arguments in declaration order; empty when no artifact
    /// matched.
    fn capture_state<CTX: ContextTr>(
        context: &mut CTX,
        address: Address,
        contract: Option<&PreparedContract>,
    ) -> (Vec<B256>, Vec<DecodedArgument>) {
        let Some(contract) = contract else {
            return (Vec::new(), Vec::new());
        };
        let variables = contract.state_variables();
        let mut words = Vec::with_capacity(variables.len());
        let mut decoded = Vec::with_capacity(variables.len());
        for variable in variables {
            let value = match context.journal().sload(address, variable.slot) {
                Ok(loaded) => loaded.data,
                Err(_) => U256::ZERO,
            };
            let word = B256::from(value);
            decoded.push(variable.decode_word(word));
            words.push(word);
        }
        (words, decoded)
    }
}
