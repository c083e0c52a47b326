//! Core types for replayed transaction traces
//!
//! This module defines the data structures the tracer produces and the
//! typed records the chain-data boundary returns:
//! - Call frames and their decoded annotations
//! - Frame status and call kind classification
//! - Transaction and block records fetched for replay
//! - The sealed trace report with its diagnostics

use serde::Serialize;

pub use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
pub use revm::interpreter::{CallScheme, CreateScheme};

/// Kind of one call-frame activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Call => "CALL",
            CallKind::CallCode => "CALLCODE",
            CallKind::DelegateCall => "DELEGATECALL",
            CallKind::StaticCall => "STATICCALL",
            CallKind::Create => "CREATE",
            CallKind::Create2 => "CREATE2",
        }
    }

    /// Whether this frame was opened by a create-family instruction
    pub fn is_create(&self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2)
    }
}

impl From<CallScheme> for CallKind {
    fn from(scheme: CallScheme) -> Self {
        match scheme {
            CallScheme::Call | CallScheme::ExtCall => CallKind::Call,
            CallScheme::CallCode => CallKind::CallCode,
            CallScheme::DelegateCall | CallScheme::ExtDelegateCall => CallKind::DelegateCall,
            CallScheme::StaticCall | CallScheme::ExtStaticCall => CallKind::StaticCall,
        }
    }
}

impl From<CreateScheme> for CallKind {
    fn from(scheme: CreateScheme) -> Self {
        match scheme {
            CreateScheme::Create => CallKind::Create,
            _ => CallKind::Create2,
        }
    }
}

/// Final status of a call frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FrameStatus {
    /// Frame completed successfully
    Success,
    /// Frame reverted, with the decoded reason or raw hex payload
    Revert(String),
    /// Frame halted with an interpreter error (out of gas, invalid op, ..)
    Halt(String),
    /// Backend reported an unrecoverable error
    FatalError,
    /// Frame is still open
    InProgress,
}

impl FrameStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FrameStatus::Success)
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, FrameStatus::Revert(_))
    }
}

/// One decoded value with its declared name and ABI type
///
/// Ordered sequences of these represent a decoded call, a decoded return,
/// or a decoded storage dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedArgument {
    /// Declared parameter or variable name (may be empty in the ABI)
    pub name: String,
    /// Declared ABI type, e.g. `uint256`
    #[serde(rename = "type")]
    pub ty: String,
    /// Decoded value rendered to a JSON-friendly form
    pub value: serde_json::Value,
}

/// Fully decoded call data: resolved method plus its arguments
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedCallData {
    /// Canonical method signature, e.g. `transfer(address,uint256)`
    pub signature: String,
    /// Method name
    pub name: String,
    /// Decoded arguments in declaration order
    pub inputs: Vec<DecodedArgument>,
}

/// One EVM call or create activation in the replayed transaction
///
/// Created when the interpreter enters the call, sealed when the matching
/// return event arrives. Child frames appear in execution order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// How this frame was entered
    pub kind: CallKind,
    /// Caller address
    pub from: Address,
    /// Callee address; absent for a create frame until the address is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// Native value transferred into the frame
    pub value: U256,
    /// Gas allocated to the frame
    pub gas: u64,
    /// Gas consumed by the frame, children included
    pub gas_used: u64,
    /// Effective gas price; recorded on the root frame only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    /// Raw input bytes (init code for create frames)
    pub input: Bytes,
    /// ABI-decoded input, when the callee's interface is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_input: Option<DecodedCallData>,
    /// Raw output bytes (deployed code for create frames)
    pub output: Bytes,
    /// ABI-decoded return values, when the callee's interface is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_output: Option<Vec<DecodedArgument>>,
    /// Raw state-variable words of the callee at frame entry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub state_pre: Vec<B256>,
    /// Decoded state variables at frame entry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decoded_state_pre: Vec<DecodedArgument>,
    /// Raw state-variable words of the callee at frame exit
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub state_post: Vec<B256>,
    /// Decoded state variables at frame exit
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decoded_state_post: Vec<DecodedArgument>,
    /// Final status of the frame
    pub status: FrameStatus,
    /// Source line of the instruction the frame failed at, when the
    /// callee's source map is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_line: Option<u32>,
    /// True when this frame failed and none of its children did
    pub error_origin: bool,
    /// Position of this frame in the tree, as child indices from the root
    pub trace_address: Vec<usize>,
    /// Child frames in execution order
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    /// Total number of frames in this subtree, this frame included
    pub fn frame_count(&self) -> usize {
        1 + self.calls.iter().map(CallFrame::frame_count).sum::<usize>()
    }
}

/// Typed transaction record returned by the chain-data accessor
///
/// Only the fields replay needs; `block_hash` and `block_number` are
/// absent while the transaction is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: TxHash,
    pub from: Address,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    /// Position within the containing block, absent while pending
    pub transaction_index: Option<u64>,
}

impl TxRecord {
    /// Whether the transaction has been mined into a block
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some() && self.block_hash.is_some()
    }
}

/// Typed block-header record returned by the chain-data accessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub hash: B256,
    pub number: u64,
    pub timestamp: u64,
    pub beneficiary: Address,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub base_fee: Option<u64>,
}

/// One contract whose source map could not be decoded
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSource {
    /// Contract name from the artifact
    pub contract: String,
    /// Decode failure, rendered
    pub reason: String,
}

/// Side observations collected while building the trace
///
/// The trace stays usable when these are non-empty; they make degraded
/// annotation and malformed event streams visible instead of silently
/// absorbed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDiagnostics {
    /// Contracts whose frames carry no source-line annotation because
    /// their source map failed to decode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<SkippedSource>,
    /// Number of return events that arrived with no matching open frame
    pub excess_returns: usize,
}

/// The sealed result of one replayed transaction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceReport {
    /// Hash of the replayed transaction
    pub transaction_hash: TxHash,
    /// Number of the block the transaction was mined in
    pub block_number: u64,
    /// Root call frame; children hang off it in execution order
    pub root: CallFrame,
    /// Position of the deepest originating failure, as child indices from
    /// the root, when the transaction failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_trace_address: Option<Vec<usize>>,
    /// Annotation and event-stream observations
    pub diagnostics: TraceDiagnostics,
}
