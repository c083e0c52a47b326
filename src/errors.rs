//! Error types for transaction replay and trace annotation
//!
//! This module defines the error handling system that covers:
//! - Accessor initialization errors
//! - Chain-data fetch (transport) errors
//! - Source map decoding errors
//! - ABI call-data decoding errors
//! - Error conversion and propagation

use thiserror::Error;

/// Top-level error type for the replay tracer
///
/// Encompasses all possible errors that can occur while replaying a
/// transaction and assembling its annotated trace, providing a unified
/// error handling interface for users.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Errors occurring while constructing an accessor or the EVM
    #[error("Failed to initialize tracer: {0}")]
    Init(#[from] InitError),

    /// Errors reported by the chain-data accessor
    #[error("Chain data error: {0}")]
    Chain(#[from] ChainError),

    /// Errors occurring while decoding a compiler source map
    #[error("Source map error: {0}")]
    SourceMap(#[from] SourceMapError),

    /// Errors occurring while decoding ABI call data
    #[error("Call data error: {0}")]
    CallData(#[from] CallDataError),

    /// Errors occurring while parsing or registering a build artifact
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The transaction has not been mined yet, so there is no block
    /// context to replay it in
    #[error("Transaction {0} is in pending status")]
    PendingTransaction(String),

    /// The interpreter rejected the replayed transaction outright
    #[error("Transaction execution failed: {0}")]
    Execution(String),
}

/// Initialization-specific errors
///
/// These errors occur while constructing an RPC-backed accessor,
/// typically related to network connectivity and configuration.
#[derive(Debug, Error)]
pub enum InitError {
    /// Invalid or malformed RPC URL
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    /// WebSocket connection establishment errors
    #[error("WebSocket connection failed: {0}")]
    WsConnection(String),

    /// No usable tokio runtime to drive the blocking bridge
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Chain-data fetch errors
///
/// Raised (or memoized, see [`crate::state::CachedState`]) when the remote
/// accessor is unreachable or returns data the typed boundary cannot use.
/// Cloneable so the state view can hand out its memoized first error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Transport-level request failure
    #[error("RPC request failed: {0}")]
    Rpc(String),

    /// The requested transaction is unknown to the node
    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    /// The requested block is unknown to the node
    #[error("Block {0} not found")]
    BlockNotFound(String),

    /// The node answered with data the typed boundary cannot interpret
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Source map decoding errors
///
/// Raised by any of the three decoding stages; the orchestrator records
/// them per contract and completes the trace without source-line
/// annotation for that contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceMapError {
    /// A compressed-map field is not a valid integer
    #[error("Invalid integer field in source map segment {segment}: {value:?}")]
    InvalidInteger { segment: usize, value: String },

    /// A segment omits a field but no previous segment exists to inherit from
    #[error("Source map segment {segment} omits a field with nothing to inherit")]
    MissingField { segment: usize },

    /// The map describes more instructions than the bytecode decodes to
    #[error("Source map has {segments} segments for {instructions} decoded instructions")]
    ExcessSegments { segments: usize, instructions: usize },

    /// The deployed bytecode string is not valid hex
    #[error("Invalid bytecode hex: {0}")]
    InvalidBytecode(String),
}

/// Contract build-artifact errors
///
/// Raised while parsing a compiler build record or registering it for
/// deployed-bytecode matching. Source-map failures inside an otherwise
/// valid artifact are not fatal and surface as [`SourceMapError`]
/// diagnostics instead.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact document is not valid JSON in the expected shape
    #[error("Invalid artifact document: {0}")]
    InvalidDocument(String),

    /// The deployed bytecode field is not valid hex
    #[error("Invalid deployed bytecode hex: {0}")]
    InvalidBytecode(String),
}

/// ABI call-data decoding errors
///
/// Raised immediately by the codec; the affected frame keeps its raw bytes
/// and simply carries no decoded fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallDataError {
    /// Call data shorter than the 4-byte selector
    #[error("Call data too short: {0} bytes, need at least 4")]
    TooShort(usize),

    /// Argument bytes are not a whole number of 32-byte words
    #[error("Argument data length {0} is not a multiple of 32")]
    Misaligned(usize),

    /// No method with this selector in the interface description
    #[error("No method found for selector 0x{0}")]
    UnknownSelector(String),

    /// The interface description is not a valid JSON ABI document
    #[error("Invalid ABI document: {0}")]
    InvalidAbi(String),

    /// Argument bytes do not decode as the declared input types
    #[error("Failed to decode arguments: {0}")]
    Decode(String),

    /// Re-encoding the decoded values does not reproduce the call data,
    /// i.e. the data carries bytes beyond the declared arguments
    #[error("Re-encoded arguments do not match the supplied call data")]
    Mismatch,
}
