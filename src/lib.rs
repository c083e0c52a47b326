//! # Replay Trace
//!
//! A library for replaying mined EVM transactions and reconstructing
//! source-level execution traces.
//!
//! Given a transaction hash, a chain-data source and the build artifacts
//! of the contracts involved, the tracer re-executes the transaction
//! against the state its block was built on and reports the full call
//! tree with human-readable annotations.
//!
//! ## Core Features
//!
//! - **Call tree reconstruction**
//!   - One frame per call or contract creation, nested in execution order
//!   - Gas accounting, value transfers, raw input/output per frame
//!   - Error origin detection down to the deepest failing frame
//!
//! - **Source-level annotation**
//!   - ABI decoding of call arguments, return values and revert reasons
//!   - Failing source line resolved through the compiler source map
//!   - Pre/post snapshots of the callee's state variables, decoded
//!
//! - **Replay fidelity**
//!   - State reconstructed at the parent height of the containing block
//!   - Block context (number, timestamp, beneficiary, gas limit, base
//!     fee) taken from the actual header
//!   - Validation relaxed the way a replay harness needs it
//!
//! ## Features
//!
//! - `rustls-tls`: Uses rustls as the TLS implementation instead of
//!   native-tls (OpenSSL). This is useful for environments where OpenSSL
//!   is not available or not desired.
//!
//!   Usage example:
//!   ```toml
//!   [dependencies]
//!   replay-trace = { version = "0.3", default-features = false, features = ["rustls-tls"] }
//!   ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use replay_trace::{ContractArtifact, ContractRegistry, Tracer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Register the build artifacts of the contracts you care about
//! let mut registry = ContractRegistry::new();
//! let vault = std::fs::read_to_string("build/contracts/Vault.json")?;
//! registry.register(ContractArtifact::from_json(&vault)?)?;
//!
//! // Connect and replay a mined transaction
//! let tracer = Tracer::connect("https://eth.llamarpc.com", registry).await?;
//! let report = tracer.trace(
//!     "0x4fc1580e7f66c58b7c26881cce0aab9c3509afe6e507744f6feef0b37146c772".parse()?,
//! )?;
//!
//! // Walk the annotated call tree
//! let root = &report.root;
//! println!("{} {} -> {:?}", root.kind.as_str(), root.from, root.to);
//! if let Some(decoded) = &root.decoded_input {
//!     println!("calls {}", decoded.signature);
//! }
//! if let Some(path) = &report.error_trace_address {
//!     println!("failure originated at {path:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - `types`: Trace, transaction and block data structures
//! - `errors`: Error hierarchy for every stage of a replay
//! - `opcode`: Instruction table and push-width helpers
//! - `sourcemap`: Compressed compiler source-map decoding
//! - `calldata`: ABI call-data, output and revert-payload decoding
//! - `artifact`: Build-artifact parsing, AST indexing, registry
//! - `state`: Chain-data accessors and the cached journaled state view
//! - `traits`: Inspector seam traits
//! - `inspectors`: EVM execution inspectors
//! - `tracer`: Replay orchestration and report assembly

pub mod types;
pub mod errors;
pub mod opcode;
pub mod sourcemap;
pub mod calldata;
pub mod artifact;
pub mod state;
pub mod traits;
pub mod inspectors;
pub mod tracer;

// Re-export only the essential types and functions
pub use artifact::{ContractArtifact, ContractRegistry};
pub use errors::{ChainError, TraceError};
pub use inspectors::{CallTraceOutput, CallTracer};
pub use state::{ChainAccessor, MockChain, RpcAccessor};
pub use tracer::Tracer;
pub use types::{CallFrame, CallKind, FrameStatus, TraceReport};
