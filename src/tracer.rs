//! Transaction replay orchestration
//!
//! [`Tracer`] ties the layers together: it fetches the mined transaction
//! and its block header through the chain-data accessor, opens a cached
//! state view at the parent height, configures a replay EVM with the
//! block context and relaxed validation, runs the transaction under the
//! call-tracing inspector and assembles the final [`TraceReport`].
//!
//! ## Replay environment
//!
//! Replaying a mined transaction is not the same as validating a new one:
//! the transaction already passed validation when it was mined, and the
//! reconstructed state is only as good as the accessor serving it. All
//! optional validation is therefore switched off (sender-code rule,
//! block gas limit, base fee, balance and nonce checks, code size limit)
//! so the interpreter replays the recorded execution instead of
//! re-litigating its admission.
//!
//! # Examples
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use replay_trace::{ContractArtifact, ContractRegistry, Tracer};
//!
//! let mut registry = ContractRegistry::new();
//! let artifact = std::fs::read_to_string("build/contracts/Vault.json")?;
//! registry.register(ContractArtifact::from_json(&artifact)?)?;
//!
//! let tracer = Tracer::connect("https://eth.llamarpc.com", registry).await?;
//! let report = tracer.trace(
//!     "0x4fc1580e7f66c58b7c26881cce0aab9c3509afe6e507744f6feef0b37146c772".parse()?,
//! )?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use alloy::primitives::{TxHash, TxKind};
use revm::{
    context::{BlockEnv, Context, ContextTr, TxEnv},
    handler::{MainBuilder, MainContext},
    InspectCommitEvm,
};

use crate::artifact::ContractRegistry;
use crate::errors::{ChainError, TraceError};
use crate::inspectors::CallTracer;
use crate::state::{CachedState, ChainAccessor, RpcAccessor};
use crate::traits::TraceOutput;
use crate::types::{BlockRecord, SkippedSource, TraceDiagnostics, TraceReport, TxRecord};

/// Replays mined transactions into annotated call traces
///
/// Holds the chain-data accessor and the artifact registry; both are
/// shared, so one `Tracer` can serve any number of `trace` calls and the
/// registry's prepared artifacts are reused across them.
pub struct Tracer {
    accessor: Arc<dyn ChainAccessor>,
    registry: Arc<ContractRegistry>,
}

impl Tracer {
    /// New tracer over an existing accessor
    pub fn new(accessor: Arc<dyn ChainAccessor>, registry: ContractRegistry) -> Tracer {
        Tracer {
            accessor,
            registry: Arc::new(registry),
        }
    }

    /// Connect to an RPC endpoint and build a tracer over it
    ///
    /// Must be called from inside a multi-thread tokio runtime; the
    /// accessor parks the calling thread while it drives provider
    /// futures. See [`RpcAccessor::connect`].
    pub async fn connect(rpc_url: &str, registry: ContractRegistry) -> Result<Tracer, TraceError> {
        let accessor = RpcAccessor::connect(rpc_url).await?;
        Ok(Tracer::new(Arc::new(accessor), registry))
    }

    /// Replay the transaction and reconstruct its annotated call trace
    ///
    /// # Errors
    /// - [`TraceError::Chain`] when the transaction or its block is
    ///   unknown to the accessor, or when a state fetch failed during the
    ///   replay (the first such failure is reported);
    /// - [`TraceError::PendingTransaction`] when the transaction has no
    ///   containing block yet;
    /// - [`TraceError::Execution`] when the interpreter rejects the
    ///   transaction outright.
    pub fn trace(&self, tx_hash: TxHash) -> Result<TraceReport, TraceError> {
        let tx = self
            .accessor
            .transaction_by_hash(tx_hash)?
            .ok_or_else(|| ChainError::TransactionNotFound(tx_hash.to_string()))?;

        let Some(block_hash) = tx.block_hash.filter(|_| tx.is_mined()) else {
            return Err(TraceError::PendingTransaction(tx_hash.to_string()));
        };
        let block = self
            .accessor
            .block_by_hash(block_hash)?
            .ok_or_else(|| ChainError::BlockNotFound(block_hash.to_string()))?;

        self.replay(&tx, &block)
    }

    fn replay(&self, tx: &TxRecord, block: &BlockRecord) -> Result<TraceReport, TraceError> {
        // World state as of the end of the parent block
        let height = block.number.saturating_sub(1);
        let state = CachedState::new(self.accessor.clone(), height);

        let mut ctx = Context::mainnet().with_db(state);
        ctx.block = replay_block_env(block);
        let cfg = &mut ctx.cfg;
        cfg.disable_eip3607 = true;
        cfg.limit_contract_code_size = None;
        cfg.disable_block_gas_limit = true;
        cfg.disable_base_fee = true;
        cfg.disable_balance_check = true;
        cfg.disable_nonce_check = true;

        let mut evm = ctx.build_mainnet_with_inspector(CallTracer::new(self.registry.clone()));

        let tx_env = TxEnv::builder()
            .caller(tx.from)
            .kind(TxKind::from(tx.to))
            .value(tx.value)
            .data(tx.input.clone())
            .gas_limit(tx.gas)
            .gas_price(tx.gas_price)
            .nonce(tx.nonce)
            .build_fill();

        let inspector = evm.inspector.clone();
        evm.inspect_commit(tx_env, inspector)
            .map_err(|e| TraceError::Execution(e.to_string()))?;

        // A fetch failure during the run degraded some read to a default;
        // the trace built on top of it is not trustworthy.
        if let Some(error) = evm.ctx.db().take_error() {
            return Err(error.into());
        }

        let output = evm.inspector.get_output();
        let Some(mut root) = output.root else {
            return Err(TraceError::Execution(
                "replay produced no call frames".to_string(),
            ));
        };
        root.gas_price = Some(tx.gas_price);

        Ok(TraceReport {
            transaction_hash: tx.hash,
            block_number: block.number,
            root,
            error_trace_address: output.error_trace_address,
            diagnostics: TraceDiagnostics {
                skipped_sources: self.skipped_sources(),
                excess_returns: output.excess_returns,
            },
        })
    }

    /// Contracts that will carry no source-line annotation in this trace
    fn skipped_sources(&self) -> Vec<SkippedSource> {
        self.registry
            .contracts()
            .filter_map(|contract| {
                contract
                    .source_map_error
                    .as_ref()
                    .map(|error| SkippedSource {
                        contract: contract.contract_name.clone(),
                        reason: error.to_string(),
                    })
            })
            .collect()
    }
}

/// Block context for the replay, taken from the fetched header
fn replay_block_env(block: &BlockRecord) -> BlockEnv {
    BlockEnv {
        number: block.number,
        timestamp: block.timestamp,
        beneficiary: block.beneficiary,
        difficulty: block.difficulty,
        gas_limit: block.gas_limit,
        basefee: block.base_fee.unwrap_or_default(),
        ..Default::default()
    }
}
