//! Typed chain-data boundary
//!
//! [`ChainAccessor`] is the capability set the replay state layer needs
//! from a chain-data source: transactions, block headers and the four
//! account facets at a fixed height. It is a synchronous interface because
//! the interpreter world it feeds is synchronous; [`RpcAccessor`] bridges
//! async provider calls onto it with a tokio handle or an owned runtime.

use core::future::Future;

use alloy::consensus::{BlockHeader, Transaction as _};
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::errors::{ChainError, InitError};
use crate::types::{BlockRecord, TxRecord};

/// Chain-data capability set consumed by the cached state view and the
/// trace orchestrator
///
/// Account reads take an explicit height so one accessor can serve any
/// number of fixed-height views concurrently. Implementations must be
/// shareable across threads.
pub trait ChainAccessor: Send + Sync {
    /// Transaction by hash; `Ok(None)` when the node does not know it
    fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxRecord>, ChainError>;

    /// Block header by hash; `Ok(None)` when the node has no such block
    fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRecord>, ChainError>;

    /// Account balance at `height`
    fn balance(&self, address: Address, height: u64) -> Result<U256, ChainError>;

    /// Account nonce at `height`
    fn nonce(&self, address: Address, height: u64) -> Result<u64, ChainError>;

    /// Deployed runtime code at `height`
    fn code(&self, address: Address, height: u64) -> Result<Bytes, ChainError>;

    /// One storage word at `height`
    fn storage_at(&self, address: Address, slot: U256, height: u64) -> Result<U256, ChainError>;
}

/// Tokio runtime handle or owned runtime backing the blocking bridge
#[derive(Debug)]
enum HandleOrRuntime {
    Handle(Handle),
    Runtime(Runtime),
}

impl HandleOrRuntime {
    #[inline]
    fn block_on<F>(&self, f: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        match self {
            Self::Handle(handle) => tokio::task::block_in_place(move || handle.block_on(f)),
            Self::Runtime(rt) => rt.block_on(f),
        }
    }
}

/// RPC-backed accessor
///
/// Wraps an alloy provider and drives its futures to completion from
/// synchronous callers. Inside an async context this requires a
/// multi-thread runtime, since the bridge parks the calling thread via
/// [`tokio::task::block_in_place`].
#[derive(Debug)]
pub struct RpcAccessor {
    provider: DynProvider,
    rt: HandleOrRuntime,
}

impl RpcAccessor {
    /// Connect from inside an async context
    ///
    /// # Arguments
    /// * `rpc_url` - HTTP(S) or WebSocket endpoint URL
    ///
    /// # Returns
    /// The connected accessor, or [`InitError::NoRuntime`] when called
    /// outside a runtime or on a current-thread runtime (which cannot
    /// host the blocking bridge).
    pub async fn connect(rpc_url: &str) -> Result<RpcAccessor, InitError> {
        let rt = match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => {
                    return Err(InitError::NoRuntime(
                        "current-thread runtime cannot drive blocking calls".to_string(),
                    ))
                }
                _ => HandleOrRuntime::Handle(handle),
            },
            Err(e) => return Err(InitError::NoRuntime(e.to_string())),
        };
        let provider = build_provider(rpc_url).await?;
        Ok(RpcAccessor { provider, rt })
    }

    /// Connect from synchronous code, taking ownership of a runtime
    ///
    /// Refer to [`tokio::runtime::Builder`] on how to create one.
    pub fn connect_with_runtime(rpc_url: &str, runtime: Runtime) -> Result<RpcAccessor, InitError> {
        let provider = runtime.block_on(build_provider(rpc_url))?;
        Ok(RpcAccessor {
            provider,
            rt: HandleOrRuntime::Runtime(runtime),
        })
    }
}

async fn build_provider(rpc_url: &str) -> Result<DynProvider, InitError> {
    if rpc_url.starts_with("http") {
        let url = rpc_url
            .parse()
            .map_err(|_| InitError::InvalidRpcUrl(rpc_url.to_string()))?;
        Ok(ProviderBuilder::new().connect_http(url).erased())
    } else if rpc_url.starts_with("ws") {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(rpc_url))
            .await
            .map_err(|e| InitError::WsConnection(e.to_string()))?;
        Ok(provider.erased())
    } else {
        Err(InitError::InvalidRpcUrl(rpc_url.to_string()))
    }
}

impl ChainAccessor for RpcAccessor {
    fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxRecord>, ChainError> {
        let tx = self
            .rt
            .block_on(async { self.provider.get_transaction_by_hash(hash).await })
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(tx.map(|tx| TxRecord {
            hash,
            from: tx.inner.signer(),
            to: tx.inner.to(),
            value: tx.inner.value(),
            input: tx.inner.input().clone(),
            gas: tx.inner.gas_limit(),
            gas_price: tx
                .effective_gas_price
                .or_else(|| tx.inner.gas_price())
                .unwrap_or_default(),
            nonce: tx.inner.nonce(),
            block_hash: tx.block_hash,
            block_number: tx.block_number,
            transaction_index: tx.transaction_index,
        }))
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRecord>, ChainError> {
        let block = self
            .rt
            .block_on(async { self.provider.get_block_by_hash(hash).await })
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(block.map(|block| BlockRecord {
            hash: block.header.hash,
            number: block.header.number(),
            timestamp: block.header.timestamp(),
            beneficiary: block.header.beneficiary(),
            difficulty: block.header.difficulty(),
            gas_limit: block.header.gas_limit(),
            base_fee: block.header.base_fee_per_gas(),
        }))
    }

    fn balance(&self, address: Address, height: u64) -> Result<U256, ChainError> {
        self.rt
            .block_on(async {
                self.provider
                    .get_balance(address)
                    .block_id(height.into())
                    .await
            })
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    fn nonce(&self, address: Address, height: u64) -> Result<u64, ChainError> {
        self.rt
            .block_on(async {
                self.provider
                    .get_transaction_count(address)
                    .block_id(height.into())
                    .await
            })
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    fn code(&self, address: Address, height: u64) -> Result<Bytes, ChainError> {
        self.rt
            .block_on(async {
                self.provider
                    .get_code_at(address)
                    .block_id(height.into())
                    .await
            })
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    fn storage_at(&self, address: Address, slot: U256, height: u64) -> Result<U256, ChainError> {
        self.rt
            .block_on(async {
                self.provider
                    .get_storage_at(address, slot)
                    .block_id(height.into())
                    .await
            })
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}
