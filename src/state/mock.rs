//! In-memory chain stand-in for offline tests
//!
//! [`MockChain`] serves one flat world state, counts every fetch it
//! answers, and can inject a failure that all subsequent fetches return.
//! This is what the caching and degradation behavior of
//! [`crate::state::CachedState`] is verified against.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};

use crate::errors::ChainError;
use crate::state::ChainAccessor;
use crate::types::{BlockRecord, TxRecord};

/// Number of account-facet fetches served, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub balance: usize,
    pub nonce: usize,
    pub code: usize,
    pub storage: usize,
}

#[derive(Debug, Default)]
struct MockInner {
    transactions: HashMap<TxHash, TxRecord>,
    blocks: HashMap<B256, BlockRecord>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    codes: HashMap<Address, Bytes>,
    storage: HashMap<(Address, U256), U256>,
    counts: FetchCounts,
    failure: Option<ChainError>,
}

/// Deterministic in-memory chain
///
/// The height argument of account reads is accepted and ignored; the mock
/// holds a single world state. Unknown addresses and slots read as
/// zero/empty, like an archive node answering for a fresh account.
#[derive(Debug, Default)]
pub struct MockChain {
    inner: Mutex<MockInner>,
}

impl MockChain {
    pub fn new() -> Self {
        MockChain::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_transaction(&self, tx: TxRecord) {
        self.lock().transactions.insert(tx.hash, tx);
    }

    pub fn insert_block(&self, block: BlockRecord) {
        self.lock().blocks.insert(block.hash, block);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock().balances.insert(address, balance);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.lock().nonces.insert(address, nonce);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.lock().codes.insert(address, code);
    }

    pub fn set_storage(&self, address: Address, slot: U256, value: U256) {
        self.lock().storage.insert((address, slot), value);
    }

    /// Make every subsequent fetch fail with `error`
    pub fn fail_with(&self, error: ChainError) {
        self.lock().failure = Some(error);
    }

    /// Let fetches succeed again
    pub fn clear_failure(&self) {
        self.lock().failure = None;
    }

    /// Fetches served so far, including failed ones
    pub fn fetch_counts(&self) -> FetchCounts {
        self.lock().counts
    }
}

impl ChainAccessor for MockChain {
    fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxRecord>, ChainError> {
        let inner = self.lock();
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner.transactions.get(&hash).cloned())
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRecord>, ChainError> {
        let inner = self.lock();
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner.blocks.get(&hash).cloned())
    }

    fn balance(&self, address: Address, _height: u64) -> Result<U256, ChainError> {
        let mut inner = self.lock();
        inner.counts.balance += 1;
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner.balances.get(&address).copied().unwrap_or_default())
    }

    fn nonce(&self, address: Address, _height: u64) -> Result<u64, ChainError> {
        let mut inner = self.lock();
        inner.counts.nonce += 1;
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner.nonces.get(&address).copied().unwrap_or_default())
    }

    fn code(&self, address: Address, _height: u64) -> Result<Bytes, ChainError> {
        let mut inner = self.lock();
        inner.counts.code += 1;
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner.codes.get(&address).cloned().unwrap_or_default())
    }

    fn storage_at(&self, address: Address, slot: U256, _height: u64) -> Result<U256, ChainError> {
        let mut inner = self.lock();
        inner.counts.storage += 1;
        if let Some(e) = &inner.failure {
            return Err(e.clone());
        }
        Ok(inner
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }
}
