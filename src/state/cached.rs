//! Journaled, lazily cached state view at a fixed block height
//!
//! This module provides the mutation interface an interpreter expects,
//! backed by an immutable remote snapshot:
//! - Reads fetch through the accessor on first touch and cache the result
//! - Fetch failures degrade to zero/empty values; the first underlying
//!   error is memoized for the orchestrator to check after the run
//! - Mutations append inverse entries to a journal
//! - Snapshots record the journal length under a monotonic id; revert
//!   unwinds the journal and drops the consumed revision and everything
//!   newer
//!
//! Reads cannot raise because the interpreter's embedding contract has no
//! error channel mid-execution; the `Infallible` database error type makes
//! that explicit.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use revm::primitives::{HashMap as EvmHashMap, KECCAK_EMPTY};
use revm::state::{Account, AccountInfo, Bytecode};
use revm::{Database, DatabaseCommit, DatabaseRef};

use crate::errors::ChainError;
use crate::state::ChainAccessor;

/// One account's cached view; `None` facets have not been fetched yet
#[derive(Debug, Clone, Default)]
struct CachedAccount {
    balance: Option<U256>,
    nonce: Option<u64>,
    code: Option<Bytes>,
    code_hash: Option<B256>,
    storage: HashMap<U256, U256>,
    /// Freshly created this run; unknown slots read as zero, not remote
    created: bool,
    destroyed: bool,
    dirty: bool,
}

/// Inverse of one mutation, applied on revert
///
/// `None` previous values mean the facet had not been cached before the
/// mutation; undoing removes the cache entry so the next read refetches.
/// That restores the pre-mutation observable value because the remote
/// snapshot at a fixed height never changes.
#[derive(Debug)]
enum JournalEntry {
    BalanceChange {
        address: Address,
        prev: Option<U256>,
    },
    NonceChange {
        address: Address,
        prev: Option<u64>,
    },
    CodeChange {
        address: Address,
        prev: Option<(Bytes, B256)>,
    },
    StorageChange {
        address: Address,
        slot: U256,
        prev: Option<U256>,
        prev_dirty: bool,
    },
    AccountCreated {
        address: Address,
        prev: Option<Box<CachedAccount>>,
    },
    DestroyChange {
        address: Address,
        prev_destroyed: bool,
        prev_balance: Option<U256>,
    },
    RefundChange {
        prev: u64,
    },
}

/// One snapshot checkpoint
#[derive(Debug, Clone, Copy)]
struct Revision {
    id: u64,
    journal_len: usize,
}

#[derive(Debug, Default)]
struct StateInner {
    accounts: HashMap<Address, CachedAccount>,
    journal: Vec<JournalEntry>,
    revisions: Vec<Revision>,
    next_revision_id: u64,
    refund: u64,
    first_error: Option<ChainError>,
}

/// Cached, journaled state view over a chain-data accessor
///
/// All state lives behind a single lock, so each individual operation is
/// atomic; sequences of operations are not, and are expected to be driven
/// by one interpreter thread per replay.
pub struct CachedState {
    accessor: Arc<dyn ChainAccessor>,
    height: u64,
    inner: Mutex<StateInner>,
}

impl std::fmt::Debug for CachedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedState")
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn note_error(slot: &mut Option<ChainError>, error: ChainError) {
    if slot.is_none() {
        *slot = Some(error);
    }
}

impl CachedState {
    /// View of the chain as of `height`
    pub fn new(accessor: Arc<dyn ChainAccessor>, height: u64) -> Self {
        CachedState {
            accessor,
            height,
            inner: Mutex::new(StateInner::default()),
        }
    }

    /// The fixed block height this view reads at
    pub fn height(&self) -> u64 {
        self.height
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_balance(&self, inner: &mut StateInner, address: Address) -> U256 {
        let acct = inner.accounts.entry(address).or_default();
        if let Some(balance) = acct.balance {
            return balance;
        }
        let value = match self.accessor.balance(address, self.height) {
            Ok(v) => v,
            Err(e) => {
                note_error(&mut inner.first_error, e);
                U256::ZERO
            }
        };
        acct.balance = Some(value);
        value
    }

    fn ensure_nonce(&self, inner: &mut StateInner, address: Address) -> u64 {
        let acct = inner.accounts.entry(address).or_default();
        if let Some(nonce) = acct.nonce {
            return nonce;
        }
        let value = match self.accessor.nonce(address, self.height) {
            Ok(v) => v,
            Err(e) => {
                note_error(&mut inner.first_error, e);
                0
            }
        };
        acct.nonce = Some(value);
        value
    }

    fn ensure_code(&self, inner: &mut StateInner, address: Address) -> Bytes {
        let acct = inner.accounts.entry(address).or_default();
        if let Some(code) = &acct.code {
            return code.clone();
        }
        let code = match self.accessor.code(address, self.height) {
            Ok(c) => c,
            Err(e) => {
                note_error(&mut inner.first_error, e);
                Bytes::new()
            }
        };
        let hash = if code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&code)
        };
        acct.code = Some(code.clone());
        acct.code_hash = Some(hash);
        code
    }

    fn ensure_storage(&self, inner: &mut StateInner, address: Address, slot: U256) -> U256 {
        let acct = inner.accounts.entry(address).or_default();
        if let Some(value) = acct.storage.get(&slot) {
            return *value;
        }
        let value = if acct.created {
            U256::ZERO
        } else {
            match self.accessor.storage_at(address, slot, self.height) {
                Ok(v) => v,
                Err(e) => {
                    note_error(&mut inner.first_error, e);
                    U256::ZERO
                }
            }
        };
        acct.storage.insert(slot, value);
        value
    }

    /// Balance of `address`, fetched on first touch
    pub fn balance(&self, address: Address) -> U256 {
        let mut guard = self.lock();
        self.ensure_balance(&mut guard, address)
    }

    /// Nonce of `address`, fetched on first touch
    pub fn nonce(&self, address: Address) -> u64 {
        let mut guard = self.lock();
        self.ensure_nonce(&mut guard, address)
    }

    /// Runtime code of `address`, fetched on first touch
    pub fn code(&self, address: Address) -> Bytes {
        let mut guard = self.lock();
        self.ensure_code(&mut guard, address)
    }

    /// Length of the runtime code of `address`
    pub fn code_size(&self, address: Address) -> usize {
        self.code(address).len()
    }

    /// keccak256 of the runtime code; the empty-code hash for an empty
    /// account
    pub fn code_hash(&self, address: Address) -> B256 {
        let mut guard = self.lock();
        self.ensure_code(&mut guard, address);
        guard
            .accounts
            .get(&address)
            .and_then(|a| a.code_hash)
            .unwrap_or(KECCAK_EMPTY)
    }

    /// One storage word of `address`, fetched on first touch
    pub fn storage(&self, address: Address, slot: U256) -> U256 {
        let mut guard = self.lock();
        self.ensure_storage(&mut guard, address, slot)
    }

    /// Overwrite the cached balance, journaled
    pub fn set_balance(&self, address: Address, value: U256) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let acct = inner.accounts.entry(address).or_default();
        inner.journal.push(JournalEntry::BalanceChange {
            address,
            prev: acct.balance,
        });
        acct.balance = Some(value);
    }

    /// Add to the balance, fetching it first if absent, journaled
    pub fn add_balance(&self, address: Address, amount: U256) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let current = self.ensure_balance(inner, address);
        inner.journal.push(JournalEntry::BalanceChange {
            address,
            prev: Some(current),
        });
        if let Some(acct) = inner.accounts.get_mut(&address) {
            acct.balance = Some(current.saturating_add(amount));
        }
    }

    /// Subtract from the balance, fetching it first if absent, journaled
    pub fn sub_balance(&self, address: Address, amount: U256) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let current = self.ensure_balance(inner, address);
        inner.journal.push(JournalEntry::BalanceChange {
            address,
            prev: Some(current),
        });
        if let Some(acct) = inner.accounts.get_mut(&address) {
            acct.balance = Some(current.saturating_sub(amount));
        }
    }

    /// Overwrite the cached nonce, journaled
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let acct = inner.accounts.entry(address).or_default();
        inner.journal.push(JournalEntry::NonceChange {
            address,
            prev: acct.nonce,
        });
        acct.nonce = Some(nonce);
    }

    /// Overwrite the cached code, journaled
    pub fn set_code(&self, address: Address, code: Bytes) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let acct = inner.accounts.entry(address).or_default();
        inner.journal.push(JournalEntry::CodeChange {
            address,
            prev: acct.code.clone().zip(acct.code_hash),
        });
        let hash = if code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&code)
        };
        acct.code = Some(code);
        acct.code_hash = Some(hash);
    }

    /// Write one storage word and mark the address dirty, journaled
    pub fn set_storage(&self, address: Address, slot: U256, value: U256) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let acct = inner.accounts.entry(address).or_default();
        inner.journal.push(JournalEntry::StorageChange {
            address,
            slot,
            prev: acct.storage.get(&slot).copied(),
            prev_dirty: acct.dirty,
        });
        acct.storage.insert(slot, value);
        acct.dirty = true;
    }

    /// Whether a storage write has touched `address` this run
    pub fn is_dirty(&self, address: Address) -> bool {
        self.lock()
            .accounts
            .get(&address)
            .map(|a| a.dirty)
            .unwrap_or(false)
    }

    /// Replace the account with a fresh record, journaled
    ///
    /// An existing balance carries over, so value sent to the target
    /// address ahead of its creation does not vanish. Unknown storage
    /// slots of the fresh account read as zero without touching the
    /// remote.
    pub fn create_account(&self, address: Address) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let carried = self.ensure_balance(inner, address);
        let prev = inner.accounts.get(&address).cloned();
        inner.journal.push(JournalEntry::AccountCreated {
            address,
            prev: prev.map(Box::new),
        });
        inner.accounts.insert(
            address,
            CachedAccount {
                balance: Some(carried),
                nonce: Some(0),
                code: Some(Bytes::new()),
                code_hash: Some(KECCAK_EMPTY),
                storage: HashMap::new(),
                created: true,
                destroyed: false,
                dirty: false,
            },
        );
    }

    /// Mark the account removed and clear its balance, journaled
    ///
    /// Cached data is not deleted, so reads during the rest of the frame
    /// still resolve. Always returns true; accounts always resolve in
    /// this view.
    pub fn suicide(&self, address: Address) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let balance = self.ensure_balance(inner, address);
        let acct = inner.accounts.entry(address).or_default();
        inner.journal.push(JournalEntry::DestroyChange {
            address,
            prev_destroyed: acct.destroyed,
            prev_balance: Some(balance),
        });
        acct.destroyed = true;
        acct.balance = Some(U256::ZERO);
        true
    }

    /// Whether `address` has been marked removed this run
    pub fn has_suicided(&self, address: Address) -> bool {
        self.lock()
            .accounts
            .get(&address)
            .map(|a| a.destroyed)
            .unwrap_or(false)
    }

    /// Accounts are assumed to exist once referenced in this view
    pub fn exist(&self, _address: Address) -> bool {
        true
    }

    /// Zero-balance, zero-nonce, zero-code test
    pub fn empty(&self, address: Address) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let balance = self.ensure_balance(inner, address);
        let nonce = self.ensure_nonce(inner, address);
        let code = self.ensure_code(inner, address);
        balance.is_zero() && nonce == 0 && code.is_empty()
    }

    /// Add to the refund counter, journaled
    pub fn add_refund(&self, gas: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.journal.push(JournalEntry::RefundChange { prev: inner.refund });
        inner.refund = inner.refund.saturating_add(gas);
    }

    /// Current value of the refund counter
    pub fn refund(&self) -> u64 {
        self.lock().refund
    }

    /// Checkpoint the current journal length under a fresh monotonic id
    pub fn snapshot(&self) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_revision_id;
        inner.next_revision_id += 1;
        let journal_len = inner.journal.len();
        inner.revisions.push(Revision { id, journal_len });
        id
    }

    /// Undo every mutation journaled after snapshot `id`
    ///
    /// Drops the consumed revision and every newer one, so reverting
    /// twice to the same id is a no-op the second time. An id that was
    /// never handed out (or was already consumed) is silently ignored;
    /// callers must only pass ids they received.
    pub fn revert_to_snapshot(&self, id: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        // Ids are handed out in ascending order
        let Ok(idx) = inner.revisions.binary_search_by_key(&id, |r| r.id) else {
            return;
        };
        let target_len = inner.revisions[idx].journal_len;
        while inner.journal.len() > target_len {
            if let Some(entry) = inner.journal.pop() {
                undo(&mut inner.accounts, &mut inner.refund, entry);
            }
        }
        inner.revisions.truncate(idx);
    }

    /// First fetch error swallowed during execution, clearing the slot
    pub fn take_error(&self) -> Option<ChainError> {
        self.lock().first_error.take()
    }
}

fn undo(accounts: &mut HashMap<Address, CachedAccount>, refund: &mut u64, entry: JournalEntry) {
    match entry {
        JournalEntry::BalanceChange { address, prev } => {
            if let Some(acct) = accounts.get_mut(&address) {
                acct.balance = prev;
            }
        }
        JournalEntry::NonceChange { address, prev } => {
            if let Some(acct) = accounts.get_mut(&address) {
                acct.nonce = prev;
            }
        }
        JournalEntry::CodeChange { address, prev } => {
            if let Some(acct) = accounts.get_mut(&address) {
                match prev {
                    Some((code, hash)) => {
                        acct.code = Some(code);
                        acct.code_hash = Some(hash);
                    }
                    None => {
                        acct.code = None;
                        acct.code_hash = None;
                    }
                }
            }
        }
        JournalEntry::StorageChange {
            address,
            slot,
            prev,
            prev_dirty,
        } => {
            if let Some(acct) = accounts.get_mut(&address) {
                match prev {
                    Some(value) => {
                        acct.storage.insert(slot, value);
                    }
                    None => {
                        acct.storage.remove(&slot);
                    }
                }
                acct.dirty = prev_dirty;
            }
        }
        JournalEntry::AccountCreated { address, prev } => match prev {
            Some(record) => {
                accounts.insert(address, *record);
            }
            None => {
                accounts.remove(&address);
            }
        },
        JournalEntry::DestroyChange {
            address,
            prev_destroyed,
            prev_balance,
        } => {
            if let Some(acct) = accounts.get_mut(&address) {
                acct.destroyed = prev_destroyed;
                acct.balance = prev_balance;
            }
        }
        JournalEntry::RefundChange { prev } => {
            *refund = prev;
        }
    }
}

impl DatabaseRef for CachedState {
    type Error = Infallible;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let balance = self.ensure_balance(inner, address);
        let nonce = self.ensure_nonce(inner, address);
        let code = self.ensure_code(inner, address);
        let code_hash = inner
            .accounts
            .get(&address)
            .and_then(|a| a.code_hash)
            .unwrap_or(KECCAK_EMPTY);
        let bytecode = if code.is_empty() {
            Bytecode::new()
        } else {
            Bytecode::new_raw(code)
        };
        Ok(Some(AccountInfo {
            balance,
            nonce,
            code_hash,
            code: Some(bytecode),
        }))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        let guard = self.lock();
        for acct in guard.accounts.values() {
            if acct.code_hash == Some(code_hash) {
                if let Some(code) = &acct.code {
                    if !code.is_empty() {
                        return Ok(Bytecode::new_raw(code.clone()));
                    }
                }
            }
        }
        Ok(Bytecode::new())
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let mut guard = self.lock();
        Ok(self.ensure_storage(&mut guard, address, index))
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        // Synthesized like revm's EmptyDB; replay does not follow real
        // ancestor hashes
        Ok(keccak256(number.to_string().as_bytes()))
    }
}

impl Database for CachedState {
    type Error = Infallible;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.basic_ref(address)
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        self.code_by_hash_ref(code_hash)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        self.storage_ref(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        self.block_hash_ref(number)
    }
}

impl DatabaseCommit for CachedState {
    /// Apply interpreter-produced changes through the journaled mutators,
    /// so even committed state can be rolled back across a snapshot
    fn commit(&mut self, changes: EvmHashMap<Address, Account>) {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }
            if account.is_selfdestructed() {
                self.suicide(address);
                continue;
            }
            if account.is_created() {
                self.create_account(address);
            }
            self.set_balance(address, account.info.balance);
            self.set_nonce(address, account.info.nonce);
            if let Some(code) = account.info.code {
                if !code.is_empty() {
                    self.set_code(address, code.original_bytes());
                }
            }
            for (slot, value) in account.storage {
                if value.is_changed() {
                    self.set_storage(address, slot, value.present_value());
                }
            }
        }
    }
}
