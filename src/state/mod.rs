//! Chain data access and the journaled replay state
//!
//! Split in two layers:
//! - [`ChainAccessor`] abstracts "read chain data at a height" and is
//!   implemented by [`RpcAccessor`] over a live node and by
//!   [`MockChain`] in tests
//! - [`CachedState`] sits on top of an accessor and gives the
//!   interpreter a mutable, snapshot-revertible view of one block's
//!   pre-state

mod accessor;
mod cached;
mod mock;

pub use accessor::{ChainAccessor, RpcAccessor};
pub use cached::CachedState;
pub use mock::{FetchCounts, MockChain};
