//! Inspector seam traits
//!
//! The replay loop talks to its inspector through two small traits plus a
//! marker combining them with revm's `Inspector`:
//!
//! - [`Reset`] clears accumulated data so one inspector instance can serve
//!   several replays
//! - [`TraceOutput`] converts the accumulated data into the inspector's
//!   final output type
//! - [`TraceInspector`] is what the replay loop actually requires; any
//!   `Inspector + Reset + TraceOutput` qualifies via the blanket impl

use revm::Inspector;

/// Clear all accumulated inspector state
pub trait Reset {
    fn reset(&mut self);
}

/// Produce the inspector's final output from its accumulated state
pub trait TraceOutput {
    type Output;

    fn get_output(&self) -> Self::Output;
}

/// Full capability set the replay loop requires of an inspector
pub trait TraceInspector<CTX>: Inspector<CTX> + Reset + TraceOutput {}

impl<T, CTX> TraceInspector<CTX> for T where T: Inspector<CTX> + Reset + TraceOutput {}
