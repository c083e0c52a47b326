//! Seam-trait implementations for the call tracer

use crate::inspectors::call_tracer::{CallTraceOutput, CallTracer};
use crate::traits::{Reset, TraceOutput};

impl Reset for CallTracer {
    /// Clear per-transaction state; the artifact registry is kept.
    fn reset(&mut self) {
        self.frames.clear();
        self.call_stack.clear();
        self.resolved.clear();
        self.excess_returns = 0;
    }
}

impl TraceOutput for CallTracer {
    type Output = CallTraceOutput;

    fn get_output(&self) -> Self::Output {
        CallTraceOutput {
            root: self.frames.first().cloned(),
            error_trace_address: self.error_trace_address(),
            excess_returns: self.excess_returns,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::Bytes;
    use revm::context::Context;
    use revm::handler::MainContext;
    use revm::interpreter::InstructionResult;

    use super::*;
    use crate::artifact::ContractRegistry;

    #[test]
    fn test_reset_clears_transaction_state() {
        let mut ctx = Context::mainnet();
        let mut tracer = CallTracer::new(Arc::new(ContractRegistry::new()));
        tracer.handle_end(&mut ctx, InstructionResult::Stop, 0, Bytes::new());
        assert_eq!(tracer.excess_returns(), 1);

        tracer.reset();

        assert_eq!(tracer.excess_returns(), 0);
        assert!(tracer.frames().is_empty());
        let output = tracer.get_output();
        assert!(output.root.is_none());
        assert!(output.error_trace_address.is_none());
        assert_eq!(output.excess_returns, 0);
    }
}
