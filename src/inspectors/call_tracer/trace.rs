//! Frame sealing and error-origin resolution
//!
//! `handle_end` is the single exit path for call and create frames: it
//! fixes the outcome fields, interprets the interpreter result, decodes
//! revert payloads, annotates the failing source line and moves the
//! finished frame under its parent. The error DFS walks the sealed tree
//! afterwards to locate the frame a failure actually started in.

use alloy::primitives::{hex, Bytes};
use revm::context::ContextTr;
use revm::context_interface::result::HaltReason;
use revm::interpreter::{InstructionResult, SuccessOrHalt};

use crate::calldata::{decode_output, decode_revert_reason, function_for_selector};
use crate::inspectors::call_tracer::CallTracer;
use crate::types::{CallFrame, FrameStatus};

impl CallTracer {
    /// Seal the innermost open frame with the interpreter outcome.
    ///
    /// Runs for every call and create exit. The sealed frame is detached
    /// from the working list and appended to its parent's children, so
    /// once execution finishes only the root remains at the top level.
    pub(crate) fn handle_end<CTX: ContextTr>(
        &mut self,
        context: &mut CTX,
        result: InstructionResult,
        gas_used: u64,
        output: Bytes,
    ) {
        // A return event with no matching entry; counted, not fatal.
        let Some(open) = self.call_stack.pop() else {
            self.excess_returns += 1;
            return;
        };

        let (state_post, decoded_state_post) =
            Self::capture_state(context, open.storage_address, open.contract.as_deref());

        let status = match SuccessOrHalt::<HaltReason>::from(result) {
            SuccessOrHalt::Success(_) => FrameStatus::Success,
            SuccessOrHalt::Revert => FrameStatus::Revert(
                decode_revert_reason(&output)
                    .unwrap_or_else(|| format!("0x{}", hex::encode(&output))),
            ),
            SuccessOrHalt::Halt(reason) => FrameStatus::Halt(format!("{reason:?}")),
            SuccessOrHalt::FatalExternalError => FrameStatus::FatalError,
            // Internal continuations are interpreter bookkeeping, not outcomes
            SuccessOrHalt::Internal(_) => FrameStatus::Success,
        };
        let success = status.is_success();

        let frame = &mut self.frames[open.index];
        frame.gas_used = gas_used;
        frame.output = output;
        frame.state_post = state_post;
        frame.decoded_state_post = decoded_state_post;
        frame.error_origin = !success && frame.calls.iter().all(|c| c.status.is_success());
        frame.status = status;

        if let Some(contract) = open.contract.as_deref() {
            if success {
                if let Some(function) = function_for_selector(&contract.abi, &frame.input) {
                    if let Ok(decoded) = decode_output(function, &frame.output) {
                        frame.decoded_output = Some(decoded);
                    }
                }
            } else if let (Some(map), Some(pc)) = (contract.source_map.as_ref(), open.last_pc) {
                if let Some(entry) = map.get(pc) {
                    frame.error_line = Some(entry.line);
                }
            }
        }

        if let Some(parent) = self.call_stack.last() {
            let parent_index = parent.index;
            // The sealed frame is always the tail: anything opened after
            // it already returned and was moved under its own parent.
            let finished = self.frames.remove(open.index);
            self.frames[parent_index].calls.push(finished);
        }
    }

    /// Trace address of the frame the failure originated in, if any
    pub fn error_trace_address(&self) -> Option<Vec<usize>> {
        self.find_error_frame().map(|frame| frame.trace_address.clone())
    }

    /// The deepest frame that failed on its own rather than by inheriting
    /// a child's failure
    pub fn find_error_frame(&self) -> Option<&CallFrame> {
        fn origin(frame: &CallFrame) -> Option<&CallFrame> {
            for child in frame.calls.iter().filter(|c| !c.status.is_success()) {
                if let Some(found) = origin(child) {
                    return Some(found);
                }
            }
            frame.error_origin.then_some(frame)
        }

        self.frames
            .iter()
            .filter(|frame| !frame.status.is_success())
            .find_map(origin)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::dyn_abi::DynSolValue;
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::{Address, Bytes, U256};
    use revm::context::Context;
    use revm::handler::MainContext;
    use revm::interpreter::InstructionResult;

    use crate::artifact::{ContractArtifact, ContractAst, ContractRegistry};
    use crate::inspectors::call_tracer::{CallTracer, OpenFrame};
    use crate::types::{CallFrame, CallKind, FrameStatus};

    fn frame(trace_address: Vec<usize>) -> CallFrame {
        CallFrame {
            kind: CallKind::Call,
            from: Address::ZERO,
            to: Some(Address::repeat_byte(0x11)),
            value: U256::ZERO,
            gas: 100_000,
            gas_used: 0,
            gas_price: None,
            input: Bytes::new(),
            decoded_input: None,
            output: Bytes::new(),
            decoded_output: None,
            state_pre: Vec::new(),
            decoded_state_pre: Vec::new(),
            state_post: Vec::new(),
            decoded_state_post: Vec::new(),
            status: FrameStatus::InProgress,
            error_line: None,
            error_origin: false,
            trace_address,
            calls: Vec::new(),
        }
    }

    fn open(index: usize) -> OpenFrame {
        OpenFrame {
            index,
            storage_address: Address::ZERO,
            contract: None,
            last_pc: None,
        }
    }

    fn plain_tracer() -> CallTracer {
        CallTracer::new(Arc::new(ContractRegistry::new()))
    }

    fn error_string(reason: &str) -> Bytes {
        let mut payload = vec![0x08, 0xc3, 0x79, 0xa0];
        payload.extend_from_slice(&DynSolValue::String(reason.to_string()).abi_encode());
        Bytes::from(payload)
    }

    #[test]
    fn test_unmatched_return_is_counted() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();

        tracer.handle_end(&mut ctx, InstructionResult::Stop, 0, Bytes::new());
        tracer.handle_end(&mut ctx, InstructionResult::Return, 0, Bytes::new());

        assert_eq!(tracer.excess_returns(), 2);
        assert!(tracer.frames().is_empty());
    }

    #[test]
    fn test_seal_decodes_revert_reason() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();
        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));

        tracer.handle_end(
            &mut ctx,
            InstructionResult::Revert,
            700,
            error_string("vault is sealed"),
        );

        let root = &tracer.frames()[0];
        assert_eq!(root.status, FrameStatus::Revert("vault is sealed".to_string()));
        assert_eq!(root.gas_used, 700);
        assert!(root.error_origin);
    }

    #[test]
    fn test_undecodable_revert_keeps_raw_hex() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();
        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));

        tracer.handle_end(
            &mut ctx,
            InstructionResult::Revert,
            0,
            Bytes::from(vec![0xde, 0xad, 0xbe, 0xef, 0x01]),
        );

        assert_eq!(
            tracer.frames()[0].status,
            FrameStatus::Revert("0xdeadbeef01".to_string())
        );
    }

    #[test]
    fn test_halt_records_reason() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();
        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));

        tracer.handle_end(&mut ctx, InstructionResult::OutOfGas, 50_000, Bytes::new());

        match &tracer.frames()[0].status {
            FrameStatus::Halt(reason) => assert!(reason.contains("OutOfGas")),
            other => panic!("expected halt, got {other:?}"),
        }
    }

    #[test]
    fn test_children_reparent_in_execution_order() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();

        // parent enters
        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));
        // first child enters and returns
        tracer.frames.push(frame(vec![0]));
        tracer.call_stack.push(open(1));
        tracer.handle_end(&mut ctx, InstructionResult::Return, 100, Bytes::new());
        // second child enters and reverts
        tracer.frames.push(frame(vec![1]));
        tracer.call_stack.push(open(1));
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 60, Bytes::new());
        // parent swallows the child failure and still succeeds
        tracer.handle_end(&mut ctx, InstructionResult::Stop, 400, Bytes::new());

        assert_eq!(tracer.frames().len(), 1);
        let root = &tracer.frames()[0];
        assert!(root.status.is_success());
        assert!(!root.error_origin);
        assert_eq!(root.calls.len(), 2);
        assert!(root.calls[0].status.is_success());
        assert!(root.calls[1].status.is_revert());
        assert!(root.calls[1].error_origin);
        assert_eq!(root.calls[1].trace_address, vec![1]);
        assert_eq!(tracer.excess_returns(), 0);
    }

    #[test]
    fn test_error_origin_is_the_deepest_failure() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();

        // root -> child -> grandchild, every level reverts
        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));
        tracer.frames.push(frame(vec![0]));
        tracer.call_stack.push(open(1));
        tracer.frames.push(frame(vec![0, 0]));
        tracer.call_stack.push(open(2));
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 10, Bytes::new());
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 20, Bytes::new());
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 30, Bytes::new());

        let origin = tracer.find_error_frame().unwrap();
        assert!(origin.error_origin);
        assert_eq!(origin.trace_address, vec![0, 0]);
        assert_eq!(tracer.error_trace_address(), Some(vec![0, 0]));

        // only the leaf originated the failure
        let root = &tracer.frames()[0];
        assert!(!root.error_origin);
        assert!(!root.calls[0].error_origin);
    }

    #[test]
    fn test_error_search_follows_the_failed_branch() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();

        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));
        // first child succeeds
        tracer.frames.push(frame(vec![0]));
        tracer.call_stack.push(open(1));
        tracer.handle_end(&mut ctx, InstructionResult::Return, 5, Bytes::new());
        // second child fails and the root propagates it
        tracer.frames.push(frame(vec![1]));
        tracer.call_stack.push(open(1));
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 5, Bytes::new());
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 20, Bytes::new());

        assert_eq!(tracer.error_trace_address(), Some(vec![1]));
    }

    #[test]
    fn test_no_error_frame_when_all_succeed() {
        let mut ctx = Context::mainnet();
        let mut tracer = plain_tracer();

        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(open(0));
        tracer.frames.push(frame(vec![0]));
        tracer.call_stack.push(open(1));
        tracer.handle_end(&mut ctx, InstructionResult::Return, 5, Bytes::new());
        tracer.handle_end(&mut ctx, InstructionResult::Stop, 30, Bytes::new());

        assert!(tracer.find_error_frame().is_none());
        assert_eq!(tracer.error_trace_address(), None);
    }

    #[test]
    fn test_failing_line_resolved_through_source_map() {
        // Three one-byte instructions; entries at pc 1 and 2 point into
        // the second source line.
        let artifact = ContractArtifact {
            contract_name: "Lined".to_string(),
            abi: JsonAbi::new(),
            bytecode: String::new(),
            deployed_bytecode: "0x5b5b5b".to_string(),
            source_map: String::new(),
            deployed_source_map: "0:1:0:-;4:1:0;4:1:0".to_string(),
            source: "ab\ncd\n".to_string(),
            source_path: String::new(),
            ast: ContractAst::default(),
        };
        let mut registry = ContractRegistry::new();
        registry.register(artifact).unwrap();

        let mut ctx = Context::mainnet();
        let mut tracer = CallTracer::new(Arc::new(registry));
        let contract = tracer.resolve_contract(Address::repeat_byte(0x42), &[0x5b, 0x5b, 0x5b]);
        assert!(contract.is_some());

        tracer.frames.push(frame(vec![]));
        tracer.call_stack.push(OpenFrame {
            index: 0,
            storage_address: Address::repeat_byte(0x42),
            contract,
            last_pc: Some(1),
        });
        tracer.handle_end(&mut ctx, InstructionResult::Revert, 90, Bytes::new());

        assert_eq!(tracer.frames()[0].error_line, Some(2));
    }

    #[test]
    fn test_resolution_is_memoized_per_address() {
        let artifact = ContractArtifact {
            contract_name: "Exact".to_string(),
            abi: JsonAbi::new(),
            bytecode: String::new(),
            deployed_bytecode: "0x5b5b".to_string(),
            source_map: String::new(),
            deployed_source_map: String::new(),
            source: String::new(),
            source_path: String::new(),
            ast: ContractAst::default(),
        };
        let mut registry = ContractRegistry::new();
        registry.register(artifact).unwrap();
        let mut tracer = CallTracer::new(Arc::new(registry));

        let matched = Address::repeat_byte(0x42);
        assert!(tracer.resolve_contract(matched, &[0x5b, 0x5b]).is_some());
        // the address stays resolved even when asked with other bytes
        assert!(tracer.resolve_contract(matched, &[]).is_some());
        assert_eq!(tracer.resolved.len(), 1);

        // a miss is memoized too
        let unknown = Address::repeat_byte(0x43);
        assert!(tracer.resolve_contract(unknown, &[0x00]).is_none());
        assert!(tracer.resolve_contract(unknown, &[0x00]).is_none());
        assert_eq!(tracer.resolved.len(), 2);
    }
}
