//! revm Inspector hooks for the call tracer
//!
//! Frame entry hooks (`call`/`create`) resolve the executing bytecode
//! against the artifact registry, decode the call data, snapshot the
//! callee's state variables and open a frame. Exit hooks feed the
//! outcome into `handle_end`. The `step` hook only records the program
//! counter, which revert annotation resolves through the source map once
//! a frame fails.
//!
//! Call semantics worth noting:
//! - For delegate calls the reported callee is the bytecode address (the
//!   library actually running), while storage snapshots read the target
//!   address, which is where delegated execution writes.
//! - A creation frame has no callee until the address is known in
//!   `create_end`, and no artifact: registrations match deployed
//!   bytecode, not init code.

use revm::context::{ContextTr, JournalTr};
use revm::interpreter::interpreter_types::Jumps;
use revm::interpreter::{
    CallInputs, CallOutcome, CallScheme, CreateInputs, CreateOutcome, Interpreter,
};
use revm::Inspector;

use alloy::primitives::Bytes;

use crate::calldata::parse_call_data;
use crate::inspectors::call_tracer::{CallTracer, OpenFrame};
use crate::types::{CallFrame, CallKind, FrameStatus};

impl<CTX: ContextTr> Inspector<CTX> for CallTracer {
    fn call(&mut self, context: &mut CTX, inputs: &mut CallInputs) -> Option<CallOutcome> {
        let input = inputs.input.bytes(context);
        let to = match inputs.scheme {
            CallScheme::DelegateCall => inputs.bytecode_address,
            _ => inputs.target_address,
        };

        let code = match context.journal().code(inputs.bytecode_address) {
            Ok(loaded) => loaded.data,
            Err(_) => Bytes::new(),
        };
        let contract = self.resolve_contract(inputs.bytecode_address, &code);

        let decoded_input = contract
            .as_ref()
            .and_then(|c| parse_call_data(&input, &c.abi).ok());
        let (state_pre, decoded_state_pre) =
            Self::capture_state(context, inputs.target_address, contract.as_deref());

        let mut trace_address = Vec::new();
        if let Some(parent) = self.call_stack.last() {
            let parent_frame = &self.frames[parent.index];
            trace_address = parent_frame.trace_address.clone();
            trace_address.push(parent_frame.calls.len());
        }

        let frame = CallFrame {
            kind: CallKind::from(inputs.scheme),
            from: inputs.caller,
            to: Some(to),
            value: inputs.call_value(),
            gas: inputs.gas_limit,
            gas_used: 0,
            gas_price: None,
            input,
            decoded_input,
            output: Bytes::new(),
            decoded_output: None,
            state_pre,
            decoded_state_pre,
            state_post: Vec::new(),
            decoded_state_post: Vec::new(),
            status: FrameStatus::InProgress,
            error_line: None,
            error_origin: false,
            trace_address,
            calls: Vec::new(),
        };

        self.frames.push(frame);
        self.call_stack.push(OpenFrame {
            index: self.frames.len() - 1,
            storage_address: inputs.target_address,
            contract,
            last_pc: None,
        });
        None
    }

    fn call_end(&mut self, context: &mut CTX, _inputs: &CallInputs, outcome: &mut CallOutcome) {
        self.handle_end(
            context,
            outcome.result.result,
            outcome.result.gas.spent(),
            outcome.result.output.clone(),
        );
    }

    fn create(&mut self, _context: &mut CTX, inputs: &mut CreateInputs) -> Option<CreateOutcome> {
        let mut trace_address = Vec::new();
        if let Some(parent) = self.call_stack.last() {
            let parent_frame = &self.frames[parent.index];
            trace_address = parent_frame.trace_address.clone();
            trace_address.push(parent_frame.calls.len());
        }

        let frame = CallFrame {
            kind: CallKind::from(inputs.scheme),
            from: inputs.caller,
            // Known in create_end
            to: None,
            value: inputs.value,
            gas: inputs.gas_limit,
            gas_used: 0,
            gas_price: None,
            input: inputs.init_code.clone(),
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
        };

        self.frames.push(frame);
        self.call_stack.push(OpenFrame {
            index: self.frames.len() - 1,
            storage_address: alloy::primitives::Address::ZERO,
            contract: None,
            last_pc: None,
        });
        None
    }

    fn create_end(
        &mut self,
        context: &mut CTX,
        _inputs: &CreateInputs,
        outcome: &mut CreateOutcome,
    ) {
        if let Some(address) = outcome.address {
            if let Some(open) = self.call_stack.last() {
                self.frames[open.index].to = Some(address);
            }
        }
        self.handle_end(
            context,
            outcome.result.result,
            outcome.result.gas.spent(),
            outcome.result.output.clone(),
        );
    }

    fn step(&mut self, interp: &mut Interpreter, _context: &mut CTX) {
        if let Some(open) = self.call_stack.last_mut() {
            open.last_pc = Some(interp.bytecode.pc());
        }
    }
}
