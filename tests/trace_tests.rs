//! Integration tests for transaction replay and trace assembly
//!
//! This test module replays hand-assembled transactions against an
//! in-memory chain and checks the sealed reports end to end:
//!
//! # Test Coverage
//! - Plain value transfers and the shape of their single root frame
//! - ABI decoding of call input, return data and state-variable dumps
//! - Revert reasons and failing-line resolution through the source map
//! - Nested calls, delegate calls and contract-creation transactions
//! - Degraded-annotation diagnostics for broken source maps
//! - JSON rendering of the sealed report
//! - Connection-time failures of the RPC-backed accessor
//!
//! # Test Infrastructure
//! - [`MockChain`] serves transactions, blocks and account state, so the
//!   whole suite runs offline and deterministically
//! - Contract runtimes are small assembled bytecode sequences; their
//!   artifacts carry real ABI, source-map and AST documents
//! - The replay path itself is synchronous; only the accessor
//!   connection tests need a tokio runtime

use std::sync::Arc;

use alloy::{
    primitives::{Address, Bytes, TxHash, B256, U256},
    sol,
    sol_types::SolCall,
};
use anyhow::Result;
use replay_trace::{
    errors::{InitError, TraceError},
    types::{BlockRecord, TxRecord},
    CallKind, ContractArtifact, ContractRegistry, FrameStatus, MockChain, RpcAccessor, Tracer,
};
use serde_json::json;

sol! {
    function bump() external returns (uint256);
    function transfer(address to, uint256 amount) external;
}

const BLOCK_HASH: B256 = B256::repeat_byte(0xbb);
const BLOCK_NUMBER: u64 = 1_234_567;

const CALLER: Address = Address::repeat_byte(0xaa);
const RECIPIENT: Address = Address::repeat_byte(0x99);
const COUNTER: Address = Address::repeat_byte(0x22);
const HELPER: Address = Address::repeat_byte(0x33);
const VAULT: Address = Address::repeat_byte(0x44);
const DELEGATOR: Address = Address::repeat_byte(0x55);
const ROUTER: Address = Address::repeat_byte(0x66);

fn sealed_block() -> BlockRecord {
    BlockRecord {
        hash: BLOCK_HASH,
        number: BLOCK_NUMBER,
        timestamp: 1_700_000_000,
        beneficiary: Address::repeat_byte(0xfe),
        difficulty: U256::ZERO,
        gas_limit: 30_000_000,
        base_fee: Some(7),
    }
}

fn mined_tx(id: u8, to: Option<Address>, input: Bytes, value: U256) -> TxRecord {
    TxRecord {
        hash: TxHash::repeat_byte(id),
        from: CALLER,
        to,
        value,
        input,
        gas: 1_000_000,
        gas_price: 1,
        nonce: 0,
        block_hash: Some(BLOCK_HASH),
        block_number: Some(BLOCK_NUMBER),
        transaction_index: Some(0),
    }
}

/// Chain that knows the transaction, its block, and a funded caller
fn chain_for(tx: &TxRecord) -> MockChain {
    let chain = MockChain::new();
    chain.insert_block(sealed_block());
    chain.insert_transaction(tx.clone());
    chain.set_balance(CALLER, U256::from(1_000_000_000_000_000_000u64));
    chain
}

fn tracer_with(chain: MockChain, registry: ContractRegistry) -> Tracer {
    Tracer::new(Arc::new(chain), registry)
}

/// PUSH1 42, MSTORE at 0, return the word
fn answer_runtime() -> Bytes {
    hex::decode("602a60005260206000f3").unwrap().into()
}

/// Store 9 into slot 0, then return the word 42
fn counter_runtime() -> Bytes {
    hex::decode("6009600055602a60005260206000f3").unwrap().into()
}

/// Unconditional REVERT with an empty payload, at byte offset 4
fn vault_runtime() -> Bytes {
    hex::decode("60006000fd").unwrap().into()
}

/// CALL `callee` with no value, no arguments and 0xffff gas, then stop
fn calling_code(callee: Address) -> Bytes {
    let mut code = hex::decode("60006000600060006000").unwrap();
    code.push(0x73);
    code.extend_from_slice(callee.as_slice());
    code.extend_from_slice(&hex::decode("61fffff15000").unwrap());
    code.into()
}

/// DELEGATECALL `callee` with no arguments and 0xffff gas, then stop
fn delegating_code(callee: Address) -> Bytes {
    let mut code = hex::decode("6000600060006000").unwrap();
    code.push(0x73);
    code.extend_from_slice(callee.as_slice());
    code.extend_from_slice(&hex::decode("61fffff45000").unwrap());
    code.into()
}

/// Init code that deploys `runtime`: push it as one word, store it at the
/// tail of the first memory word, return the trailing bytes
fn deploy_code(runtime: &[u8]) -> Bytes {
    let mut code = vec![0x5f + runtime.len() as u8];
    code.extend_from_slice(runtime);
    code.extend_from_slice(&[0x60, 0x00, 0x52]);
    code.extend_from_slice(&[0x60, runtime.len() as u8]);
    code.extend_from_slice(&[0x60, 32 - runtime.len() as u8]);
    code.push(0xf3);
    code.into()
}

/// Artifact matching [`counter_runtime`], with one state variable
fn counter_artifact() -> ContractArtifact {
    ContractArtifact::from_json(
        r#"{
            "contractName": "Counter",
            "abi": [
                {
                    "type": "function",
                    "name": "bump",
                    "inputs": [],
                    "outputs": [{"name": "", "type": "uint256", "internalType": "uint256"}],
                    "stateMutability": "nonpayable"
                }
            ],
            "deployedBytecode": "0x6009600055602a60005260206000f3",
            "deployedSourceMap": "0:35:0:-;;;;;;;;",
            "source": "contract Counter { uint256 total; }\n",
            "ast": {
                "nodeType": "SourceUnit",
                "src": "0:36:0",
                "nodes": [
                    {
                        "name": "Counter",
                        "nodeType": "ContractDefinition",
                        "contractKind": "contract",
                        "src": "0:35:0",
                        "nodes": [
                            {
                                "name": "total",
                                "nodeType": "VariableDeclaration",
                                "src": "19:13:0",
                                "stateVariable": true,
                                "typeDescriptions": {
                                    "typeIdentifier": "t_uint256",
                                    "typeString": "uint256"
                                }
                            }
                        ]
                    }
                ]
            }
        }"#,
    )
    .expect("counter artifact")
}

/// Artifact matching [`vault_runtime`]; its third instruction maps to the
/// `revert()` statement on line 3
fn vault_artifact() -> ContractArtifact {
    ContractArtifact::from_json(
        r#"{
            "contractName": "Vault",
            "abi": [
                {
                    "type": "function",
                    "name": "transfer",
                    "inputs": [
                        {"name": "to", "type": "address", "internalType": "address"},
                        {"name": "amount", "type": "uint256", "internalType": "uint256"}
                    ],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                }
            ],
            "deployedBytecode": "0x60006000fd",
            "deployedSourceMap": "0:94:0:-;17:57:0;78:8:0",
            "source": "contract Vault {\n  function transfer(address to, uint256 amount) public {\n    revert();\n  }\n}\n",
            "ast": {
                "nodeType": "SourceUnit",
                "src": "0:94:0",
                "nodes": [
                    {
                        "name": "Vault",
                        "nodeType": "ContractDefinition",
                        "contractKind": "contract",
                        "src": "0:93:0",
                        "nodes": [
                            {
                                "name": "transfer",
                                "nodeType": "FunctionDefinition",
                                "src": "19:72:0",
                                "visibility": "public"
                            }
                        ]
                    }
                ]
            }
        }"#,
    )
    .expect("vault artifact")
}

/// Artifact whose source map does not parse; registration still succeeds
fn broken_artifact() -> ContractArtifact {
    ContractArtifact::from_json(
        r#"{
            "contractName": "Broken",
            "abi": [],
            "deployedBytecode": "0x00",
            "deployedSourceMap": "banana",
            "source": "",
            "ast": {"nodeType": "SourceUnit", "src": "0:0:0", "nodes": []}
        }"#,
    )
    .expect("broken artifact")
}

#[test]
fn test_native_transfer_between_accounts() -> Result<()> {
    let tx = mined_tx(0x01, Some(RECIPIENT), Bytes::new(), U256::from(100));
    let tracer = tracer_with(chain_for(&tx), ContractRegistry::new());

    let report = tracer.trace(tx.hash)?;

    assert_eq!(report.transaction_hash, tx.hash);
    assert_eq!(report.block_number, BLOCK_NUMBER);
    assert_eq!(report.error_trace_address, None);
    assert_eq!(report.diagnostics.excess_returns, 0);
    assert!(report.diagnostics.skipped_sources.is_empty());

    let root = &report.root;
    assert_eq!(root.kind, CallKind::Call);
    assert_eq!(root.from, CALLER);
    assert_eq!(root.to, Some(RECIPIENT));
    assert_eq!(root.value, U256::from(100));
    // Frame gas is what is left after the 21000 intrinsic charge, and the
    // frame itself runs no code.
    assert_eq!(root.gas, 979_000);
    assert_eq!(root.gas_used, 0);
    assert_eq!(root.gas_price, Some(1));
    assert!(root.input.is_empty());
    assert!(root.decoded_input.is_none());
    assert!(root.state_pre.is_empty());
    assert!(root.status.is_success());
    assert!(!root.error_origin);
    assert!(root.trace_address.is_empty());
    assert!(root.calls.is_empty());
    assert_eq!(root.frame_count(), 1);
    Ok(())
}

#[test]
fn test_contract_call_decodes_input_output_and_state() -> Result<()> {
    let input: Bytes = bumpCall {}.abi_encode().into();
    let tx = mined_tx(0x02, Some(COUNTER), input.clone(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(COUNTER, counter_runtime());
    chain.set_storage(COUNTER, U256::ZERO, U256::from(7));

    let mut registry = ContractRegistry::new();
    registry.register(counter_artifact())?;
    let tracer = tracer_with(chain, registry);

    let report = tracer.trace(tx.hash)?;
    let root = &report.root;

    assert_eq!(root.to, Some(COUNTER));
    assert_eq!(root.input, input);
    let decoded = root.decoded_input.as_ref().expect("input should decode");
    assert_eq!(decoded.signature, "bump()");
    assert_eq!(decoded.name, "bump");
    assert!(decoded.inputs.is_empty());

    assert_eq!(root.output.as_ref(), B256::from(U256::from(42)).as_slice());
    let outputs = root.decoded_output.as_ref().expect("output should decode");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].ty, "uint256");
    assert_eq!(outputs[0].value, json!("42"));

    // Slot 0 held 7 at entry; the frame stored 9.
    assert_eq!(root.state_pre, vec![B256::from(U256::from(7))]);
    assert_eq!(root.decoded_state_pre[0].name, "total");
    assert_eq!(root.decoded_state_pre[0].ty, "uint256");
    assert_eq!(root.decoded_state_pre[0].value, json!("7"));
    assert_eq!(root.state_post, vec![B256::from(U256::from(9))]);
    assert_eq!(root.decoded_state_post[0].value, json!("9"));

    assert!(root.status.is_success());
    assert!(root.gas_used > 0);
    assert_eq!(root.error_line, None);
    Ok(())
}

#[test]
fn test_reverted_call_resolves_the_failing_source_line() -> Result<()> {
    let input: Bytes = transferCall {
        to: RECIPIENT,
        amount: U256::from(1000),
    }
    .abi_encode()
    .into();
    let tx = mined_tx(0x03, Some(VAULT), input, U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(VAULT, vault_runtime());

    let mut registry = ContractRegistry::new();
    registry.register(vault_artifact())?;
    let tracer = tracer_with(chain, registry);

    let report = tracer.trace(tx.hash)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let root = &report.root;
    match &root.status {
        FrameStatus::Revert(reason) => assert_eq!(reason, "0x"),
        other => panic!("expected revert, got {other:?}"),
    }
    assert!(root.error_origin);
    // The REVERT instruction maps to the revert() statement on line 3.
    assert_eq!(root.error_line, Some(3));
    assert_eq!(report.error_trace_address, Some(vec![]));

    let decoded = root.decoded_input.as_ref().expect("input should decode");
    assert_eq!(decoded.signature, "transfer(address,uint256)");
    assert_eq!(decoded.name, "transfer");
    assert_eq!(decoded.inputs[0].name, "to");
    assert_eq!(
        decoded.inputs[0].value,
        json!("0x9999999999999999999999999999999999999999")
    );
    assert_eq!(decoded.inputs[1].name, "amount");
    assert_eq!(decoded.inputs[1].value, json!("1000"));

    assert!(root.output.is_empty());
    assert!(root.decoded_output.is_none());
    Ok(())
}

#[test]
fn test_nested_call_produces_a_child_frame() -> Result<()> {
    let tx = mined_tx(0x04, Some(ROUTER), Bytes::new(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(ROUTER, calling_code(HELPER));
    chain.set_code(HELPER, answer_runtime());

    let tracer = tracer_with(chain, ContractRegistry::new());
    let report = tracer.trace(tx.hash)?;
    let root = &report.root;

    assert!(root.status.is_success());
    assert_eq!(root.frame_count(), 2);
    assert_eq!(root.calls.len(), 1);

    let child = &root.calls[0];
    assert_eq!(child.kind, CallKind::Call);
    assert_eq!(child.from, ROUTER);
    assert_eq!(child.to, Some(HELPER));
    // The call site put 0xffff gas on the stack, well under the 63/64 cap.
    assert_eq!(child.gas, 0xffff);
    assert!(child.gas_used > 0);
    assert_eq!(child.value, U256::ZERO);
    assert_eq!(child.trace_address, vec![0]);
    assert!(child.status.is_success());
    assert_eq!(child.output.as_ref(), B256::from(U256::from(42)).as_slice());
    assert!(child.calls.is_empty());
    Ok(())
}

#[test]
fn test_delegatecall_reports_the_code_address() -> Result<()> {
    let tx = mined_tx(0x05, Some(DELEGATOR), Bytes::new(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(DELEGATOR, delegating_code(HELPER));
    chain.set_code(HELPER, answer_runtime());

    let tracer = tracer_with(chain, ContractRegistry::new());
    let report = tracer.trace(tx.hash)?;

    assert_eq!(report.root.calls.len(), 1);
    let child = &report.root.calls[0];
    assert_eq!(child.kind, CallKind::DelegateCall);
    // The callee shown is where the code lives; msg.sender passes through.
    assert_eq!(child.to, Some(HELPER));
    assert_eq!(child.from, CALLER);
    assert!(child.status.is_success());
    Ok(())
}

#[test]
fn test_create_transaction_traces_the_deployment() -> Result<()> {
    let runtime = answer_runtime();
    let tx = mined_tx(0x06, None, deploy_code(&runtime), U256::ZERO);
    let tracer = tracer_with(chain_for(&tx), ContractRegistry::new());

    let report = tracer.trace(tx.hash)?;
    let root = &report.root;

    assert_eq!(root.kind, CallKind::Create);
    assert!(root.kind.is_create());
    assert_eq!(root.from, CALLER);
    // The created address is derived from the caller and its nonce.
    assert_eq!(root.to, Some(CALLER.create(0)));
    assert_eq!(root.output, runtime);
    assert!(root.status.is_success());
    assert!(root.gas_used > 0);
    assert!(root.calls.is_empty());
    Ok(())
}

#[test]
fn test_unmatched_contract_keeps_raw_bytes() -> Result<()> {
    let input: Bytes = bumpCall {}.abi_encode().into();
    let tx = mined_tx(0x07, Some(HELPER), input.clone(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(HELPER, answer_runtime());

    // The registry knows Counter, whose bytecode differs from what is
    // deployed at HELPER, so nothing matches and nothing decodes.
    let mut registry = ContractRegistry::new();
    registry.register(counter_artifact())?;
    let tracer = tracer_with(chain, registry);

    let report = tracer.trace(tx.hash)?;
    let root = &report.root;

    assert!(root.decoded_input.is_none());
    assert!(root.decoded_output.is_none());
    assert!(root.state_pre.is_empty());
    assert!(root.decoded_state_pre.is_empty());
    assert_eq!(root.input, input);
    assert!(root.status.is_success());
    Ok(())
}

#[test]
fn test_broken_source_map_is_reported_not_fatal() -> Result<()> {
    let tx = mined_tx(0x08, Some(RECIPIENT), Bytes::new(), U256::ZERO);
    let chain = chain_for(&tx);

    let mut registry = ContractRegistry::new();
    registry.register(broken_artifact())?;
    let tracer = tracer_with(chain, registry);

    let report = tracer.trace(tx.hash)?;

    assert!(report.root.status.is_success());
    let skipped = &report.diagnostics.skipped_sources;
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].contract, "Broken");
    assert!(!skipped[0].reason.is_empty());
    Ok(())
}

#[test]
fn test_report_serializes_camel_case() -> Result<()> {
    let tx = mined_tx(0x09, Some(COUNTER), bumpCall {}.abi_encode().into(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(COUNTER, counter_runtime());
    let mut registry = ContractRegistry::new();
    registry.register(counter_artifact())?;
    let tracer = tracer_with(chain, registry);

    let v = serde_json::to_value(tracer.trace(tx.hash)?)?;
    assert!(v["transactionHash"].as_str().unwrap().starts_with("0x"));
    assert_eq!(v["blockNumber"], json!(BLOCK_NUMBER));
    assert_eq!(v["root"]["kind"], json!("CALL"));
    assert_eq!(v["root"]["status"], json!("Success"));
    assert_eq!(v["root"]["traceAddress"], json!([]));
    assert_eq!(v["root"]["errorOrigin"], json!(false));
    assert_eq!(v["root"]["decodedInput"]["signature"], json!("bump()"));
    assert!(v["root"]["gasUsed"].is_u64());
    assert_eq!(v["diagnostics"]["excessReturns"], json!(0));
    // Empty collections and absent options stay out of the document.
    assert!(v["diagnostics"].get("skippedSources").is_none());
    assert!(v.get("errorTraceAddress").is_none());

    let tx = mined_tx(0x0a, Some(VAULT), Bytes::new(), U256::ZERO);
    let chain = chain_for(&tx);
    chain.set_code(VAULT, vault_runtime());
    let mut registry = ContractRegistry::new();
    registry.register(vault_artifact())?;
    let tracer = tracer_with(chain, registry);

    let v = serde_json::to_value(tracer.trace(tx.hash)?)?;
    assert_eq!(v["errorTraceAddress"], json!([]));
    assert_eq!(v["root"]["status"], json!({"Revert": "0x"}));
    assert_eq!(v["root"]["errorLine"], json!(3));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_rejects_unknown_url_scheme() {
    let result = Tracer::connect("ftp://localhost:8545", ContractRegistry::new()).await;
    match result {
        Err(TraceError::Init(InitError::InvalidRpcUrl(url))) => {
            assert!(url.starts_with("ftp://"))
        }
        Err(other) => panic!("expected invalid-url error, got {other:?}"),
        Ok(_) => panic!("connect should not succeed on an ftp url"),
    }
}

#[tokio::test]
async fn test_connect_requires_a_multi_thread_runtime() {
    // The accessor bridges async provider calls with block_in_place,
    // which a current-thread runtime cannot host.
    let result = RpcAccessor::connect("http://localhost:8545").await;
    match result {
        Err(InitError::NoRuntime(_)) => {}
        Err(other) => panic!("expected runtime error, got {other:?}"),
        Ok(_) => panic!("connect should refuse a current-thread runtime"),
    }
}
