//! Replay a reverting contract call offline and print the sealed report.
//!
//! Everything runs against an in-memory chain, so this works without an
//! RPC endpoint: `cargo run --example trace_revert`

use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes, TxHash, U256};
use alloy::{sol, sol_types::SolCall};
use anyhow::Result;
use replay_trace::types::{BlockRecord, TxRecord};
use replay_trace::{ContractArtifact, ContractRegistry, MockChain, Tracer};

sol! {
    function transfer(address to, uint256 amount) external;
}

/// Build record for a contract whose `transfer` always reverts; the
/// third instruction of its runtime maps to the `revert()` statement.
const VAULT_ARTIFACT: &str = r#"{
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
    "ast": {"nodeType": "SourceUnit", "src": "0:94:0", "nodes": []}
}"#;

fn main() -> Result<()> {
    let caller = Address::repeat_byte(0xaa);
    let vault = Address::repeat_byte(0x44);
    let block_hash = B256::repeat_byte(0xbb);

    let tx = TxRecord {
        hash: TxHash::repeat_byte(0x01),
        from: caller,
        to: Some(vault),
        value: U256::ZERO,
        input: transferCall {
            to: Address::repeat_byte(0x99),
            amount: U256::from(1000),
        }
        .abi_encode()
        .into(),
        gas: 1_000_000,
        gas_price: 1,
        nonce: 0,
        block_hash: Some(block_hash),
        block_number: Some(1_234_567),
        transaction_index: Some(0),
    };

    let chain = MockChain::new();
    chain.insert_block(BlockRecord {
        hash: block_hash,
        number: 1_234_567,
        timestamp: 1_700_000_000,
        beneficiary: Address::repeat_byte(0xfe),
        difficulty: U256::ZERO,
        gas_limit: 30_000_000,
        base_fee: Some(7),
    });
    chain.insert_transaction(tx.clone());
    chain.set_balance(caller, U256::from(1_000_000_000_000_000_000u64));
    // PUSH1 0, PUSH1 0, REVERT
    chain.set_code(vault, Bytes::from(hex::decode("60006000fd")?));

    let mut registry = ContractRegistry::new();
    registry.register(ContractArtifact::from_json(VAULT_ARTIFACT)?)?;

    let tracer = Tracer::new(Arc::new(chain), registry);
    let report = tracer.trace(tx.hash)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(decoded) = &report.root.decoded_input {
        println!("\ncall:      {}", decoded.signature);
    }
    println!("status:    {:?}", report.root.status);
    if let Some(line) = report.root.error_line {
        println!("failed at: line {line}");
    }
    Ok(())
}
