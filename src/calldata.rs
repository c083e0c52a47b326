//! ABI-level decoding of call data, return data and revert payloads
//!
//! This module turns raw byte blobs from the interpreter into the decoded
//! annotations that call frames carry:
//! - Call data against a contract interface (selector lookup + decode)
//! - Return data against the resolved method's output types
//! - Revert payloads in the two standard shapes, Error(string) and
//!   Panic(uint256)
//!
//! Decoding is strict in one deliberate way: decoded call arguments are
//! re-encoded and compared byte-for-byte against the original payload, so
//! call data with tampered padding or trailing bytes is reported instead
//! of silently normalized.

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt};
use alloy::hex;
use alloy::json_abi::{Function, JsonAbi, Param};

use crate::errors::CallDataError;
use crate::types::{DecodedArgument, DecodedCallData};

/// Selector of the standard revert shape `Error(string)`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of the compiler panic shape `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Parse a JSON interface description into a [`JsonAbi`]
pub fn parse_abi(abi_json: &str) -> Result<JsonAbi, CallDataError> {
    serde_json::from_str(abi_json).map_err(|e| CallDataError::InvalidAbi(e.to_string()))
}

/// Find the method in `abi` whose selector opens `calldata`
///
/// Returns `None` when the payload is shorter than a selector or no
/// method matches.
pub fn function_for_selector<'a>(abi: &'a JsonAbi, calldata: &[u8]) -> Option<&'a Function> {
    if calldata.len() < 4 {
        return None;
    }
    abi.functions().find(|f| f.selector().as_slice() == &calldata[..4])
}

/// Decode a call payload against a contract interface
///
/// Validates the payload shape, resolves the method by selector, decodes
/// the arguments, then re-encodes them and compares against the original
/// bytes. A byte difference means the payload does not canonically encode
/// the decoded values and is rejected as [`CallDataError::Mismatch`].
///
/// # Arguments
/// * `calldata` - Full call payload including the 4-byte selector
/// * `abi` - Interface description of the callee
///
/// # Returns
/// The resolved method signature and its decoded arguments
pub fn parse_call_data(calldata: &[u8], abi: &JsonAbi) -> Result<DecodedCallData, CallDataError> {
    if calldata.len() < 4 {
        return Err(CallDataError::TooShort(calldata.len()));
    }
    let argdata = &calldata[4..];
    if argdata.len() % 32 != 0 {
        return Err(CallDataError::Misaligned(argdata.len()));
    }

    let function = function_for_selector(abi, calldata)
        .ok_or_else(|| CallDataError::UnknownSelector(hex::encode(&calldata[..4])))?;

    let values = function
        .abi_decode_input(argdata)
        .map_err(|e| CallDataError::Decode(e.to_string()))?;

    // Values that decode fine can still come from non-canonical bytes
    // (tampered padding, trailing words). Re-encode and compare.
    let reencoded = function
        .abi_encode_input(&values)
        .map_err(|e| CallDataError::Decode(e.to_string()))?;
    if reencoded != calldata {
        return Err(CallDataError::Mismatch);
    }

    Ok(DecodedCallData {
        signature: function.signature(),
        name: function.name.clone(),
        inputs: decoded_arguments(&function.inputs, &values),
    })
}

/// Decode return data against the resolved method's output types
pub fn decode_output(
    function: &Function,
    data: &[u8],
) -> Result<Vec<DecodedArgument>, CallDataError> {
    if function.outputs.is_empty() && data.is_empty() {
        return Ok(Vec::new());
    }
    let values = function
        .abi_decode_output(data)
        .map_err(|e| CallDataError::Decode(e.to_string()))?;
    Ok(decoded_arguments(&function.outputs, &values))
}

/// Decode a revert payload into a readable reason
///
/// Handles the two shapes the compiler emits:
/// 1. `Error(string)` - revert with message (selector 0x08c379a0)
/// 2. `Panic(uint256)` - compiler-inserted check (selector 0x4e487b71)
///
/// Returns `None` for custom errors and unrecognized payloads; callers
/// fall back to the raw bytes.
pub fn decode_revert_reason(output: &[u8]) -> Option<String> {
    if output.len() < 4 {
        return None;
    }
    let payload = &output[4..];
    if output[..4] == ERROR_STRING_SELECTOR {
        if let Ok(DynSolValue::String(reason)) = DynSolType::String.abi_decode(payload) {
            return Some(reason);
        }
        None
    } else if output[..4] == PANIC_SELECTOR {
        let Ok(DynSolValue::Uint(code, _)) = DynSolType::Uint(256).abi_decode(payload) else {
            return None;
        };
        Some(match code.to::<u64>() {
            0x00 => "Panic(0x00): generic panic".to_string(),
            0x01 => "Panic(0x01): assertion failed".to_string(),
            0x11 => "Panic(0x11): arithmetic overflow or underflow".to_string(),
            0x12 => "Panic(0x12): division or modulo by zero".to_string(),
            0x21 => "Panic(0x21): enum conversion out of range".to_string(),
            0x22 => "Panic(0x22): incorrectly encoded storage byte array".to_string(),
            0x31 => "Panic(0x31): pop on empty array".to_string(),
            0x32 => "Panic(0x32): array index out of bounds".to_string(),
            0x41 => "Panic(0x41): memory allocation overflow".to_string(),
            0x51 => "Panic(0x51): call to zero-initialized function pointer".to_string(),
            code => format!("Panic(0x{:x}): unknown panic code", code),
        })
    } else {
        None
    }
}

/// Pair decoded values with their declared names and types
fn decoded_arguments(params: &[Param], values: &[DynSolValue]) -> Vec<DecodedArgument> {
    params
        .iter()
        .zip(values)
        .map(|(param, value)| DecodedArgument {
            name: param.name.clone(),
            ty: param.selector_type().into_owned(),
            value: sol_value_to_json(value),
        })
        .collect()
}

/// Render a decoded value to a JSON-friendly form
///
/// Numbers become decimal strings so 256-bit values survive JSON, byte
/// blobs become 0x-prefixed hex, composites become arrays.
pub fn sol_value_to_json(value: &DynSolValue) -> serde_json::Value {
    match value {
        DynSolValue::Bool(b) => serde_json::Value::Bool(*b),
        DynSolValue::Int(i, _) => serde_json::Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => serde_json::Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            serde_json::Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(addr) => serde_json::Value::String(addr.to_string()),
        DynSolValue::Bytes(bytes) => {
            serde_json::Value::String(format!("0x{}", hex::encode(bytes)))
        }
        DynSolValue::String(s) => serde_json::Value::String(s.clone()),
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => {
            serde_json::Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        other => serde_json::Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_ABI: &str = r#"[
        {
            "type": "function",
            "name": "transfer",
            "inputs": [
                {"name": "to", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ],
            "outputs": [{"name": "", "type": "bool"}],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "balanceOf",
            "inputs": [{"name": "owner", "type": "address"}],
            "outputs": [{"name": "", "type": "uint256"}],
            "stateMutability": "view"
        }
    ]"#;

    // transfer(0x1111..11, 1000)
    const TRANSFER_CALL: &str = "a9059cbb\
         0000000000000000000000001111111111111111111111111111111111111111\
         00000000000000000000000000000000000000000000000000000000000003e8";

    fn abi() -> JsonAbi {
        parse_abi(TRANSFER_ABI).unwrap()
    }

    #[test]
    fn test_parse_transfer_call() {
        let calldata = hex::decode(TRANSFER_CALL).unwrap();
        let decoded = parse_call_data(&calldata, &abi()).unwrap();

        assert_eq!(decoded.signature, "transfer(address,uint256)");
        assert_eq!(decoded.name, "transfer");
        assert_eq!(decoded.inputs.len(), 2);
        assert_eq!(decoded.inputs[0].name, "to");
        assert_eq!(decoded.inputs[0].ty, "address");
        assert_eq!(
            decoded.inputs[0].value,
            serde_json::Value::String("0x1111111111111111111111111111111111111111".to_string())
        );
        assert_eq!(decoded.inputs[1].ty, "uint256");
        assert_eq!(
            decoded.inputs[1].value,
            serde_json::Value::String("1000".to_string())
        );
    }

    #[test]
    fn test_rejects_short_calldata() {
        let result = parse_call_data(&[0xa9, 0x05], &abi());
        assert!(matches!(result, Err(CallDataError::TooShort(2))));
    }

    #[test]
    fn test_rejects_misaligned_arguments() {
        // Selector plus 31 bytes of arguments
        let mut calldata = vec![0xa9, 0x05, 0x9c, 0xbb];
        calldata.extend_from_slice(&[0u8; 31]);
        let result = parse_call_data(&calldata, &abi());
        assert!(matches!(result, Err(CallDataError::Misaligned(31))));
    }

    #[test]
    fn test_rejects_unknown_selector() {
        let mut calldata = vec![0xde, 0xad, 0xbe, 0xef];
        calldata.extend_from_slice(&[0u8; 32]);
        match parse_call_data(&calldata, &abi()) {
            Err(CallDataError::UnknownSelector(sel)) => assert_eq!(sel, "deadbeef"),
            other => panic!("expected UnknownSelector, got {:?}", other),
        }
    }

    #[test]
    fn test_detects_trailing_stuffed_word() {
        let mut calldata = hex::decode(TRANSFER_CALL).unwrap();
        calldata.extend_from_slice(&[0u8; 32]);
        let result = parse_call_data(&calldata, &abi());
        assert!(matches!(result, Err(CallDataError::Mismatch)));
    }

    #[test]
    fn test_detects_tampered_padding() {
        let mut calldata = hex::decode(TRANSFER_CALL).unwrap();
        // Flip a byte inside the address argument's zero padding
        calldata[9] = 0xff;
        let result = parse_call_data(&calldata, &abi());
        assert!(matches!(result, Err(CallDataError::Mismatch)));
    }

    #[test]
    fn test_decode_uint_output() {
        let abi = abi();
        let balance_of = abi.function("balanceOf").unwrap().first().unwrap();
        let data =
            hex::decode("00000000000000000000000000000000000000000000000000000000000004d2")
                .unwrap();
        let outputs = decode_output(balance_of, &data).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].ty, "uint256");
        assert_eq!(
            outputs[0].value,
            serde_json::Value::String("1234".to_string())
        );
    }

    #[test]
    fn test_decode_revert_string() {
        // "Insufficient balance" as Error(string)
        let output = hex::decode(
            "08c379a0\
             0000000000000000000000000000000000000000000000000000000000000020\
             0000000000000000000000000000000000000000000000000000000000000014\
             496e73756666696369656e742062616c616e636500000000000000000000000000",
        )
        .unwrap();
        assert_eq!(
            decode_revert_reason(&output),
            Some("Insufficient balance".to_string())
        );
    }

    #[test]
    fn test_decode_panic_codes() {
        let cases = [
            (0x01u8, "Panic(0x01): assertion failed"),
            (0x11, "Panic(0x11): arithmetic overflow or underflow"),
            (0x12, "Panic(0x12): division or modulo by zero"),
            (0x32, "Panic(0x32): array index out of bounds"),
        ];
        for (code, expected) in cases {
            let mut output = PANIC_SELECTOR.to_vec();
            output.extend_from_slice(&[0u8; 31]);
            output.push(code);
            assert_eq!(decode_revert_reason(&output), Some(expected.to_string()));
        }
    }

    #[test]
    fn test_revert_reason_unrecognized() {
        assert_eq!(decode_revert_reason(&[]), None);
        assert_eq!(decode_revert_reason(&[0x08, 0xc3, 0x79]), None);
        assert_eq!(decode_revert_reason(&[0x00, 0x00, 0x00, 0x00, 0x01]), None);
        // Error(string) selector with truncated payload
        assert_eq!(decode_revert_reason(&ERROR_STRING_SELECTOR), None);
    }

    #[test]
    fn test_sol_value_rendering() {
        let tuple = DynSolValue::Tuple(vec![
            DynSolValue::Bool(true),
            DynSolValue::Uint(alloy::primitives::U256::from(7u64), 256),
            DynSolValue::Bytes(vec![0xab, 0xcd]),
        ]);
        let rendered = sol_value_to_json(&tuple);
        assert_eq!(
            rendered,
            serde_json::json!([true, "7", "0xabcd"])
        );
    }
}
