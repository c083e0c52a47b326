//! Compiler build artifacts: ABI, source text, source map and AST
//!
//! This module models the truffle-style build record one compiled contract
//! produces and prepares it for tracing:
//! - Deserialization of the artifact JSON (only the fields replay needs)
//! - Work-list flattening of the AST into a `src`-keyed node index
//! - State-variable resolution with sequential storage slots
//! - A registry that matches deployed bytecode back to its artifact
//!
//! Preparation is deliberately tolerant of broken source maps: a contract
//! whose map fails to decode is still registered and traced, it just
//! carries no source-line annotation. Invalid bytecode hex is fatal for
//! registration because the registry cannot key the artifact without it.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::hex;
use alloy::json_abi::JsonAbi;
use alloy::primitives::{keccak256, Address, Bytes, B256, I256, U256};
use serde::Deserialize;

use crate::errors::{ArtifactError, SourceMapError};
use crate::sourcemap::SourceMap;
use crate::types::DecodedArgument;

/// Type classification attached to an AST node
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeDescriptions {
    /// Canonical identifier, e.g. `t_uint256`
    pub type_identifier: String,
    /// Human-readable form, e.g. `uint256`
    pub type_string: String,
}

/// Parameter list of a function-like AST node
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterList {
    pub parameters: Vec<AstNode>,
}

/// One statement inside a function body; only its declarations matter here
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AstStatement {
    pub declarations: Vec<AstNode>,
}

/// Function body wrapper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AstBody {
    pub statements: Vec<AstStatement>,
}

/// One node of the compiler AST, in the shape build artifacts embed
///
/// Unmodeled JSON fields are ignored on deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AstNode {
    pub id: i64,
    pub name: String,
    pub node_type: String,
    /// Character range in the source, as `start:length:file`
    pub src: String,
    /// Non-empty on contract definitions: `contract`, `library`, `interface`
    pub contract_kind: String,
    pub state_variable: bool,
    pub constant: bool,
    /// `mutable`, `immutable` or `constant` on newer compiler output
    pub mutability: String,
    pub visibility: String,
    pub type_descriptions: TypeDescriptions,
    pub nodes: Vec<AstNode>,
    pub parameters: ParameterList,
    pub return_parameters: ParameterList,
    pub body: AstBody,
}

/// Root of the artifact's AST document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractAst {
    pub absolute_path: String,
    pub node_type: String,
    pub src: String,
    pub nodes: Vec<AstNode>,
}

/// One compiled contract's build record
///
/// The truffle-style JSON the compiler pipeline writes; only the fields
/// replay needs are modeled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    #[serde(default)]
    pub bytecode: String,
    /// Runtime bytecode as deployed, `0x`-prefixed hex
    pub deployed_bytecode: String,
    #[serde(default)]
    pub source_map: String,
    /// Compressed source map of the deployed bytecode
    #[serde(default)]
    pub deployed_source_map: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub ast: ContractAst,
}

impl ContractArtifact {
    /// Parse one artifact document
    pub fn from_json(json: &str) -> Result<ContractArtifact, ArtifactError> {
        serde_json::from_str(json).map_err(|e| ArtifactError::InvalidDocument(e.to_string()))
    }
}

/// One contract-level variable resolved to its storage slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    /// Declared type, e.g. `uint256`
    pub ty: String,
    /// Identifier form of the type, e.g. `t_uint256`
    pub type_identifier: String,
    pub slot: U256,
}

impl StateVariable {
    /// Render one raw storage word as this variable's decoded argument
    pub fn decode_word(&self, word: B256) -> DecodedArgument {
        DecodedArgument {
            name: self.name.clone(),
            ty: self.ty.clone(),
            value: decode_storage_word(word, &self.type_identifier),
        }
    }
}

/// Flattened view of one artifact's AST
///
/// Nodes are keyed by their `src` range, the same `start:length:file`
/// string instruction source entries expose, so a mapped instruction joins
/// directly to the declaration it executes. State variables of the named
/// contract are collected in declaration order.
#[derive(Debug, Clone, Default)]
pub struct AstIndex {
    by_src: HashMap<String, AstNode>,
    state_variables: Vec<StateVariable>,
}

impl AstIndex {
    /// Flatten `ast` with an explicit work list
    ///
    /// The walk enters the contract named `contract_name` and every
    /// non-contract node, but not other contract definitions in the same
    /// unit. Within a node it visits child nodes, parameter lists and the
    /// declarations of body statements.
    ///
    /// Storage slots are assigned sequentially: every non-constant,
    /// non-immutable state variable consumes one slot; only elementary
    /// value types are recorded for dumping.
    pub fn build(ast: &ContractAst, contract_name: &str) -> AstIndex {
        let mut index = AstIndex::default();
        let mut next_slot = U256::ZERO;

        let mut work: Vec<&AstNode> = Vec::new();
        for node in ast.nodes.iter().rev() {
            work.push(node);
        }

        while let Some(node) = work.pop() {
            if !node.src.is_empty() {
                index.by_src.insert(node.src.clone(), shallow(node));
            }

            if node.state_variable && !is_compile_time_value(node) {
                if is_elementary_value_type(&node.type_descriptions.type_identifier) {
                    index.state_variables.push(StateVariable {
                        name: node.name.clone(),
                        ty: node.type_descriptions.type_string.clone(),
                        type_identifier: node.type_descriptions.type_identifier.clone(),
                        slot: next_slot,
                    });
                }
                next_slot += U256::from(1);
            }

            // Foreign contract definitions are indexed but not entered, so
            // their members cannot shift this contract's slot numbering.
            if !node.contract_kind.is_empty()
                && !(node.contract_kind == "contract" && node.name == contract_name)
            {
                continue;
            }

            let children = node
                .nodes
                .iter()
                .chain(node.parameters.parameters.iter())
                .chain(node.return_parameters.parameters.iter())
                .chain(node.body.statements.iter().flat_map(|s| s.declarations.iter()));
            let mut batch: Vec<&AstNode> = children.collect();
            batch.reverse();
            work.append(&mut batch);
        }

        index
    }

    /// Node at the given `start:length:file` range, if any
    pub fn node_at(&self, src: &str) -> Option<&AstNode> {
        self.by_src.get(src)
    }

    /// State variables of the contract, in declaration order
    pub fn state_variables(&self) -> &[StateVariable] {
        &self.state_variables
    }

    pub fn len(&self) -> usize {
        self.by_src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_src.is_empty()
    }
}

/// Copy of a node without its subtrees, for the flattened index
fn shallow(node: &AstNode) -> AstNode {
    AstNode {
        id: node.id,
        name: node.name.clone(),
        node_type: node.node_type.clone(),
        src: node.src.clone(),
        contract_kind: node.contract_kind.clone(),
        state_variable: node.state_variable,
        constant: node.constant,
        mutability: node.mutability.clone(),
        visibility: node.visibility.clone(),
        type_descriptions: node.type_descriptions.clone(),
        nodes: Vec::new(),
        parameters: ParameterList::default(),
        return_parameters: ParameterList::default(),
        body: AstBody::default(),
    }
}

/// Whether a declaration is inlined by the compiler and occupies no storage
fn is_compile_time_value(node: &AstNode) -> bool {
    node.constant || node.mutability == "constant" || node.mutability == "immutable"
}

/// Whether a type identifier names an elementary value type that fits one
/// storage word: bool, address, sized integers and fixed bytes
fn is_elementary_value_type(type_identifier: &str) -> bool {
    if type_identifier == "t_bool" || type_identifier.starts_with("t_address") {
        return true;
    }
    for prefix in ["t_uint", "t_int", "t_bytes"] {
        if let Some(rest) = type_identifier.strip_prefix(prefix) {
            return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
        }
    }
    false
}

/// Decode one raw storage word according to the declared type
///
/// Unrecognized types fall back to full-word hex.
pub fn decode_storage_word(word: B256, type_identifier: &str) -> serde_json::Value {
    if type_identifier.starts_with("t_uint") {
        serde_json::Value::String(U256::from_be_bytes(word.0).to_string())
    } else if type_identifier.starts_with("t_int") {
        serde_json::Value::String(I256::from_raw(U256::from_be_bytes(word.0)).to_string())
    } else if type_identifier.starts_with("t_address") {
        serde_json::Value::String(Address::from_word(word).to_string())
    } else if type_identifier == "t_bool" {
        serde_json::Value::Bool(!word.is_zero())
    } else if let Some(rest) = type_identifier.strip_prefix("t_bytes") {
        // Fixed-size bytes sit in the high-order end of the word
        let n = rest.parse::<usize>().unwrap_or(32).min(32);
        serde_json::Value::String(format!("0x{}", hex::encode(&word[..n])))
    } else {
        serde_json::Value::String(format!("0x{}", hex::encode(word)))
    }
}

/// One artifact prepared for tracing
///
/// Carries the decoded bytecode for exact matching, the parsed source map
/// when it decoded, and the flattened AST. A failed source-map decode is
/// kept alongside so the orchestrator can report it.
#[derive(Debug, Clone)]
pub struct PreparedContract {
    pub contract_name: String,
    pub abi: JsonAbi,
    /// Deployed runtime bytecode, decoded
    pub code: Bytes,
    /// keccak256 of `code`, the registry key
    pub code_hash: B256,
    pub source: String,
    pub source_map: Option<SourceMap>,
    /// Why `source_map` is absent, when it is
    pub source_map_error: Option<SourceMapError>,
    pub ast: AstIndex,
}

impl PreparedContract {
    /// Decode and index one artifact
    ///
    /// # Arguments
    /// * `artifact` - The parsed build record
    ///
    /// # Returns
    /// The prepared contract, or an error when the deployed bytecode is
    /// not valid hex. A broken source map does not fail preparation.
    pub fn prepare(artifact: ContractArtifact) -> Result<PreparedContract, ArtifactError> {
        let code: Bytes = hex::decode(&artifact.deployed_bytecode)
            .map_err(|e| ArtifactError::InvalidBytecode(e.to_string()))?
            .into();
        let code_hash = keccak256(&code);

        let (source_map, source_map_error) = match SourceMap::decode(
            &artifact.deployed_source_map,
            &artifact.deployed_bytecode,
            &artifact.source,
        ) {
            Ok(map) => (Some(map), None),
            Err(e) => (None, Some(e)),
        };

        let ast = AstIndex::build(&artifact.ast, &artifact.contract_name);

        Ok(PreparedContract {
            contract_name: artifact.contract_name,
            abi: artifact.abi,
            code,
            code_hash,
            source: artifact.source,
            source_map,
            source_map_error,
            ast,
        })
    }

    /// State variables resolved from the AST, in declaration order
    pub fn state_variables(&self) -> &[StateVariable] {
        self.ast.state_variables()
    }
}

/// Registry of prepared contracts keyed by deployed-code hash
///
/// Lookup hashes the runtime code and then confirms the exact bytes, so a
/// stale artifact whose code drifted from the chain never matches.
/// Contracts are handed out as [`Arc`] clones; the tracer caches them per
/// executing address.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    by_code_hash: HashMap<B256, Vec<Arc<PreparedContract>>>,
    len: usize,
}

impl ContractRegistry {
    pub fn new() -> Self {
        ContractRegistry::default()
    }

    /// Prepare and register one artifact
    pub fn register(&mut self, artifact: ContractArtifact) -> Result<(), ArtifactError> {
        let prepared = Arc::new(PreparedContract::prepare(artifact)?);
        self.by_code_hash
            .entry(prepared.code_hash)
            .or_default()
            .push(prepared);
        self.len += 1;
        Ok(())
    }

    /// Contract whose deployed bytecode is exactly `code`
    pub fn match_code(&self, code: &[u8]) -> Option<Arc<PreparedContract>> {
        self.by_code_hash
            .get(&keccak256(code))?
            .iter()
            .find(|c| c.code.as_ref() == code)
            .cloned()
    }

    /// All prepared contracts, in no particular order
    pub fn contracts(&self) -> impl Iterator<Item = &Arc<PreparedContract>> {
        self.by_code_hash.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
