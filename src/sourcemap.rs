//! Compiler source map decoding
//!
//! Turns the compressed instruction source map emitted by the Solidity
//! compiler plus the deployed bytecode into a byte-offset indexed table:
//! - Stage 1 parses the `;`/`:` compressed encoding with per-field
//!   inheritance into one entry per instruction ordinal
//! - Stage 2 walks the bytecode, skipping push immediates, and re-keys
//!   the entries by bytecode byte offset (program counter)
//! - Stage 3 resolves every entry's start offset to a (line, column)
//!   pair against the original source text in one linear scan
//!
//! The resulting [`SourceMap`] answers "which source position does this
//! program counter come from", which is what revert annotation needs.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::errors::SourceMapError;
use crate::opcode::OpCode;

/// Jump classification of one instruction in the compressed map
///
/// `i` enters a function, `o` returns out of one, everything else is a
/// regular jump. Unrecognized markers are treated as regular rather than
/// rejected, matching compiler tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Jump {
    #[serde(rename = "i")]
    In,
    #[serde(rename = "o")]
    Out,
    #[default]
    #[serde(rename = "-")]
    Regular,
}

impl Jump {
    fn parse(marker: &str) -> Jump {
        match marker {
            "i" => Jump::In,
            "o" => Jump::Out,
            _ => Jump::Regular,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Jump::In => "i",
            Jump::Out => "o",
            Jump::Regular => "-",
        }
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source position of one instruction
///
/// `start`/`length`/`file_index` come straight from the compressed map
/// (negative values mean compiler-generated code with no source range);
/// `line`/`column` are resolved against the source text in stage 3 and
/// are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionMapping {
    /// Instruction ordinal the entry was decoded at
    pub index: usize,
    pub start: i64,
    pub length: i64,
    pub file_index: i64,
    pub jump: Jump,
    pub line: u32,
    pub column: u32,
}

impl InstructionMapping {
    /// The `start:length:fileIndex` key syntax-tree nodes are indexed by
    pub fn src(&self) -> String {
        format!("{}:{}:{}", self.start, self.length, self.file_index)
    }
}

/// Byte-offset indexed source map for one deployed contract
///
/// Push immediates repeat their owning instruction's entry, so any
/// program counter inside the mapped region resolves. Bytes past the last
/// mapped instruction (the trailing data section) have no entry.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    by_offset: BTreeMap<usize, InstructionMapping>,
}

impl SourceMap {
    /// Decode a compressed source map against its deployed bytecode and
    /// original source text
    ///
    /// # Arguments
    /// * `compressed` - The compiler's `deployedSourceMap` string
    /// * `deployed_bytecode` - Runtime bytecode as hex (optionally `0x`-prefixed)
    /// * `source` - The contract's original source text
    ///
    /// # Errors
    /// Fails on a non-integer map field, on a field omitted with no
    /// previous segment to inherit from, on a map with more segments than
    /// the bytecode decodes to instructions, or on invalid bytecode hex.
    pub fn decode(
        compressed: &str,
        deployed_bytecode: &str,
        source: &str,
    ) -> Result<SourceMap, SourceMapError> {
        let dense = parse_compressed(compressed)?;
        let mut by_offset = expand_to_offsets(&dense, deployed_bytecode)?;
        resolve_positions(&mut by_offset, source);
        Ok(SourceMap { by_offset })
    }

    /// Entry for the instruction covering `byte_offset`, if mapped
    pub fn get(&self, byte_offset: usize) -> Option<&InstructionMapping> {
        self.by_offset.get(&byte_offset)
    }

    /// Number of mapped byte offsets
    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Iterate entries in ascending byte-offset order
    pub fn iter(&self) -> impl Iterator<Item = (&usize, &InstructionMapping)> {
        self.by_offset.iter()
    }
}

/// Stage 1: compressed string to one entry per instruction ordinal
///
/// Each `;`-separated segment holds up to four `:`-separated fields
/// `start:length:fileIndex:jump`; an omitted field (or a fully empty
/// segment) inherits the previous ordinal's value for that field.
fn parse_compressed(compressed: &str) -> Result<Vec<InstructionMapping>, SourceMapError> {
    let mut entries: Vec<InstructionMapping> = Vec::new();

    for (index, segment) in compressed.split(';').enumerate() {
        if segment.is_empty() {
            let prev = entries
                .last()
                .ok_or(SourceMapError::MissingField { segment: index })?;
            let mut entry = prev.clone();
            entry.index = index;
            entries.push(entry);
            continue;
        }

        let fields: Vec<&str> = segment.split(':').collect();
        let start = inherit_int(&fields, 0, index, entries.last().map(|e| e.start))?;
        let length = inherit_int(&fields, 1, index, entries.last().map(|e| e.length))?;
        let file_index = inherit_int(&fields, 2, index, entries.last().map(|e| e.file_index))?;
        let jump = match fields.get(3) {
            Some(marker) if !marker.is_empty() => Jump::parse(marker),
            _ => entries.last().map(|e| e.jump).unwrap_or_default(),
        };

        entries.push(InstructionMapping {
            index,
            start,
            length,
            file_index,
            jump,
            line: 0,
            column: 0,
        });
    }

    Ok(entries)
}

/// Parse field `at` of a segment, inheriting `prev` when the field is
/// omitted or empty
fn inherit_int(
    fields: &[&str],
    at: usize,
    segment: usize,
    prev: Option<i64>,
) -> Result<i64, SourceMapError> {
    match fields.get(at) {
        Some(raw) if !raw.is_empty() => {
            raw.parse::<i64>()
                .map_err(|_| SourceMapError::InvalidInteger {
                    segment,
                    value: (*raw).to_string(),
                })
        }
        _ => prev.ok_or(SourceMapError::MissingField { segment }),
    }
}

/// Stage 2: instruction ordinals to bytecode byte offsets
///
/// Walks the bytecode one instruction at a time; push immediates do not
/// advance the ordinal and repeat the owning instruction's entry, so every
/// executable byte offset resolves. Ordinals past the last compressed
/// segment (the trailing data section) are left unmapped.
fn expand_to_offsets(
    dense: &[InstructionMapping],
    deployed_bytecode: &str,
) -> Result<BTreeMap<usize, InstructionMapping>, SourceMapError> {
    let code = alloy::hex::decode(deployed_bytecode)
        .map_err(|e| SourceMapError::InvalidBytecode(e.to_string()))?;

    let mut by_offset = BTreeMap::new();
    let mut ordinal = 0usize;
    let mut offset = 0usize;

    while offset < code.len() {
        let op = OpCode::new(code[offset]);
        let covered = 1 + op.push_len();

        if let Some(entry) = dense.get(ordinal) {
            for pc in offset..(offset + covered).min(code.len()) {
                by_offset.insert(pc, entry.clone());
            }
        }

        ordinal += 1;
        offset += covered;
    }

    // A trailing data section leaves later ordinals unmapped, which is
    // normal; the reverse direction means the map describes instructions
    // the bytecode does not have.
    if dense.len() > ordinal {
        return Err(SourceMapError::ExcessSegments {
            segments: dense.len(),
            instructions: ordinal,
        });
    }

    Ok(by_offset)
}

/// Stage 3: resolve each entry's start offset to (line, column)
///
/// One forward scan over the source text, visiting entries in ascending
/// start order. Lines are 1-based; a newline resets the column so the
/// first byte of the next line is column 1. Starts outside the source
/// text (negative, or past the end) resolve to the position the scan
/// reached, matching a scan clamped at the text boundary.
fn resolve_positions(by_offset: &mut BTreeMap<usize, InstructionMapping>, source: &str) {
    let text = source.as_bytes();
    let mut entries: Vec<&mut InstructionMapping> = by_offset.values_mut().collect();
    entries.sort_by_key(|e| e.start);

    let mut pos = 0usize;
    let mut line = 1u32;
    let mut column = 1u32;

    for entry in entries {
        let target = if entry.start < 0 { 0 } else { entry.start as usize };
        while pos < target && pos < text.len() {
            if text[pos] == b'\n' {
                line += 1;
                column = 0;
            }
            column += 1;
            pos += 1;
        }
        entry.line = line;
        entry.column = column;
    }
}
