//! Static EVM instruction table
//!
//! This module provides the instruction-level knowledge the rest of the
//! crate consumes:
//! - Byte <-> mnemonic mapping for every defined opcode
//! - Push/static-jump classification and immediate lengths
//! - A per-position stack-height delta used by static stack analysis
//!
//! All tables are immutable process-wide constants; unknown bytes decode
//! to a sentinel representation instead of failing so analysis over
//! arbitrary bytecode (including trailing data sections) never aborts.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// One EVM instruction byte (0x00-0xff)
///
/// Wraps the raw byte so classification helpers stay attached to the
/// value; construction never fails, undefined bytes simply report no
/// mnemonic and render as `Missing opcode 0x..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpCode(u8);

impl OpCode {
    // 0x00 range - arithmetic
    pub const STOP: OpCode = OpCode(0x00);
    pub const ADD: OpCode = OpCode(0x01);
    pub const MUL: OpCode = OpCode(0x02);
    pub const SUB: OpCode = OpCode(0x03);
    pub const DIV: OpCode = OpCode(0x04);
    pub const SDIV: OpCode = OpCode(0x05);
    pub const MOD: OpCode = OpCode(0x06);
    pub const SMOD: OpCode = OpCode(0x07);
    pub const ADDMOD: OpCode = OpCode(0x08);
    pub const MULMOD: OpCode = OpCode(0x09);
    pub const EXP: OpCode = OpCode(0x0a);
    pub const SIGNEXTEND: OpCode = OpCode(0x0b);

    // 0x10 range - comparison and bitwise logic
    pub const LT: OpCode = OpCode(0x10);
    pub const GT: OpCode = OpCode(0x11);
    pub const SLT: OpCode = OpCode(0x12);
    pub const SGT: OpCode = OpCode(0x13);
    pub const EQ: OpCode = OpCode(0x14);
    pub const ISZERO: OpCode = OpCode(0x15);
    pub const AND: OpCode = OpCode(0x16);
    pub const OR: OpCode = OpCode(0x17);
    pub const XOR: OpCode = OpCode(0x18);
    pub const NOT: OpCode = OpCode(0x19);
    pub const BYTE: OpCode = OpCode(0x1a);
    pub const SHL: OpCode = OpCode(0x1b);
    pub const SHR: OpCode = OpCode(0x1c);
    pub const SAR: OpCode = OpCode(0x1d);

    // 0x20 range - crypto
    pub const KECCAK256: OpCode = OpCode(0x20);

    // 0x30 range - closure state
    pub const ADDRESS: OpCode = OpCode(0x30);
    pub const BALANCE: OpCode = OpCode(0x31);
    pub const ORIGIN: OpCode = OpCode(0x32);
    pub const CALLER: OpCode = OpCode(0x33);
    pub const CALLVALUE: OpCode = OpCode(0x34);
    pub const CALLDATALOAD: OpCode = OpCode(0x35);
    pub const CALLDATASIZE: OpCode = OpCode(0x36);
    pub const CALLDATACOPY: OpCode = OpCode(0x37);
    pub const CODESIZE: OpCode = OpCode(0x38);
    pub const CODECOPY: OpCode = OpCode(0x39);
    pub const GASPRICE: OpCode = OpCode(0x3a);
    pub const EXTCODESIZE: OpCode = OpCode(0x3b);
    pub const EXTCODECOPY: OpCode = OpCode(0x3c);
    pub const RETURNDATASIZE: OpCode = OpCode(0x3d);
    pub const RETURNDATACOPY: OpCode = OpCode(0x3e);
    pub const EXTCODEHASH: OpCode = OpCode(0x3f);

    // 0x40 range - block operations
    pub const BLOCKHASH: OpCode = OpCode(0x40);
    pub const COINBASE: OpCode = OpCode(0x41);
    pub const TIMESTAMP: OpCode = OpCode(0x42);
    pub const NUMBER: OpCode = OpCode(0x43);
    pub const PREVRANDAO: OpCode = OpCode(0x44);
    pub const GASLIMIT: OpCode = OpCode(0x45);
    pub const CHAINID: OpCode = OpCode(0x46);
    pub const SELFBALANCE: OpCode = OpCode(0x47);
    pub const BASEFEE: OpCode = OpCode(0x48);
    pub const BLOBHASH: OpCode = OpCode(0x49);
    pub const BLOBBASEFEE: OpCode = OpCode(0x4a);

    // 0x50 range - storage and execution
    pub const POP: OpCode = OpCode(0x50);
    pub const MLOAD: OpCode = OpCode(0x51);
    pub const MSTORE: OpCode = OpCode(0x52);
    pub const MSTORE8: OpCode = OpCode(0x53);
    pub const SLOAD: OpCode = OpCode(0x54);
    pub const SSTORE: OpCode = OpCode(0x55);
    pub const JUMP: OpCode = OpCode(0x56);
    pub const JUMPI: OpCode = OpCode(0x57);
    pub const PC: OpCode = OpCode(0x58);
    pub const MSIZE: OpCode = OpCode(0x59);
    pub const GAS: OpCode = OpCode(0x5a);
    pub const JUMPDEST: OpCode = OpCode(0x5b);
    pub const TLOAD: OpCode = OpCode(0x5c);
    pub const TSTORE: OpCode = OpCode(0x5d);
    pub const MCOPY: OpCode = OpCode(0x5e);

    // 0x5f-0x7f range - push operations (PUSH0 carries no immediate)
    pub const PUSH0: OpCode = OpCode(0x5f);
    pub const PUSH1: OpCode = OpCode(0x60);
    pub const PUSH2: OpCode = OpCode(0x61);
    pub const PUSH3: OpCode = OpCode(0x62);
    pub const PUSH4: OpCode = OpCode(0x63);
    pub const PUSH5: OpCode = OpCode(0x64);
    pub const PUSH6: OpCode = OpCode(0x65);
    pub const PUSH7: OpCode = OpCode(0x66);
    pub const PUSH8: OpCode = OpCode(0x67);
    pub const PUSH9: OpCode = OpCode(0x68);
    pub const PUSH10: OpCode = OpCode(0x69);
    pub const PUSH11: OpCode = OpCode(0x6a);
    pub const PUSH12: OpCode = OpCode(0x6b);
    pub const PUSH13: OpCode = OpCode(0x6c);
    pub const PUSH14: OpCode = OpCode(0x6d);
    pub const PUSH15: OpCode = OpCode(0x6e);
    pub const PUSH16: OpCode = OpCode(0x6f);
    pub const PUSH17: OpCode = OpCode(0x70);
    pub const PUSH18: OpCode = OpCode(0x71);
    pub const PUSH19: OpCode = OpCode(0x72);
    pub const PUSH20: OpCode = OpCode(0x73);
    pub const PUSH21: OpCode = OpCode(0x74);
    pub const PUSH22: OpCode = OpCode(0x75);
    pub const PUSH23: OpCode = OpCode(0x76);
    pub const PUSH24: OpCode = OpCode(0x77);
    pub const PUSH25: OpCode = OpCode(0x78);
    pub const PUSH26: OpCode = OpCode(0x79);
    pub const PUSH27: OpCode = OpCode(0x7a);
    pub const PUSH28: OpCode = OpCode(0x7b);
    pub const PUSH29: OpCode = OpCode(0x7c);
    pub const PUSH30: OpCode = OpCode(0x7d);
    pub const PUSH31: OpCode = OpCode(0x7e);
    pub const PUSH32: OpCode = OpCode(0x7f);

    // 0x80 range - duplication
    pub const DUP1: OpCode = OpCode(0x80);
    pub const DUP2: OpCode = OpCode(0x81);
    pub const DUP3: OpCode = OpCode(0x82);
    pub const DUP4: OpCode = OpCode(0x83);
    pub const DUP5: OpCode = OpCode(0x84);
    pub const DUP6: OpCode = OpCode(0x85);
    pub const DUP7: OpCode = OpCode(0x86);
    pub const DUP8: OpCode = OpCode(0x87);
    pub const DUP9: OpCode = OpCode(0x88);
    pub const DUP10: OpCode = OpCode(0x89);
    pub const DUP11: OpCode = OpCode(0x8a);
    pub const DUP12: OpCode = OpCode(0x8b);
    pub const DUP13: OpCode = OpCode(0x8c);
    pub const DUP14: OpCode = OpCode(0x8d);
    pub const DUP15: OpCode = OpCode(0x8e);
    pub const DUP16: OpCode = OpCode(0x8f);

    // 0x90 range - exchange
    pub const SWAP1: OpCode = OpCode(0x90);
    pub const SWAP2: OpCode = OpCode(0x91);
    pub const SWAP3: OpCode = OpCode(0x92);
    pub const SWAP4: OpCode = OpCode(0x93);
    pub const SWAP5: OpCode = OpCode(0x94);
    pub const SWAP6: OpCode = OpCode(0x95);
    pub const SWAP7: OpCode = OpCode(0x96);
    pub const SWAP8: OpCode = OpCode(0x97);
    pub const SWAP9: OpCode = OpCode(0x98);
    pub const SWAP10: OpCode = OpCode(0x99);
    pub const SWAP11: OpCode = OpCode(0x9a);
    pub const SWAP12: OpCode = OpCode(0x9b);
    pub const SWAP13: OpCode = OpCode(0x9c);
    pub const SWAP14: OpCode = OpCode(0x9d);
    pub const SWAP15: OpCode = OpCode(0x9e);
    pub const SWAP16: OpCode = OpCode(0x9f);

    // 0xa0 range - logging
    pub const LOG0: OpCode = OpCode(0xa0);
    pub const LOG1: OpCode = OpCode(0xa1);
    pub const LOG2: OpCode = OpCode(0xa2);
    pub const LOG3: OpCode = OpCode(0xa3);
    pub const LOG4: OpCode = OpCode(0xa4);

    // 0xf0 range - closures
    pub const CREATE: OpCode = OpCode(0xf0);
    pub const CALL: OpCode = OpCode(0xf1);
    pub const CALLCODE: OpCode = OpCode(0xf2);
    pub const RETURN: OpCode = OpCode(0xf3);
    pub const DELEGATECALL: OpCode = OpCode(0xf4);
    pub const CREATE2: OpCode = OpCode(0xf5);
    pub const STATICCALL: OpCode = OpCode(0xfa);
    pub const REVERT: OpCode = OpCode(0xfd);
    pub const INVALID: OpCode = OpCode(0xfe);
    pub const SELFDESTRUCT: OpCode = OpCode(0xff);

    /// Wrap a raw instruction byte; never fails
    pub const fn new(byte: u8) -> Self {
        OpCode(byte)
    }

    /// The raw instruction byte
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Mnemonic for a defined opcode, `None` for undefined bytes
    pub fn mnemonic(self) -> Option<&'static str> {
        MNEMONICS[self.0 as usize]
    }

    /// Whether this byte is a defined instruction
    pub const fn is_defined(self) -> bool {
        MNEMONICS[self.0 as usize].is_some()
    }

    /// Whether this is an immediate-carrying push (PUSH1..PUSH32)
    ///
    /// PUSH0 is excluded on purpose: it pushes a constant zero and is not
    /// followed by immediate data, so bytecode walkers must not skip
    /// anything after it.
    pub const fn is_push(self) -> bool {
        self.0 >= Self::PUSH1.0 && self.0 <= Self::PUSH32.0
    }

    /// Number of immediate bytes following this instruction (0 unless
    /// PUSH1..PUSH32)
    pub const fn push_len(self) -> usize {
        if self.is_push() {
            (self.0 - Self::PUSH1.0 + 1) as usize
        } else {
            0
        }
    }

    /// Whether this instruction is an unconditional static jump
    pub const fn is_static_jump(self) -> bool {
        self.0 == Self::JUMP.0
    }

    /// Net stack-height change of this instruction as seen by a probe
    /// tracking one stack slot (positive values shrink the stack)
    ///
    /// `stack_position` is the probe's current depth, top of stack being 0.
    /// It only matters for the SWAP family: swapping the top with the Nth
    /// element moves a probe sitting at the bottom slot of the swap by
    /// `-N`, and leaves every other depth untouched. The table serves
    /// static analysis that walks a recorded stack, so its values describe
    /// how a tracked depth shifts, not live interpreter behavior.
    pub const fn stack_delta(self, stack_position: usize) -> i32 {
        if self.0 >= Self::SWAP1.0 && self.0 <= Self::SWAP16.0 {
            if stack_position == 0 {
                -((self.0 - Self::SWAP1.0 + 1) as i32)
            } else {
                0
            }
        } else {
            STACK_DELTAS[self.0 as usize] as i32
        }
    }

    /// Inverse of [`OpCode::mnemonic`]; `None` for unknown names
    pub fn from_mnemonic(name: &str) -> Option<OpCode> {
        MNEMONIC_TO_OP.get(name).copied()
    }
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> Self {
        OpCode(byte)
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.0
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(name) => f.write_str(name),
            None => write!(f, "Missing opcode 0x{:x}", self.0),
        }
    }
}

/// Byte-indexed mnemonic table; undefined bytes stay `None`
const MNEMONICS: [Option<&str>; 256] = {
    let mut t: [Option<&str>; 256] = [None; 256];
    t[0x00] = Some("STOP");
    t[0x01] = Some("ADD");
    t[0x02] = Some("MUL");
    t[0x03] = Some("SUB");
    t[0x04] = Some("DIV");
    t[0x05] = Some("SDIV");
    t[0x06] = Some("MOD");
    t[0x07] = Some("SMOD");
    t[0x08] = Some("ADDMOD");
    t[0x09] = Some("MULMOD");
    t[0x0a] = Some("EXP");
    t[0x0b] = Some("SIGNEXTEND");
    t[0x10] = Some("LT");
    t[0x11] = Some("GT");
    t[0x12] = Some("SLT");
    t[0x13] = Some("SGT");
    t[0x14] = Some("EQ");
    t[0x15] = Some("ISZERO");
    t[0x16] = Some("AND");
    t[0x17] = Some("OR");
    t[0x18] = Some("XOR");
    t[0x19] = Some("NOT");
    t[0x1a] = Some("BYTE");
    t[0x1b] = Some("SHL");
    t[0x1c] = Some("SHR");
    t[0x1d] = Some("SAR");
    t[0x20] = Some("KECCAK256");
    t[0x30] = Some("ADDRESS");
    t[0x31] = Some("BALANCE");
    t[0x32] = Some("ORIGIN");
    t[0x33] = Some("CALLER");
    t[0x34] = Some("CALLVALUE");
    t[0x35] = Some("CALLDATALOAD");
    t[0x36] = Some("CALLDATASIZE");
    t[0x37] = Some("CALLDATACOPY");
    t[0x38] = Some("CODESIZE");
    t[0x39] = Some("CODECOPY");
    t[0x3a] = Some("GASPRICE");
    t[0x3b] = Some("EXTCODESIZE");
    t[0x3c] = Some("EXTCODECOPY");
    t[0x3d] = Some("RETURNDATASIZE");
    t[0x3e] = Some("RETURNDATACOPY");
    t[0x3f] = Some("EXTCODEHASH");
    t[0x40] = Some("BLOCKHASH");
    t[0x41] = Some("COINBASE");
    t[0x42] = Some("TIMESTAMP");
    t[0x43] = Some("NUMBER");
    t[0x44] = Some("PREVRANDAO");
    t[0x45] = Some("GASLIMIT");
    t[0x46] = Some("CHAINID");
    t[0x47] = Some("SELFBALANCE");
    t[0x48] = Some("BASEFEE");
    t[0x49] = Some("BLOBHASH");
    t[0x4a] = Some("BLOBBASEFEE");
    t[0x50] = Some("POP");
    t[0x51] = Some("MLOAD");
    t[0x52] = Some("MSTORE");
    t[0x53] = Some("MSTORE8");
    t[0x54] = Some("SLOAD");
    t[0x55] = Some("SSTORE");
    t[0x56] = Some("JUMP");
    t[0x57] = Some("JUMPI");
    t[0x58] = Some("PC");
    t[0x59] = Some("MSIZE");
    t[0x5a] = Some("GAS");
    t[0x5b] = Some("JUMPDEST");
    t[0x5c] = Some("TLOAD");
    t[0x5d] = Some("TSTORE");
    t[0x5e] = Some("MCOPY");
    t[0x5f] = Some("PUSH0");
    t[0x60] = Some("PUSH1");
    t[0x61] = Some("PUSH2");
    t[0x62] = Some("PUSH3");
    t[0x63] = Some("PUSH4");
    t[0x64] = Some("PUSH5");
    t[0x65] = Some("PUSH6");
    t[0x66] = Some("PUSH7");
    t[0x67] = Some("PUSH8");
    t[0x68] = Some("PUSH9");
    t[0x69] = Some("PUSH10");
    t[0x6a] = Some("PUSH11");
    t[0x6b] = Some("PUSH12");
    t[0x6c] = Some("PUSH13");
    t[0x6d] = Some("PUSH14");
    t[0x6e] = Some("PUSH15");
    t[0x6f] = Some("PUSH16");
    t[0x70] = Some("PUSH17");
    t[0x71] = Some("PUSH18");
    t[0x72] = Some("PUSH19");
    t[0x73] = Some("PUSH20");
    t[0x74] = Some("PUSH21");
    t[0x75] = Some("PUSH22");
    t[0x76] = Some("PUSH23");
    t[0x77] = Some("PUSH24");
    t[0x78] = Some("PUSH25");
    t[0x79] = Some("PUSH26");
    t[0x7a] = Some("PUSH27");
    t[0x7b] = Some("PUSH28");
    t[0x7c] = Some("PUSH29");
    t[0x7d] = Some("PUSH30");
    t[0x7e] = Some("PUSH31");
    t[0x7f] = Some("PUSH32");
    t[0x80] = Some("DUP1");
    t[0x81] = Some("DUP2");
    t[0x82] = Some("DUP3");
    t[0x83] = Some("DUP4");
    t[0x84] = Some("DUP5");
    t[0x85] = Some("DUP6");
    t[0x86] = Some("DUP7");
    t[0x87] = Some("DUP8");
    t[0x88] = Some("DUP9");
    t[0x89] = Some("DUP10");
    t[0x8a] = Some("DUP11");
    t[0x8b] = Some("DUP12");
    t[0x8c] = Some("DUP13");
    t[0x8d] = Some("DUP14");
    t[0x8e] = Some("DUP15");
    t[0x8f] = Some("DUP16");
    t[0x90] = Some("SWAP1");
    t[0x91] = Some("SWAP2");
    t[0x92] = Some("SWAP3");
    t[0x93] = Some("SWAP4");
    t[0x94] = Some("SWAP5");
    t[0x95] = Some("SWAP6");
    t[0x96] = Some("SWAP7");
    t[0x97] = Some("SWAP8");
    t[0x98] = Some("SWAP9");
    t[0x99] = Some("SWAP10");
    t[0x9a] = Some("SWAP11");
    t[0x9b] = Some("SWAP12");
    t[0x9c] = Some("SWAP13");
    t[0x9d] = Some("SWAP14");
    t[0x9e] = Some("SWAP15");
    t[0x9f] = Some("SWAP16");
    t[0xa0] = Some("LOG0");
    t[0xa1] = Some("LOG1");
    t[0xa2] = Some("LOG2");
    t[0xa3] = Some("LOG3");
    t[0xa4] = Some("LOG4");
    t[0xf0] = Some("CREATE");
    t[0xf1] = Some("CALL");
    t[0xf2] = Some("CALLCODE");
    t[0xf3] = Some("RETURN");
    t[0xf4] = Some("DELEGATECALL");
    t[0xf5] = Some("CREATE2");
    t[0xfa] = Some("STATICCALL");
    t[0xfd] = Some("REVERT");
    t[0xfe] = Some("INVALID");
    t[0xff] = Some("SELFDESTRUCT");
    t
};

/// Position-independent stack deltas (slots consumed minus slots pushed,
/// probe convention); the SWAP family is handled in [`OpCode::stack_delta`]
/// because its delta depends on the probed position. Undefined bytes stay 0.
const STACK_DELTAS: [i8; 256] = {
    let mut t: [i8; 256] = [0; 256];
    t[0x01] = 1; // ADD
    t[0x02] = 1; // MUL
    t[0x03] = 1; // SUB
    t[0x04] = 1; // DIV
    t[0x05] = 1; // SDIV
    t[0x06] = 1; // MOD
    t[0x07] = 1; // SMOD
    t[0x08] = 2; // ADDMOD
    t[0x09] = 2; // MULMOD
    t[0x0a] = 1; // EXP
    t[0x0b] = 1; // SIGNEXTEND
    t[0x10] = 1; // LT
    t[0x11] = 1; // GT
    t[0x12] = 1; // SLT
    t[0x13] = 1; // SGT
    t[0x14] = 1; // EQ
    t[0x16] = 1; // AND
    t[0x17] = 1; // OR
    t[0x18] = 1; // XOR
    t[0x1a] = 1; // BYTE
    t[0x1b] = 1; // SHL
    t[0x1c] = 1; // SHR
    t[0x1d] = 1; // SAR
    t[0x20] = 1; // KECCAK256
    t[0x30] = -1; // ADDRESS
    t[0x32] = -1; // ORIGIN
    t[0x33] = -1; // CALLER
    t[0x34] = -1; // CALLVALUE
    t[0x36] = -1; // CALLDATASIZE
    t[0x37] = 3; // CALLDATACOPY
    t[0x38] = -1; // CODESIZE
    t[0x39] = 3; // CODECOPY
    t[0x3a] = -1; // GASPRICE
    t[0x3c] = 4; // EXTCODECOPY
    t[0x3d] = -1; // RETURNDATASIZE
    t[0x3e] = 3; // RETURNDATACOPY
    t[0x41] = -1; // COINBASE
    t[0x42] = -1; // TIMESTAMP
    t[0x43] = -1; // NUMBER
    t[0x44] = -1; // PREVRANDAO
    t[0x45] = -1; // GASLIMIT
    t[0x46] = -1; // CHAINID
    t[0x47] = -1; // SELFBALANCE
    t[0x48] = -1; // BASEFEE
    t[0x4a] = -1; // BLOBBASEFEE
    t[0x50] = 1; // POP
    t[0x52] = 2; // MSTORE
    t[0x53] = 2; // MSTORE8
    t[0x55] = 2; // SSTORE
    t[0x56] = 1; // JUMP
    t[0x57] = 2; // JUMPI
    t[0x58] = -1; // PC
    t[0x59] = -1; // MSIZE
    t[0x5a] = -1; // GAS
    t[0x5d] = 2; // TSTORE
    t[0x5e] = 3; // MCOPY
    // PUSH0..PUSH32 each leave one extra slot behind
    let mut i = 0x5f;
    while i <= 0x7f {
        t[i] = -1;
        i += 1;
    }
    // DUP1..DUP16 likewise
    let mut i = 0x80;
    while i <= 0x8f {
        t[i] = -1;
        i += 1;
    }
    t[0xa0] = 2; // LOG0
    t[0xa1] = 3; // LOG1
    t[0xa2] = 4; // LOG2
    t[0xa3] = 5; // LOG3
    t[0xa4] = 6; // LOG4
    t[0xf0] = 2; // CREATE
    t[0xf1] = 6; // CALL
    t[0xf2] = 6; // CALLCODE
    t[0xf3] = 2; // RETURN
    t[0xf4] = 5; // DELEGATECALL
    t[0xf5] = 3; // CREATE2
    t[0xfa] = 5; // STATICCALL
    t[0xfd] = 2; // REVERT
    t[0xff] = 1; // SELFDESTRUCT
    t
};

/// Mnemonic -> byte map derived from [`MNEMONICS`]
static MNEMONIC_TO_OP: Lazy<HashMap<&'static str, OpCode>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (byte, name) in MNEMONICS.iter().enumerate() {
        if let Some(name) = name {
            map.insert(*name, OpCode(byte as u8));
        }
    }
    map
});
