//! Tuple types for decoded instructions, operands and per-instruction facts.

use std::fmt;

use crate::Address;

/// Immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImmOp(pub i64);

/// Register operand, by canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegOp(pub String);

/// Register list operand (e.g. ARM `{r4, r5, lr}`), in encoding order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegBitFieldOp(pub Vec<String>);

/// Floating-point immediate, compared by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FpImmOp(u64);

impl FpImmOp {
    pub fn new(value: f64) -> Self {
        Self(value.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Memory operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndirectOp {
    pub segment: String,
    pub base: String,
    pub index: String,
    pub scale: i64,
    pub disp: i64,
    /// Access size in bits, 0 if unknown
    pub size: u64,
}

/// Architecture-specific operand with no common shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecialOp {
    pub kind: String,
    pub value: String,
}

/// Any decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Imm(ImmOp),
    Reg(RegOp),
    RegBitField(RegBitFieldOp),
    FpImm(FpImmOp),
    Indirect(IndirectOp),
    Special(SpecialOp),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Imm(_) => OperandKind::Imm,
            Operand::Reg(_) => OperandKind::Reg,
            Operand::RegBitField(_) => OperandKind::RegBitField,
            Operand::FpImm(_) => OperandKind::FpImm,
            Operand::Indirect(_) => OperandKind::Indirect,
            Operand::Special(_) => OperandKind::Special,
        }
    }
}

/// Operand variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Imm,
    Reg,
    RegBitField,
    FpImm,
    Indirect,
    Special,
}

/// Interned reference to an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandRef {
    pub kind: OperandKind,
    pub id: u64,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the instruction
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u64,
    /// Upper-case mnemonic (e.g. "MOV")
    pub mnemonic: String,
    /// Operands, in decoder order
    pub operands: Vec<OperandRef>,
}

/// How an instruction touches an operand or register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    None,
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn reads(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::None => write!(f, "-"),
            AccessMode::Read => write!(f, "R"),
            AccessMode::Write => write!(f, "W"),
            AccessMode::ReadWrite => write!(f, "RW"),
        }
    }
}

/// Operand with an immediate shift, e.g. `x2, lsl #3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftedOp {
    pub addr: Address,
    pub index: u8,
    pub shift: u8,
    pub kind: String,
}

/// Operand shifted by a register, e.g. `r1, lsl r2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftedWithRegOp {
    pub addr: Address,
    pub index: u8,
    pub kind: String,
    pub reg: String,
}

/// Memory operand whose base register is updated by the instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionWriteback {
    pub addr: Address,
    pub index: u8,
}

/// Condition code of a conditionally executed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionCondCode {
    pub addr: Address,
    pub code: String,
}

/// Access mode of an explicit operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionOpAccess {
    pub addr: Address,
    pub index: u8,
    pub access: AccessMode,
}

/// Implicit register read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAccess {
    pub addr: Address,
    pub reg: String,
    pub access: AccessMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fp_imm_bits() {
        assert_eq!(FpImmOp::new(1.5), FpImmOp::new(1.5));
        assert_ne!(FpImmOp::new(0.0), FpImmOp::new(-0.0));
        assert_eq!(FpImmOp::new(2.25).value(), 2.25);
    }

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::ReadWrite.reads());
        assert!(AccessMode::ReadWrite.writes());
        assert!(!AccessMode::Read.writes());
        assert_eq!(AccessMode::Write.to_string(), "W");
    }
}
