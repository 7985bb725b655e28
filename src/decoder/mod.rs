//! Architecture decoders: the hook set the loader drives, and Capstone-backed
//! implementations for x86, ARM and AArch64.

mod aarch64;
mod arm;
mod x86;

pub use aarch64::AArch64Decoder;
pub use arm::ArmDecoder;
pub use x86::X86Decoder;

use capstone::{Capstone, InsnDetail, RegAccessType, RegId};
use log::trace;

use crate::facts::BinaryFacts;
use crate::relations::{AccessMode, Instruction, InstructionOpAccess, Operand, RegisterAccess};
use crate::{Address, Architecture, MAX_OPERANDS};

/// Errors that can occur while building a decoder
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Capstone error
    #[error("Capstone error: {0}")]
    CapstoneError(#[from] capstone::Error),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),
}

/// Single-address decode hook driven by the instruction loader.
pub trait Decoder {
    /// Architecture this decoder handles
    fn architecture(&self) -> Architecture;

    /// Scan stride in bytes; the minimum instruction alignment of the ISA.
    fn instruction_size(&self) -> u8 {
        1
    }

    /// Decode one instruction from the start of `bytes`, located at `addr`.
    ///
    /// On success the instruction, its interned operands and any auxiliary
    /// facts are added to `facts`; otherwise `addr` is recorded as invalid.
    /// Exactly one of the two happens per call.
    fn decode(&self, facts: &mut BinaryFacts, bytes: &[u8], addr: Address);
}

/// Per-ISA introspection of a decoded instruction.
///
/// `Insn` is whatever the decoding library hands back for one instruction.
pub trait ArchDecoder: Decoder {
    type Insn<'i>;

    /// Number of explicit operands.
    fn operand_count(&self, insn: &Self::Insn<'_>) -> u8;

    /// Access mode of the operand at zero-based `index`.
    fn operand_access(&self, insn: &Self::Insn<'_>, index: u8) -> AccessMode;

    /// Record implicit register reads and writes of `insn`.
    fn load_register_accesses(&self, facts: &mut BinaryFacts, addr: Address, insn: &Self::Insn<'_>);

    /// Record the access mode of every explicit operand that is touched.
    fn load_operand_accesses(&self, facts: &mut BinaryFacts, addr: Address, insn: &Self::Insn<'_>) {
        for index in 0..self.operand_count(insn) {
            let access = self.operand_access(insn, index);
            if access != AccessMode::None {
                facts.instructions.op_access(InstructionOpAccess {
                    addr,
                    index: index + 1,
                    access,
                });
            }
        }
    }
}

/// Create a decoder for a specific architecture
pub fn for_architecture(arch: Architecture) -> Result<Box<dyn Decoder>, DecoderError> {
    match arch {
        Architecture::X86_32 | Architecture::X86_64 => Ok(Box::new(X86Decoder::new(arch)?)),
        Architecture::Arm => Ok(Box::new(ArmDecoder::new()?)),
        Architecture::AArch64 => Ok(Box::new(AArch64Decoder::new()?)),
        other => Err(DecoderError::UnsupportedArchitecture(other)),
    }
}

/// Intern `operands` and add the instruction record.
///
/// Returns false, after recording `addr` as invalid, when the instruction
/// has more operands than the relation can hold.
pub(crate) fn push_instruction(
    facts: &mut BinaryFacts,
    addr: Address,
    size: usize,
    mnemonic: &str,
    operands: Vec<Operand>,
) -> bool {
    if operands.len() > MAX_OPERANDS {
        trace!("0x{:x}: {} has {} operands", addr, mnemonic, operands.len());
        facts.instructions.invalid(addr);
        return false;
    }
    let operands = operands
        .into_iter()
        .map(|op| facts.operands.add(op))
        .collect();
    facts.instructions.add(Instruction {
        addr,
        size: size as u64,
        mnemonic: mnemonic.to_ascii_uppercase(),
        operands,
    });
    true
}

/// Canonical upper-case register name; "NONE" for the empty register.
pub(crate) fn register_name(cs: &Capstone, reg: RegId) -> String {
    if reg.0 == 0 {
        return "NONE".to_string();
    }
    cs.reg_name(reg)
        .map(|name| name.to_ascii_uppercase())
        .unwrap_or_else(|| "NONE".to_string())
}

pub(crate) fn access_mode(access: Option<RegAccessType>) -> AccessMode {
    match access {
        Some(RegAccessType::ReadOnly) => AccessMode::Read,
        Some(RegAccessType::WriteOnly) => AccessMode::Write,
        Some(RegAccessType::ReadWrite) => AccessMode::ReadWrite,
        None => AccessMode::None,
    }
}

/// Implicit registers Capstone reports for an instruction.
pub(crate) fn load_implicit_registers(
    cs: &Capstone,
    facts: &mut BinaryFacts,
    addr: Address,
    detail: &InsnDetail<'_>,
) {
    for reg in detail.regs_read().iter() {
        facts.instructions.register_access(RegisterAccess {
            addr,
            reg: register_name(cs, *reg),
            access: AccessMode::Read,
        });
    }
    for reg in detail.regs_write().iter() {
        facts.instructions.register_access(RegisterAccess {
            addr,
            reg: register_name(cs, *reg),
            access: AccessMode::Write,
        });
    }
}
