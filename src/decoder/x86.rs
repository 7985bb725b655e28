//! x86 and x86-64 decoding.

use std::fmt;

use capstone::arch::x86::{ArchMode as X86Mode, X86Operand, X86OperandType};
use capstone::prelude::*;
use capstone::InsnDetail;
use log::trace;

use super::{access_mode, load_implicit_registers, push_instruction, register_name, ArchDecoder, Decoder, DecoderError};
use crate::facts::BinaryFacts;
use crate::relations::{AccessMode, ImmOp, IndirectOp, Operand, RegOp};
use crate::{Address, Architecture};

/// Capstone x86 decoder in 32- or 64-bit mode.
pub struct X86Decoder {
    cs: Capstone,
    arch: Architecture,
}

impl X86Decoder {
    /// Build a decoder for `X86_32` or `X86_64`.
    pub fn new(arch: Architecture) -> Result<Self, DecoderError> {
        let mode = match arch {
            Architecture::X86_32 => X86Mode::Mode32,
            Architecture::X86_64 => X86Mode::Mode64,
            other => return Err(DecoderError::UnsupportedArchitecture(other)),
        };
        let cs = Capstone::new()
            .x86()
            .mode(mode)
            .detail(true)
            .build()?;
        Ok(Self { cs, arch })
    }

    fn build_operand(&self, op: &X86Operand) -> Option<Operand> {
        match &op.op_type {
            X86OperandType::Reg(reg) => Some(Operand::Reg(RegOp(register_name(&self.cs, *reg)))),
            X86OperandType::Imm(value) => Some(Operand::Imm(ImmOp(*value))),
            X86OperandType::Mem(mem) => Some(Operand::Indirect(IndirectOp {
                segment: register_name(&self.cs, mem.segment()),
                base: register_name(&self.cs, mem.base()),
                index: register_name(&self.cs, mem.index()),
                scale: mem.scale() as i64,
                disp: mem.disp(),
                size: op.size as u64 * 8,
            })),
            _ => None,
        }
    }
}

impl fmt::Debug for X86Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X86Decoder").field("arch", &self.arch).finish()
    }
}

impl Decoder for X86Decoder {
    fn architecture(&self) -> Architecture {
        self.arch
    }

    fn decode(&self, facts: &mut BinaryFacts, bytes: &[u8], addr: Address) {
        let insns = match self.cs.disasm_count(bytes, addr, 1) {
            Ok(insns) => insns,
            Err(err) => {
                trace!("0x{:x}: {}", addr, err);
                facts.instructions.invalid(addr);
                return;
            }
        };
        let Some(insn) = insns.iter().next() else {
            facts.instructions.invalid(addr);
            return;
        };
        let detail = match self.cs.insn_detail(&insn) {
            Ok(detail) => detail,
            Err(err) => {
                trace!("0x{:x}: no detail: {}", addr, err);
                facts.instructions.invalid(addr);
                return;
            }
        };

        let operands: Option<Vec<Operand>> = {
            let arch_detail = detail.arch_detail();
            match arch_detail.x86() {
                Some(x86) => x86.operands().map(|op| self.build_operand(&op)).collect(),
                None => None,
            }
        };
        let Some(operands) = operands else {
            facts.instructions.invalid(addr);
            return;
        };

        let mnemonic = insn.mnemonic().unwrap_or("");
        if !push_instruction(facts, addr, insn.bytes().len(), mnemonic, operands) {
            return;
        }
        self.load_operand_accesses(facts, addr, &detail);
        self.load_register_accesses(facts, addr, &detail);
    }
}

impl ArchDecoder for X86Decoder {
    type Insn<'i> = InsnDetail<'i>;

    fn operand_count(&self, insn: &InsnDetail<'_>) -> u8 {
        let arch_detail = insn.arch_detail();
        arch_detail.x86().map_or(0, |x86| x86.operands().count() as u8)
    }

    fn operand_access(&self, insn: &InsnDetail<'_>, index: u8) -> AccessMode {
        let arch_detail = insn.arch_detail();
        arch_detail
            .x86()
            .and_then(|x86| x86.operands().nth(index as usize))
            .map_or(AccessMode::None, |op| access_mode(op.access))
    }

    fn load_register_accesses(&self, facts: &mut BinaryFacts, addr: Address, insn: &InsnDetail<'_>) {
        load_implicit_registers(&self.cs, facts, addr, insn);
    }
}
