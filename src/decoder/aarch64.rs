//! AArch64 decoding.

use std::fmt;

use capstone::arch::arm64::{ArchMode as Arm64Mode, Arm64CC, Arm64Operand, Arm64OperandType, Arm64Shift};
use capstone::prelude::*;
use capstone::InsnDetail;
use log::trace;

use super::{load_implicit_registers, push_instruction, register_name, ArchDecoder, Decoder, DecoderError};
use crate::facts::BinaryFacts;
use crate::relations::{
    AccessMode, FpImmOp, ImmOp, IndirectOp, InstructionCondCode, InstructionWriteback, Operand,
    RegOp, ShiftedOp, SpecialOp,
};
use crate::{Address, Architecture};

/// Capstone AArch64 decoder. Instructions are 4-byte aligned.
pub struct AArch64Decoder {
    cs: Capstone,
}

impl AArch64Decoder {
    pub fn new() -> Result<Self, DecoderError> {
        let cs = Capstone::new()
            .arm64()
            .mode(Arm64Mode::Arm)
            .detail(true)
            .build()?;
        Ok(Self { cs })
    }

    fn build_operand(&self, op: &Arm64Operand) -> Operand {
        match &op.op_type {
            Arm64OperandType::Reg(reg) => Operand::Reg(RegOp(register_name(&self.cs, *reg))),
            Arm64OperandType::Imm(value) | Arm64OperandType::Cimm(value) => Operand::Imm(ImmOp(*value)),
            Arm64OperandType::Fp(value) => Operand::FpImm(FpImmOp::new(*value)),
            Arm64OperandType::Mem(mem) => Operand::Indirect(IndirectOp {
                segment: "NONE".to_string(),
                base: register_name(&self.cs, mem.base()),
                index: register_name(&self.cs, mem.index()),
                scale: 1,
                disp: mem.disp() as i64,
                size: 0,
            }),
            other => Operand::Special(SpecialOp {
                kind: "arm64".to_string(),
                value: format!("{:?}", other),
            }),
        }
    }
}

/// Shift applied to an operand, as (kind, amount).
fn shift_of(shift: &Arm64Shift) -> Option<(&'static str, u32)> {
    match *shift {
        Arm64Shift::Lsl(n) => Some(("LSL", n)),
        Arm64Shift::Msl(n) => Some(("MSL", n)),
        Arm64Shift::Lsr(n) => Some(("LSR", n)),
        Arm64Shift::Asr(n) => Some(("ASR", n)),
        Arm64Shift::Ror(n) => Some(("ROR", n)),
        _ => None,
    }
}

/// Condition code name, or None for unconditional instructions.
fn condition_code(cc: Arm64CC) -> Option<String> {
    if cc == Arm64CC::ARM64_CC_INVALID || cc == Arm64CC::ARM64_CC_AL {
        return None;
    }
    let name = format!("{:?}", cc);
    Some(name.trim_start_matches("ARM64_CC_").to_string())
}

impl fmt::Debug for AArch64Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AArch64Decoder").finish()
    }
}

impl Decoder for AArch64Decoder {
    fn architecture(&self) -> Architecture {
        Architecture::AArch64
    }

    fn instruction_size(&self) -> u8 {
        4
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
        let arch_detail = detail.arch_detail();
        let Some(arm64) = arch_detail.arm64() else {
            facts.instructions.invalid(addr);
            return;
        };

        let mut operands = Vec::new();
        let mut shifts = Vec::new();
        let mut first_mem = None;
        for (i, op) in arm64.operands().enumerate() {
            let index = i as u8 + 1;
            if let Some((kind, shift)) = shift_of(&op.shift) {
                shifts.push(ShiftedOp {
                    addr,
                    index,
                    shift: shift as u8,
                    kind: kind.to_string(),
                });
            }
            if first_mem.is_none() && matches!(op.op_type, Arm64OperandType::Mem(_)) {
                first_mem = Some(index);
            }
            operands.push(self.build_operand(&op));
        }

        let mnemonic = insn.mnemonic().unwrap_or("");
        if !push_instruction(facts, addr, insn.bytes().len(), mnemonic, operands) {
            return;
        }
        for shift in shifts {
            facts.instructions.shifted_op(shift);
        }
        if arm64.writeback() {
            if let Some(index) = first_mem {
                facts.instructions.writeback(InstructionWriteback { addr, index });
            }
        }
        if let Some(code) = condition_code(arm64.cc()) {
            facts.instructions.condition_code(InstructionCondCode { addr, code });
        }
        self.load_operand_accesses(facts, addr, &detail);
        self.load_register_accesses(facts, addr, &detail);
    }
}

impl ArchDecoder for AArch64Decoder {
    type Insn<'i> = InsnDetail<'i>;

    fn operand_count(&self, insn: &InsnDetail<'_>) -> u8 {
        let arch_detail = insn.arch_detail();
        arch_detail.arm64().map_or(0, |arm64| arm64.operands().count() as u8)
    }

    // The AArch64 operand detail carries no access flags; only implicit
    // registers are reported for this ISA.
    fn operand_access(&self, _insn: &InsnDetail<'_>, _index: u8) -> AccessMode {
        AccessMode::None
    }

    fn load_register_accesses(&self, facts: &mut BinaryFacts, addr: Address, insn: &InsnDetail<'_>) {
        load_implicit_registers(&self.cs, facts, addr, insn);
    }
}
