//! 32-bit ARM decoding (ARM mode).

use std::fmt;

use capstone::arch::arm::{ArchMode as ArmMode, ArmCC, ArmOperand, ArmOperandType, ArmShift};
use capstone::prelude::*;
use capstone::InsnDetail;
use log::trace;

use super::{load_implicit_registers, push_instruction, register_name, ArchDecoder, Decoder, DecoderError};
use crate::facts::BinaryFacts;
use crate::relations::{
    AccessMode, FpImmOp, ImmOp, IndirectOp, InstructionCondCode, InstructionWriteback, Operand,
    RegBitFieldOp, RegOp, ShiftedOp, ShiftedWithRegOp, SpecialOp,
};
use crate::{Address, Architecture};

/// Capstone ARM decoder. Instructions are 4-byte aligned.
///
/// Register lists (`push {r4, r5, lr}`) come out of Capstone as one register
/// operand per entry; they are folded into a single register bitfield.
pub struct ArmDecoder {
    cs: Capstone,
}

enum Shift {
    Imm(&'static str, u32),
    Reg(&'static str, RegId),
}

fn shift_of(shift: &ArmShift) -> Option<Shift> {
    match *shift {
        ArmShift::Asr(n) => Some(Shift::Imm("ASR", n)),
        ArmShift::Lsl(n) => Some(Shift::Imm("LSL", n)),
        ArmShift::Lsr(n) => Some(Shift::Imm("LSR", n)),
        ArmShift::Ror(n) => Some(Shift::Imm("ROR", n)),
        ArmShift::Rrx(n) => Some(Shift::Imm("RRX", n)),
        ArmShift::AsrReg(reg) => Some(Shift::Reg("ASR", reg)),
        ArmShift::LslReg(reg) => Some(Shift::Reg("LSL", reg)),
        ArmShift::LsrReg(reg) => Some(Shift::Reg("LSR", reg)),
        ArmShift::RorReg(reg) => Some(Shift::Reg("ROR", reg)),
        ArmShift::RrxReg(reg) => Some(Shift::Reg("RRX", reg)),
        _ => None,
    }
}

/// Position of the first register-list operand, for instructions that take one.
fn register_list_start(mnemonic: &str) -> Option<usize> {
    const LIST_ONLY: &[&str] = &["push", "pop", "vpush", "vpop"];
    const BASE_THEN_LIST: &[&str] = &["ldm", "stm", "vldm", "vstm"];
    let mnemonic = mnemonic.to_ascii_lowercase();
    if LIST_ONLY.iter().any(|m| mnemonic.starts_with(m)) {
        Some(0)
    } else if BASE_THEN_LIST.iter().any(|m| mnemonic.starts_with(m)) {
        Some(1)
    } else {
        None
    }
}

fn condition_code(cc: ArmCC) -> Option<String> {
    if cc == ArmCC::ARM_CC_INVALID || cc == ArmCC::ARM_CC_AL {
        return None;
    }
    let name = format!("{:?}", cc);
    Some(name.trim_start_matches("ARM_CC_").to_string())
}

impl ArmDecoder {
    pub fn new() -> Result<Self, DecoderError> {
        let cs = Capstone::new()
            .arm()
            .mode(ArmMode::Arm)
            .detail(true)
            .build()?;
        Ok(Self { cs })
    }

    fn build_operand(&self, op: &ArmOperand) -> Operand {
        match &op.op_type {
            ArmOperandType::Reg(reg) => Operand::Reg(RegOp(register_name(&self.cs, *reg))),
            ArmOperandType::Imm(value) | ArmOperandType::Cimm(value) | ArmOperandType::Pimm(value) => {
                Operand::Imm(ImmOp(*value as i64))
            }
            ArmOperandType::Fp(value) => Operand::FpImm(FpImmOp::new(*value)),
            ArmOperandType::Mem(mem) => Operand::Indirect(IndirectOp {
                segment: "NONE".to_string(),
                base: register_name(&self.cs, mem.base()),
                index: register_name(&self.cs, mem.index()),
                scale: mem.scale() as i64,
                disp: mem.disp() as i64,
                size: 0,
            }),
            other => Operand::Special(SpecialOp {
                kind: "arm".to_string(),
                value: format!("{:?}", other),
            }),
        }
    }
}

impl fmt::Debug for ArmDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmDecoder").finish()
    }
}

impl Decoder for ArmDecoder {
    fn architecture(&self) -> Architecture {
        Architecture::Arm
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
        let Some(arm) = arch_detail.arm() else {
            facts.instructions.invalid(addr);
            return;
        };

        let mnemonic = insn.mnemonic().unwrap_or("");
        let list_start = register_list_start(mnemonic);
        let mut operands = Vec::new();
        let mut reg_list = Vec::new();
        let mut shifts = Vec::new();
        let mut reg_shifts = Vec::new();
        let mut first_mem = None;
        for (i, op) in arm.operands().enumerate() {
            if let (Some(start), ArmOperandType::Reg(reg)) = (list_start, &op.op_type) {
                if i >= start {
                    reg_list.push(register_name(&self.cs, *reg));
                    continue;
                }
            }
            let index = operands.len() as u8 + 1;
            match shift_of(&op.shift) {
                Some(Shift::Imm(kind, shift)) => shifts.push(ShiftedOp {
                    addr,
                    index,
                    shift: shift as u8,
                    kind: kind.to_string(),
                }),
                Some(Shift::Reg(kind, reg)) => reg_shifts.push(ShiftedWithRegOp {
                    addr,
                    index,
                    kind: kind.to_string(),
                    reg: register_name(&self.cs, reg),
                }),
                None => {}
            }
            if first_mem.is_none() && matches!(op.op_type, ArmOperandType::Mem(_)) {
                first_mem = Some(index);
            }
            operands.push(self.build_operand(&op));
        }
        if !reg_list.is_empty() {
            operands.push(Operand::RegBitField(RegBitFieldOp(reg_list)));
        }

        if !push_instruction(facts, addr, insn.bytes().len(), mnemonic, operands) {
            return;
        }
        for shift in shifts {
            facts.instructions.shifted_op(shift);
        }
        for shift in reg_shifts {
            facts.instructions.shifted_with_reg_op(shift);
        }
        if arm.writeback() {
            // ldm/stm update their base register, everything else its memory operand
            let index = first_mem.or(list_start.filter(|&start| start == 1).map(|_| 1));
            if let Some(index) = index {
                facts.instructions.writeback(InstructionWriteback { addr, index });
            }
        }
        if let Some(code) = condition_code(arm.cc()) {
            facts.instructions.condition_code(InstructionCondCode { addr, code });
        }
        self.load_operand_accesses(facts, addr, &detail);
        self.load_register_accesses(facts, addr, &detail);
    }
}

impl ArchDecoder for ArmDecoder {
    type Insn<'i> = InsnDetail<'i>;

    fn operand_count(&self, insn: &InsnDetail<'_>) -> u8 {
        let arch_detail = insn.arch_detail();
        arch_detail.arm().map_or(0, |arm| arm.operands().count() as u8)
    }

    // As on AArch64, operand detail carries no access flags.
    fn operand_access(&self, _insn: &InsnDetail<'_>, _index: u8) -> AccessMode {
        AccessMode::None
    }

    fn load_register_accesses(&self, facts: &mut BinaryFacts, addr: Address, insn: &InsnDetail<'_>) {
        load_implicit_registers(&self.cs, facts, addr, insn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::OperandKind;

    fn decode_one(bytes: &[u8], addr: Address) -> BinaryFacts {
        let decoder = ArmDecoder::new().unwrap();
        let mut facts = BinaryFacts::new();
        decoder.decode(&mut facts, bytes, addr);
        facts
    }

    #[test]
    fn test_register_list() {
        // push {r4, r5, lr}
        let facts = decode_one(&[0x30, 0x40, 0x2d, 0xe9], 0x8000);
        let insn = &facts.instructions.instructions()[0];
        assert_eq!(insn.mnemonic, "PUSH");
        assert_eq!(insn.size, 4);
        assert_eq!(insn.operands.len(), 1);
        assert_eq!(insn.operands[0].kind, OperandKind::RegBitField);

        let rows: Vec<_> = facts.operands.reg_bitfield_entries().collect();
        assert_eq!(rows, vec![(1, 0, "R4"), (1, 1, "R5"), (1, 2, "LR")]);
    }

    #[test]
    fn test_base_register_then_list() {
        // ldm r0!, {r1, r2}
        let facts = decode_one(&[0x06, 0x00, 0xb0, 0xe8], 0x8000);
        let insn = &facts.instructions.instructions()[0];
        assert_eq!(insn.operands.len(), 2);
        assert_eq!(insn.operands[0].kind, OperandKind::Reg);
        assert_eq!(insn.operands[1].kind, OperandKind::RegBitField);
        assert_eq!(facts.operands.reg().get(&RegOp("R0".to_string())), Some(insn.operands[0].id));

        let regs: Vec<_> = facts.operands.reg_bitfield_entries().map(|(_, _, reg)| reg).collect();
        assert_eq!(regs, vec!["R1", "R2"]);
    }

    #[test]
    fn test_register_shifted_operand() {
        // add r0, r1, r2, lsl r3
        let facts = decode_one(&[0x12, 0x03, 0x81, 0xe0], 0x8000);
        let insn = &facts.instructions.instructions()[0];
        assert_eq!(insn.mnemonic, "ADD");
        assert_eq!(insn.operands.len(), 3);

        let shifted = facts.instructions.shifted_with_reg_ops();
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted[0].index, 3);
        assert_eq!(shifted[0].kind, "LSL");
        assert_eq!(shifted[0].reg, "R3");
        assert!(facts.instructions.shifted_ops().is_empty());
    }

    #[test]
    fn test_conditional_branch() {
        // bxeq lr
        let facts = decode_one(&[0x1e, 0xff, 0x2f, 0x01], 0x8000);
        let codes = facts.instructions.condition_codes();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "EQ");
    }

    #[test]
    fn test_unconditional_has_no_condition_code() {
        // bx lr
        let facts = decode_one(&[0x1e, 0xff, 0x2f, 0xe1], 0x8000);
        assert_eq!(facts.instructions.instructions().len(), 1);
        assert!(facts.instructions.condition_codes().is_empty());
    }

    #[test]
    fn test_register_list_start() {
        assert_eq!(register_list_start("pop"), Some(0));
        assert_eq!(register_list_start("stmdb"), Some(1));
        assert_eq!(register_list_start("ldr"), None);
    }
}
