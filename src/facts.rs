//! Per-module fact accumulation: operand interning and instruction streams.

use std::collections::HashMap;
use std::hash::Hash;

use crate::relations::{
    FpImmOp, ImmOp, IndirectOp, Instruction, InstructionCondCode, InstructionOpAccess,
    InstructionWriteback, Operand, OperandRef, RegBitFieldOp, RegOp, RegisterAccess, ShiftedOp,
    ShiftedWithRegOp, SpecialOp,
};
use crate::Address;

/// Interned values of one operand kind, in ascending-ID order.
#[derive(Debug, Clone)]
pub struct OperandTable<T> {
    ids: HashMap<T, u64>,
    entries: Vec<(u64, T)>,
}

impl<T> Default for OperandTable<T> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> OperandTable<T> {
    fn index(&mut self, next: &mut u64, op: T) -> u64 {
        if let Some(&id) = self.ids.get(&op) {
            return id;
        }
        let id = *next;
        *next += 1;
        self.ids.insert(op.clone(), id);
        self.entries.push((id, op));
        id
    }

    /// ID of an already interned value.
    pub fn get(&self, op: &T) -> Option<u64> {
        self.ids.get(op).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.entries.iter().map(|(id, op)| (*id, op))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assigns dense IDs to operand values across a whole module.
///
/// One counter is shared by every kind, so an ID names exactly one operand.
/// ID 0 is never assigned; it marks an empty operand slot.
#[derive(Debug, Clone)]
pub struct OperandFacts {
    next: u64,
    imm: OperandTable<ImmOp>,
    reg: OperandTable<RegOp>,
    reg_bitfields: OperandTable<RegBitFieldOp>,
    fp_imm: OperandTable<FpImmOp>,
    indirect: OperandTable<IndirectOp>,
    special: OperandTable<SpecialOp>,
}

impl Default for OperandFacts {
    fn default() -> Self {
        Self {
            next: 1,
            imm: OperandTable::default(),
            reg: OperandTable::default(),
            reg_bitfields: OperandTable::default(),
            fp_imm: OperandTable::default(),
            indirect: OperandTable::default(),
            special: OperandTable::default(),
        }
    }
}

impl OperandFacts {
    /// Intern `op`, returning its existing ID or a fresh one.
    pub fn add(&mut self, op: Operand) -> OperandRef {
        let kind = op.kind();
        let next = &mut self.next;
        let id = match op {
            Operand::Imm(op) => self.imm.index(next, op),
            Operand::Reg(op) => self.reg.index(next, op),
            Operand::RegBitField(op) => self.reg_bitfields.index(next, op),
            Operand::FpImm(op) => self.fp_imm.index(next, op),
            Operand::Indirect(op) => self.indirect.index(next, op),
            Operand::Special(op) => self.special.index(next, op),
        };
        OperandRef { kind, id }
    }

    pub fn imm(&self) -> &OperandTable<ImmOp> {
        &self.imm
    }

    pub fn reg(&self) -> &OperandTable<RegOp> {
        &self.reg
    }

    pub fn reg_bitfields(&self) -> &OperandTable<RegBitFieldOp> {
        &self.reg_bitfields
    }

    pub fn fp_imm(&self) -> &OperandTable<FpImmOp> {
        &self.fp_imm
    }

    pub fn indirect(&self) -> &OperandTable<IndirectOp> {
        &self.indirect
    }

    pub fn special(&self) -> &OperandTable<SpecialOp> {
        &self.special
    }

    /// Register lists flattened to `(id, position, register)`.
    pub fn reg_bitfield_entries(&self) -> impl Iterator<Item = (u64, usize, &str)> {
        self.reg_bitfields.iter().flat_map(|(id, RegBitFieldOp(regs))| {
            regs.iter()
                .enumerate()
                .map(move |(position, reg)| (id, position, reg.as_str()))
        })
    }

    /// Total number of interned operands.
    pub fn len(&self) -> usize {
        (self.next - 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next == 1
    }
}

/// Append-only streams of decoded-instruction facts.
#[derive(Debug, Clone, Default)]
pub struct InstructionFacts {
    instructions: Vec<Instruction>,
    invalid: Vec<Address>,
    shifted_ops: Vec<ShiftedOp>,
    shifted_with_reg_ops: Vec<ShiftedWithRegOp>,
    writebacks: Vec<InstructionWriteback>,
    condition_codes: Vec<InstructionCondCode>,
    op_accesses: Vec<InstructionOpAccess>,
    register_accesses: Vec<RegisterAccess>,
}

impl InstructionFacts {
    pub fn add(&mut self, insn: Instruction) {
        self.instructions.push(insn);
    }

    pub fn invalid(&mut self, addr: Address) {
        self.invalid.push(addr);
    }

    pub fn shifted_op(&mut self, op: ShiftedOp) {
        self.shifted_ops.push(op);
    }

    pub fn shifted_with_reg_op(&mut self, op: ShiftedWithRegOp) {
        self.shifted_with_reg_ops.push(op);
    }

    pub fn writeback(&mut self, writeback: InstructionWriteback) {
        self.writebacks.push(writeback);
    }

    pub fn condition_code(&mut self, code: InstructionCondCode) {
        self.condition_codes.push(code);
    }

    pub fn op_access(&mut self, access: InstructionOpAccess) {
        self.op_accesses.push(access);
    }

    pub fn register_access(&mut self, access: RegisterAccess) {
        self.register_accesses.push(access);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn invalid_addresses(&self) -> &[Address] {
        &self.invalid
    }

    pub fn shifted_ops(&self) -> &[ShiftedOp] {
        &self.shifted_ops
    }

    pub fn shifted_with_reg_ops(&self) -> &[ShiftedWithRegOp] {
        &self.shifted_with_reg_ops
    }

    pub fn writebacks(&self) -> &[InstructionWriteback] {
        &self.writebacks
    }

    pub fn condition_codes(&self) -> &[InstructionCondCode] {
        &self.condition_codes
    }

    pub fn op_accesses(&self) -> &[InstructionOpAccess] {
        &self.op_accesses
    }

    pub fn register_accesses(&self) -> &[RegisterAccess] {
        &self.register_accesses
    }
}

/// Everything decoded from one module in one loader pass.
#[derive(Debug, Clone, Default)]
pub struct BinaryFacts {
    pub instructions: InstructionFacts,
    pub operands: OperandFacts,
}

impl BinaryFacts {
    pub fn new() -> Self {
        Self::default()
    }
}
