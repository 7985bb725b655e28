//! Instruction loader: drives a decoder over the regions a scan strategy
//! picks and hands the collected facts to a sink.

use log::{debug, info};
use rayon::prelude::*;

use crate::decoder::{self, Decoder};
use crate::facts::BinaryFacts;
use crate::relations::AccessMode;
use crate::sink::{FactDatabase, FactSink, FactValue, Tuple};
use crate::strategy::{RegionScan, ScanRegion, Strategy};
use crate::{tuple, Architecture, DisassemblyError, Module, MAX_OPERANDS};

/// Every relation [`insert`] declares, in emission order.
pub const RELATIONS: &[&str] = &[
    "instruction",
    "invalid_instruction",
    "op_immediate",
    "op_register",
    "op_register_bitfield",
    "op_fp_immediate",
    "op_indirect",
    "op_special",
    "shifted_operand",
    "shifted_with_register_operand",
    "instruction_writeback",
    "instruction_condition_code",
    "instruction_operand_access",
    "register_access",
];

/// Decodes one module per [`run`](InstructionLoader::run).
///
/// The loader owns its decoder, and with it the Capstone handle.
pub struct InstructionLoader {
    decoder: Box<dyn Decoder>,
    strategy: Box<dyn RegionScan>,
}

impl InstructionLoader {
    pub fn new(decoder: Box<dyn Decoder>, strategy: Box<dyn RegionScan>) -> Self {
        Self { decoder, strategy }
    }

    /// Build a loader with the Capstone decoder for `arch`.
    pub fn for_architecture(arch: Architecture, strategy: Strategy) -> Result<Self, DisassemblyError> {
        let decoder = decoder::for_architecture(arch)?;
        debug!("Loader for {} using {}", arch, strategy);
        Ok(Self::new(decoder, strategy.scanner()))
    }

    pub fn architecture(&self) -> Architecture {
        self.decoder.architecture()
    }

    /// Decode `module` and insert every relation into `sink`.
    ///
    /// On error nothing reaches the sink.
    pub fn run(&self, module: &Module, sink: &mut dyn FactSink) -> Result<(), DisassemblyError> {
        let mut facts = BinaryFacts::new();
        self.load(module, &mut facts)?;
        insert(&facts, sink);
        Ok(())
    }

    /// Decode `module` into `facts` without touching a sink.
    pub fn load(&self, module: &Module, facts: &mut BinaryFacts) -> Result<(), DisassemblyError> {
        let stride = self.decoder.instruction_size() as usize;
        if stride == 0 {
            return Err(DisassemblyError::InvalidStride(self.decoder.architecture()));
        }

        let regions = self.strategy.enumerate_regions(module)?;
        for region in &regions {
            match *region {
                ScanRegion::Sweep { address, bytes } => {
                    for offset in (0..bytes.len()).step_by(stride) {
                        self.decoder.decode(facts, &bytes[offset..], address + offset as u64);
                    }
                }
                ScanRegion::Single { address, bytes } => {
                    self.decoder.decode(facts, bytes, address);
                }
            }
        }

        info!(
            "{}: {} instructions, {} invalid addresses, {} operands",
            module.name,
            facts.instructions.instructions().len(),
            facts.instructions.invalid_addresses().len(),
            facts.operands.len()
        );
        Ok(())
    }
}

/// Access rows for one access mode; read-write becomes a read and a write.
fn access_rows(access: AccessMode) -> impl Iterator<Item = &'static str> {
    let read = access.reads().then_some("R");
    let write = access.writes().then_some("W");
    read.into_iter().chain(write)
}

/// Insert every relation of `facts` into `sink`, empty ones included.
pub fn insert(facts: &BinaryFacts, sink: &mut dyn FactSink) {
    let insns = &facts.instructions;
    let ops = &facts.operands;

    let instructions = insns
        .instructions()
        .iter()
        .map(|insn| {
            let mut row = tuple![insn.addr, insn.mnemonic.as_str()];
            row.extend(
                (0..MAX_OPERANDS).map(|i| FactValue::from(insn.operands.get(i).map_or(0, |op| op.id))),
            );
            row.push(FactValue::from(insn.size));
            row
        })
        .collect();
    sink.insert("instruction", instructions);

    sink.insert(
        "invalid_instruction",
        insns.invalid_addresses().iter().map(|&addr| tuple![addr]).collect(),
    );

    sink.insert("op_immediate", ops.imm().iter().map(|(id, op)| tuple![id, op.0]).collect());
    sink.insert("op_register", ops.reg().iter().map(|(id, op)| tuple![id, op.0.as_str()]).collect());
    sink.insert(
        "op_register_bitfield",
        ops.reg_bitfield_entries()
            .map(|(id, position, reg)| tuple![id, position, reg])
            .collect(),
    );
    sink.insert(
        "op_fp_immediate",
        ops.fp_imm().iter().map(|(id, op)| tuple![id, op.value()]).collect(),
    );
    sink.insert(
        "op_indirect",
        ops.indirect()
            .iter()
            .map(|(id, op)| {
                tuple![
                    id,
                    op.base.as_str(),
                    op.index.as_str(),
                    op.scale,
                    op.disp,
                    op.segment.as_str(),
                    op.size
                ]
            })
            .collect(),
    );
    sink.insert(
        "op_special",
        ops.special()
            .iter()
            .map(|(id, op)| tuple![id, op.kind.as_str(), op.value.as_str()])
            .collect(),
    );

    sink.insert(
        "shifted_operand",
        insns
            .shifted_ops()
            .iter()
            .map(|op| tuple![op.addr, op.index, op.shift, op.kind.as_str()])
            .collect(),
    );
    sink.insert(
        "shifted_with_register_operand",
        insns
            .shifted_with_reg_ops()
            .iter()
            .map(|op| tuple![op.addr, op.index, op.kind.as_str(), op.reg.as_str()])
            .collect(),
    );
    sink.insert(
        "instruction_writeback",
        insns.writebacks().iter().map(|wb| tuple![wb.addr, wb.index]).collect(),
    );
    sink.insert(
        "instruction_condition_code",
        insns
            .condition_codes()
            .iter()
            .map(|cc| tuple![cc.addr, cc.code.as_str()])
            .collect(),
    );

    let op_accesses: Vec<Tuple> = insns
        .op_accesses()
        .iter()
        .flat_map(|a| access_rows(a.access).map(move |mode| tuple![a.addr, a.index, mode]))
        .collect();
    sink.insert("instruction_operand_access", op_accesses);

    let reg_accesses: Vec<Tuple> = insns
        .register_accesses()
        .iter()
        .flat_map(|a| access_rows(a.access).map(move |mode| tuple![a.addr, a.reg.as_str(), mode]))
        .collect();
    sink.insert("register_access", reg_accesses);
}

/// Insert the raw entry points of `module` as `entry_point` facts.
pub fn load_entry_points(module: &Module, sink: &mut dyn FactSink) {
    let entries = module
        .aux_data
        .raw_entries
        .iter()
        .flatten()
        .map(|&addr| tuple![addr])
        .collect();
    sink.insert("entry_point", entries);
}

/// Load independent modules in parallel, one loader and database each.
///
/// Results are returned in module order; a failing module does not affect
/// the others.
pub fn load_modules(modules: &[Module], strategy: Strategy) -> Vec<Result<FactDatabase, DisassemblyError>> {
    modules
        .par_iter()
        .map(|module| {
            let loader = InstructionLoader::for_architecture(module.architecture, strategy)?;
            let mut db = FactDatabase::new();
            loader.run(module, &mut db)?;
            load_entry_points(module, &mut db);
            Ok(db)
        })
        .collect()
}
