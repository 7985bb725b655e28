//! Core types, errors, and dispatch for the Nuclide Facts instruction loader.
//!
//! This library scans the executable bytes of a binary module, decodes every
//! candidate instruction with Capstone and emits the results as flat,
//! deduplicated relations for a downstream logic-based analysis engine.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::fs;
//! use nuclide_facts::{
//!     loader::{load_entry_points, InstructionLoader},
//!     parser::GoblinParser,
//!     sink::FactDatabase,
//!     strategy::Strategy,
//!     BinaryParser, // Import the trait to bring parse() method into scope
//! };
//!
//! // Read binary file
//! let binary_data = fs::read("path/to/binary").unwrap();
//!
//! // Parse the container into a module
//! let module = GoblinParser::new().parse(&binary_data).unwrap();
//!
//! // Blind scan every executable section
//! let loader = InstructionLoader::for_architecture(module.architecture, Strategy::Blind).unwrap();
//!
//! let mut facts = FactDatabase::new();
//! loader.run(&module, &mut facts).unwrap();
//! load_entry_points(&module, &mut facts);
//!
//! println!("{} instructions", facts.relation("instruction").len());
//! ```

pub mod decoder;
pub mod facts;
pub mod format;
pub mod hints;
pub mod loader;
pub mod module;
pub mod parser;
pub mod relations;
pub mod sink;
pub mod strategy;
mod large_tests;
#[cfg(feature = "extension-module")]
pub mod python;

/// Represents an address in memory
pub type Address = u64;

use std::fmt;

pub use decoder::{ArchDecoder, Decoder};
pub use module::Module;

/// Operand slots in the `instruction` relation; unused slots hold 0.
pub const MAX_OPERANDS: usize = 4;

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// MIPS 32-bit
    Mips32,
    /// RISC-V 32-bit
    RiscV32,
    /// RISC-V 64-bit
    RiscV64,
    /// PowerPC 32-bit
    Ppc32,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Mips32 => write!(f, "MIPS32"),
            Architecture::RiscV32 => write!(f, "RISC-V 32"),
            Architecture::RiscV64 => write!(f, "RISC-V 64"),
            Architecture::Ppc32 => write!(f, "PowerPC 32"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Parser trait: turn raw container bytes into a [`Module`].
pub trait BinaryParser: Send + Sync {
    /// Parse binary data into a module
    ///
    /// # Arguments
    /// * `data` - The binary data to parse
    ///
    /// # Returns
    /// Result containing the Module if parsing was successful
    fn parse(&self, data: &[u8]) -> Result<Module, DisassemblyError>;
}

/// Error type for loading operations.
///
/// Bytes that fail to decode are never reported here; they become
/// `invalid_instruction` facts. Everything below aborts the whole load.
#[derive(Debug, thiserror::Error)]
pub enum DisassemblyError {
    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    /// Decoder construction failed
    #[error("Decoder error: {0}")]
    DecoderError(#[from] decoder::DecoderError),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// A byte interval that must be scanned has no address
    #[error("Byte interval {interval} of section '{section}' is non-addressable")]
    NonAddressableInterval { section: String, interval: usize },

    /// A code block points at a byte interval the module does not have
    #[error("Code block {block} has no owning byte interval")]
    OrphanCodeBlock { block: usize },

    /// A code block starts outside the initialized bytes of its interval
    #[error("Code block {block} at offset {offset} lies outside {initialized} initialized bytes")]
    UninitializedCodeBlock { block: usize, offset: u64, initialized: u64 },

    /// A region runs past the end of the address space
    #[error("Region at 0x{address:x} of {len} bytes overflows the address space")]
    AddressOverflow { address: Address, len: u64 },

    /// The decoder reported a zero scan stride
    #[error("Decoder for {0} reported a zero instruction stride")]
    InvalidStride(Architecture),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Output formatting error
    #[error("Format error: {0}")]
    FormatError(String),
}
