//! Region enumeration strategies

use std::fmt;
use clap::ValueEnum;
use crate::{Address, DisassemblyError, Module};

/// Available region enumeration strategies.
#[derive(Copy, Clone, ValueEnum, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Decode at every stride position of every executable section
    #[default]
    Blind,
    /// Decode once at the start of every known code block
    #[value(alias = "code_blocks")]
    CodeBlocks,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Blind => write!(f, "Blind scan"),
            Strategy::CodeBlocks => write!(f, "Code-block scan"),
        }
    }
}

impl Strategy {
    /// Build the region scanner for this strategy.
    pub fn scanner(&self) -> Box<dyn RegionScan> {
        match self {
            Strategy::Blind => Box::new(BlindScan),
            Strategy::CodeBlocks => Box::new(CodeBlockScan),
        }
    }

    /// Return all available strategies
    pub fn all() -> &'static [Strategy] {
        &[Strategy::Blind, Strategy::CodeBlocks]
    }
}

/// Bytes the loader should decode, borrowed from the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRegion<'m> {
    /// Decode at every stride position of `bytes`.
    Sweep { address: Address, bytes: &'m [u8] },
    /// Decode once, at the start of `bytes`.
    Single { address: Address, bytes: &'m [u8] },
}

impl ScanRegion<'_> {
    pub fn address(&self) -> Address {
        match self {
            ScanRegion::Sweep { address, .. } | ScanRegion::Single { address, .. } => *address,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScanRegion::Sweep { bytes, .. } | ScanRegion::Single { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chooses which bytes of a module get decoded.
///
/// Every region is validated up front, so a broken module is rejected
/// before the first decode.
pub trait RegionScan {
    fn enumerate_regions<'m>(&self, module: &'m Module) -> Result<Vec<ScanRegion<'m>>, DisassemblyError>;
}

pub mod blind;
pub mod code_block;

pub use blind::BlindScan;
pub use code_block::CodeBlockScan;
