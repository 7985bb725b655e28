//! Code-block scan: one decode at the start of each known code block.

use log::{debug, warn};

use super::{RegionScan, ScanRegion};
use crate::{DisassemblyError, Module};

/// Trusts block boundaries from an earlier analysis pass and decodes once
/// per block, with the bytes running to the end of the owning interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBlockScan;

impl RegionScan for CodeBlockScan {
    fn enumerate_regions<'m>(&self, module: &'m Module) -> Result<Vec<ScanRegion<'m>>, DisassemblyError> {
        if module.code_blocks.is_empty() {
            warn!("Module '{}' has no code blocks; nothing to decode", module.name);
        }
        let mut regions = Vec::with_capacity(module.code_blocks.len());
        for (i, block) in module.code_blocks.iter().enumerate() {
            let interval = module
                .byte_interval(block.interval)
                .ok_or(DisassemblyError::OrphanCodeBlock { block: i })?;
            let base = interval.address.ok_or_else(|| DisassemblyError::NonAddressableInterval {
                section: module.sections[block.interval.section].name.clone(),
                interval: block.interval.interval,
            })?;
            let initialized = interval.initialized_size();
            if base.checked_add(initialized).is_none() {
                return Err(DisassemblyError::AddressOverflow { address: base, len: initialized });
            }
            if block.offset >= initialized {
                return Err(DisassemblyError::UninitializedCodeBlock {
                    block: i,
                    offset: block.offset,
                    initialized,
                });
            }
            regions.push(ScanRegion::Single {
                address: base + block.offset,
                bytes: &interval.contents[block.offset as usize..],
            });
        }
        debug!("Code-block scan of '{}': {} blocks", module.name, regions.len());
        Ok(regions)
    }
}
