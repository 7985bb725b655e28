//! Blind scan: every executable byte interval, swept at the decoder stride.

use log::debug;

use super::{RegionScan, ScanRegion};
use crate::{DisassemblyError, Module};

/// Sweeps the initialized bytes of every executable section.
///
/// Decoding happens at each stride position whatever the previous result,
/// so overlapping decode origins are all visited.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlindScan;

impl RegionScan for BlindScan {
    fn enumerate_regions<'m>(&self, module: &'m Module) -> Result<Vec<ScanRegion<'m>>, DisassemblyError> {
        let mut regions = Vec::new();
        for section in module.executable_sections() {
            for (i, interval) in section.byte_intervals.iter().enumerate() {
                let address = interval.address.ok_or_else(|| DisassemblyError::NonAddressableInterval {
                    section: section.name.clone(),
                    interval: i,
                })?;
                let len = interval.contents.len() as u64;
                if address.checked_add(len).is_none() {
                    return Err(DisassemblyError::AddressOverflow { address, len });
                }
                regions.push(ScanRegion::Sweep {
                    address,
                    bytes: &interval.contents,
                });
            }
        }
        debug!("Blind scan of '{}': {} executable regions", module.name, regions.len());
        Ok(regions)
    }
}
