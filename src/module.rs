//! In-memory binary container: sections, byte intervals, code blocks and
//! auxiliary data for one module.

use crate::{Address, Architecture};

/// Contiguous bytes of a section.
///
/// `contents` holds the initialized prefix; `size` may be larger when the
/// tail is zero-fill (e.g. `.bss`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteInterval {
    /// Load address, if the interval is addressable
    pub address: Option<Address>,
    /// Total size in bytes, initialized or not
    pub size: u64,
    /// Initialized bytes
    pub contents: Vec<u8>,
}

impl ByteInterval {
    /// Create an addressable, fully initialized interval.
    pub fn new(address: Address, contents: Vec<u8>) -> Self {
        Self {
            address: Some(address),
            size: contents.len() as u64,
            contents,
        }
    }

    /// Create an addressable interval with no initialized bytes.
    pub fn uninitialized(address: Address, size: u64) -> Self {
        Self {
            address: Some(address),
            size,
            contents: Vec::new(),
        }
    }

    /// Number of initialized bytes.
    pub fn initialized_size(&self) -> u64 {
        self.contents.len() as u64
    }
}

/// A section in the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Whether this section contains executable code
    pub executable: bool,
    /// Byte intervals of the section
    pub byte_intervals: Vec<ByteInterval>,
}

impl Section {
    /// Create a new section
    pub fn new(name: impl Into<String>, executable: bool, byte_intervals: Vec<ByteInterval>) -> Self {
        Self {
            name: name.into(),
            executable,
            byte_intervals,
        }
    }
}

/// Index of a byte interval within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalRef {
    pub section: usize,
    pub interval: usize,
}

/// A code block identified by an earlier analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlock {
    /// Owning byte interval
    pub interval: IntervalRef,
    /// Offset of the block from the start of the interval
    pub offset: u64,
    /// Size of the block in bytes
    pub size: u64,
}

/// Auxiliary metadata attached to a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxData {
    /// Raw entry point addresses, if known
    pub raw_entries: Option<Vec<Address>>,
}

/// One loaded binary module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name (usually the file name)
    pub name: String,
    /// Detected architecture
    pub architecture: Architecture,
    /// Sections of the module
    pub sections: Vec<Section>,
    /// Known code blocks
    pub code_blocks: Vec<CodeBlock>,
    /// Auxiliary metadata
    pub aux_data: AuxData,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>, architecture: Architecture) -> Self {
        Self {
            name: name.into(),
            architecture,
            sections: Vec::new(),
            code_blocks: Vec::new(),
            aux_data: AuxData::default(),
        }
    }

    /// Wrap a headerless blob as one executable section at `base`.
    pub fn raw(name: impl Into<String>, architecture: Architecture, base: Address, bytes: Vec<u8>) -> Self {
        let mut module = Self::new(name, architecture);
        module.add_section(Section::new(".text", true, vec![ByteInterval::new(base, bytes)]));
        module
    }

    /// Append a section and return its index.
    pub fn add_section(&mut self, section: Section) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }

    /// Look up a byte interval.
    pub fn byte_interval(&self, interval: IntervalRef) -> Option<&ByteInterval> {
        self.sections
            .get(interval.section)?
            .byte_intervals
            .get(interval.interval)
    }

    /// Address of a code block, if its interval exists and is addressable.
    pub fn code_block_address(&self, block: &CodeBlock) -> Option<Address> {
        self.byte_interval(block.interval)?
            .address
            .and_then(|base| base.checked_add(block.offset))
    }

    /// Register a code block starting at `address`.
    ///
    /// Returns false when no initialized byte interval holds `address`. A
    /// block already known at `address` is left as is.
    pub fn add_code_block_at(&mut self, address: Address, size: u64) -> bool {
        if self
            .code_blocks
            .iter()
            .any(|block| self.code_block_address(block) == Some(address))
        {
            return true;
        }
        let found = self.sections.iter().enumerate().find_map(|(s, section)| {
            section.byte_intervals.iter().enumerate().find_map(|(i, interval)| {
                let offset = address.checked_sub(interval.address?)?;
                (offset < interval.initialized_size())
                    .then_some((IntervalRef { section: s, interval: i }, offset))
            })
        });
        match found {
            Some((interval, offset)) => {
                self.code_blocks.push(CodeBlock { interval, offset, size });
                true
            }
            None => false,
        }
    }

    /// Executable sections, in module order.
    pub fn executable_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.executable)
    }

    /// Find a section by name
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_module() {
        let module = Module::raw("blob", Architecture::X86_64, 0x1000, vec![0x90, 0xc3]);
        let text = module.find_section(".text").unwrap();
        assert!(text.executable);
        assert_eq!(text.byte_intervals[0].address, Some(0x1000));
        assert_eq!(text.byte_intervals[0].initialized_size(), 2);
    }

    #[test]
    fn test_code_block_address() {
        let mut module = Module::raw("blob", Architecture::X86_64, 0x1000, vec![0x90; 16]);
        let block = CodeBlock {
            interval: IntervalRef { section: 0, interval: 0 },
            offset: 4,
            size: 4,
        };
        module.code_blocks.push(block);
        assert_eq!(module.code_block_address(&block), Some(0x1004));

        let orphan = CodeBlock {
            interval: IntervalRef { section: 7, interval: 0 },
            offset: 0,
            size: 1,
        };
        assert_eq!(module.code_block_address(&orphan), None);
    }

    #[test]
    fn test_add_code_block_at() {
        let mut module = Module::raw("blob", Architecture::X86_64, 0x1000, vec![0x90; 16]);
        module.add_section(Section::new(".bss", false, vec![ByteInterval::uninitialized(0x2000, 0x10)]));

        assert!(module.add_code_block_at(0x1008, 4));
        assert!(module.add_code_block_at(0x1008, 8));
        assert_eq!(module.code_blocks.len(), 1);
        assert_eq!(module.code_blocks[0].offset, 8);
        assert_eq!(module.code_blocks[0].size, 4);

        assert!(!module.add_code_block_at(0x0fff, 1));
        assert!(!module.add_code_block_at(0x1010, 1));
        assert!(!module.add_code_block_at(0x2000, 1));
        assert_eq!(module.code_blocks.len(), 1);
    }

    #[test]
    fn test_uninitialized_interval() {
        let bss = ByteInterval::uninitialized(0x4000, 0x100);
        assert_eq!(bss.size, 0x100);
        assert_eq!(bss.initialized_size(), 0);
    }
}
