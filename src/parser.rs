//! Goblin-based multi-format container parser.

use std::fmt;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};
use log::{debug, warn};

use crate::module::{ByteInterval, Section};
use crate::{Address, Architecture, BinaryParser, DisassemblyError, Module};

// Mach-O section attribute and type bits
const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;
const SECTION_TYPE: u32 = 0x0000_00ff;
const S_ZEROFILL: u32 = 0x1;

/// Builds a [`Module`] from ELF, PE or Mach-O images via Goblin.
///
/// Every section becomes one byte interval. Sections without file data
/// (`.bss` and friends) get an interval with no initialized bytes.
#[derive(Debug, Default)]
pub struct GoblinParser;

fn file_bytes<'a>(img: &'a [u8], offset: u64, size: u64, section: &str) -> Result<&'a [u8], DisassemblyError> {
    let start = offset as usize;
    let end = start.saturating_add(size as usize);
    img.get(start..end).ok_or_else(|| {
        DisassemblyError::ParsingError(format!(
            "section '{}' data 0x{:x}..0x{:x} lies outside the file",
            section, start, end
        ))
    })
}

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: elf::Elf, img: &[u8]) -> Result<Module, DisassemblyError> {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86_32,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::AArch64,
            elf::header::EM_MIPS => Architecture::Mips32,
            elf::header::EM_RISCV => match elf.header.e_ident[elf::header::EI_CLASS] {
                elf::header::ELFCLASS32 => Architecture::RiscV32,
                elf::header::ELFCLASS64 => Architecture::RiscV64,
                _ => Architecture::Unknown,
            },
            _ => Architecture::Unknown,
        };

        let mut module = Module::new("", arch);
        for sh in &elf.section_headers {
            if sh.sh_type == elf::section_header::SHT_NULL {
                continue;
            }
            let Some(name) = elf.shdr_strtab.get_at(sh.sh_name) else {
                warn!("Skipping ELF section with unreadable name at offset 0x{:x}", sh.sh_offset);
                continue;
            };
            let allocated = sh.sh_flags & elf::section_header::SHF_ALLOC as u64 != 0;
            let interval = if sh.sh_type == elf::section_header::SHT_NOBITS {
                ByteInterval::uninitialized(sh.sh_addr, sh.sh_size)
            } else {
                ByteInterval::new(sh.sh_addr, file_bytes(img, sh.sh_offset, sh.sh_size, name)?.to_vec())
            };
            let interval = ByteInterval {
                address: interval.address.filter(|_| allocated),
                ..interval
            };
            module.add_section(Section::new(name, sh.is_executable(), vec![interval]));
        }

        if elf.entry != 0 {
            module.aux_data.raw_entries = Some(vec![elf.entry]);
        }

        // Function symbols seed code blocks; odd ARM addresses are Thumb
        for sym in elf.syms.iter().chain(elf.dynsyms.iter()) {
            if sym.st_type() != elf::sym::STT_FUNC || sym.st_value == 0 {
                continue;
            }
            if arch == Architecture::Arm && sym.st_value & 1 == 1 {
                continue;
            }
            module.add_code_block_at(sym.st_value, sym.st_size);
        }
        Ok(module)
    }

    /// Parse a PE image.
    fn parse_pe(&self, pe: pe::PE<'_>, img: &[u8]) -> Result<Module, DisassemblyError> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let image_base = pe.image_base as Address;
        let mut module = Module::new("", arch);
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let executable = (sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0;
            // raw data is file-aligned and may run past the virtual size
            let initialized = match sect.virtual_size {
                0 => sect.size_of_raw_data,
                vsize => sect.size_of_raw_data.min(vsize),
            };
            let contents = file_bytes(img, sect.pointer_to_raw_data as u64, initialized as u64, &name)?;
            let mut interval = ByteInterval::new(image_base + sect.virtual_address as Address, contents.to_vec());
            interval.size = interval.size.max(sect.virtual_size as u64);
            module.add_section(Section::new(name, executable, vec![interval]));
        }

        if pe.entry != 0 {
            module.aux_data.raw_entries = Some(vec![image_base + pe.entry as Address]);
        }
        Ok(module)
    }

    /// Parse a single-architecture Mach-O image.
    fn parse_macho(&self, macho: &MachO) -> Result<Module, DisassemblyError> {
        let arch = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Architecture::X86_32,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM => Architecture::Arm,
            cputype::CPU_TYPE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let mut module = Module::new("", arch);
        let mut text_segment = None;
        for segment in &macho.segments {
            let segname = segment.name().unwrap_or("");
            if segname == "__TEXT" {
                text_segment = Some((segment.vmaddr, segment.fileoff));
            }
            let sections = segment
                .sections()
                .map_err(|e| DisassemblyError::ParsingError(e.to_string()))?;
            for (section, data) in sections {
                let name = format!("{},{}", segname, section.name().unwrap_or(""));
                let executable = section.flags & (S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS) != 0;
                let interval = if section.flags & SECTION_TYPE == S_ZEROFILL {
                    ByteInterval::uninitialized(section.addr, section.size)
                } else {
                    ByteInterval::new(section.addr, data.to_vec())
                };
                module.add_section(Section::new(name, executable, vec![interval]));
            }
        }

        // LC_MAIN gives a file offset, LC_UNIXTHREAD an address
        let entry = match (macho.old_style_entry, text_segment) {
            (true, _) => Some(macho.entry),
            (false, Some((vmaddr, fileoff))) if macho.entry != 0 => {
                (vmaddr + macho.entry).checked_sub(fileoff)
            }
            _ => None,
        };
        module.aux_data.raw_entries = entry.filter(|&addr| addr != 0).map(|addr| vec![addr]);
        Ok(module)
    }

    /// Parse a Mach-O image.
    fn parse_mach(&self, m: Mach<'_>) -> Result<Module, DisassemblyError> {
        match m {
            Mach::Binary(binary) => self.parse_macho(&binary),
            Mach::Fat(_) => Err(DisassemblyError::ParsingError(
                "Fat Mach-O binaries are not supported; extract one architecture first".into(),
            )),
        }
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<Module, DisassemblyError> {
        let mut module = match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf, data),
            Ok(Object::PE(pe)) => self.parse_pe(pe, data),
            Ok(Object::Mach(m)) => self.parse_mach(m),
            Ok(_) => Err(DisassemblyError::ParsingError("Unsupported file format".into())),
            Err(e) => Err(DisassemblyError::ParsingError(e.to_string())),
        }?;
        for entry in module.aux_data.raw_entries.clone().unwrap_or_default() {
            if !module.add_code_block_at(entry, 0) {
                warn!("Entry point 0x{:x} lies outside initialized bytes", entry);
            }
        }
        debug!(
            "Parsed {} image with {} sections ({} executable), {} code blocks",
            module.architecture,
            module.sections.len(),
            module.executable_sections().count(),
            module.code_blocks.len()
        );
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InstructionLoader;
    use crate::sink::{FactDatabase, FactValue};
    use crate::strategy::Strategy;

    fn put(buf: &mut Vec<u8>, at: usize, bytes: &[u8]) {
        if buf.len() < at + bytes.len() {
            buf.resize(at + bytes.len(), 0);
        }
        buf[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn section_header(name: u32, sh_type: u32, flags: u64, addr: u64, offset: u64, size: u64) -> Vec<u8> {
        let mut sh = Vec::with_capacity(64);
        sh.extend_from_slice(&name.to_le_bytes());
        sh.extend_from_slice(&sh_type.to_le_bytes());
        sh.extend_from_slice(&flags.to_le_bytes());
        sh.extend_from_slice(&addr.to_le_bytes());
        sh.extend_from_slice(&offset.to_le_bytes());
        sh.extend_from_slice(&size.to_le_bytes());
        sh.extend_from_slice(&[0u8; 8]); // link, info
        sh.extend_from_slice(&1u64.to_le_bytes()); // addralign
        sh.extend_from_slice(&0u64.to_le_bytes()); // entsize
        sh
    }

    /// x86-64 executable with `.text`, `.bss` and `.shstrtab`.
    fn tiny_elf() -> Vec<u8> {
        let text = [0x55u8, 0xc3];
        let strtab = b"\0.text\0.bss\0.shstrtab\0";
        let text_off = 64;
        let strtab_off = text_off + text.len();
        let shoff = (strtab_off + strtab.len() + 7) & !7;

        let mut img = Vec::new();
        put(&mut img, 0, &[0x7f, b'E', b'L', b'F', 2, 1, 1]);
        put(&mut img, 16, &2u16.to_le_bytes()); // ET_EXEC
        put(&mut img, 18, &62u16.to_le_bytes()); // EM_X86_64
        put(&mut img, 20, &1u32.to_le_bytes());
        put(&mut img, 24, &0x401000u64.to_le_bytes());
        put(&mut img, 40, &(shoff as u64).to_le_bytes());
        put(&mut img, 52, &64u16.to_le_bytes());
        put(&mut img, 54, &56u16.to_le_bytes());
        put(&mut img, 58, &64u16.to_le_bytes());
        put(&mut img, 60, &4u16.to_le_bytes());
        put(&mut img, 62, &3u16.to_le_bytes());
        put(&mut img, text_off, &text);
        put(&mut img, strtab_off, strtab);

        let headers = [
            section_header(0, 0, 0, 0, 0, 0),
            section_header(1, 1, 0x6, 0x401000, text_off as u64, text.len() as u64),
            section_header(7, 8, 0x3, 0x402000, strtab_off as u64, 0x100),
            section_header(12, 3, 0, 0, strtab_off as u64, strtab.len() as u64),
        ];
        for (i, sh) in headers.iter().enumerate() {
            put(&mut img, shoff + i * 64, sh);
        }
        img
    }

    #[test]
    fn test_parse_elf_sections() {
        let module = GoblinParser::new().parse(&tiny_elf()).unwrap();
        assert_eq!(module.architecture, Architecture::X86_64);
        assert_eq!(module.sections.len(), 3);

        let text = module.find_section(".text").unwrap();
        assert!(text.executable);
        assert_eq!(text.byte_intervals[0], ByteInterval::new(0x401000, vec![0x55, 0xc3]));

        let bss = module.find_section(".bss").unwrap();
        assert!(!bss.executable);
        assert_eq!(bss.byte_intervals[0].size, 0x100);
        assert_eq!(bss.byte_intervals[0].initialized_size(), 0);

        let strtab = module.find_section(".shstrtab").unwrap();
        assert_eq!(strtab.byte_intervals[0].address, None);
    }

    #[test]
    fn test_parse_elf_entry_point() {
        let module = GoblinParser::new().parse(&tiny_elf()).unwrap();
        assert_eq!(module.aux_data.raw_entries, Some(vec![0x401000]));
    }

    #[test]
    fn test_entry_point_seeds_code_block() {
        let module = GoblinParser::new().parse(&tiny_elf()).unwrap();
        assert_eq!(module.code_blocks.len(), 1);
        assert_eq!(module.code_block_address(&module.code_blocks[0]), Some(0x401000));

        let loader = InstructionLoader::for_architecture(module.architecture, Strategy::CodeBlocks).unwrap();
        let mut db = FactDatabase::new();
        loader.run(&module, &mut db).unwrap();

        // push rbp at the entry point, decoded once
        let insns = db.relation("instruction");
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0][0], FactValue::from(0x401000u64));
        assert_eq!(insns[0][1], FactValue::from("PUSH"));
        assert!(db.relation("invalid_instruction").is_empty());
    }

    #[test]
    fn test_truncated_section_data() {
        let mut img = tiny_elf();
        // point .text past the end of the file
        let shoff = u64::from_le_bytes(img[40..48].try_into().unwrap()) as usize;
        put(&mut img, shoff + 64 + 24, &0x10000u64.to_le_bytes());

        let err = GoblinParser::new().parse(&img).unwrap_err();
        assert!(matches!(err, DisassemblyError::ParsingError(_)));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = GoblinParser::new().parse(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, DisassemblyError::ParsingError(_)));
    }
}
