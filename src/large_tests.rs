#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Instant;

    use crate::{
        format::{write_facts_dir, OutputFormat},
        loader::{load_entry_points, load_modules, InstructionLoader, RELATIONS},
        module::{CodeBlock, IntervalRef},
        parser::GoblinParser,
        sink::FactDatabase,
        strategy::Strategy,
        Architecture, BinaryParser, Module,
    };

    const SLICE: usize = 4096;

    // Parse /bin/ls when the host has one we can decode
    fn load_test_module() -> Option<Module> {
        let data = match fs::read("/bin/ls") {
            Ok(data) => data,
            Err(e) => {
                println!("Skipping: cannot read /bin/ls: {}", e);
                return None;
            }
        };
        let mut module = GoblinParser::new().parse(&data).ok()?;
        module.name = "ls".to_string();
        match module.architecture {
            Architecture::X86_32 | Architecture::X86_64 | Architecture::Arm | Architecture::AArch64 => Some(module),
            other => {
                println!("Skipping: no decoder for {}", other);
                None
            }
        }
    }

    // The first few KiB of .text, as a module of its own
    fn text_slice(module: &Module) -> Module {
        let text = module
            .find_section(".text")
            .or_else(|| module.executable_sections().next())
            .expect("no executable section");
        let interval = &text.byte_intervals[0];
        let len = interval.contents.len().min(SLICE);
        Module::raw(
            "ls-slice",
            module.architecture,
            interval.address.expect("text has no address"),
            interval.contents[..len].to_vec(),
        )
    }

    #[test]
    fn test_parse_ls() {
        let Some(module) = load_test_module() else { return };
        println!("Architecture: {}", module.architecture);
        assert!(module.executable_sections().count() > 0, "No executable sections found in binary");
        let entries = module.aux_data.raw_entries.as_ref().expect("no entry point");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_blind_scan_slice() {
        let Some(module) = load_test_module() else { return };
        let slice = text_slice(&module);
        let loader = InstructionLoader::for_architecture(slice.architecture, Strategy::Blind).unwrap();

        let start = Instant::now();
        let mut db = FactDatabase::new();
        loader.run(&slice, &mut db).unwrap();
        println!("Blind scan of {} bytes took {:?}", slice.sections[0].byte_intervals[0].contents.len(), start.elapsed());

        let len = slice.sections[0].byte_intervals[0].contents.len();
        let stride = if matches!(slice.architecture, Architecture::Arm | Architecture::AArch64) { 4 } else { 1 };
        let attempts = db.relation("instruction").len() + db.relation("invalid_instruction").len();
        assert_eq!(attempts, len.div_ceil(stride));
        assert!(!db.relation("instruction").is_empty());
        for relation in RELATIONS {
            assert!(db.contains_relation(relation));
        }
    }

    #[test]
    fn test_code_block_scan_slice() {
        let Some(module) = load_test_module() else { return };
        let mut slice = text_slice(&module);
        for offset in [0u64, 16, 64] {
            slice.code_blocks.push(CodeBlock {
                interval: IntervalRef { section: 0, interval: 0 },
                offset,
                size: 4,
            });
        }
        let loader = InstructionLoader::for_architecture(slice.architecture, Strategy::CodeBlocks).unwrap();

        let mut db = FactDatabase::new();
        loader.run(&slice, &mut db).unwrap();
        let attempts = db.relation("instruction").len() + db.relation("invalid_instruction").len();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_batch_and_output() {
        let Some(module) = load_test_module() else { return };
        let slice = text_slice(&module);
        let mut results = load_modules(&[slice], Strategy::Blind);
        let mut db = results.remove(0).unwrap();
        load_entry_points(&module, &mut db);
        assert_eq!(db.relation("entry_point").len(), 1);

        for format in OutputFormat::available_formats() {
            let output = format.get_formatter().format(&db).unwrap();
            assert!(!output.is_empty(), "{} output is empty", format);
        }

        let dir = tempfile::tempdir().unwrap();
        let written = write_facts_dir(&db, dir.path()).unwrap();
        assert_eq!(written.len(), RELATIONS.len() + 1);
        assert!(dir.path().join("instruction.facts").exists());
    }
}
