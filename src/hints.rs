//! User-provided hints: extra facts read from a tab-separated file.
//!
//! Each line is `predicate<TAB>address<TAB>fields...`. Malformed lines are
//! reported and skipped; they never abort loading.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ::csv::{Reader, ReaderBuilder};
use log::{info, warn};

use crate::sink::{FactSink, FactValue, Tuple};
use crate::{Address, DisassemblyError, Module};

/// Known hint predicates and their arity, address included.
pub const HINT_PREDICATES: &[(&str, usize)] = &[("invalid", 2)];

/// Parse a decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(text: &str) -> Option<Address> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => Address::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn tsv_reader<R: Read>(reader: R) -> Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader)
}

/// Read hints from `reader` and insert them into `sink`.
///
/// Every known predicate is declared, even with no hints. Returns the
/// number of hints accepted.
pub fn load_hints<R: Read>(reader: R, sink: &mut dyn FactSink) -> Result<usize, DisassemblyError> {
    let mut rdr = tsv_reader(reader);

    let mut tables: Vec<Vec<Tuple>> = vec![Vec::new(); HINT_PREDICATES.len()];
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable hint: {}", e);
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());
        let Some(predicate) = record.get(0) else {
            continue;
        };
        let Some(slot) = HINT_PREDICATES.iter().position(|(name, _)| *name == predicate) else {
            warn!("Ignoring hint on line {}: unknown predicate '{}'", line, predicate);
            continue;
        };
        let arity = HINT_PREDICATES[slot].1;
        let fields: Vec<&str> = record.iter().skip(1).collect();
        if fields.len() < arity {
            warn!(
                "Ignoring hint on line {}: '{}' expects {} fields, got {}",
                line,
                predicate,
                arity,
                fields.len()
            );
            continue;
        }
        let Some(addr) = parse_address(fields[0]) else {
            warn!("Ignoring hint on line {}: bad address '{}'", line, fields[0]);
            continue;
        };
        if fields.len() > arity {
            warn!(
                "Hint on line {}: dropping {} extra fields",
                line,
                fields.len() - arity
            );
        }

        let mut tuple = vec![FactValue::from(addr)];
        tuple.extend(fields[1..arity].iter().map(|f| FactValue::from(*f)));
        tables[slot].push(tuple);
    }

    let mut accepted = 0;
    for ((predicate, _), tuples) in HINT_PREDICATES.iter().zip(tables) {
        accepted += tuples.len();
        sink.insert(predicate, tuples);
    }
    info!("Loaded {} user hints", accepted);
    Ok(accepted)
}

/// Read hints from the file at `path`.
pub fn load_hints_file(path: &Path, sink: &mut dyn FactSink) -> Result<usize, DisassemblyError> {
    let file = File::open(path)?;
    load_hints(file, sink)
}

/// Add code blocks listed as `address[<TAB>size]` lines to `module`.
///
/// Lines with a bad address or size, and addresses outside the module's
/// initialized bytes, are reported and skipped. Returns the number of
/// lines accepted.
pub fn load_code_blocks<R: Read>(reader: R, module: &mut Module) -> Result<usize, DisassemblyError> {
    let mut rdr = tsv_reader(reader);
    let mut accepted = 0;
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable code block: {}", e);
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());
        let Some(addr) = record.get(0).and_then(parse_address) else {
            warn!("Ignoring code block on line {}: bad address", line);
            continue;
        };
        let size = match record.get(1) {
            Some(text) => match parse_address(text) {
                Some(size) => size,
                None => {
                    warn!("Ignoring code block on line {}: bad size '{}'", line, text);
                    continue;
                }
            },
            None => 0,
        };
        if !module.add_code_block_at(addr, size) {
            warn!("Ignoring code block on line {}: 0x{:x} is not in initialized bytes", line, addr);
            continue;
        }
        accepted += 1;
    }
    info!("Loaded {} code blocks into '{}'", accepted, module.name);
    Ok(accepted)
}

/// Read code blocks from the file at `path`.
pub fn load_code_blocks_file(path: &Path, module: &mut Module) -> Result<usize, DisassemblyError> {
    let file = File::open(path)?;
    load_code_blocks(file, module)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::loader::InstructionLoader;
    use crate::sink::FactDatabase;
    use crate::strategy::Strategy;
    use crate::{tuple, Architecture};

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("4096"), Some(4096));
        assert_eq!(parse_address("0x1000"), Some(0x1000));
        assert_eq!(parse_address("0XfF"), Some(0xff));
        assert_eq!(parse_address("not-address"), None);
        assert_eq!(parse_address("0x"), None);
    }

    #[test]
    fn test_bad_hints_are_skipped() {
        let hints = "not-a-real-predicate\t10\n\
                     invalid\tnot-address\tbad-hint\n\
                     invalid\t0x100000\n\
                     invalid\t0x0\tuser-provided-extra-field\tthe-extra-field\n\
                     invalid\t4198694\tuser-provided-hint\n";
        let mut db = FactDatabase::new();
        let accepted = load_hints(hints.as_bytes(), &mut db).unwrap();

        assert_eq!(accepted, 2);
        assert_eq!(
            db.relation("invalid"),
            &[
                tuple![0u64, "user-provided-extra-field"],
                tuple![4198694u64, "user-provided-hint"],
            ]
        );
    }

    #[test]
    fn test_empty_hints_declare_relations() {
        let mut db = FactDatabase::new();
        assert_eq!(load_hints("".as_bytes(), &mut db).unwrap(), 0);
        assert!(db.contains_relation("invalid"));
    }

    #[test]
    fn test_load_hints_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid\t0x401000\tmanual").unwrap();
        file.flush().unwrap();

        let mut db = FactDatabase::new();
        load_hints_file(file.path(), &mut db).unwrap();
        assert_eq!(db.relation("invalid"), &[tuple![0x401000u64, "manual"]]);
    }

    #[test]
    fn test_load_code_blocks() {
        let mut module = Module::raw("m", Architecture::X86_64, 0x1000, vec![0x90; 32]);
        let blocks = "0x1000\t4\n\
                      4112\n\
                      0x1010\t8\n\
                      0x9000\t4\n\
                      junk\t4\n\
                      0x1004\tbig\n";
        let accepted = load_code_blocks(blocks.as_bytes(), &mut module).unwrap();

        assert_eq!(accepted, 3);
        let addrs: Vec<_> = module
            .code_blocks
            .iter()
            .map(|b| module.code_block_address(b).unwrap())
            .collect();
        assert_eq!(addrs, vec![0x1000, 0x1010]);
        assert_eq!(module.code_blocks[0].size, 4);
    }

    #[test]
    fn test_code_blocks_drive_block_scan() {
        let mut module = Module::raw("m", Architecture::X86_64, 0x1000, vec![0x55, 0x90, 0xc3]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x1000\t1").unwrap();
        writeln!(file, "0x1002\t1").unwrap();
        file.flush().unwrap();
        load_code_blocks_file(file.path(), &mut module).unwrap();

        let loader = InstructionLoader::for_architecture(module.architecture, Strategy::CodeBlocks).unwrap();
        let mut db = FactDatabase::new();
        loader.run(&module, &mut db).unwrap();

        let mnemonics: Vec<String> = db.relation("instruction").iter().map(|row| row[1].to_string()).collect();
        assert_eq!(mnemonics, vec!["PUSH", "RET"]);
    }

    #[test]
    fn test_missing_hints_file() {
        let mut db = FactDatabase::new();
        let err = load_hints_file(Path::new("/nonexistent/hints.tsv"), &mut db).unwrap_err();
        assert!(matches!(err, DisassemblyError::IoError(_)));
    }
}
