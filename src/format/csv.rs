//! Tab-separated output: one stream for the whole database, or one
//! `.facts` file per relation.

use std::fs;
use std::path::{Path, PathBuf};

use ::csv::{QuoteStyle, Writer, WriterBuilder};
use log::debug;

use super::FactFormatter;
use crate::sink::{FactDatabase, Tuple};
use crate::DisassemblyError;

fn csv_error(e: impl std::fmt::Display) -> DisassemblyError {
    DisassemblyError::FormatError(format!("TSV serialization error: {}", e))
}

fn tsv_builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b'\t')
        .flexible(true)
        .has_headers(false)
        .quote_style(QuoteStyle::Never);
    builder
}

fn write_tuples<W: std::io::Write>(wtr: &mut Writer<W>, prefix: Option<&str>, tuples: &[Tuple]) -> Result<(), DisassemblyError> {
    for tuple in tuples {
        let fields = prefix
            .map(str::to_string)
            .into_iter()
            .chain(tuple.iter().map(|v| v.to_string()));
        wtr.write_record(fields).map_err(csv_error)?;
    }
    Ok(())
}

impl FactFormatter for super::CsvFormatter {
    fn format(&self, db: &FactDatabase) -> Result<String, DisassemblyError> {
        let mut wtr = tsv_builder().from_writer(Vec::new());
        for (relation, tuples) in db.relations() {
            write_tuples(&mut wtr, Some(relation), tuples)?;
        }
        let bytes = wtr.into_inner().map_err(csv_error)?;
        String::from_utf8(bytes).map_err(csv_error)
    }
}

/// Write one `<relation>.facts` file per relation into `dir`.
///
/// Empty relations still get an (empty) file. Returns the written paths.
pub fn write_facts_dir(db: &FactDatabase, dir: &Path) -> Result<Vec<PathBuf>, DisassemblyError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (relation, tuples) in db.relations() {
        let path = dir.join(format!("{}.facts", relation));
        let mut wtr = tsv_builder().from_path(&path).map_err(csv_error)?;
        write_tuples(&mut wtr, None, tuples)?;
        wtr.flush()?;
        written.push(path);
    }
    debug!("Wrote {} relations to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::sample_db;
    use crate::format::CsvFormatter;
    use crate::sink::FactSink;
    use crate::tuple;

    #[test]
    fn test_tsv_stream() {
        let output = CsvFormatter.format(&sample_db()).unwrap();
        assert_eq!(
            output,
            "instruction\t4096\tPUSH\t1\t0\t0\t0\t1\n\
             instruction\t4097\tRET\t0\t0\t0\t0\t1\n\
             op_register\t1\tRBP\n"
        );
    }

    #[test]
    fn test_fields_are_never_quoted() {
        let mut db = FactDatabase::new();
        db.insert("invalid", vec![tuple![0x10u64, "say \"hi\""], tuple![0x20u64, "a b"]]);

        let output = CsvFormatter.format(&db).unwrap();
        assert_eq!(output, "invalid\t16\tsay \"hi\"\ninvalid\t32\ta b\n");

        let dir = tempfile::tempdir().unwrap();
        write_facts_dir(&db, dir.path()).unwrap();
        let facts = fs::read_to_string(dir.path().join("invalid.facts")).unwrap();
        assert_eq!(facts, "16\tsay \"hi\"\n32\ta b\n");
    }

    #[test]
    fn test_write_facts_dir() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_facts_dir(&sample_db(), dir.path()).unwrap();
        assert_eq!(written.len(), 3);

        let regs = fs::read_to_string(dir.path().join("op_register.facts")).unwrap();
        assert_eq!(regs, "1\tRBP\n");
        let invalid = fs::read_to_string(dir.path().join("invalid_instruction.facts")).unwrap();
        assert!(invalid.is_empty());
    }
}
