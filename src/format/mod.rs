//! Output formats for fact databases

mod csv;
mod json;

pub use self::csv::*;
pub use self::json::*;

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use clap::ValueEnum;

use crate::sink::{FactDatabase, FactValue};
use crate::DisassemblyError;

/// Supported output formats for loaded facts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Datalog-style facts, one per line (default)
    #[default]
    Text,
    /// JSON object mapping relation names to tuple lists
    Json,
    /// JSON Lines format (one JSON object per tuple)
    #[value(name = "jsonl")]
    JsonLines,
    /// Tab-separated values, relation name first
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" | "tsv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn FactFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for fact output
pub trait FactFormatter {
    /// Render every relation of `db`
    fn format(&self, db: &FactDatabase) -> Result<String, DisassemblyError>;
}

/// Format facts as `relation(v1, v2, ...).` lines
pub struct TextFormatter;

/// Format facts as one JSON object
pub struct JsonFormatter;

/// Format facts in JSON Lines
pub struct JsonLinesFormatter;

/// Format facts as tab-separated values
pub struct CsvFormatter;

fn text_value(value: &FactValue) -> String {
    match value {
        FactValue::Symbol(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

impl FactFormatter for TextFormatter {
    fn format(&self, db: &FactDatabase) -> Result<String, DisassemblyError> {
        let mut output = String::new();
        for (relation, tuples) in db.relations() {
            for tuple in tuples {
                let values: Vec<String> = tuple.iter().map(text_value).collect();
                writeln!(output, "{}({}).", relation, values.join(", "))
                    .map_err(|e| DisassemblyError::FormatError(e.to_string()))?;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sink::FactSink;
    use crate::tuple;

    pub(crate) fn sample_db() -> FactDatabase {
        let mut db = FactDatabase::new();
        db.insert(
            "instruction",
            vec![
                tuple![0x1000u64, "PUSH", 1u64, 0u64, 0u64, 0u64, 1u64],
                tuple![0x1001u64, "RET", 0u64, 0u64, 0u64, 0u64, 1u64],
            ],
        );
        db.insert("op_register", vec![tuple![1u64, "RBP"]]);
        db.insert("invalid_instruction", Vec::new());
        db
    }

    #[test]
    fn test_text_formatter() {
        let result = TextFormatter.format(&sample_db()).unwrap();
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"instruction(4096, "PUSH", 1, 0, 0, 0, 1)."#,
                r#"instruction(4097, "RET", 0, 0, 0, 0, 1)."#,
                r#"op_register(1, "RBP")."#,
            ]
        );
    }

    #[test]
    fn test_format_names() {
        assert_eq!("jsonl".parse::<OutputFormat>(), Ok(OutputFormat::JsonLines));
        assert_eq!("TSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
        for format in OutputFormat::available_formats() {
            assert_eq!(format.to_string().parse::<OutputFormat>(), Ok(*format));
        }
    }

    #[test]
    fn test_format_selection() {
        let db = sample_db();
        for format in OutputFormat::available_formats() {
            let output = format.get_formatter().format(&db).unwrap();
            assert!(output.contains("RBP"), "{} output lost a symbol", format);
        }
    }
}
