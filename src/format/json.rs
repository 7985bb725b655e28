//! JSON and JSON Lines output formatters

use serde_json::json;

use super::FactFormatter;
use crate::sink::FactDatabase;
use crate::DisassemblyError;

fn json_error(e: serde_json::Error) -> DisassemblyError {
    DisassemblyError::FormatError(format!("JSON serialization error: {}", e))
}

impl FactFormatter for super::JsonFormatter {
    fn format(&self, db: &FactDatabase) -> Result<String, DisassemblyError> {
        serde_json::to_string_pretty(db).map_err(json_error)
    }
}

impl FactFormatter for super::JsonLinesFormatter {
    fn format(&self, db: &FactDatabase) -> Result<String, DisassemblyError> {
        let mut output = String::new();
        for (relation, tuples) in db.relations() {
            for tuple in tuples {
                let line = json!({
                    "relation": relation,
                    "tuple": tuple,
                });
                output.push_str(&serde_json::to_string(&line).map_err(json_error)?);
                output.push('\n');
            }
        }
        Ok(output)
    }
}
