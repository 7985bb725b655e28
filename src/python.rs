//! Python bindings for the nuclide_facts loader

use clap::ValueEnum;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::format::OutputFormat;
use crate::loader::{load_entry_points, InstructionLoader};
use crate::parser::GoblinParser;
use crate::sink::FactDatabase;
use crate::strategy::Strategy;
use crate::BinaryParser;

/// Load facts from binary data and return them in the requested format
#[pyfunction]
#[pyo3(signature = (binary_data, strategy="blind", output_format="text"))]
fn load_facts(binary_data: Vec<u8>, strategy: &str, output_format: &str) -> PyResult<String> {
    let strategy = Strategy::from_str(strategy, true).map_err(PyValueError::new_err)?;
    let output_format: OutputFormat = output_format.parse().map_err(PyValueError::new_err)?;

    let module = GoblinParser::new()
        .parse(&binary_data)
        .map_err(|e| PyValueError::new_err(format!("Failed to parse binary: {}", e)))?;
    let loader = InstructionLoader::for_architecture(module.architecture, strategy)
        .map_err(|e| PyValueError::new_err(format!("Failed to create loader: {}", e)))?;

    let mut db = FactDatabase::new();
    loader
        .run(&module, &mut db)
        .map_err(|e| PyValueError::new_err(format!("Loading failed: {}", e)))?;
    load_entry_points(&module, &mut db);

    output_format
        .get_formatter()
        .format(&db)
        .map_err(|e| PyValueError::new_err(format!("Failed to format output: {}", e)))
}

/// Load facts from a file on disk
#[pyfunction]
#[pyo3(signature = (file_path, strategy="blind", output_format="text"))]
fn load_facts_file(file_path: &str, strategy: &str, output_format: &str) -> PyResult<String> {
    let bytes = std::fs::read(file_path)
        .map_err(|e| PyIOError::new_err(format!("Failed to read file {}: {}", file_path, e)))?;
    load_facts(bytes, strategy, output_format)
}

/// Python module initialization
#[pymodule]
fn nuclide_facts(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(load_facts, m)?)?;
    m.add_function(wrap_pyfunction!(load_facts_file, m)?)?;

    let py = m.py();
    let output_format = PyDict::new(py);
    for format in OutputFormat::available_formats() {
        output_format.set_item(format.to_string().to_uppercase(), format.to_string())?;
    }
    m.setattr("OutputFormat", output_format)?;

    let strategy = PyDict::new(py);
    for value in Strategy::value_variants() {
        if let Some(name) = value.to_possible_value() {
            strategy.set_item(name.get_name().replace('-', "_").to_uppercase(), name.get_name())?;
        }
    }
    m.setattr("Strategy", strategy)?;

    Ok(())
}
