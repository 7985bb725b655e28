//! Fact sink interface and an in-memory relation store.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// One column value of a fact tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    /// An address or other unsigned number
    Unsigned(u64),
    /// A signed number (immediates, displacements)
    Signed(i64),
    /// A floating-point number
    Float(f64),
    /// A symbol (mnemonics, register names)
    Symbol(String),
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Unsigned(v) => write!(f, "{}", v),
            FactValue::Signed(v) => write!(f, "{}", v),
            FactValue::Float(v) => write!(f, "{}", v),
            FactValue::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for FactValue {
    fn from(v: u64) -> Self {
        FactValue::Unsigned(v)
    }
}

impl From<u8> for FactValue {
    fn from(v: u8) -> Self {
        FactValue::Unsigned(v as u64)
    }
}

impl From<usize> for FactValue {
    fn from(v: usize) -> Self {
        FactValue::Unsigned(v as u64)
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Signed(v)
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        FactValue::Float(v)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Symbol(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::Symbol(s)
    }
}

/// One row of a relation.
pub type Tuple = Vec<FactValue>;

/// Build a [`Tuple`] from values convertible into [`FactValue`].
#[macro_export]
macro_rules! tuple {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::sink::FactValue::from($value)),*]
    };
}

/// Receiver of named relations.
pub trait FactSink {
    /// Append `tuples` to `relation`. Inserting an empty set still declares
    /// the relation.
    fn insert(&mut self, relation: &str, tuples: Vec<Tuple>);
}

/// In-memory relation store, ordered by relation name.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FactDatabase {
    relations: BTreeMap<String, Vec<Tuple>>,
}

impl FactDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tuples of `relation`, empty if it was never inserted.
    pub fn relation(&self, relation: &str) -> &[Tuple] {
        self.relations
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_relation(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &[Tuple])> {
        self.relations
            .iter()
            .map(|(name, tuples)| (name.as_str(), tuples.as_slice()))
    }

    /// Total number of tuples across all relations.
    pub fn len(&self) -> usize {
        self.relations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FactSink for FactDatabase {
    fn insert(&mut self, relation: &str, tuples: Vec<Tuple>) {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .extend(tuples);
    }
}
