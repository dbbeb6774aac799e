//! Per-element input records with tagged keys, e.g. `MAT 1 KINEM nonlinear GP 3 3 3`.
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::str::FromStr;

/// One key of a record schema.
#[derive(Debug, Clone, Copy)]
pub struct LineEntry {
    pub key: &'static str,
    pub arity: usize,
    pub required: bool,
}

/// The keys an element kernel understands.
#[derive(Debug, Clone)]
pub struct LineSchema {
    entries: Vec<LineEntry>,
    /// Whether unknown keys (and their values) are skipped instead of rejected.
    tolerant: bool,
}

impl LineSchema {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            tolerant: false,
        }
    }

    pub fn required(mut self, key: &'static str, arity: usize) -> Self {
        self.entries.push(LineEntry {
            key,
            arity,
            required: true,
        });
        self
    }

    pub fn optional(mut self, key: &'static str, arity: usize) -> Self {
        self.entries.push(LineEntry {
            key,
            arity,
            required: false,
        });
        self
    }

    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    fn entry(&self, key: &str) -> Option<&LineEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }
}

impl Default for LineSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineDefinition {
    values: BTreeMap<String, Vec<String>>,
}

impl LineDefinition {
    pub fn parse(line: &str, schema: &LineSchema) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut values = BTreeMap::new();
        let mut pos = 0;
        while pos < tokens.len() {
            let key = tokens[pos];
            match schema.entry(key) {
                Some(entry) => {
                    let end = pos + 1 + entry.arity;
                    if end > tokens.len() {
                        return Err(Error::Configuration(format!(
                            "Key {} expects {} values in \"{}\"",
                            key, entry.arity, line
                        )));
                    }
                    let entry_values = tokens[pos + 1..end].iter().map(|s| s.to_string()).collect();
                    if values.insert(key.to_string(), entry_values).is_some() {
                        return Err(Error::Configuration(format!("Duplicate key {} in \"{}\"", key, line)));
                    }
                    pos = end;
                }
                None if schema.tolerant => {
                    // Skip the unknown key and all values up to the next known key
                    pos += 1;
                    while pos < tokens.len() && schema.entry(tokens[pos]).is_none() {
                        pos += 1;
                    }
                }
                None => {
                    return Err(Error::Configuration(format!("Unknown key {} in \"{}\"", key, line)));
                }
            }
        }

        if let Some(missing) = schema
            .entries
            .iter()
            .find(|entry| entry.required && !values.contains_key(entry.key))
        {
            return Err(Error::Configuration(format!(
                "Missing required key {} in \"{}\"",
                missing.key, line
            )));
        }
        Ok(Self { values })
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn words(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn word(&self, key: &str) -> Option<&str> {
        self.words(key).and_then(|words| words.first()).map(String::as_str)
    }

    pub fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<Vec<T>>> {
        self.words(key)
            .map(|words| {
                words
                    .iter()
                    .map(|word| {
                        word.parse::<T>().map_err(|_| {
                            Error::Configuration(format!("Invalid value \"{}\" for key {}", word, key))
                        })
                    })
                    .collect::<Result<Vec<T>>>()
            })
            .transpose()
    }

    pub fn int(&self, key: &str) -> Result<Option<usize>> {
        Ok(self.parsed::<usize>(key)?.and_then(|v| v.first().copied()))
    }

    pub fn ints(&self, key: &str) -> Result<Option<Vec<usize>>> {
        self.parsed(key)
    }

    pub fn real(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.parsed::<f64>(key)?.and_then(|v| v.first().copied()))
    }
}
