use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layout::FieldKey;

/// Decimal-separator convention of the *input* file. The output layout always
/// uses a period regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalSeparator {
    /// Brazilian convention: `1.234,56`.
    #[serde(rename = "virgula")]
    Comma,
    /// US convention: `1,234.56`.
    #[serde(rename = "ponto")]
    Period,
}

impl TryFrom<&str> for DecimalSeparator {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "virgula" | "," => Ok(DecimalSeparator::Comma),
            "ponto" | "." => Ok(DecimalSeparator::Period),
            other => Err(format!("separador decimal desconhecido '{other}'")),
        }
    }
}

/// Per-run validation settings chosen by the caller at submission time.
#[derive(Debug, Clone, Copy)]
pub struct RunParameters {
    pub decimal_separator: DecimalSeparator,
    /// Verify CPF/CNPJ check digits in addition to the length check.
    pub validate_check_digits: bool,
}

/// Declaration-level data for the header line, supplied by the caller rather
/// than the spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct HeaderData {
    pub inscricao_municipal: String,
    pub mes: String,
    pub ano: String,
    pub razao_social: String,
    pub codigo_servico: String,
}

impl HeaderData {
    /// Names of required header fields left blank, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.inscricao_municipal.trim().is_empty() {
            missing.push("inscricao_municipal");
        }
        if self.mes.trim().is_empty() {
            missing.push("mes");
        }
        if self.ano.trim().is_empty() {
            missing.push("ano");
        }
        if self.razao_social.trim().is_empty() {
            missing.push("razao_social");
        }
        if self.codigo_servico.trim().is_empty() {
            missing.push("codigo_servico");
        }
        missing
    }
}

/// One source row as read from the input file: ordered (header, cell) pairs
/// plus the 1-indexed file line it came from (the header row is line 1).
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub line: usize,
    pub cells: Vec<(String, String)>,
}

impl RawRecord {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

/// A row keyed by canonical field instead of spreadsheet header.
#[derive(Debug, Clone, Default)]
pub struct CanonicalRecord {
    values: BTreeMap<FieldKey, String>,
}

impl CanonicalRecord {
    pub fn insert(&mut self, key: FieldKey, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// True when the field is absent or holds only whitespace.
    pub fn is_blank(&self, key: FieldKey) -> bool {
        self.get(key).map_or(true, |v| v.trim().is_empty())
    }
}

/// A record after transformation: every field rendered in its final output
/// encoding, ready for positional assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformedRecord {
    values: BTreeMap<FieldKey, String>,
}

impl TransformedRecord {
    pub fn insert(&mut self, key: FieldKey, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: FieldKey) -> &str {
        self.values.get(&key).map(String::as_str).unwrap_or("")
    }
}

/// Errors collected for one rejected source row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowReport {
    pub line: usize,
    pub errors: Vec<String>,
}

/// Outcome of validating one row.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Accepted(TransformedRecord),
    Rejected(RowReport),
}
