//! Output encodings for accepted records.
//!
//! Transformation is total over the accepted domain: every value reaching
//! this module has already passed validation, so each function degrades to a
//! neutral encoding (`""`, `"0.00"`, `"0"`) instead of failing.

use chrono::NaiveDate;

use crate::layout::FieldKey;
use crate::types::{CanonicalRecord, DecimalSeparator, RunParameters, TransformedRecord};

/// Keeps only ASCII digits, truncated to the field width.
/// Ex: `"11.222.333/0001-44"` → `"11222333000144"`.
pub fn clean_digits(value: &str, max_len: usize) -> String {
    let mut cleaned: String = value.chars().filter(char::is_ascii_digit).collect();
    cleaned.truncate(max_len);
    cleaned
}

/// Trims, flattens line breaks that would corrupt the positional layout, and
/// truncates to the field width.
pub fn clean_text(value: &str, max_len: usize) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    cleaned.chars().take(max_len).collect()
}

/// Parses a decimal under the configured input convention, stripping `R$`
/// prefixes and thousands separators first.
pub fn parse_decimal(value: &str, separator: DecimalSeparator) -> Option<f64> {
    let stripped = value.replace("R$", "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return None;
    }

    let normalized = match separator {
        DecimalSeparator::Comma => stripped.replace('.', "").replace(',', "."),
        DecimalSeparator::Period => stripped.replace(',', ""),
    };
    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    cleaned.parse::<f64>().ok()
}

/// Day-first flexible date parsing covering the formats users actually send.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    const FORMATS: [&str; 5] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y", "%d.%m.%Y"];
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Renders a date as `ddmmyyyy`, the only form the layout accepts.
pub fn transform_date(value: &str) -> String {
    parse_date(value)
        .map(|date| date.format("%d%m%Y").to_string())
        .unwrap_or_default()
}

/// Renders a monetary value with two decimals and a period separator.
/// Ex: `"R$ 1.234,56"` (comma convention) → `"1234.56"`.
pub fn transform_monetary(value: &str, separator: DecimalSeparator) -> String {
    match parse_decimal(value, separator) {
        Some(parsed) => format!("{parsed:.2}"),
        None => "0.00".to_string(),
    }
}

/// Renders the tax rate with one decimal (`"5.0"`). Rates of 10 or more are
/// rendered as bare integers so the value still fits the 3-character field.
pub fn transform_aliquota(value: &str, separator: DecimalSeparator) -> String {
    let normalized = match separator {
        DecimalSeparator::Comma => value.trim().replace(',', "."),
        DecimalSeparator::Period => value.trim().to_string(),
    };
    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(parsed) if parsed >= 10.0 => format!("{}", parsed as i64),
        Ok(parsed) => format!("{parsed:.1}"),
        Err(_) => "0.0".to_string(),
    }
}

/// Renders boolean-like input as `1`/`0`; blank means "no".
pub fn transform_boolean(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "1" | "s" | "sim" | "true" | "t" | "verdadeiro" => "1",
        _ => "0",
    }
    .to_string()
}

/// Applies the layout encodings to every field of an accepted record.
pub fn transform_record(record: &CanonicalRecord, params: &RunParameters) -> TransformedRecord {
    let sep = params.decimal_separator;
    let field = |key: FieldKey| record.get(key).unwrap_or("");

    let mut out = TransformedRecord::default();
    out.insert(FieldKey::Modelo, clean_digits(field(FieldKey::Modelo), 3));
    out.insert(
        FieldKey::NumeroDocumento,
        clean_digits(field(FieldKey::NumeroDocumento), 50),
    );
    out.insert(
        FieldKey::ValorTributavel,
        transform_monetary(field(FieldKey::ValorTributavel), sep),
    );
    out.insert(
        FieldKey::ValorDocumento,
        transform_monetary(field(FieldKey::ValorDocumento), sep),
    );
    out.insert(
        FieldKey::Aliquota,
        transform_aliquota(field(FieldKey::Aliquota), sep),
    );
    out.insert(
        FieldKey::DataEmissao,
        transform_date(field(FieldKey::DataEmissao)),
    );
    out.insert(
        FieldKey::DataPagamento,
        transform_date(field(FieldKey::DataPagamento)),
    );
    out.insert(
        FieldKey::CpfCnpjPrestador,
        clean_digits(field(FieldKey::CpfCnpjPrestador), 14),
    );
    out.insert(
        FieldKey::RazaoSocialPrestador,
        clean_text(field(FieldKey::RazaoSocialPrestador), 150),
    );
    out.insert(
        FieldKey::InscricaoMunicipalPrestador,
        clean_text(field(FieldKey::InscricaoMunicipalPrestador), 15),
    );
    out.insert(
        FieldKey::ImpostoRetido,
        transform_boolean(field(FieldKey::ImpostoRetido)),
    );
    out.insert(
        FieldKey::CepPrestador,
        clean_digits(field(FieldKey::CepPrestador), 8),
    );
    out.insert(
        FieldKey::EnderecoPrestador,
        clean_text(field(FieldKey::EnderecoPrestador), 200),
    );
    out.insert(
        FieldKey::NumeroEndereco,
        clean_digits(field(FieldKey::NumeroEndereco), 6),
    );
    out.insert(
        FieldKey::BairroPrestador,
        clean_text(field(FieldKey::BairroPrestador), 50),
    );
    out.insert(
        FieldKey::CidadePrestador,
        clean_text(field(FieldKey::CidadePrestador), 50),
    );
    out.insert(
        FieldKey::UfPrestador,
        clean_text(field(FieldKey::UfPrestador), 2).to_uppercase(),
    );
    out.insert(FieldKey::Ddd, clean_digits(field(FieldKey::Ddd), 2));
    out.insert(
        FieldKey::TributadoMunicipio,
        transform_boolean(field(FieldKey::TributadoMunicipio)),
    );
    out.insert(FieldKey::ItemLc, clean_digits(field(FieldKey::ItemLc), 4));
    out.insert(
        FieldKey::UnidadeEconomica,
        transform_boolean(field(FieldKey::UnidadeEconomica)),
    );
    out
}
