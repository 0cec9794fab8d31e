//! Per-row validation rules.
//!
//! Each function checks one format or business rule and returns the
//! user-facing message on violation. [`RowValidator::validate`] runs every
//! applicable rule and collects all violations, so a declarant sees the
//! complete list of problems for a row at once instead of fixing them one
//! resubmission at a time.

use std::collections::HashSet;

use crate::layout::FieldKey;
use crate::transform::{parse_date, parse_decimal};
use crate::types::{CanonicalRecord, DecimalSeparator, RunParameters};

/// Message attached to a row whose only failure is repeating an earlier
/// (document, provider) pair.
pub const DUPLICATE_MESSAGE: &str =
    "Erro de Duplicidade: Esta nota (Nº Documento + Prestador) está duplicada no arquivo.";

const MONETARY_MAX_LEN: usize = 10;

fn digits_of(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Digits-only field: presence (when required) and maximum digit count.
pub fn validate_numeric(value: Option<&str>, required: bool, max_len: usize) -> Result<(), String> {
    if is_blank(value) {
        if required {
            return Err("Campo obrigatório não preenchido.".to_string());
        }
        return Ok(());
    }

    let digits = digits_of(value.unwrap_or_default());
    if digits.is_empty() {
        if required {
            return Err("Campo obrigatório contém apenas caracteres não numéricos.".to_string());
        }
        // Optional fields may hold placeholders like "S/N".
        return Ok(());
    }

    if digits.len() > max_len {
        return Err(format!(
            "Deve ter no máximo {max_len} dígitos (recebeu {}).",
            digits.len()
        ));
    }
    Ok(())
}

/// Monetary field: parseable under the configured separator convention and
/// small enough to fit the layout's 10-character slot.
pub fn validate_decimal(
    value: Option<&str>,
    required: bool,
    separator: DecimalSeparator,
) -> Result<(), String> {
    if is_blank(value) {
        if required {
            return Err("Campo obrigatório não preenchido.".to_string());
        }
        return Ok(());
    }

    let raw = value.unwrap_or_default();
    let Some(parsed) = parse_decimal(raw, separator) else {
        return Err(format!("Valor '{raw}' não é um decimal válido."));
    };

    let formatted = format!("{parsed:.2}");
    let integer_digits = formatted.split('.').next().unwrap_or_default().len();
    if integer_digits > MONETARY_MAX_LEN - 3 {
        return Err(format!(
            "Valor excede o máximo de {MONETARY_MAX_LEN} caracteres (ex: 1234567.89)."
        ));
    }
    Ok(())
}

/// Tax rate: required, numeric, inside [0, 100].
pub fn validate_aliquota(value: Option<&str>, separator: DecimalSeparator) -> Result<(), String> {
    if is_blank(value) {
        return Err("Alíquota é obrigatória.".to_string());
    }

    let raw = value.unwrap_or_default();
    let normalized = match separator {
        DecimalSeparator::Comma => raw.trim().replace(',', "."),
        DecimalSeparator::Period => raw.trim().to_string(),
    };
    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let Ok(parsed) = cleaned.parse::<f64>() else {
        return Err(format!("Alíquota '{raw}' não é um número válido."));
    };
    if !(0.0..=100.0).contains(&parsed) {
        return Err(format!("Alíquota '{parsed}%' fora do intervalo (0-100)."));
    }
    Ok(())
}

/// CPF/CNPJ: required, 11 or 14 digits, check digits verified when enabled.
pub fn validate_cpf_cnpj(value: Option<&str>, check_digits: bool) -> Result<(), String> {
    validate_numeric(value, true, 14)?;

    let digits = digits_of(value.unwrap_or_default());
    match digits.len() {
        11 => {
            if check_digits && !cpf_check_digits_valid(&digits) {
                return Err("CPF inválido (dígito verificador não confere).".to_string());
            }
            Ok(())
        }
        14 => {
            if check_digits && !cnpj_check_digits_valid(&digits) {
                return Err("CNPJ inválido (dígito verificador não confere).".to_string());
            }
            Ok(())
        }
        len => Err(format!("CPF/CNPJ deve ter 11 ou 14 dígitos (recebeu {len}).")),
    }
}

fn digit_values(digits: &str) -> Vec<u32> {
    digits.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(values: &[u32]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

fn mod11_digit(sum: u32) -> u32 {
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}

pub fn cpf_check_digits_valid(digits: &str) -> bool {
    let values = digit_values(digits);
    if values.len() != 11 || all_same(&values) {
        return false;
    }
    let first = mod11_digit(
        values[..9]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (10 - i as u32))
            .sum(),
    );
    let second = mod11_digit(
        values[..10]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (11 - i as u32))
            .sum(),
    );
    first == values[9] && second == values[10]
}

pub fn cnpj_check_digits_valid(digits: &str) -> bool {
    const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let values = digit_values(digits);
    if values.len() != 14 || all_same(&values) {
        return false;
    }
    let first = mod11_digit(
        values[..12]
            .iter()
            .zip(FIRST_WEIGHTS)
            .map(|(d, w)| d * w)
            .sum(),
    );
    let second = mod11_digit(
        values[..13]
            .iter()
            .zip(SECOND_WEIGHTS)
            .map(|(d, w)| d * w)
            .sum(),
    );
    first == values[12] && second == values[13]
}

pub fn validate_date(value: Option<&str>, required: bool) -> Result<(), String> {
    if is_blank(value) {
        if required {
            return Err("Data é obrigatória.".to_string());
        }
        return Ok(());
    }
    let raw = value.unwrap_or_default();
    if parse_date(raw).is_none() {
        return Err(format!(
            "Data '{raw}' não é uma data válida ou está em formato irreconhecível."
        ));
    }
    Ok(())
}

const BOOLEAN_INPUTS: [&str; 13] = [
    "1",
    "0",
    "s",
    "n",
    "sim",
    "não",
    "nao",
    "true",
    "false",
    "t",
    "f",
    "verdadeiro",
    "falso",
];

/// Boolean-like field. Blank is valid and later renders as "0".
pub fn validate_boolean(value: Option<&str>) -> Result<(), String> {
    if is_blank(value) {
        return Ok(());
    }
    let raw = value.unwrap_or_default();
    let lowered = raw.trim().to_lowercase();
    if BOOLEAN_INPUTS.contains(&lowered.as_str()) {
        Ok(())
    } else {
        Err(format!("Valor '{raw}' é inválido. Use Sim/Não, 1/0, etc."))
    }
}

/// State code: optional, exactly two characters when present.
pub fn validate_estado(value: Option<&str>) -> Result<(), String> {
    if is_blank(value) {
        return Ok(());
    }
    let cleaned = value.unwrap_or_default().trim();
    if cleaned.chars().count() != 2 {
        return Err(format!(
            "UF '{cleaned}' é inválida. Deve ter 2 caracteres (ex: GO)."
        ));
    }
    Ok(())
}

/// Postal code: optional, exactly eight digits when present.
pub fn validate_cep(value: Option<&str>) -> Result<(), String> {
    if is_blank(value) {
        return Ok(());
    }
    validate_numeric(value, false, 8)?;
    let digits = digits_of(value.unwrap_or_default());
    if !digits.is_empty() && digits.len() != 8 {
        return Err(format!("CEP deve ter 8 dígitos (recebeu {}).", digits.len()));
    }
    Ok(())
}

/// Business rule: the taxable value must not exceed the document value.
/// Small tolerance absorbs float rounding from the parse.
pub fn validate_taxable_vs_document(
    taxable: Option<&str>,
    document: Option<&str>,
    separator: DecimalSeparator,
) -> Result<(), String> {
    let taxable = parse_decimal(taxable.unwrap_or_default(), separator);
    let document = parse_decimal(document.unwrap_or_default(), separator);
    match (taxable, document) {
        (Some(taxable), Some(document)) => {
            if taxable - document > 0.001 {
                return Err(format!(
                    "Valor Tributável (R${taxable}) não pode ser maior que o Valor do Documento (R${document})."
                ));
            }
            Ok(())
        }
        // Unparseable values were already reported by the field checks.
        _ => Ok(()),
    }
}

/// Runs every field and cross-field rule against one canonical record.
#[derive(Debug, Clone, Copy)]
pub struct RowValidator {
    params: RunParameters,
}

impl RowValidator {
    pub fn new(params: RunParameters) -> Self {
        Self { params }
    }

    /// Returns every violated rule, labeled with the offending field, in
    /// layout order. An empty vector means the record is accepted.
    pub fn validate(&self, record: &CanonicalRecord) -> Vec<String> {
        let sep = self.params.decimal_separator;
        let mut errors = Vec::new();
        let mut check = |key: FieldKey, result: Result<(), String>| {
            if let Err(message) = result {
                errors.push(format!("{}: {message}", key.label()));
            }
        };

        let value = |key: FieldKey| record.get(key);

        check(
            FieldKey::Modelo,
            validate_numeric(value(FieldKey::Modelo), true, 3),
        );
        check(
            FieldKey::NumeroDocumento,
            validate_numeric(value(FieldKey::NumeroDocumento), true, 50),
        );
        check(
            FieldKey::CpfCnpjPrestador,
            validate_cpf_cnpj(
                value(FieldKey::CpfCnpjPrestador),
                self.params.validate_check_digits,
            ),
        );
        check(
            FieldKey::CepPrestador,
            validate_cep(value(FieldKey::CepPrestador)),
        );
        check(FieldKey::Ddd, validate_numeric(value(FieldKey::Ddd), false, 2));
        check(
            FieldKey::NumeroEndereco,
            validate_numeric(value(FieldKey::NumeroEndereco), false, 6),
        );
        check(
            FieldKey::UfPrestador,
            validate_estado(value(FieldKey::UfPrestador)),
        );
        check(
            FieldKey::DataEmissao,
            validate_date(value(FieldKey::DataEmissao), true),
        );
        check(
            FieldKey::DataPagamento,
            validate_date(value(FieldKey::DataPagamento), false),
        );
        check(
            FieldKey::ImpostoRetido,
            validate_boolean(value(FieldKey::ImpostoRetido)),
        );
        check(
            FieldKey::TributadoMunicipio,
            validate_boolean(value(FieldKey::TributadoMunicipio)),
        );
        check(
            FieldKey::ValorTributavel,
            validate_decimal(value(FieldKey::ValorTributavel), true, sep),
        );
        check(
            FieldKey::ValorDocumento,
            validate_decimal(value(FieldKey::ValorDocumento), true, sep),
        );
        check(
            FieldKey::Aliquota,
            validate_aliquota(value(FieldKey::Aliquota), sep),
        );
        check(
            FieldKey::ItemLc,
            validate_numeric(value(FieldKey::ItemLc), false, 4),
        );
        check(
            FieldKey::UnidadeEconomica,
            validate_boolean(value(FieldKey::UnidadeEconomica)),
        );

        if let Err(message) = validate_taxable_vs_document(
            value(FieldKey::ValorTributavel),
            value(FieldKey::ValorDocumento),
            sep,
        ) {
            errors.push(message);
        }

        errors
    }
}

/// Tracks (document number, provider id) pairs across one conversion run.
/// Keys are digits-normalized so `" 123 "` and `"123"` collide.
#[derive(Debug, Default)]
pub struct DuplicateTracker {
    seen: HashSet<(String, String)>,
}

impl DuplicateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key and reports whether this is its first occurrence.
    /// First occurrence wins; callers reject every later one.
    pub fn register(&mut self, document: &str, provider: &str) -> bool {
        self.seen.insert((digits_of(document), digits_of(provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(FieldKey, &str)]) -> CanonicalRecord {
        let mut rec = CanonicalRecord::default();
        for (key, value) in pairs {
            rec.insert(*key, value.to_string());
        }
        rec
    }

    fn valid_record() -> CanonicalRecord {
        record(&[
            (FieldKey::Modelo, "55"),
            (FieldKey::NumeroDocumento, "123"),
            (FieldKey::ValorTributavel, "100,00"),
            (FieldKey::ValorDocumento, "100,00"),
            (FieldKey::Aliquota, "5"),
            (FieldKey::DataEmissao, "01/01/2023"),
            (FieldKey::CpfCnpjPrestador, "00.000.000/0001-91"),
            (FieldKey::RazaoSocialPrestador, "Acme Ltda"),
            (FieldKey::CepPrestador, "74000-000"),
            (FieldKey::UfPrestador, "GO"),
        ])
    }

    fn params(check_digits: bool) -> RunParameters {
        RunParameters {
            decimal_separator: DecimalSeparator::Comma,
            validate_check_digits: check_digits,
        }
    }

    #[test]
    fn valid_record_passes_all_rules() {
        let errors = RowValidator::new(params(true)).validate(&valid_record());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn cpf_check_digits() {
        assert!(cpf_check_digits_valid("52998224725"));
        assert!(!cpf_check_digits_valid("52998224724"));
        assert!(!cpf_check_digits_valid("11111111111"));
    }

    #[test]
    fn cnpj_check_digits() {
        assert!(cnpj_check_digits_valid("00000000000191"));
        assert!(cnpj_check_digits_valid("11222333000181"));
        assert!(!cnpj_check_digits_valid("11222333000180"));
        assert!(!cnpj_check_digits_valid("00000000000000"));
    }

    #[test]
    fn check_digit_verification_can_be_disabled() {
        let mut rec = valid_record();
        rec.insert(FieldKey::CpfCnpjPrestador, "11222333000180".to_string());
        assert!(!RowValidator::new(params(true)).validate(&rec).is_empty());
        assert!(RowValidator::new(params(false)).validate(&rec).is_empty());
    }

    #[test]
    fn wrong_identifier_length_is_rejected_even_without_check_digits() {
        let result = validate_cpf_cnpj(Some("12345"), false);
        assert_eq!(
            result.unwrap_err(),
            "CPF/CNPJ deve ter 11 ou 14 dígitos (recebeu 5)."
        );
    }

    #[test]
    fn multiple_violations_are_all_collected() {
        let mut rec = valid_record();
        rec.insert(FieldKey::Modelo, String::new());
        rec.insert(FieldKey::DataEmissao, "não é data".to_string());
        rec.insert(FieldKey::ValorTributavel, "500,00".to_string());
        rec.insert(FieldKey::ValorDocumento, "400,00".to_string());

        let errors = RowValidator::new(params(true)).validate(&rec);
        assert_eq!(errors.len(), 3, "errors: {errors:?}");
        assert!(errors[0].starts_with("Modelo:"));
        assert!(errors[1].starts_with("Data Emissão:"));
        assert!(errors[2].contains("Valor Tributável"));
    }

    #[test]
    fn taxable_above_document_violates_business_rule() {
        let result = validate_taxable_vs_document(
            Some("500,00"),
            Some("400,00"),
            DecimalSeparator::Comma,
        );
        assert!(result.is_err());
        // Equal values are fine.
        assert!(validate_taxable_vs_document(
            Some("400,00"),
            Some("400,00"),
            DecimalSeparator::Comma
        )
        .is_ok());
    }

    #[test]
    fn decimal_validation_follows_separator_convention() {
        assert!(validate_decimal(Some("1.234,56"), true, DecimalSeparator::Comma).is_ok());
        assert!(validate_decimal(Some("1,234.56"), true, DecimalSeparator::Period).is_ok());
        assert!(validate_decimal(Some("abc"), true, DecimalSeparator::Comma).is_err());
        assert!(validate_decimal(Some("12345678,00"), true, DecimalSeparator::Comma).is_err());
    }

    #[test]
    fn aliquota_range_is_enforced() {
        assert!(validate_aliquota(Some("5"), DecimalSeparator::Comma).is_ok());
        assert!(validate_aliquota(Some("2,5"), DecimalSeparator::Comma).is_ok());
        assert!(validate_aliquota(Some("101"), DecimalSeparator::Comma).is_err());
        assert!(validate_aliquota(None, DecimalSeparator::Comma).is_err());
    }

    #[test]
    fn optional_fields_accept_blank_and_placeholders() {
        assert!(validate_numeric(Some("S/N"), false, 6).is_ok());
        assert!(validate_cep(None).is_ok());
        assert!(validate_estado(Some("")).is_ok());
        assert!(validate_boolean(None).is_ok());
    }

    #[test]
    fn duplicate_tracker_normalizes_digits_and_keeps_first() {
        let mut tracker = DuplicateTracker::new();
        assert!(tracker.register(" 123 ", "00.000.000/0001-91"));
        assert!(!tracker.register("123", "00000000000191"));
        assert!(tracker.register("888", "00000000000191"));
        assert!(tracker.register("123", "52998224725"));
    }
}
