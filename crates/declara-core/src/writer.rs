//! Assembly of the final declaration file and the error-report artifact.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{ConversionError, Result};
use crate::layout::{BODY_FIELD_ORDER, HEADER_PHRASE, TRAILER};
use crate::types::{HeaderData, RowReport, TransformedRecord};

/// Builds the header line. Field 4 concatenates the generation timestamp and
/// the company name with no separator, exactly as the importer expects.
pub fn header_line(header: &HeaderData, generated_at: NaiveDateTime) -> Result<String> {
    let missing = header.missing_fields();
    if !missing.is_empty() {
        return Err(ConversionError::Header {
            missing: missing.into_iter().map(str::to_string).collect(),
        });
    }

    let timestamp = generated_at.format("%H:%M %d/%m/%Y");
    let mes = format!("{:0>2}", header.mes.trim());
    let stamp_field = format!("{timestamp}{}", header.razao_social.trim());
    let fields: [&str; 6] = [
        header.inscricao_municipal.trim(),
        &mes,
        header.ano.trim(),
        &stamp_field,
        header.codigo_servico.trim(),
        HEADER_PHRASE,
    ];
    Ok(fields.join(";"))
}

/// Renders one accepted record as a body line: the 21 fields in fixed layout
/// order, `;`-joined, with the layout's trailing separator.
pub fn body_line(record: &TransformedRecord) -> String {
    let mut line = BODY_FIELD_ORDER
        .iter()
        .map(|key| record.get(*key))
        .collect::<Vec<_>>()
        .join(";");
    line.push(';');
    line
}

/// Writes the declaration file: header, one line per accepted record, and
/// the trailer when the layout revision defines one.
pub fn write_declaration(path: &Path, header: &str, body: &[String]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{header}")?;
    for line in body {
        writeln!(file, "{line}")?;
    }
    if let Some(trailer) = TRAILER {
        writeln!(file, "{trailer}")?;
    }
    Ok(())
}

/// Writes the error report: one line per (row, message) pair so the user can
/// cross-reference the source file directly.
pub fn write_error_report(path: &Path, reports: &[RowReport]) -> Result<()> {
    let total: usize = reports.iter().map(|r| r.errors.len()).sum();

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "RELATORIO DE ERROS DA CONVERSAO")?;
    writeln!(file, "{total} erro(s) em {} linha(s)", reports.len())?;
    writeln!(file)?;
    for report in reports {
        for error in &report.errors {
            writeln!(file, "LINHA {}: {error}", report.line)?;
        }
    }
    Ok(())
}
