//! Input readers: delimited text and spreadsheets.
//!
//! Every cell is surfaced as a string to preserve leading zeros in codes
//! like CEP and Modelo; numeric interpretation happens later, in validation.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::error::{ConversionError, Result};
use crate::types::RawRecord;

/// Reads an input file into raw records, dispatching on the extension.
/// Fully blank rows are dropped; a file with no data rows is `EmptyFile`.
pub fn read_input_file(path: &Path) -> Result<Vec<RawRecord>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let records = match extension.as_str() {
        "csv" | "txt" => read_delimited(path)?,
        "xlsx" | "xls" => read_spreadsheet(path)?,
        other => {
            return Err(ConversionError::Read {
                reason: format!("extensão de arquivo não suportada: .{other}"),
            })
        }
    };

    if records.is_empty() {
        return Err(ConversionError::EmptyFile);
    }
    Ok(records)
}

fn read_delimited(path: &Path) -> Result<Vec<RawRecord>> {
    let raw = std::fs::read_to_string(path).map_err(|err| ConversionError::Read {
        reason: format!("{}: {err}", path.display()),
    })?;
    // Excel exports prepend a UTF-8 BOM.
    let content = raw.strip_prefix('\u{feff}').unwrap_or(&raw);

    let delimiter = sniff_delimiter(content);
    debug!(delimiter = %(delimiter as char), "delimiter sniffed");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| ConversionError::Read {
            reason: format!("cabeçalho inválido: {err}"),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|err| ConversionError::Read {
            reason: format!("linha {}: {err}", index + 2),
        })?;
        let cells: Vec<(String, String)> = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                (
                    header.clone(),
                    row.get(col).unwrap_or_default().to_string(),
                )
            })
            .collect();
        let record = RawRecord {
            line: index + 2,
            cells,
        };
        if !record.is_blank() {
            records.push(record);
        }
    }
    Ok(records)
}

/// Picks `;` or `,` based on which occurs more often in the header line,
/// matching the conventions of Brazilian and US spreadsheet exports.
fn sniff_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or_default();
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

fn read_spreadsheet(path: &Path) -> Result<Vec<RawRecord>> {
    let mut workbook = open_workbook_auto(path).map_err(|err| ConversionError::Read {
        reason: format!("{}: {err}", path.display()),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConversionError::Read {
            reason: "planilha não contém nenhuma aba".to_string(),
        })?
        .map_err(|err| ConversionError::Read {
            reason: format!("falha ao ler a primeira aba: {err}"),
        })?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        let cells: Vec<(String, String)> = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = row.get(col).map(cell_to_string).unwrap_or_default();
                (header.clone(), value)
            })
            .collect();
        let record = RawRecord {
            line: index + 2,
            cells,
        };
        if !record.is_blank() {
            records.push(record);
        }
    }
    Ok(records)
}

/// Renders a spreadsheet cell the way a user typed it: integral floats lose
/// the `.0`, date cells render day-first.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.format("%d/%m/%Y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(err) => format!("{err:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(content: &str, extension: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .expect("create temp file");
        file.write_all(content.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn reads_semicolon_delimited_with_bom() {
        let file = write_temp("\u{feff}numero nf;cnpj\n123;00000000000191\n", "csv");
        let records = read_input_file(file.path()).expect("read csv");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[0].cells[0], ("numero nf".into(), "123".into()));
    }

    #[test]
    fn sniffs_comma_delimiter() {
        let file = write_temp("numero nf,cnpj\n55,00000000000191\n", "csv");
        let records = read_input_file(file.path()).expect("read csv");
        assert_eq!(records[0].cells[1].1, "00000000000191");
    }

    #[test]
    fn drops_fully_blank_rows() {
        let file = write_temp("numero nf;cnpj\n123;111\n;\n456;222\n", "csv");
        let records = read_input_file(file.path()).expect("read csv");
        assert_eq!(records.len(), 2);
        // Line numbers keep counting through the dropped row.
        assert_eq!(records[1].line, 4);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = write_temp("numero nf;cnpj\n", "csv");
        let err = read_input_file(file.path()).unwrap_err();
        assert!(matches!(err, ConversionError::EmptyFile));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = write_temp("whatever", "pdf");
        let err = read_input_file(file.path()).unwrap_err();
        assert!(matches!(err, ConversionError::Read { .. }));
    }
}
