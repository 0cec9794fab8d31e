//! Conversion job orchestration: reads the input, resolves columns,
//! validates and transforms row by row, writes the declaration and error
//! report, and streams progress into the shared task store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ConversionError, Result};
use crate::layout::FieldKey;
use crate::reader::read_input_file;
use crate::schema::SchemaMap;
use crate::task::{ConversionStatus, ConversionTask, ConversionTotals, TaskStore};
use crate::transform::transform_record;
use crate::types::{HeaderData, RowReport, RunParameters, ValidationOutcome};
use crate::validation::{DuplicateTracker, RowValidator, DUPLICATE_MESSAGE};
use crate::writer::{body_line, header_line, write_declaration, write_error_report};

/// Everything a conversion job needs at submission time.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub header: HeaderData,
    pub params: RunParameters,
}

/// What a finished engine run produced.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub totals: ConversionTotals,
    pub row_errors: Vec<RowReport>,
    pub output_filename: String,
    pub error_filename: Option<String>,
}

/// Owns the conversion job lifecycle: submissions spawn a background worker
/// per job; pollers read snapshots from the injected store. Conversions
/// share no external resource, so jobs run fully in parallel.
pub struct ConversionTaskManager {
    store: Arc<TaskStore<ConversionTask>>,
    downloads_dir: PathBuf,
}

impl ConversionTaskManager {
    pub fn new(store: Arc<TaskStore<ConversionTask>>, downloads_dir: PathBuf) -> Self {
        Self {
            store,
            downloads_dir,
        }
    }

    /// Registers a queued task and hands it to a background worker.
    /// Returns immediately with the task id.
    pub fn submit(&self, request: ConversionRequest) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert(id, ConversionTask::queued(id));

        let store = Arc::clone(&self.store);
        let downloads_dir = self.downloads_dir.clone();
        tokio::spawn(async move {
            run_conversion(store, downloads_dir, id, request).await;
        });

        info!(task_id = %id, "conversion job submitted");
        id
    }

    pub fn status(&self, id: &Uuid) -> Option<ConversionTask> {
        self.store.get(id)
    }
}

async fn run_conversion(
    store: Arc<TaskStore<ConversionTask>>,
    downloads_dir: PathBuf,
    id: Uuid,
    request: ConversionRequest,
) {
    store.update(&id, |task| {
        task.status = ConversionStatus::Running;
        task.set_progress(0, "Iniciando conversão...", "");
    });

    let inscricao = request.header.inscricao_municipal.trim().to_string();
    let progress_store = Arc::clone(&store);
    let result = tokio::task::spawn_blocking(move || {
        convert_file(
            &request,
            &downloads_dir,
            id,
            &mut |progress, message, details| {
                progress_store.update(&id, |task| {
                    task.set_progress(progress, message, details);
                });
            },
        )
    })
    .await;

    match result {
        Ok(Ok(outcome)) => {
            info!(
                task_id = %id,
                total = outcome.totals.total,
                success = outcome.totals.success,
                errors = outcome.totals.errors,
                output = %outcome.output_filename,
                "conversion completed"
            );
            store.update(&id, |task| {
                task.status = ConversionStatus::Completed;
                task.set_progress(100, "Conversão Concluída!", "");
                task.totals = Some(outcome.totals);
                task.row_errors = outcome.row_errors.clone();
                task.output_filename = Some(outcome.output_filename.clone());
                task.error_filename = outcome.error_filename.clone();
                task.inscricao_municipal = Some(inscricao.clone());
            });
        }
        Ok(Err(err)) => {
            error!(task_id = %id, %err, "conversion failed");
            store.update(&id, |task| {
                task.status = ConversionStatus::Error;
                task.set_progress(100, "Erro na Conversão", &err.to_string());
            });
        }
        Err(join_err) => {
            error!(task_id = %id, %join_err, "conversion worker panicked");
            store.update(&id, |task| {
                task.status = ConversionStatus::Error;
                task.set_progress(100, "Erro na Conversão", "Erro interno de processamento.");
            });
        }
    }
}

/// The synchronous conversion engine. Progress callbacks receive
/// (percentage, message, details); values map the stages onto 0-100 the way
/// the polling UI expects.
pub fn convert_file(
    request: &ConversionRequest,
    downloads_dir: &Path,
    id: Uuid,
    progress: &mut dyn FnMut(u8, &str, &str),
) -> Result<ConversionOutcome> {
    progress(10, "Lendo arquivo...", "");
    let records = read_input_file(&request.input_path)?;
    let total = records.len();

    progress(20, "Verificando colunas...", "");
    let headers: Vec<String> = records
        .first()
        .map(|record| record.cells.iter().map(|(h, _)| h.clone()).collect())
        .unwrap_or_default();
    let schema = SchemaMap::resolve(&headers)?;

    progress(30, "Iniciando validação...", &format!("Linha 0 de {total}"));
    let validator = RowValidator::new(request.params);
    let mut duplicates = DuplicateTracker::new();
    let mut accepted = Vec::new();
    let mut row_errors: Vec<RowReport> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let canonical = schema.canonicalize(record);
        let mut errors = validator.validate(&canonical);

        // The duplicate check runs after the field rules; the first
        // occurrence of a key in file order is the one that survives.
        let first_occurrence = duplicates.register(
            canonical.get(FieldKey::NumeroDocumento).unwrap_or_default(),
            canonical.get(FieldKey::CpfCnpjPrestador).unwrap_or_default(),
        );
        if !first_occurrence {
            errors.push(DUPLICATE_MESSAGE.to_string());
        }

        let outcome = if errors.is_empty() {
            ValidationOutcome::Accepted(transform_record(&canonical, &request.params))
        } else {
            ValidationOutcome::Rejected(RowReport {
                line: record.line,
                errors,
            })
        };
        match outcome {
            ValidationOutcome::Accepted(transformed) => accepted.push(transformed),
            ValidationOutcome::Rejected(report) => row_errors.push(report),
        }

        if index % 10 == 0 || index + 1 == total {
            let pct = 30 + (60 * index / total.max(1)) as u8;
            progress(
                pct,
                "Validando dados...",
                &format!("Linha {} de {total}", index + 1),
            );
        }
    }

    progress(90, "Gerando cabeçalho...", "");
    let header = header_line(&request.header, Local::now().naive_local())?;

    if accepted.is_empty() {
        return Err(ConversionError::NoValidRecords);
    }

    progress(95, "Montando arquivo TXT...", "");
    let body: Vec<String> = accepted.iter().map(body_line).collect();

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let id_simple = id.simple().to_string();
    let task_prefix = &id_simple[..8];
    let output_filename = format!("conversao_{task_prefix}_{timestamp}.txt");
    write_declaration(&downloads_dir.join(&output_filename), &header, &body)?;

    let error_filename = if row_errors.is_empty() {
        None
    } else {
        let name = format!("erros_{task_prefix}_{timestamp}.txt");
        match write_error_report(&downloads_dir.join(&name), &row_errors) {
            Ok(()) => Some(name),
            Err(err) => {
                // A missing report must not fail an otherwise good run.
                warn!(task_id = %id, %err, "failed to write error report");
                None
            }
        }
    };

    Ok(ConversionOutcome {
        totals: ConversionTotals {
            total,
            success: accepted.len(),
            errors: row_errors.len(),
        },
        row_errors,
        output_filename,
        error_filename,
    })
}
