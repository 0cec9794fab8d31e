use thiserror::Error;

/// Job-fatal conversion failures. Row-level problems are never errors; they
/// travel as [`crate::types::RowReport`] data inside a completed task.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Required canonical columns could not be resolved from the input
    /// headers. Fatal before any row is processed.
    #[error("Colunas obrigatórias não encontradas: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Erro de leitura/escrita: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported extension or a file the readers could not decode.
    #[error("Erro ao ler arquivo: {reason}")]
    Read { reason: String },

    #[error("Arquivo está vazio ou não contém dados.")]
    EmptyFile,

    /// Every row was rejected; there is nothing to declare.
    #[error("Nenhum registro válido processado. Verifique os erros.")]
    NoValidRecords,

    /// Declaration header data missing required fields.
    #[error("Campos do cabeçalho não preenchidos: {}", missing.join(", "))]
    Header { missing: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ConversionError>;
