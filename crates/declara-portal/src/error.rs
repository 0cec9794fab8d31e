use thiserror::Error;

/// Automation failures, one class per agent stage. Each is terminal for its
/// own task and carries the human-readable detail shown to the caller.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// No stored credentials match the requested inscription. Raised before
    /// the browser launches.
    #[error("Credenciais não encontradas para a inscrição {inscricao}. Verifique o .env.")]
    MissingCredentials { inscricao: String },

    /// Keypad mapping unreadable or the portal rejected the credentials.
    #[error("Falha na autenticação: {reason}")]
    Authentication { reason: String },

    /// No grid row matched the target account's business identifier.
    #[error("Contribuinte {identifier} não encontrado no grid de seleção.")]
    AccountNotFound { identifier: String },

    /// The portal processed the upload and reported a validation error.
    #[error("Arquivo rejeitado pelo portal: {message}")]
    UploadRejected { message: String, details: String },

    /// No terminal response inside the bounded wait.
    #[error("Tempo esgotado aguardando {waiting_for}.")]
    Timeout { waiting_for: String },

    /// Browser/CDP infrastructure failure outside the portal's protocol.
    #[error("Falha no navegador: {0}")]
    Browser(String),
}

impl AutomationError {
    /// Stable class name stored in the task's detail field and used to tag
    /// diagnostic captures.
    pub fn class_name(&self) -> &'static str {
        match self {
            AutomationError::MissingCredentials { .. } => "MissingCredentials",
            AutomationError::Authentication { .. } => "AuthenticationFailure",
            AutomationError::AccountNotFound { .. } => "AccountNotFound",
            AutomationError::UploadRejected { .. } => "UploadRejected",
            AutomationError::Timeout { .. } => "Timeout",
            AutomationError::Browser(_) => "BrowserFailure",
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        AutomationError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;
