//! The automation agent: drives one authenticated portal session through
//! login, account selection, file submission, and outcome classification.
//!
//! Each stage maps to one failure class; on any stage failure the agent
//! captures a page screenshot tagged with the task id and stage name before
//! surfacing the error. Capture is best-effort and never escalates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    selectors, PortalConfig, PortalCredentials, ACCOUNT_SELECTION_URL_FRAGMENT,
};
use crate::driver::PortalPage;
use crate::error::{AutomationError, Result};
use crate::keypad;

/// Identifies the destination account inside the selection grid. At least
/// one of the two identifiers must be present.
#[derive(Debug, Clone, Default)]
pub struct AccountRef {
    pub inscricao: Option<String>,
    pub cnpj: Option<String>,
}

impl AccountRef {
    /// The identifier used for grid matching, inscriptions first.
    pub fn identifier(&self) -> Option<&str> {
        self.inscricao
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.cnpj.as_deref().filter(|v| !v.trim().is_empty()))
    }
}

/// The portal's final word on a submitted file.
#[derive(Debug, Clone)]
pub struct PortalOutcome {
    pub message: String,
}

pub struct AutomationAgent<'a> {
    page: &'a dyn PortalPage,
    config: &'a PortalConfig,
    task_id: Uuid,
}

impl<'a> AutomationAgent<'a> {
    pub fn new(page: &'a dyn PortalPage, config: &'a PortalConfig, task_id: Uuid) -> Self {
        Self {
            page,
            config,
            task_id,
        }
    }

    /// Runs the four stages in order, reporting each stage name through
    /// `progress` before entering it.
    pub async fn run(
        &self,
        credentials: &PortalCredentials,
        account: &AccountRef,
        file_path: &Path,
        progress: &mut (dyn FnMut(&str) + Send),
    ) -> Result<PortalOutcome> {
        progress("Realizando login no portal...");
        self.staged("authenticate", self.authenticate(credentials))
            .await?;

        progress("Selecionando contribuinte...");
        self.staged("select_account", self.select_account(account))
            .await?;

        progress("Enviando arquivo...");
        self.staged("submit_file", self.submit_file(file_path))
            .await?;

        progress("Lendo resultado do processamento...");
        self.staged("classify_result", self.classify_result()).await
    }

    /// Wraps a stage future with the on-failure diagnostic capture.
    async fn staged<T>(
        &self,
        stage: &'static str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match fut.await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(task_id = %self.task_id, stage, %err, "automation stage failed");
                self.capture_diagnostics(stage).await;
                Err(err)
            }
        }
    }

    async fn authenticate(&self, credentials: &PortalCredentials) -> Result<()> {
        let timeouts = self.config.timeouts;
        self.page.goto(&self.config.login_url).await?;
        self.page
            .wait_visible(selectors::USERNAME_INPUT, timeouts.navigation)
            .await
            .map_err(auth_failure)?;
        self.page
            .fill(selectors::USERNAME_INPUT, &credentials.user)
            .await?;

        // The keypad mapping is only valid for this rendering; read it
        // fresh, then click the secret out.
        let mapping = keypad::read_mapping(self.page).await?;
        keypad::click_secret(self.page, &mapping, &credentials.password).await?;

        // Brief settle before submitting, like a human closing the keypad.
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.page.click(selectors::SUBMIT_BUTTON).await?;

        self.page
            .wait_for_url_contains(ACCOUNT_SELECTION_URL_FRAGMENT, timeouts.navigation)
            .await
            .map_err(|_| AutomationError::Authentication {
                reason: "portal não redirecionou após o login; credenciais possivelmente \
                         rejeitadas"
                    .to_string(),
            })?;

        info!(task_id = %self.task_id, user = %mask(&credentials.user), "login accepted");
        Ok(())
    }

    async fn select_account(&self, account: &AccountRef) -> Result<()> {
        let timeouts = self.config.timeouts;
        let identifier = account
            .identifier()
            .ok_or_else(|| AutomationError::AccountNotFound {
                identifier: "(nenhum identificador informado)".to_string(),
            })?;

        // Filter the grid down before matching; the portal paginates large
        // account lists.
        let by_inscricao = account
            .inscricao
            .as_deref()
            .map_or(false, |v| !v.trim().is_empty());
        let filter_input = if by_inscricao {
            selectors::GRID_FILTER_INSCRICAO
        } else {
            selectors::GRID_FILTER_CNPJ
        };
        self.page
            .wait_visible(filter_input, timeouts.navigation)
            .await?;
        self.page.fill(filter_input, identifier).await?;
        self.page.click(selectors::GRID_SEARCH_BUTTON).await?;
        self.wait_overlay_cycle(timeouts.default).await?;

        // Row ids are regenerated per session; match on the rendered cell
        // text instead.
        let clicked = self
            .page
            .click_grid_row_action(identifier, selectors::GRID_SELECT_ID_FRAGMENT)
            .await?;
        if !clicked {
            return Err(AutomationError::AccountNotFound {
                identifier: identifier.to_string(),
            });
        }
        self.wait_overlay_cycle(timeouts.default).await?;

        // Deep link to the import screen; sturdier than walking the menus.
        self.page.goto(&self.config.import_url).await?;
        self.page
            .wait_visible(selectors::UPLOAD_INPUT, timeouts.navigation)
            .await?;

        info!(task_id = %self.task_id, identifier, "account selected");
        Ok(())
    }

    async fn submit_file(&self, file_path: &Path) -> Result<()> {
        let timeouts = self.config.timeouts;

        // The generated file always uses a decimal point; make sure the
        // portal reads it that way when the option is rendered.
        if self.page.is_visible(selectors::DECIMAL_POINT_RADIO).await? {
            self.page.click(selectors::DECIMAL_POINT_RADIO).await?;
        }

        self.page
            .set_hidden_file_input(selectors::UPLOAD_INPUT, file_path)
            .await?;
        self.page.click(selectors::IMPORT_BUTTON).await?;

        // Server-side processing: the overlay must appear (short grace) and
        // then go away within the long upload window.
        if self
            .page
            .wait_visible(selectors::LOADING_OVERLAY, Duration::from_secs(5))
            .await
            .is_err()
        {
            warn!(task_id = %self.task_id, "loading overlay never appeared; processing may have been instant");
        }
        self.page
            .wait_gone(selectors::LOADING_OVERLAY, timeouts.upload)
            .await
            .map_err(|_| AutomationError::Timeout {
                waiting_for: "processamento do arquivo pelo portal".to_string(),
            })?;

        info!(task_id = %self.task_id, file = %file_path.display(), "file submitted");
        Ok(())
    }

    async fn classify_result(&self) -> Result<PortalOutcome> {
        let timeouts = self.config.timeouts;
        self.page
            .wait_visible(selectors::RESULT_MESSAGE, timeouts.default)
            .await
            .map_err(|_| AutomationError::Timeout {
                waiting_for: "mensagem de resultado do portal".to_string(),
            })?;

        let message = self
            .page
            .read_text(selectors::RESULT_MESSAGE)
            .await?
            .unwrap_or_default();
        let lowered = message.to_lowercase();

        if lowered.contains("sucesso") || lowered.contains("êxito") {
            info!(task_id = %self.task_id, "portal accepted the file");
            return Ok(PortalOutcome { message });
        }

        let details = match self.page.is_visible(selectors::RESULT_ERROR_DETAIL).await {
            Ok(true) => self
                .page
                .read_text(selectors::RESULT_ERROR_DETAIL)
                .await?
                .unwrap_or_default(),
            _ => String::new(),
        };
        Err(AutomationError::UploadRejected { message, details })
    }

    /// Grid refreshes show the overlay briefly; tolerate it not appearing.
    async fn wait_overlay_cycle(&self, timeout: Duration) -> Result<()> {
        if self
            .page
            .wait_visible(selectors::LOADING_OVERLAY, Duration::from_millis(1500))
            .await
            .is_ok()
        {
            self.page
                .wait_gone(selectors::LOADING_OVERLAY, timeout)
                .await?;
        }
        Ok(())
    }

    /// Saves a screenshot tagged with the task id and failed stage. Never
    /// fails the job: a lost capture only loses the evidence.
    async fn capture_diagnostics(&self, stage: &str) {
        let bytes = match self.page.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(task_id = %self.task_id, stage, %err, "diagnostic screenshot failed");
                return;
            }
        };
        let path = self.capture_path(stage);
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(task_id = %self.task_id, %err, "could not create screenshots dir");
                return;
            }
        }
        match std::fs::write(&path, bytes) {
            Ok(()) => info!(task_id = %self.task_id, stage, path = %path.display(), "diagnostic capture saved"),
            Err(err) => warn!(task_id = %self.task_id, %err, "could not write diagnostic capture"),
        }
    }

    fn capture_path(&self, stage: &str) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        self.config
            .screenshots_dir
            .join(format!("{}_{stage}_{timestamp}.png", self.task_id))
    }
}

fn auth_failure(err: AutomationError) -> AutomationError {
    AutomationError::Authentication {
        reason: err.to_string(),
    }
}

/// First characters of the login, for logs.
fn mask(user: &str) -> String {
    let prefix: String = user.chars().take(4).collect();
    format!("{prefix}...")
}
