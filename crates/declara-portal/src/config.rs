//! Portal constants and run configuration.
//!
//! Selector strings and URLs are versioned facts about the remote portal's
//! DOM, centralized here so a portal redesign touches one file. Credentials
//! come from the environment (one numbered block per account).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOGIN_URL: &str =
    "https://www.issnetonline.com.br/goiania/online/login/login.aspx";
pub const DEFAULT_IMPORT_URL: &str = "https://www.issnetonline.com.br/goiania/online/Servicos_Contratados/ImportacaoServicosContratados.aspx";
pub const DEFAULT_IMPORT_QUERY_URL: &str = "https://www.issnetonline.com.br/goiania/online/Servicos_Contratados/ConsultaImportacaoServicosContratados.aspx";

/// URL fragment that confirms a successful login redirect.
pub const ACCOUNT_SELECTION_URL_FRAGMENT: &str = "SelecionarContribuinte.aspx";

/// DOM selectors for the portal screens the agent drives.
pub mod selectors {
    /// Login screen.
    pub const USERNAME_INPUT: &str = "#txtLogin";
    pub const SUBMIT_BUTTON: &str = "#btnAcessar";
    /// Virtual keypad buttons; each carries a rotating set of digits in its
    /// rendered value text.
    pub const KEYPAD_BUTTONS: [&str; 5] = ["#btn1", "#btn2", "#btn3", "#btn4", "#btn5"];

    /// Account-selection grid.
    pub const GRID_FILTER_INSCRICAO: &str = "#txtCae";
    pub const GRID_FILTER_CNPJ: &str = "#TxtCPF";
    pub const GRID_SEARCH_BUTTON: &str = "#imbLocalizar";
    /// Row-select buttons have session-generated ids; only this fragment is
    /// stable.
    pub const GRID_SELECT_ID_FRAGMENT: &str = "imbSelecionar";

    /// Import screen.
    pub const UPLOAD_INPUT: &str = "#txtUpload";
    pub const IMPORT_BUTTON: &str = "#btnImportarArquivo";
    pub const DECIMAL_POINT_RADIO: &str = "#radSeparadorPonto";
    pub const LOADING_OVERLAY: &str = "#loading";
    pub const RESULT_MESSAGE: &str = "#divMensagemResultado";
    pub const RESULT_ERROR_DETAIL: &str = "#lblErro";
}

/// Execution target for one automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Headed browser, slowed down for visual debugging.
    #[serde(alias = "dev")]
    Development,
    /// Headless with hardened launch flags.
    #[serde(alias = "prod")]
    Production,
}

/// Browser launch settings derived from the run mode.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub slow_motion: Duration,
    pub window_size: (u32, u32),
    pub extra_args: Vec<String>,
}

impl BrowserSettings {
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Development => Self {
                headless: false,
                slow_motion: Duration::from_millis(800),
                window_size: (1280, 720),
                extra_args: vec!["--start-maximized".to_string()],
            },
            RunMode::Production => Self {
                headless: true,
                slow_motion: Duration::from_millis(100),
                window_size: (1920, 1080),
                extra_args: vec![
                    "--disable-blink-features=AutomationControlled".to_string(),
                    "--no-sandbox".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                ],
            },
        }
    }
}

/// Bounded waits for the portal's three speeds: interactions, page loads,
/// and server-side file processing.
#[derive(Debug, Clone, Copy)]
pub struct PortalTimeouts {
    pub default: Duration,
    pub navigation: Duration,
    pub upload: Duration,
}

impl Default for PortalTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            navigation: Duration::from_secs(60),
            upload: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub login_url: String,
    pub import_url: String,
    pub import_query_url: String,
    pub timeouts: PortalTimeouts,
    /// Where diagnostic captures land.
    pub screenshots_dir: PathBuf,
}

impl PortalConfig {
    /// Builds the config from environment variables with portal defaults.
    /// `ISSNET_URL` overrides the login URL, `RPA_TIMEOUT` (seconds) the
    /// interaction timeout, `DECLARA_PORTAL_LOGS` the capture directory.
    pub fn from_env() -> Self {
        let mut timeouts = PortalTimeouts::default();
        if let Some(secs) = std::env::var("RPA_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            timeouts.default = Duration::from_secs(secs);
        }

        Self {
            login_url: std::env::var("ISSNET_URL")
                .unwrap_or_else(|_| DEFAULT_LOGIN_URL.to_string()),
            import_url: std::env::var("ISSNET_IMPORT_URL")
                .unwrap_or_else(|_| DEFAULT_IMPORT_URL.to_string()),
            import_query_url: std::env::var("ISSNET_IMPORT_QUERY_URL")
                .unwrap_or_else(|_| DEFAULT_IMPORT_QUERY_URL.to_string()),
            timeouts,
            screenshots_dir: std::env::var("DECLARA_PORTAL_LOGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("portal_logs"))
                .join("screenshots"),
        }
    }
}

/// One account's portal credentials.
#[derive(Debug, Clone)]
pub struct PortalCredentials {
    pub user: String,
    pub password: String,
    pub inscricao: String,
}

/// Loads the numbered credential blocks (`ISSNET_USER_1`, `ISSNET_PASS_1`,
/// `ISSNET_INSCRICAO_1`, `ISSNET_USER_2`, ...) and returns the one matching
/// the requested inscription. Enumeration stops at the first missing block.
pub fn credentials_for(inscricao: &str) -> Option<PortalCredentials> {
    let wanted = inscricao.trim();
    for index in 1.. {
        let stored = std::env::var(format!("ISSNET_INSCRICAO_{index}")).ok()?;
        let user = std::env::var(format!("ISSNET_USER_{index}")).ok()?;
        let password = std::env::var(format!("ISSNET_PASS_{index}")).ok()?;
        if stored.trim() == wanted {
            return Some(PortalCredentials {
                user,
                password,
                inscricao: stored.trim().to_string(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_mode_is_headless_with_hardened_flags() {
        let settings = BrowserSettings::for_mode(RunMode::Production);
        assert!(settings.headless);
        assert!(settings
            .extra_args
            .iter()
            .any(|arg| arg.contains("AutomationControlled")));

        let dev = BrowserSettings::for_mode(RunMode::Development);
        assert!(!dev.headless);
    }

    #[test]
    fn run_mode_accepts_short_aliases() {
        let mode: RunMode = serde_json::from_str("\"dev\"").expect("parse");
        assert_eq!(mode, RunMode::Development);
        let mode: RunMode = serde_json::from_str("\"production\"").expect("parse");
        assert_eq!(mode, RunMode::Production);
    }
}
