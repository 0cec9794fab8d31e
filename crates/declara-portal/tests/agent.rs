//! Agent and manager tests against a scripted portal page, so the protocol
//! logic runs without a real browser.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use declara_core::task::TaskStore;
use declara_portal::agent::{AccountRef, AutomationAgent};
use declara_portal::config::{selectors, PortalConfig, PortalCredentials, PortalTimeouts, RunMode};
use declara_portal::driver::{PortalPage, PortalSession, SessionFactory};
use declara_portal::error::AutomationError;
use declara_portal::task::{AutomationRequest, AutomationStatus, AutomationTaskManager};

#[derive(Debug, Clone)]
struct FakeState {
    url: String,
    keypad: Vec<(String, String)>,
    grid_rows: Vec<String>,
    result_message: String,
    error_detail: Option<String>,
    accept_login: bool,
    filled: Vec<(String, String)>,
    clicked: Vec<String>,
    uploaded: Option<PathBuf>,
    overlay_pulse: u8,
    imported: bool,
}

/// Scripted portal: state transitions mimic the real screens far enough for
/// the agent's protocol to play out.
struct FakePortal {
    state: Mutex<FakeState>,
}

impl FakePortal {
    fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: String::new(),
                keypad: vec![
                    ("#btn1".to_string(), "1 ou 2".to_string()),
                    ("#btn2".to_string(), "3 ou 4".to_string()),
                    ("#btn3".to_string(), "5 ou 6".to_string()),
                    ("#btn4".to_string(), "7 ou 8".to_string()),
                    ("#btn5".to_string(), "9 ou 0".to_string()),
                ],
                grid_rows: vec!["123456  00.000.000/0001-91  Acme Servicos".to_string()],
                result_message: "Importação realizada com sucesso.".to_string(),
                error_detail: None,
                accept_login: true,
                filled: Vec::new(),
                clicked: Vec::new(),
                uploaded: None,
                overlay_pulse: 0,
                imported: false,
            }),
        }
    }

    fn with<R>(&self, apply: impl FnOnce(&mut FakeState) -> R) -> R {
        apply(&mut self.state.lock().expect("fake state lock"))
    }
}

#[async_trait]
impl PortalPage for FakePortal {
    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.with(|s| s.url = url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn wait_for_url_contains(
        &self,
        fragment: &str,
        _timeout: Duration,
    ) -> Result<(), AutomationError> {
        if self.with(|s| s.url.contains(fragment)) {
            Ok(())
        } else {
            Err(AutomationError::Timeout {
                waiting_for: format!("navegação para '{fragment}'"),
            })
        }
    }

    async fn wait_visible(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<(), AutomationError> {
        if self.is_visible(selector).await? {
            Ok(())
        } else {
            Err(AutomationError::Timeout {
                waiting_for: format!("elemento '{selector}'"),
            })
        }
    }

    async fn wait_gone(&self, selector: &str, _timeout: Duration) -> Result<(), AutomationError> {
        // The pulse was consumed by the visibility poll; gone now.
        let _ = self.is_visible(selector).await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, AutomationError> {
        Ok(self.with(|s| match selector {
            selectors::LOADING_OVERLAY => {
                if s.overlay_pulse > 0 {
                    s.overlay_pulse -= 1;
                    true
                } else {
                    false
                }
            }
            selectors::RESULT_MESSAGE => s.imported,
            selectors::RESULT_ERROR_DETAIL => s.imported && s.error_detail.is_some(),
            other => {
                s.keypad.iter().any(|(sel, _)| sel == other)
                    || [
                        selectors::USERNAME_INPUT,
                        selectors::SUBMIT_BUTTON,
                        selectors::GRID_FILTER_INSCRICAO,
                        selectors::GRID_FILTER_CNPJ,
                        selectors::GRID_SEARCH_BUTTON,
                        selectors::UPLOAD_INPUT,
                        selectors::IMPORT_BUTTON,
                        selectors::DECIMAL_POINT_RADIO,
                    ]
                    .contains(&other)
            }
        }))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AutomationError> {
        self.with(|s| s.filled.push((selector.to_string(), value.to_string())));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), AutomationError> {
        self.with(|s| {
            s.clicked.push(selector.to_string());
            match selector {
                selectors::SUBMIT_BUTTON => {
                    let user_filled = s
                        .filled
                        .iter()
                        .any(|(sel, _)| sel == selectors::USERNAME_INPUT);
                    if s.accept_login && user_filled {
                        s.url =
                            "https://portal.example/online/SelecionarContribuinte.aspx".to_string();
                    }
                }
                selectors::GRID_SEARCH_BUTTON | selectors::IMPORT_BUTTON => {
                    s.overlay_pulse = 1;
                    if selector == selectors::IMPORT_BUTTON {
                        s.imported = true;
                    }
                }
                _ => {}
            }
        });
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<Option<String>, AutomationError> {
        Ok(self.with(|s| {
            s.keypad
                .iter()
                .find(|(sel, _)| sel == selector)
                .map(|(_, digits)| digits.clone())
        }))
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>, AutomationError> {
        Ok(self.with(|s| match selector {
            selectors::RESULT_MESSAGE => Some(s.result_message.clone()),
            selectors::RESULT_ERROR_DETAIL => s.error_detail.clone(),
            _ => None,
        }))
    }

    async fn click_grid_row_action(
        &self,
        row_text: &str,
        _action_id_fragment: &str,
    ) -> Result<bool, AutomationError> {
        Ok(self.with(|s| {
            let matched = s.grid_rows.iter().any(|row| row.contains(row_text));
            if matched {
                s.clicked.push(format!("grid-select:{row_text}"));
                s.overlay_pulse = 1;
            }
            matched
        }))
    }

    async fn set_hidden_file_input(
        &self,
        _selector: &str,
        path: &Path,
    ) -> Result<(), AutomationError> {
        self.with(|s| s.uploaded = Some(path.to_path_buf()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }
}

fn test_config(screenshots_dir: PathBuf) -> PortalConfig {
    PortalConfig {
        login_url: "https://portal.example/online/login/login.aspx".to_string(),
        import_url: "https://portal.example/online/ImportacaoServicosContratados.aspx".to_string(),
        import_query_url: "https://portal.example/online/Consulta.aspx".to_string(),
        timeouts: PortalTimeouts {
            default: Duration::from_millis(300),
            navigation: Duration::from_millis(300),
            upload: Duration::from_millis(300),
        },
        screenshots_dir,
    }
}

fn credentials() -> PortalCredentials {
    PortalCredentials {
        user: "04818302000107".to_string(),
        password: "25".to_string(),
        inscricao: "123456".to_string(),
    }
}

fn account() -> AccountRef {
    AccountRef {
        inscricao: Some("123456".to_string()),
        cnpj: None,
    }
}

#[tokio::test]
async fn agent_completes_the_full_protocol() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf());
    let portal = FakePortal::new();
    let agent = AutomationAgent::new(&portal, &config, Uuid::new_v4());

    let mut stages = Vec::new();
    let outcome = agent
        .run(
            &credentials(),
            &account(),
            Path::new("/tmp/conversao_teste.txt"),
            &mut |message| stages.push(message.to_string()),
        )
        .await
        .expect("agent run");

    assert!(outcome.message.contains("sucesso"));
    assert_eq!(stages.len(), 4);

    portal.with(|s| {
        // Password "25": digit 2 lives on #btn1, digit 5 on #btn3.
        let keypad_clicks: Vec<&str> = s
            .clicked
            .iter()
            .map(String::as_str)
            .filter(|sel| selectors::KEYPAD_BUTTONS.contains(sel))
            .collect();
        assert_eq!(keypad_clicks, vec!["#btn1", "#btn3"]);

        assert!(s.clicked.contains(&selectors::SUBMIT_BUTTON.to_string()));
        assert!(s.clicked.contains(&"grid-select:123456".to_string()));
        assert!(s
            .clicked
            .contains(&selectors::DECIMAL_POINT_RADIO.to_string()));
        assert_eq!(
            s.uploaded.as_deref(),
            Some(Path::new("/tmp/conversao_teste.txt"))
        );
    });

    // No failures, no diagnostic captures.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_keypad_digit_is_an_authentication_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf());
    let portal = FakePortal::new();
    // Only one button rendered, and it never carries the digit '5'.
    portal.with(|s| s.keypad = vec![("#btn1".to_string(), "1 ou 2".to_string())]);
    let agent = AutomationAgent::new(&portal, &config, Uuid::new_v4());

    let err = agent
        .run(
            &credentials(),
            &account(),
            Path::new("/tmp/conversao_teste.txt"),
            &mut |_| {},
        )
        .await
        .unwrap_err();

    assert_eq!(err.class_name(), "AuthenticationFailure");
    portal.with(|s| {
        assert!(!s.clicked.contains(&selectors::SUBMIT_BUTTON.to_string()));
    });
}

#[tokio::test]
async fn rejected_login_fails_with_capture() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf());
    let portal = FakePortal::new();
    portal.with(|s| s.accept_login = false);
    let agent = AutomationAgent::new(&portal, &config, Uuid::new_v4());

    let err = agent
        .run(
            &credentials(),
            &account(),
            Path::new("/tmp/conversao_teste.txt"),
            &mut |_| {},
        )
        .await
        .unwrap_err();

    assert_eq!(err.class_name(), "AuthenticationFailure");

    // Best-effort diagnostic capture landed, tagged with the stage.
    let captures: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(captures.len(), 1);
    assert!(captures[0].contains("authenticate"));
}

#[tokio::test]
async fn portal_rejection_is_upload_rejected_with_detail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf());
    let portal = FakePortal::new();
    portal.with(|s| {
        s.result_message = "Erro ao processar o arquivo.".to_string();
        s.error_detail = Some("Linha 1: CNPJ não cadastrado.".to_string());
    });
    let agent = AutomationAgent::new(&portal, &config, Uuid::new_v4());

    let err = agent
        .run(
            &credentials(),
            &account(),
            Path::new("/tmp/conversao_teste.txt"),
            &mut |_| {},
        )
        .await
        .unwrap_err();

    match &err {
        AutomationError::UploadRejected { message, details } => {
            assert!(message.contains("Erro ao processar"));
            assert!(details.contains("CNPJ não cadastrado"));
        }
        other => panic!("expected UploadRejected, got {other:?}"),
    }
    assert_eq!(err.class_name(), "UploadRejected");
}

struct FakeSession {
    portal: Arc<FakePortal>,
}

#[async_trait]
impl PortalSession for FakeSession {
    fn page(&self) -> &dyn PortalPage {
        self.portal.as_ref()
    }

    async fn close(self: Box<Self>) {}
}

struct FakeFactory {
    portal: Arc<FakePortal>,
    active: Arc<Mutex<(usize, usize)>>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, _mode: RunMode) -> Result<Box<dyn PortalSession>, AutomationError> {
        {
            let mut counters = self.active.lock().expect("counter lock");
            counters.0 += 1;
            counters.1 = counters.1.max(counters.0);
        }
        // Hold the "session" open long enough for overlap to be observable.
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let mut counters = self.active.lock().expect("counter lock");
            counters.0 -= 1;
        }
        Ok(Box::new(FakeSession {
            portal: Arc::clone(&self.portal),
        }))
    }
}

fn set_test_credentials() {
    std::env::set_var("ISSNET_INSCRICAO_1", "123456");
    std::env::set_var("ISSNET_USER_1", "04818302000107");
    std::env::set_var("ISSNET_PASS_1", "25");
}

async fn poll_terminal(
    manager: &AutomationTaskManager,
    id: &Uuid,
) -> declara_portal::task::AutomationTask {
    for _ in 0..400 {
        if let Some(snapshot) = manager.status(id) {
            if snapshot.status.is_terminal() {
                return snapshot;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("automation task never reached a terminal status");
}

#[tokio::test]
async fn grid_without_matching_account_fails_as_account_not_found() {
    set_test_credentials();
    let dir = tempfile::tempdir().expect("tempdir");
    let portal = Arc::new(FakePortal::new());
    portal.with(|s| s.grid_rows = vec!["999999  11.111.111/0001-11  Outra".to_string()]);

    let store = Arc::new(TaskStore::new());
    let factory = Arc::new(FakeFactory {
        portal: Arc::clone(&portal),
        active: Arc::new(Mutex::new((0, 0))),
    });
    let manager = AutomationTaskManager::new(store, factory, test_config(dir.path().to_path_buf()));

    let id = manager.submit(AutomationRequest {
        file_path: PathBuf::from("/tmp/conversao_teste.txt"),
        account: account(),
        mode: RunMode::Production,
    });

    let terminal = poll_terminal(&manager, &id).await;
    assert_eq!(terminal.status, AutomationStatus::Failure);
    assert_eq!(terminal.details, "AccountNotFound");
    assert!(terminal.message.contains("123456"));
}

#[tokio::test]
async fn unknown_inscription_fails_before_the_browser() {
    set_test_credentials();
    let dir = tempfile::tempdir().expect("tempdir");
    let portal = Arc::new(FakePortal::new());
    let store = Arc::new(TaskStore::new());
    let active = Arc::new(Mutex::new((0, 0)));
    let factory = Arc::new(FakeFactory {
        portal,
        active: Arc::clone(&active),
    });
    let manager = AutomationTaskManager::new(store, factory, test_config(dir.path().to_path_buf()));

    let id = manager.submit(AutomationRequest {
        file_path: PathBuf::from("/tmp/conversao_teste.txt"),
        account: AccountRef {
            inscricao: Some("999999".to_string()),
            cnpj: None,
        },
        mode: RunMode::Production,
    });

    let terminal = poll_terminal(&manager, &id).await;
    assert_eq!(terminal.status, AutomationStatus::Failure);
    assert_eq!(terminal.details, "MissingCredentials");
    // No session was ever opened.
    assert_eq!(active.lock().unwrap().1, 0);
}

#[tokio::test]
async fn automation_jobs_are_serialized() {
    set_test_credentials();
    let dir = tempfile::tempdir().expect("tempdir");
    let portal = Arc::new(FakePortal::new());
    let store = Arc::new(TaskStore::new());
    let active = Arc::new(Mutex::new((0, 0)));
    let factory = Arc::new(FakeFactory {
        portal,
        active: Arc::clone(&active),
    });
    let manager = AutomationTaskManager::new(store, factory, test_config(dir.path().to_path_buf()));

    let first = manager.submit(AutomationRequest {
        file_path: PathBuf::from("/tmp/a.txt"),
        account: account(),
        mode: RunMode::Production,
    });
    let second = manager.submit(AutomationRequest {
        file_path: PathBuf::from("/tmp/b.txt"),
        account: account(),
        mode: RunMode::Production,
    });

    let first_terminal = poll_terminal(&manager, &first).await;
    let second_terminal = poll_terminal(&manager, &second).await;
    assert!(first_terminal.status.is_terminal());
    assert!(second_terminal.status.is_terminal());

    // The session mutex admitted at most one job at a time.
    assert_eq!(active.lock().unwrap().1, 1);
}
