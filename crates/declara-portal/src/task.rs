//! Automation job lifecycle.
//!
//! The portal session is one shared authenticated browser identity, so jobs
//! are serialized: a fair async mutex admits one agent run at a time and
//! queues the rest in submission order.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use declara_core::task::TaskStore;

use crate::agent::{AccountRef, AutomationAgent};
use crate::config::{credentials_for, PortalConfig, RunMode};
use crate::driver::SessionFactory;
use crate::error::AutomationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl AutomationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomationStatus::Success | AutomationStatus::Failure)
    }
}

/// Snapshot of an automation job as exposed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: Uuid,
    pub status: AutomationStatus,
    pub message: String,
    /// Failure class name on failure, empty otherwise.
    pub details: String,
}

impl AutomationTask {
    pub fn pending(id: Uuid) -> Self {
        Self {
            id,
            status: AutomationStatus::Pending,
            message: "Aguardando sessão do portal...".to_string(),
            details: String::new(),
        }
    }
}

/// Everything an automation job needs at submission time.
#[derive(Debug, Clone)]
pub struct AutomationRequest {
    pub file_path: PathBuf,
    pub account: AccountRef,
    pub mode: RunMode,
}

pub struct AutomationTaskManager {
    store: Arc<TaskStore<AutomationTask>>,
    factory: Arc<dyn SessionFactory>,
    config: Arc<PortalConfig>,
    /// Fair: queued submissions acquire in FIFO order.
    session_lock: Arc<Mutex<()>>,
}

impl AutomationTaskManager {
    pub fn new(
        store: Arc<TaskStore<AutomationTask>>,
        factory: Arc<dyn SessionFactory>,
        config: PortalConfig,
    ) -> Self {
        Self {
            store,
            factory,
            config: Arc::new(config),
            session_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Registers a pending task and queues it behind any running session.
    /// Returns immediately with the task id.
    pub fn submit(&self, request: AutomationRequest) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert(id, AutomationTask::pending(id));

        let store = Arc::clone(&self.store);
        let factory = Arc::clone(&self.factory);
        let config = Arc::clone(&self.config);
        let session_lock = Arc::clone(&self.session_lock);
        tokio::spawn(async move {
            let _session_guard = session_lock.lock().await;
            run_automation(store, factory, config, id, request).await;
        });

        info!(task_id = %id, "automation job submitted");
        id
    }

    pub fn status(&self, id: &Uuid) -> Option<AutomationTask> {
        self.store.get(id)
    }
}

async fn run_automation(
    store: Arc<TaskStore<AutomationTask>>,
    factory: Arc<dyn SessionFactory>,
    config: Arc<PortalConfig>,
    id: Uuid,
    request: AutomationRequest,
) {
    store.update(&id, |task| {
        task.status = AutomationStatus::Running;
        task.message = "Iniciando sessão do portal...".to_string();
    });

    match execute(&store, factory.as_ref(), &config, id, &request).await {
        Ok(message) => {
            info!(task_id = %id, "automation succeeded");
            store.update(&id, |task| {
                task.status = AutomationStatus::Success;
                task.message = message.clone();
                task.details = String::new();
            });
        }
        Err(err) => {
            error!(task_id = %id, %err, class = err.class_name(), "automation failed");
            store.update(&id, |task| {
                task.status = AutomationStatus::Failure;
                task.message = err.to_string();
                task.details = err.class_name().to_string();
            });
        }
    }
}

async fn execute(
    store: &Arc<TaskStore<AutomationTask>>,
    factory: &dyn SessionFactory,
    config: &PortalConfig,
    id: Uuid,
    request: &AutomationRequest,
) -> Result<String, AutomationError> {
    // Credentials are keyed by the destination inscription; resolving them
    // requires no browser, so fail fast.
    let inscricao = request
        .account
        .inscricao
        .clone()
        .unwrap_or_default();
    let credentials =
        credentials_for(&inscricao).ok_or_else(|| AutomationError::MissingCredentials {
            inscricao: inscricao.clone(),
        })?;

    let session = factory.open(request.mode).await?;
    let agent = AutomationAgent::new(session.page(), config, id);

    let store_for_progress = Arc::clone(store);
    let mut progress = |message: &str| {
        store_for_progress.update(&id, |task| {
            task.message = message.to_string();
        });
    };

    let result = agent
        .run(
            &credentials,
            &request.account,
            &request.file_path,
            &mut progress,
        )
        .await;

    session.close().await;

    result.map(|outcome| outcome.message)
}
