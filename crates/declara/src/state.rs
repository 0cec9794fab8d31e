use std::sync::Arc;

use declara_core::task::TaskStore;
use declara_core::{ConversionTaskManager, StoragePaths};
use declara_portal::config::PortalConfig;
use declara_portal::driver::SessionFactory;
use declara_portal::task::{AutomationTask, AutomationTaskManager};

/// Process-wide wiring: the two task managers over their injected stores,
/// plus the storage layout. Built once at startup, shared by every route.
pub struct AppState {
    pub storage: StoragePaths,
    pub conversions: ConversionTaskManager,
    pub automations: AutomationTaskManager,
}

impl AppState {
    pub fn new(
        storage: StoragePaths,
        portal_config: PortalConfig,
        session_factory: Arc<dyn SessionFactory>,
    ) -> anyhow::Result<Arc<Self>> {
        storage.ensure_dirs()?;

        let conversion_store = Arc::new(TaskStore::new());
        let automation_store: Arc<TaskStore<AutomationTask>> = Arc::new(TaskStore::new());

        let conversions =
            ConversionTaskManager::new(conversion_store, storage.downloads_dir.clone());
        let automations =
            AutomationTaskManager::new(automation_store, session_factory, portal_config);

        Ok(Arc::new(Self {
            storage,
            conversions,
            automations,
        }))
    }
}
