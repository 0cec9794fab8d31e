pub mod agent;
pub mod config;
pub mod driver;
pub mod error;
pub mod keypad;
pub mod task;

pub use agent::{AccountRef, AutomationAgent, PortalOutcome};
pub use config::{
    credentials_for, BrowserSettings, PortalConfig, PortalCredentials, PortalTimeouts, RunMode,
};
pub use driver::{ChromiumSessionFactory, PortalPage, PortalSession, SessionFactory};
pub use error::AutomationError;
pub use keypad::KeypadMapping;
pub use task::{AutomationRequest, AutomationStatus, AutomationTask, AutomationTaskManager};
