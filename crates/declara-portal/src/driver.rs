//! Browser capability seam.
//!
//! [`PortalPage`] is the minimal surface the agent needs from a rendered
//! page; the Chromium implementation drives a real browser over CDP, and
//! tests drive the agent against a scripted fake. Keeping the seam this
//! narrow is what makes the keypad/grid logic testable without a browser.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{BrowserSettings, RunMode};
use crate::error::{AutomationError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What the agent can do to a rendered portal page.
#[async_trait]
pub trait PortalPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> Result<()>;
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;
    /// Waits until the element is gone or hidden.
    async fn wait_gone(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    /// The element's `value` attribute, falling back to its inner text.
    async fn read_value(&self, selector: &str) -> Result<Option<String>>;
    async fn read_text(&self, selector: &str) -> Result<Option<String>>;
    /// Finds the grid row whose text contains `row_text` and clicks the
    /// image button whose generated id contains `action_id_fragment`.
    /// Returns false when no row matches.
    async fn click_grid_row_action(
        &self,
        row_text: &str,
        action_id_fragment: &str,
    ) -> Result<bool>;
    /// Sets the file path directly on a (hidden) upload input, bypassing the
    /// native picker dialog.
    async fn set_hidden_file_input(&self, selector: &str, path: &Path) -> Result<()>;
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// An exclusive authenticated browser session.
#[async_trait]
pub trait PortalSession: Send {
    fn page(&self) -> &dyn PortalPage;
    async fn close(self: Box<Self>);
}

/// Opens sessions on demand; the task manager holds one of these so tests
/// can substitute scripted sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, mode: RunMode) -> Result<Box<dyn PortalSession>>;
}

/// [`PortalPage`] over a real Chromium tab.
pub struct ChromiumPortalPage {
    page: Page,
    /// Pause after each interaction; development mode slows the session down
    /// for visual debugging.
    action_delay: Duration,
}

impl ChromiumPortalPage {
    async fn eval_bool(&self, expression: String) -> Result<bool> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(AutomationError::browser)?;
        result.into_value().map_err(AutomationError::browser)
    }

    async fn pace(&self) {
        if !self.action_delay.is_zero() {
            tokio::time::sleep(self.action_delay).await;
        }
    }
}

#[async_trait]
impl PortalPage for ChromiumPortalPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(AutomationError::browser)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(AutomationError::browser)?;
        Ok(url.unwrap_or_default())
    }

    async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.current_url().await?.contains(fragment) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout {
                    waiting_for: format!("navegação para '{fragment}'"),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_visible(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout {
                    waiting_for: format!("elemento '{selector}'"),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_gone(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_visible(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout {
                    waiting_for: format!("desaparecimento de '{selector}'"),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             return !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length); }})()"
        );
        self.eval_bool(expression).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             if (!el) return false; \
             el.value = {value:?}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()"
        );
        if !self.eval_bool(expression).await? {
            return Err(AutomationError::Browser(format!(
                "elemento '{selector}' não encontrado para preenchimento"
            )));
        }
        self.pace().await;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(AutomationError::browser)?;
        element.click().await.map_err(AutomationError::browser)?;
        self.pace().await;
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<Option<String>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(AutomationError::browser)?;
        if let Some(value) = element
            .attribute("value")
            .await
            .map_err(AutomationError::browser)?
        {
            return Ok(Some(value));
        }
        element.inner_text().await.map_err(AutomationError::browser)
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(AutomationError::browser)?;
        let text = element
            .inner_text()
            .await
            .map_err(AutomationError::browser)?;
        Ok(text.map(|t| t.trim().to_string()))
    }

    async fn click_grid_row_action(
        &self,
        row_text: &str,
        action_id_fragment: &str,
    ) -> Result<bool> {
        // Grid ids are regenerated per session; match on cell text and the
        // stable id fragment instead.
        let expression = format!(
            "(() => {{ \
             const needle = {row_text:?}; \
             const rows = Array.from(document.querySelectorAll('tr')); \
             for (const row of rows) {{ \
               if (!row.textContent || !row.textContent.includes(needle)) continue; \
               const button = row.querySelector('input[type=\"image\"][id*=' + {action_id_fragment:?} + ']'); \
               if (button) {{ button.click(); return true; }} \
             }} \
             return false; }})()"
        );
        let clicked = self.eval_bool(expression).await?;
        self.pace().await;
        Ok(clicked)
    }

    async fn set_hidden_file_input(&self, selector: &str, path: &Path) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(AutomationError::browser)?;
        let mut params =
            SetFileInputFilesParams::new(vec![path.to_string_lossy().into_owned()]);
        params.backend_node_id = Some(element.backend_node_id);
        self.page
            .execute(params)
            .await
            .map_err(AutomationError::browser)?;
        debug!(path = %path.display(), "file injected into hidden upload input");
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(AutomationError::browser)
    }
}

/// A launched Chromium instance plus the event-handler loop that keeps its
/// CDP connection alive.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: ChromiumPortalPage,
}

impl ChromiumSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_size.0, settings.window_size.1);
        if !settings.headless {
            builder = builder.with_head();
        }
        for arg in &settings.extra_args {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(AutomationError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(AutomationError::browser)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(%err, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(AutomationError::browser)?;

        Ok(Self {
            browser,
            handler_task,
            page: ChromiumPortalPage {
                page,
                action_delay: settings.slow_motion,
            },
        })
    }
}

#[async_trait]
impl PortalSession for ChromiumSession {
    fn page(&self) -> &dyn PortalPage {
        &self.page
    }

    async fn close(mut self: Box<Self>) {
        if let Err(err) = self.browser.close().await {
            warn!(%err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

/// Launches one Chromium session per automation job.
#[derive(Debug, Default)]
pub struct ChromiumSessionFactory;

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open(&self, mode: RunMode) -> Result<Box<dyn PortalSession>> {
        let settings = BrowserSettings::for_mode(mode);
        let session = ChromiumSession::launch(&settings).await?;
        Ok(Box::new(session))
    }
}
