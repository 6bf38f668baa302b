use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserError, BrowserResult, ElementRef, PageSession, SessionFactory, SessionId};

const IS_CONNECTED_JS: &str = "function() { return this.isConnected; }";
const IS_DISPLAYED_JS: &str = "function() { \
    if (!this.isConnected) { return false; } \
    const style = window.getComputedStyle(this); \
    if (style.visibility === 'hidden' || style.display === 'none') { return false; } \
    return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length); \
}";
const IS_ENABLED_JS: &str = "function() { return !this.disabled; }";

fn driver(err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Driver(err.to_string())
}

/// Launches one Chromium instance per session so runs never share state.
#[derive(Debug, Clone)]
pub struct ChromeSessionFactory {
    headless: bool,
    executable: Option<PathBuf>,
    download_dir: PathBuf,
}

impl ChromeSessionFactory {
    pub fn new(headless: bool, executable: Option<PathBuf>, download_dir: PathBuf) -> Self {
        Self {
            headless,
            executable,
            download_dir,
        }
    }

    fn browser_config(&self, profile_dir: &PathBuf) -> BrowserResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(BrowserError::Driver)
    }
}

#[async_trait::async_trait]
impl SessionFactory for ChromeSessionFactory {
    #[tracing::instrument(name = "browser launch", skip(self), fields(browser.headless = self.headless))]
    async fn create(&self) -> BrowserResult<Arc<dyn PageSession>> {
        let id = SessionId::new();
        let profile_dir = std::env::temp_dir().join(format!("report-weaver-{id}"));
        let config = self.browser_config(&profile_dir)?;

        let (mut browser, mut handler) = Browser::launch(config).await.map_err(driver)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser event loop stopped");
                    break;
                }
            }
        });

        let prepared = async {
            let download = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(self.download_dir.to_string_lossy().to_string())
                .build()
                .map_err(BrowserError::Driver)?;
            browser.execute(download).await.map_err(driver)?;
            browser.new_page("about:blank").await.map_err(driver)
        }
        .await;

        let page = match prepared {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                events.abort();
                return Err(e);
            }
        };

        Ok(Arc::new(ChromeSession {
            id,
            created_at: Utc::now(),
            page,
            elements: Mutex::new(HashMap::new()),
            next_element: AtomicU64::new(0),
            browser: Mutex::new(Some(browser)),
            events,
            profile_dir,
        }))
    }
}

/// A [`PageSession`] backed by a single Chromium tab.
///
/// Elements handed out are kept in a per-session table under ids that are
/// never reused, so the trait stays free of driver types.
pub struct ChromeSession {
    id: SessionId,
    created_at: DateTime<Utc>,
    page: Page,
    elements: Mutex<HashMap<u64, Arc<Element>>>,
    next_element: AtomicU64,
    browser: Mutex<Option<Browser>>,
    events: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl ChromeSession {
    async fn remember(&self, found: Vec<Element>) -> Vec<ElementRef> {
        let mut elements = self.elements.lock().await;
        found
            .into_iter()
            .map(|element| {
                let id = self.next_element.fetch_add(1, Ordering::Relaxed);
                elements.insert(id, Arc::new(element));
                ElementRef::new(id)
            })
            .collect()
    }

    async fn element(&self, element: ElementRef) -> BrowserResult<Arc<Element>> {
        let elements = self.elements.lock().await;
        elements
            .get(&element.id())
            .cloned()
            .ok_or(BrowserError::UnknownElement(element.id()))
    }

    async fn eval_bool(&self, element: ElementRef, function: &str) -> BrowserResult<bool> {
        let element = self.element(element).await?;
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|_| BrowserError::StaleElement)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn ensure_open(&self) -> BrowserResult<()> {
        if self.browser.lock().await.is_none() {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageSession for ChromeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn open(&self, url: &str) -> BrowserResult<()> {
        self.ensure_open().await?;
        self.page.goto(url).await.map_err(driver)?;
        // Handles from the previous document can never be valid again.
        self.elements.lock().await.clear();
        Ok(())
    }

    async fn find_one(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Option<ElementRef>> {
        self.ensure_open().await?;
        let found = match scope {
            None => self.page.find_element(selector).await.ok(),
            Some(scope) => {
                let parent = self.element(scope).await?;
                match parent.find_element(selector).await {
                    Ok(element) => Some(element),
                    // A miss under a detached scope means the scope went stale.
                    Err(_) => {
                        if self.is_stale(scope).await? {
                            return Err(BrowserError::StaleElement);
                        }
                        None
                    }
                }
            }
        };
        let Some(element) = found else {
            return Ok(None);
        };
        Ok(self.remember(vec![element]).await.into_iter().next())
    }

    async fn find_all(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Vec<ElementRef>> {
        self.ensure_open().await?;
        let found = match scope {
            None => self.page.find_elements(selector).await.map_err(driver)?,
            Some(scope) => {
                let scope = self.element(scope).await?;
                scope
                    .find_elements(selector)
                    .await
                    .map_err(|_| BrowserError::StaleElement)?
            }
        };
        Ok(self.remember(found).await)
    }

    async fn is_displayed(&self, element: ElementRef) -> BrowserResult<bool> {
        self.eval_bool(element, IS_DISPLAYED_JS).await
    }

    async fn is_stale(&self, element: ElementRef) -> BrowserResult<bool> {
        match self.eval_bool(element, IS_CONNECTED_JS).await {
            Ok(connected) => Ok(!connected),
            Err(BrowserError::StaleElement | BrowserError::UnknownElement(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: ElementRef) -> BrowserResult<()> {
        let element = self.element(element).await?;
        element.click().await.map_err(driver)?;
        Ok(())
    }

    async fn send_keys(&self, element: ElementRef, text: &str) -> BrowserResult<()> {
        let element = self.element(element).await?;
        element.focus().await.map_err(driver)?;
        element.type_str(text).await.map_err(driver)?;
        Ok(())
    }

    async fn text(&self, element: ElementRef) -> BrowserResult<String> {
        let element = self.element(element).await?;
        let text = element.inner_text().await.map_err(driver)?;
        Ok(text.unwrap_or_default().trim().to_string())
    }

    async fn attribute(&self, element: ElementRef, name: &str) -> BrowserResult<Option<String>> {
        let element = self.element(element).await?;
        element.attribute(name).await.map_err(driver)
    }

    async fn is_enabled(&self, element: ElementRef) -> BrowserResult<bool> {
        self.eval_bool(element, IS_ENABLED_JS).await
    }

    async fn release(&self, elements: &[ElementRef]) {
        let mut table = self.elements.lock().await;
        for element in elements {
            table.remove(&element.id());
        }
    }

    async fn release_through(&self, last: ElementRef) {
        self.elements
            .lock()
            .await
            .retain(|id, _| *id > last.id());
    }

    async fn close(&self) -> BrowserResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        self.elements.lock().await.clear();

        let closed = browser.close().await.map_err(driver);
        let _ = browser.wait().await;
        self.events.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            tracing::debug!(error = %e, path = %self.profile_dir.display(), "profile directory not removed");
        }

        closed.map(|_| ())
    }
}
