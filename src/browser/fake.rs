//! Scripted in-memory pages for exercising the pipeline without a browser.
//!
//! A [`FakeSite`] maps URLs (or view names) to declarative element trees.
//! Lookups match selectors by exact string. Clicking an element with an
//! `on_click` target replaces the whole page, so every previously issued
//! [`ElementRef`] becomes stale, the same way a re-rendered listing behaves.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{BrowserError, BrowserResult, ElementRef, PageSession, SessionFactory, SessionId};
use crate::portal::selectors;

#[derive(Debug, Clone)]
pub struct FakeElement {
    selector: String,
    label: String,
    text: String,
    attrs: HashMap<String, String>,
    enabled: bool,
    displayed: bool,
    children: Vec<FakeElement>,
    on_click: Option<String>,
}

impl FakeElement {
    pub fn new(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        Self {
            label: selector.clone(),
            selector,
            text: String::new(),
            attrs: HashMap::new(),
            enabled: true,
            displayed: true,
            children: Vec::new(),
            on_click: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn on_click(mut self, view: impl Into<String>) -> Self {
        self.on_click = Some(view.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeView {
    elements: Vec<FakeElement>,
}

impl FakeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    views: HashMap<String, FakeView>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, key: impl Into<String>, view: FakeView) -> Self {
        self.views.insert(key.into(), view);
        self
    }

    /// Registers the full portal login sequence at `entry`, ending on `landing`.
    pub fn with_login(self, entry: &str, landing: &str) -> Self {
        let sso = format!("{entry}#sso");
        let duo = format!("{entry}#duo");
        self.view(entry, login_view(&sso))
            .view(
                sso.clone(),
                FakeView::new()
                    .with(FakeElement::new(selectors::LOGIN_USERNAME))
                    .with(FakeElement::new(selectors::LOGIN_PASSWORD))
                    .with(FakeElement::new(selectors::LOGIN_SUBMIT).on_click(duo.clone())),
            )
            .view(
                duo,
                FakeView::new()
                    .with(FakeElement::new(selectors::TRUST_BROWSER_BUTTON).on_click(landing)),
            )
    }
}

/// The identifier page with the hidden SSO flag set to `"true"`.
pub fn login_view(after_submit: &str) -> FakeView {
    FakeView::new()
        .with(FakeElement::new(selectors::LOGIN_EMAIL))
        .with(FakeElement::new(selectors::LOGIN_MODE_SSO))
        .with(
            FakeElement::new(selectors::SSO_ENABLED_FLAG)
                .hidden()
                .attr("value", "true"),
        )
        .with(FakeElement::new(selectors::LOGIN_SUBMIT_IDENTIFIER).on_click(after_submit))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Opened { session: usize, url: String },
    Clicked(String),
    Typed { label: String, text: String },
    Queried { scope: String, selector: String },
    Read(String),
    Released(usize),
    ReleasedThrough(u64),
    Closed(usize),
}

#[derive(Debug, Default)]
pub struct FakeLog {
    events: Mutex<Vec<FakeEvent>>,
}

impl FakeLog {
    fn push(&self, event: FakeEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Clicked(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Typed { label, text } => Some((label, text)),
                _ => None,
            })
            .collect()
    }

    pub fn queried(&self, scope: &str, selector: &str) -> bool {
        self.events().iter().any(|e| {
            matches!(e, FakeEvent::Queried { scope: s, selector: sel } if s == scope && sel == selector)
        })
    }

    pub fn releases(&self) -> Vec<FakeEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, FakeEvent::Released(_) | FakeEvent::ReleasedThrough(_)))
            .collect()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Opened { url, .. } => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn closed_sessions(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Closed(index) => Some(index),
                _ => None,
            })
            .collect()
    }
}

struct Node {
    def: FakeElement,
    children: Vec<u64>,
}

#[derive(Default)]
struct PageState {
    nodes: HashMap<u64, Node>,
    roots: Vec<u64>,
    next_id: u64,
    released: HashSet<u64>,
    released_through: Option<u64>,
    closed: bool,
}

impl PageState {
    fn load(&mut self, view: &FakeView) {
        self.nodes.clear();
        let roots: Vec<u64> = view.elements.iter().map(|e| self.instantiate(e)).collect();
        self.roots = roots;
    }

    fn instantiate(&mut self, element: &FakeElement) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let children = element
            .children
            .iter()
            .map(|c| self.instantiate(c))
            .collect();
        let mut def = element.clone();
        def.children.clear();
        self.nodes.insert(id, Node { def, children });
        id
    }

    fn collect(&self, ids: &[u64], selector: &str, out: &mut Vec<ElementRef>) {
        for id in ids {
            if let Some(node) = self.nodes.get(id) {
                if node.def.selector == selector {
                    out.push(ElementRef::new(*id));
                }
                self.collect(&node.children, selector, out);
            }
        }
    }

    fn is_released(&self, id: u64) -> bool {
        self.released.contains(&id) || self.released_through.is_some_and(|last| id <= last)
    }

    fn node(&self, element: ElementRef) -> BrowserResult<&Node> {
        if self.is_released(element.id()) {
            return Err(BrowserError::StaleElement);
        }
        self.nodes
            .get(&element.id())
            .ok_or(BrowserError::StaleElement)
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }
}

pub struct FakeSession {
    id: SessionId,
    index: usize,
    created_at: DateTime<Utc>,
    site: Arc<FakeSite>,
    log: Arc<FakeLog>,
    state: Mutex<PageState>,
    fail_close: bool,
}

impl FakeSession {
    pub fn new(site: Arc<FakeSite>, log: Arc<FakeLog>, index: usize) -> Self {
        Self {
            id: SessionId::new(),
            index,
            created_at: Utc::now(),
            site,
            log,
            state: Mutex::new(PageState::default()),
            fail_close: false,
        }
    }

    pub fn standalone(site: FakeSite) -> Self {
        Self::new(Arc::new(site), Arc::new(FakeLog::default()), 0)
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn log(&self) -> Arc<FakeLog> {
        self.log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn view(&self, key: &str) -> FakeView {
        self.site.views.get(key).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PageSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn open(&self, url: &str) -> BrowserResult<()> {
        let view = self.view(url);
        let mut state = self.lock();
        state.ensure_open()?;
        self.log.push(FakeEvent::Opened {
            session: self.index,
            url: url.to_string(),
        });
        state.load(&view);
        Ok(())
    }

    async fn find_one(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Option<ElementRef>> {
        Ok(self.find_all(selector, scope).await?.into_iter().next())
    }

    async fn find_all(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Vec<ElementRef>> {
        let mut state = self.lock();
        state.ensure_open()?;
        let roots = match scope {
            None => state.roots.clone(),
            Some(scope) => {
                let node = state.node(scope)?;
                self.log.push(FakeEvent::Queried {
                    scope: node.def.label.clone(),
                    selector: selector.to_string(),
                });
                node.children.clone()
            }
        };
        let mut found = Vec::new();
        state.collect(&roots, selector, &mut found);
        // A fresh lookup reissues the handle.
        for element in &found {
            state.released.remove(&element.id());
        }
        Ok(found)
    }

    async fn is_displayed(&self, element: ElementRef) -> BrowserResult<bool> {
        Ok(self.lock().node(element)?.def.displayed)
    }

    async fn is_stale(&self, element: ElementRef) -> BrowserResult<bool> {
        Ok(self.lock().node(element).is_err())
    }

    async fn click(&self, element: ElementRef) -> BrowserResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let node = state.node(element)?;
        self.log.push(FakeEvent::Clicked(node.def.label.clone()));
        if !node.def.enabled {
            return Ok(());
        }
        if let Some(target) = node.def.on_click.clone() {
            let view = self.view(&target);
            state.load(&view);
        }
        Ok(())
    }

    async fn send_keys(&self, element: ElementRef, text: &str) -> BrowserResult<()> {
        let state = self.lock();
        let node = state.node(element)?;
        self.log.push(FakeEvent::Typed {
            label: node.def.label.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn text(&self, element: ElementRef) -> BrowserResult<String> {
        let state = self.lock();
        let node = state.node(element)?;
        self.log.push(FakeEvent::Read(node.def.label.clone()));
        Ok(node.def.text.clone())
    }

    async fn attribute(&self, element: ElementRef, name: &str) -> BrowserResult<Option<String>> {
        let state = self.lock();
        let node = state.node(element)?;
        self.log
            .push(FakeEvent::Read(format!("{}@{name}", node.def.label)));
        Ok(node.def.attrs.get(name).cloned())
    }

    async fn is_enabled(&self, element: ElementRef) -> BrowserResult<bool> {
        Ok(self.lock().node(element)?.def.enabled)
    }

    async fn release(&self, elements: &[ElementRef]) {
        let mut state = self.lock();
        state.released.extend(elements.iter().map(|e| e.id()));
        self.log.push(FakeEvent::Released(elements.len()));
    }

    async fn release_through(&self, last: ElementRef) {
        let mut state = self.lock();
        state.released_through = Some(last.id());
        self.log.push(FakeEvent::ReleasedThrough(last.id()));
    }

    async fn close(&self) -> BrowserResult<()> {
        self.lock().closed = true;
        self.log.push(FakeEvent::Closed(self.index));
        if self.fail_close {
            Err(BrowserError::Driver("browser already gone".to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct FakeSessionFactory {
    site: Arc<FakeSite>,
    log: Arc<FakeLog>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl FakeSessionFactory {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::new(FakeLog::default()),
            created: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let factory = Self::new(FakeSite::new());
        factory.fail_create.store(true, Ordering::SeqCst);
        factory
    }

    pub fn log(&self) -> Arc<FakeLog> {
        self.log.clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(&self) -> BrowserResult<Arc<dyn PageSession>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BrowserError::Driver("browser failed to launch".to_string()));
        }
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession::new(
            self.site.clone(),
            self.log.clone(),
            index,
        )))
    }
}
