pub mod chrome;
pub mod poll;
pub mod registry;
pub mod wait;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::PipelineError;

pub use chrome::ChromeSessionFactory;
pub use poll::{PollError, Poller};
pub use registry::SessionRegistry;
pub use wait::{PageTurn, Waiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to an element of the page a session currently shows.
///
/// A handle is only meaningful until the page re-renders. Callers must
/// re-query after any navigation or pagination instead of reusing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(u64);

impl ElementRef {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("stale element reference")]
    StaleElement,

    #[error("unknown element reference {0}")]
    UnknownElement(u64),

    #[error("session is closed")]
    Closed,

    #[error("{0}")]
    Driver(String),
}

impl From<BrowserError> for PipelineError {
    fn from(err: BrowserError) -> Self {
        PipelineError::Browser(err.to_string())
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// One isolated browser-automation context.
///
/// `scope` restricts a lookup to the descendants of an element; `None`
/// searches the whole page. Lookups never wait: bounded waits are built
/// on top of these primitives by [`Waiter`].
#[async_trait::async_trait]
pub trait PageSession: Send + Sync {
    fn id(&self) -> SessionId;

    fn created_at(&self) -> DateTime<Utc>;

    async fn open(&self, url: &str) -> BrowserResult<()>;

    async fn find_one(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Option<ElementRef>>;

    async fn find_all(
        &self,
        selector: &str,
        scope: Option<ElementRef>,
    ) -> BrowserResult<Vec<ElementRef>>;

    async fn is_displayed(&self, element: ElementRef) -> BrowserResult<bool>;

    /// True once the element has been detached from the live document.
    async fn is_stale(&self, element: ElementRef) -> BrowserResult<bool>;

    async fn click(&self, element: ElementRef) -> BrowserResult<()>;

    async fn send_keys(&self, element: ElementRef, text: &str) -> BrowserResult<()>;

    async fn text(&self, element: ElementRef) -> BrowserResult<String>;

    async fn attribute(&self, element: ElementRef, name: &str) -> BrowserResult<Option<String>>;

    async fn is_enabled(&self, element: ElementRef) -> BrowserResult<bool>;

    /// Forgets `elements`; later use of them reports them stale.
    async fn release(&self, elements: &[ElementRef]);

    /// Forgets every handle issued up to and including `last`.
    async fn release_through(&self, last: ElementRef);

    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> BrowserResult<Arc<dyn PageSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_browser_error_into_pipeline_error() {
        let err: PipelineError = BrowserError::StaleElement.into();
        assert_eq!(err.to_string(), "Browser error: stale element reference");
    }
}
