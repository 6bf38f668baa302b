use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::poll::{PollError, Poller};
use super::{ElementRef, PageSession};
use crate::error::{PipelineError, PipelineResult};

/// Outcome of one attempt to move a paginated listing forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    /// Next control was clicked and the previous first row went stale.
    Advanced,
    /// Next control is present but disabled.
    LastPage,
    /// Next control never became visible.
    NoControl,
    /// The previous rows never detached after clicking next.
    FenceTimeout,
}

/// Bounded element waits over a [`PageSession`].
///
/// Every wait polls the session's non-blocking lookups with one shared
/// [`Poller`] and aborts early when the run's cancellation token fires.
#[derive(Debug, Clone)]
pub struct Waiter {
    poller: Poller,
    cancel: CancellationToken,
}

impl Waiter {
    pub fn new(timeout: Duration, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            poller: Poller::new(interval, timeout),
            cancel,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.poller.timeout()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            poller: self.poller.with_timeout(timeout),
            cancel: self.cancel.clone(),
        }
    }

    fn fail(&self, err: PollError, what: &str) -> PipelineError {
        match err {
            PollError::Cancelled => PipelineError::Cancelled,
            PollError::TimedOut => PipelineError::ElementTimeout {
                selector: what.to_string(),
                timeout: self.poller.timeout(),
            },
        }
    }

    pub async fn visible(
        &self,
        session: &dyn PageSession,
        selector: &str,
    ) -> PipelineResult<ElementRef> {
        self.poller
            .until(&self.cancel, || async move {
                let element = session.find_one(selector, None).await.ok().flatten()?;
                session
                    .is_displayed(element)
                    .await
                    .unwrap_or(false)
                    .then_some(element)
            })
            .await
            .map_err(|e| self.fail(e, selector))
    }

    /// Waits until any of `selectors` is visible and reports which one.
    pub async fn first_visible(
        &self,
        session: &dyn PageSession,
        selectors: &[&str],
    ) -> PipelineResult<(usize, ElementRef)> {
        self.poller
            .until(&self.cancel, || async move {
                for (idx, selector) in selectors.iter().enumerate() {
                    if let Ok(Some(element)) = session.find_one(selector, None).await
                        && session.is_displayed(element).await.unwrap_or(false)
                    {
                        return Some((idx, element));
                    }
                }
                None
            })
            .await
            .map_err(|e| self.fail(e, &selectors.join(" | ")))
    }

    pub async fn present(
        &self,
        session: &dyn PageSession,
        selector: &str,
    ) -> PipelineResult<ElementRef> {
        self.poller
            .until(&self.cancel, || async move {
                session.find_one(selector, None).await.ok().flatten()
            })
            .await
            .map_err(|e| self.fail(e, selector))
    }

    pub async fn present_in(
        &self,
        session: &dyn PageSession,
        scope: ElementRef,
        selector: &str,
    ) -> PipelineResult<ElementRef> {
        self.poller
            .until(&self.cancel, || async move {
                session.find_one(selector, Some(scope)).await.ok().flatten()
            })
            .await
            .map_err(|e| self.fail(e, selector))
    }

    /// Waits for at least one match and returns every match.
    pub async fn all_present(
        &self,
        session: &dyn PageSession,
        selector: &str,
    ) -> PipelineResult<Vec<ElementRef>> {
        self.poller
            .until(&self.cancel, || async move {
                let elements = session.find_all(selector, None).await.ok()?;
                (!elements.is_empty()).then_some(elements)
            })
            .await
            .map_err(|e| self.fail(e, selector))
    }

    /// Waits for at least one match with every match displayed.
    pub async fn all_visible(
        &self,
        session: &dyn PageSession,
        selector: &str,
    ) -> PipelineResult<Vec<ElementRef>> {
        self.poller
            .until(&self.cancel, || async move {
                let elements = session.find_all(selector, None).await.ok()?;
                if elements.is_empty() {
                    return None;
                }
                for element in &elements {
                    if !session.is_displayed(*element).await.unwrap_or(false) {
                        return None;
                    }
                }
                Some(elements)
            })
            .await
            .map_err(|e| self.fail(e, selector))
    }

    pub async fn stale(&self, session: &dyn PageSession, element: ElementRef) -> PipelineResult<()> {
        self.poller
            .until(&self.cancel, || async move {
                session.is_stale(element).await.unwrap_or(true).then_some(())
            })
            .await
            .map_err(|e| self.fail(e, "staleness of previous page"))
    }

    pub async fn text_in(
        &self,
        session: &dyn PageSession,
        scope: ElementRef,
        selector: &str,
    ) -> PipelineResult<String> {
        let element = self.present_in(session, scope, selector).await?;
        Ok(session.text(element).await?)
    }

    pub async fn visible_text(
        &self,
        session: &dyn PageSession,
        selector: &str,
    ) -> PipelineResult<String> {
        let element = self.visible(session, selector).await?;
        Ok(session.text(element).await?)
    }

    pub async fn attribute_in(
        &self,
        session: &dyn PageSession,
        scope: ElementRef,
        selector: &str,
        name: &str,
    ) -> PipelineResult<String> {
        let element = self.present_in(session, scope, selector).await?;
        session
            .attribute(element, name)
            .await?
            .ok_or_else(|| PipelineError::Browser(format!("{selector} has no {name} attribute")))
    }

    /// Moves a listing to its next page behind the pagination fence.
    ///
    /// The next control is clicked only when enabled, and the call returns
    /// `Advanced` only after `first_row` of the page just read has detached.
    /// Every handle issued before the click is released then, so rows must
    /// be re-queried afterwards.
    pub async fn turn_page(
        &self,
        session: &dyn PageSession,
        next_selector: &str,
        first_row: ElementRef,
    ) -> PipelineResult<PageTurn> {
        let next = match self.visible(session, next_selector).await {
            Ok(element) => element,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(_) => return Ok(PageTurn::NoControl),
        };

        if !session.is_enabled(next).await.unwrap_or(false) {
            return Ok(PageTurn::LastPage);
        }

        if let Err(e) = session.click(next).await {
            tracing::debug!(error = %e, "next page control rejected click");
            return Ok(PageTurn::NoControl);
        }

        match self.stale(session, first_row).await {
            Ok(()) => {
                session.release_through(next).await;
                Ok(PageTurn::Advanced)
            }
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(_) => Ok(PageTurn::FenceTimeout),
        }
    }
}
