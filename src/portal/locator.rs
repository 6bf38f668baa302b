use chrono::{DateTime, Utc};

use super::selectors;
use crate::browser::{ElementRef, PageSession, PageTurn, Waiter};
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;
use crate::telemetry::metrics::LISTING_PAGES_SCANNED;

/// Which report row to export.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    /// Substring expected in the row's entity cell.
    pub target: String,
    /// Exact format label, compared case-insensitively.
    pub format: String,
    /// Scan type that must appear among the listing's type labels.
    pub scan_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// The export control of the matching row was clicked.
    Triggered {
        triggered_at: DateTime<Utc>,
        page: u32,
        row: usize,
    },
    NotFound { pages_scanned: u32 },
}

#[derive(Debug, Clone)]
pub struct ReportLocator {
    waiter: Waiter,
    notifier: StatusNotifier,
}

impl ReportLocator {
    pub fn new(waiter: Waiter, notifier: StatusNotifier) -> Self {
        Self { waiter, notifier }
    }

    /// Opens the reports section from the signed-in landing page and waits
    /// for the listing to render.
    #[tracing::instrument(
        name = "pipeline_stage navigate",
        skip(self, session),
        fields(pipeline.stage = "navigate", session.id = %session.id())
    )]
    pub async fn navigate_to_reports(&self, session: &dyn PageSession) -> PipelineResult<()> {
        self.notifier.notify("Navigating to reports...");
        let toggle = self
            .waiter
            .visible(session, selectors::SIDEBAR_REPORTS_TOGGLE)
            .await?;
        session.click(toggle).await?;

        let link = self.waiter.visible(session, selectors::REPORTS_LINK).await?;
        session.click(link).await?;

        self.notifier.notify("Fetching report rows...");
        let rows = self.waiter.all_present(session, selectors::REPORT_ROWS).await?;
        tracing::info!(rows = rows.len(), "report listing loaded");
        Ok(())
    }

    /// Walks the listing page by page and clicks the export control of the
    /// first row matching `query`. Nothing after that row is examined.
    #[tracing::instrument(
        name = "pipeline_stage locate",
        skip(self, session),
        fields(
            pipeline.stage = "locate",
            session.id = %session.id(),
            report.target = %query.target,
            locator.pages_scanned,
        )
    )]
    pub async fn locate(
        &self,
        session: &dyn PageSession,
        query: &ReportQuery,
    ) -> PipelineResult<LocateOutcome> {
        self.notifier.notify("Processing report rows...");
        let span = tracing::Span::current();

        let mut rows = self.waiter.all_present(session, selectors::REPORT_ROWS).await?;
        let mut page: u32 = 1;

        loop {
            LISTING_PAGES_SCANNED.add(1, &[]);
            span.record("locator.pages_scanned", page);

            for (idx, row) in rows.iter().enumerate() {
                match self.row_matches(session, *row, query).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        tracing::debug!(page, row = idx, error = %e, "row lookup failed");
                        continue;
                    }
                }

                let button = match self
                    .waiter
                    .present_in(session, *row, selectors::REPORT_DOWNLOAD_BUTTON)
                    .await
                {
                    Ok(button) => button,
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        tracing::debug!(page, row = idx, error = %e, "matching row has no export control");
                        continue;
                    }
                };

                self.notifier.notify("Clicking download button...");
                let triggered_at = Utc::now();
                session.click(button).await?;
                tracing::info!(page, row = idx, "report export triggered");
                return Ok(LocateOutcome::Triggered {
                    triggered_at,
                    page,
                    row: idx,
                });
            }

            match self.next_page(session, rows.first().copied()).await? {
                Some(next) => {
                    rows = next;
                    page += 1;
                }
                None => break,
            }
        }

        self.notifier
            .notify("Desired row not found after processing all pages.");
        tracing::warn!(pages_scanned = page, "no report row matched");
        Ok(LocateOutcome::NotFound {
            pages_scanned: page,
        })
    }

    async fn row_matches(
        &self,
        session: &dyn PageSession,
        row: ElementRef,
        query: &ReportQuery,
    ) -> PipelineResult<bool> {
        let entity = self
            .waiter
            .text_in(session, row, selectors::REPORT_ENTITY_CELL)
            .await?;
        if !entity.contains(&query.target) {
            return Ok(false);
        }

        let format = self
            .waiter
            .text_in(session, row, selectors::REPORT_FORMAT_CELL)
            .await?;
        if !format.trim().eq_ignore_ascii_case(&query.format) {
            return Ok(false);
        }

        let labels = self
            .waiter
            .all_present(session, selectors::REPORT_SCAN_TYPE_LABELS)
            .await?;
        let matched = self.any_label_matches(session, &labels, &query.scan_type).await;
        session.release(&labels).await;
        matched
    }

    async fn any_label_matches(
        &self,
        session: &dyn PageSession,
        labels: &[ElementRef],
        scan_type: &str,
    ) -> PipelineResult<bool> {
        for label in labels {
            if session
                .text(*label)
                .await?
                .trim()
                .eq_ignore_ascii_case(scan_type)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Advances past the current page, returning the new page's rows.
    async fn next_page(
        &self,
        session: &dyn PageSession,
        first_row: Option<ElementRef>,
    ) -> PipelineResult<Option<Vec<ElementRef>>> {
        let Some(first_row) = first_row else {
            return Ok(None);
        };

        self.notifier.notify("Checking for next page...");
        match self
            .waiter
            .turn_page(session, selectors::REPORT_NEXT_PAGE, first_row)
            .await?
        {
            PageTurn::Advanced => {}
            turn => {
                tracing::debug!(?turn, "listing pagination ended");
                return Ok(None);
            }
        }

        match self.waiter.all_visible(session, selectors::REPORT_ROWS).await {
            Ok(rows) => Ok(Some(rows)),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                tracing::debug!(error = %e, "next listing page never rendered rows");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::browser::fake::{FakeElement, FakeEvent, FakeSession, FakeSite, FakeView};

    fn locator() -> ReportLocator {
        let waiter = Waiter::new(
            Duration::from_millis(40),
            Duration::from_millis(5),
            CancellationToken::new(),
        );
        ReportLocator::new(waiter, StatusNotifier::default())
    }

    fn query() -> ReportQuery {
        ReportQuery {
            target: "site.example.com".to_string(),
            format: "html".to_string(),
            scan_type: "Website".to_string(),
        }
    }

    fn row(label: &str, entity: &str, format: &str) -> FakeElement {
        FakeElement::new(selectors::REPORT_ROWS)
            .label(label)
            .child(FakeElement::new(selectors::REPORT_ENTITY_CELL).label(format!("{label}/entity")).text(entity))
            .child(FakeElement::new(selectors::REPORT_FORMAT_CELL).label(format!("{label}/format")).text(format))
            .child(
                FakeElement::new(selectors::REPORT_DOWNLOAD_BUTTON)
                    .label(format!("{label}/download")),
            )
    }

    fn scan_type(text: &str) -> FakeElement {
        FakeElement::new(selectors::REPORT_SCAN_TYPE_LABELS).text(text)
    }

    fn next(enabled: bool, target: Option<&str>) -> FakeElement {
        let mut el = FakeElement::new(selectors::REPORT_NEXT_PAGE).label("next");
        if !enabled {
            el = el.disabled();
        }
        if let Some(target) = target {
            el = el.on_click(target);
        }
        el
    }

    #[tokio::test]
    async fn test_triggers_first_full_match_and_skips_later_rows() {
        let site = FakeSite::new().view(
            "reports",
            FakeView::new()
                .with(row("row1", "other.example.org", "html"))
                .with(row("row2", "https://site.example.com/", "HTML"))
                .with(row("row3", "site.example.com", "html"))
                .with(scan_type("Website"))
                .with(next(true, Some("reports-2"))),
        );
        let session = FakeSession::standalone(site);
        session.open("reports").await.unwrap();

        let outcome = locator().locate(&session, &query()).await.unwrap();
        assert!(matches!(outcome, LocateOutcome::Triggered { page: 1, row: 1, .. }));

        let log = session.log();
        assert_eq!(log.clicks(), vec!["row2/download".to_string()]);
        assert!(!log.queried("row1", selectors::REPORT_FORMAT_CELL));
        assert!(!log.queried("row3", selectors::REPORT_FORMAT_CELL));
        assert!(!log.queried("row3", selectors::REPORT_ENTITY_CELL));
    }

    #[tokio::test]
    async fn test_scan_type_mismatch_rejects_row() {
        let site = FakeSite::new().view(
            "reports",
            FakeView::new()
                .with(row("row1", "site.example.com", "html"))
                .with(scan_type("Document")),
        );
        let session = FakeSession::standalone(site);
        session.open("reports").await.unwrap();

        let outcome = locator().locate(&session, &query()).await.unwrap();
        assert_eq!(outcome, LocateOutcome::NotFound { pages_scanned: 1 });
        assert!(session.log().clicks().is_empty());
        assert_eq!(session.log().releases(), vec![FakeEvent::Released(1)]);
    }

    #[tokio::test]
    async fn test_follows_pagination_to_match() {
        let site = FakeSite::new()
            .view(
                "reports",
                FakeView::new()
                    .with(row("p1r1", "other.example.org", "html"))
                    .with(scan_type("Website"))
                    .with(next(true, Some("reports-2"))),
            )
            .view(
                "reports-2",
                FakeView::new()
                    .with(row("p2r1", "site.example.com", "pdf"))
                    .with(row("p2r2", "site.example.com", "html"))
                    .with(scan_type("Website"))
                    .with(next(false, None)),
            );
        let session = FakeSession::standalone(site);
        session.open("reports").await.unwrap();

        let outcome = locator().locate(&session, &query()).await.unwrap();
        assert!(matches!(outcome, LocateOutcome::Triggered { page: 2, row: 1, .. }));
        assert_eq!(
            session.log().clicks(),
            vec!["next".to_string(), "p2r2/download".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exhausts_listing_when_next_disabled() {
        let site = FakeSite::new().view(
            "reports",
            FakeView::new()
                .with(row("row1", "other.example.org", "html"))
                .with(scan_type("Website"))
                .with(next(false, None)),
        );
        let session = FakeSession::standalone(site);
        session.open("reports").await.unwrap();

        let outcome = locator().locate(&session, &query()).await.unwrap();
        assert_eq!(outcome, LocateOutcome::NotFound { pages_scanned: 1 });
        assert!(session.log().clicks().is_empty());
    }

    #[tokio::test]
    async fn test_row_missing_cells_does_not_qualify() {
        let site = FakeSite::new().view(
            "reports",
            FakeView::new()
                .with(FakeElement::new(selectors::REPORT_ROWS).label("broken"))
                .with(row("row2", "site.example.com", "html"))
                .with(scan_type("Website")),
        );
        let session = FakeSession::standalone(site);
        session.open("reports").await.unwrap();

        let outcome = locator().locate(&session, &query()).await.unwrap();
        assert!(matches!(outcome, LocateOutcome::Triggered { row: 1, .. }));
    }

    #[tokio::test]
    async fn test_navigate_to_reports() {
        let site = FakeSite::new()
            .view(
                "home",
                FakeView::new().with(
                    FakeElement::new(selectors::SIDEBAR_REPORTS_TOGGLE).on_click("menu"),
                ),
            )
            .view(
                "menu",
                FakeView::new().with(FakeElement::new(selectors::REPORTS_LINK).on_click("reports")),
            )
            .view(
                "reports",
                FakeView::new().with(row("row1", "site.example.com", "html")),
            );
        let session = FakeSession::standalone(site);
        session.open("home").await.unwrap();

        locator().navigate_to_reports(&session).await.unwrap();
        assert_eq!(session.log().clicks().len(), 2);
    }
}
