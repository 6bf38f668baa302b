use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use super::model::{ErrorDocumentation, ErrorRecord};
use crate::browser::{ElementRef, PageSession, PageTurn, SessionFactory, SessionRegistry, Waiter};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;
use crate::portal::selectors;
use crate::portal::{AuthenticationFlow, Credentials};
use crate::telemetry::metrics::{CANDIDATES_DISCARDED, DETAIL_ENTRIES, ERRORS_EXTRACTED};

const ACCEPTED_CATEGORIES: [&str; 2] = ["Errors", "Contrast Errors"];

pub fn is_accepted_category(category: &str) -> bool {
    ACCEPTED_CATEGORIES
        .iter()
        .any(|accepted| category.eq_ignore_ascii_case(accepted))
}

/// `file://` URL for a local artifact path, with Windows separators
/// normalized.
pub fn file_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    format!("file:///{}", normalized.trim_start_matches('/'))
}

/// `scheme://host` of `href`, or an empty string when it does not parse.
pub fn base_reference(href: &str) -> String {
    Url::parse(href)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|host| format!("{}://{}", url.scheme(), host))
        })
        .unwrap_or_default()
}

/// A listing row that passed validation but has not been fetched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    instance_count: u32,
    name: String,
    category: String,
    documentation_url: String,
    detail_url: String,
}

/// Turns an exported artifact into documented error records.
///
/// Documentation and detail pages are read in fresh sessions, one at a
/// time, each registered for the duration of its fetch and released
/// whatever the outcome.
pub struct ErrorExtractionPipeline {
    factory: Arc<dyn SessionFactory>,
    registry: SessionRegistry,
    notifier: StatusNotifier,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl ErrorExtractionPipeline {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        registry: SessionRegistry,
        notifier: StatusNotifier,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            factory,
            registry,
            notifier,
            settings,
            cancel,
        }
    }

    fn waiter(&self, timeout: std::time::Duration) -> Waiter {
        Waiter::new(timeout, self.settings.poll_interval, self.cancel.clone())
    }

    /// Opens `artifact` in `session` and extracts every documented error,
    /// returned in reverse discovery order.
    #[tracing::instrument(
        name = "pipeline_stage extract",
        skip(self, session, credentials),
        fields(
            pipeline.stage = "extract",
            artifact.path = %artifact.display(),
            report.rows,
            report.errors_found,
        )
    )]
    pub async fn extract(
        &self,
        session: &dyn PageSession,
        artifact: &Path,
        credentials: &Credentials,
    ) -> PipelineResult<Vec<ErrorRecord>> {
        self.notifier.notify(format!(
            "Starting data extraction from file: {}",
            artifact.display()
        ));
        let waiter = self.waiter(self.settings.wait_timeout);

        session.open(&file_url(artifact)).await?;
        let rows = waiter.all_present(session, selectors::ARTIFACT_ROWS).await?;

        let span = tracing::Span::current();
        span.record("report.rows", rows.len());
        self.notifier
            .notify(format!("Number of rows found: {}", rows.len()));

        let base = self.base_reference(session, &waiter).await;

        let mut errors = Vec::new();
        for row in rows {
            let candidate = match self.read_candidate(session, &waiter, row).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable artifact row");
                    self.notifier.notify(format!("Error processing row: {e}"));
                    continue;
                }
            };
            self.notifier
                .notify(format!("Found valid error: {}", candidate.name));

            let documentation = match self.fetch_documentation(&candidate).await {
                Ok(documentation) => documentation,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    CANDIDATES_DISCARDED.add(1, &[]);
                    tracing::warn!(error.name = %candidate.name, error = %e, "discarding error without documentation");
                    self.notifier.notify(format!(
                        "Error fetching documentation for {}: {e}",
                        candidate.name
                    ));
                    continue;
                }
            };

            let mut record = ErrorRecord::new(
                candidate.instance_count,
                candidate.name.clone(),
                candidate.category.clone(),
                documentation,
            );
            self.fetch_details(&mut record, &candidate.detail_url, &base, credentials)
                .await?;
            errors.push(record);
        }

        errors.reverse();
        span.record("report.errors_found", errors.len());
        ERRORS_EXTRACTED.record(errors.len() as f64, &[]);
        self.notifier.notify(format!(
            "Data extraction completed. Errors found: {}",
            errors.len()
        ));
        Ok(errors)
    }

    async fn base_reference(&self, session: &dyn PageSession, waiter: &Waiter) -> String {
        self.notifier.notify("Extracting base URL...");
        let href = async {
            let link = waiter.visible(session, selectors::ARTIFACT_BASE_LINK).await?;
            session.attribute(link, "href").await.map_err(PipelineError::from)
        }
        .await;

        let base = match href {
            Ok(Some(href)) => base_reference(&href),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(error = %e, "base reference link not found");
                String::new()
            }
        };
        self.notifier.notify(format!("Base URL extracted: {base}"));
        base
    }

    async fn read_candidate(
        &self,
        session: &dyn PageSession,
        waiter: &Waiter,
        row: ElementRef,
    ) -> PipelineResult<Option<Candidate>> {
        let raw_count = waiter
            .text_in(session, row, selectors::ARTIFACT_INSTANCE_COUNT)
            .await?;
        let instance_count: u32 = raw_count.trim().parse().map_err(|_| {
            PipelineError::Browser(format!("instance count {raw_count:?} is not a number"))
        })?;
        let name = waiter
            .text_in(session, row, selectors::ARTIFACT_ERROR_NAME)
            .await?
            .trim()
            .to_string();
        let category = waiter
            .text_in(session, row, selectors::ARTIFACT_CATEGORY)
            .await?
            .trim()
            .to_string();

        if instance_count == 0 || !is_accepted_category(&category) {
            return Ok(None);
        }

        let documentation_url = waiter
            .attribute_in(session, row, selectors::ARTIFACT_DOCUMENTATION_LINK, "href")
            .await?;
        let detail_url = waiter
            .attribute_in(session, row, selectors::ARTIFACT_ERROR_NAME, "href")
            .await?;

        Ok(Some(Candidate {
            instance_count,
            name,
            category,
            documentation_url,
            detail_url,
        }))
    }

    #[tracing::instrument(
        name = "fetch documentation",
        skip(self, candidate),
        fields(error.name = %candidate.name)
    )]
    async fn fetch_documentation(&self, candidate: &Candidate) -> PipelineResult<ErrorDocumentation> {
        self.notifier.notify(format!(
            "Fetching error documentation for: {}",
            candidate.name
        ));
        let session = self
            .registry
            .open(self.factory.as_ref())
            .await
            .map_err(|e| PipelineError::DocumentationFetch(e.to_string()))?;

        let result = self
            .read_documentation(session.as_ref(), &candidate.documentation_url)
            .await;
        self.registry.release(&session).await;

        match result {
            Ok(documentation) => {
                self.notifier.notify(format!(
                    "Successfully retrieved documentation for: {}",
                    candidate.name
                ));
                Ok(documentation)
            }
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => Err(PipelineError::DocumentationFetch(e.to_string())),
        }
    }

    async fn read_documentation(
        &self,
        session: &dyn PageSession,
        url: &str,
    ) -> PipelineResult<ErrorDocumentation> {
        let waiter = self.waiter(self.settings.documentation_wait);
        session.open(url).await?;
        Ok(ErrorDocumentation {
            documentation: waiter
                .visible_text(session, selectors::DOCUMENTATION_TEXT)
                .await?,
            why_it_matters: waiter
                .visible_text(session, selectors::DOCUMENTATION_WHY_IT_MATTERS)
                .await?,
            how_to_fix_it: waiter
                .visible_text(session, selectors::DOCUMENTATION_HOW_TO_FIX)
                .await?,
        })
    }

    /// Appends the error's (url, count) entries. Failures end collection
    /// for this error only and keep what was gathered; only cancellation
    /// propagates.
    #[tracing::instrument(
        name = "fetch details",
        skip(self, record, base, credentials),
        fields(error.name = %record.error_name(), error.entries)
    )]
    async fn fetch_details(
        &self,
        record: &mut ErrorRecord,
        url: &str,
        base: &str,
        credentials: &Credentials,
    ) -> PipelineResult<()> {
        self.notifier.notify(format!(
            "Fetching error details for: {}",
            record.error_name()
        ));

        let result = match self.registry.open(self.factory.as_ref()).await {
            Ok(session) => {
                let result = self
                    .collect_details(session.as_ref(), record, url, base, credentials)
                    .await;
                self.registry.release(&session).await;
                result
            }
            Err(e) => Err(e.into()),
        };

        DETAIL_ENTRIES.record(record.data_entries().len() as f64, &[]);
        tracing::Span::current().record("error.entries", record.data_entries().len());

        match result {
            Ok(()) => Ok(()),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                let e = PipelineError::DetailFetch(e.to_string());
                tracing::warn!(error = %e, kept = record.data_entries().len(), "detail collection ended early");
                self.notifier.notify(format!(
                    "Error fetching details for {}: {e}",
                    record.error_name()
                ));
                Ok(())
            }
        }
    }

    async fn collect_details(
        &self,
        session: &dyn PageSession,
        record: &mut ErrorRecord,
        url: &str,
        base: &str,
        credentials: &Credentials,
    ) -> PipelineResult<()> {
        let waiter = self.waiter(self.settings.detail_wait);
        session.open(url).await?;

        let (shown, mut control) = waiter
            .first_visible(session, &[selectors::LOGIN_EMAIL, selectors::DETAIL_VIEW_CONTROL])
            .await?;
        if shown == 0 {
            let auth = AuthenticationFlow::new(
                waiter.with_timeout(self.settings.extended_wait_timeout),
                self.notifier.clone(),
            );
            auth.run(session, None, credentials).await?;
            control = waiter
                .visible(session, selectors::DETAIL_VIEW_CONTROL)
                .await?;
        }
        session.click(control).await?;

        loop {
            self.notifier.notify(format!(
                "Processing error count pages for: {}",
                record.error_name()
            ));
            let rows = match waiter.all_present(session, selectors::DETAIL_ROWS).await {
                Ok(rows) => rows,
                Err(PipelineError::ElementTimeout { .. }) => break,
                Err(e) => return Err(e),
            };

            for row in &rows {
                match self.read_detail_row(session, &waiter, *row).await {
                    Ok((uri, count)) => record.add_data_entry(format!("{base}{uri}"), count),
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unreadable detail row");
                        self.notifier.notify("Cell not found in current row.");
                    }
                }
            }

            match waiter
                .turn_page(session, selectors::DETAIL_NEXT_PAGE, rows[0])
                .await?
            {
                PageTurn::Advanced => continue,
                PageTurn::LastPage => {
                    self.notifier.notify(format!(
                        "No more pages available for error: {}",
                        record.error_name()
                    ));
                    break;
                }
                PageTurn::NoControl | PageTurn::FenceTimeout => {
                    self.notifier
                        .notify(format!("Pagination ended for: {}", record.error_name()));
                    break;
                }
            }
        }
        Ok(())
    }

    async fn read_detail_row(
        &self,
        session: &dyn PageSession,
        waiter: &Waiter,
        row: ElementRef,
    ) -> PipelineResult<(String, u32)> {
        let uri = waiter
            .text_in(session, row, selectors::DETAIL_URI_CELL)
            .await?
            .trim()
            .to_string();
        let raw = waiter
            .text_in(session, row, selectors::DETAIL_COUNT_CELL)
            .await?;
        let count = raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Browser(format!("detail count {raw:?} is not a number")))?;
        Ok((uri, count))
    }
}
