use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::extract::ErrorExtractionPipeline;
use crate::browser::{PageSession, SessionFactory, SessionRegistry, Waiter};
use crate::config::PipelineSettings;
use crate::documents::DocumentPublisher;
use crate::download::{DownloadWatcher, FileSystem};
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;
use crate::portal::{AuthenticationFlow, Credentials, LocateOutcome, ReportLocator, ReportQuery};
use crate::telemetry::metrics::{REPORT_RUN_DURATION, REPORT_RUNS};

/// Returned in place of a document id whenever a run produced none.
pub const PROCESSING_SENTINEL: &str = "Processing";

#[derive(Clone, Deserialize)]
pub struct ReportRequest {
    pub website: String,
    pub username: String,
    pub password: String,
    pub email: String,
}

impl ReportRequest {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("website", &self.website),
            ("username", &self.username),
            ("password", &self.password),
            ("email", &self.email),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if !self.email.contains('@') {
            return Err("email must be an email address".to_string());
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

impl fmt::Debug for ReportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportRequest")
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// How a run ended when nothing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunOutcome {
    Published { document_id: String, shared: bool },
    NoReport,
    NoArtifact,
}

impl RunOutcome {
    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Published { shared: true, .. } => "published",
            RunOutcome::Published { shared: false, .. } => "published_unshared",
            RunOutcome::NoReport => "no_report",
            RunOutcome::NoArtifact => "no_artifact",
        }
    }
}

/// Runs one report request end to end on its own primary session.
pub struct ReportOrchestrator {
    factory: Arc<dyn SessionFactory>,
    registry: SessionRegistry,
    fs: Arc<dyn FileSystem>,
    documents: Arc<dyn DocumentPublisher>,
    notifier: StatusNotifier,
    settings: PipelineSettings,
    download_intervals: Option<(Duration, Duration)>,
}

impl ReportOrchestrator {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        registry: SessionRegistry,
        fs: Arc<dyn FileSystem>,
        documents: Arc<dyn DocumentPublisher>,
        notifier: StatusNotifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            factory,
            registry,
            fs,
            documents,
            notifier,
            settings,
            download_intervals: None,
        }
    }

    pub fn with_download_intervals(mut self, poll: Duration, settle: Duration) -> Self {
        self.download_intervals = Some((poll, settle));
        self
    }

    /// Returns the shared document id, or [`PROCESSING_SENTINEL`] when the
    /// run ended without one. Never fails.
    #[tracing::instrument(
        name = "pipeline report",
        skip(self, request, cancel),
        fields(
            pipeline.stage = "orchestrate",
            report.website = %request.website,
            report.outcome,
            report.duration_ms,
        )
    )]
    pub async fn run(&self, request: &ReportRequest, cancel: &CancellationToken) -> String {
        let start = std::time::Instant::now();
        let span = tracing::Span::current();

        let result = match self.registry.open(self.factory.as_ref()).await {
            Ok(session) => {
                self.notifier.notify("Browser session initialized.");
                let result = self.drive(session.as_ref(), request, cancel).await;
                self.notifier.notify("Closing browser session...");
                self.registry.release(&session).await;
                result
            }
            Err(e) => Err(PipelineError::from(e)),
        };

        let (label, document_id) = match result {
            Ok(outcome) => {
                let label = outcome.label();
                match outcome {
                    RunOutcome::Published { document_id, .. } if !document_id.is_empty() => {
                        self.notifier.notify("Report process completed successfully!");
                        (label, Some(document_id))
                    }
                    RunOutcome::Published { .. } => (label, None),
                    RunOutcome::NoReport | RunOutcome::NoArtifact => {
                        self.notifier
                            .notify("No file was downloaded. Report may be empty.");
                        (label, None)
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, error.kind = e.kind(), "report run failed");
                self.notifier
                    .notify(format!("Error during report process: {e}"));
                (e.kind(), None)
            }
        };

        let elapsed = start.elapsed();
        REPORT_RUNS.add(1, &[KeyValue::new("outcome", label)]);
        REPORT_RUN_DURATION.record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", label)]);
        span.record("report.outcome", label);
        span.record("report.duration_ms", elapsed.as_millis() as u64);

        document_id.unwrap_or_else(|| {
            self.notifier
                .notify("Document ID is empty. Please try again");
            PROCESSING_SENTINEL.to_string()
        })
    }

    async fn drive(
        &self,
        session: &dyn PageSession,
        request: &ReportRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<RunOutcome> {
        let settings = &self.settings;
        let credentials = request.credentials();
        let waiter = Waiter::new(settings.wait_timeout, settings.poll_interval, cancel.clone());

        // Stage 1: Sign in to the portal
        self.notifier.notify("Performing login...");
        AuthenticationFlow::new(
            waiter.with_timeout(settings.extended_wait_timeout),
            self.notifier.clone(),
        )
        .run(session, Some(&settings.portal_url), &credentials)
        .await?;

        // Stage 2: Find the report and trigger its export
        let locator = ReportLocator::new(waiter.clone(), self.notifier.clone());
        locator.navigate_to_reports(session).await?;
        let query = ReportQuery {
            target: request.website.clone(),
            format: settings.report_format.clone(),
            scan_type: settings.report_scan_type.clone(),
        };
        let triggered_at = match locator.locate(session, &query).await? {
            LocateOutcome::Triggered { triggered_at, .. } => triggered_at,
            LocateOutcome::NotFound { pages_scanned } => {
                tracing::warn!(pages_scanned, "{}", PipelineError::ListingExhausted);
                return Ok(RunOutcome::NoReport);
            }
        };

        // Stage 3: Wait for the exported file
        self.notifier.notify("Waiting for file download...");
        let mut watcher = DownloadWatcher::new(self.fs.clone(), self.notifier.clone());
        if let Some((poll, settle)) = self.download_intervals {
            watcher = watcher.with_intervals(poll, settle);
        }
        let artifact = match watcher
            .wait_for_download(
                &settings.download_dir,
                triggered_at,
                settings.download_timeout,
                cancel,
            )
            .await
        {
            Ok(artifact) => artifact,
            Err(PipelineError::DownloadTimeout(timeout)) => {
                tracing::warn!(?timeout, "export never arrived");
                return Ok(RunOutcome::NoArtifact);
            }
            Err(e) => return Err(e),
        };

        // Stage 4: Extract documented errors from the artifact
        self.notifier
            .notify("Extracting data from downloaded report...");
        let extractor = ErrorExtractionPipeline::new(
            self.factory.clone(),
            self.registry.clone(),
            self.notifier.clone(),
            settings.clone(),
            cancel.clone(),
        );
        let errors = extractor
            .extract(session, &artifact.path, &credentials)
            .await?;

        // Stage 5: Publish and share
        self.notifier
            .notify("Generating Google Doc with extracted errors...");
        let document_id = self
            .documents
            .create_report(&settings.report_title, &errors)
            .await?;

        if document_id.trim().is_empty() {
            tracing::warn!("document backend returned an empty id, skipping share");
            return Ok(RunOutcome::Published {
                document_id,
                shared: false,
            });
        }

        self.notifier.notify("Sharing Google Doc...");
        let shared = match self.documents.share(&document_id, &request.email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, document.id = %document_id, "document created but not shared");
                self.notifier
                    .notify(format!("Sharing failed for document {document_id}: {e}"));
                false
            }
        };

        Ok(RunOutcome::Published {
            document_id,
            shared,
        })
    }
}
