use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::DocumentPublisher;
use super::format::render_report;
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;
use crate::pipeline::model::ErrorRecord;

const DOCS_API: &str = "https://docs.googleapis.com/v1";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";

/// Publishes reports as Google Docs and shares them through Drive.
pub struct GoogleDocsPublisher {
    client: reqwest::Client,
    access_token: String,
    docs_api: String,
    drive_api: String,
    notifier: StatusNotifier,
}

impl GoogleDocsPublisher {
    pub fn new(access_token: &str, notifier: StatusNotifier) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            docs_api: DOCS_API.to_string(),
            drive_api: DRIVE_API.to_string(),
            notifier,
        }
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|e| anyhow::anyhow!("invalid access token header: {e}"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<GoogleError>(&error_body) {
                return Err(anyhow::anyhow!(
                    "Google API error ({}): {}",
                    status,
                    err.error.message
                ));
            }
            return Err(anyhow::anyhow!("Google API error ({}): {}", status, error_body));
        }
        Ok(response)
    }

    async fn create_document(&self, title: &str) -> anyhow::Result<String> {
        let url = format!("{}/documents", self.docs_api);
        let created: CreatedDocument = self
            .post(&url, &CreateDocument { title })
            .await?
            .json()
            .await?;
        Ok(created.document_id)
    }

    async fn insert_body(&self, document_id: &str, text: &str) -> anyhow::Result<()> {
        let url = format!("{}/documents/{}:batchUpdate", self.docs_api, document_id);
        self.post(&url, &insert_text_request(text)).await?;
        Ok(())
    }

    async fn grant_writer(&self, document_id: &str, email: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/files/{}/permissions?sendNotificationEmail=true",
            self.drive_api, document_id
        );
        let permission = Permission {
            kind: "user",
            role: "writer",
            email_address: email,
        };
        self.post(&url, &permission).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CreateDocument<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

#[derive(Serialize)]
struct BatchUpdate<'a> {
    requests: Vec<DocsRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocsRequest<'a> {
    insert_text: InsertText<'a>,
}

#[derive(Serialize)]
struct InsertText<'a> {
    location: Location,
    text: &'a str,
}

#[derive(Serialize)]
struct Location {
    index: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Permission<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    role: &'a str,
    email_address: &'a str,
}

#[derive(Deserialize)]
struct GoogleError {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    message: String,
}

fn insert_text_request(text: &str) -> BatchUpdate<'_> {
    BatchUpdate {
        requests: vec![DocsRequest {
            insert_text: InsertText {
                location: Location { index: 1 },
                text,
            },
        }],
    }
}

#[async_trait::async_trait]
impl DocumentPublisher for GoogleDocsPublisher {
    #[tracing::instrument(
        name = "pipeline_stage publish",
        skip(self, errors),
        fields(pipeline.stage = "publish", report.errors = errors.len(), document.id)
    )]
    async fn create_report(&self, title: &str, errors: &[ErrorRecord]) -> PipelineResult<String> {
        self.notifier.notify("Creating new Google Document...");
        let document_id = self
            .create_document(title)
            .await
            .map_err(|e| PipelineError::Document(e.to_string()))?;
        tracing::Span::current().record("document.id", document_id.as_str());
        self.notifier
            .notify(format!("Google Document created with ID: {document_id}"));

        let body = render_report(errors);
        self.insert_body(&document_id, &body)
            .await
            .map_err(|e| PipelineError::Document(e.to_string()))?;

        self.notifier.notify("Google Docs report creation completed!");
        Ok(document_id)
    }

    #[tracing::instrument(name = "share document", skip(self, email))]
    async fn share(&self, document_id: &str, email: &str) -> PipelineResult<()> {
        self.notifier
            .notify(format!("Sharing Google Document with: {email}"));
        self.grant_writer(document_id, email)
            .await
            .map_err(|e| PipelineError::Document(e.to_string()))?;
        self.notifier
            .notify(format!("Google Document shared with {email}"));
        Ok(())
    }

    fn name(&self) -> &str {
        "google-docs"
    }
}
