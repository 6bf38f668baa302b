pub mod format;
pub mod google;

pub use google::GoogleDocsPublisher;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::model::ErrorRecord;

/// Destination for finished reports.
#[async_trait::async_trait]
pub trait DocumentPublisher: Send + Sync {
    /// Creates a document from `errors`, kept in the given order, and
    /// returns its identifier.
    async fn create_report(&self, title: &str, errors: &[ErrorRecord]) -> PipelineResult<String>;

    async fn share(&self, document_id: &str, email: &str) -> PipelineResult<()>;

    fn name(&self) -> &str;
}

/// Stands in when no document backend credentials are configured. Every
/// run then ends with the processing sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredPublisher;

#[async_trait::async_trait]
impl DocumentPublisher for UnconfiguredPublisher {
    async fn create_report(&self, _title: &str, _errors: &[ErrorRecord]) -> PipelineResult<String> {
        Err(PipelineError::Configuration(
            "GOOGLE_ACCESS_TOKEN is not set".to_string(),
        ))
    }

    async fn share(&self, _document_id: &str, _email: &str) -> PipelineResult<()> {
        Err(PipelineError::Configuration(
            "GOOGLE_ACCESS_TOKEN is not set".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every call; outcomes are scripted per instance.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub document_id: Option<String>,
        pub fail_share: bool,
        pub created: Mutex<Vec<(String, Vec<String>)>>,
        pub shared: Mutex<Vec<(String, String)>>,
    }

    impl RecordingPublisher {
        pub fn returning(document_id: &str) -> Self {
            Self {
                document_id: Some(document_id.to_string()),
                ..Self::default()
            }
        }

        pub fn created(&self) -> Vec<(String, Vec<String>)> {
            self.created.lock().unwrap().clone()
        }

        pub fn shared(&self) -> Vec<(String, String)> {
            self.shared.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DocumentPublisher for RecordingPublisher {
        async fn create_report(&self, title: &str, errors: &[ErrorRecord]) -> PipelineResult<String> {
            let names = errors.iter().map(|e| e.error_name().to_string()).collect();
            self.created.lock().unwrap().push((title.to_string(), names));
            self.document_id
                .clone()
                .ok_or_else(|| PipelineError::Document("create failed".to_string()))
        }

        async fn share(&self, document_id: &str, email: &str) -> PipelineResult<()> {
            self.shared
                .lock()
                .unwrap()
                .push((document_id.to_string(), email.to_string()));
            if self.fail_share {
                Err(PipelineError::Document("share failed".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_unconfigured_publisher_refuses() {
        let err = UnconfiguredPublisher
            .create_report("Error Report", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
