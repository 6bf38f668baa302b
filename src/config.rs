use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub portal_url: String,
    pub download_dir: PathBuf,
    pub report_format: String,
    pub report_scan_type: String,
    pub report_title: String,
    pub wait_timeout_secs: u64,
    pub extended_wait_timeout_secs: u64,
    pub documentation_wait_secs: u64,
    pub detail_wait_secs: u64,
    pub download_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub cancel_on_timeout: bool,
    pub worker_pool_size: usize,
    pub browser_headless: bool,
    pub browser_executable: Option<PathBuf>,
    pub google_access_token: Option<String>,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("APP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("APP_PORT must be a number"),
            environment: env::var("APP_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            portal_url: env::var("PORTAL_URL").expect("PORTAL_URL must be set"),
            download_dir: env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_download_dir()),
            report_format: env::var("REPORT_FORMAT").unwrap_or_else(|_| "html".to_string()),
            report_scan_type: env::var("REPORT_SCAN_TYPE")
                .unwrap_or_else(|_| "Website".to_string()),
            report_title: env::var("REPORT_TITLE").unwrap_or_else(|_| "Error Report".to_string()),
            wait_timeout_secs: parse_or("WAIT_TIMEOUT_SECS", 20),
            extended_wait_timeout_secs: parse_or("EXTENDED_WAIT_TIMEOUT_SECS", 120),
            documentation_wait_secs: parse_or("DOCUMENTATION_WAIT_SECS", 10),
            detail_wait_secs: parse_or("DETAIL_WAIT_SECS", 30),
            download_timeout_secs: parse_or("DOWNLOAD_TIMEOUT_SECS", 30),
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 250),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 600),
            cancel_on_timeout: parse_or("CANCEL_ON_TIMEOUT", false),
            worker_pool_size: parse_or("WORKER_POOL_SIZE", 10),
            browser_headless: parse_or("BROWSER_HEADLESS", true),
            browser_executable: env::var("BROWSER_EXECUTABLE").ok().map(PathBuf::from),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN").ok(),
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "report-weaver".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {raw:?}")),
        Err(_) => default,
    }
}

fn default_download_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|_| PathBuf::from("Downloads"))
}

/// Durations and filters the pipeline components run with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub portal_url: String,
    pub download_dir: PathBuf,
    pub report_format: String,
    pub report_scan_type: String,
    pub report_title: String,
    pub wait_timeout: Duration,
    pub extended_wait_timeout: Duration,
    pub documentation_wait: Duration,
    pub detail_wait: Duration,
    pub download_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            portal_url: config.portal_url.clone(),
            download_dir: config.download_dir.clone(),
            report_format: config.report_format.clone(),
            report_scan_type: config.report_scan_type.clone(),
            report_title: config.report_title.clone(),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
            extended_wait_timeout: Duration::from_secs(config.extended_wait_timeout_secs),
            documentation_wait: Duration::from_secs(config.documentation_wait_secs),
            detail_wait: Duration::from_secs(config.detail_wait_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_config() -> Config {
    Config {
        port: 8080,
        environment: "development".to_string(),
        portal_url: "https://portal.example.com/login".to_string(),
        download_dir: PathBuf::from("/tmp/downloads"),
        report_format: "html".to_string(),
        report_scan_type: "Website".to_string(),
        report_title: "Error Report".to_string(),
        wait_timeout_secs: 20,
        extended_wait_timeout_secs: 120,
        documentation_wait_secs: 10,
        detail_wait_secs: 30,
        download_timeout_secs: 30,
        poll_interval_ms: 250,
        request_timeout_secs: 600,
        cancel_on_timeout: false,
        worker_pool_size: 10,
        browser_headless: true,
        browser_executable: None,
        google_access_token: None,
        otel_service_name: "report-weaver".to_string(),
        otel_exporter_endpoint: "http://localhost:4317".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_settings_from_config() {
        let settings = PipelineSettings::from(&sample_config());
        assert_eq!(settings.wait_timeout, Duration::from_secs(20));
        assert_eq!(settings.extended_wait_timeout, Duration::from_secs(120));
        assert_eq!(settings.documentation_wait, Duration::from_secs(10));
        assert_eq!(settings.detail_wait, Duration::from_secs(30));
        assert_eq!(settings.download_timeout, Duration::from_secs(30));
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.report_format, "html");
        assert_eq!(settings.report_scan_type, "Website");
    }

    #[test]
    fn test_is_production() {
        let mut config = sample_config();
        assert!(!config.is_production());
        config.environment = "production".to_string();
        assert!(config.is_production());
    }

    #[test]
    fn test_request_timeout() {
        assert_eq!(sample_config().request_timeout(), Duration::from_secs(600));
    }
}
