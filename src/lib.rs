pub mod browser;
pub mod config;
pub mod documents;
pub mod download;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod pipeline;
pub mod portal;
pub mod routes;
pub mod telemetry;

pub use config::Config;

use browser::SessionRegistry;
use jobs::ReportRunner;
use notify::StatusNotifier;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub runner: ReportRunner,
    pub registry: SessionRegistry,
    pub notifier: StatusNotifier,
}
