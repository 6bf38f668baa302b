pub mod auth;
pub mod locator;
pub mod selectors;

pub use auth::{AuthStep, AuthenticationFlow, Credentials};
pub use locator::{LocateOutcome, ReportLocator, ReportQuery};
