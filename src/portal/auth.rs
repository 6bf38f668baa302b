use std::fmt;

use serde::Deserialize;

use super::selectors;
use crate::browser::{PageSession, Waiter};
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;

/// Portal login details supplied with each request.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Steps of the portal login, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    NavigateToLogin,
    EnterIdentifier,
    VerifySsoAssertion,
    SubmitIdentifier,
    EnterCredentials,
    SubmitCredentials,
    ConfirmSecondFactor,
    Done,
}

impl AuthStep {
    pub fn next(self) -> Self {
        match self {
            AuthStep::NavigateToLogin => AuthStep::EnterIdentifier,
            AuthStep::EnterIdentifier => AuthStep::VerifySsoAssertion,
            AuthStep::VerifySsoAssertion => AuthStep::SubmitIdentifier,
            AuthStep::SubmitIdentifier => AuthStep::EnterCredentials,
            AuthStep::EnterCredentials => AuthStep::SubmitCredentials,
            AuthStep::SubmitCredentials => AuthStep::ConfirmSecondFactor,
            AuthStep::ConfirmSecondFactor | AuthStep::Done => AuthStep::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthStep::NavigateToLogin => "navigate_to_login",
            AuthStep::EnterIdentifier => "enter_identifier",
            AuthStep::VerifySsoAssertion => "verify_sso_assertion",
            AuthStep::SubmitIdentifier => "submit_identifier",
            AuthStep::EnterCredentials => "enter_credentials",
            AuthStep::SubmitCredentials => "submit_credentials",
            AuthStep::ConfirmSecondFactor => "confirm_second_factor",
            AuthStep::Done => "done",
        }
    }
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear portal login. No step is retried; the first failure aborts.
#[derive(Debug, Clone)]
pub struct AuthenticationFlow {
    waiter: Waiter,
    notifier: StatusNotifier,
}

impl AuthenticationFlow {
    /// `waiter` should carry the extended timeout; the identity provider
    /// and second factor pages can take a while to appear.
    pub fn new(waiter: Waiter, notifier: StatusNotifier) -> Self {
        Self { waiter, notifier }
    }

    /// Logs in on `session`. With `url = None` the flow starts from
    /// whatever page the session is already showing.
    #[tracing::instrument(
        name = "pipeline_stage authenticate",
        skip(self, session, credentials),
        fields(
            pipeline.stage = "authenticate",
            session.id = %session.id(),
            auth.failed_step,
        )
    )]
    pub async fn run(
        &self,
        session: &dyn PageSession,
        url: Option<&str>,
        credentials: &Credentials,
    ) -> PipelineResult<()> {
        self.notifier.notify("Starting login process...");

        let mut step = AuthStep::NavigateToLogin;
        while step != AuthStep::Done {
            if let Err(e) = self.step(session, step, url, credentials).await {
                tracing::Span::current().record("auth.failed_step", step.as_str());
                return Err(match e {
                    PipelineError::Cancelled => PipelineError::Cancelled,
                    e => {
                        self.notifier.notify(format!("Login failed: {e}"));
                        PipelineError::Authentication(format!("{step}: {e}"))
                    }
                });
            }
            step = step.next();
        }

        self.notifier.notify("Login successful!");
        Ok(())
    }

    async fn step(
        &self,
        session: &dyn PageSession,
        step: AuthStep,
        url: Option<&str>,
        credentials: &Credentials,
    ) -> PipelineResult<()> {
        let waiter = &self.waiter;
        match step {
            AuthStep::NavigateToLogin => {
                if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
                    self.notifier.notify(format!("Navigating to login page: {url}"));
                    session.open(url).await?;
                }
            }
            AuthStep::EnterIdentifier => {
                self.notifier.notify("Waiting for username field...");
                let email = waiter.visible(session, selectors::LOGIN_EMAIL).await?;
                session.send_keys(email, &credentials.username).await?;
            }
            AuthStep::VerifySsoAssertion => {
                self.notifier.notify("Checking SSO login mode...");
                waiter.visible(session, selectors::LOGIN_MODE_SSO).await?;
                let flag = waiter.present(session, selectors::SSO_ENABLED_FLAG).await?;
                let value = session.attribute(flag, "value").await?;
                if value.as_deref() != Some(selectors::SSO_ENABLED_VALUE) {
                    return Err(PipelineError::Authentication(format!(
                        "single sign-on flag is {value:?}, expected {:?}",
                        selectors::SSO_ENABLED_VALUE
                    )));
                }
            }
            AuthStep::SubmitIdentifier => {
                self.notifier.notify("Clicking login button...");
                let submit = waiter
                    .visible(session, selectors::LOGIN_SUBMIT_IDENTIFIER)
                    .await?;
                session.click(submit).await?;
            }
            AuthStep::EnterCredentials => {
                self.notifier.notify("Waiting for credential fields...");
                let username = waiter.visible(session, selectors::LOGIN_USERNAME).await?;
                session.send_keys(username, &credentials.username).await?;
                let password = waiter.present(session, selectors::LOGIN_PASSWORD).await?;
                session.send_keys(password, &credentials.password).await?;
            }
            AuthStep::SubmitCredentials => {
                self.notifier.notify("Submitting login form...");
                let submit = waiter.present(session, selectors::LOGIN_SUBMIT).await?;
                session.click(submit).await?;
            }
            AuthStep::ConfirmSecondFactor => {
                self.notifier.notify("Checking for Duo authentication...");
                let trust = waiter
                    .visible(session, selectors::TRUST_BROWSER_BUTTON)
                    .await?;
                session.click(trust).await?;
            }
            AuthStep::Done => {}
        }
        Ok(())
    }
}
