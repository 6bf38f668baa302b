use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;

use super::{BrowserResult, PageSession, SessionFactory, SessionId};
use crate::telemetry::metrics::{SESSION_CLOSE_FAILURES, SESSIONS_CLOSED, SESSIONS_OPENED};

type Sessions = HashMap<SessionId, Arc<dyn PageSession>>;

/// Every live browser session, shared across concurrent runs.
///
/// Runs own the sessions they create and release them when done.
/// [`SessionRegistry::close_all`] is the administrative path that tears
/// down whatever is still registered.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Sessions>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, session: Arc<dyn PageSession>) {
        self.lock().insert(session.id(), session);
    }

    pub fn unregister(&self, id: SessionId) -> Option<Arc<dyn PageSession>> {
        self.lock().remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Launches a session and registers it before handing it out.
    pub async fn open(&self, factory: &dyn SessionFactory) -> BrowserResult<Arc<dyn PageSession>> {
        let session = factory.create().await?;
        SESSIONS_OPENED.add(1, &[]);
        tracing::debug!(session.id = %session.id(), "browser session opened");
        self.register(session.clone());
        Ok(session)
    }

    /// Unregisters and closes one session. Close failures are logged only.
    pub async fn release(&self, session: &Arc<dyn PageSession>) {
        self.unregister(session.id());
        close_quietly(session.as_ref()).await;
    }

    /// Closes every registered session independently.
    ///
    /// Works on a snapshot: members registered while the closes are in
    /// flight are left alone. Every snapshot member is removed afterwards
    /// whether or not its close succeeded.
    pub async fn close_all(&self) -> usize {
        let snapshot: Vec<Arc<dyn PageSession>> = self.lock().values().cloned().collect();
        let total = snapshot.len();

        join_all(snapshot.iter().map(|session| close_quietly(session.as_ref()))).await;

        let mut sessions = self.lock();
        for session in &snapshot {
            sessions.remove(&session.id());
        }
        drop(sessions);

        tracing::info!(sessions = total, "all browser sessions closed");
        total
    }
}

async fn close_quietly(session: &dyn PageSession) -> bool {
    match session.close().await {
        Ok(()) => {
            SESSIONS_CLOSED.add(1, &[]);
            tracing::debug!(session.id = %session.id(), "browser session closed");
            true
        }
        Err(e) => {
            SESSION_CLOSE_FAILURES.add(1, &[]);
            tracing::warn!(session.id = %session.id(), error = %e, "failed to close browser session");
            false
        }
    }
}
