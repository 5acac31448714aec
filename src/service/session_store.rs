use crate::domain::session::{PaymentSession, SessionStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-process registry of live payment sessions. Sessions are volatile by
/// design; the durable record of each attempt is the audit trail.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, PaymentSession>>>,
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("session store lock poisoned")
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: PaymentSession) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| poisoned())?
            .insert(session.session_id, session);
        Ok(())
    }

    pub fn get(&self, session_id: &Uuid) -> Result<Option<PaymentSession>> {
        Ok(self.inner.lock().map_err(|_| poisoned())?.get(session_id).cloned())
    }

    /// Mutates one session inside the store's critical section.
    pub fn update<T>(
        &self,
        session_id: &Uuid,
        f: impl FnOnce(&mut PaymentSession) -> T,
    ) -> Result<Option<T>> {
        let mut sessions = self.inner.lock().map_err(|_| poisoned())?;
        Ok(sessions.get_mut(session_id).map(f))
    }

    pub fn find_by_transaction_ref(
        &self,
        provider_id: &str,
        transaction_ref: &str,
    ) -> Result<Option<PaymentSession>> {
        let sessions = self.inner.lock().map_err(|_| poisoned())?;
        Ok(sessions
            .values()
            .find(|s| {
                s.provider_id == provider_id
                    && s.provider_transaction_ref.as_deref() == Some(transaction_ref)
            })
            .cloned())
    }

    /// Transitions every lapsed non-terminal session to `Expired` in place
    /// and returns the expired sessions for auditing.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentSession>> {
        let mut sessions = self.inner.lock().map_err(|_| poisoned())?;
        let mut expired = Vec::new();
        for session in sessions.values_mut() {
            if !session.status.is_terminal() && now > session.expires_at {
                if session.transition(SessionStatus::Expired, now).is_ok() {
                    expired.push(session.clone());
                }
            }
        }
        Ok(expired)
    }

    /// Archives (drops) terminal sessions untouched since `cutoff`.
    pub fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.inner.lock().map_err(|_| poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.status.is_terminal() && s.updated_at < cutoff));
        Ok(before - sessions.len())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
