// SPDX-License-Identifier: MIT

//! Thread-safe session table: status transitions, progress updates, and
//! per-session output fan-out to subscribers (spec.md §4.9).

use crate::env;
use chrono::Utc;
use orbital_core::{OutputMessage, RingBuffer, Session, SessionId, SessionStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} is not in a terminal status")]
    NotTerminal(SessionId),
}

struct Subscriber {
    token: u64,
    tx: mpsc::Sender<OutputMessage>,
}

struct Entry {
    session: Session,
    ring: RingBuffer<OutputMessage>,
    subscribers: Vec<Subscriber>,
    completion_tx: watch::Sender<bool>,
}

/// A live subscription against one session's output stream (spec.md §4.9
/// `Subscribe`). Unregisters itself from the registry on drop.
pub struct Subscription {
    pub receiver: mpsc::Receiver<OutputMessage>,
    pub completion: watch::Receiver<bool>,
    registry: Registry,
    id: SessionId,
    token: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.id, self.token);
    }
}

/// The session registry. Cheaply cloneable; every clone shares the same
/// underlying table (spec.md §4.9's "single owner" model, realized as a
/// lock-protected table with narrow critical sections per spec.md §9).
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<SessionId, Entry>>>,
    next_token: Arc<AtomicU64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Insert a new session, with a fresh ring buffer and empty subscriber
    /// list. Fails if the id is already present.
    pub fn add(&self, session: Session) -> Result<(), RegistryError> {
        let mut map = self.inner.lock();
        if map.contains_key(&session.id) {
            return Err(RegistryError::AlreadyExists(session.id.clone()));
        }
        let (completion_tx, _rx) = watch::channel(session.status.is_terminal());
        map.insert(
            session.id.clone(),
            Entry {
                session,
                ring: RingBuffer::new(env::ring_buffer_capacity()),
                subscribers: Vec::new(),
                completion_tx,
            },
        );
        Ok(())
    }

    /// A cloned, safely-marshalable snapshot of the session.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.inner.lock().get(id).map(|e| e.session.clone())
    }

    /// Mutate the live session under the registry lock; the closure's
    /// critical section is the only place internal mutation happens
    /// (spec.md §4.9 `GetInternal`, realized as a narrow closure instead of
    /// an exposed `&mut` reference so callers cannot hold the lock open).
    pub fn with_session_mut<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, RegistryError> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(f(&mut entry.session))
    }

    /// Set status, set `completed_at` if transitioning to terminal,
    /// broadcast a `status` message, and close the completion channel if
    /// terminal (spec.md §4.9 `UpdateStatus`).
    pub fn update_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        error_message: Option<String>,
    ) -> Result<(), RegistryError> {
        let now = Utc::now();
        let mut map = self.inner.lock();
        let entry = map.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.session.status = status;
        entry.session.error_message = error_message;
        if status.is_terminal() {
            entry.session.completed_at = Some(now);
        }
        let msg = OutputMessage::status(status.to_string(), now);
        entry.ring.push(msg.clone());
        fanout(&mut entry.subscribers, &msg);
        if status.is_terminal() {
            let _ = entry.completion_tx.send(true);
        }
        Ok(())
    }

    /// Set progress fields under lock; no broadcast — the executor's live
    /// writer has already streamed the content (spec.md §4.9
    /// `UpdateProgress`).
    pub fn update_progress(
        &self,
        id: &SessionId,
        iteration: u32,
        total_cost: f64,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<(), RegistryError> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.session.iteration = iteration;
        entry.session.total_cost = total_cost;
        entry.session.tokens_in = tokens_in;
        entry.session.tokens_out = tokens_out;
        Ok(())
    }

    /// Append to the ring buffer and fan out non-blocking to every
    /// subscriber (spec.md §4.9 `Broadcast`). A subscriber whose channel is
    /// full has this message dropped for it; writers never block
    /// (spec.md §5, §8 scenario #5).
    pub fn broadcast(&self, id: &SessionId, msg: OutputMessage) -> Result<(), RegistryError> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.ring.push(msg.clone());
        fanout(&mut entry.subscribers, &msg);
        Ok(())
    }

    /// Snapshot the current ring buffer into a fresh channel, then
    /// register it for future messages (spec.md §4.9 `Subscribe`).
    pub fn subscribe(&self, id: &SessionId) -> Result<Subscription, RegistryError> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let (tx, rx) = mpsc::channel(env::subscriber_channel_capacity());
        for msg in entry.ring.read_all() {
            let _ = tx.try_send(msg);
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        entry.subscribers.push(Subscriber { token, tx });
        let completion = entry.completion_tx.subscribe();
        Ok(Subscription {
            receiver: rx,
            completion,
            registry: self.clone(),
            id: id.clone(),
            token,
        })
    }

    fn unsubscribe(&self, id: &SessionId, token: u64) {
        if let Some(entry) = self.inner.lock().get_mut(id) {
            entry.subscribers.retain(|s| s.token != token);
        }
    }

    /// All sessions, cloned (spec.md §4.9 `List`).
    pub fn list(&self) -> Vec<Session> {
        self.inner.lock().values().map(|e| e.session.clone()).collect()
    }

    /// Remove a session; only allowed once it is terminal (spec.md §4.9
    /// `Delete`).
    pub fn delete(&self, id: &SessionId) -> Result<(), RegistryError> {
        let mut map = self.inner.lock();
        let entry = map.get(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if !entry.session.status.is_terminal() {
            return Err(RegistryError::NotTerminal(id.clone()));
        }
        map.remove(id);
        Ok(())
    }
}

fn fanout(subscribers: &mut Vec<Subscriber>, msg: &OutputMessage) {
    subscribers.retain(|s| match s.tx.try_send(msg.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
