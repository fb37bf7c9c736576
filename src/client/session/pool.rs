use std::{collections::VecDeque, sync::Mutex};

use super::ServerSession;
use crate::bson::Document;

/// Server session identifiers that can be handed to new sessions. Guarded by a blocking mutex
/// so that a dropped session can be checked in without an executor.
#[derive(Debug, Default)]
pub(crate) struct ServerSessionPool {
    pool: Mutex<VecDeque<ServerSession>>,
}

impl ServerSessionPool {
    pub(crate) fn new() -> Self {
        Self {
            pool: Default::default(),
        }
    }

    /// Checks out the most recently used server session, or creates a new one if the pool is
    /// empty.
    pub(crate) fn check_out(&self) -> ServerSession {
        let mut pool = match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.pop_front().unwrap_or_else(ServerSession::new)
    }

    /// Checks in a server session. Dirty sessions are discarded. Returns whether the session
    /// was kept.
    pub(crate) fn check_in(&self, session: ServerSession) -> bool {
        if session.dirty {
            return false;
        }
        let mut pool = match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.push_front(session);
        true
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &Document) -> bool {
        let pool = match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.iter().any(|session| &session.id == id)
    }

    /// Empties the pool, returning the IDs of the sessions it contained.
    pub(crate) fn drain_session_ids(&self) -> Vec<Document> {
        let mut pool = match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.drain(..).map(|session| session.id).collect()
    }
}
