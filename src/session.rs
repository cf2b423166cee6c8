//! Transactional session provider seam.
//!
//! Service code reaches the session of the running unit of work through
//! [`ManagedSessionContext::current`]; the unit-of-work invoker binds it to the
//! worker thread for the duration of the call.

use crate::error::SessionError;
use std::cell::RefCell;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Normal,
    Get,
    Put,
    Refresh,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    Manual,
    Commit,
    #[default]
    Auto,
    Always,
}

/// Marks a method as running inside a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOfWork {
    /// Wrap the call in a transaction
    pub transactional: bool,
    pub read_only: bool,
    pub cache_mode: CacheMode,
    pub flush_mode: FlushMode,
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self {
            transactional: true,
            read_only: false,
            cache_mode: CacheMode::Normal,
            flush_mode: FlushMode::Auto,
        }
    }
}

impl UnitOfWork {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Default::default()
        }
    }
}

/// A database session.
pub trait Session: Send + Sync {
    fn set_default_read_only(&self, read_only: bool);
    fn set_cache_mode(&self, mode: CacheMode);
    fn set_flush_mode(&self, mode: FlushMode);
    fn begin_transaction(&self) -> Result<(), SessionError>;
    /// True while a transaction begun on this session is still open.
    fn transaction_active(&self) -> bool;
    fn commit(&self) -> Result<(), SessionError>;
    fn rollback(&self) -> Result<(), SessionError>;
    fn close(&self);
}

/// Opens sessions.
pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> Result<Arc<dyn Session>, SessionError>;
}

thread_local! {
    static BOUND_SESSIONS: RefCell<Vec<Arc<dyn Session>>> = const { RefCell::new(Vec::new()) };
}

/// Thread-bound session context.
pub struct ManagedSessionContext;

impl ManagedSessionContext {
    pub fn bind(session: Arc<dyn Session>) {
        BOUND_SESSIONS.with(|sessions| sessions.borrow_mut().push(session));
    }

    /// Remove the most recently bound session.
    pub fn unbind() -> Option<Arc<dyn Session>> {
        BOUND_SESSIONS.with(|sessions| sessions.borrow_mut().pop())
    }

    /// Session of the innermost unit of work on this thread.
    pub fn current() -> Option<Arc<dyn Session>> {
        BOUND_SESSIONS.with(|sessions| sessions.borrow().last().cloned())
    }

    pub fn has_bind() -> bool {
        BOUND_SESSIONS.with(|sessions| !sessions.borrow().is_empty())
    }
}
