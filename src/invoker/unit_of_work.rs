use super::{target_method, Invoker};
use crate::error::InvokeError;
use crate::message::{Arguments, Exchange};
use crate::session::{ManagedSessionContext, Session, SessionFactory, UnitOfWork};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Runs methods marked as units of work inside a managed session, and inside
/// a transaction when the unit of work is transactional.
pub struct UnitOfWorkInvoker {
    underlying: Arc<dyn Invoker>,
    units_of_work: HashMap<String, UnitOfWork>,
    session_factory: Arc<dyn SessionFactory>,
}

impl UnitOfWorkInvoker {
    pub fn new(
        underlying: Arc<dyn Invoker>,
        units_of_work: HashMap<String, UnitOfWork>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            underlying,
            units_of_work,
            session_factory,
        }
    }

    fn invoke_in_session(
        &self,
        unit_of_work: UnitOfWork,
        exchange: &mut Exchange,
        args: Arguments,
    ) -> Result<Value, InvokeError> {
        let session = self.session_factory.open_session()?;
        let mut guard = SessionGuard {
            session: session.clone(),
            bound: false,
        };

        session.set_default_read_only(unit_of_work.read_only);
        session.set_cache_mode(unit_of_work.cache_mode);
        session.set_flush_mode(unit_of_work.flush_mode);
        ManagedSessionContext::bind(session.clone());
        guard.bound = true;

        let result = begin(&session, unit_of_work)
            .and_then(|()| self.underlying.invoke(exchange, args))
            .and_then(|value| {
                if unit_of_work.transactional && session.transaction_active() {
                    session.commit()?;
                }
                Ok(value)
            });

        if result.is_err() && unit_of_work.transactional && session.transaction_active() {
            if let Err(rollback) = session.rollback() {
                warn!(error = %rollback, "Rollback failed, returning the original error");
            }
        }
        result
    }
}

fn begin(session: &Arc<dyn Session>, unit_of_work: UnitOfWork) -> Result<(), InvokeError> {
    if unit_of_work.transactional {
        session.begin_transaction()?;
    }
    Ok(())
}

impl Invoker for UnitOfWorkInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let method = target_method(exchange)?;
        match self.units_of_work.get(&method.name) {
            Some(unit_of_work) => self.invoke_in_session(*unit_of_work, exchange, args),
            None => self.underlying.invoke(exchange, args),
        }
    }
}

/// Closes the session and releases the thread binding on every exit path.
struct SessionGuard {
    session: Arc<dyn Session>,
    bound: bool,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
        if self.bound {
            ManagedSessionContext::unbind();
        }
    }
}
