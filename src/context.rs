//! The binding between one logical unit of work and the connection it runs on.

use crate::error::{DbError, Result};

/// Tracks the connection bound to one logical unit of work.
///
/// A context is created per business operation and threaded through
/// repository calls. Nested calls that find a bound connection reuse it;
/// with no binding, each call provisions a connection of its own.
///
/// A context is an owned value and is never shared between concurrent
/// operations, so two units of work cannot observe each other's binding.
pub struct TransactionContext<C> {
    bound: Option<C>,
    rollback_only: bool,
}

impl<C> TransactionContext<C> {
    pub fn new() -> Self {
        Self {
            bound: None,
            rollback_only: false,
        }
    }

    /// Associate a connection with this unit of work.
    ///
    /// Binding while a connection is already bound is a scoping bug and
    /// fails fast with [`DbError::AlreadyBound`].
    pub fn bind(&mut self, conn: C) -> Result<()> {
        if self.bound.is_some() {
            return Err(DbError::AlreadyBound);
        }
        self.bound = Some(conn);
        Ok(())
    }

    /// The connection bound to this unit of work, if any
    pub fn current(&mut self) -> Option<&mut C> {
        self.bound.as_mut()
    }

    /// Whether a unit of work is active on this context
    pub fn is_active(&self) -> bool {
        self.bound.is_some()
    }

    /// Remove and return the bound connection, clearing the unit-of-work
    /// status.
    ///
    /// Calling this without a matching [`bind`](Self::bind) is a scoping bug
    /// and fails fast with [`DbError::NotBound`].
    pub fn unbind(&mut self) -> Result<C> {
        let conn = self.bound.take().ok_or(DbError::NotBound)?;
        self.rollback_only = false;
        Ok(conn)
    }

    /// Demand that the active unit of work end in rollback
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Whether a participant demanded rollback
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }
}

impl<C> Default for TransactionContext<C> {
    fn default() -> Self {
        Self::new()
    }
}
