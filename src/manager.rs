//! Transaction lifecycle coordination.
//!
//! The manager owns the begin/commit/rollback protocol: the first `begin` on
//! a context acquires a connection, switches it to manual-commit mode and
//! binds it; nested `begin`s join that unit of work as participants. Only
//! the owner performs physical commits and rollbacks, and the owner's
//! cleanup (unbind, auto-commit restore, release) runs on every exit path.

use crate::backend::{Connection, ConnectionProvider};
use crate::context::TransactionContext;
use crate::error::{DbError, Result};
use crate::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxRole {
    /// Acquired the connection; responsible for commit, rollback and release
    Owner,
    /// Joined an already-active unit of work
    Participant,
}

enum Outcome {
    Commit,
    Rollback,
}

/// Proof that a unit of work was begun.
///
/// A handle is consumed by [`TransactionManager::commit`] or
/// [`TransactionManager::rollback`], so a completed transaction cannot be
/// completed a second time.
#[derive(Debug)]
#[must_use = "a begun transaction must be committed or rolled back"]
pub struct TransactionHandle {
    role: TxRole,
}

impl TransactionHandle {
    fn owner() -> Self {
        Self { role: TxRole::Owner }
    }

    fn participant() -> Self {
        Self {
            role: TxRole::Participant,
        }
    }

    /// Whether this handle owns the connection lifecycle
    pub fn is_owner(&self) -> bool {
        self.role == TxRole::Owner
    }
}

/// Begins, commits and rolls back units of work against a provider,
/// coordinating with the [`TransactionContext`] so nested calls share the
/// owner's connection.
#[derive(Debug, Clone)]
pub struct TransactionManager<P> {
    provider: P,
}

impl<P: ConnectionProvider> TransactionManager<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The provider this manager draws connections from
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open a unit of work on the context.
    ///
    /// With no active binding this acquires a connection, disables
    /// auto-commit and binds it; the returned handle is the owner. With a
    /// binding already present the caller participates in the surrounding
    /// unit of work and the handle carries no completion responsibility.
    pub async fn begin(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
    ) -> Result<TransactionHandle> {
        if ctx.is_active() {
            tracing::debug!("joining active unit of work");
            return Ok(TransactionHandle::participant());
        }

        let mut conn = self.provider.acquire().await?;
        if let Err(e) = conn.set_auto_commit(false).await {
            let _ = self.provider.release(conn).await;
            return Err(e);
        }
        tracing::debug!(conn = %conn.id(), "unit of work started");
        ctx.bind(conn)?;
        Ok(TransactionHandle::owner())
    }

    /// Commit the unit of work.
    ///
    /// Participants defer to the owner. An owner whose context was marked
    /// rollback-only rolls back instead and surfaces
    /// [`DbError::RollbackOnly`]. A failed physical commit still attempts a
    /// rollback and surfaces the commit error. The connection is unbound and
    /// released on every path.
    pub async fn commit(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        handle: TransactionHandle,
    ) -> Result<()> {
        if !handle.is_owner() {
            tracing::debug!("participant commit, deferring to owner");
            return Ok(());
        }
        if ctx.is_rollback_only() {
            tracing::debug!("unit of work is rollback-only, rolling back");
            self.complete(ctx, Outcome::Rollback).await?;
            return Err(DbError::RollbackOnly);
        }
        self.complete(ctx, Outcome::Commit).await
    }

    /// Roll back the unit of work.
    ///
    /// A participant cannot complete the owner's transaction; it marks the
    /// context rollback-only so the owning commit turns into a rollback.
    pub async fn rollback(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        handle: TransactionHandle,
    ) -> Result<()> {
        if !handle.is_owner() {
            tracing::debug!("participant rollback, marking unit of work rollback-only");
            ctx.set_rollback_only();
            return Ok(());
        }
        self.complete(ctx, Outcome::Rollback).await
    }

    async fn complete(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        outcome: Outcome,
    ) -> Result<()> {
        let mut conn = ctx.unbind()?;

        let result = match outcome {
            Outcome::Commit => {
                let committed = conn.commit().await;
                if committed.is_err() {
                    if let Err(e) = conn.rollback().await {
                        tracing::warn!(conn = %conn.id(), "rollback after failed commit also failed: {e}");
                    }
                }
                committed
            }
            Outcome::Rollback => conn.rollback().await,
        };

        match &result {
            Ok(()) => tracing::debug!(conn = %conn.id(), "unit of work finished"),
            Err(e) => tracing::error!(conn = %conn.id(), "unit of work failed: {e}"),
        }

        if let Err(e) = conn.set_auto_commit(true).await {
            tracing::warn!(conn = %conn.id(), "could not restore auto-commit: {e}");
        }
        let released = self.provider.release(conn).await;

        result.and(released)
    }

    /// Run a closure inside a unit of work.
    ///
    /// Begins a transaction on the context, invokes the closure, commits on
    /// `Ok` and rolls back on `Err`, rethrowing the closure's error
    /// untouched. This is the demarcation wrapper services use instead of
    /// driving begin/commit/rollback by hand.
    ///
    /// The closure should capture owned data (clone cheap handles in) and
    /// receives the context to thread through repository calls.
    pub async fn in_transaction<'a, T, F>(
        &'a self,
        ctx: &'a mut TransactionContext<P::Connection>,
        f: F,
    ) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<P::Connection>) -> BoxFuture<'c, T, DbError>
            + Send
            + 'a,
        T: Send,
    {
        let handle = self.begin(ctx).await?;
        match f(ctx).await {
            Ok(value) => {
                self.commit(ctx, handle).await?;
                Ok(value)
            }
            Err(e) => {
                // the closure's error wins; a rollback failure is only logged
                if let Err(rb) = self.rollback(ctx, handle).await {
                    tracing::warn!("rollback failed: {rb}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Acquired,
        AutoCommitOff,
        Committed,
        RolledBack,
        AutoCommitOn,
        Released,
    }

    #[derive(Clone, Copy, Default)]
    struct Script {
        fail_commit: bool,
    }

    struct MockConnection {
        id: Uuid,
        events: Arc<Mutex<Vec<Event>>>,
        script: Script,
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn id(&self) -> Uuid {
            self.id
        }

        async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }

        async fn fetch_optional(
            &mut self,
            _sql: &str,
            _params: &[SqlValue],
        ) -> Result<Option<Vec<SqlValue>>> {
            Ok(None)
        }

        async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
            self.events.lock().push(if auto_commit {
                Event::AutoCommitOn
            } else {
                Event::AutoCommitOff
            });
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.events.lock().push(Event::Committed);
            if self.script.fail_commit {
                Err(DbError::data_access_msg("commit refused"))
            } else {
                Ok(())
            }
        }

        async fn rollback(&mut self) -> Result<()> {
            self.events.lock().push(Event::RolledBack);
            Ok(())
        }

        async fn is_valid(&mut self) -> bool {
            true
        }
    }

    #[derive(Clone, Default)]
    struct MockProvider {
        events: Arc<Mutex<Vec<Event>>>,
        script: Script,
    }

    impl MockProvider {
        fn failing_commit() -> Self {
            Self {
                events: Arc::default(),
                script: Script { fail_commit: true },
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl ConnectionProvider for MockProvider {
        type Connection = MockConnection;

        async fn acquire(&self) -> Result<MockConnection> {
            self.events.lock().push(Event::Acquired);
            Ok(MockConnection {
                id: Uuid::new_v4(),
                events: self.events.clone(),
                script: self.script,
            })
        }

        async fn release(&self, _conn: MockConnection) -> Result<()> {
            self.events.lock().push(Event::Released);
            Ok(())
        }

        fn connection_string(&self) -> String {
            "mock://".into()
        }
    }

    #[tokio::test]
    async fn owner_commits_and_releases() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let handle = manager.begin(&mut ctx).await.unwrap();
        assert!(handle.is_owner());
        assert!(ctx.is_active());

        manager.commit(&mut ctx, handle).await.unwrap();
        assert!(!ctx.is_active());
        assert_eq!(
            provider.events(),
            vec![
                Event::Acquired,
                Event::AutoCommitOff,
                Event::Committed,
                Event::AutoCommitOn,
                Event::Released,
            ]
        );
    }

    #[tokio::test]
    async fn owner_rollback_releases() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let handle = manager.begin(&mut ctx).await.unwrap();
        manager.rollback(&mut ctx, handle).await.unwrap();

        assert_eq!(
            provider.events(),
            vec![
                Event::Acquired,
                Event::AutoCommitOff,
                Event::RolledBack,
                Event::AutoCommitOn,
                Event::Released,
            ]
        );
    }

    #[tokio::test]
    async fn nested_begin_joins_without_acquiring() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let owner = manager.begin(&mut ctx).await.unwrap();
        let participant = manager.begin(&mut ctx).await.unwrap();
        assert!(!participant.is_owner());

        // participant commit defers; nothing is committed yet
        manager.commit(&mut ctx, participant).await.unwrap();
        assert!(!provider.events().contains(&Event::Committed));
        assert!(ctx.is_active());

        manager.commit(&mut ctx, owner).await.unwrap();
        let events = provider.events();
        assert_eq!(
            events.iter().filter(|e| **e == Event::Acquired).count(),
            1
        );
        assert_eq!(
            events.iter().filter(|e| **e == Event::Committed).count(),
            1
        );
    }

    #[tokio::test]
    async fn participant_rollback_forces_owner_rollback() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let owner = manager.begin(&mut ctx).await.unwrap();
        let participant = manager.begin(&mut ctx).await.unwrap();

        manager.rollback(&mut ctx, participant).await.unwrap();
        assert!(ctx.is_rollback_only());

        let err = manager.commit(&mut ctx, owner).await.unwrap_err();
        assert!(matches!(err, DbError::RollbackOnly));

        let events = provider.events();
        assert!(!events.contains(&Event::Committed));
        assert!(events.contains(&Event::RolledBack));
        assert!(events.contains(&Event::Released));
    }

    #[tokio::test]
    async fn failed_commit_still_rolls_back_and_releases() {
        let provider = MockProvider::failing_commit();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let handle = manager.begin(&mut ctx).await.unwrap();
        let err = manager.commit(&mut ctx, handle).await.unwrap_err();
        assert!(matches!(err, DbError::DataAccess { .. }));

        assert_eq!(
            provider.events(),
            vec![
                Event::Acquired,
                Event::AutoCommitOff,
                Event::Committed,
                Event::RolledBack,
                Event::AutoCommitOn,
                Event::Released,
            ]
        );
        assert!(!ctx.is_active());
    }

    #[tokio::test]
    async fn in_transaction_commits_on_ok() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let value = manager
            .in_transaction(&mut ctx, |_ctx| Box::pin(async move { Ok(42) }))
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert!(provider.events().contains(&Event::Committed));
        assert!(provider.events().contains(&Event::Released));
    }

    #[tokio::test]
    async fn in_transaction_rolls_back_on_err() {
        let provider = MockProvider::default();
        let manager = TransactionManager::new(provider.clone());
        let mut ctx = TransactionContext::new();

        let err = manager
            .in_transaction(&mut ctx, |_ctx| {
                Box::pin(async move {
                    Err::<(), _>(DbError::BusinessRule("transfer rejected".into()))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::BusinessRule(_)));
        let events = provider.events();
        assert!(!events.contains(&Event::Committed));
        assert!(events.contains(&Event::RolledBack));
        assert!(events.contains(&Event::Released));
    }
}
