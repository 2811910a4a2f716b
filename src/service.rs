//! Business orchestration over the transactional machinery.

use std::sync::Arc;

use crate::backend::ConnectionProvider;
use crate::context::TransactionContext;
use crate::error::Result;
use crate::manager::TransactionManager;
use crate::repository::{Account, AccountRepository};

/// Predicate applied to the destination account before the credit is
/// written. Returning an error rolls the whole transfer back.
pub type TransferValidator = Arc<dyn Fn(&Account) -> Result<()> + Send + Sync>;

/// Moves money between two accounts as a single unit of work.
#[derive(Clone)]
pub struct TransferService<P: ConnectionProvider> {
    manager: TransactionManager<P>,
    repository: AccountRepository<P>,
    validator: TransferValidator,
}

impl<P: ConnectionProvider> TransferService<P> {
    /// Build a service whose manager and repository share one provider.
    /// The default validator accepts every destination.
    pub fn new(provider: P) -> Self {
        Self {
            manager: TransactionManager::new(provider.clone()),
            repository: AccountRepository::new(provider),
            validator: Arc::new(|_| Ok(())),
        }
    }

    /// Replace the destination validator
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Account) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    pub fn repository(&self) -> &AccountRepository<P> {
        &self.repository
    }

    pub fn manager(&self) -> &TransactionManager<P> {
        &self.manager
    }

    /// Transfer `amount` from one account to the other.
    ///
    /// Runs inside a unit of work: both balances are read, the debit is
    /// written, the destination is validated, the credit is written. Any
    /// error, business validation included, rolls the whole operation back
    /// and is surfaced to the caller.
    pub async fn transfer(
        &self,
        ctx: &mut TransactionContext<P::Connection>,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<()> {
        tracing::debug!(from = from_id, to = to_id, amount, "transfer requested");

        let repository = self.repository.clone();
        let validate = self.validator.clone();
        let from_id = from_id.to_string();
        let to_id = to_id.to_string();

        self.manager
            .in_transaction(ctx, move |ctx| {
                Box::pin(async move {
                    let from = repository.find_by_id(ctx, &from_id).await?;
                    let to = repository.find_by_id(ctx, &to_id).await?;

                    repository.update(ctx, &from.id, from.balance - amount).await?;
                    (validate.as_ref())(&to)?;
                    repository.update(ctx, &to.id, to.balance + amount).await?;
                    Ok(())
                })
            })
            .await
    }
}
