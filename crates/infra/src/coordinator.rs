//! Unit-of-work execution.
//!
//! Every transition runs through [`TransactionCoordinator::execute`]:
//!
//! ```text
//! begin ─▶ work(&mut ScopedTransaction) ─┬─ Ok  ─▶ commit ─▶ Ok(value)
//!                                        └─ Err ─▶ rollback ─▶ Err(original error)
//! ```
//!
//! No partial state is observable: either every write of the unit commits,
//! or none does. The caller always receives the error that aborted the unit,
//! even if the rollback itself fails (that failure is logged).

use stockflow_auth::TenantScope;

use crate::error::ServiceError;
use crate::scoped::ScopedTransaction;
use crate::store::PersistenceStore;

#[derive(Debug)]
pub struct TransactionCoordinator<S> {
    store: S,
}

impl<S> TransactionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: PersistenceStore> TransactionCoordinator<S> {
    pub fn execute<T, F>(
        &self,
        scope: &TenantScope,
        operation: &'static str,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut ScopedTransaction<'_>) -> Result<T, ServiceError>,
    {
        let mut tx = ScopedTransaction::new(self.store.begin()?, scope);
        tracing::debug!(operation, "transaction started");

        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                tracing::debug!(operation, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                match tx.rollback() {
                    Ok(()) => tracing::debug!(operation, error = %err, "transaction rolled back"),
                    Err(rollback_err) => tracing::error!(
                        operation,
                        error = %err,
                        rollback_error = %rollback_err,
                        "rollback failed"
                    ),
                }
                Err(err)
            }
        }
    }
}
