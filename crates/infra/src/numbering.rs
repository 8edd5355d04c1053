//! Per-company sequential document numbers.
//!
//! One counter row per (tenant, company, document type, year). Allocation
//! locks that row, so concurrent creations in one partition serialise on it
//! while other partitions proceed. A partition without a counter is seeded
//! from the highest number already stored under `{PREFIX}-{YEAR}-`, which
//! keeps numbering continuous for documents imported before the counter
//! existed.
//!
//! The counter write belongs to the caller's transaction: if the document
//! creation rolls back, so does the increment, and the number is reissued.

use stockflow_inventory::{DocumentNumber, DocumentType};

use crate::error::ServiceError;
use crate::scoped::ScopedTransaction;

#[derive(Debug, Default, Copy, Clone)]
pub struct DocumentNumberAllocator;

impl DocumentNumberAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        tx: &mut ScopedTransaction<'_>,
        doc_type: DocumentType,
        year: i32,
    ) -> Result<DocumentNumber, ServiceError> {
        let (key, last) = tx.lock_sequence(doc_type, year)?;
        let last = match last {
            Some(last) => last,
            None => {
                let seeded = tx.max_document_sequence(doc_type, year)?.unwrap_or(0);
                tracing::debug!(sequence = %key, seeded, "seeding document counter");
                seeded
            }
        };

        let next = last
            .checked_add(1)
            .ok_or_else(|| ServiceError::internal(format!("{key} exhausted")))?;
        tx.store_sequence(&key, next)?;

        Ok(DocumentNumber::new(doc_type, year, next)?)
    }
}
