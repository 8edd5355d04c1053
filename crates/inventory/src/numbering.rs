//! Human-readable document numbers: `{PREFIX}-{YEAR}-{SEQ:05}`.
//!
//! Sequences are partitioned by (tenant, company, document type, year). The
//! allocation itself (locking, seeding, persistence) lives in the
//! infrastructure layer; this module only owns the format.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockflow_core::{CompanyId, DomainError, DomainResult, TenantId};

/// Document families that draw numbers from their own sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    StockTransfer,
    StockAdjustment,
    PurchaseOrder,
    SalesOrder,
    GoodsReceipt,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::StockTransfer,
        DocumentType::StockAdjustment,
        DocumentType::PurchaseOrder,
        DocumentType::SalesOrder,
        DocumentType::GoodsReceipt,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::StockTransfer => "TRF",
            DocumentType::StockAdjustment => "ADJ",
            DocumentType::PurchaseOrder => "PO",
            DocumentType::SalesOrder => "SO",
            DocumentType::GoodsReceipt => "GRN",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.prefix() == prefix)
    }
}

/// A formatted, parseable document number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    doc_type: DocumentType,
    year: i32,
    sequence: u64,
}

impl DocumentNumber {
    pub const MIN_SEQUENCE_WIDTH: usize = 5;

    pub fn new(doc_type: DocumentType, year: i32, sequence: u64) -> DomainResult<Self> {
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "document year must have four digits (got {year})"
            )));
        }
        if sequence == 0 {
            return Err(DomainError::validation("document sequence starts at 1"));
        }
        Ok(Self {
            doc_type,
            year,
            sequence,
        })
    }

    /// Leading part shared by every number of one partition, e.g. `TRF-2025-`.
    pub fn series_prefix(doc_type: DocumentType, year: i32) -> String {
        format!("{}-{year}-", doc_type.prefix())
    }

    pub fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn belongs_to(&self, doc_type: DocumentType, year: i32) -> bool {
        self.doc_type == doc_type && self.year == year
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Width is a minimum; sequences past 99999 grow instead of truncating.
        write!(
            f,
            "{}{:0width$}",
            Self::series_prefix(self.doc_type, self.year),
            self.sequence,
            width = Self::MIN_SEQUENCE_WIDTH
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("malformed document number '{s}'"));

        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(year), Some(seq)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let doc_type = DocumentType::from_prefix(prefix).ok_or_else(invalid)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if seq.len() < Self::MIN_SEQUENCE_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let sequence: u64 = seq.parse().map_err(|_| invalid())?;
        let number = Self::new(doc_type, year, sequence)?;

        // Only the canonical rendering is accepted ("TRF-2025-000001" is not).
        if number.to_string() != s {
            return Err(invalid());
        }
        Ok(number)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

/// Partition of one numbering sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub doc_type: DocumentType,
    pub year: i32,
}

impl core::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "sequence {}{{n}} (tenant {}, company {})",
            DocumentNumber::series_prefix(self.doc_type, self.year),
            self.tenant_id,
            self.company_id
        )
    }
}
