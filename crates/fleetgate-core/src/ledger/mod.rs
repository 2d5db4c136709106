//! Ledger access: the store trait, the chunked read client, and the
//! in-memory reference store.
//!
//! The record store itself is an external collaborator; this engine talks to
//! it through [`LedgerStore`], one method per remote request. The
//! [`LedgerClient`] wrapper validates inputs before any store call and
//! chunks batch line reads to respect the remote request-size limit. There
//! is no caching, retry, or backoff here: store failures propagate verbatim,
//! and every read is idempotent so callers may simply re-issue a fetch.
//!
//! Waiver appends are the only writes. They are append-only and commutative:
//! concurrent waivers for different policies never conflict, and duplicate
//! waivers for the same policy downgrade the same findings redundantly.

mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    FiscalPeriod, ModuleEntity, RelationshipRow, Transaction, TransactionLine,
};

pub use memory::{MemoryLedgerStore, MAX_LINE_IDS_PER_REQUEST};

/// Number of transaction ids per batch line-read request.
pub const LINE_BATCH_CHUNK_SIZE: usize = 10;

/// Errors from ledger access.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The store reported a failure (network, backend, serialization).
    #[error("store error: {0}")]
    Store(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected the caller's credentials for this tenant.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request was rejected before any store call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single request exceeded the store's request-size limit.
    #[error("request of {requested} ids exceeds store limit of {max}")]
    RequestTooLarge {
        /// Number of ids in the rejected request.
        requested: usize,
        /// Store request-size limit.
        max: usize,
    },
}

/// Optional filters for a transaction read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Restrict to one transaction kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Restrict to one module/version identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_ref: Option<String>,
}

/// Request to append a waiver line to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverRequest {
    /// Transaction the waiver line is appended to.
    pub transaction_id: String,
    /// Policy name the waiver targets.
    pub policy: String,
    /// Reason the waiver was granted.
    pub reason: String,
    /// Who approved the waiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

/// Tenant-scoped record store, one method per remote request.
///
/// Implementations must honor tenant scoping: a read for tenant A must never
/// return tenant B's records. `read_transaction_lines` represents a single
/// request and may enforce a request-size limit on the id list; callers that
/// need more ids go through [`LedgerClient::read_transaction_lines_batch`],
/// which chunks for them.
pub trait LedgerStore: Send + Sync {
    /// Reads transactions for a tenant within `[from, to]`, optionally
    /// filtered by kind and module.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the store cannot serve the read.
    fn read_transactions(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Reads all lines belonging to the given transactions, in one request.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the store cannot serve the read, in
    /// particular [`LedgerError::RequestTooLarge`] when the id list exceeds
    /// the store's request-size limit.
    fn read_transaction_lines(
        &self,
        tenant_id: &str,
        transaction_ids: &[String],
    ) -> Result<Vec<TransactionLine>, LedgerError>;

    /// Reads all module entities for a tenant.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the store cannot serve the read.
    fn read_modules(&self, tenant_id: &str) -> Result<Vec<ModuleEntity>, LedgerError>;

    /// Reads all relationship rows for a tenant.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the store cannot serve the read.
    fn read_relationships(&self, tenant_id: &str) -> Result<Vec<RelationshipRow>, LedgerError>;

    /// Reads all fiscal periods for a tenant.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the store cannot serve the read.
    fn read_fiscal_periods(&self, tenant_id: &str) -> Result<Vec<FiscalPeriod>, LedgerError>;

    /// Appends a new waiver line to the request's transaction. Returns true
    /// when the line was recorded.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] when the transaction does not exist for the
    /// tenant or the store cannot record the line.
    fn append_waiver(&self, tenant_id: &str, request: &WaiverRequest) -> Result<bool, LedgerError>;
}

/// Validation and chunking wrapper over a [`LedgerStore`].
///
/// Rejects empty mandatory identifiers before any store call and chunks
/// batch line reads into groups of at most the configured chunk size,
/// issuing chunks sequentially and concatenating the results.
#[derive(Debug, Clone)]
pub struct LedgerClient<S> {
    store: S,
    chunk_size: usize,
}

impl<S: LedgerStore> LedgerClient<S> {
    /// Wraps a store with the default chunk size of
    /// [`LINE_BATCH_CHUNK_SIZE`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            chunk_size: LINE_BATCH_CHUNK_SIZE,
        }
    }

    /// Wraps a store with an explicit chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for a zero chunk size.
    pub fn with_chunk_size(store: S, chunk_size: usize) -> Result<Self, LedgerError> {
        if chunk_size == 0 {
            return Err(LedgerError::InvalidInput(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(Self { store, chunk_size })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn require_id(value: &str, what: &str) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidInput(format!("{what} must not be empty")));
        }
        Ok(())
    }

    /// Reads transactions for a tenant within `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for an empty tenant id; store
    /// failures propagate verbatim.
    pub fn read_transactions(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        let transactions = self.store.read_transactions(tenant_id, from, to, filter)?;
        debug!(
            tenant_id,
            count = transactions.len(),
            "fetched transactions"
        );
        Ok(transactions)
    }

    /// Reads the lines of a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for empty identifiers; store
    /// failures propagate verbatim.
    pub fn read_transaction_lines(
        &self,
        tenant_id: &str,
        transaction_id: &str,
    ) -> Result<Vec<TransactionLine>, LedgerError> {
        Self::require_id(transaction_id, "transaction id")?;
        self.read_transaction_lines_batch(tenant_id, &[transaction_id.to_string()])
    }

    /// Reads the lines of many transactions, chunking the id list to respect
    /// the store's request-size limit. Chunks are issued sequentially and
    /// their results concatenated in request order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for an empty tenant id or any
    /// empty transaction id; store failures propagate verbatim and abort the
    /// remaining chunks.
    pub fn read_transaction_lines_batch(
        &self,
        tenant_id: &str,
        transaction_ids: &[String],
    ) -> Result<Vec<TransactionLine>, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        for id in transaction_ids {
            Self::require_id(id, "transaction id")?;
        }

        let mut lines = Vec::new();
        let mut chunks = 0usize;
        for chunk in transaction_ids.chunks(self.chunk_size) {
            lines.extend(self.store.read_transaction_lines(tenant_id, chunk)?);
            chunks += 1;
        }
        debug!(
            tenant_id,
            ids = transaction_ids.len(),
            chunks,
            lines = lines.len(),
            "fetched transaction lines"
        );
        Ok(lines)
    }

    /// Reads all module entities for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for an empty tenant id; store
    /// failures propagate verbatim.
    pub fn read_modules(&self, tenant_id: &str) -> Result<Vec<ModuleEntity>, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        self.store.read_modules(tenant_id)
    }

    /// Reads all relationship rows for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for an empty tenant id; store
    /// failures propagate verbatim.
    pub fn read_relationships(&self, tenant_id: &str) -> Result<Vec<RelationshipRow>, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        self.store.read_relationships(tenant_id)
    }

    /// Reads all fiscal periods for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] for an empty tenant id; store
    /// failures propagate verbatim.
    pub fn read_fiscal_periods(&self, tenant_id: &str) -> Result<Vec<FiscalPeriod>, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        self.store.read_fiscal_periods(tenant_id)
    }

    /// Appends a waiver line. The engine's only write path.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] when the tenant id, transaction
    /// id, policy, or reason is empty; store failures propagate verbatim.
    pub fn append_waiver(
        &self,
        tenant_id: &str,
        request: &WaiverRequest,
    ) -> Result<bool, LedgerError> {
        Self::require_id(tenant_id, "tenant id")?;
        Self::require_id(&request.transaction_id, "transaction id")?;
        Self::require_id(&request.policy, "waiver policy")?;
        Self::require_id(&request.reason, "waiver reason")?;
        let recorded = self.store.append_waiver(tenant_id, request)?;
        debug!(
            tenant_id,
            transaction_id = %request.transaction_id,
            policy = %request.policy,
            recorded,
            "appended waiver"
        );
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;
    use crate::model::{ComplianceResult, StepPayload, StepStatus};

    /// Store that records the size of every line request it receives.
    #[derive(Debug)]
    struct RecordingStore {
        request_sizes: Mutex<Vec<usize>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                request_sizes: Mutex::new(Vec::new()),
            }
        }

        fn sizes(&self) -> Vec<usize> {
            self.request_sizes
                .lock()
                .expect("test mutex poisoned")
                .clone()
        }
    }

    impl LedgerStore for RecordingStore {
        fn read_transactions(
            &self,
            _tenant_id: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _filter: &TransactionFilter,
        ) -> Result<Vec<Transaction>, LedgerError> {
            Ok(vec![])
        }

        fn read_transaction_lines(
            &self,
            tenant_id: &str,
            transaction_ids: &[String],
        ) -> Result<Vec<TransactionLine>, LedgerError> {
            self.request_sizes
                .lock()
                .expect("test mutex poisoned")
                .push(transaction_ids.len());
            Ok(transaction_ids
                .iter()
                .map(|id| TransactionLine {
                    id: format!("line-{id}"),
                    transaction_id: id.clone(),
                    tenant_id: tenant_id.to_string(),
                    line_no: 1,
                    kind: "step.contract".to_string(),
                    payload: StepPayload::Compliance(ComplianceResult {
                        status: Some(StepStatus::Passed),
                        violations: vec![],
                    }),
                    confidence: None,
                    created_at: Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap(),
                })
                .collect())
        }

        fn read_modules(&self, _tenant_id: &str) -> Result<Vec<ModuleEntity>, LedgerError> {
            Ok(vec![])
        }

        fn read_relationships(
            &self,
            _tenant_id: &str,
        ) -> Result<Vec<RelationshipRow>, LedgerError> {
            Ok(vec![])
        }

        fn read_fiscal_periods(&self, _tenant_id: &str) -> Result<Vec<FiscalPeriod>, LedgerError> {
            Ok(vec![])
        }

        fn append_waiver(
            &self,
            _tenant_id: &str,
            _request: &WaiverRequest,
        ) -> Result<bool, LedgerError> {
            Ok(true)
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("txn-{i}")).collect()
    }

    #[test]
    fn batch_read_chunks_at_configured_size() {
        let client = LedgerClient::new(RecordingStore::new());
        let lines = client
            .read_transaction_lines_batch("acme", &ids(25))
            .unwrap();
        assert_eq!(lines.len(), 25);
        assert_eq!(client.store().sizes(), vec![10, 10, 5]);
    }

    #[test]
    fn batch_read_preserves_request_order() {
        let client = LedgerClient::new(RecordingStore::new());
        let lines = client
            .read_transaction_lines_batch("acme", &ids(12))
            .unwrap();
        let got: Vec<&str> = lines.iter().map(|l| l.transaction_id.as_str()).collect();
        let want: Vec<String> = ids(12);
        assert_eq!(got, want.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn empty_id_list_issues_no_requests() {
        let client = LedgerClient::new(RecordingStore::new());
        let lines = client.read_transaction_lines_batch("acme", &[]).unwrap();
        assert!(lines.is_empty());
        assert!(client.store().sizes().is_empty());
    }

    #[test]
    fn empty_tenant_rejected_before_store_call() {
        let client = LedgerClient::new(RecordingStore::new());
        let err = client
            .read_transaction_lines_batch("", &ids(3))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(client.store().sizes().is_empty());

        assert!(matches!(
            client.read_modules("  ").unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
    }

    #[test]
    fn empty_transaction_id_rejected() {
        let client = LedgerClient::new(RecordingStore::new());
        let mut list = ids(3);
        list.push(String::new());
        let err = client.read_transaction_lines_batch("acme", &list).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(client.store().sizes().is_empty());
    }

    #[test]
    fn waiver_request_fields_validated() {
        let client = LedgerClient::new(RecordingStore::new());
        let request = WaiverRequest {
            transaction_id: "txn-1".to_string(),
            policy: String::new(),
            reason: "because".to_string(),
            approved_by: None,
        };
        assert!(matches!(
            client.append_waiver("acme", &request).unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            LedgerClient::with_chunk_size(RecordingStore::new(), 0).unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
        let client = LedgerClient::with_chunk_size(RecordingStore::new(), 4).unwrap();
        client
            .read_transaction_lines_batch("acme", &ids(9))
            .unwrap();
        assert_eq!(client.store().sizes(), vec![4, 4, 1]);
    }
}
