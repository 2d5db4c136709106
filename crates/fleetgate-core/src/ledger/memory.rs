//! In-memory reference implementation of [`LedgerStore`].
//!
//! Used by the integration tests and embeddable for local evaluation. The
//! store enforces the same contracts a production backend would: tenant
//! scoping on every read, a request-size limit on batch line reads (so
//! client chunking is exercised rather than trusted), and append-only
//! waiver semantics.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{LedgerError, LedgerStore, TransactionFilter, WaiverRequest};
use crate::model::{
    FiscalPeriod, ModuleEntity, RelationshipRow, StepPayload, Transaction, TransactionLine,
    WaiverGrant, STEP_WAIVER,
};

/// Request-size limit on batch line reads, in transaction ids.
pub const MAX_LINE_IDS_PER_REQUEST: usize = 10;

#[derive(Debug, Default)]
struct Inner {
    transactions: Vec<Transaction>,
    lines: Vec<TransactionLine>,
    modules: Vec<ModuleEntity>,
    relationships: Vec<RelationshipRow>,
    periods: Vec<FiscalPeriod>,
    waiver_seq: u64,
}

/// `Mutex`-guarded in-memory record store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Store("memory store mutex poisoned".to_string()))
    }

    /// Seeds a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store lock is poisoned.
    pub fn insert_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.lock()?.transactions.push(transaction);
        Ok(())
    }

    /// Seeds a transaction line.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store lock is poisoned.
    pub fn insert_line(&self, line: TransactionLine) -> Result<(), LedgerError> {
        self.lock()?.lines.push(line);
        Ok(())
    }

    /// Seeds a module entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store lock is poisoned.
    pub fn insert_module(&self, module: ModuleEntity) -> Result<(), LedgerError> {
        self.lock()?.modules.push(module);
        Ok(())
    }

    /// Seeds a relationship row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store lock is poisoned.
    pub fn insert_relationship(&self, relationship: RelationshipRow) -> Result<(), LedgerError> {
        self.lock()?.relationships.push(relationship);
        Ok(())
    }

    /// Seeds a fiscal period.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the store lock is poisoned.
    pub fn insert_fiscal_period(&self, period: FiscalPeriod) -> Result<(), LedgerError> {
        self.lock()?.periods.push(period);
        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn read_transactions(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .filter(|txn| txn.tenant_id == tenant_id)
            .filter(|txn| txn.occurred_at >= from && txn.occurred_at <= to)
            .filter(|txn| filter.kind.as_ref().map_or(true, |kind| &txn.kind == kind))
            .filter(|txn| {
                filter
                    .module_ref
                    .as_ref()
                    .map_or(true, |module_ref| &txn.module_ref == module_ref)
            })
            .cloned()
            .collect())
    }

    fn read_transaction_lines(
        &self,
        tenant_id: &str,
        transaction_ids: &[String],
    ) -> Result<Vec<TransactionLine>, LedgerError> {
        if transaction_ids.len() > MAX_LINE_IDS_PER_REQUEST {
            return Err(LedgerError::RequestTooLarge {
                requested: transaction_ids.len(),
                max: MAX_LINE_IDS_PER_REQUEST,
            });
        }

        let inner = self.lock()?;
        let mut results = Vec::new();
        for id in transaction_ids {
            let mut matching: Vec<TransactionLine> = inner
                .lines
                .iter()
                .filter(|line| line.tenant_id == tenant_id && &line.transaction_id == id)
                .cloned()
                .collect();
            matching.sort_by_key(|line| line.line_no);
            results.extend(matching);
        }
        Ok(results)
    }

    fn read_modules(&self, tenant_id: &str) -> Result<Vec<ModuleEntity>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .modules
            .iter()
            .filter(|module| module.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn read_relationships(&self, tenant_id: &str) -> Result<Vec<RelationshipRow>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .relationships
            .iter()
            .filter(|rel| rel.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn read_fiscal_periods(&self, tenant_id: &str) -> Result<Vec<FiscalPeriod>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .periods
            .iter()
            .filter(|period| period.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn append_waiver(&self, tenant_id: &str, request: &WaiverRequest) -> Result<bool, LedgerError> {
        let mut inner = self.lock()?;

        let exists = inner.transactions.iter().any(|txn| {
            txn.tenant_id == tenant_id && txn.id == request.transaction_id
        });
        if !exists {
            return Err(LedgerError::NotFound(format!(
                "transaction {} for tenant {tenant_id}",
                request.transaction_id
            )));
        }

        let next_line_no = inner
            .lines
            .iter()
            .filter(|line| line.transaction_id == request.transaction_id)
            .map(|line| line.line_no)
            .max()
            .map_or(1, |n| n + 1);

        inner.waiver_seq += 1;
        let now = Utc::now();
        let line = TransactionLine {
            id: format!("waiver-{}", inner.waiver_seq),
            transaction_id: request.transaction_id.clone(),
            tenant_id: tenant_id.to_string(),
            line_no: next_line_no,
            kind: STEP_WAIVER.to_string(),
            payload: StepPayload::Waiver(WaiverGrant {
                policy: request.policy.clone(),
                reason: request.reason.clone(),
                approved_by: request.approved_by.clone(),
                waived_at: Some(now),
            }),
            confidence: None,
            created_at: now,
        };
        inner.lines.push(line);
        Ok(true)
    }
}
