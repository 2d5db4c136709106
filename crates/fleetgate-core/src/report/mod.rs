//! Dashboard composition layer.
//!
//! This is the control flow the surrounding dashboard calls: the ledger
//! client retrieves raw records, the KPI aggregator and guardrail evaluator
//! independently reduce them, and the promotion gate renders a go/no-go
//! verdict per configured channel. Everything below the fetches is pure.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::guardrail::{evaluate_guardrails, overall_severity, GuardrailResult, OverallSeverity};
use crate::kpi::{calculate_module_kpis, KpiSet};
use crate::ledger::{LedgerClient, LedgerError, LedgerStore, TransactionFilter, WaiverRequest};
use crate::promotion::{can_promote_to_channel, PromotionDecision};

/// Schema identifier for the module compliance report.
pub const MODULE_REPORT_SCHEMA: &str = "fleetgate.module_report.v1";

/// Errors from building a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// Ledger access failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The engine configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Compliance report for one module: KPIs, findings, and per-channel
/// promotion verdicts.
///
/// Computed fresh on every evaluation; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleComplianceReport {
    /// Schema identifier.
    pub schema: String,
    /// Tenant the report concerns.
    pub tenant_id: String,
    /// Module/version identifier the report concerns.
    pub module_ref: String,
    /// Fleet-health metrics.
    pub kpis: KpiSet,
    /// Guardrail findings, waivers applied.
    pub findings: Vec<GuardrailResult>,
    /// Highest severity across the findings.
    pub overall: OverallSeverity,
    /// Promotion verdict per configured channel, keyed by channel name
    /// (`BTreeMap` for deterministic ordering).
    pub promotions: BTreeMap<String, PromotionDecision>,
    /// Evaluation time the report was computed against.
    pub evaluated_at: DateTime<Utc>,
}

/// Builds the compliance report for one module.
///
/// Fetches the module's transactions inside the configured lookback window,
/// batch-fetches their lines, fetches the tenant's fiscal periods, then runs
/// the pure reducers and gates every configured channel. `now` is the
/// evaluation time; it bounds both the fetch window and audit readiness.
///
/// # Errors
///
/// Returns [`ReportError::Ledger`] for store failures or empty identifiers
/// and [`ReportError::Config`] for an unusable configuration.
pub fn evaluate_module<S: LedgerStore>(
    client: &LedgerClient<S>,
    config: &EngineConfig,
    tenant_id: &str,
    module_ref: &str,
    now: DateTime<Utc>,
) -> Result<ModuleComplianceReport, ReportError> {
    if module_ref.trim().is_empty() {
        return Err(LedgerError::InvalidInput("module ref must not be empty".to_string()).into());
    }
    let channels = config.channels()?;

    let from = now - Duration::days(i64::from(config.fetch_window_days));
    let filter = TransactionFilter {
        kind: None,
        module_ref: Some(module_ref.to_string()),
    };
    let transactions = client.read_transactions(tenant_id, from, now, &filter)?;

    let transaction_ids: Vec<String> = transactions.iter().map(|txn| txn.id.clone()).collect();
    let lines = client.read_transaction_lines_batch(tenant_id, &transaction_ids)?;
    let periods = client.read_fiscal_periods(tenant_id)?;

    let kpis = calculate_module_kpis(&transactions, &lines, &periods, now);
    let findings = evaluate_guardrails(&lines);
    let overall = overall_severity(&findings);

    let promotions: BTreeMap<String, PromotionDecision> = channels
        .into_iter()
        .map(|channel| {
            (
                channel.to_string(),
                can_promote_to_channel(channel, &findings),
            )
        })
        .collect();

    debug!(
        tenant_id,
        module_ref,
        transactions = transactions.len(),
        lines = lines.len(),
        findings = findings.len(),
        overall = %overall,
        "evaluated module"
    );

    Ok(ModuleComplianceReport {
        schema: MODULE_REPORT_SCHEMA.to_string(),
        tenant_id: tenant_id.to_string(),
        module_ref: module_ref.to_string(),
        kpis,
        findings,
        overall,
        promotions,
        evaluated_at: now,
    })
}

/// Builds a compliance report for every module registered for the tenant.
///
/// Modules are evaluated independently; the output order follows the
/// store's module listing.
///
/// # Errors
///
/// Returns the first error encountered; already-built reports are dropped.
pub fn evaluate_tenant<S: LedgerStore>(
    client: &LedgerClient<S>,
    config: &EngineConfig,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ModuleComplianceReport>, ReportError> {
    let modules = client.read_modules(tenant_id)?;
    let mut reports = Vec::with_capacity(modules.len());
    for module in &modules {
        reports.push(evaluate_module(
            client,
            config,
            tenant_id,
            &module.module_ref,
            now,
        )?);
    }
    Ok(reports)
}

/// Submits a waiver through the client. The engine's only write path; the
/// waiver materializes as a new line and takes effect on the next
/// evaluation.
///
/// # Errors
///
/// Returns [`ReportError::Ledger`] for invalid input or store failures.
pub fn submit_waiver<S: LedgerStore>(
    client: &LedgerClient<S>,
    tenant_id: &str,
    request: &WaiverRequest,
) -> Result<bool, ReportError> {
    Ok(client.append_waiver(tenant_id, request)?)
}
