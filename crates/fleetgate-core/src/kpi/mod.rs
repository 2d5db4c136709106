//! Fleet-health KPI aggregation.
//!
//! Pure reducers over transaction and line slices. All computation happens
//! on the caller's input; nothing here performs I/O or reads the system
//! clock (evaluation time is passed explicitly), so every function is safe
//! to invoke concurrently for different tenants.
//!
//! Every reducer is total over its documented input shape: empty inputs
//! yield the documented defaults and malformed payload fields degrade to
//! zero rather than erroring or panicking.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    is_attestation_kind, is_guardrail_kind, is_test_kind, FiscalPeriod, FiscalPeriodStatus,
    StepStatus, Transaction, TransactionLine, KIND_PIPELINE_PLAN, KIND_PIPELINE_RELEASE,
};

/// Schema identifier for the KPI set.
pub const KPI_SET_SCHEMA: &str = "fleetgate.kpi_set.v1";

/// Lookback window for audit readiness, in days.
pub const AUDIT_WINDOW_DAYS: i64 = 30;

/// Computed fleet-health metric bundle for one module or one tenant slice.
///
/// Produced fresh on every evaluation; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KpiSet {
    /// Schema identifier.
    pub schema: String,
    /// Mean plan-to-release lead time in days, one decimal place.
    pub lead_time_days: f64,
    /// Mean test coverage as a percentage, one decimal place.
    pub coverage_avg: f64,
    /// Guardrail pass rate as a percentage, one decimal place.
    pub guardrail_pass_rate: f64,
    /// Whether SBOM and attestation evidence exist inside the audit window.
    pub audit_ready: bool,
    /// Whether the tenant has an open or current fiscal period.
    pub fiscal_aligned: bool,
}

/// Rounds to one decimal place, half away from zero.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Mean plan-to-release lead time in days across module groups.
///
/// Transactions are grouped by `module_ref`. Each group contributes the
/// day-granularity difference between its earliest plan transaction and its
/// earliest release transaction; groups missing either side are excluded.
/// Returns the mean over contributing groups rounded to one decimal place,
/// or `0.0` when no group has both sides.
#[must_use]
pub fn lead_time_days(transactions: &[Transaction]) -> f64 {
    #[derive(Default)]
    struct Group {
        plan: Option<DateTime<Utc>>,
        release: Option<DateTime<Utc>>,
    }

    fn keep_earliest(slot: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) {
        if slot.map_or(true, |existing| at < existing) {
            *slot = Some(at);
        }
    }

    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();
    for txn in transactions {
        let group = groups.entry(txn.module_ref.as_str()).or_default();
        match txn.kind.as_str() {
            KIND_PIPELINE_PLAN => keep_earliest(&mut group.plan, txn.occurred_at),
            KIND_PIPELINE_RELEASE => keep_earliest(&mut group.release, txn.occurred_at),
            _ => {}
        }
    }

    let spans: Vec<i64> = groups
        .values()
        .filter_map(|group| {
            let plan = group.plan?;
            let release = group.release?;
            Some((release.date_naive() - plan.date_naive()).num_days())
        })
        .collect();

    if spans.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = spans.iter().sum::<i64>() as f64 / spans.len() as f64;
    round1(mean)
}

/// Mean coverage across test lines, as a percentage.
///
/// Only lines with a test step kind contribute; a missing coverage ratio
/// counts as `0.0`. Returns `0.0` when no test lines exist. A coverage-shaped
/// field on a non-test line never contributes.
#[must_use]
pub fn coverage_avg(lines: &[TransactionLine]) -> f64 {
    let ratios: Vec<f64> = lines
        .iter()
        .filter(|line| is_test_kind(&line.kind))
        .map(|line| line.payload.coverage().unwrap_or(0.0))
        .collect();

    if ratios.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    round1(mean * 100.0)
}

/// Pass rate over guardrail lines (compliance, security, contract), as a
/// percentage.
///
/// A line passes iff its payload status is exactly `passed` or `waived`.
/// Returns `100.0` when no guardrail lines exist: absence of a check is not
/// treated as failure.
#[must_use]
pub fn guardrail_pass_rate(lines: &[TransactionLine]) -> f64 {
    let mut total: u64 = 0;
    let mut passed: u64 = 0;
    for line in lines {
        if !is_guardrail_kind(&line.kind) {
            continue;
        }
        total += 1;
        if matches!(
            line.payload.status(),
            Some(StepStatus::Passed | StepStatus::Waived)
        ) {
            passed += 1;
        }
    }

    if total == 0 {
        return 100.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let rate = passed as f64 / total as f64 * 100.0;
    round1(rate)
}

/// Whether audit evidence is current.
///
/// True only if, within the [`AUDIT_WINDOW_DAYS`] preceding `now`, there is
/// at least one line declaring an SBOM artifact and at least one line of the
/// attestation kind. Both conditions must be met by lines created inside the
/// window independently; an SBOM older than the window yields false even if
/// a fresh attestation exists.
#[must_use]
pub fn audit_ready(lines: &[TransactionLine], now: DateTime<Utc>) -> bool {
    let cutoff = now - Duration::days(AUDIT_WINDOW_DAYS);
    let in_window = |line: &&TransactionLine| line.created_at >= cutoff && line.created_at <= now;

    let has_sbom = lines
        .iter()
        .filter(in_window)
        .any(|line| line.payload.declares_sbom());
    let has_attestation = lines
        .iter()
        .filter(in_window)
        .any(|line| is_attestation_kind(&line.kind));

    has_sbom && has_attestation
}

/// Whether the tenant's fiscal calendar permits release activity.
///
/// True when no periods are configured (no fiscal constraint) or when at
/// least one period is open or current; false only when periods exist and
/// every one of them is closed.
#[must_use]
pub fn fiscal_aligned(periods: &[FiscalPeriod]) -> bool {
    periods.is_empty()
        || periods.iter().any(|period| {
            matches!(
                period.status,
                FiscalPeriodStatus::Open | FiscalPeriodStatus::Current
            )
        })
}

/// Composes the five KPI reducers into one [`KpiSet`]. No additional logic.
#[must_use]
pub fn calculate_module_kpis(
    transactions: &[Transaction],
    lines: &[TransactionLine],
    periods: &[FiscalPeriod],
    now: DateTime<Utc>,
) -> KpiSet {
    KpiSet {
        schema: KPI_SET_SCHEMA.to_string(),
        lead_time_days: lead_time_days(transactions),
        coverage_avg: coverage_avg(lines),
        guardrail_pass_rate: guardrail_pass_rate(lines),
        audit_ready: audit_ready(lines, now),
        fiscal_aligned: fiscal_aligned(periods),
    }
}
