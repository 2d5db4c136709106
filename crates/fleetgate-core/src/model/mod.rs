//! Ledger record types for the release pipeline compliance engine.
//!
//! Every record is scoped to a tenant; no computation in this crate crosses
//! tenant boundaries. Transactions and transaction lines form an append-only
//! ledger: the pipeline runner creates them, this engine only reads them
//! (waiver lines are the single exception, appended through
//! [`crate::ledger::LedgerStore::append_waiver`]).
//!
//! Step-result payloads are a tagged union ([`StepPayload`]) rather than a
//! free-form map. Accessors on the union implement the "missing field means
//! default, not error" contract the reducers rely on: a payload that does not
//! carry a field yields that field's documented default instead of failing.

mod payload;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use payload::{
    ArtifactKind, ArtifactRef, AttestationResult, ComplianceResult, GenericResult, SecurityScan,
    StepPayload, TestResult, Violation, WaiverGrant,
};

// =============================================================================
// Namespaced kinds
// =============================================================================

/// Transaction kind recorded when a pipeline run enters planning.
pub const KIND_PIPELINE_PLAN: &str = "pipeline.plan";

/// Transaction kind recorded when a pipeline run reaches release.
pub const KIND_PIPELINE_RELEASE: &str = "pipeline.release";

/// Unit-test step kind.
pub const STEP_UNIT: &str = "step.unit";

/// End-to-end test step kind.
pub const STEP_E2E: &str = "step.e2e";

/// Integration-test step kind.
pub const STEP_INTEGRATION: &str = "step.integration";

/// Security-scan step kind.
pub const STEP_SECURITY: &str = "step.security";

/// Contract-check step kind.
pub const STEP_CONTRACT: &str = "step.contract";

/// Audit-attestation step kind.
pub const STEP_ATTESTATION: &str = "step.attestation";

/// Prefix shared by all compliance step kinds; the suffix names the policy
/// (for example `step.compliance.license`).
pub const STEP_COMPLIANCE_PREFIX: &str = "step.compliance.";

/// Sentinel kind for waiver lines.
pub const STEP_WAIVER: &str = "waiver";

/// Returns true for test step kinds (unit, end-to-end, integration).
#[must_use]
pub fn is_test_kind(kind: &str) -> bool {
    matches!(kind, STEP_UNIT | STEP_E2E | STEP_INTEGRATION)
}

/// Returns true for the step kinds whose coverage is gated against a
/// threshold (unit and end-to-end only; integration coverage is reported
/// but not gated).
#[must_use]
pub fn is_coverage_gated_kind(kind: &str) -> bool {
    matches!(kind, STEP_UNIT | STEP_E2E)
}

/// Returns true for compliance step kinds (`step.compliance.<policy>`).
#[must_use]
pub fn is_compliance_kind(kind: &str) -> bool {
    kind.starts_with(STEP_COMPLIANCE_PREFIX)
}

/// Returns true for the security-scan step kind.
#[must_use]
pub fn is_security_kind(kind: &str) -> bool {
    kind == STEP_SECURITY
}

/// Returns true for the contract-check step kind.
#[must_use]
pub fn is_contract_kind(kind: &str) -> bool {
    kind == STEP_CONTRACT
}

/// Returns true for the attestation step kind.
#[must_use]
pub fn is_attestation_kind(kind: &str) -> bool {
    kind == STEP_ATTESTATION
}

/// Returns true for the waiver sentinel kind.
#[must_use]
pub fn is_waiver_kind(kind: &str) -> bool {
    kind == STEP_WAIVER
}

/// Returns true for the kinds that count toward the guardrail pass rate:
/// compliance, security, and contract checks.
#[must_use]
pub fn is_guardrail_kind(kind: &str) -> bool {
    is_compliance_kind(kind) || is_security_kind(kind) || is_contract_kind(kind)
}

// =============================================================================
// Status enums
// =============================================================================

/// Run status of a pipeline transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Recorded but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Passed,
    /// Completed with failures.
    Failed,
    /// Halted by a gate or an operator.
    Blocked,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

/// Outcome status of a single step, as recorded in its payload.
///
/// Reducers treat an absent status as "no signal": a line without a status
/// neither passes nor fails anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Recorded but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Passed,
    /// Completed with failures.
    Failed,
    /// Halted by a gate or an operator.
    Blocked,
    /// Completed with non-fatal findings.
    Warning,
    /// Failure acknowledged and waived.
    Waived,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Warning => "warning",
            Self::Waived => "waived",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Ledger records
// =============================================================================

/// One pipeline run for one module.
///
/// Created once by the external pipeline runner per stage transition,
/// immutable thereafter, never deleted by this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Record identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Namespaced transaction kind, e.g. [`KIND_PIPELINE_PLAN`].
    pub kind: String,
    /// Namespaced module/version identifier the run concerns.
    pub module_ref: String,
    /// When the run occurred.
    pub occurred_at: DateTime<Utc>,
    /// Run outcome.
    pub status: RunStatus,
    /// Optional confidence score attached by the recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One step outcome within a transaction.
///
/// Immutable and append-only; a waiver is itself a new line, never an edit
/// of an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    /// Record identifier.
    pub id: String,
    /// Owning transaction.
    pub transaction_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Ordinal position within the transaction.
    pub line_no: u32,
    /// Namespaced step kind, e.g. [`STEP_UNIT`] or the [`STEP_WAIVER`]
    /// sentinel.
    pub kind: String,
    /// Typed step-result payload.
    pub payload: StepPayload,
    /// Optional confidence score attached by the recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// When the line was appended.
    pub created_at: DateTime<Utc>,
}

/// A releasable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntity {
    /// Record identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Namespaced module/version identifier.
    pub module_ref: String,
    /// Release channels the module currently occupies.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Latest released version, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Industry/vertical tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

/// Typed relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// `from` depends on `to`.
    DependsOn,
    /// `from` is governed by the policy entity `to`.
    GovernedBy,
    /// `from` is packaged together with `to`.
    PackagedWith,
    /// `from` is validated by the check entity `to`.
    ValidatedBy,
}

/// A directed edge between two entities.
///
/// Fetched for dependency-aware callers; the KPI and guardrail reducers do
/// not consume relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    /// Record identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Source entity identifier.
    pub from_entity: String,
    /// Target entity identifier.
    pub to_entity: String,
    /// Relation type.
    pub relation: RelationKind,
}

/// Status of a tenant accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiscalPeriodStatus {
    /// Open for postings.
    Open,
    /// The currently active period.
    Current,
    /// Closed to postings.
    Closed,
}

/// Tenant accounting-period record, consumed only as a boolean alignment
/// signal by [`crate::kpi::fiscal_aligned`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPeriod {
    /// Record identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Period status.
    pub status: FiscalPeriodStatus,
    /// First day of the period.
    pub starts_on: DateTime<Utc>,
    /// Last day of the period.
    pub ends_on: DateTime<Utc>,
}
