//! Guardrail evaluation: severity-classified findings with waiver
//! application.
//!
//! [`evaluate_guardrails`] walks a line slice in four phases, in order:
//! compliance/security statuses, coverage thresholds, vulnerability counts,
//! then waiver application. Waivers downgrade matching waivable findings to
//! [`Severity::Info`] and annotate their messages; they never remove a
//! finding, and they never touch a non-waivable finding, so a waived ledger
//! can only relax a promotion decision, never change which hard failures
//! block it.
//!
//! Severity ordering is an explicit ranked enumeration, never a string
//! comparison.

use serde::{Deserialize, Serialize};

use crate::model::{
    is_compliance_kind, is_coverage_gated_kind, is_security_kind, is_waiver_kind, StepStatus,
    TransactionLine,
};

// =============================================================================
// Constants
// =============================================================================

/// Coverage threshold applied when a test line declares none, 0-1 scale.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.8;

/// Coverage below this fraction of the threshold escalates the finding from
/// warn to error.
pub const COVERAGE_ERROR_RATIO: f64 = 0.8;

/// Coverage at or above this fraction of the threshold keeps the finding
/// waivable.
pub const COVERAGE_WAIVE_RATIO: f64 = 0.7;

/// Policy tag for coverage-threshold findings.
pub const POLICY_COVERAGE_THRESHOLD: &str = "COVERAGE_THRESHOLD";

/// Policy tag for critical-vulnerability findings.
pub const POLICY_SECURITY_CRITICAL: &str = "SECURITY_CRITICAL";

/// Policy tag for high-vulnerability findings.
pub const POLICY_SECURITY_HIGH: &str = "SECURITY_HIGH";

// =============================================================================
// Severity model
// =============================================================================

/// Severity of a guardrail finding.
///
/// # Ordering
///
/// Severities are ordered `Error > Warn > Info`. The `Ord` implementation
/// uses explicit rank mapping, not enum ordinal, so comparison remains
/// correct if variants are reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Hard failure; blocks promotion on every channel.
    Error,
    /// Soft failure; blocks promotion on channels that disallow warnings.
    Warn,
    /// Informational; never blocks. Waived findings land here.
    Info,
}

impl Severity {
    /// Numeric rank of this severity. Higher rank means more severe.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Error => 2,
            Self::Warn => 1,
            Self::Info => 0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Overall severity of a result set, including the empty case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSeverity {
    /// No findings at all.
    Ok,
    /// Highest finding is informational.
    Info,
    /// Highest finding is a warning.
    Warn,
    /// At least one error-severity finding.
    Error,
}

impl From<Severity> for OverallSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Error,
            Severity::Warn => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

impl std::fmt::Display for OverallSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One severity-classified guardrail finding.
///
/// Produced fresh on every evaluation; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailResult {
    /// Finding severity.
    pub severity: Severity,
    /// Human-readable message. Waiver application appends a
    /// `" (Waived: <reason>)"` suffix.
    pub message: String,
    /// Policy the finding concerns.
    pub policy: String,
    /// Whether a waiver may downgrade this finding.
    pub waivable: bool,
}

/// Returns the highest severity present, or [`OverallSeverity::Ok`] for an
/// empty result set.
#[must_use]
pub fn overall_severity(results: &[GuardrailResult]) -> OverallSeverity {
    results
        .iter()
        .map(|result| result.severity)
        .max()
        .map_or(OverallSeverity::Ok, OverallSeverity::from)
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluates guardrail findings over a line slice and applies waivers.
///
/// Pure function; safe for concurrent use. Findings are emitted in line
/// encounter order, phase by phase:
///
/// 1. Compliance and security statuses (failed/blocked per-violation errors,
///    warning statuses as single generic warnings).
/// 2. Coverage thresholds on unit and end-to-end test lines.
/// 3. Vulnerability counts on security lines.
/// 4. Waiver application (downgrade-and-annotate, never remove).
#[must_use]
pub fn evaluate_guardrails(lines: &[TransactionLine]) -> Vec<GuardrailResult> {
    let mut results = Vec::new();

    // Phase 1: compliance/security step statuses.
    for line in lines {
        if !(is_compliance_kind(&line.kind) || is_security_kind(&line.kind)) {
            continue;
        }
        match line.payload.status() {
            Some(StepStatus::Failed | StepStatus::Blocked) => {
                for violation in line.payload.violations() {
                    results.push(GuardrailResult {
                        severity: Severity::Error,
                        message: violation.message.clone(),
                        policy: violation
                            .policy
                            .clone()
                            .unwrap_or_else(|| line.kind.clone()),
                        waivable: violation.waivable.unwrap_or(true),
                    });
                }
            }
            Some(StepStatus::Warning) => {
                results.push(GuardrailResult {
                    severity: Severity::Warn,
                    message: format!("{} completed with warnings", line.kind),
                    policy: line.kind.clone(),
                    waivable: true,
                });
            }
            _ => {}
        }
    }

    // Phase 2: coverage thresholds on unit/e2e lines.
    for line in lines {
        if !is_coverage_gated_kind(&line.kind) {
            continue;
        }
        let threshold = line
            .payload
            .threshold()
            .unwrap_or(DEFAULT_COVERAGE_THRESHOLD);
        let coverage = line.payload.coverage().unwrap_or(0.0);
        if coverage >= threshold {
            continue;
        }
        let severity = if coverage < COVERAGE_ERROR_RATIO * threshold {
            Severity::Error
        } else {
            Severity::Warn
        };
        results.push(GuardrailResult {
            severity,
            message: format!(
                "{} coverage {:.1}% below threshold {:.1}%",
                line.kind,
                coverage * 100.0,
                threshold * 100.0
            ),
            policy: POLICY_COVERAGE_THRESHOLD.to_string(),
            waivable: coverage >= COVERAGE_WAIVE_RATIO * threshold,
        });
    }

    // Phase 3: vulnerability counts on security lines.
    for line in lines {
        if !is_security_kind(&line.kind) {
            continue;
        }
        let critical = line.payload.critical_vulns();
        let high = line.payload.high_vulns();
        if critical > 0 {
            results.push(GuardrailResult {
                severity: Severity::Error,
                message: format!("{critical} critical vulnerabilities detected"),
                policy: POLICY_SECURITY_CRITICAL.to_string(),
                waivable: false,
            });
        } else if high > 0 {
            results.push(GuardrailResult {
                severity: Severity::Warn,
                message: format!("{high} high-severity vulnerabilities detected"),
                policy: POLICY_SECURITY_HIGH.to_string(),
                waivable: true,
            });
        }
    }

    // Phase 4: waiver application. Only waivable findings are downgraded;
    // a non-waivable finding keeps its severity so the promotion outcome
    // cannot change.
    for line in lines {
        if !is_waiver_kind(&line.kind) {
            continue;
        }
        let Some(grant) = line.payload.as_waiver() else {
            continue;
        };
        for result in results
            .iter_mut()
            .filter(|result| result.waivable && result.policy == grant.policy)
        {
            result.severity = Severity::Info;
            result.message.push_str(&format!(" (Waived: {})", grant.reason));
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::model::{
        ComplianceResult, SecurityScan, StepPayload, TestResult, Violation, WaiverGrant,
        STEP_SECURITY, STEP_UNIT, STEP_WAIVER,
    };
    use crate::promotion::{can_promote_to_channel, ReleaseChannel};

    fn line(kind: &str, payload: StepPayload) -> TransactionLine {
        TransactionLine {
            id: "l1".to_string(),
            transaction_id: "txn-1".to_string(),
            tenant_id: "acme".to_string(),
            line_no: 1,
            kind: kind.to_string(),
            payload,
            confidence: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
        }
    }

    fn compliance_line(status: StepStatus, violations: Vec<Violation>) -> TransactionLine {
        line(
            "step.compliance.license",
            StepPayload::Compliance(ComplianceResult {
                status: Some(status),
                violations,
            }),
        )
    }

    fn coverage_line(coverage: f64, threshold: Option<f64>) -> TransactionLine {
        line(
            STEP_UNIT,
            StepPayload::Test(TestResult {
                status: Some(StepStatus::Passed),
                coverage: Some(coverage),
                threshold,
                artifacts: vec![],
            }),
        )
    }

    fn security_line(critical: u64, high: u64) -> TransactionLine {
        line(
            STEP_SECURITY,
            StepPayload::Security(SecurityScan {
                status: Some(StepStatus::Passed),
                critical_vulns: critical,
                high_vulns: high,
                violations: vec![],
                artifacts: vec![],
            }),
        )
    }

    fn waiver_line(policy: &str, reason: &str) -> TransactionLine {
        line(
            STEP_WAIVER,
            StepPayload::Waiver(WaiverGrant {
                policy: policy.to_string(),
                reason: reason.to_string(),
                approved_by: None,
                waived_at: None,
            }),
        )
    }

    // =========================================================================
    // Severity ordering
    // =========================================================================

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
        assert_eq!(Severity::Error.rank(), 2);
        assert_eq!(Severity::Warn.rank(), 1);
        assert_eq!(Severity::Info.rank(), 0);
    }

    #[test]
    fn test_overall_severity() {
        assert_eq!(overall_severity(&[]), OverallSeverity::Ok);

        let results = vec![
            GuardrailResult {
                severity: Severity::Info,
                message: "a".to_string(),
                policy: "P".to_string(),
                waivable: true,
            },
            GuardrailResult {
                severity: Severity::Warn,
                message: "b".to_string(),
                policy: "P".to_string(),
                waivable: true,
            },
        ];
        assert_eq!(overall_severity(&results), OverallSeverity::Warn);
    }

    // =========================================================================
    // Phase 1: compliance/security statuses
    // =========================================================================

    #[test]
    fn failed_compliance_emits_one_error_per_violation() {
        let lines = vec![compliance_line(
            StepStatus::Failed,
            vec![
                Violation {
                    message: "GPL dependency shipped".to_string(),
                    policy: None,
                    waivable: None,
                },
                Violation {
                    message: "missing license header".to_string(),
                    policy: Some("LICENSE_HEADER".to_string()),
                    waivable: Some(false),
                },
            ],
        )];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(results[0].policy, "step.compliance.license");
        assert!(results[0].waivable);

        assert_eq!(results[1].policy, "LICENSE_HEADER");
        assert!(!results[1].waivable);
    }

    #[test]
    fn blocked_status_treated_like_failed() {
        let lines = vec![compliance_line(
            StepStatus::Blocked,
            vec![Violation {
                message: "policy check halted".to_string(),
                policy: None,
                waivable: None,
            }],
        )];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
    }

    #[test]
    fn warning_status_emits_single_generic_warn() {
        let lines = vec![compliance_line(StepStatus::Warning, vec![])];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warn);
        assert!(results[0].waivable);
        assert_eq!(results[0].policy, "step.compliance.license");
    }

    #[test]
    fn passed_compliance_emits_nothing() {
        let lines = vec![compliance_line(StepStatus::Passed, vec![])];
        assert!(evaluate_guardrails(&lines).is_empty());
    }

    #[test]
    fn non_guardrail_kinds_skip_phase_one() {
        let lines = vec![line(
            "step.package",
            StepPayload::Compliance(ComplianceResult {
                status: Some(StepStatus::Failed),
                violations: vec![Violation {
                    message: "should not surface".to_string(),
                    policy: None,
                    waivable: None,
                }],
            }),
        )];
        assert!(evaluate_guardrails(&lines).is_empty());
    }

    // =========================================================================
    // Phase 2: coverage thresholds
    // =========================================================================

    #[test]
    fn coverage_at_threshold_emits_nothing() {
        let results = evaluate_guardrails(&[coverage_line(0.8, None)]);
        assert!(results.is_empty());
    }

    #[test]
    fn coverage_just_below_threshold_is_waivable_warn() {
        // 0.7 < 0.8 but 0.7 >= 0.8 * 0.8 = 0.64, so warn; 0.7 >= 0.56, waivable.
        let results = evaluate_guardrails(&[coverage_line(0.7, None)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warn);
        assert!(results[0].waivable);
        assert_eq!(results[0].policy, POLICY_COVERAGE_THRESHOLD);
    }

    #[test]
    fn coverage_far_below_threshold_is_error() {
        // 0.6 < 0.64 => error; 0.6 >= 0.56 => still waivable.
        let results = evaluate_guardrails(&[coverage_line(0.6, None)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert!(results[0].waivable);
    }

    #[test]
    fn collapsed_coverage_is_non_waivable_error() {
        // 0.3 < 0.56 => not waivable.
        let results = evaluate_guardrails(&[coverage_line(0.3, None)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert!(!results[0].waivable);
    }

    #[test]
    fn declared_threshold_overrides_default() {
        // Threshold 0.5: coverage 0.45 >= 0.4 => warn, waivable (>= 0.35).
        let results = evaluate_guardrails(&[coverage_line(0.45, Some(0.5))]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warn);
        assert!(results[0].waivable);
    }

    #[test]
    fn missing_coverage_counts_as_zero() {
        let lines = vec![line(
            STEP_UNIT,
            StepPayload::Test(TestResult {
                status: Some(StepStatus::Passed),
                coverage: None,
                threshold: None,
                artifacts: vec![],
            }),
        )];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert!(!results[0].waivable);
    }

    #[test]
    fn integration_coverage_is_not_gated() {
        let lines = vec![line(
            "step.integration",
            StepPayload::Test(TestResult {
                status: Some(StepStatus::Passed),
                coverage: Some(0.1),
                threshold: None,
                artifacts: vec![],
            }),
        )];
        assert!(evaluate_guardrails(&lines).is_empty());
    }

    // =========================================================================
    // Phase 3: vulnerability counts
    // =========================================================================

    #[test]
    fn critical_vulns_emit_non_waivable_error() {
        let results = evaluate_guardrails(&[security_line(3, 5)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(results[0].policy, POLICY_SECURITY_CRITICAL);
        assert!(!results[0].waivable);
    }

    #[test]
    fn high_vulns_without_critical_emit_waivable_warn() {
        let results = evaluate_guardrails(&[security_line(0, 2)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warn);
        assert_eq!(results[0].policy, POLICY_SECURITY_HIGH);
        assert!(results[0].waivable);
    }

    #[test]
    fn clean_scan_emits_nothing() {
        assert!(evaluate_guardrails(&[security_line(0, 0)]).is_empty());
    }

    // =========================================================================
    // Phase 4: waivers
    // =========================================================================

    #[test]
    fn waiver_downgrades_matching_finding() {
        let lines = vec![
            coverage_line(0.6, None),
            waiver_line(POLICY_COVERAGE_THRESHOLD, "legacy module, REL-441"),
        ];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Info);
        assert!(results[0].message.ends_with("(Waived: legacy module, REL-441)"));
    }

    #[test]
    fn waiver_never_removes_findings() {
        let lines = vec![
            coverage_line(0.6, None),
            waiver_line(POLICY_COVERAGE_THRESHOLD, "tracked"),
        ];
        assert_eq!(evaluate_guardrails(&lines).len(), 1);
    }

    #[test]
    fn waiver_does_not_touch_non_waivable_finding() {
        let lines = vec![
            security_line(1, 0),
            waiver_line(POLICY_SECURITY_CRITICAL, "accepted risk"),
        ];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert!(!results[0].message.contains("Waived"));
    }

    #[test]
    fn waiver_for_unmatched_policy_is_noop() {
        let lines = vec![
            coverage_line(0.6, None),
            waiver_line("SOME_OTHER_POLICY", "irrelevant"),
        ];
        let results = evaluate_guardrails(&lines);
        assert_eq!(results[0].severity, Severity::Error);
    }

    #[test]
    fn waived_error_no_longer_blocks_stable() {
        let unwaived = evaluate_guardrails(&[coverage_line(0.6, None)]);
        assert!(!can_promote_to_channel(ReleaseChannel::Stable, &unwaived).allowed);

        let waived = evaluate_guardrails(&[
            coverage_line(0.6, None),
            waiver_line(POLICY_COVERAGE_THRESHOLD, "tracked in REL-441"),
        ]);
        assert!(can_promote_to_channel(ReleaseChannel::Stable, &waived).allowed);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn arb_finding_line() -> impl Strategy<Value = TransactionLine> {
        prop_oneof![
            (0u64..4, 0u64..4).prop_map(|(c, h)| security_line(c, h)),
            (0.0f64..=1.0).prop_map(|cov| coverage_line(cov, None)),
            Just(compliance_line(
                StepStatus::Failed,
                vec![Violation {
                    message: "violation".to_string(),
                    policy: None,
                    waivable: None,
                }],
            )),
            Just(compliance_line(StepStatus::Warning, vec![])),
        ]
    }

    fn arb_waiver() -> impl Strategy<Value = TransactionLine> {
        prop_oneof![
            Just(POLICY_COVERAGE_THRESHOLD),
            Just(POLICY_SECURITY_CRITICAL),
            Just(POLICY_SECURITY_HIGH),
            Just("step.compliance.license"),
        ]
        .prop_map(|policy| waiver_line(policy, "bulk waiver"))
    }

    proptest! {
        // Adding waiver lines may only relax a promotion decision.
        #[test]
        fn waivers_never_flip_allowed_to_denied(
            findings in prop::collection::vec(arb_finding_line(), 0..8),
            waivers in prop::collection::vec(arb_waiver(), 0..4),
        ) {
            for channel in [ReleaseChannel::Beta, ReleaseChannel::Stable, ReleaseChannel::Lts] {
                let before = can_promote_to_channel(channel, &evaluate_guardrails(&findings));
                let mut with_waivers = findings.clone();
                with_waivers.extend(waivers.clone());
                let after = can_promote_to_channel(channel, &evaluate_guardrails(&with_waivers));
                prop_assert!(!(before.allowed && !after.allowed));
            }
        }

        // Waivers only ever lower severity, never raise it.
        #[test]
        fn waivers_are_monotone_on_severity(
            findings in prop::collection::vec(arb_finding_line(), 0..8),
            waivers in prop::collection::vec(arb_waiver(), 0..4),
        ) {
            let before = evaluate_guardrails(&findings);
            let mut with_waivers = findings.clone();
            with_waivers.extend(waivers);
            let after = evaluate_guardrails(&with_waivers);
            prop_assert_eq!(before.len(), after.len());
            for (b, a) in before.iter().zip(after.iter()) {
                prop_assert!(a.severity <= b.severity);
            }
        }
    }
}
