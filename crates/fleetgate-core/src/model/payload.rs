//! Typed step-result payloads.
//!
//! The upstream store records step results as loosely-typed maps; this
//! engine models them as a tagged union with one variant per step family.
//! Every accessor returns a documented default when the payload does not
//! carry the requested field, so one malformed line never aborts an
//! aggregate computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StepStatus;

/// Classification of a referenced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Software bill of materials.
    Sbom,
    /// Coverage report.
    CoverageReport,
    /// Security scan report.
    ScanReport,
    /// Build provenance record.
    Provenance,
    /// Anything else.
    Other,
}

/// Reference to an artifact produced by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact classification.
    pub kind: ArtifactKind,
    /// Location of the artifact.
    pub uri: String,
}

/// One policy violation reported by a compliance or security step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Human-readable description.
    pub message: String,
    /// Policy the violation concerns. Defaults to the owning line's step
    /// kind when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Whether the violation may be waived. Defaults to true when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waivable: Option<bool>,
}

/// Result of a test step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Step outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// Coverage ratio on a 0-1 scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Coverage threshold the step was configured with, 0-1 scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Artifacts produced by the step.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Result of a security scan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScan {
    /// Step outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// Count of critical-severity vulnerabilities.
    #[serde(default)]
    pub critical_vulns: u64,
    /// Count of high-severity vulnerabilities.
    #[serde(default)]
    pub high_vulns: u64,
    /// Individual violations reported by the scanner.
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Artifacts produced by the scan.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Result of a compliance policy check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// Step outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// Individual violations reported by the check.
    #[serde(default)]
    pub violations: Vec<Violation>,
}

/// An approved waiver, recorded as its own append-only line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaiverGrant {
    /// Policy name the waiver targets.
    pub policy: String,
    /// Reason the waiver was granted.
    pub reason: String,
    /// Who approved the waiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// When the waiver was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waived_at: Option<DateTime<Utc>>,
}

/// Result of an audit attestation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationResult {
    /// Step outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// Identity of the attestor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestor: Option<String>,
    /// Artifacts backing the attestation.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Catch-all payload for step kinds without a dedicated shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResult {
    /// Step outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// Artifacts produced by the step.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Tagged step-result payload, one variant per step family.
///
/// The variant is chosen by the recorder; a mismatch between a line's step
/// kind and its payload variant degrades to the accessor defaults rather
/// than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    /// Test step result.
    Test(TestResult),
    /// Security scan result.
    Security(SecurityScan),
    /// Compliance check result.
    Compliance(ComplianceResult),
    /// Waiver record.
    Waiver(WaiverGrant),
    /// Audit attestation result.
    Attestation(AttestationResult),
    /// Unclassified step result.
    Generic(GenericResult),
}

impl StepPayload {
    /// Step outcome, if the payload carries one. `None` means "no signal".
    #[must_use]
    pub fn status(&self) -> Option<StepStatus> {
        match self {
            Self::Test(p) => p.status,
            Self::Security(p) => p.status,
            Self::Compliance(p) => p.status,
            Self::Waiver(_) => Some(StepStatus::Waived),
            Self::Attestation(p) => p.status,
            Self::Generic(p) => p.status,
        }
    }

    /// Coverage ratio, 0-1 scale. Only test payloads carry coverage.
    #[must_use]
    pub fn coverage(&self) -> Option<f64> {
        match self {
            Self::Test(p) => p.coverage,
            _ => None,
        }
    }

    /// Declared coverage threshold, 0-1 scale.
    #[must_use]
    pub fn threshold(&self) -> Option<f64> {
        match self {
            Self::Test(p) => p.threshold,
            _ => None,
        }
    }

    /// Reported violations. Empty for payload families that carry none.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Security(p) => &p.violations,
            Self::Compliance(p) => &p.violations,
            _ => &[],
        }
    }

    /// Critical vulnerability count. Zero unless a scan reported one.
    #[must_use]
    pub fn critical_vulns(&self) -> u64 {
        match self {
            Self::Security(p) => p.critical_vulns,
            _ => 0,
        }
    }

    /// High vulnerability count. Zero unless a scan reported one.
    #[must_use]
    pub fn high_vulns(&self) -> u64 {
        match self {
            Self::Security(p) => p.high_vulns,
            _ => 0,
        }
    }

    /// Artifacts referenced by the payload.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRef] {
        match self {
            Self::Test(p) => &p.artifacts,
            Self::Security(p) => &p.artifacts,
            Self::Attestation(p) => &p.artifacts,
            Self::Generic(p) => &p.artifacts,
            Self::Compliance(_) | Self::Waiver(_) => &[],
        }
    }

    /// True when the payload references a software bill of materials.
    #[must_use]
    pub fn declares_sbom(&self) -> bool {
        self.artifacts()
            .iter()
            .any(|a| a.kind == ArtifactKind::Sbom)
    }

    /// The waiver record, when this payload is one.
    #[must_use]
    pub fn as_waiver(&self) -> Option<&WaiverGrant> {
        match self {
            Self::Waiver(grant) => Some(grant),
            _ => None,
        }
    }
}
