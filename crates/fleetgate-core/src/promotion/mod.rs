//! Channel promotion gate.
//!
//! Decides whether a module may be promoted into a named release channel
//! given the current guardrail findings. The per-channel policy table is
//! fixed: beta tolerates warnings, stable and LTS do not, and errors block
//! everywhere. Waived findings sit at info severity and never block.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guardrail::{GuardrailResult, Severity};

/// A release track with its own promotion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    /// Early-access track; warnings are tolerated.
    Beta,
    /// Production track; warnings block.
    Stable,
    /// Long-term-support track; warnings block.
    Lts,
}

/// Errors from parsing a release channel name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ChannelParseError {
    /// The name does not match any known channel.
    #[error("unknown release channel: {0:?}, expected beta, stable, or lts")]
    Unknown(String),
}

impl ReleaseChannel {
    /// Parses a channel from its name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelParseError::Unknown`] for unrecognized names.
    pub fn parse(s: &str) -> Result<Self, ChannelParseError> {
        match s.to_ascii_lowercase().as_str() {
            "beta" => Ok(Self::Beta),
            "stable" => Ok(Self::Stable),
            "lts" => Ok(Self::Lts),
            _ => Err(ChannelParseError::Unknown(s.to_string())),
        }
    }

    /// The fixed promotion policy for this channel.
    #[must_use]
    pub const fn policy(self) -> ChannelPolicy {
        match self {
            Self::Beta => ChannelPolicy {
                allow_warnings: true,
                requires_audit_attestation: false,
            },
            Self::Stable => ChannelPolicy {
                allow_warnings: false,
                requires_audit_attestation: false,
            },
            Self::Lts => ChannelPolicy {
                allow_warnings: false,
                requires_audit_attestation: true,
            },
        }
    }

    /// All channels, most permissive first.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Beta, Self::Stable, Self::Lts].into_iter()
    }
}

impl std::fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Beta => "beta",
            Self::Stable => "stable",
            Self::Lts => "lts",
        };
        write!(f, "{s}")
    }
}

/// Per-channel promotion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelPolicy {
    /// Whether warn-severity findings are tolerated.
    pub allow_warnings: bool,
    /// Declared for LTS, but [`can_promote_to_channel`] does not consult it:
    /// audit-attestation enforcement is left to the caller. Callers that
    /// want a hard requirement should check
    /// [`crate::kpi::KpiSet::audit_ready`] themselves.
    pub requires_audit_attestation: bool,
}

/// Verdict of a promotion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionDecision {
    /// Whether promotion is allowed.
    pub allowed: bool,
    /// Messages of the blocking findings, in encounter order. Empty when
    /// allowed.
    pub blockers: Vec<String>,
}

/// Decides whether a module may be promoted into `channel`.
///
/// Every error-severity finding blocks on every channel; warn-severity
/// findings block only where the channel policy disallows warnings;
/// info-severity findings (including waived ones) never block.
#[must_use]
pub fn can_promote_to_channel(
    channel: ReleaseChannel,
    results: &[GuardrailResult],
) -> PromotionDecision {
    let policy = channel.policy();
    let mut blockers = Vec::new();

    for result in results {
        match result.severity {
            Severity::Error => blockers.push(result.message.clone()),
            Severity::Warn if !policy.allow_warnings => blockers.push(result.message.clone()),
            Severity::Warn | Severity::Info => {}
        }
    }

    PromotionDecision {
        allowed: blockers.is_empty(),
        blockers,
    }
}
