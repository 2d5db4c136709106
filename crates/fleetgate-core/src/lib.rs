//! Release pipeline compliance engine.
//!
//! `fleetgate-core` consumes an append-only ledger of pipeline-run
//! transactions and per-step result lines, computes fleet-wide delivery
//! KPIs, evaluates compliance/security/test guardrails with waiver
//! semantics, and decides whether a software module may be promoted into a
//! release channel.
//!
//! # Architecture
//!
//! ```text
//! LedgerStore (external) --> LedgerClient --> raw records
//!                                               |
//!                      +------------------------+----------------------+
//!                      v                                               v
//!               KPI aggregator                               guardrail evaluator
//!                      |                                               |
//!                      v                                               v
//!                   KpiSet                    findings --> channel promotion gate
//! ```
//!
//! Every reducer is pure and total: no I/O, no hidden state, defined
//! defaults for empty inputs, and malformed payload fields degrade to
//! defaults instead of erroring. Only the ledger client performs I/O, and
//! the only write it ever issues is a waiver append.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use fleetgate_core::config::EngineConfig;
//! use fleetgate_core::ledger::{LedgerClient, MemoryLedgerStore};
//! use fleetgate_core::report::evaluate_module;
//!
//! # fn main() -> Result<(), fleetgate_core::report::ReportError> {
//! let client = LedgerClient::new(MemoryLedgerStore::new());
//! let config = EngineConfig::default();
//! let report = evaluate_module(&client, &config, "acme", "module.checkout/1.4.0", Utc::now())?;
//! assert!(report.promotions["beta"].allowed);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod guardrail;
pub mod kpi;
pub mod ledger;
pub mod model;
pub mod promotion;
pub mod report;

pub use config::EngineConfig;
pub use guardrail::{evaluate_guardrails, overall_severity, GuardrailResult, Severity};
pub use kpi::{calculate_module_kpis, KpiSet};
pub use ledger::{LedgerClient, LedgerError, LedgerStore, WaiverRequest};
pub use promotion::{can_promote_to_channel, PromotionDecision, ReleaseChannel};
pub use report::{evaluate_module, evaluate_tenant, submit_waiver, ModuleComplianceReport};
