//! # Error Handling
//!
//! A single [`WorkflowError`] enum carries the error taxonomy from the orchestration
//! spec's §7 (`VALIDATION`, `NO_INTENT`, `UNSATISFIED_INPUTS`, `ADAPTATION_FAILED`,
//! `LLM_STRUCTURED_OUTPUT_PARSE`, `EFFECTOR_TIMEOUT`/`EFFECTOR_TRANSIENT`/
//! `EFFECTOR_PERMANENT`, `WORKFLOW_CYCLE`, `DANGLING_EDGE`, ...). [`retry`] implements
//! the exponential-backoff retry policy used by the LLM and REST effectors.

pub mod retry;
pub mod types;

pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{ErrorEnvelope, Result, WorkflowError};
