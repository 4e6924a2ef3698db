//! Workflow orchestration for data-parallel pattern jobs.
//!
//! Architecture role:
//! - owns engine selection and the swap semantics (parameter detach/attach,
//!   server-type refresh)
//! - validates the workflow model before anything runs
//! - assembles per-run resources: job directory, classpath, job arguments,
//!   parameter scopes
//! - drives the engine lifecycle and guarantees wrapup
//!
//! Key modules:
//! - [`director`]: the [`Director`] and its run loop
//! - [`check`]: model checks and director/lifecycle reconciliation
//! - [`jars`] / [`jobdir`] / [`params`]: per-run resource assembly
//! - [`builtin`]: stock workflow logic for override jobs

pub mod builtin;
pub mod check;
pub mod director;
pub mod jars;
pub mod jobdir;
pub mod params;

pub use builtin::register_builtin_logic;
pub use check::{check_director_iterations, check_model};
pub use director::{Director, RunReport};
pub use jars::assemble_jar_list;
pub use jobdir::create_job_directory;
pub use params::{collect_parameters, copy_parameters_into_sub_workflow, parse_job_arguments};
