//! Simmer: diversity-constrained batch recipe generation
//!
//! Batches calls to a slow, unreliable text-generation endpoint into recipe
//! sets under a concurrency cap. Calls go through a retry and circuit-breaker
//! wrapper, responses through a staged parser that never fails, and every
//! item is generated under categorical tags kept distinct within a batch and
//! against a rolling per-owner history.

pub mod config;
pub mod diversity;
pub mod error;
pub mod history;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod persistence;
pub mod progress;
pub mod provider;
pub mod recipe;
pub mod resilience;
pub mod scheduler;
pub mod shopping_list;

pub use config::{ConfigLoader, SimmerConfig};
pub use error::{CallError, SchedulerError};
pub use recipe::{Ingredient, ItemOrigin, Recipe};
pub use scheduler::{Collaborators, JobParams, JobScheduler, JobSnapshot, JobStatus};
