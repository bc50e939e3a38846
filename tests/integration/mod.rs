pub mod test_utils;

mod batch_scenarios;
mod capacity;
mod circuit_breaker;
mod config_integration;
mod history_persistence;
mod media_phase;
