//! BDD step definitions for healthwatch service

pub mod engine_steps;
pub mod probe_steps;
pub mod state_machine_steps;
