// Common library for the group reminder job and the pledge workflow action

pub mod config;
pub mod errors;
pub mod jobs;
pub mod messaging;
pub mod models;
pub mod repositories;
pub mod schedule;
pub mod substitution;
pub mod telemetry;
pub mod workflow;
