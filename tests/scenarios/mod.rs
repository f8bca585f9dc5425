//! Scenario-based tests for ci-pipeline

mod builtin_matrix;
mod environment;
mod failure_handling;
