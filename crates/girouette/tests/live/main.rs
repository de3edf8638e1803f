//! Behavior tests for the live update engine.
//!
//! Each module covers one area: end-to-end update scenarios, reconnect
//! and resume, tenant isolation, planner degradation, and session
//! lifecycle.

mod harness;

mod degrade;
mod lifecycle;
mod resume;
mod scenarios;
mod tenancy;
