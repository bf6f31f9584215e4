//! Fund Modeling API Library
//!
//! This library provides the core functionality for the venture-capital
//! fund modeling service: fund term CRUD, deal pipeline tracking, scenario
//! modeling, variance/alerting, and the idempotency subsystem shared by the
//! calculation endpoints.

pub mod api;
pub mod domain;
pub mod infrastructure;
