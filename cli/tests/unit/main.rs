//! Unit tests for hostprep
//!
//! These tests use fake ports and scratch directories and run fast without
//! touching the real host.

mod architecture;
mod provision_service;
