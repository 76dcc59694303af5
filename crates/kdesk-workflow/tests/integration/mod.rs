//! Integration tests for kdesk-workflow.
//!
//! These tests drive the full deploy path across crates:
//! stores, session, gateway fallback, order placement and monitors.

pub mod common;
