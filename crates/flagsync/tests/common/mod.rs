//! Shared test utilities for flagsync integration tests.
//!
//! This module provides:
//! - `TestHarness` for clients backed by temp directories and scripted sources
//! - Builder patterns for creating records and criteria programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedDeltas, ScriptedSnapshot, TestHarness};
