//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `topicrelay` crate.
//!
//! It centralizes the error type returned by every fallible operation and the
//! logging bootstrap shared by the binary and the tests.

pub mod error;
pub mod logging;
