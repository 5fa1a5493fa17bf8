//! Core identity test suite
//!
//! Organized into cross-module round trips and adversarial inputs
