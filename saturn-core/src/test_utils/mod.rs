//! Test utilities and helpers for Saturn
//!
//! Deterministic randomness and shared key fixtures, so tests stay
//! reproducible and expensive RSA keys are generated once per test binary.

pub mod deterministic_rng;
pub mod fixtures;

pub use deterministic_rng::*;
pub use fixtures::*;
