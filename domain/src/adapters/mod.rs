//! Adapters that live inside the domain crate for convenience.
//!
//! These serve unit tests and local demos. The real provider adapter lives in
//! the `stripe-api` crate.

pub mod memory_provider;
