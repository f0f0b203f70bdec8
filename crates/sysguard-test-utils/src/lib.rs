//! Shared test utilities for the sysguard workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`system`]: [`TestSystem`], a throwaway system root plus backup root

pub mod system;

pub use system::TestSystem;
