//! Shared primitives for the Red Lantern tutor components.

#![warn(clippy::pedantic)]

/// Module for bounded-attempt retry with exponential backoff
pub mod retry;

/// Module for secret types that prevent accidental logging
pub mod secret;
