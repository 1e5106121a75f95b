//! Integration test binary -- all integration tests consolidated into a single
//! binary to keep link time down.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod reminder_flow;
mod scheduler_lifecycle;
mod webhook_delivery;
