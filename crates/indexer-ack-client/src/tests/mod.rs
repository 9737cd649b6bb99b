//! Behaviour tests for the ingestion client.
//!
//! - `harness.rs`          - Mock transport, canned HTTP server and helpers
//! - `scenarios.rs`        - End-to-end delivery walkthroughs
//! - `confirmation.rs`     - Only a current handle reported true confirms
//! - `resend.rs`           - Expiry, lost sends, attempt caps, markers
//! - `channel_lifecycle.rs` - Idle retirement and invalidation
//! - `backpressure.rs`     - Pending ceilings in wait and reject modes
//! - `auth.rs`             - Credential rejection is fatal
//! - `shutdown.rs`         - Final flush and unconfirmed reporting

mod auth;
mod channel_lifecycle;
mod confirmation;
