//! Quota probing.
//!
//! Estimates each account's remaining allowance by probing the upstream
//! service over HTTP. Probes never mutate the live auth file; the unwrapped
//! credential is consulted only for its bearer token. Failures degrade into
//! `unknown` snapshots instead of failing the refresh operation.

pub mod probe;

pub use probe::{build_client, probe_account, ProbeOutcome};
