//! # Exclusive, lease-backed key ownership.
//!
//! A [`Registration`] claims one key with a conditional put bound to a fresh
//! lease, keeps the lease alive on a fast cadence and re-validates ownership
//! on a slower one by comparing the key's creation revision with the one
//! recorded at claim time ([`RegistrationLease::create_revision`]).
//!
//! ```text
//! run(parent) ─► connect ─► claim ─┬─ AlreadyClaimed ─────────────┐
//!                                  └─ hold:                       │
//!                                      keepalive tick (1s)        │
//!                                      fencing tick (5s)          ▼
//!                                      ctx cancelled ──► revoke ─► liveness cancelled
//! ```
//!
//! Ownership is considered lost as soon as the liveness token returned by
//! [`Registration::run`] is cancelled.

mod lease;
mod registration;

pub use lease::RegistrationLease;
pub use registration::Registration;
