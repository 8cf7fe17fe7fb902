//! Behavioural suites for the lint daemon.
//!
//! The suites drive a real daemon over a Unix socket in a temporary runtime
//! directory.

#[cfg(unix)]
mod support;
