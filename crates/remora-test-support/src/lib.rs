#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (JSON payload builders, polling helpers), scripted.rs (in-memory transport).

pub mod fixtures;
pub mod scripted;

pub use scripted::ScriptedTransport;
