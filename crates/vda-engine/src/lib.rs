// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! The decision engine and its two dependency seams.
//!
//! Adapter failures never fail a decision: they mark the stage trace
//! `degraded` and the engine continues with empty results. The response
//! hash covers the degraded traces, so a degraded decision and a healthy
//! one for the same request hash differently by construction.

mod engine;
mod policy;
mod retrieval;

pub use engine::Engine;
pub use policy::{LocalPolicyClient, PolicyClient, PolicyInput, PolicyOutput};
pub use retrieval::{AdapterError, HttpRetrievalClient, RetrievalClient};

pub const CRATE_NAME: &str = "vda-engine";
