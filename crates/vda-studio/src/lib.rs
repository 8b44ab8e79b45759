// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Studio job engine.
//!
//! A job is a pure function of its confirmation: the same confirmation
//! (minus the creation timestamp baked into the job id) always yields the
//! same files, manifest, verification report, and JTBD coverage. The disk
//! workspace is derived state and can be rebuilt from the job record at
//! any time.

mod artifacts;
mod backend;
mod bundle;
mod contracts;
mod parity;
mod preview;
mod service;
mod smoke;
mod terminal;
mod workspace;

pub use artifacts::slugify;
pub use bundle::build_bundle_bytes;
pub use service::{JobStore, StudioError, StudioService};
pub use terminal::parse_exec_command;

pub const CRATE_NAME: &str = "vda-studio";
