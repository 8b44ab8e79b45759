// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Deterministic building blocks shared by every layer: canonical JSON
//! bytes, SHA-256 content hashing, and stable id derivation.
//!
//! Both externally visible hashes (decision hash, migration checksum) are
//! defined over [`canonical::canonical_json_bytes`], so the canonicalization
//! rule lives in exactly one place.

pub mod canonical;
mod ids;
mod normalize;

pub use canonical::{canonical_json_bytes, canonical_json_hash, sha256_hex};
pub use ids::stable_id;
pub use normalize::{dedupe_fold, normalize_list};

pub const CRATE_NAME: &str = "vda-core";
