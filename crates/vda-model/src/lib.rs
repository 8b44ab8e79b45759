// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Domain model SSOT: every type that crosses a crate boundary or is
//! persisted lives here, so the wire shape and the storage shape cannot
//! drift apart.

mod app;
mod claims;
mod decision;
pub mod migration;
mod studio;

pub use app::{apply_mutation, App, MutationError, MUTATION_CLASSES};
pub use claims::Claims;
pub use decision::{
    CandidateItem, DecisionRequest, DecisionResponse, DependencyStatus, FeedbackEvent, RankedItem,
    StageOutcome, StageTrace,
};
pub use migration::{
    MigrationError, VioletAction, VioletBundle, VioletResource, DEFAULT_BUNDLE_VERSION,
    VIOLET_SOURCE_SYSTEM,
};
pub use studio::{
    is_depth_label, normalize_depth_label, ArtifactFile, ArtifactManifest, CheckStatus,
    Confirmation, FileArtifact, Job, JtbdCoverage, RunResult, RunTargetInfo, TerminalResult,
    VerificationCheck, VerificationReport, WorkloadItem, REQUIRED_CONSTRAINTS,
};

pub const CRATE_NAME: &str = "vda-model";
