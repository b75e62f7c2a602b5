//! cvshist-state: persisted pass artifacts for cvshist
//!
//! Every conversion pass reads the committed output of earlier passes and
//! commits its own output before the next pass may start. This crate owns
//! that persisted state.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: atomic commits, digest verification, resumable runs.
//!
//! ## Key Components
//!
//! - `Digest`: SHA-256 content address of an artifact blob
//! - `ArtifactStore`: blob + manifest storage interface
//! - `FsArtifactStore`: filesystem store with git-style sharding
//! - `PassManifest`: which passes committed which artifacts

mod digest;
mod error;
pub mod fakes;
mod manifest;
mod store;

pub use digest::Digest;
pub use error::StateError;
pub use manifest::{ArtifactRecord, CommittedPass, PassManifest};
pub use store::{ArtifactStore, FsArtifactStore};

/// Result type for cvshist-state operations
pub type Result<T> = std::result::Result<T, StateError>;
