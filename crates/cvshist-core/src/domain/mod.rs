//! Domain model for history reconstruction.
//!
//! - `RevisionNumber`, `SourceRevision`, `Revision`: per-file history
//! - `Symbol`, `SymbolTable`, `SymbolKind`: tags and branches
//! - `Lod`, `LodTree`: lines of development and their resolved topology
//! - `ChangeSet`: a reconstructed multi-file commit

pub mod changeset;
pub mod error;
pub mod file;
pub mod lod;
pub mod revision;
pub mod symbol;

pub use changeset::{ChangeSet, ChangeSetId, ChangeSetItem};
pub use error::{AmbiguousSymbol, BlockedExclusion, ConvertError, CorruptionIssue, Result};
pub use file::{BranchSprout, CvsFile, FileId, ProjectId, TagSprout};
pub use lod::{Lod, LodNode, LodTree};
pub use revision::{
    FileOp, ParseRevisionError, Revision, RevisionNumber, RevisionState, SourceRevision,
    SymbolTarget,
};
pub use symbol::{Symbol, SymbolId, SymbolKind, SymbolTable};
