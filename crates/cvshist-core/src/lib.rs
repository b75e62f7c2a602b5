//! cvshist-core: CVS history reconstruction
//!
//! Infers atomic changesets from per-file CVS revisions and the branch/tag
//! topology from per-file symbol tables, then emits both as an ordered
//! event stream.
//!
//! ## Layer 1 - Reconstruction engine
//!
//! Focus: deterministic, resumable passes over an artifact store.
//!
//! ## Key Components
//!
//! - `RevisionCollector` + `ConsistencyGuard`: validated per-file revision graphs
//! - `ChangeSetAssembler`: time-window clustering and dependency ordering
//! - `SymbolCollator`, `SymbolClassifier`, `SymbolParentResolver`: symbol topology
//! - `VendorBranchGrafter`: vendor-import semantics on trunk
//! - `HistoryEmitter`: ordered commits and symbol copies
//! - `PassManager`: the seven passes, committed one at a time

pub mod assemble;
pub mod collect;
pub mod config;
pub mod domain;
pub mod guard;
pub mod metrics;
pub mod obs;
pub mod output;
pub mod passes;
pub mod source;
pub mod symbols;
pub mod telemetry;
pub mod vendor;

pub use assemble::ChangeSetAssembler;
pub use collect::{CollectedRepository, RevisionCollector};
pub use config::{ConversionOptions, ProjectLayout, SymbolDefault};
pub use domain::{
    ChangeSet, ChangeSetId, ChangeSetItem, ConvertError, CorruptionIssue, CvsFile, FileId,
    FileOp, Lod, LodNode, LodTree, ProjectId, Result, RevisionNumber, RevisionState,
    SourceRevision, SymbolId, SymbolKind, SymbolTable,
};
pub use guard::ConsistencyGuard;
pub use output::{HistoryEmitter, JsonLinesSink, MemorySink, OutputEvent, OutputSink};
pub use passes::{Pass, PassContext, PassManager, RunSummary};
pub use source::{JsonLinesSource, MemorySource, RevisionSource, SourceFile};
pub use symbols::{
    SymbolClassifier, SymbolCollator, SymbolHints, SymbolKinds, SymbolParentResolver,
    SymbolStatistics,
};
pub use vendor::{GraftPlan, VendorBranchGrafter};
