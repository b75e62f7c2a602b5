//! Symbol handling: renaming, collation, classification and parent
//! resolution.

pub mod classifier;
pub mod collator;
pub mod hints;
pub mod resolver;
pub mod transform;

pub use classifier::{DecisionReason, SymbolClassifier, SymbolDecision, SymbolKinds};
pub use collator::{SymbolCollator, SymbolStatistics, SymbolStats};
pub use hints::{HintConversion, ParentHint, SymbolHint, SymbolHints};
pub use resolver::{Demotion, PreferenceGraph, Resolution, SymbolParentResolver};
pub use transform::{RegexSymbolTransform, SymbolTransform, TransformChain};
