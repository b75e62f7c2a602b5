use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use cvshist_state::{ArtifactStore, PassManifest};

use crate::config::ConversionOptions;
use crate::domain::{ConvertError, Result};
use crate::output::OutputSink;
use crate::source::RevisionSource;
use crate::symbols::hints::SymbolHints;

/// Everything a pass may read or write.
///
/// Artifacts are read from the committed manifest and staged in memory; the
/// pass manager commits staged artifacts only after the pass succeeds.
pub struct PassContext<'a> {
    pub options: &'a ConversionOptions,
    pub source: &'a dyn RevisionSource,
    pub sink: &'a mut dyn OutputSink,
    store: &'a dyn ArtifactStore,
    manifest: &'a PassManifest,
    staged: BTreeMap<String, Vec<u8>>,
}

impl<'a> PassContext<'a> {
    pub fn new(
        options: &'a ConversionOptions,
        source: &'a dyn RevisionSource,
        sink: &'a mut dyn OutputSink,
        store: &'a dyn ArtifactStore,
        manifest: &'a PassManifest,
    ) -> Self {
        Self {
            options,
            source,
            sink,
            store,
            manifest,
            staged: BTreeMap::new(),
        }
    }

    /// Read a committed artifact, verifying its digest.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let record = self
            .manifest
            .artifact(name)
            .ok_or_else(|| ConvertError::MissingArtifact {
                name: name.to_string(),
            })?;
        let bytes = self.store.get_verified(name, &record.digest)?;
        debug!(artifact = name, size = bytes.len(), "artifact loaded");
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn stage<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert(name.to_string(), bytes);
        Ok(())
    }

    pub fn symbol_hints(&self) -> Result<SymbolHints> {
        SymbolHints::load_optional(self.options.symbol_hints.as_deref())
    }

    pub(crate) fn into_staged(self) -> BTreeMap<String, Vec<u8>> {
        self.staged
    }
}
