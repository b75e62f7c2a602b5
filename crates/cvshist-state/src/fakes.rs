//! In-memory fake for the artifact store (testing only)
//!
//! `MemoryArtifactStore` satisfies the `ArtifactStore` contract without
//! touching the filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::digest::Digest;
use crate::error::StateError;
use crate::manifest::PassManifest;
use crate::store::ArtifactStore;
use crate::Result;

/// In-memory artifact store backed by a `HashMap<Digest, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<HashMap<Digest, Vec<u8>>>,
    manifest: Mutex<Option<PassManifest>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StateError {
    StateError::Manifest("memory store lock poisoned".to_string())
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, data: &[u8]) -> Result<Digest> {
        let digest = Digest::compute(data);
        self.blobs
            .lock()
            .map_err(poisoned)?
            .insert(digest, data.to_vec());
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .map_err(poisoned)?
            .get(digest)
            .cloned()
            .ok_or(StateError::NotFound(*digest))
    }

    fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.blobs.lock().map_err(poisoned)?.contains_key(digest))
    }

    fn remove(&self, digest: &Digest) -> Result<()> {
        self.blobs.lock().map_err(poisoned)?.remove(digest);
        Ok(())
    }

    fn load_manifest(&self) -> Result<PassManifest> {
        Ok(self
            .manifest
            .lock()
            .map_err(poisoned)?
            .clone()
            .unwrap_or_default())
    }

    fn save_manifest(&self, manifest: &PassManifest) -> Result<()> {
        *self.manifest.lock().map_err(poisoned)? = Some(manifest.clone());
        Ok(())
    }
}
