use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::digest::Digest;
use crate::error::StateError;
use crate::manifest::PassManifest;
use crate::Result;

const MANIFEST_FILE: &str = "manifest.json";

/// Storage interface for pass artifacts.
///
/// Blobs are content-addressed and immutable; the manifest is the single
/// mutable record and is replaced atomically.
pub trait ArtifactStore: Send + Sync {
    /// Store `data` and return its digest. Deduplicates automatically.
    fn put(&self, data: &[u8]) -> Result<Digest>;

    /// Retrieve the blob for `digest`.
    fn get(&self, digest: &Digest) -> Result<Vec<u8>>;

    /// Check whether `digest` exists without reading the blob.
    fn exists(&self, digest: &Digest) -> Result<bool>;

    /// Delete the blob for `digest`. Deleting a missing blob is not an error.
    fn remove(&self, digest: &Digest) -> Result<()>;

    /// Load the manifest, or a fresh one if none was ever saved.
    fn load_manifest(&self) -> Result<PassManifest>;

    /// Atomically replace the manifest.
    fn save_manifest(&self, manifest: &PassManifest) -> Result<()>;

    /// Retrieve a blob and check that it still hashes to `digest`.
    fn get_verified(&self, name: &str, digest: &Digest) -> Result<Vec<u8>> {
        let data = self.get(digest)?;
        let actual = Digest::compute(&data);
        if actual != *digest {
            return Err(StateError::DigestMismatch {
                name: name.to_string(),
                expected: *digest,
                actual,
            });
        }
        Ok(data)
    }
}

/// Filesystem-backed artifact store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>` and
/// `<root>/manifest.json`.
pub struct FsArtifactStore {
    root: PathBuf,
    objects_dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { root, objects_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Write `data` to `path` through a temp file in the same directory.
    fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, data: &[u8]) -> Result<Digest> {
        let digest = Digest::compute(data);
        let path = self.blob_path(&digest);

        if path.exists() {
            return Ok(digest);
        }

        let shard_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.objects_dir.clone());
        Self::write_atomic(&shard_dir, &path, data)?;
        debug!(digest = %digest, bytes = data.len(), "artifact blob stored");

        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.blob_path(digest);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StateError::NotFound(*digest)
            } else {
                StateError::Io(e)
            }
        })
    }

    fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.blob_path(digest).exists())
    }

    fn remove(&self, digest: &Digest) -> Result<()> {
        match fs::remove_file(self.blob_path(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_manifest(&self) -> Result<PassManifest> {
        let path = self.root.join(MANIFEST_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StateError::Manifest(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PassManifest::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_manifest(&self, manifest: &PassManifest) -> Result<()> {
        let data = serde_json::to_vec_pretty(manifest)?;
        Self::write_atomic(&self.root, &self.root.join(MANIFEST_FILE), &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn blob_roundtrip() {
        let (_dir, store) = make_store();
        let digest = store.put(b"[1,2,3]").unwrap();
        assert_eq!(store.get(&digest).unwrap(), b"[1,2,3]");
    }

    #[test]
    fn dedupe_invariant() {
        let (dir, store) = make_store();
        let d1 = store.put(b"duplicate me").unwrap();
        let d2 = store.put(b"duplicate me").unwrap();
        assert_eq!(d1, d2);

        let hex = d1.to_hex();
        let shard = dir.path().join("objects").join(&hex[..2]);
        let entries: Vec<_> = std::fs::read_dir(shard).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn get_nonexistent_returns_not_found() {
        let (_dir, store) = make_store();
        let fake = Digest::compute(b"no such blob");
        match store.get(&fake) {
            Err(StateError::NotFound(d)) => assert_eq!(d, fake),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = make_store();
        let digest = store.put(b"short lived").unwrap();
        store.remove(&digest).unwrap();
        store.remove(&digest).unwrap();
        assert!(!store.exists(&digest).unwrap());
    }

    #[test]
    fn get_verified_detects_tampering() {
        let (_dir, store) = make_store();
        let digest = store.put(b"original").unwrap();
        std::fs::write(store.blob_path(&digest), b"tampered").unwrap();
        match store.get_verified("files", &digest) {
            Err(StateError::DigestMismatch { name, .. }) => assert_eq!(name, "files"),
            other => panic!("expected DigestMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_manifest_loads_fresh() {
        let (_dir, store) = make_store();
        let m = store.load_manifest().unwrap();
        assert!(m.passes.is_empty());
    }
}
