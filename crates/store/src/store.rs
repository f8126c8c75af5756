//! File-backed repository persistence.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json          - schema version and save count
//! state.cbor.zst           - CBOR+zstd compressed repository state
//! integrity/
//!   manifest.json          - hash chain, one entry per save
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::memory::MemoryRepository;

/// Current schema version of the persisted repository state.
const STATE_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const STATE_FILE: &str = "state.cbor.zst";

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
}

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    pub save_count: u32,
}

/// A single save recorded in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub generation: u32,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Directory holding a persisted [`MemoryRepository`].
pub struct RepositoryStore {
    root: PathBuf,
    meta: StoreMeta,
    manifest: IntegrityManifest,
}

impl RepositoryStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join("integrity").join("manifest.json");

        let (meta, manifest) = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != STATE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STATE_SCHEMA_VERSION,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = StoreMeta {
                schema_version: STATE_SCHEMA_VERSION,
                save_count: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        tracing::debug!(root = %root.display(), saves = meta.save_count, "opened repository store");
        Ok(Self {
            root,
            meta,
            manifest,
        })
    }

    /// Load the persisted repository, or an empty one if nothing was saved yet.
    pub fn load(&self) -> Result<MemoryRepository, StoreError> {
        if self.meta.save_count == 0 {
            return Ok(MemoryRepository::new());
        }
        let compressed = std::fs::read(self.root.join(STATE_FILE))?;
        self.verify_latest(&compressed)?;
        let cbor_bytes = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor_bytes)
    }

    /// Write the repository state and extend the hash chain.
    pub fn save(&mut self, repo: &MemoryRepository) -> Result<(), StoreError> {
        let cbor_bytes = cbor_serialize(repo)?;
        let compressed = zstd_compress(&cbor_bytes)?;
        let hash = sha256_hex(&compressed);
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(self.root.join(STATE_FILE), &compressed)?;

        self.meta.save_count += 1;
        self.manifest.entries.push(ManifestEntry {
            generation: self.meta.save_count,
            sha256: hash,
            prev_hash,
        });

        self.save_meta()?;
        self.save_manifest()?;
        tracing::debug!(generation = self.meta.save_count, "saved repository state");
        Ok(())
    }

    /// Verify chain continuity and the hash of the current state file.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            prev_hash = Some(entry.sha256.clone());
        }
        if self.meta.save_count > 0 {
            let data = std::fs::read(self.root.join(STATE_FILE))?;
            self.verify_latest(&data)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    fn verify_latest(&self, data: &[u8]) -> Result<(), StoreError> {
        let actual = sha256_hex(data);
        match self.manifest.entries.last() {
            Some(entry) if entry.sha256 == actual => Ok(()),
            Some(entry) => Err(StoreError::IntegrityMismatch {
                expected: entry.sha256.clone(),
                actual,
            }),
            None => Err(StoreError::IntegrityMismatch {
                expected: "manifest entry".into(),
                actual,
            }),
        }
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let path = self.root.join("integrity").join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NewItem;
    use crate::repository::Repository;
    use postversion_common::ItemStatus;

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RepositoryStore::open(tmp.path().join("data")).unwrap();
        assert_eq!(store.meta().save_count, 0);
        assert!(store.root().join("integrity").is_dir());
        assert!(store.root().join(META_FILE).is_file());
    }

    #[test]
    fn empty_store_loads_fresh_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RepositoryStore::open(tmp.path()).unwrap();
        let repo = store.load().unwrap();
        assert_eq!(repo.item_count(), 0);
        assert!(repo.supports_history("post"));
    }

    #[test]
    fn save_and_reload_preserves_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");

        let id = {
            let mut store = RepositoryStore::open(&path).unwrap();
            let mut repo = MemoryRepository::new();
            let id = repo.insert_item(NewItem::new("post", "Persisted"));
            repo.add_metadata(id, "version_1", "1", true).unwrap();
            let snap = repo.create_snapshot(id, true).unwrap();
            repo.update_item_status(snap, ItemStatus::Draft).unwrap();
            store.save(&repo).unwrap();
            id
        };

        let store = RepositoryStore::open(&path).unwrap();
        assert_eq!(store.meta().save_count, 1);
        let mut repo = store.load().unwrap();
        assert_eq!(repo.get_item(id).unwrap().title, "Persisted");
        assert_eq!(repo.get_metadata(id).unwrap()["version_1"], vec!["1"]);
        assert_eq!(repo.snapshot_count(), 1);
        // The id counter survives the round trip.
        let next = repo.insert_item(NewItem::new("post", "Next"));
        assert!(next.0 > id.0 + 1);
    }

    #[test]
    fn integrity_chain_verifies_after_several_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = RepositoryStore::open(tmp.path()).unwrap();
        let mut repo = MemoryRepository::new();
        store.save(&repo).unwrap();
        repo.insert_item(NewItem::new("page", "About"));
        store.save(&repo).unwrap();
        store.verify_integrity().unwrap();
        assert_eq!(store.manifest.entries.len(), 2);
    }

    #[test]
    fn corrupted_state_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        let mut store = RepositoryStore::open(&path).unwrap();
        let mut repo = MemoryRepository::new();
        repo.insert_item(NewItem::new("post", "A"));
        store.save(&repo).unwrap();

        let state_path = path.join(STATE_FILE);
        let mut data = std::fs::read(&state_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&state_path, &data).unwrap();

        let store = RepositoryStore::open(&path).unwrap();
        assert!(store.verify_integrity().is_err());
        assert!(matches!(
            store.load(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        let _store = RepositoryStore::open(&path).unwrap();

        let meta_path = path.join(META_FILE);
        let mut meta: StoreMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match RepositoryStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, STATE_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
