//! JSON file partner store.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chatline_core::{PartnerStore, StorageError};
use tokio::{fs, sync::Mutex};
use tracing::debug;

const FILE_NAME: &str = "active_partner.json";

/// Partner store backed by one JSON object mapping profile to partner.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous contents intact.
pub struct FilePartnerStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePartnerStore {
    /// Store at an explicit file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(FILE_NAME))
    }

    /// Store under the platform data directory, if one is known.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::data_local_dir().map(|dir| Self::in_dir(&dir.join("chatline")))
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = map.len(), "partner store written");
        Ok(())
    }
}

#[async_trait]
impl PartnerStore for FilePartnerStore {
    async fn load(&self, profile: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map().await?.remove(profile))
    }

    async fn save(&self, profile: &str, partner: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(profile.to_owned(), partner.to_owned());
        self.write_map(&map).await
    }

    async fn clear(&self, profile: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(profile).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
