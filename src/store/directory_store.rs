/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::debug;
use uuid::Uuid;

use super::blob_store::{BlobId, BlobStore};
use super::open_store::OpenStore;

/// The contents of the marker file which identifies the layout of a directory store.
const LAYOUT_MARKER: &str = "4f0b6e2a-61c4-11ee-8f3e-2b1d6a0c9e51";

const BLOBS_DIR: &str = "blobs";
const STAGING_DIR: &str = "stage";
const MARKER_FILE: &str = "version";

/// The configuration for opening a [`DirectoryStore`].
///
/// [`DirectoryStore`]: crate::store::DirectoryStore
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DirectoryConfig {
    /// The path of the directory store.
    pub path: PathBuf,
}

impl OpenStore for DirectoryConfig {
    type Store = DirectoryStore;

    fn open(&self) -> crate::Result<Self::Store> {
        let store = DirectoryStore {
            root: self.path.clone(),
        };

        fs::create_dir_all(store.blobs_dir())?;
        fs::create_dir_all(store.staging_dir())?;

        let marker_path = self.path.join(MARKER_FILE);
        match fs::read_to_string(&marker_path) {
            Ok(marker) if marker == LAYOUT_MARKER => {}
            Ok(_) => return Err(crate::Error::UnsupportedStore),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                fs::write(&marker_path, LAYOUT_MARKER)?;
            }
            Err(error) => return Err(error.into()),
        }

        store.discard_staged().map_err(crate::Error::Store)?;

        Ok(store)
    }
}

/// A `BlobStore` which keeps each blob in its own file in a local directory.
///
/// Writes go to a file in a staging directory which is synced and then renamed over the blob's
/// file, so a blob is always either entirely old or entirely new. Files left in the staging
/// directory by an interrupted write are removed when the store is opened.
///
/// You can use [`DirectoryConfig`] to open a blob store of this type.
///
/// [`DirectoryConfig`]: crate::store::DirectoryConfig
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Return the path of the file which holds the blob with the given `id`.
    ///
    /// Blob IDs are used as file names, so IDs which could name a different file are rejected.
    fn blob_path(&self, id: &BlobId) -> anyhow::Result<PathBuf> {
        let name = id.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            bail!("The blob ID '{}' can not be used as a file name.", name);
        }
        Ok(self.blobs_dir().join(name))
    }

    /// Remove files left behind by interrupted writes.
    fn discard_staged(&self) -> anyhow::Result<()> {
        for entry in fs::read_dir(self.staging_dir())? {
            let path = entry?.path();
            fs::remove_file(&path)
                .with_context(|| format!("could not remove staged file {}", path.display()))?;
            debug!(path = %path.display(), "removed interrupted blob write");
        }
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

impl BlobStore for DirectoryStore {
    fn put_blob(&mut self, id: &BlobId, data: &[u8]) -> anyhow::Result<()> {
        let blob_path = self.blob_path(id)?;
        let staged_path = self.staging_dir().join(Uuid::new_v4().to_string());

        let result =
            write_synced(&staged_path, data).and_then(|()| fs::rename(&staged_path, &blob_path));
        if let Err(error) = result {
            fs::remove_file(&staged_path).ok();
            return Err(error).with_context(|| format!("could not write blob {}", id));
        }

        Ok(())
    }

    fn get_blob(&mut self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(id)?) {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("could not read blob {}", id)),
        }
    }

    fn delete_blob(&mut self, id: &BlobId) -> anyhow::Result<()> {
        match fs::remove_file(self.blob_path(id)?) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                Err(error).with_context(|| format!("could not delete blob {}", id))
            }
            _ => Ok(()),
        }
    }

    fn list_blobs(&mut self) -> anyhow::Result<Vec<BlobId>> {
        fs::read_dir(self.blobs_dir())?
            .map(|entry| {
                let file_name = entry?.file_name();
                match file_name.to_str() {
                    Some(name) => Ok(BlobId::new(name)),
                    None => bail!("The blob file name {:?} is not valid unicode.", file_name),
                }
            })
            .collect()
    }
}
