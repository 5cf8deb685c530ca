//! On-disk storage for vector collections
//!
//! Each project is one JSON file named after the hex-encoded project ID.
//! Writes go to a temp file in the same directory which is then renamed over
//! the old file, so a crash leaves either the old or the new collection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::VectorRecord;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    version: u32,
    project_id: String,
    dimensions: usize,
    records: Vec<VectorRecord>,
}

/// A collection read back from disk, or why it could not be
pub(crate) struct LoadedCollection {
    pub project_id: String,
    pub records: std::result::Result<Vec<VectorRecord>, String>,
}

/// Directory of per-project collection files
#[derive(Debug, Clone)]
pub(crate) struct CollectionStorage {
    dir: PathBuf,
}

impl CollectionStorage {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(project_id)))
    }

    /// Atomically replace a project's collection file
    pub fn save<'a, I>(&self, project_id: &str, dimensions: usize, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a VectorRecord>,
    {
        let file = CollectionFile {
            version: FORMAT_VERSION,
            project_id: project_id.to_string(),
            dimensions,
            records: records.into_iter().cloned().collect(),
        };
        let data = serde_json::to_vec(&file)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(project_id))
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Remove a project's collection file if present
    pub fn remove(&self, project_id: &str) -> Result<()> {
        let path = self.path_for(project_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Read every collection file, keeping per-project failures separate
    pub fn load_all(&self, dimensions: usize) -> Result<Vec<LoadedCollection>> {
        let mut loaded = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let fallback_id = hex::decode(&stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or(stem);

            loaded.push(match read_collection(&path, dimensions) {
                Ok(file) => LoadedCollection {
                    project_id: file.project_id,
                    records: Ok(file.records),
                },
                Err(reason) => LoadedCollection {
                    project_id: fallback_id,
                    records: Err(reason),
                },
            });
        }

        Ok(loaded)
    }
}

fn read_collection(path: &Path, dimensions: usize) -> std::result::Result<CollectionFile, String> {
    let data = std::fs::read(path).map_err(|e| format!("read failed: {}", e))?;
    let file: CollectionFile =
        serde_json::from_slice(&data).map_err(|e| format!("malformed collection file: {}", e))?;

    if file.version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", file.version));
    }
    if file.dimensions != dimensions {
        return Err(format!(
            "collection has dimension {}, index is configured for {}",
            file.dimensions, dimensions
        ));
    }

    let mut seen = HashSet::with_capacity(file.records.len());
    for record in &file.records {
        if record.vector.len() != dimensions {
            return Err(format!(
                "record {} has {} values, expected {}",
                record.id,
                record.vector.len(),
                dimensions
            ));
        }
        if record.vector.iter().any(|v| !v.is_finite()) {
            return Err(format!("record {} contains non-finite values", record.id));
        }
        if record.project_id != file.project_id {
            return Err(format!("record {} belongs to another project", record.id));
        }
        if !seen.insert(record.id) {
            return Err(format!("duplicate record {}", record.id));
        }
    }

    Ok(file)
}
