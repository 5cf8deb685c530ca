//! Per-project vector index
//!
//! Every project owns a collection holding an immutable snapshot behind an
//! `RwLock<Arc<_>>`. Writers build a complete new snapshot (and persist it)
//! before swapping it in, so searches only ever see the state before or after
//! a mutation. Mutations within one project are serialized by a per-collection
//! mutex; projects never share locks.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use uuid::Uuid;

use super::persist::CollectionStorage;
use crate::error::{Error, Result};
use crate::types::VectorRecord;

/// How vectors are compared. Every metric reports similarity, higher is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity in [-1, 1]
    #[default]
    Cosine,
    /// Raw dot product
    Dot,
    /// `1 / (1 + euclidean distance)`, in (0, 1]
    Euclidean,
}

impl SimilarityMetric {
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
                for (x, y) in a.iter().zip(b) {
                    let (x, y) = (*x as f64, *y as f64);
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
            }
            SimilarityMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            SimilarityMetric::Euclidean => {
                let dist: f32 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        }
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub file_id: String,
    pub order: u32,
    pub similarity: f32,
}

#[derive(Debug, Default)]
struct Snapshot {
    records: HashMap<Uuid, VectorRecord>,
}

#[derive(Debug, Default)]
struct ProjectCollection {
    snapshot: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
    /// Set once the project is deleted; writers holding a stale handle retry
    retired: AtomicBool,
}

impl ProjectCollection {
    fn with_records(records: Vec<VectorRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot { records })),
            ..Default::default()
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }
}

/// Per-project similarity index
pub struct VectorIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    storage: Option<CollectionStorage>,
    collections: DashMap<String, Arc<ProjectCollection>>,
    /// Projects whose persisted collection failed to load, with the reason
    corrupted: DashMap<String, String>,
}

impl VectorIndex {
    /// In-memory index (nothing persisted)
    pub fn in_memory(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimensions,
            metric,
            storage: None,
            collections: DashMap::new(),
            corrupted: DashMap::new(),
        }
    }

    /// Open a persistent index, loading every collection under `dir`
    ///
    /// A collection that fails to load is isolated: its project reports
    /// `IndexCorruption` while every other project is served normally.
    pub fn open<P: AsRef<Path>>(dir: P, dimensions: usize, metric: SimilarityMetric) -> Result<Self> {
        let storage = CollectionStorage::new(dir.as_ref())?;
        let index = Self {
            storage: Some(storage.clone()),
            ..Self::in_memory(dimensions, metric)
        };

        for loaded in storage.load_all(dimensions)? {
            match loaded.records {
                Ok(records) => {
                    tracing::info!(
                        "Loaded collection '{}' ({} vectors)",
                        loaded.project_id,
                        records.len()
                    );
                    index.collections.insert(
                        loaded.project_id,
                        Arc::new(ProjectCollection::with_records(records)),
                    );
                }
                Err(reason) => {
                    tracing::error!(
                        "Collection '{}' is corrupted and will not be served: {}",
                        loaded.project_id,
                        reason
                    );
                    index.corrupted.insert(loaded.project_id, reason);
                }
            }
        }

        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Fails with `IndexCorruption` if the project's collection could not be loaded
    pub fn ensure_healthy(&self, project_id: &str) -> Result<()> {
        match self.corrupted.get(project_id) {
            Some(reason) => Err(Error::corruption(project_id, reason.value().clone())),
            None => Ok(()),
        }
    }

    fn existing(&self, project_id: &str) -> Result<Option<Arc<ProjectCollection>>> {
        self.ensure_healthy(project_id)?;
        Ok(self.collections.get(project_id).map(|c| c.value().clone()))
    }

    /// Get or create a collection in one compare-and-create step
    fn get_or_create(&self, project_id: &str) -> Result<Arc<ProjectCollection>> {
        self.ensure_healthy(project_id)?;
        Ok(self
            .collections
            .entry(project_id.to_string())
            .or_default()
            .value()
            .clone())
    }

    fn validate(&self, project_id: &str, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            if record.vector.len() != self.dimensions {
                return Err(Error::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.vector.len(),
                });
            }
            if record.project_id != project_id {
                return Err(Error::invalid_input(format!(
                    "record {} belongs to project '{}', not '{}'",
                    record.id, record.project_id, project_id
                )));
            }
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(Error::invalid_input(format!(
                    "record {} contains non-finite values",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Build and persist a new snapshot, then swap it in
    ///
    /// `apply` returns its result and whether anything changed; unchanged
    /// snapshots are neither persisted nor swapped.
    fn mutate<T, F>(&self, project_id: &str, create: bool, mut apply: F) -> Result<Option<T>>
    where
        F: FnMut(&mut HashMap<Uuid, VectorRecord>) -> (T, bool),
    {
        loop {
            let collection = if create {
                self.get_or_create(project_id)?
            } else {
                match self.existing(project_id)? {
                    Some(c) => c,
                    None => return Ok(None),
                }
            };

            let _guard = collection.write_lock.lock();
            if collection.retired.load(AtomicOrdering::Acquire) {
                // Project was deleted while we waited; start over on a fresh collection
                continue;
            }

            let mut records = collection.current().records.clone();
            let (out, changed) = apply(&mut records);

            if changed {
                if let Some(storage) = &self.storage {
                    storage.save(project_id, self.dimensions, records.values())?;
                }
                *collection.snapshot.write() = Arc::new(Snapshot { records });
            }

            return Ok(Some(out));
        }
    }

    /// Insert or replace records by ID; returns how many were written
    pub fn upsert(&self, project_id: &str, records: Vec<VectorRecord>) -> Result<usize> {
        self.validate(project_id, &records)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut pending = Some(records);
        let written = self.mutate(project_id, true, |map| {
            let batch = pending.take().unwrap_or_default();
            let n = batch.len();
            for record in batch {
                map.insert(record.id, record);
            }
            (n, n > 0)
        })?;

        Ok(written.unwrap_or(0))
    }

    /// Replace all of a file's records in a single swap
    ///
    /// Returns `(removed, inserted)`. Concurrent searches see either the old
    /// or the new set for the file, never neither.
    pub fn replace_file(
        &self,
        project_id: &str,
        file_id: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(usize, usize)> {
        self.validate(project_id, &records)?;
        if let Some(stray) = records.iter().find(|r| r.file_id != file_id) {
            return Err(Error::invalid_input(format!(
                "record {} belongs to file '{}', not '{}'",
                stray.id, stray.file_id, file_id
            )));
        }

        let mut pending = Some(records);
        let counts = self.mutate(project_id, true, |map| {
            let before = map.len();
            map.retain(|_, r| r.file_id != file_id);
            let removed = before - map.len();

            let batch = pending.take().unwrap_or_default();
            let inserted = batch.len();
            for record in batch {
                map.insert(record.id, record);
            }
            ((removed, inserted), removed > 0 || inserted > 0)
        })?;

        Ok(counts.unwrap_or((0, 0)))
    }

    /// Remove every record of a file; returns the number removed
    pub fn delete_file(&self, project_id: &str, file_id: &str) -> Result<usize> {
        let removed = self.mutate(project_id, false, |map| {
            let before = map.len();
            map.retain(|_, r| r.file_id != file_id);
            let removed = before - map.len();
            (removed, removed > 0)
        })?;

        Ok(removed.unwrap_or(0))
    }

    /// Drop a project's whole collection, including a corrupted one
    pub fn delete_project(&self, project_id: &str) -> Result<usize> {
        let mut removed = 0;

        if let Some(collection) = self.collections.get(project_id).map(|c| c.value().clone()) {
            let _guard = collection.write_lock.lock();
            collection.retired.store(true, AtomicOrdering::Release);
            if let Some(storage) = &self.storage {
                storage.remove(project_id)?;
            }
            removed = collection.current().records.len();
            *collection.snapshot.write() = Arc::new(Snapshot::default());
            self.collections.remove(project_id);
        } else if let Some(storage) = &self.storage {
            storage.remove(project_id)?;
        }

        if self.corrupted.remove(project_id).is_some() {
            tracing::info!("Cleared corrupted collection '{}'", project_id);
        }

        Ok(removed)
    }

    /// Top-k records by similarity, optionally restricted to one file
    ///
    /// Ties are broken by ascending chunk order, then file and chunk ID.
    /// A project with no collection yields no results.
    pub fn search(
        &self,
        project_id: &str,
        query: &[f32],
        top_k: usize,
        file_id: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let collection = match self.existing(project_id)? {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        if query.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = collection.current();
        let mut hits: Vec<SearchHit> = snapshot
            .records
            .values()
            .filter(|r| file_id.map_or(true, |f| r.file_id == f))
            .map(|r| SearchHit {
                chunk_id: r.id,
                file_id: r.file_id.clone(),
                order: r.order,
                similarity: self.metric.similarity(query, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| a.file_id.cmp(&b.file_id))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    /// Number of vectors in a project
    pub fn count(&self, project_id: &str) -> Result<usize> {
        Ok(self
            .existing(project_id)?
            .map(|c| c.current().records.len())
            .unwrap_or(0))
    }

    /// Number of vectors for one file
    pub fn count_file(&self, project_id: &str, file_id: &str) -> Result<usize> {
        Ok(self
            .existing(project_id)?
            .map(|c| {
                c.current()
                    .records
                    .values()
                    .filter(|r| r.file_id == file_id)
                    .count()
            })
            .unwrap_or(0))
    }

    /// Vector counts per file within a project
    pub fn file_counts(&self, project_id: &str) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        if let Some(collection) = self.existing(project_id)? {
            for record in collection.current().records.values() {
                *counts.entry(record.file_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Projects with a live collection
    pub fn projects(&self) -> Vec<String> {
        let mut projects: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        projects.sort();
        projects
    }

    /// Projects isolated at startup, with the load error
    pub fn corrupted_projects(&self) -> Vec<(String, String)> {
        let mut corrupted: Vec<(String, String)> = self
            .corrupted
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        corrupted.sort();
        corrupted
    }
}
