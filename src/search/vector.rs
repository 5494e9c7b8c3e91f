//! Vector Index: a persistent cosine-similarity store over chunk
//! embeddings, with an HNSW approximate index when `usearch-hnsw` is
//! enabled and a deterministic brute-force cosine scan otherwise.
//!
//! The index directory holds three sidecar artifacts: `points.json` (one
//! entry per chunk: its id, vector, and full payload so generation never
//! needs a text lookup back to the chunk store), `meta.json` (the
//! embedder name and dimension the index was built with), and, when
//! `usearch-hnsw` is enabled, `hnsw.usearch` plus its row-id map. A
//! `.lock` file next to the directory is the embedded store's exclusive
//! writer lock, acquired through an RAII guard so every exit path,
//! panics included, releases it.

use crate::embedding::cosine_similarity;
use crate::error::{Error, IndexError, Result};
use crate::model::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[cfg(feature = "usearch-hnsw")]
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Embedder identity persisted alongside the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorIndexMeta {
    /// Name of the embedder the index was built with.
    pub embedder_name: String,
    /// Embedding dimension the index was built with.
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorPoint {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// HNSW tuning knobs, matched to the multilingual encoder's dimensionality
/// by default.
#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Max connections per node (M).
    pub connectivity: usize,
    /// Search depth used while building the index (`ef_construction`).
    pub expansion_add: usize,
    /// Search depth used while querying (`ef_search`).
    pub expansion_search: usize,
}

impl HnswConfig {
    /// Default tuning at the given dimensionality.
    #[must_use]
    pub const fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

/// Exclusive writer lock over a vector index directory. Acquired with
/// `O_EXCL`-style atomic file creation so two writers racing for the same
/// directory cannot both proceed; released automatically on drop.
#[derive(Debug)]
pub struct VectorStoreLock {
    path: PathBuf,
}

impl VectorStoreLock {
    /// Attempts to acquire the exclusive lock for `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnavailable`] with [`IndexError::Locked`] if
    /// another writer already holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| IndexError::Io(e.to_string()))?;
        let path = dir.join(".lock");
        match File::options().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::IndexUnavailable(IndexError::Locked)),
            Err(e) => Err(IndexError::Io(e.to_string()).into()),
        }
    }
}

impl Drop for VectorStoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Persistent cosine-similarity vector index.
pub struct VectorIndex {
    meta: VectorIndexMeta,
    points: Vec<VectorPoint>,
    #[cfg(feature = "usearch-hnsw")]
    hnsw: Option<(Index, HashMap<u64, usize>)>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("meta", &self.meta)
            .field("len", &self.points.len())
            .finish()
    }
}

impl VectorIndex {
    /// Builds a full index from parallel `chunks`/`embeddings` slices,
    /// replacing any prior collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `chunks` and `embeddings` differ in
    /// length, or if any embedding's length disagrees with `dimensions`.
    pub fn build(chunks: &[Chunk], embeddings: &[Vec<f32>], embedder_name: &str, dimensions: usize) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Validation(format!(
                "chunk count {} does not match embedding count {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        for vector in embeddings {
            if vector.len() != dimensions {
                return Err(Error::Validation(format!(
                    "embedding has {} dimensions, expected {dimensions}",
                    vector.len()
                )));
            }
        }

        let points: Vec<VectorPoint> = chunks
            .iter()
            .cloned()
            .zip(embeddings.iter().cloned())
            .map(|(chunk, vector)| VectorPoint { chunk, vector })
            .collect();

        let hnsw = Self::build_hnsw(&points, dimensions);

        Ok(Self {
            meta: VectorIndexMeta {
                embedder_name: embedder_name.to_string(),
                dimensions,
            },
            points,
            #[cfg(feature = "usearch-hnsw")]
            hnsw,
        })
    }

    #[cfg(feature = "usearch-hnsw")]
    fn build_hnsw(points: &[VectorPoint], dimensions: usize) -> Option<(Index, HashMap<u64, usize>)> {
        let config = HnswConfig::with_dimensions(dimensions);
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).ok()?;
        let mut row_of_key = HashMap::new();
        for (row, point) in points.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let key = row as u64;
            if index.add(key, &point.vector).is_ok() {
                row_of_key.insert(key, row);
            }
        }
        Some((index, row_of_key))
    }

    #[cfg(not(feature = "usearch-hnsw"))]
    const fn build_hnsw(_points: &[VectorPoint], _dimensions: usize) -> Option<()> {
        None
    }

    /// Number of points in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True iff the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The embedder identity this index was built with.
    #[must_use]
    pub const fn meta(&self) -> &VectorIndexMeta {
        &self.meta
    }

    /// Returns the top-`k` chunks by cosine similarity to `query_vec`, with
    /// scores in `[-1, 1]` descending. Uses the HNSW index
    /// when available, otherwise an exact brute-force scan.
    #[must_use]
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<(Chunk, f32)> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }

        #[cfg(feature = "usearch-hnsw")]
        if let Some((index, row_of_key)) = &self.hnsw {
            if let Ok(results) = index.search(query_vec, k) {
                let mut out = Vec::with_capacity(results.keys.len());
                for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
                    if let Some(&row) = row_of_key.get(key) {
                        out.push((self.points[row].chunk.clone(), 1.0 - distance));
                    }
                }
                return out;
            }
        }

        self.brute_force_search(query_vec, k)
    }

    fn brute_force_search(&self, query_vec: &[f32], k: usize) -> Vec<(Chunk, f32)> {
        let mut scored: Vec<(Chunk, f32)> = self
            .points
            .iter()
            .map(|point| (point.chunk.clone(), cosine_similarity(query_vec, &point.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
        });
        scored.truncate(k);
        scored
    }

    /// Persists `points.json` and `meta.json` into `dir`, and, when
    /// `usearch-hnsw` is enabled, the HNSW artifact alongside them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnavailable`] on any I/O failure.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| IndexError::Io(e.to_string()))?;

        let points_json = serde_json::to_string(&self.points).map_err(|e| IndexError::Io(e.to_string()))?;
        fs::write(dir.join("points.json"), points_json).map_err(|e| IndexError::Io(e.to_string()))?;

        let meta_json = serde_json::to_string(&self.meta).map_err(|e| IndexError::Io(e.to_string()))?;
        fs::write(dir.join("meta.json"), meta_json).map_err(|e| IndexError::Io(e.to_string()))?;

        #[cfg(feature = "usearch-hnsw")]
        if let Some((index, row_of_key)) = &self.hnsw {
            let index_path = dir.join("hnsw.usearch");
            let path_str = index_path.to_str().ok_or_else(|| IndexError::Io("non-UTF8 index path".to_string()))?;
            index.save(path_str).map_err(|e| IndexError::Io(e.to_string()))?;
            let map_json = serde_json::to_string(&row_of_key.iter().map(|(k, v)| (k.to_string(), *v)).collect::<HashMap<_, _>>())
                .map_err(|e| IndexError::Io(e.to_string()))?;
            fs::write(dir.join("hnsw.map"), map_json).map_err(|e| IndexError::Io(e.to_string()))?;
        }

        Ok(())
    }

    /// Loads a previously-saved index from `dir`, verifying the persisted
    /// embedder identity matches `configured_embedder_name`/`configured_dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnavailable`] with [`IndexError::Missing`] if
    /// the directory has no `points.json`/`meta.json`, or
    /// [`IndexError::EmbedderMismatch`] if the persisted embedder identity
    /// does not match the configured one.
    pub fn load(dir: &Path, configured_embedder_name: &str, configured_dimensions: usize) -> Result<Self> {
        let points_path = dir.join("points.json");
        let meta_path = dir.join("meta.json");
        if !points_path.exists() || !meta_path.exists() {
            return Err(Error::IndexUnavailable(IndexError::Missing {
                path: dir.display().to_string(),
            }));
        }

        let meta_text = fs::read_to_string(&meta_path).map_err(|e| IndexError::Io(e.to_string()))?;
        let meta: VectorIndexMeta = serde_json::from_str(&meta_text).map_err(|e| IndexError::Io(e.to_string()))?;

        if meta.embedder_name != configured_embedder_name || meta.dimensions != configured_dimensions {
            return Err(Error::IndexUnavailable(IndexError::EmbedderMismatch {
                built_with: meta.embedder_name,
                built_dim: meta.dimensions,
                configured: configured_embedder_name.to_string(),
                configured_dim: configured_dimensions,
            }));
        }

        let points_text = fs::read_to_string(&points_path).map_err(|e| IndexError::Io(e.to_string()))?;
        let points: Vec<VectorPoint> = serde_json::from_str(&points_text).map_err(|e| IndexError::Io(e.to_string()))?;

        let hnsw = Self::load_hnsw(dir, meta.dimensions);

        Ok(Self {
            meta,
            points,
            #[cfg(feature = "usearch-hnsw")]
            hnsw,
        })
    }

    #[cfg(feature = "usearch-hnsw")]
    fn load_hnsw(dir: &Path, dimensions: usize) -> Option<(Index, HashMap<u64, usize>)> {
        let index_path = dir.join("hnsw.usearch");
        let map_path = dir.join("hnsw.map");
        if !index_path.exists() || !map_path.exists() {
            return None;
        }
        let config = HnswConfig::with_dimensions(dimensions);
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).ok()?;
        let path_str = index_path.to_str()?;
        index.load(path_str).ok()?;

        let map_text = fs::read_to_string(&map_path).ok()?;
        let raw: HashMap<String, usize> = serde_json::from_str(&map_text).ok()?;
        let row_of_key = raw.into_iter().filter_map(|(k, v)| k.parse::<u64>().ok().map(|key| (key, v))).collect();
        Some((index, row_of_key))
    }

    #[cfg(not(feature = "usearch-hnsw"))]
    const fn load_hnsw(_dir: &Path, _dimensions: usize) -> Option<()> {
        None
    }
}
