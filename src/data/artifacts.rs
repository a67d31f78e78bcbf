//! Monte Carlo path artifacts.
//!
//! A stored artifact is the full trajectory matrix of one simulation plus its
//! time grid, bincode-encoded at single precision and zstd-compressed, written
//! once per job under `mc_paths_<jobId>.bin`. Reads decode the zstd stream
//! straight into bincode so only one copy of the matrix is ever materialized.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::config::{DEBUG_FLAGS, PERSISTENCE, artifact_blob_name};
use crate::data::blob::{BlobId, BlobStore};
use crate::models::{PathMatrix, PathSubset, PathsHandle};

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    job_id: &'a str,
    rows: usize,
    cols: usize,
    t: &'a [f32],
    data: &'a [f32],
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    #[allow(dead_code)]
    job_id: String,
    rows: usize,
    cols: usize,
    t: Vec<f32>,
    data: Vec<f32>,
}

/// Fixed-width little-endian encoding with a ceiling on decoded size
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(PERSISTENCE.artifacts.max_decoded_bytes)
}

pub struct PathArtifactStore {
    blobs: Arc<dyn BlobStore>,
}

impl PathArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub fn put(&self, job_id: &str, time_grid: &[f32], matrix: &PathMatrix) -> Result<PathsHandle> {
        if time_grid.len() != matrix.cols {
            bail!(
                "time grid has {} points but the path matrix has {} columns",
                time_grid.len(),
                matrix.cols
            );
        }
        if matrix.rows.checked_mul(matrix.cols) != Some(matrix.data.len()) {
            bail!("path matrix data does not match its {}x{} shape", matrix.rows, matrix.cols);
        }

        let artifact = ArtifactRef {
            version: PERSISTENCE.artifacts.version,
            job_id,
            rows: matrix.rows,
            cols: matrix.cols,
            t: time_grid,
            data: &matrix.data,
        };
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), PERSISTENCE.artifacts.compression_level)
            .context("Failed to create zstd encoder")?;
        codec()
            .serialize_into(&mut encoder, &artifact)
            .context(format!("Failed to serialize paths for job {}", job_id))?;
        let bytes = encoder.finish().context("Failed to finish zstd stream")?;

        let name = artifact_blob_name(job_id);
        let size = bytes.len();
        let blob_id = self
            .blobs
            .put(&name, bytes)
            .context(format!("Failed to store {}", name))?;

        if DEBUG_FLAGS.print_artifact_io {
            log::info!(
                "Stored {} ({}x{}, {} bytes compressed) as {}",
                name,
                matrix.rows,
                matrix.cols,
                size,
                blob_id
            );
        }

        Ok(PathsHandle {
            blob_id: blob_id.0,
            n_total: matrix.rows,
            steps_total: matrix.cols,
        })
    }

    /// First `limit` rows (clamped to `[1, totalRows]`), every `stride`-th time point.
    /// `Ok(None)` when the blob does not exist.
    pub fn get_subset(&self, blob_id: &BlobId, limit: usize, stride: usize) -> Result<Option<PathSubset>> {
        let Some(reader) = self.blobs.open(blob_id)? else {
            return Ok(None);
        };
        let decoder = zstd::stream::read::Decoder::new(reader)
            .context(format!("Failed to open zstd stream for blob {}", blob_id))?;
        let artifact: Artifact = codec()
            .deserialize_from(decoder)
            .context(format!("Failed to decode path artifact {}", blob_id))?;

        if artifact.version != PERSISTENCE.artifacts.version {
            bail!(
                "Unsupported path artifact version {} in blob {}",
                artifact.version,
                blob_id
            );
        }
        let expected = artifact
            .rows
            .checked_mul(artifact.cols)
            .ok_or_else(|| anyhow!("Corrupt path artifact {}: shape overflows", blob_id))?;
        if artifact.data.len() != expected || artifact.t.len() != artifact.cols {
            bail!("Corrupt path artifact {}: data does not match shape", blob_id);
        }

        let stride = stride.max(1);
        let limit = limit.clamp(1, artifact.rows.max(1)).min(artifact.rows);

        let time_axis: Vec<f32> = artifact.t.iter().step_by(stride).copied().collect();
        let rows: Vec<Vec<f32>> = artifact
            .data
            .chunks_exact(artifact.cols.max(1))
            .take(limit)
            .map(|row| row.iter().step_by(stride).copied().collect())
            .collect();

        if DEBUG_FLAGS.print_artifact_io {
            log::info!(
                "Served {} rows x {} points from blob {}",
                rows.len(),
                time_axis.len(),
                blob_id
            );
        }

        Ok(Some(PathSubset {
            time_axis,
            rows,
            total_rows: artifact.rows,
            total_cols: artifact.cols,
        }))
    }

    /// Looks the artifact up by its per-job blob name
    pub fn subset_for_job(&self, job_id: &str, limit: usize, stride: usize) -> Result<Option<PathSubset>> {
        let name = artifact_blob_name(job_id);
        match self.blobs.find_by_name(&name)? {
            Some(blob_id) => self.get_subset(&blob_id, limit, stride),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::blob::{FsBlobStore, MemoryBlobStore};
    use crate::utils::maths_utils::linspace_f32;

    fn matrix(rows: usize, cols: usize) -> PathMatrix {
        let mut m = PathMatrix::zeros(rows, cols).unwrap();
        for (i, v) in m.data.iter_mut().enumerate() {
            *v = i as f32;
        }
        m
    }

    #[test]
    fn subset_strides_time_and_limits_rows() {
        let store = PathArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        let m = matrix(100, 253);
        let t = linspace_f32(0.0, 1.0, 253);
        let handle = store.put("job1", &t, &m).unwrap();
        assert_eq!(handle.n_total, 100);
        assert_eq!(handle.steps_total, 253);

        let subset = store.subset_for_job("job1", 5, 2).unwrap().unwrap();
        assert_eq!(subset.time_axis.len(), 127);
        assert_eq!(subset.rows.len(), 5);
        assert!(subset.rows.iter().all(|r| r.len() == 127));
        assert_eq!(subset.total_rows, 100);
        assert_eq!(subset.total_cols, 253);
        // second row, third kept column = original column 4
        assert_eq!(subset.rows[1][2], (253 + 4) as f32);
    }

    #[test]
    fn limit_and_stride_are_clamped() {
        let store = PathArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        let m = matrix(3, 4);
        store.put("job2", &linspace_f32(0.0, 1.0, 4), &m).unwrap();

        let subset = store.subset_for_job("job2", 0, 0).unwrap().unwrap();
        assert_eq!(subset.rows.len(), 1);
        assert_eq!(subset.time_axis.len(), 4);

        let subset = store.subset_for_job("job2", 1_000, 1).unwrap().unwrap();
        assert_eq!(subset.rows.len(), 3);
    }

    #[test]
    fn missing_artifact_is_none() {
        let store = PathArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        assert!(store.subset_for_job("nope", 10, 1).unwrap().is_none());
        assert!(store.get_subset(&BlobId("nope".into()), 10, 1).unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let store = PathArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        assert!(store.put("bad", &[0.0, 1.0], &matrix(2, 3)).is_err());
    }

    #[test]
    fn file_backed_artifacts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let t = linspace_f32(0.0, 0.5, 11);
        {
            let store = PathArtifactStore::new(Arc::new(FsBlobStore::new(dir.path()).unwrap()));
            store.put("job3", &t, &matrix(20, 11)).unwrap();
        }
        let store = PathArtifactStore::new(Arc::new(FsBlobStore::new(dir.path()).unwrap()));
        let subset = store.subset_for_job("job3", 2, 5).unwrap().unwrap();
        assert_eq!(subset.time_axis, vec![t[0], t[5], t[10]]);
        assert_eq!(subset.rows[0], vec![0.0, 5.0, 10.0]);
    }

    fn stored(blobs: &Arc<MemoryBlobStore>, job_id: &str, encoded: &[u8]) -> BlobId {
        let bytes = zstd::stream::encode_all(encoded, 3).unwrap();
        blobs.put(&artifact_blob_name(job_id), bytes).unwrap()
    }

    #[test]
    fn corrupt_blobs_are_errors() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = PathArtifactStore::new(blobs.clone());

        // not a zstd stream at all
        let id = blobs.put(&artifact_blob_name("junk"), vec![1, 2, 3, 4]).unwrap();
        assert!(store.get_subset(&id, 10, 1).is_err());

        // a header whose shape overflows
        let header = ArtifactRef {
            version: PERSISTENCE.artifacts.version,
            job_id: "huge",
            rows: usize::MAX,
            cols: 2,
            t: &[0.0, 1.0],
            data: &[1.0, 2.0],
        };
        let id = stored(&blobs, "huge", &codec().serialize(&header).unwrap());
        let err = store.get_subset(&id, 10, 1).unwrap_err();
        assert!(err.to_string().contains("shape overflows"));

        // a data length prefix far beyond the decode ceiling
        let mut bytes = codec()
            .serialize(&(PERSISTENCE.artifacts.version, "liar", 1usize, 1usize, vec![0.0f32]))
            .unwrap();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        let id = stored(&blobs, "liar", &bytes);
        assert!(store.get_subset(&id, 10, 1).is_err());
    }
}
