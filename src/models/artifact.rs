use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::utils::Payload;

/// Reference to a persisted path artifact, embedded in job results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsHandle {
    pub blob_id: String,
    /// Stored trajectories
    pub n_total: usize,
    /// Stored time points per trajectory (steps + 1)
    pub steps_total: usize,
}

impl PathsHandle {
    pub fn to_payload(&self) -> Payload {
        Payload::object()
            .with("blobId", self.blob_id.as_str())
            .with("nTotal", self.n_total)
            .with("stepsTotal", self.steps_total)
    }
}

/// Row-major trajectory matrix. Row = one path, column 0 = initial spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl PathMatrix {
    /// Fails instead of aborting when the matrix cannot be sized or allocated
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| anyhow!("path matrix {} x {} overflows", rows, cols))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .context(format!("allocate path matrix {} x {}", rows, cols))?;
        data.resize(len, 0.0);
        Ok(Self { rows, cols, data })
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

/// A subsampled view of a stored artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSubset {
    pub time_axis: Vec<f32>,
    pub rows: Vec<Vec<f32>>,
    /// Totals of the stored artifact, not of the subset
    pub total_rows: usize,
    pub total_cols: usize,
}

impl PathSubset {
    /// JSON form with single-precision values widened and non-finite values nulled
    pub fn to_payload(&self) -> Payload {
        let time_axis = self.time_axis.iter().copied().map(Payload::from).collect::<Vec<_>>();
        let rows = self
            .rows
            .iter()
            .map(|row| Payload::List(row.iter().copied().map(Payload::from).collect()))
            .collect::<Vec<_>>();
        Payload::object()
            .with("timeAxis", Payload::List(time_axis))
            .with("rows", Payload::List(rows))
            .with("totalRows", self.total_rows)
            .with("totalCols", self.total_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sanitize;
    use serde_json::json;

    #[test]
    fn subset_payload_widens_single_precision() {
        let subset = PathSubset {
            time_axis: vec![0.0, 0.1],
            rows: vec![vec![100.0, f32::NAN]],
            total_rows: 10,
            total_cols: 2,
        };
        assert_eq!(
            sanitize(&subset.to_payload()),
            json!({"timeAxis": [0.0, 0.1], "rows": [[100.0, null]], "totalRows": 10, "totalCols": 2})
        );
    }

    #[test]
    fn matrix_rows_are_contiguous() {
        let mut m = PathMatrix::zeros(2, 3).unwrap();
        m.data[3..].copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(m.row(1), &[1.0, 2.0, 3.0]);
        assert!(!m.is_empty());
    }

    #[test]
    fn oversized_matrix_is_an_error() {
        assert!(PathMatrix::zeros(usize::MAX, 2).is_err());
        assert!(PathMatrix::zeros(usize::MAX / 2, 1).is_err());
    }
}
