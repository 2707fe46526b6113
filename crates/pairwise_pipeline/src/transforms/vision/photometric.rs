use crate::transforms::Transform;
use anyhow::{ensure, Result};
use ndarray::{Array3, Axis};

// ============================================================================
// Normalize
// ============================================================================

/// Normalizes channel-last arrays with per-channel statistics.
///
/// # Mathematical Operation:
/// ```text
/// output[h, w, c] = (input[h, w, c] - mean[c]) / std[c]
/// ```
///
/// With `mean = std = 127.5` on every channel, 8-bit values map onto
/// `[-1.0, 1.0]`, the scaling the item images are trained with.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self> {
        ensure!(!mean.is_empty(), "Normalization mean cannot be empty");
        ensure!(
            mean.len() == std.len(),
            "Normalization mean has {} channels but std has {}",
            mean.len(),
            std.len()
        );
        ensure!(
            std.iter().all(|s| *s != 0.0),
            "Normalization std must be non-zero (got {:?})",
            std
        );
        Ok(Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }
}

impl Transform<Array3<f32>, Array3<f32>> for Normalize {
    fn apply(&self, mut array: Array3<f32>) -> Result<Array3<f32>> {
        let channels = array.len_of(Axis(2));
        ensure!(
            channels == self.mean.len(),
            "Channel count mismatch: input has {} channels but normalization expects {}",
            channels,
            self.mean.len()
        );

        for (c, mut plane) in array.axis_iter_mut(Axis(2)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            plane.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_maps_byte_range() -> Result<()> {
        let mut array = Array3::<f32>::zeros((1, 3, 3));
        array[[0, 1, 0]] = 127.5;
        array[[0, 2, 2]] = 255.0;

        let out = Normalize::new(&[127.5; 3], &[127.5; 3])?.apply(array)?;
        assert_eq!(out[[0, 0, 0]], -1.0);
        assert_eq!(out[[0, 1, 0]], 0.0);
        assert_eq!(out[[0, 2, 2]], 1.0);
        Ok(())
    }

    #[test]
    fn test_per_channel_statistics() -> Result<()> {
        let array = Array3::<f32>::from_elem((2, 2, 2), 4.0);
        let out = Normalize::new(&[2.0, 0.0], &[1.0, 4.0])?.apply(array)?;
        assert!(out.index_axis(Axis(2), 0).iter().all(|v| *v == 2.0));
        assert!(out.index_axis(Axis(2), 1).iter().all(|v| *v == 1.0));
        Ok(())
    }

    #[test]
    fn test_channel_mismatch_and_bad_params() -> Result<()> {
        let array = Array3::<f32>::zeros((2, 2, 1));
        assert!(Normalize::new(&[127.5; 3], &[127.5; 3])?.apply(array).is_err());
        assert!(Normalize::new(&[], &[]).is_err());
        assert!(Normalize::new(&[0.0], &[0.0]).is_err());
        assert!(Normalize::new(&[0.0, 1.0], &[1.0]).is_err());
        Ok(())
    }
}
