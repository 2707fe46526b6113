use crate::image_loader::ImageSample;
use crate::interactions::{ItemId, UserId};
use crate::sampler::Triple;
use anyhow::{bail, Context, Result};
use ndarray::{stack, Array1, Array3, Array4, ArrayView3, Axis};

/// One pairwise training example: a triple plus both item images.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRecord {
    pub user: UserId,
    pub positive: ItemId,
    pub positive_image: Array3<f32>,
    pub negative: ItemId,
    pub negative_image: Array3<f32>,
}

impl TrainingRecord {
    pub fn new(triple: Triple, positive: ImageSample, negative: ImageSample) -> Self {
        Self {
            user: triple.user,
            positive: triple.positive,
            positive_image: positive.pixels,
            negative: triple.negative,
            negative_image: negative.pixels,
        }
    }

    pub fn triple(&self) -> Triple {
        Triple {
            user: self.user,
            positive: self.positive,
            negative: self.negative,
        }
    }
}

/// Records in generation order. The pipeline only ever emits batches of
/// exactly the configured batch size.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<TrainingRecord>,
}

impl Batch {
    pub(crate) fn new(records: Vec<TrainingRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TrainingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TrainingRecord> {
        self.records
    }

    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.records.iter().map(TrainingRecord::triple)
    }

    /// Stacks the records column-wise, images along a new leading axis.
    pub fn stack(&self) -> Result<StackedBatch> {
        StackedBatch::from_records(&self.records)
    }
}

impl IntoIterator for Batch {
    type Item = TrainingRecord;
    type IntoIter = std::vec::IntoIter<TrainingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Column-wise form of a [`Batch`], ready to feed a training step.
///
/// Image arrays have shape `(batch, height, width, 3)`.
#[derive(Debug, Clone)]
pub struct StackedBatch {
    pub users: Array1<UserId>,
    pub positives: Array1<ItemId>,
    pub positive_images: Array4<f32>,
    pub negatives: Array1<ItemId>,
    pub negative_images: Array4<f32>,
}

impl StackedBatch {
    fn from_records(records: &[TrainingRecord]) -> Result<Self> {
        if records.is_empty() {
            bail!("Cannot stack an empty batch");
        }

        let reference = records[0].positive_image.dim();
        for (i, record) in records.iter().enumerate() {
            for (side, image) in [
                ("positive", &record.positive_image),
                ("negative", &record.negative_image),
            ] {
                if image.dim() != reference {
                    bail!(
                        "Shape mismatch in record {} ({} image): expected {:?}, got {:?}",
                        i,
                        side,
                        reference,
                        image.dim()
                    );
                }
            }
        }

        let positive_views: Vec<ArrayView3<f32>> =
            records.iter().map(|r| r.positive_image.view()).collect();
        let negative_views: Vec<ArrayView3<f32>> =
            records.iter().map(|r| r.negative_image.view()).collect();

        Ok(Self {
            users: records.iter().map(|r| r.user).collect(),
            positives: records.iter().map(|r| r.positive).collect(),
            positive_images: stack(Axis(0), &positive_views)
                .context("Failed to stack positive images")?,
            negatives: records.iter().map(|r| r.negative).collect(),
            negative_images: stack(Axis(0), &negative_views)
                .context("Failed to stack negative images")?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(user: UserId, fill: f32, dim: (usize, usize)) -> TrainingRecord {
        let triple = Triple {
            user,
            positive: user + 10,
            negative: user + 20,
        };
        let image = |item, value| ImageSample {
            item,
            pixels: Array3::from_elem((dim.0, dim.1, 3), value),
        };
        TrainingRecord::new(triple, image(user + 10, fill), image(user + 20, -fill))
    }

    #[test]
    fn test_stack_preserves_order_and_shape() -> Result<()> {
        let batch = Batch::new(vec![
            make_record(1, 0.25, (2, 3)),
            make_record(2, 0.5, (2, 3)),
            make_record(3, 0.75, (2, 3)),
        ]);
        let stacked = batch.stack()?;

        assert_eq!(stacked.batch_size(), 3);
        assert_eq!(stacked.users.to_vec(), vec![1, 2, 3]);
        assert_eq!(stacked.positives.to_vec(), vec![11, 12, 13]);
        assert_eq!(stacked.negatives.to_vec(), vec![21, 22, 23]);
        assert_eq!(stacked.positive_images.dim(), (3, 2, 3, 3));
        assert_eq!(stacked.positive_images[[1, 0, 0, 0]], 0.5);
        assert_eq!(stacked.negative_images[[2, 1, 2, 2]], -0.75);
        Ok(())
    }

    #[test]
    fn test_stack_rejects_empty_and_mismatched() {
        assert!(Batch::new(vec![]).stack().is_err());

        let mixed = Batch::new(vec![make_record(1, 0.0, (2, 2)), make_record(2, 0.0, (3, 2))]);
        let err = mixed.stack().unwrap_err();
        assert!(err.to_string().contains("Shape mismatch in record 1"));
    }

    #[test]
    fn test_batch_accessors() {
        let batch = Batch::new(vec![make_record(4, 0.0, (1, 1)), make_record(5, 0.0, (1, 1))]);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        let users: Vec<_> = batch.triples().map(|t| t.user).collect();
        assert_eq!(users, vec![4, 5]);
        assert_eq!(batch.into_iter().count(), 2);
    }
}
