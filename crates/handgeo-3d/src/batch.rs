use serde::{Deserialize, Serialize};

/// Error types for point batches.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeomError {
    /// The number of points per item must be positive.
    #[error("Number of points per batch item must be greater than zero")]
    EmptyItem,

    /// The flat point buffer does not split into whole batch items.
    #[error("Point buffer of length {len} is not a multiple of {points_per_item} points per item")]
    RaggedBatch {
        /// Length of the flat buffer.
        len: usize,
        /// Requested points per item.
        points_per_item: usize,
    },

    /// Two batches that must agree in shape do not.
    #[error("Batch shape mismatch: {left_name} {left:?} != {right_name} {right:?}")]
    ShapeMismatch {
        /// Label for the left-hand batch.
        left_name: &'static str,
        /// Shape (items, points) of the left-hand batch.
        left: (usize, usize),
        /// Label for the right-hand batch.
        right_name: &'static str,
        /// Shape (items, points) of the right-hand batch.
        right: (usize, usize),
    },
}

/// A batch of `batch_size` items with `points_per_item` 3d points each.
///
/// Points are stored flat, item after item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointBatch {
    points: Vec<[f64; 3]>,
    points_per_item: usize,
}

impl PointBatch {
    /// Create a batch from a flat buffer of points.
    ///
    /// # Arguments
    ///
    /// * `points` - The points of all items, item after item.
    /// * `points_per_item` - Number of points in each item.
    ///
    /// Example:
    ///
    /// ```
    /// use handgeo_3d::batch::PointBatch;
    ///
    /// let batch = PointBatch::new(vec![[0.0; 3]; 6], 3).unwrap();
    /// assert_eq!(batch.batch_size(), 2);
    /// ```
    pub fn new(points: Vec<[f64; 3]>, points_per_item: usize) -> Result<Self, GeomError> {
        if points_per_item == 0 {
            return Err(GeomError::EmptyItem);
        }
        if points.len() % points_per_item != 0 {
            return Err(GeomError::RaggedBatch {
                len: points.len(),
                points_per_item,
            });
        }
        Ok(Self {
            points,
            points_per_item,
        })
    }

    /// Create a batch by stacking items that must all have the same length.
    pub fn from_items<I, P>(items: I) -> Result<Self, GeomError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[[f64; 3]]>,
    {
        let mut points = Vec::new();
        let mut points_per_item = None;
        for item in items {
            let item = item.as_ref();
            match points_per_item {
                None => points_per_item = Some(item.len()),
                Some(n) if n != item.len() => {
                    return Err(GeomError::ShapeMismatch {
                        left_name: "first item",
                        left: (1, n),
                        right_name: "item",
                        right: (1, item.len()),
                    })
                }
                Some(_) => {}
            }
            points.extend_from_slice(item);
        }
        Self::new(points, points_per_item.unwrap_or(0))
    }

    /// Create a batch of zeros with the given shape.
    pub fn zeros(batch_size: usize, points_per_item: usize) -> Result<Self, GeomError> {
        Self::new(vec![[0.0; 3]; batch_size * points_per_item], points_per_item)
    }

    /// Number of items in the batch.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.points.len() / self.points_per_item
    }

    /// Number of points in each item.
    #[inline]
    pub fn points_per_item(&self) -> usize {
        self.points_per_item
    }

    /// Shape of the batch as (items, points per item).
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.batch_size(), self.points_per_item)
    }

    /// Get the points of the item at `index`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn item(&self, index: usize) -> &[[f64; 3]] {
        let start = index * self.points_per_item;
        &self.points[start..start + self.points_per_item]
    }

    /// Get the points of the item at `index` mutably.
    ///
    /// Panics if `index` is out of bounds.
    pub fn item_mut(&mut self, index: usize) -> &mut [[f64; 3]] {
        let start = index * self.points_per_item;
        &mut self.points[start..start + self.points_per_item]
    }

    /// Iterate over the items of the batch.
    pub fn items(&self) -> std::slice::Chunks<'_, [f64; 3]> {
        self.points.chunks(self.points_per_item)
    }

    /// Iterate mutably over the items of the batch.
    pub fn items_mut(&mut self) -> std::slice::ChunksMut<'_, [f64; 3]> {
        self.points.chunks_mut(self.points_per_item)
    }

    /// Get as reference all the points of the batch.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the batch and return the flat point buffer.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Check that `other` has the same shape as `self`.
    pub fn check_same_shape(
        &self,
        self_name: &'static str,
        other: &PointBatch,
        other_name: &'static str,
    ) -> Result<(), GeomError> {
        if self.shape() != other.shape() {
            return Err(GeomError::ShapeMismatch {
                left_name: self_name,
                left: self.shape(),
                right_name: other_name,
                right: other.shape(),
            });
        }
        Ok(())
    }
}
