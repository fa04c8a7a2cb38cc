#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Random rotations used to augment training samples.
pub mod augment;

/// Batches of 3d points with a fixed number of points per item.
pub mod batch;

/// PCA plane fitting and circle targets derived from point loops.
pub mod fit;

/// Linear algebra utilities.
pub mod linalg;

/// Plane and circle descriptors.
pub mod plane;

/// Conversions between point slices and faer matrix views.
pub mod utils;

pub use batch::{GeomError, PointBatch};
pub use fit::{fit_circle, fit_plane, FitError, PlaneFit};
pub use plane::{CircleTarget, PlaneCoords, PlaneDescriptor, PlaneFrame};
