use handgeo_3d::{
    augment::rotate_points_inplace,
    fit::{fit_plane, loop_perimeter},
    linalg::{add_vec3, mat33_mul_vec3},
    CircleTarget, PlaneDescriptor, PlaneFrame, PlaneCoords, PointBatch,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::TrainError;

/// One training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Points fed to the model.
    pub input: Vec<[f64; 3]>,
    /// Ground truth points matched one to one with the model output.
    pub reference: Vec<[f64; 3]>,
    /// Circle the reference points lie on.
    pub target: CircleTarget,
    /// PCA plane of the reference points.
    pub plane: PlaneDescriptor,
}

impl Sample {
    /// Build a sample whose plane and circle are fitted from the reference
    /// points, taken as an ordered loop.
    pub fn from_reference_loop(
        input: Vec<[f64; 3]>,
        reference: Vec<[f64; 3]>,
    ) -> Result<Self, TrainError> {
        let fit = fit_plane(&reference)?;
        let target = CircleTarget::from_perimeter(fit.mean, fit.normal(), loop_perimeter(&reference));
        Ok(Self {
            input,
            reference,
            target,
            plane: fit.descriptor(),
        })
    }

    /// Rotate every point, the circle and the plane about the origin.
    pub fn rotated(&self, rotation: &[[f64; 3]; 3]) -> Self {
        let mut input = self.input.clone();
        rotate_points_inplace(&mut input, rotation);
        let mut reference = self.reference.clone();
        rotate_points_inplace(&mut reference, rotation);
        Self {
            input,
            reference,
            target: self.target.rotated(rotation),
            plane: PlaneDescriptor::new(
                mat33_mul_vec3(rotation, &self.plane.mean),
                [
                    mat33_mul_vec3(rotation, &self.plane.components[0]),
                    mat33_mul_vec3(rotation, &self.plane.components[1]),
                ],
            ),
        }
    }
}

/// A random-access collection of samples.
pub trait Dataset {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Get the sample at `index`.
    fn get(&self, index: usize) -> Option<&Sample>;

    /// Whether the dataset has no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset holding all of its samples in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryDataset {
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    /// Create a dataset from samples.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Split into a train and a test dataset, the first `ratio` of the
    /// samples going to the train split.
    pub fn split(self, ratio: f64) -> (Self, Self) {
        let n_train = ((self.samples.len() as f64) * ratio.clamp(0.0, 1.0)).round() as usize;
        let mut train = self.samples;
        let test = train.split_off(n_train);
        (Self::new(train), Self::new(test))
    }

    /// Get as reference the samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }
}

/// A stack of samples ready for the losses.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Model inputs.
    pub input: PointBatch,
    /// Ground truth points.
    pub reference: PointBatch,
    /// Circle of each item.
    pub targets: Vec<CircleTarget>,
    /// Plane of each item.
    pub planes: Vec<PlaneDescriptor>,
}

impl Batch {
    /// Stack samples that all have the same number of points.
    pub fn collate<'a, I>(samples: I) -> Result<Self, TrainError>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let samples: Vec<&Sample> = samples.into_iter().collect();
        Ok(Self {
            input: PointBatch::from_items(samples.iter().map(|s| &s.input))?,
            reference: PointBatch::from_items(samples.iter().map(|s| &s.reference))?,
            targets: samples.iter().map(|s| s.target).collect(),
            planes: samples.iter().map(|s| s.plane).collect(),
        })
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Generator of synthetic rings of points with a known circle.
///
/// Reference points are evenly spaced on a random circle; the model input is
/// the reference loop passed through a fixed affine distortion plus uniform
/// noise, so a model has something to undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingGenerator {
    /// Number of points per ring.
    pub num_points: usize,
    /// Maximum absolute coordinate of the ring center.
    pub center_range: f64,
    /// Range of ring radii.
    pub radius_range: (f64, f64),
    /// Maximum absolute noise added to each input coordinate.
    pub noise: f64,
    /// Linear part of the input distortion, row-major.
    pub distortion: [[f64; 3]; 3],
    /// Translation part of the input distortion.
    pub offset: [f64; 3],
}

impl Default for RingGenerator {
    fn default() -> Self {
        Self {
            num_points: 32,
            center_range: 0.05,
            radius_range: (0.03, 0.05),
            noise: 2e-4,
            distortion: [[1.1, 0.0, 0.0], [0.0, 0.9, 0.0], [0.0, 0.0, 1.05]],
            offset: [0.005, -0.004, 0.002],
        }
    }
}

impl RingGenerator {
    /// Generate one sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Sample, TrainError> {
        let c = self.center_range.abs();
        let center = [
            rng.random_range(-c..=c),
            rng.random_range(-c..=c),
            rng.random_range(-c..=c),
        ];
        let normal = random_unit_vector(rng);
        let (r_min, r_max) = self.radius_range;
        let radius = rng.random_range(r_min.min(r_max)..=r_max.max(r_min));
        let phase = rng.random_range(0.0..std::f64::consts::TAU);

        let frame = PlaneFrame::new(center, &normal);
        let n = self.num_points.max(3);
        let reference: Vec<[f64; 3]> = (0..n)
            .map(|i| {
                let theta = phase + std::f64::consts::TAU * i as f64 / n as f64;
                frame.point(&PlaneCoords {
                    height: 0.0,
                    x: radius * theta.cos(),
                    y: radius * theta.sin(),
                })
            })
            .collect();

        let input = reference
            .iter()
            .map(|p| {
                let mut q = add_vec3(&mat33_mul_vec3(&self.distortion, p), &self.offset);
                if self.noise > 0.0 {
                    for v in q.iter_mut() {
                        *v += rng.random_range(-self.noise..=self.noise);
                    }
                }
                q
            })
            .collect();

        Sample::from_reference_loop(input, reference)
    }

    /// Generate an in-memory dataset of `len` samples.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        len: usize,
        rng: &mut R,
    ) -> Result<InMemoryDataset, TrainError> {
        let samples = (0..len)
            .map(|_| self.sample(rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InMemoryDataset::new(samples))
    }
}

fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> [f64; 3] {
    loop {
        let v = [
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        ];
        let norm2: f64 = v.iter().map(|x| x * x).sum();
        if norm2 > 1e-6 && norm2 <= 1.0 {
            let norm = norm2.sqrt();
            return [v[0] / norm, v[1] / norm, v[2] / norm];
        }
    }
}
