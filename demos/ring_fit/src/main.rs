use argh::FromArgs;
use std::path::PathBuf;

use handgeo::loss::{AngleMode, MseLoss, OnCircleLoss, OnCircleWeights, PlaneFitLoss, Reduction};
use handgeo::train::{
    AffineModel, LrSchedule, Model, ObjectiveConfig, RingGenerator, TrainConfig, Trainer,
};
use handgeo::k3d::augment::RandomRotation;
use rand::{rngs::StdRng, SeedableRng};

#[derive(FromArgs)]
/// Fit an affine correction to distorted rings with the on-circle loss
struct Args {
    /// number of epochs
    #[argh(option, default = "50")]
    epochs: usize,

    /// batch size
    #[argh(option, default = "16")]
    batch_size: usize,

    /// initial learning rate
    #[argh(option, default = "0.01")]
    learning_rate: f64,

    /// exponential learning rate decay per epoch
    #[argh(option, default = "0.95")]
    gamma: f64,

    /// number of generated rings
    #[argh(option, default = "256")]
    samples: usize,

    /// directory the checkpoints are written to
    #[argh(option, short = 'o', default = "PathBuf::from(\"output\")")]
    output_dir: PathBuf,

    /// resume from this checkpoint directory
    #[argh(option)]
    resume_dir: Option<PathBuf>,

    /// seed of the data generator and the trainer
    #[argh(option, default = "0")]
    seed: u64,

    /// rotate training samples by up to 15 degrees per axis
    #[argh(switch)]
    augment: bool,

    /// weight of the plane fitting loss, 0 disables it
    #[argh(option, default = "0.0")]
    plane_weight: f64,

    /// weight of the angular term of the on-circle loss
    #[argh(option, default = "0.0")]
    angle_weight: f64,

    /// weight of the squared error to the ground truth points, 0 disables it
    #[argh(option, default = "0.0")]
    mse_weight: f64,

    /// use the raw angle difference instead of the wrapped one
    #[argh(switch)]
    raw_angles: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let angle_mode = if args.raw_angles {
        AngleMode::Raw
    } else {
        AngleMode::Wrapped
    };

    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        schedule: LrSchedule::Exponential { gamma: args.gamma },
        objective: ObjectiveConfig {
            on_circle: OnCircleLoss::new()
                .with_weights(OnCircleWeights::with_angle(args.angle_weight))
                .with_angle_mode(angle_mode)
                .with_reduction(Reduction::Mean),
            plane_fit: (args.plane_weight > 0.0)
                .then(|| PlaneFitLoss::new(args.plane_weight).with_reduction(Reduction::Mean)),
            mse: (args.mse_weight > 0.0).then(|| MseLoss::new(args.mse_weight)),
        },
        output_dir: args.output_dir,
        seed: args.seed,
        augment: args.augment.then(RandomRotation::default),
        ..Default::default()
    };

    let generator = RingGenerator {
        center_range: 0.5,
        radius_range: (0.8, 1.2),
        offset: [0.1, -0.08, 0.05],
        noise: 1e-3,
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (train, valid) = generator.generate(args.samples, &mut rng)?.split(0.8);
    log::info!("Generated {} train and {} valid rings", train.samples().len(), valid.samples().len());

    let mut trainer = match &args.resume_dir {
        Some(dir) => Trainer::resume(config, AffineModel::new(), dir)?,
        None => Trainer::new(config, AffineModel::new())?,
    };

    let history = trainer.fit(&train, Some(&valid))?;
    for stats in &history {
        println!(
            "epoch {:>4}  lr {:.2e}  train {:.6e}  valid {}",
            stats.epoch,
            stats.learning_rate,
            stats.train_loss,
            stats
                .valid_loss
                .map_or_else(|| "-".to_string(), |v| format!("{v:.6e}"))
        );
    }

    let model = trainer.into_model();
    println!("matrix: {:?}", model.matrix());
    println!("translation: {:?}", model.translation());
    println!("parameters: {}", model.parameters().len());

    Ok(())
}
