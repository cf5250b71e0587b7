//! Gradient Check for a Fully Connected Network
//!
//! Builds a `FullyConnectedNet` from command-line flags or a JSON config
//! file, runs one training-mode `loss` call on random data, and compares
//! every parameter gradient with a centered finite-difference estimate.
//!
//! ## Usage
//!
//! ```bash
//! # Two hidden layers with batchnorm
//! cargo run --example gradient_check -- --hidden 20,30 --batchnorm
//!
//! # Dropout needs a fixed seed so the loss is deterministic
//! cargo run --example gradient_check -- --hidden 20 --dropout 0.5 --seed 123
//!
//! # Load the network from a config file
//! cargo run --example gradient_check -- --config net.json
//!
//! # Show per-layer tracing output
//! RUST_LOG=trace cargo run --example gradient_check
//! ```

use clap::Parser;
use fcnet::gradients::{check_model_gradients, compute_grad_norm};
use fcnet::{Classifier, Dtype, FullyConnectedConfig, FullyConnectedNet, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;

#[derive(Parser)]
#[command(
    name = "gradient_check",
    about = "Compare analytic and numerical gradients of a fully connected network"
)]
struct Args {
    /// JSON network config; overrides the architecture flags below
    #[arg(long)]
    config: Option<String>,

    /// Comma-separated hidden layer widths
    #[arg(long, value_delimiter = ',', default_value = "20,30")]
    hidden: Vec<usize>,

    /// Input dimension
    #[arg(long, default_value = "15")]
    input_dim: usize,

    /// Number of classes
    #[arg(long, default_value = "10")]
    classes: usize,

    /// Enable batch normalization
    #[arg(long)]
    batchnorm: bool,

    /// Dropout probability
    #[arg(long, default_value = "0.0")]
    dropout: f64,

    /// Dropout seed
    #[arg(long)]
    seed: Option<u64>,

    /// L2 regularization strengths to check
    #[arg(long, value_delimiter = ',', default_value = "0.0,3.14")]
    reg: Vec<f64>,

    /// Standard deviation of the initial weights
    #[arg(long, default_value = "0.05")]
    weight_scale: f64,

    /// Batch size of the random data
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Finite-difference step
    #[arg(long, default_value = "1e-5")]
    step: f64,

    /// Seed for data and weights
    #[arg(long, default_value = "231")]
    data_seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let base = match &args.config {
        Some(path) => FullyConnectedConfig::from_json(&fs::read_to_string(path)?)?,
        None => {
            let mut config =
                FullyConnectedConfig::new(args.hidden.clone(), args.input_dim, args.classes)
                    .with_batchnorm(args.batchnorm)
                    .with_dropout(args.dropout)
                    .with_weight_scale(args.weight_scale);
            config.seed = args.seed;
            config
        }
    };

    if base.dropout > 0.0 && base.seed.is_none() {
        eprintln!("Warning: dropout without --seed gives a random loss; errors will be large");
    }

    // Finite differences need full precision
    let base = base.with_dtype(Dtype::F64).with_init_seed(args.data_seed);
    base.validate()?;

    let mut rng = StdRng::seed_from_u64(args.data_seed);
    let x = Tensor::randn(vec![args.batch, base.input_dim], 1.0, &mut rng)?;
    let y: Vec<usize> = (0..args.batch)
        .map(|_| rng.random_range(0..base.num_classes))
        .collect();

    println!("=== Gradient Check ===\n");
    println!("Layers: {:?}", base.dims());
    println!("Batchnorm: {}", base.use_batchnorm);
    println!("Dropout: {}", base.dropout);
    println!("Batch size: {}\n", args.batch);

    for &reg in &args.reg {
        let config = base.clone().with_reg(reg);
        let mut net = FullyConnectedNet::new(&config)?;

        let (loss, grads) = net.loss_and_grads(&x, &y)?;
        println!("Running check with reg = {}", reg);
        println!("  Initial loss: {:.6}", loss);
        println!("  Gradient norm: {:.6}", compute_grad_norm(&grads));

        for (key, error) in check_model_gradients(&mut net, &x, &y, args.step)? {
            println!("  {:<8} relative error: {:.2e}", key.to_string(), error);
        }
        println!();
    }

    Ok(())
}
