//! Runs an untrained STBLN over a synthetic skeleton batch.
//!
//! Example: `cargo run --example inference --features dev-ndarray -- --frames 64 --save-config /tmp/stbln.json`

use anyhow::Context;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_stbln::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[path = "common/backend.rs"]
pub mod backend;

use backend::{MainBackend, MainDevice};

pub const HELP: &str = "\
Burn STBLN Inference Demo

Builds a spatial-temporal bilinear-mapping network and classifies a random
[batch, in_channels, frames, num_point, num_person] skeleton batch.

USAGE:
    inference [OPTIONS]

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -m, --model-config <PATH>   Load the network configuration from this JSON file
                                (defaults to the built-in configuration)
    -s, --save-config <PATH>    Save the effective network configuration to this JSON file
    -b, --batch <N>             Number of samples in the batch [default: 2]
    -f, --frames <N>            Number of time steps per sample [default: 30]
        --seed <N>              Backend random seed [default: 0]
";

#[derive(Debug)]
pub struct AppArgs {
    pub model_config: Option<PathBuf>,
    pub save_config: Option<PathBuf>,
    pub batch: usize,
    pub frames: usize,
    pub seed: u64,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            save_config: pargs.opt_value_from_os_str(["-s", "--save-config"], parse_path)?,
            batch: pargs.opt_value_from_str(["-b", "--batch"])?.unwrap_or(2),
            frames: pargs.opt_value_from_str(["-f", "--frames"])?.unwrap_or(30),
            seed: pargs.opt_value_from_str("--seed")?.unwrap_or(0),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            tracing::warn!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

pub fn launch<B: Backend + MainDevice>(args: AppArgs) -> anyhow::Result<()> {
    let config = match &args.model_config {
        Some(path) => {
            info!("loading model config from {path:?}");
            StblnConfig::load(path).map_err(|err| {
                anyhow::anyhow!("failed to load the model config {path:?}: {err:?}")
            })?
        }
        None => StblnConfig::new(),
    };
    config.validate()?;

    if let Some(path) = &args.save_config {
        info!("saving model config into {path:?}");
        config
            .save(path)
            .with_context(|| format!("failed to save the model config {path:?}"))?;
    }

    let device = B::main_device();
    B::seed(&device, args.seed);

    let model: Stbln<B> = config.init(&device);
    info!("model parameters: {}", model.num_params());

    let dims = [
        args.batch,
        config.in_channels,
        args.frames,
        config.num_point,
        config.num_person,
    ];
    model.check_input(&dims)?;
    let input = Tensor::<B, 5>::random(dims, Distribution::Normal(0., 1.), &device);

    let logits = model.forward(input.clone());
    info!("logits: {logits}");
    let classes = model.classify(input);
    info!("predicted classes: {classes}");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = AppArgs::parse()?;
    launch::<MainBackend>(args)
}
