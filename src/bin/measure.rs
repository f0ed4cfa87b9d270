//! measure - single-shot eye protrusion measurement of one image.
//!
//! Loads the models named by the configuration (`EXO_CONFIG` / `EXO_*` env),
//! measures the image once and prints `Right: ..mm, Left: ..mm` on stdout.
//! The annotated image is written only when `--annotated-out` is given.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use exophthalmometer::{
    spawn_single_shot, AppConfig, Estimates, Frame, Outcome, Rotation, TwoStagePipeline,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "measure",
    version,
    about = "Measure eye protrusion in a single face image"
)]
struct Args {
    /// Image to measure (PNG or JPEG)
    #[arg(long, value_name = "PATH")]
    image: PathBuf,

    /// Clockwise rotation applied before measuring (0, 90, 180, 270)
    #[arg(long, default_value_t = 0, value_name = "DEGREES")]
    rotate: u32,

    /// Center-crop the image to a square before measuring
    #[arg(long)]
    square: bool,

    /// Write the annotated image here
    #[arg(long, value_name = "PATH")]
    annotated_out: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(ui::UiMode::parse(&args.ui), is_tty, !stdout_is_tty);

    let rotation = Rotation::from_degrees(args.rotate)?;

    let cfg = {
        let _stage = ui.stage("Load configuration");
        AppConfig::load()?
    };

    let frame = {
        let mut stage = ui.stage("Load image");
        let mut frame = Frame::open(&args.image)?.rotated(rotation);
        if args.square {
            frame = frame.center_square();
        }
        let (w, h) = frame.dimensions();
        stage.set_detail(format!("{w}x{h}"));
        frame
    };

    let pipeline = {
        let _stage = ui.stage("Load models");
        let mut pipeline =
            TwoStagePipeline::from_settings(cfg.pipeline.clone(), &cfg.detector, &cfg.regressor);
        pipeline.warm_up();
        pipeline
    };

    let result = {
        let mut stage = ui.stage("Measure");
        let (_, result) = spawn_single_shot(pipeline, frame, Estimates::default())?
            .join()
            .map_err(|_| anyhow!("measurement worker panicked"))?;
        stage.set_detail(describe(result.outcome()));
        result
    };

    if let Some(status) = result.status() {
        log::warn!("{}", status);
    }

    println!("{}", result.summary());

    if let Some(path) = &args.annotated_out {
        let _stage = ui.stage("Write annotated image");
        result.into_annotated().save(path)?;
    }
    Ok(())
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Measured {
            left: true,
            right: true,
        } => "both eyes".to_string(),
        Outcome::Measured {
            left: true,
            right: false,
        } => "left eye".to_string(),
        Outcome::Measured {
            left: false,
            right: true,
        } => "right eye".to_string(),
        Outcome::Measured { .. } => "no eye measured".to_string(),
        Outcome::Rejected(rejection) => rejection.to_string(),
    }
}
