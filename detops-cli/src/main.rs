use clap::{Parser, Subcommand, ValueEnum};
use detops::{
    nms, roi_align_forward, roi_pool_forward, soft_nms, BBox, FeatureShape, FeatureView, Region,
    SoftNmsMethod, TileGrid,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "detops CLI (JSON in, JSON out)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Enable tracing output for performance inspection.
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Suppress overlapping scored boxes.
    Nms {
        /// JSON file with `boxes` and `scores`.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Suppression method.
        #[arg(long, value_enum, default_value = "hard")]
        method: MethodArg,
        #[arg(long, default_value_t = 0.5)]
        iou_threshold: f32,
        /// Gaussian decay width (soft methods only).
        #[arg(long, default_value_t = 0.5)]
        sigma: f32,
        /// Stop selecting once decayed scores fall below this (soft methods only).
        #[arg(long, default_value_t = 0.001)]
        score_threshold: f32,
    },
    /// Max-pool feature-map regions into fixed-size tiles.
    RoiPool {
        /// JSON file with `shape`, `features` and `regions`.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        spatial_scale: f32,
        #[arg(long, default_value_t = 7)]
        pooled_h: usize,
        #[arg(long, default_value_t = 7)]
        pooled_w: usize,
    },
    /// Average-pool feature-map regions by bilinear sampling.
    RoiAlign {
        /// JSON file with `shape`, `features` and `regions`.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        spatial_scale: f32,
        #[arg(long, default_value_t = 7)]
        pooled_h: usize,
        #[arg(long, default_value_t = 7)]
        pooled_w: usize,
        /// Per-axis samples per bin; 0 selects the adaptive count.
        #[arg(long, default_value_t = 2)]
        samples_per_bin: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Hard,
    Linear,
    Gaussian,
}

#[derive(Debug, Deserialize)]
struct BoxJson {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl From<&BoxJson> for BBox {
    fn from(value: &BoxJson) -> Self {
        BBox::new(value.x1, value.y1, value.x2, value.y2)
    }
}

#[derive(Debug, Deserialize)]
struct NmsInput {
    boxes: Vec<BoxJson>,
    scores: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ShapeJson {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

#[derive(Debug, Deserialize)]
struct RegionJson {
    batch: usize,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl From<&RegionJson> for Region {
    fn from(value: &RegionJson) -> Self {
        Region::new(value.batch, value.x1, value.y1, value.x2, value.y2)
    }
}

#[derive(Debug, Deserialize)]
struct RoiInput {
    shape: ShapeJson,
    features: Vec<f32>,
    regions: Vec<RegionJson>,
}

#[derive(Debug, Serialize)]
struct NmsOutput {
    keep: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct TileOutput {
    dims: (usize, usize, usize, usize),
    data: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    argmax: Option<Vec<i64>>,
}

impl TileOutput {
    fn new(tiles: TileGrid, argmax: Option<Vec<i64>>) -> Self {
        Self {
            dims: tiles.dims(),
            data: tiles.as_slice().to_vec(),
            argmax,
        }
    }
}

fn load_roi_input(path: &PathBuf) -> Result<(RoiInput, FeatureShape), Box<dyn std::error::Error>> {
    let input: RoiInput = serde_json::from_str(&fs::read_to_string(path)?)?;
    let shape = FeatureShape::new(
        input.shape.batch,
        input.shape.channels,
        input.shape.height,
        input.shape.width,
    )?;
    Ok((input, shape))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("detops=info".parse()?))
            .with_target(false)
            .init();
    }

    match cli.command {
        Command::Nms {
            input,
            method,
            iou_threshold,
            sigma,
            score_threshold,
        } => {
            let parsed: NmsInput = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let boxes: Vec<BBox> = parsed.boxes.iter().map(BBox::from).collect();
            let output = match method {
                MethodArg::Hard => NmsOutput {
                    keep: nms(&boxes, &parsed.scores, iou_threshold)?,
                    scores: None,
                },
                MethodArg::Linear | MethodArg::Gaussian => {
                    let soft_method = match method {
                        MethodArg::Linear => SoftNmsMethod::Linear,
                        _ => SoftNmsMethod::Gaussian,
                    };
                    let (keep, rescored) = soft_nms(
                        &boxes,
                        &parsed.scores,
                        soft_method,
                        sigma,
                        iou_threshold,
                        score_threshold,
                    )?;
                    NmsOutput {
                        keep,
                        scores: Some(rescored),
                    }
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::RoiPool {
            input,
            spatial_scale,
            pooled_h,
            pooled_w,
        } => {
            let (parsed, shape) = load_roi_input(&input)?;
            let view = FeatureView::new(&parsed.features, shape)?;
            let regions: Vec<Region> = parsed.regions.iter().map(Region::from).collect();
            let (tiles, argmax) =
                roi_pool_forward(view, &regions, spatial_scale, pooled_h, pooled_w)?;
            let output = TileOutput::new(tiles, Some(argmax.as_slice().to_vec()));
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::RoiAlign {
            input,
            spatial_scale,
            pooled_h,
            pooled_w,
            samples_per_bin,
        } => {
            let (parsed, shape) = load_roi_input(&input)?;
            let view = FeatureView::new(&parsed.features, shape)?;
            let regions: Vec<Region> = parsed.regions.iter().map(Region::from).collect();
            let tiles = roi_align_forward(
                view,
                &regions,
                spatial_scale,
                pooled_h,
                pooled_w,
                samples_per_bin,
            )?;
            let output = TileOutput::new(tiles, None);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
