use cheetah_plots::{
    config::PlotConfig,
    figure::{render, FigureTarget, RenderedFigure},
    grid::{Grid, LandscapeComparison, ParameterRange, ScoreSurface},
    history::{HistoryRecord, Misalignments, SystemIdentificationHistory, TuningHistory},
    plotting::{LandscapeFigure, SystemIdentificationFigure, TuningHistoryFigure},
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plot a gradient-based tuning history (loss, beam, quadrupoles, steerers)
    Tuning {
        /// History JSON with loss, beam_parameters and magnet_settings
        history: PathBuf,

        /// Output image (.png or .svg); prints inline SVG when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plot system-identification training (loss and quadrupole misalignments)
    SystemId {
        /// History JSON with loss and misalignment_q1..q3
        history: PathBuf,

        /// Ground-truth misalignments q1x,q1y,q2x,q2y,q3x,q3y in metres
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        ground_truth: Option<Vec<f64>>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plot precomputed ground-truth and prior-mean surfaces side by side
    Landscape {
        /// JSON with q1/q2 ranges and nested ground_truth/prior_mean rows
        surfaces: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Surfaces computed elsewhere, rows indexed by q2 and columns by q1.
#[derive(Debug, Deserialize)]
struct SurfaceFile {
    q1: ParameterRange,
    q2: ParameterRange,
    ground_truth: Vec<Vec<f64>>,
    prior_mean: Vec<Vec<f64>>,
}

fn load_landscape(path: &Path) -> Result<LandscapeComparison, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path)?;
    let file: SurfaceFile = serde_json::from_str(&data)?;

    let ground_truth = ScoreSurface::from_nested(&file.ground_truth)?;
    let prior_mean = ScoreSurface::from_nested(&file.prior_mean)?;
    let grid = Grid::new(&file.q1, &file.q2, ground_truth.resolution())?;
    Ok(LandscapeComparison::from_surfaces(grid, ground_truth, prior_mean)?)
}

fn report(rendered: RenderedFigure) {
    match rendered {
        RenderedFigure::Saved(path) => println!("📊 Figure saved to: {}", path.display()),
        RenderedFigure::Inline(svg) => println!("{}", svg),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PlotConfig::from_env()?;

    match args.command {
        Command::Tuning { history, output } => {
            let history = TuningHistory::load_json(&history)?;
            let target = FigureTarget::from_path(output);
            report(render(
                &TuningHistoryFigure(&history),
                config.tuning_size,
                &target,
            )?);
        }
        Command::SystemId {
            history,
            ground_truth,
            output,
        } => {
            let history = SystemIdentificationHistory::load_json(&history)?;
            let ground_truth = ground_truth
                .as_deref()
                .map(Misalignments::from_flat)
                .transpose()?;
            let target = FigureTarget::from_path(output);
            report(render(
                &SystemIdentificationFigure {
                    history: &history,
                    ground_truth: ground_truth.as_ref(),
                },
                config.system_identification_size,
                &target,
            )?);
        }
        Command::Landscape { surfaces, output } => {
            let comparison = load_landscape(&surfaces)?;
            let resolution = comparison.grid.resolution();
            if resolution != config.landscape_resolution {
                eprintln!(
                    "⚠️  Surfaces use a {}x{} grid (configured resolution is {})",
                    resolution, resolution, config.landscape_resolution
                );
            }
            let gt = comparison.ground_truth_min;
            let prior = comparison.prior_mean_min;
            eprintln!(
                "🔍 Ground-truth minimum at q1={:.4}, q2={:.4} (MAE {:.4})",
                gt.q1, gt.q2, gt.value
            );
            eprintln!(
                "🔍 Prior-mean minimum at q1={:.4}, q2={:.4} (MAE {:.4})",
                prior.q1, prior.q2, prior.value
            );
            let target = FigureTarget::from_path(output);
            report(render(
                &LandscapeFigure(&comparison),
                config.landscape_size,
                &target,
            )?);
        }
    }

    Ok(())
}
