use clap::{Parser, Subcommand};
use roitrack::desc::{parse_track_json, parse_validate_json, TrackDesc};
use roitrack::edit::measure;
use roitrack::export::{read_divisions, write_cells, write_divisions, write_measurements};
use roitrack::im::io::load_label_stack;
use roitrack::lineage::{check_divisions, derive_divisions, parse_cells_json, trace_cells};
use roitrack::store::{JsonDirPersistence, RegionPersistence, RegionStore};
use roitrack::tracker::track_label_stack;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roitrack")]
#[command(about = "Track labeled regions across frames and validate cell lineages")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a directory of label images into tracked per-frame region files.
    Track {
        #[arg(long)]
        masks: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// JSON `TrackDesc`; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write one CSV row per region per frame.
    Measure {
        #[arg(long)]
        rois: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Compare tracked cell records against manual tracking.
    Validate {
        #[arg(long)]
        desc: PathBuf,
    },
}

fn run_track(masks: &Path, out: &Path, config: Option<&Path>) -> roitrack::Result<()> {
    let desc = match config {
        Some(path) => parse_track_json(&fs::read_to_string(path)?)?,
        None => TrackDesc::default(),
    };
    let stack = load_label_stack(masks)?;
    info!(n_frames = stack.len(), dir = %masks.display(), "loaded masks");

    let (frames, reports) = track_label_stack(&stack, desc.first_frame, &desc.tracking)?;
    for report in &reports {
        for lost in &report.unmatched_previous {
            warn!(frame = report.frame, name = %lost, "lineage ends without a match");
        }
    }

    let mut persistence = JsonDirPersistence::open(out)?;
    for f in &frames {
        persistence.write_frame(f.frame, &f.regions)?;
    }
    info!(n_frames = frames.len(), dir = %out.display(), "wrote region files");
    Ok(())
}

fn run_measure(rois: &Path, out: &Path) -> roitrack::Result<()> {
    let store = RegionStore::new(JsonDirPersistence::open(rois)?);
    let rows = measure(&store)?;
    write_measurements(BufWriter::new(File::create(out)?), &rows)?;
    info!(n_rows = rows.len(), out = %out.display(), "wrote measurements");
    Ok(())
}

fn run_validate(desc_path: &Path) -> roitrack::Result<()> {
    let base = desc_path.parent().unwrap_or(Path::new("."));
    let desc = parse_validate_json(&fs::read_to_string(desc_path)?)?.resolved_against(base);

    let cells = parse_cells_json(&fs::read_to_string(&desc.cells)?)?;
    let seg_stack = load_label_stack(&desc.seg_dir)?;
    let trk_stack = load_label_stack(&desc.trk_dir)?;
    info!(
        n_cells = cells.len(),
        n_seg = seg_stack.len(),
        n_trk = trk_stack.len(),
        "loaded validation inputs"
    );

    let (traces, lut) = trace_cells(&cells, &seg_stack, &trk_stack)?;
    let derived = derive_divisions(&traces, &lut);
    let truth = read_divisions(File::open(&desc.divisions)?)?;
    let checked = check_divisions(&derived, &truth);

    fs::create_dir_all(&desc.out_dir)?;
    write_cells(BufWriter::new(File::create(desc.out_dir.join("cells.csv"))?), &traces)?;
    write_divisions(
        BufWriter::new(File::create(desc.out_dir.join("divisions.csv"))?),
        &checked,
    )?;

    let n_correct = checked.iter().filter(|d| d.correct).count();
    let n_track_errors: usize = traces
        .iter()
        .map(|t| t.track_errors.iter().filter(|&&e| e).count())
        .sum();
    info!(
        n_divisions = checked.len(),
        n_correct,
        n_track_errors,
        out = %desc.out_dir.display(),
        "validation done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match &cli.cmd {
        Command::Track { masks, out, config } => run_track(masks, out, config.as_deref()),
        Command::Measure { rois, out } => run_measure(rois, out),
        Command::Validate { desc } => run_validate(desc),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
