/// Command line interface for `backproject` executable
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "backproject", about = "Backproject synthetic point-source events into a sky or near-field image")]
pub struct Cli {
    /// TOML file describing the grid, response model and queue
    pub config: PathBuf,

    /// Raw f32 output image
    #[clap(short, long, default_value = "image.raw")]
    pub out: PathBuf,

    /// Number of events to generate
    #[clap(short = 'n', long, default_value = "10000")]
    pub events: usize,

    /// Direction of the source, seen from the detector
    #[clap(long, value_parser = parse_triplet::<f64>, default_value = "0,0,1")]
    pub source: (f64, f64, f64),

    /// Energy of the source line
    #[clap(short, long, default_value = "662 keV")]
    pub energy: Energy,

    /// Energy resolution (sigma) of every measured deposit
    #[clap(long, default_value = "2 keV")]
    pub energy_resolution: Energy,

    /// Position resolution (sigma) along each axis
    #[clap(long, default_value = "1 mm")]
    pub position_resolution: Length,

    /// Direction resolution (sigma) of pair events
    #[clap(long, default_value = "2 degrees")]
    pub pair_resolution: Angle,

    /// Fraction of events generated as pairs
    #[clap(long, default_value = "0")]
    pub pair_fraction: f64,

    /// Fraction of events generated as photo-absorptions
    #[clap(long, default_value = "0")]
    pub photo_fraction: f64,

    /// Attach electron tracks to Compton events
    #[clap(long)]
    pub tracks: bool,

    /// Seed of the event generator
    #[clap(long, default_value = "1")]
    pub seed: u64,

    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    /// Events handed to the workers at a time
    #[clap(short = 'c', long, default_value = "1000")]
    pub chunk_size: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut progress = Progress::new();

    // Make sure the output can be written before doing any work
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }

    progress.start("Reading configuration");
    let config = read_config_file(&args.config)?;
    let mut grid = Grid::from_config(&config.grid)?;
    let response = Response::from_config(&config.response)?;
    progress.done();

    progress.start("Preparing grid");
    grid.prepare_backprojection();
    let backprojector = Backprojector::new(&grid, response)?
        .with_near_field_tuning(config.grid.near_field_tuning());
    progress.done();
    let n_bins = grid.n_bins();
    info!("{} bins in {:?} grid", group_digits(n_bins), grid.kind());

    let (x, y, z) = args.source;
    let source = PointSource::new(Vector::new(x, y, z), args.energy, StdRng::seed_from_u64(args.seed))
        .ok_or("source direction must be non-zero and energy positive")?
        .with_energy_resolution(args.energy_resolution)
        .with_position_resolution(args.position_resolution)
        .with_pair_resolution(args.pair_resolution)
        .with_tracks(args.tracks)
        .with_topology_mix(args.pair_fraction, args.photo_fraction);

    rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global()?;

    let queue = EventSupplyQueue::start(source.take(args.events), QueueSettings::from(&config.queue));
    let bar = ProgressBar::new(args.events as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("Backprojecting: [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")?);

    let mut image = vec![0.0; n_bins];
    let mut summary = RunSummary::default();
    loop {
        let chunk = (0..args.chunk_size).map_while(|_| queue.pop()).collect_vec();
        if chunk.is_empty() { break }
        let (partial, tally) = backproject_chunk(&backprojector, &chunk, n_bins);
        image.iter_mut().zip(partial).for_each(|(total, x)| *total += x);
        summary = summary.merge(tally);
        bar.inc(chunk.len() as u64);
    }
    bar.finish();

    progress.start(&format!("Writing image to {}", args.out.display()));
    io::raw::write_image(&image, &args.out)?;
    progress.done();

    println!("{summary}");
    Ok(())
}

/// Sum the backprojections of `events` in parallel, one backprojector per worker
fn backproject_chunk(backprojector: &Backprojector, events: &[PhysicalEvent], n_bins: usize) -> (Vec<f64>, RunSummary) {
    let empty = || (vec![0.0; n_bins], RunSummary::default());
    events
        .par_iter()
        .fold(|| (backprojector.clone(), empty()),
              |(mut bp, (mut image, mut summary)), event| {
                  let outcome = bp.backproject(event);
                  if let Ok(sparse) = &outcome { sparse.add_to(&mut image, 1.0) }
                  summary.record(&outcome);
                  (bp, (image, summary))
              })
        .map(|(_, partial)| partial)
        .reduce(empty, |(mut a, sa), (b, sb)| {
            a.iter_mut().zip(b).for_each(|(a, b)| *a += b);
            (a, sa.merge(sb))
        })
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;
use std::fs::create_dir_all;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geometry::Vector;
use units::{Angle, Energy, Length};
use comptonrec::{
    Backprojector, EventSupplyQueue, Grid, PhysicalEvent, QueueSettings, Response, RunSummary,
    config::read_config_file,
    io,
    synthetic::PointSource,
    utils::{group_digits, parse_triplet, timing::Progress},
};
