use std::{env, process::ExitCode, time::Instant};

use hfvtx::{
    Configuration, HfvtxResult, HistogramRegistry, SyntheticConfig, SyntheticEvents, TrackQa,
    TwoProngBuilder, Vertexer, VertexerConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Everything the scan can be configured with, as read from the optional JSON argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ScanConfig {
    synthetic: SyntheticConfig,
    vertexer: VertexerConfig,
}

impl Configuration for ScanConfig {
    fn validate(&self) -> HfvtxResult<()> {
        self.synthetic.validate()?;
        self.vertexer.validate()
    }
}

fn usage() {
    eprintln!(
        "Usage: vertex_scan [config.json]\n\
         Generates synthetic events, finds their secondary vertices, and prints the QA \
         histograms.\n\
         Set RUST_LOG (for example RUST_LOG=debug) for more output."
    );
}

fn summarize(registry: &HistogramRegistry) {
    println!(
        "{:<16} {:>9} {:>9} {:>9} {:>12}",
        "histogram", "entries", "under", "over", "mean"
    );
    for name in registry.names() {
        let (Some(histogram), Some((under, over))) =
            (registry.histogram(&name), registry.out_of_range(&name))
        else {
            continue;
        };
        let integral = histogram.integral();
        let mean = if integral > 0.0 {
            histogram
                .counts
                .iter()
                .zip(histogram.bin_edges.windows(2))
                .map(|(count, edges)| count * 0.5 * (edges[0] + edges[1]))
                .sum::<f64>()
                / integral
        } else {
            f64::NAN
        };
        println!(
            "{:<16} {:>9} {:>9} {:>9} {:>12.5}",
            name,
            registry.entries(&name),
            under,
            over,
            mean
        );
    }
}

fn run(config: ScanConfig) -> HfvtxResult<()> {
    let hypothesis = config.vertexer.hypothesis.unwrap_or_default();
    let mut generator = SyntheticEvents::new(config.synthetic)?;
    let vertexer = Vertexer::new(config.vertexer)?;
    let builder = TwoProngBuilder::new(vertexer.propagator().clone(), hypothesis);

    let registry = HistogramRegistry::new();
    TrackQa.register_histograms(&registry)?;
    vertexer.register_histograms(&registry)?;

    let events = generator.generate();
    let n_tracks: usize = events.iter().map(|event| event.tracks.len()).sum();
    info!("generated {} events with {n_tracks} tracks", events.len());

    let start = Instant::now();
    for event in &events {
        TrackQa.process(event, &registry);
    }
    let output = vertexer.process_events(&events, &registry);
    info!(
        "found {} vertices in {:.3?} with thread policy {}",
        output.vertices.len(),
        start.elapsed(),
        vertexer.thread_policy()
    );

    let vertices = output.vertices.into_inner();
    let mut n_candidates = 0;
    let mut mass_sum = 0.0;
    for event in &events {
        let Some(rows) = vertices.get(&event.id) else {
            continue;
        };
        for candidate in builder.process(event, rows)? {
            n_candidates += 1;
            mass_sum += candidate.mass;
        }
    }

    summarize(&registry);
    println!();
    println!(
        "{} vertices, {n_candidates} two-prong candidates (hypothesis {hypothesis})",
        vertices.values().map(Vec::len).sum::<usize>()
    );
    if n_candidates > 0 {
        println!("mean candidate mass: {:.4} GeV", mass_sum / n_candidates as f64);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 || args.iter().any(|arg| arg == "-h" || arg == "--help") {
        usage();
        return ExitCode::from(2);
    }
    let config = match args.get(1) {
        Some(path) => match ScanConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                error!("could not load {path}: {err}");
                eprintln!("error: {err}");
                return ExitCode::from(2);
            }
        },
        None => ScanConfig::default(),
    };
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
