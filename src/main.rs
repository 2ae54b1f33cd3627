use anyhow::Context;
use clap::Parser;
use geojson::{FeatureCollection, JsonValue};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use stmm::mm::{Config, GapPolicy, MMatch, MultiTrajectory};
use stmm::utils;

#[derive(Parser, Debug)]
#[command(name = "stmm")]
#[command(version = "0.1")]
#[command(about = "ST-matching of gps traces onto a road network", long_about = None)]
struct Args {
    /// keep at most this many candidates per gps fix
    #[arg(long, default_value_t = 5)]
    max_candidates: usize,
    /// standard deviation of the gps error, in meters
    #[arg(long, default_value_t = 20.0)]
    sigma: f64,
    /// remove u-turns up to this length, in meters
    #[arg(long, default_value_t = 100.0)]
    max_uturn_length: f64,
    /// keep every u-turn
    #[arg(long)]
    no_uturn_filter: bool,
    /// fail when a gps fix has no road nearby instead of skipping it
    #[arg(long)]
    fail_on_gap: bool,
    /// road network geojson file
    #[arg(short, long, value_name = "ROAD_NETWORK_FILE")]
    network_file: PathBuf,
    /// write the matched route here instead of stdout
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: Option<PathBuf>,

    /// input gps trace, geojson or wkt
    #[arg(value_name = "GPS_TRAJ_FILE")]
    input_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    utils::log::log_init();
    let args = Args::parse();
    debug!("{:?}", args);

    let config = Config {
        max_candidates: args.max_candidates,
        sigma: args.sigma,
        gap_policy: if args.fail_on_gap {
            GapPolicy::Fail
        } else {
            GapPolicy::Split
        },
        ..Config::default()
    };
    info!("try construct map matching network from geojson file");
    let map_match = MMatch::from_network_file(&args.network_file, config)?;
    info!(
        "road graph: {} nodes, {} connections",
        map_match.road_graph().node_count(),
        map_match.road_graph().connection_count()
    );
    let trajs = MultiTrajectory::from_path(&args.input_file)
        .with_context(|| format!("read gps traj {}", args.input_file.display()))?;
    let max_uturn_length = (!args.no_uturn_filter).then_some(args.max_uturn_length);

    let mut output = FeatureCollection {
        bbox: None,
        features: Vec::new(),
        foreign_members: None,
    };
    for (index, traj) in trajs.trajs.iter().enumerate() {
        let result = map_match
            .match_and_reconstruct(traj, max_uturn_length)
            .with_context(|| format!("match gps traj {}", index))?;
        if !result.matched.skipped.is_empty() {
            warn!(
                "traj {}: {} gps fixes without candidates",
                index,
                result.matched.skipped.len()
            );
        }
        info!(
            "traj {}: {} ways, {:.1} m, {} u-turns removed",
            index,
            result.route.ways.len(),
            result.route.length(),
            result.uturns_removed
        );
        for mut feature in result.route.features() {
            feature.set_property("trace", JsonValue::from(index));
            output.features.push(feature);
        }
    }

    let text = output.to_string();
    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(
                File::create(path).with_context(|| format!("create {}", path.display()))?,
            );
            writer.write_all(text.as_bytes())?;
            writer.flush()?;
            info!("route written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
