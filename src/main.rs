use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::io;
use std::path::PathBuf;

use memhier::mem::config::Topology;
use memhier::sim::config::FullConfig;
use memhier::sim::top::Sim;
use memhier::sim::trace::read_trace;
use memhier::sim::traffic::TrafficGen;

#[derive(Parser)]
#[command(version, about)]
struct MemhierArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override trace file path")]
    trace: Option<PathBuf>,
    #[arg(long, help = "Override hierarchy (dram_only, single_level, multi_level, split_l1)")]
    hierarchy: Option<Topology>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug)")]
    log: Option<u64>,
    #[arg(long, help = "Dump tag stores to <name>.dump after simulation")]
    dump: Option<bool>,
    #[arg(long, help = "Write summary statistics as JSON")]
    stats_json: Option<PathBuf>,
}

pub fn main() -> anyhow::Result<()> {
    let argv = MemhierArgs::parse();
    let text = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let mut config = FullConfig::from_toml_str(&text)
        .with_context(|| format!("cannot parse config {}", argv.config_path.display()))?;

    // override toml configs with argv
    config.sim.log_level = argv.log.unwrap_or(config.sim.log_level);
    config.sim.hierarchy = argv.hierarchy.unwrap_or(config.sim.hierarchy);
    config.sim.dump = argv.dump.unwrap_or(config.sim.dump);
    if argv.trace.is_some() {
        config.sim.trace = argv.trace;
    }
    if argv.stats_json.is_some() {
        config.sim.stats_json = argv.stats_json;
    }

    memhier::sim::log::init(config.sim.log_level);

    let mut sim = Sim::new(&config.hierarchy(), config.sim.timeout)?;
    let summary = match &config.sim.trace {
        Some(path) => sim.simulate(read_trace(path)?)?,
        None if config.traffic.enabled => sim.simulate(TrafficGen::new(&config.traffic))?,
        None => bail!("no trace given and [traffic] is disabled"),
    };

    let report = sim.hierarchy.report();
    if !report.is_empty() {
        println!("{}", report);
    }
    let mem = &summary.hierarchy.memory;
    println!("------------------------------");
    println!("{} reads serviced: {}", sim.hierarchy.memory().name(), mem.reads);
    println!("{} writebacks serviced: {}", sim.hierarchy.memory().name(), mem.writebacks);
    println!(
        "cycles: {}, accesses: {}, completed: {}, misses: {}, avg latency: {:.2}",
        summary.cycles, summary.issued, summary.completed, summary.misses, summary.avg_latency
    );

    if config.sim.dump {
        sim.hierarchy.dump_to_files()?;
    } else if log::log_enabled!(log::Level::Debug) {
        sim.hierarchy.dump(&mut io::stdout().lock())?;
    }

    if let Some(path) = &config.sim.stats_json {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("cannot write stats to {}", path.display()))?;
    }
    Ok(())
}
