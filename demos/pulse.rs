use std::thread;
use clap::Parser;
use log::{info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use amrkit::amr_box::AmrBox;
use amrkit::distributed::Coordinator;
use amrkit::extent::{Axis, Extent};
use amrkit::ghost::{self, GhostOptions, OwnershipRule};
use amrkit::grid::UniformGrid;
use amrkit::hierarchy::OverlappingAmr;
use amrkit::message::comm::Communicator;
use amrkit::message::local::ChannelCommunicator;
use amrkit::slice::slice_along_axis;
use amrkit::source::{GaussianPulse, PartitionedUniform};




/// Strip ghost layers from a partitioned grid spread over simulated ranks,
/// and from a two-level Gaussian pulse.
#[derive(Debug, Parser)]
#[clap(version = "0.1", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    /// Number of cells along each side of the global grid
    #[clap(short = 'n', long, default_value = "64")]
    resolution: i64,

    /// Number of partitions (rounded up to a power of two)
    #[clap(short = 'p', long, default_value = "4")]
    partitions: usize,

    /// Number of simulated ranks, one thread each
    #[clap(short = 'r', long, default_value = "2")]
    ranks: usize,

    /// Layers of ghost cells around each partition
    #[clap(short = 'g', long, default_value = "2")]
    ghost_layers: usize,

    /// lowest-block-id, highest-block-id or lowest-rank
    #[clap(long, default_value = "lowest-block-id")]
    rule: OwnershipRule,

    #[clap(long, default_value = "info")]
    log_level: LevelFilter,

    /// Write the stripped blocks of every rank to this file, as CBOR
    #[clap(short = 'o', long)]
    output: Option<String>,
}




#[derive(Serialize)]
struct Snapshot {
    name: String,
    blocks: Vec<(usize, Option<AmrBox>, UniformGrid)>,
}

fn snapshot(name: String, amr: &OverlappingAmr) -> Snapshot {
    Snapshot {
        name,
        blocks: amr
            .iter()
            .map(|b| (b.composite, b.amr_box.cloned(), b.grid.as_ref().clone()))
            .collect(),
    }
}




// ============================================================================
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    SimpleLogger::new().with_level(opts.log_level).init()?;
    info!("{:?}", opts);

    let options = GhostOptions { rule: opts.rule, ..GhostOptions::default() };
    let source = PartitionedUniform {
        global_extent: Extent::new([0, opts.resolution, 0, opts.resolution, 0, 0])?,
        origin: [0.0; 3],
        spacing: [1.0 / opts.resolution as f64; 3],
        partitions: opts.partitions,
        ghost_layers: opts.ghost_layers,
    };

    let procs: Vec<_> = ChannelCommunicator::group(opts.ranks)
        .into_iter()
        .map(|comm| {
            let source = source.clone();
            let options = options.clone();

            thread::spawn(move || -> amrkit::Result<(Snapshot, usize)> {
                let (rank, size) = (comm.rank(), comm.size());
                let coordinator = Coordinator::new(comm).with_options(options);
                coordinator.initialize()?;

                let amr = source.generate(rank, size)?;
                let (stripped, report) = coordinator.strip_ghost_layers(&amr)?;
                let real: usize = stripped.iter().map(|b| b.grid.num_real_cells()).sum();

                info!("rank {}: {} trimmed, {} unchanged, {} real cells", rank, report.trimmed, report.shallow_copies, real);
                Ok((snapshot(format!("rank {}", rank), &stripped), real))
            })
        })
        .collect();

    let mut snapshots = Vec::new();
    let mut real_cells = 0;

    for proc in procs {
        let (snapshot, real) = proc.join().map_err(|_| "a rank panicked")??;
        snapshots.push(snapshot);
        real_cells += real;
    }
    println!("partitioned grid: {} real cells of {}", real_cells, opts.resolution * opts.resolution);

    let pulse = GaussianPulse::default().generate()?;
    let (stripped, report) = ghost::strip_ghost_layers(&pulse, &options, None)?;
    let mut blanked = pulse.clone();
    let blanking = ghost::blank_cells(&mut blanked, &options, None)?;

    println!(
        "gaussian pulse: {} duplicated cells flagged by stripping, {} cells blanked",
        report.decisions.iter().map(|d| d.duplicated_cells).sum::<usize>(),
        blanking.refined_cells + blanking.duplicate_cells);
    snapshots.push(snapshot("gaussian pulse".to_string(), &stripped));

    let slice = slice_along_axis(&pulse, Axis::I, 2.0, options.tolerance)?;
    println!("slice through the pulse: {} of {} blocks hold data", slice.num_blocks(), slice.total_blocks());
    snapshots.push(snapshot("pulse slice".to_string(), &slice));

    if let Some(path) = opts.output {
        let file = std::fs::File::create(&path)?;
        let mut buffer = std::io::BufWriter::new(file);
        ciborium::ser::into_writer(&snapshots, &mut buffer)?;
        info!("wrote {}", path);
    }
    Ok(())
}
