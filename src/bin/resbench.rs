//! Benchmark driver for the distributed weighted reservoir sampler.
//!
//! Runs every enabled selection variant against every enabled input
//! generator on an in-process worker group and prints `RESULT` lines with
//! per-operation timing statistics to stdout.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use reservoir::comm::run_group;
use reservoir::input::{BatchGenerator, GaussianWeights, UniformWeights};
use reservoir::stats::{Aggregate, OpStats, SelectStats};
use reservoir::{AmsSelect, AmsSelectMulti, Communicator, GatherReservoir, Reservoir, Selector};
use std::time::Instant;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about)]
struct Config {
    /// Number of worker threads in the group.
    #[clap(short = 'p', long, default_value = "4")]
    workers: usize,

    /// Items per batch per worker.
    #[clap(short = 'n', long = "batchsize", default_value = "1000")]
    batch_size: usize,

    /// Reservoir sample size k.
    #[clap(short = 'k', long = "samples", default_value = "100")]
    sample_size: usize,

    /// Measured iterations per configuration.
    #[clap(short = 'i', long, default_value = "1")]
    iterations: usize,

    /// Minimum number of batches per iteration.
    #[clap(short = 'b', long = "minbatches", default_value = "1")]
    min_batches: u64,

    /// Maximum number of batches per iteration.
    #[clap(short = 'B', long = "maxbatches", default_value = "1000")]
    max_batches: u64,

    /// Minimum seconds per iteration (negative to disable).
    #[clap(short = 't', long = "mintime", default_value = "-1", allow_hyphen_values = true)]
    min_time: f64,

    /// Maximum seconds per iteration.
    #[clap(short = 'T', long = "maxtime", default_value = "600")]
    max_time: f64,

    /// Mean of the Gaussian input (constant term).
    #[clap(short = 'm', long = "mean", default_value = "0")]
    mean_offset: f64,

    /// Weight of the batch number on the Gaussian mean.
    #[clap(short = 'w', long = "batchweight", default_value = "1")]
    batch_weight: f64,

    /// Weight of the worker rank on the Gaussian mean.
    #[clap(short = 'x', long = "rankweight", default_value = "0")]
    rank_weight: f64,

    /// Standard deviation of the Gaussian input (constant term).
    #[clap(short = 'y', long = "stdev", default_value = "10")]
    stdev_offset: f64,

    /// Group-size weight on the Gaussian standard deviation.
    #[clap(short = 'z', long = "npweight", default_value = "0")]
    np_weight: f64,

    /// PRNG seed; 0 picks a random one.
    #[clap(short = 's', long, default_value = "0")]
    seed: u64,

    /// Print per-worker statistics.
    #[clap(short = 'v', long)]
    verbose: bool,

    /// Skip the warm-up iteration.
    #[clap(short = 'W', long = "no-warmup")]
    no_warmup: bool,

    /// Disable the single-pivot selection variant.
    #[clap(long = "no-ams")]
    no_ams: bool,

    /// Disable the 8-pivot selection variant.
    #[clap(long = "no-amm8")]
    no_amm8: bool,

    /// Disable the 16-pivot selection variant.
    #[clap(long = "no-amm16")]
    no_amm16: bool,

    /// Disable the 32-pivot selection variant.
    #[clap(long = "no-amm32")]
    no_amm32: bool,

    /// Disable the 64-pivot selection variant.
    #[clap(long = "no-amm64")]
    no_amm64: bool,

    /// Disable the gather-to-root baseline.
    #[clap(long = "no-gather")]
    no_gather: bool,

    /// Disable the uniform input generator.
    #[clap(long = "no-uniform")]
    no_uniform: bool,

    /// Disable the Gaussian input generator.
    #[clap(long = "no-gauss")]
    no_gauss: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Variant {
    Ams,
    Amm8,
    Amm16,
    Amm32,
    Amm64,
    Gather,
}

impl Variant {
    fn name(self) -> &'static str {
        match self {
            Variant::Ams => "ams",
            Variant::Amm8 => "ams-multi-8",
            Variant::Amm16 => "ams-multi-16",
            Variant::Amm32 => "ams-multi-32",
            Variant::Amm64 => "ams-multi-64",
            Variant::Gather => "gather",
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Input {
    Uniform,
    Gauss,
}

/// Per-worker statistics of one iteration, gathered at rank 0.
#[derive(Clone, Debug, Default)]
struct WorkerStats {
    res: OpStats,
    sel: SelectStats,
    gen: Aggregate,
    batch: Aggregate,
    total: Aggregate,
    rounds: Aggregate,
}

impl WorkerStats {
    fn merge(&mut self, other: &WorkerStats, merge_rounds: bool) {
        self.res.merge(&other.res);
        self.sel.merge(&other.sel);
        self.gen.merge(&other.gen);
        self.batch.merge(&other.batch);
        self.total.merge(&other.total);
        if merge_rounds {
            self.rounds.merge(&other.rounds);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let mut config = Config::parse();
    ensure!(config.workers > 0, "need at least one worker");
    ensure!(config.sample_size > 0, "sample size must be positive");
    let gauss_stdev = config.stdev_offset + config.np_weight * config.workers as f64;
    ensure!(
        config.no_gauss || (gauss_stdev.is_finite() && gauss_stdev > 0.0),
        "Gaussian stdev must be positive and finite, got {gauss_stdev} \
         (--stdev {} + --npweight {} * {} workers)",
        config.stdev_offset,
        config.np_weight,
        config.workers
    );
    if config.seed == 0 {
        config.seed = rand::random::<u64>() | 1;
    }
    info!(
        "running with {} workers, seed {}",
        config.workers, config.seed
    );

    let variants = [
        (Variant::Ams, !config.no_ams),
        (Variant::Amm8, !config.no_amm8),
        (Variant::Amm16, !config.no_amm16),
        (Variant::Amm32, !config.no_amm32),
        (Variant::Amm64, !config.no_amm64),
        (Variant::Gather, !config.no_gather),
    ];
    let inputs = [
        (Input::Uniform, !config.no_uniform),
        (Input::Gauss, !config.no_gauss),
    ];

    for (variant, enabled) in variants {
        if !enabled {
            continue;
        }
        for (input, enabled) in inputs {
            if !enabled {
                continue;
            }
            benchmark(&config, variant, input)
                .with_context(|| format!("benchmark {} failed", variant.name()))?;
        }
    }
    Ok(())
}

/// Run the warm-up plus the measured iterations of one configuration.
fn benchmark(config: &Config, variant: Variant, input: Input) -> Result<()> {
    let mut seed = config.seed;
    let warmups = if config.no_warmup { 0 } else { 1 };
    let mut overall = WorkerStats::default();

    for iter in 0..warmups + config.iterations {
        let measured = iter >= warmups;
        let cfg = config.clone();
        let t_iter = Instant::now();
        let results = run_group(config.workers, move |comm| {
            run_iteration(&cfg, variant, input, seed, measured, &comm)
        });
        for result in results {
            if let Some(stats) = result? {
                if measured {
                    overall.merge(&stats, true);
                }
            }
        }
        if measured {
            info!(
                "iteration {} of {} with {} selection took {} ms",
                iter - warmups + 1,
                config.iterations,
                variant.name(),
                t_iter.elapsed().as_millis()
            );
        }
        // Every iteration consumes up to 3p seeds.
        seed += 3 * config.workers as u64;
    }

    print_result("agg", config, variant, input, &overall);
    Ok(())
}

/// One iteration on one worker.  Returns the merged group stats at rank 0.
fn run_iteration(
    config: &Config,
    variant: Variant,
    input: Input,
    seed: u64,
    measured: bool,
    comm: &Communicator,
) -> Result<Option<WorkerStats>, reservoir::Error> {
    let np = comm.num_workers() as u64;
    let stats = match variant {
        Variant::Ams => {
            let selector = AmsSelect::new(comm.clone(), seed + np);
            run_engine(config, input, seed, comm, selector)?
        }
        Variant::Amm8 => {
            let selector =
                AmsSelectMulti::<8>::new(comm.clone(), seed + np + comm.rank() as u64);
            run_engine(config, input, seed, comm, selector)?
        }
        Variant::Amm16 => {
            let selector =
                AmsSelectMulti::<16>::new(comm.clone(), seed + np + comm.rank() as u64);
            run_engine(config, input, seed, comm, selector)?
        }
        Variant::Amm32 => {
            let selector =
                AmsSelectMulti::<32>::new(comm.clone(), seed + np + comm.rank() as u64);
            run_engine(config, input, seed, comm, selector)?
        }
        Variant::Amm64 => {
            let selector =
                AmsSelectMulti::<64>::new(comm.clone(), seed + np + comm.rank() as u64);
            run_engine(config, input, seed, comm, selector)?
        }
        Variant::Gather => run_gather(config, input, seed, comm)?,
    };

    // Merge per-worker stats at rank 0.
    let gathered = comm.gather(0, stats)?;
    Ok(gathered.map(|all| {
        let mut merged = WorkerStats::default();
        for (rank, stats) in all.iter().enumerate() {
            if config.verbose && measured {
                println!("PE {rank} res stats:\n{}", stats.res);
                println!("PE {rank} sel stats:\n{}", stats.sel);
            }
            merged.merge(stats, rank == 0);
        }
        if measured {
            print_result("it", config, variant, input, &merged);
        }
        merged
    }))
}

/// The batch loop shared by all tree-based variants.
fn run_engine<S: Selector>(
    config: &Config,
    input: Input,
    seed: u64,
    comm: &Communicator,
    selector: S,
) -> Result<WorkerStats, reservoir::Error> {
    let mut engine = Reservoir::new(comm.clone(), selector, config.sample_size, seed);
    let mut stats = WorkerStats::default();
    run_batches(config, input, seed, comm, &mut stats, |items| {
        engine.insert_batch(items)?;
        engine.sample(|_, _| {});
        Ok(())
    })?;
    stats.res = engine.stats().clone();
    stats.sel = engine.select_stats().clone();
    Ok(stats)
}

fn run_gather(
    config: &Config,
    input: Input,
    seed: u64,
    comm: &Communicator,
) -> Result<WorkerStats, reservoir::Error> {
    let mut engine = GatherReservoir::new(comm.clone(), config.sample_size, seed);
    let mut stats = WorkerStats::default();
    run_batches(config, input, seed, comm, &mut stats, |items| {
        engine.insert_batch(items)?;
        engine.sample(|_, _| {});
        Ok(())
    })?;
    stats.res = engine.stats().clone();
    Ok(stats)
}

fn run_batches(
    config: &Config,
    input: Input,
    seed: u64,
    comm: &Communicator,
    stats: &mut WorkerStats,
    mut body: impl FnMut(&[(f64, u32)]) -> Result<(), reservoir::Error>,
) -> Result<(), reservoir::Error> {
    let np = comm.num_workers();
    let mut rng = ChaCha8Rng::seed_from_u64(seed + 2 * np as u64 + comm.rank() as u64);
    let uniform = UniformWeights;
    let gauss = GaussianWeights {
        mean_offset: config.mean_offset,
        batch_weight: config.batch_weight,
        rank_weight: config.rank_weight,
        stdev: config.stdev_offset + config.np_weight * np as f64,
    };

    let mut items = Vec::with_capacity(config.batch_size);
    let t_total = Instant::now();
    let mut round: u64 = 0;
    loop {
        if round >= config.max_batches {
            break;
        }
        if config.min_time > 0.0 || config.max_time > 0.0 {
            // Rank 0's clock decides, to keep the group in lockstep.
            let time = comm.broadcast(0, t_total.elapsed().as_secs_f64())?;
            if config.max_time > 0.0 && time >= config.max_time {
                break;
            }
            if config.min_time > 0.0 && time >= config.min_time && round >= config.min_batches {
                break;
            }
        }

        comm.barrier()?;
        let t_batch = Instant::now();
        let t_gen = Instant::now();
        match input {
            Input::Uniform => {
                uniform.generate(&mut rng, &mut items, config.batch_size, round, comm.rank())
            }
            Input::Gauss => {
                gauss.generate(&mut rng, &mut items, config.batch_size, round, comm.rank())
            }
        }
        stats.gen.add(t_gen.elapsed().as_secs_f64() * 1e3);

        body(&items)?;
        stats.batch.add(t_batch.elapsed().as_secs_f64() * 1e3);
        round += 1;
    }
    stats.total.add(t_total.elapsed().as_secs_f64() * 1e3);
    stats.rounds.add(round as f64);
    Ok(())
}

fn print_result(kind: &str, config: &Config, variant: Variant, input: Input, stats: &WorkerStats) {
    let throughput = stats.res.throughput();
    let per_op = |key: &str| -> (f64, f64) {
        stats
            .res
            .get(key)
            .map(|a| (a.mean(), a.stdev()))
            .unwrap_or((0.0, 0.0))
    };
    let (total, total_dev) = per_op("total");
    let (tins, tins_dev) = per_op("insert");
    let (tsel, tsel_dev) = per_op("select");
    let (tsplit, tsplit_dev) = per_op("split");
    let (tthresh, tthresh_dev) = per_op("threshold");
    let (tgather, tgather_dev) = per_op("gather");
    let (rsize, rsize_dev) = per_op("size");
    let input_name = match input {
        Input::Uniform => "uni".to_string(),
        Input::Gauss => format!(
            "gauss({}+{}i+{}r,{}+p*{})",
            config.mean_offset,
            config.batch_weight,
            config.rank_weight,
            config.stdev_offset,
            config.np_weight
        ),
    };

    println!(
        "RESULT type={kind} np={} tpp={} tpt={} \
         total={total} totaldev={total_dev} tins={tins} tinsdev={tins_dev} \
         tsel={tsel} tseldev={tsel_dev} tsplit={tsplit} tsplitdev={tsplit_dev} \
         tthresh={tthresh} tthreshdev={tthresh_dev} \
         tgather={tgather} tgatherdev={tgather_dev} \
         rsize={rsize} rsizedev={rsize_dev} \
         tgen={} tbatch={} titer={} rounds={} \
         recdepth={} recdepthdev={} \
         batch_size={} sample_size={} seed={} input={input_name} selection={}",
        config.workers,
        throughput * config.batch_size as f64,
        throughput * config.batch_size as f64 * config.workers as f64,
        stats.gen.mean(),
        stats.batch.mean(),
        stats.total.mean(),
        stats.rounds.mean(),
        stats.sel.depth.mean(),
        stats.sel.depth.stdev(),
        config.batch_size,
        config.sample_size,
        config.seed,
        variant.name(),
    );

    if config.verbose {
        println!("Reservoir stats using {} selection:\n{}", variant.name(), stats.res);
        if variant != Variant::Gather {
            println!("Selection stats:\n{}", stats.sel);
        }
        println!("Gen stats: {}", stats.gen);
        println!("Batch stats: {}", stats.batch);
        println!("Rounds: {}", stats.rounds);
    }
}
