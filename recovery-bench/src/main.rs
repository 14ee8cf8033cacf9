// Copyright (c) Recovery Bench Developers.
use anyhow::{Context, Result};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;

use rc_util::*;
use recovery_bench_intf::{Args, ClusterConfig, Mode, RecoveryMetrics};

mod bench;
mod cluster;
mod error;
mod insist;
mod invoker;
mod parse;
mod progress;
mod report;
mod rows;
mod study;
mod sweep;

use bench::recovery_dist;
use cluster::ClusterInvoker;
use insist::{Insist, RetryPolicy};

fn secs_to_duration(secs: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid {} {}", what, secs))
}

fn insist_policy(args: &Args) -> Result<Insist> {
    let policy = match (args.retry_timeout, args.retries) {
        (Some(timeout), _) => {
            RetryPolicy::Deadline(secs_to_duration(timeout, "--retry-timeout")?)
        }
        (None, Some(nr)) => RetryPolicy::Attempts(nr),
        (None, None) => RetryPolicy::Unbounded,
    };
    Ok(Insist::new(policy).delay(secs_to_duration(args.retry_delay, "--retry-delay")?))
}

fn run_benchs(args: &Args) -> Result<()> {
    // Parse everything upfront so that a typo in the last spec doesn't
    // surface hours into the run.
    let mut jobs = vec![];
    for spec in args.bench_specs.iter() {
        jobs.push((spec, bench::parse_job(spec)?));
    }

    let cluster = JsonConfigFile::<ClusterConfig>::load_or_create(args.cluster.as_ref())
        .context("loading cluster config")?
        .data;
    info!(
        "cluster: {} hosts, binaries in {:?}",
        cluster.hosts.len(),
        &cluster.bin_dir
    );

    let results_dir = PathBuf::from(args.results_dir());
    let mut invoker = ClusterInvoker::new(cluster, results_dir.clone(), insist_policy(args)?);

    for (spec, mut job) in jobs.into_iter() {
        info!("{}: Starting", spec);
        let mut rctx = bench::RunCtx::new(&mut invoker, &results_dir, args.append);
        job.run(&mut rctx).with_context(|| format!("{}", spec))?;
        info!("{}: Done", spec);
    }
    Ok(())
}

fn print_report(args: &Args) -> Result<()> {
    let target = PathBuf::from(args.run_dir.clone().unwrap_or_else(|| args.latest_run_dir()));
    // A run directory's logs are authoritative, a bare file is a snapshot.
    let metrics = if target.is_file() {
        RecoveryMetrics::load(&target)?
    } else {
        parse::parse_recovery(&target).with_context(|| format!("parsing {:?}", &target))?
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report::format_report(&mut out, &metrics)
}

fn rebuild_cdf(args: &Args) -> Result<()> {
    let cdf_path = args.data_path(recovery_dist::CDF_NAME);
    recovery_dist::rebuild_cdf(
        Path::new(&args.data_path(recovery_dist::DATA_NAME)),
        Path::new(&cdf_path),
    )?;
    info!("cdf: Rebuilt {:?}", &cdf_path);
    Ok(())
}

fn list_benchs() -> Result<()> {
    for (kind, about) in bench::bench_list() {
        println!("{:20} {}", &kind, &about);
        for (key, help) in bench::find_bench(&kind)?.desc().props.iter() {
            println!("    {:16} {}", key, help);
        }
    }
    Ok(())
}

fn main() {
    bench::init_benchs();
    recovery_bench_intf::args::set_bench_list(bench::bench_list());

    let args_file = Args::init_args_and_logging().unwrap_or_else(|e| {
        error!("Failed to process args file ({:#})", &e);
        exit(1);
    });

    if let Err(e) = setup_prog_state() {
        error!("Failed to set up signal handling ({:#})", &e);
        exit(1);
    }

    let args = &args_file.data;
    let res = match args.mode {
        Mode::Run => run_benchs(args),
        Mode::Report => print_report(args),
        Mode::Cdf => rebuild_cdf(args),
        Mode::List => list_benchs(),
    };

    if let Err(e) = res {
        error!("{:#}", &e);
        exit(1);
    }
}
