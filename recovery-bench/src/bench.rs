// Copyright (c) Recovery Bench Developers.

// The individual bench implementations under bench/ inherits all uses from
// this file. Make common stuff available.
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use super::invoker::{RecoveryInvoker, RecoveryResult};
use super::progress::BenchProgress;
use super::rows::*;
use super::study::*;
use super::sweep::*;
use recovery_bench_intf::{BenchSpec, Disk, HostAllocation, ParamValue, RecoveryConfig};

lazy_static::lazy_static! {
    static ref BENCHS: Mutex<Vec<Arc<Box<dyn Bench>>>> = Mutex::new(vec![]);
}

// Number of 1024 byte objects filling 640MB of log.
pub const OBJECTS_PER_640MB: u64 = 626012;

pub fn find_bench(kind: &str) -> Result<Arc<Box<dyn Bench>>> {
    for bench in BENCHS.lock().unwrap().iter() {
        if bench.desc().kind == kind {
            return Ok(bench.clone());
        }
    }
    bail!("unknown bench kind {:?}", kind);
}

pub fn bench_list() -> Vec<(String, String)> {
    BENCHS
        .lock()
        .unwrap()
        .iter()
        .map(|bench| {
            let desc = bench.desc();
            (desc.kind, desc.about)
        })
        .collect()
}

pub struct BenchDesc {
    pub kind: String,
    pub about: String,
    pub props: Vec<(String, String)>,
}

impl BenchDesc {
    pub fn new(kind: &str, about: &str) -> Self {
        Self {
            kind: kind.into(),
            about: about.into(),
            props: vec![],
        }
    }

    pub fn prop(mut self, key: &str, help: &str) -> Self {
        self.props.push((key.into(), help.into()));
        self
    }

    pub fn check_props(&self, spec: &BenchSpec) -> Result<()> {
        for key in spec.props.keys() {
            if !self.props.iter().any(|(k, _)| k == key) {
                bail!("{}: unknown property {:?}", spec, key);
            }
        }
        Ok(())
    }
}

pub trait Bench: Send + Sync {
    fn desc(&self) -> BenchDesc;
    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>>;
}

pub trait Job {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()>;
}

pub fn parse_prop<T>(spec: &BenchSpec, key: &str, dfl: T) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match spec.props.get(key) {
        None => Ok(dfl),
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow!("{}: invalid {:?} value {:?} ({})", spec, key, v, &e)),
    }
}

pub type DataWriter = RowWriter<BufWriter<fs::File>>;

pub struct RunCtx<'a> {
    invoker: &'a mut dyn RecoveryInvoker,
    results_dir: PathBuf,
    pub append: bool,
    progress: BenchProgress,
}

impl<'a> RunCtx<'a> {
    pub fn new(invoker: &'a mut dyn RecoveryInvoker, results_dir: &Path, append: bool) -> Self {
        Self {
            invoker,
            results_dir: results_dir.into(),
            append,
            progress: BenchProgress::new(),
        }
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.results_dir.join(format!("{}.data", name))
    }

    pub fn rows(&self, name: &str) -> Result<DataWriter> {
        let path = self.data_path(name);
        info!(
            "bench: {} {:?}",
            if self.append { "Appending to" } else { "Writing" },
            &path
        );
        open_rows(&path, self.append)
    }

    pub fn set_prefix(&self, prefix: &str) {
        self.progress.set_prefix(prefix);
    }

    /// Runs one recovery of `cfg`, retrying transient failures.
    pub fn insist(&mut self, cfg: &RecoveryConfig) -> Result<RecoveryResult> {
        self.progress.set_status(&format!("Recovering [{}]", cfg));
        let res = self.invoker.insist(cfg)?;
        self.progress.println(&format!(
            "recovery: {:.1}ms ({}) [{}]",
            res.ms(),
            &res.run,
            cfg
        ));
        Ok(res)
    }

    /// Walks `sweep` in order writing one row per point. Skipped points get a
    /// `width` wide placeholder. The first error stops the sweep, rows
    /// written before it stay in place.
    pub fn run_sweep<W, F>(
        &mut self,
        sweep: &Sweep,
        rows: &mut RowWriter<W>,
        width: usize,
        mut reduce: F,
    ) -> Result<()>
    where
        W: Write,
        F: FnMut(&mut RunCtx<'a>, &SweepPoint) -> Result<DataRow>,
    {
        let nr = sweep.len();
        for pt in sweep.iter() {
            let pt = pt?;
            if pt.skip {
                info!("sweep: [{}/{}] {} skipped", pt.index + 1, nr, &pt.coords);
                rows.write(Row::Placeholder { width })?;
                continue;
            }
            info!("sweep: [{}/{}] {}", pt.index + 1, nr, &pt.coords);
            let row = reduce(self, &pt)
                .with_context(|| format!("sweep point {}", &pt.coords))?;
            rows.write(row)?;
        }
        Ok(())
    }
}

/// Looks up the bench for `spec` and parses it into a job, rejecting
/// properties the bench doesn't know about.
pub fn parse_job(spec: &BenchSpec) -> Result<Box<dyn Job>> {
    let bench = find_bench(&spec.kind)?;
    bench.desc().check_props(spec)?;
    bench.parse(spec)
}

fn register_bench(bench: Box<dyn Bench>) -> () {
    BENCHS.lock().unwrap().push(Arc::new(bench));
}

mod backup_scale;
mod nondata_scale;
mod objectsize_recovery;
mod objectsize_scale;
mod partition_scale;
mod prop_scale;
pub mod recovery_dist;

pub fn init_benchs() -> () {
    register_bench(Box::new(backup_scale::BackupScaleBench {}));
    register_bench(Box::new(partition_scale::PartitionScaleBench {}));
    register_bench(Box::new(objectsize_scale::ObjectSizeScaleBench {}));
    register_bench(Box::new(objectsize_recovery::ObjectSizeRecoveryBench {}));
    register_bench(Box::new(nondata_scale::NondataScaleBench {}));
    register_bench(Box::new(prop_scale::PropScaleBench {}));
    register_bench(Box::new(recovery_dist::RecoveryDistBench {}));
}
