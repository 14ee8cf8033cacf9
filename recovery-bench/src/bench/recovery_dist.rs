// Copyright (c) Recovery Bench Developers.
//! Repeats the same large recovery cycling through the backups' segment
//! placement strategies to collect a recovery time distribution. Every row
//! is tagged (0 for normal fans, 1 for high fans) so that runs under
//! different conditions can share the data file, and the per tag and
//! strategy CDF is rebuilt after each row.
use super::*;
use std::cmp::Ordering;

pub const DATA_NAME: &str = "recovery_dist";
pub const CDF_NAME: &str = "recovery_dist_cdf";
pub const NR_STRATEGIES: u32 = 4;
pub const TAGS: &[u32] = &[0, 1];

const DFL_ITERATIONS: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct DistSample {
    pub ms: f64,
    pub disk_min: f64,
    pub disk_max: f64,
    pub disk_mean: f64,
    pub strategy: u32,
    pub tag: u32,
}

pub fn parse_samples(body: &str) -> Result<Vec<DistSample>> {
    let mut samples = vec![];
    for (idx, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.len() == 0 || line.starts_with('#') {
            continue;
        }
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() != 6 {
            bail!("line {}: expected 6 fields, found {}", idx + 1, toks.len());
        }
        let float = |i: usize| -> Result<f64> {
            toks[i]
                .parse::<f64>()
                .with_context(|| format!("line {}: field {}", idx + 1, i + 1))
        };
        let int = |i: usize| -> Result<u32> {
            toks[i]
                .parse::<u32>()
                .with_context(|| format!("line {}: field {}", idx + 1, i + 1))
        };
        samples.push(DistSample {
            ms: float(0)?,
            disk_min: float(1)?,
            disk_max: float(2)?,
            disk_mean: float(3)?,
            strategy: int(4)?,
            tag: int(5)?,
        });
    }
    Ok(samples)
}

/// For each tag and strategy: `0 <first time>` (or `0 0` without samples),
/// one `<cumulative probability> <time>` row per sorted sample and two blank
/// lines.
pub fn write_cdf<W: Write>(samples: &[DistSample], rows: &mut RowWriter<W>) -> Result<()> {
    for &tag in TAGS {
        for strategy in 0..NR_STRATEGIES {
            let mut times: Vec<f64> = samples
                .iter()
                .filter(|s| s.tag == tag && s.strategy == strategy)
                .map(|s| s.ms)
                .collect();
            times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

            match times.first() {
                Some(first) => rows.write(DataRow::new().field(0u64).field(*first))?,
                None => rows.write(DataRow::new().field(0u64).field(0u64))?,
            }
            for (i, time) in times.iter().enumerate() {
                let prob = (i + 1) as f64 / times.len() as f64;
                rows.write(DataRow::new().field(prob).field(*time))?;
            }
            rows.section_break(2)?;
        }
    }
    Ok(())
}

pub fn rebuild_cdf(data_path: &Path, cdf_path: &Path) -> Result<()> {
    let body = fs::read_to_string(data_path).with_context(|| format!("reading {:?}", data_path))?;
    let samples = parse_samples(&body).with_context(|| format!("parsing {:?}", data_path))?;
    let mut rows = open_rows(cdf_path, false)?;
    write_cdf(&samples, &mut rows)?;
    debug!("recovery-dist: Rebuilt {:?} from {} samples", cdf_path, samples.len());
    Ok(())
}

// The strategy after the last one recorded for @tag.
fn resume_strategy(samples: &[DistSample], tag: u32) -> u32 {
    let last = samples
        .iter()
        .filter(|s| s.tag == tag)
        .last()
        .map(|s| s.strategy)
        .unwrap_or(NR_STRATEGIES - 1);
    (last + 1) % NR_STRATEGIES
}

// Strategy 0 places segments to minimize recovery time and isn't measured.
fn strategy_sequence(first: u32, nr: u32) -> Vec<u32> {
    let mut seq = vec![];
    let mut strategy = first % NR_STRATEGIES;
    for _ in 0..nr {
        if strategy == 0 {
            strategy = 1;
        }
        seq.push(strategy);
        strategy = (strategy + 1) % NR_STRATEGIES;
    }
    seq
}

struct RecoveryDistJob {
    tag: u32,
    resume: bool,
    iterations: u32,
}

pub struct RecoveryDistBench {}

impl Bench for RecoveryDistBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "recovery-dist",
            "Recovery time distribution over backup placement strategies",
        )
        .prop("tag", "0 for normal fans, 1 for high fans (dfl: 0)")
        .prop("continue", "Append and resume after the last recorded strategy")
        .prop("iterations", "Number of recoveries (dfl: 30)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let tag = parse_prop(spec, "tag", 0u32)?;
        if !TAGS.contains(&tag) {
            bail!("{}: tag must be 0 for normal fans or 1 for high fans", spec);
        }
        Ok(Box::new(RecoveryDistJob {
            tag,
            resume: spec.bool_prop("continue")?,
            iterations: parse_prop(spec, "iterations", DFL_ITERATIONS)?,
        }))
    }
}

impl RecoveryDistJob {
    fn sweep(&self, first_strategy: u32) -> Sweep {
        let base = RecoveryConfig {
            num_backups: 72,
            num_partitions: 12,
            object_size: 1024,
            disk: Disk::Split,
            replicas: 3,
            num_objects: OBJECTS_PER_640MB * 600 / 640,
            old_master_mem: 17000,
            new_master_mem: 800,
            timeout: 120.0,
            ..Default::default()
        };
        let seq = strategy_sequence(first_strategy, self.iterations);
        Sweep::new(base)
            .coord(
                "strategy",
                seq.iter().map(|v| *v as u64).collect::<Vec<u64>>(),
            )
            .derive("backup_args", |coords| {
                Ok(ParamValue::from(format!(
                    "--backupStrategy={}",
                    coords.u64("strategy")?
                )))
            })
    }
}

impl Job for RecoveryDistJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let data_path = rctx.data_path(DATA_NAME);
        let cdf_path = rctx.data_path(CDF_NAME);
        let append = self.resume || rctx.append;

        let first = if append && data_path.exists() {
            let body = fs::read_to_string(&data_path)
                .with_context(|| format!("reading {:?}", &data_path))?;
            let first = resume_strategy(&parse_samples(&body)?, self.tag);
            info!("recovery-dist: Resuming measurements on strategy {}", first);
            first
        } else {
            0
        };

        if self.iterations == 0 {
            warn!("recovery-dist: Zero iterations requested, nothing to do");
            return Ok(());
        }

        let mut rows = open_rows(&data_path, append)?;
        let sweep = self.sweep(first);
        for pt in sweep.iter() {
            let pt = pt?;
            let strategy = pt.coords.u64("strategy")?;
            rctx.set_prefix(&format!(
                "recovery-dist[{}/{}]",
                pt.index + 1,
                self.iterations
            ));
            info!(
                "recovery-dist: Iteration {} strategy {}",
                pt.index + 1,
                strategy
            );

            let res = rctx.insist(&pt.config)?;
            let disk_ms =
                normalize_ms("backups", &res.metrics.backups, |h| h.backup.reading_data_ticks)?;
            rows.write(
                DataRow::new()
                    .field(res.ms())
                    .field(disk_ms.min()?)
                    .field(disk_ms.max()?)
                    .field(disk_ms.mean()?)
                    .field(strategy)
                    .field(self.tag),
            )?;
            rebuild_cdf(&data_path, &cdf_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use super::*;
    use crate::invoker::tests::FakeInvoker;

    #[test]
    fn test_strategy_cycle() {
        assert_eq!(strategy_sequence(0, 5), vec![1, 2, 3, 1, 2]);
        assert_eq!(strategy_sequence(3, 3), vec![3, 1, 2]);

        let sample = |strategy, tag| DistSample {
            ms: 1.0,
            disk_min: 0.0,
            disk_max: 0.0,
            disk_mean: 0.0,
            strategy,
            tag,
        };
        let samples = vec![sample(2, 0), sample(3, 1), sample(1, 0)];
        assert_eq!(resume_strategy(&samples, 0), 2);
        assert_eq!(resume_strategy(&samples, 1), 0);
        assert_eq!(resume_strategy(&[], 0), 0);
    }

    #[test]
    fn test_write_cdf() {
        let samples = parse_samples("3 0 0 0 1 0\n1 0 0 0 1 0\n\n2 0 0 0 2 0\n5 0 0 0 2 1\n").unwrap();
        let mut rows = RowWriter::new(Vec::<u8>::new());
        write_cdf(&samples, &mut rows).unwrap();
        let out = String::from_utf8(rows.into_inner()).unwrap();
        let groups: Vec<&str> = out.split("\n\n\n").collect();

        // 2 tags x 4 strategies, the trailing break leaves an empty tail
        assert_eq!(groups.len(), 9);
        assert_eq!(groups[0], "0\t0");
        assert_eq!(groups[1], "0\t1\n0.5\t1\n1\t3");
        assert_eq!(groups[2], "0\t2\n1\t2");
        assert_eq!(groups[6], "0\t5\n1\t5");
        assert_eq!(groups[8], "");

        assert!(parse_samples("1 2 3\n").is_err());
        assert!(parse_samples("x 0 0 0 1 0\n").is_err());
    }

    #[test]
    fn test_recovery_dist_run_and_continue() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "recovery-dist:iterations=4").unwrap();

        let args: Vec<&str> = inv.calls.iter().map(|c| c.backup_args.as_str()).collect();
        assert_eq!(
            args,
            vec![
                "--backupStrategy=1",
                "--backupStrategy=2",
                "--backupStrategy=3",
                "--backupStrategy=1"
            ]
        );
        assert!(inv.calls.iter().all(|c| c.num_backups == 72 && c.num_partitions == 12));

        let data = dir.path().join("recovery_dist.data");
        let lines = read_lines(&data);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "1\t200\t14400\t7300\t1\t0");

        let cdf = read_lines(&dir.path().join("recovery_dist_cdf.data"));
        assert_eq!(&cdf[..3], &["0\t0", "", ""]);
        assert_eq!(&cdf[3..6], &["0\t1", "0.5\t1", "1\t4"]);

        run_bench(&mut inv, dir.path(), "recovery-dist:continue,iterations=2").unwrap();
        assert_eq!(inv.calls[4].backup_args, "--backupStrategy=2");
        assert_eq!(inv.calls[5].backup_args, "--backupStrategy=3");
        assert_eq!(read_lines(&data).len(), 6);

        run_bench(&mut inv, dir.path(), "recovery-dist:continue,tag=1,iterations=1").unwrap();
        assert_eq!(inv.calls[6].backup_args, "--backupStrategy=1");
        let lines = read_lines(&data);
        assert_eq!(lines.len(), 7);
        assert!(lines[6].ends_with("\t1\t1"));

        assert!(run_bench(&mut inv, dir.path(), "recovery-dist:tag=2").is_err());
    }
}
