// Copyright (c) Recovery Bench Developers.
//! Scales recovery masters together with the backups feeding them, keeping
//! the partition size constant. Each phase places masters and backups
//! differently. Phases which aren't selected keep their place in the output
//! with `0 0` rows so that plots line up.
//!
//! The disk split columns estimate the disk time of the backups with the
//! fewest and the most segments by scaling the total disk time with each
//! backup's share of the segments. They assume every disk reads at the
//! same rate and are not measured.
use super::*;

const NR_HOSTS: u32 = 35;
const DFL_PHASES: &str = "3";

struct Phase {
    desc: &'static str,
    max_masters: u32,
    backups_per_master: u64,
    disk: Disk,
    host_allocation: HostAllocation,
}

fn phases() -> Vec<Phase> {
    vec![
        Phase {
            desc: "masters sharing hosts with 0 backups",
            max_masters: NR_HOSTS / 7,
            backups_per_master: 6,
            disk: Disk::Primary,
            host_allocation: HostAllocation::Reverse,
        },
        Phase {
            desc: "masters sharing hosts with 1 backup",
            max_masters: NR_HOSTS / 6,
            backups_per_master: 6,
            disk: Disk::Primary,
            host_allocation: HostAllocation::Forward,
        },
        Phase {
            desc: "masters sharing hosts with 2 backups",
            max_masters: NR_HOSTS / 3,
            backups_per_master: 6,
            disk: Disk::Split,
            host_allocation: HostAllocation::Forward,
        },
        Phase {
            desc: "masters sharing hosts with 1 RAID backup",
            max_masters: NR_HOSTS / 3,
            backups_per_master: 3,
            disk: Disk::Raid,
            host_allocation: HostAllocation::Forward,
        },
    ]
}

struct PropScaleJob {
    // Indexed by phase, whether to actually run it.
    enabled: Vec<bool>,
}

pub struct PropScaleBench {}

impl Bench for PropScaleBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "prop-scale",
            "Scales recovery masters and backups proportionally",
        )
        .prop("phases", "Phases to run, 1-4 separated by '/' or \"all\" (dfl: 3)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let nr_phases = phases().len();
        let mut enabled = vec![false; nr_phases];
        let sel = spec
            .props
            .get("phases")
            .map(String::as_str)
            .unwrap_or(DFL_PHASES);

        if sel == "all" {
            enabled = vec![true; nr_phases];
        } else {
            for tok in sel.split('/') {
                match tok.parse::<usize>() {
                    Ok(v) if v >= 1 && v <= nr_phases => enabled[v - 1] = true,
                    _ => bail!("{}: invalid phase {:?}", spec, tok),
                }
            }
        }
        Ok(Box::new(PropScaleJob { enabled }))
    }
}

fn phase_sweep(phase: &Phase, enabled: bool) -> Sweep {
    let base = RecoveryConfig {
        object_size: 1024,
        disk: phase.disk.clone(),
        replicas: 3,
        num_objects: OBJECTS_PER_640MB * 600 / 640,
        old_master_mem: 17000,
        new_master_mem: 800,
        timeout: 180.0,
        host_allocation: phase.host_allocation,
        ..Default::default()
    };
    let per_master = phase.backups_per_master;
    Sweep::new(base)
        .vary(
            "num_partitions",
            (1..=phase.max_masters).collect::<Vec<u32>>(),
        )
        .derive("num_backups", move |coords| {
            Ok(ParamValue::from(per_master * coords.u64("num_partitions")?))
        })
        .skip(!enabled)
}

fn reduce(res: &RecoveryResult, nr_masters: u32) -> Result<DataRow> {
    let metrics = &res.metrics;
    let disk_ms = normalize_ms("backups", &metrics.backups, |h| h.backup.storage_read_ticks)?;
    let segments = counts("backups", &metrics.backups, |h| h.backup.storage_read_count)?;
    let (split_min, split_max) = weighted_split(&segments, &disk_ms)?;
    let master_ms = normalize_ms("masters", &metrics.masters, |h| h.recovery_ticks)?;

    let (disk_mean, disk_min, disk_max) = disk_ms.mean_min_max()?;
    let (master_mean, master_min, master_max) = master_ms.mean_min_max()?;
    Ok(DataRow::new()
        .field(nr_masters)
        .field(res.ms())
        .fields(vec![disk_mean, disk_min, disk_max])
        .fields(vec![split_min, split_max])
        .fields(vec![master_mean, master_min, master_max]))
}

impl Job for PropScaleJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let mut rows = rctx.rows("prop_scale")?;
        for (idx, phase) in phases().iter().enumerate() {
            if idx > 0 {
                rows.section_break(2)?;
            }
            info!(
                "prop-scale: Phase {} ({}){}",
                idx + 1,
                phase.desc,
                if self.enabled[idx] { "" } else { " skipped" }
            );
            rctx.set_prefix(&format!("prop-scale[{}]", idx + 1));
            rctx.run_sweep(
                &phase_sweep(phase, self.enabled[idx]),
                &mut rows,
                2,
                |rctx, pt| {
                    let res = rctx.insist(&pt.config)?;
                    reduce(&res, pt.config.num_partitions)
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use crate::error::Failure;
    use crate::invoker::tests::{fake_metrics, FakeInvoker};
    use crate::invoker::RecoveryResult;
    use recovery_bench_intf::{Disk, HostAllocation};

    #[test]
    fn test_prop_scale_default_phase() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "prop-scale").unwrap();

        assert_eq!(inv.calls.len(), 11);
        assert!(inv.calls.iter().all(|c| c.disk == Disk::Split));
        assert_eq!(inv.calls[10].num_partitions, 11);
        assert_eq!(inv.calls[10].num_backups, 66);
        assert_eq!(inv.calls[0].num_objects, 586886);
        assert_eq!(inv.calls[0].timeout, 180.0);

        let lines = read_lines(&dir.path().join("prop_scale.data"));
        // 5 + 5 placeholders, 11 rows, 11 placeholders and three 2-line breaks
        assert_eq!(lines.len(), 5 + 2 + 5 + 2 + 11 + 2 + 11);
        assert!(lines[..5].iter().all(|l| l == "0\t0"));
        assert_eq!(&lines[5..7], &["", ""]);
        assert_eq!(lines[14], "1\t1\t350\t100\t600\t100\t600\t100\t100\t100");
        assert_eq!(lines[14].split('\t').count(), 10);
        assert_eq!(lines[lines.len() - 1], "0\t0");
    }

    #[test]
    fn test_prop_scale_phase_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "prop-scale:phases=1").unwrap();
        assert_eq!(inv.calls.len(), 5);
        assert!(inv
            .calls
            .iter()
            .all(|c| c.host_allocation == HostAllocation::Reverse && c.disk == Disk::Primary));

        assert!(run_bench(&mut inv, dir.path(), "prop-scale:phases=5").is_err());
    }

    #[test]
    fn test_prop_scale_halts_without_backups() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::new(|cfg, nr| {
            let mut metrics = fake_metrics(cfg, 1_000_000);
            if nr == 1 {
                metrics.backups.clear();
            }
            Ok::<_, Failure>(RecoveryResult {
                ns: 1_000_000,
                run: "recovery/x".into(),
                metrics,
                count: cfg.num_objects,
                size: cfg.object_size,
            })
        });
        let err = run_bench(&mut inv, dir.path(), "prop-scale").unwrap_err();
        assert!(format!("{:#}", err).contains("no backups to reduce"));
        assert_eq!(inv.calls.len(), 2);

        let lines = read_lines(&dir.path().join("prop_scale.data"));
        assert_eq!(lines.len(), 5 + 2 + 5 + 2 + 1);
    }
}
