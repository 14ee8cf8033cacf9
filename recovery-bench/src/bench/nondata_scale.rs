// Copyright (c) Recovery Bench Developers.
use super::*;

const DFL_TRIALS: u32 = 5;
const MAX_BACKUPS: u64 = 70;

struct NondataScaleJob {
    trials: u32,
}

pub struct NondataScaleBench {}

impl Bench for NondataScaleBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "nondata-scale",
            "Scales recovery masters with nearly empty partitions",
        )
        .prop("trials", "Recoveries per sweep point (dfl: 5)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let trials = parse_prop(spec, "trials", DFL_TRIALS)?;
        if trials < 1 {
            bail!("{}: trials must be positive", spec);
        }
        Ok(Box::new(NondataScaleJob { trials }))
    }
}

// Servers should run with 16KB segments for these numbers to mean much.
fn phase_sweep(num_objects: u64) -> Sweep {
    let base = RecoveryConfig {
        object_size: 1024,
        disk: Disk::Split,
        replicas: 3,
        num_objects,
        old_master_mem: 1200,
        new_master_mem: 1200,
        ..Default::default()
    };
    Sweep::new(base)
        .vary("num_partitions", (1..=12u32).rev().collect::<Vec<u32>>())
        .derive("num_backups", |coords| {
            Ok(ParamValue::from(
                (6 * coords.u64("num_partitions")?).min(MAX_BACKUPS),
            ))
        })
}

impl Job for NondataScaleJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let trials = self.trials;
        let mut rows = rctx.rows("nondata_scale")?;
        for &num_objects in &[OBJECTS_PER_640MB * 8 / 10 / 640, 1] {
            rctx.set_prefix(&format!("nondata-scale[{} objects]", num_objects));
            rctx.run_sweep(
                &phase_sweep(num_objects),
                &mut rows,
                1 + trials as usize,
                |rctx, pt| {
                    let mut row = DataRow::new().field(pt.config.num_partitions);
                    for _ in 0..trials {
                        row = row.field(rctx.insist(&pt.config)?.ms());
                    }
                    Ok(row)
                },
            )?;
            rows.section_break(2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use crate::invoker::tests::FakeInvoker;
    use recovery_bench_intf::Disk;

    #[test]
    fn test_nondata_scale() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "nondata-scale:trials=2").unwrap();

        assert_eq!(inv.calls.len(), 2 * 12 * 2);
        assert_eq!(inv.calls[0].num_partitions, 12);
        assert_eq!(inv.calls[0].num_backups, 70);
        assert_eq!(inv.calls[0].num_objects, 782);
        assert_eq!(inv.calls[0].disk, Disk::Split);
        assert_eq!(inv.calls[23].num_partitions, 1);
        assert_eq!(inv.calls[23].num_backups, 6);
        assert_eq!(inv.calls[24].num_objects, 1);

        let lines = read_lines(&dir.path().join("nondata_scale.data"));
        assert_eq!(lines.len(), 2 * (12 + 2));
        assert_eq!(lines[0], "12\t1\t2");
        assert_eq!(lines[11], "1\t23\t24");
        assert_eq!(lines[12], "");
        assert_eq!(lines[14], "12\t25\t26");
    }
}
