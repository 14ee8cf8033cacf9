// Copyright (c) Recovery Bench Developers.
use super::*;

const DFL_MAX_PARTITIONS: u32 = 6;
const BIG_MB: f64 = 400.0;
const SMALL_MB: f64 = 1.0;

struct PartitionScaleJob {
    max_partitions: u32,
}

pub struct PartitionScaleBench {}

impl Bench for PartitionScaleBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "partition-scale",
            "Scales recovery masters at constant partition size",
        )
        .prop("max-partitions", "Largest number of partitions (dfl: 6)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let max_partitions = parse_prop(spec, "max-partitions", DFL_MAX_PARTITIONS)?;
        if max_partitions < 1 {
            bail!("{}: max-partitions must be positive", spec);
        }
        Ok(Box::new(PartitionScaleJob { max_partitions }))
    }
}

fn objects_for_mb(mb: f64) -> u64 {
    (OBJECTS_PER_640MB as f64 / 640.0 * mb) as u64
}

impl PartitionScaleJob {
    fn sweep(&self) -> Sweep {
        let base = RecoveryConfig {
            num_backups: 6,
            object_size: 1024,
            ..Default::default()
        };
        Sweep::new(base).vary(
            "num_partitions",
            (1..=self.max_partitions).rev().collect::<Vec<u32>>(),
        )
    }
}

impl Job for PartitionScaleJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        rctx.set_prefix("partition-scale");
        let mut rows = rctx.rows("partition_scale")?;
        rctx.run_sweep(&self.sweep(), &mut rows, 3, |rctx, pt| {
            let big = pt
                .config
                .clone()
                .with("old_master_mem", 3000u64)?
                .with("num_objects", objects_for_mb(BIG_MB))?;
            let big = rctx.insist(&big)?;

            let small = pt
                .config
                .clone()
                .with("num_objects", objects_for_mb(SMALL_MB))?;
            let small = rctx.insist(&small)?;

            Ok(DataRow::new()
                .field(pt.config.num_partitions)
                .field(big.ns)
                .field(small.ns))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use crate::invoker::tests::FakeInvoker;

    #[test]
    fn test_partition_scale() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "partition-scale:max-partitions=2").unwrap();

        let shape: Vec<(u32, u64, u64)> = inv
            .calls
            .iter()
            .map(|c| (c.num_partitions, c.num_objects, c.old_master_mem))
            .collect();
        assert_eq!(
            shape,
            vec![
                (2, 391257, 3000),
                (2, 978, 2048),
                (1, 391257, 3000),
                (1, 978, 2048)
            ]
        );

        let lines = read_lines(&dir.path().join("partition_scale.data"));
        assert_eq!(lines, vec!["2\t1000000\t2000000", "1\t3000000\t4000000"]);
    }
}
