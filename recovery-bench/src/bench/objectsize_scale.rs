// Copyright (c) Recovery Bench Developers.
use super::*;

const PARTITION_MB: f64 = 400.0;

struct ObjectSizeScaleJob {}

pub struct ObjectSizeScaleBench {}

impl Bench for ObjectSizeScaleBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "objectsize-scale",
            "Halves the object size at constant partition size",
        )
    }

    fn parse(&self, _spec: &BenchSpec) -> Result<Box<dyn Job>> {
        Ok(Box::new(ObjectSizeScaleJob {}))
    }
}

fn sweep() -> Sweep {
    let base = RecoveryConfig {
        num_backups: 6,
        num_partitions: 1,
        disk: Disk::Primary,
        old_master_mem: 3000,
        ..Default::default()
    };
    Sweep::new(base)
        .vary(
            "object_size",
            vec![8192u64, 4096, 2048, 1024, 512, 256, 128],
        )
        .derive("num_objects", |coords| {
            let per_mb = RecoveryConfig::objects_per_mb(coords.u64("object_size")?);
            Ok(ParamValue::from((per_mb * PARTITION_MB) as u64))
        })
}

impl Job for ObjectSizeScaleJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        rctx.set_prefix("objectsize-scale");
        let mut rows = rctx.rows("objectsize_scale")?;
        rctx.run_sweep(&sweep(), &mut rows, 2, |rctx, pt| {
            let res = rctx.insist(&pt.config)?;
            Ok(DataRow::new().field(pt.config.object_size).field(res.ns))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use crate::invoker::tests::FakeInvoker;

    #[test]
    fn test_objectsize_scale() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "objectsize-scale").unwrap();

        let shape: Vec<(u64, u64)> = inv
            .calls
            .iter()
            .map(|c| (c.object_size, c.num_objects))
            .collect();
        assert_eq!(shape.len(), 7);
        assert_eq!(shape[0], (8192, 50951));
        assert_eq!(shape[3], (1024, 394201));
        assert_eq!(shape[6], (128, 2496609));

        let lines = read_lines(&dir.path().join("objectsize_scale.data"));
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[6], "128\t7000000");
    }
}
