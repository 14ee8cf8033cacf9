// Copyright (c) Recovery Bench Developers.
use super::*;

const DFL_OBJECT_SIZES: &[u64] = &[128, 256, 1024];

struct ObjectSizeRecoveryJob {
    object_sizes: Vec<u64>,
}

pub struct ObjectSizeRecoveryBench {}

impl Bench for ObjectSizeRecoveryBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "objectsize-recovery",
            "Recovery time over partition size, one phase per object size",
        )
        .prop("sizes", "Object sizes separated by '/' (dfl: 128/256/1024)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let object_sizes = match spec.props.get("sizes") {
            None => DFL_OBJECT_SIZES.to_vec(),
            Some(v) => {
                let mut sizes = vec![];
                for tok in v.split('/') {
                    match tok.parse::<u64>() {
                        Ok(size) if size > 0 => sizes.push(size),
                        _ => bail!("{}: invalid object size {:?}", spec, tok),
                    }
                }
                sizes
            }
        };
        Ok(Box::new(ObjectSizeRecoveryJob { object_sizes }))
    }
}

fn phase_sweep(object_size: u64) -> Sweep {
    let base = RecoveryConfig {
        num_backups: 36,
        num_partitions: 1,
        object_size,
        disk: Disk::Primary,
        replicas: 3,
        old_master_mem: 1600,
        new_master_mem: 1600,
        ..Default::default()
    };
    Sweep::new(base)
        .coord("partition_mb", (1..1050u64).step_by(100).collect::<Vec<u64>>())
        .derive("num_objects", move |coords| {
            let per_mb = RecoveryConfig::objects_per_mb(object_size);
            Ok(ParamValue::from((per_mb * coords.f64("partition_mb")?) as u64))
        })
}

impl Job for ObjectSizeRecoveryJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        let mut rows = rctx.rows("objectsize_recovery")?;
        for &size in self.object_sizes.iter() {
            rctx.set_prefix(&format!("objectsize-recovery[{}]", size));
            rows.comment(&format!("objectSize: {}", size))?;
            rctx.run_sweep(&phase_sweep(size), &mut rows, 2, |rctx, pt| {
                let res = rctx.insist(&pt.config)?;
                Ok(DataRow::new()
                    .field(pt.coords.u64("partition_mb")?)
                    .field(res.ms()))
            })?;
            rows.section_break(2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{read_lines, run_bench};
    use crate::invoker::tests::FakeInvoker;

    #[test]
    fn test_objectsize_recovery_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        run_bench(&mut inv, dir.path(), "objectsize-recovery:sizes=128/1024").unwrap();

        assert_eq!(inv.calls.len(), 22);
        assert_eq!(inv.calls[0].num_objects, 6241);
        assert_eq!(inv.calls[1].num_objects, 630393);
        assert_eq!(inv.calls[12].object_size, 1024);
        assert_eq!(inv.calls[12].num_objects, 99535);
        assert!(inv.calls.iter().all(|c| c.num_backups == 36 && c.replicas == 3));

        let lines = read_lines(&dir.path().join("objectsize_recovery.data"));
        assert_eq!(lines.len(), 2 * (1 + 11 + 2));
        assert_eq!(lines[0], "# objectSize: 128");
        assert_eq!(lines[1], "1\t1");
        assert_eq!(lines[11], "1001\t11");
        assert_eq!(&lines[12..14], &["", ""]);
        assert_eq!(lines[14], "# objectSize: 1024");
    }

    #[test]
    fn test_invalid_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = FakeInvoker::steady();
        assert!(run_bench(&mut inv, dir.path(), "objectsize-recovery:sizes=128/x").is_err());
        assert!(run_bench(&mut inv, dir.path(), "objectsize-recovery:sizes=0").is_err());
    }
}
