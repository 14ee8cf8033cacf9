// Copyright (c) Recovery Bench Developers.
use super::*;

const DFL_MAX_BACKUPS: u32 = 6;

struct BackupScaleJob {
    max_backups: u32,
}

pub struct BackupScaleBench {}

impl Bench for BackupScaleBench {
    fn desc(&self) -> BenchDesc {
        BenchDesc::new(
            "backup-scale",
            "Varies the number of backups feeding one recovery master",
        )
        .prop("max-backups", "Largest number of backups (dfl: 6)")
    }

    fn parse(&self, spec: &BenchSpec) -> Result<Box<dyn Job>> {
        let max_backups = parse_prop(spec, "max-backups", DFL_MAX_BACKUPS)?;
        if max_backups < 1 {
            bail!("{}: max-backups must be positive", spec);
        }
        Ok(Box::new(BackupScaleJob { max_backups }))
    }
}

impl BackupScaleJob {
    fn sweep(&self) -> Result<Sweep> {
        let base = RecoveryConfig {
            num_partitions: 1,
            object_size: 1024,
            disk: Disk::Device("/dev/sdb1".into()),
            num_objects: OBJECTS_PER_640MB * 400 / 640,
            old_master_mem: 3000,
            ..Default::default()
        };
        Ok(Sweep::new(base).vary(
            "num_backups",
            (1..=self.max_backups).collect::<Vec<u32>>(),
        ))
    }
}

impl Job for BackupScaleJob {
    fn run(&mut self, rctx: &mut RunCtx) -> Result<()> {
        rctx.set_prefix("backup-scale");
        let mut rows = rctx.rows("backup_scale")?;
        rctx.run_sweep(&self.sweep()?, &mut rows, 2, |rctx, pt| {
            let res = rctx.insist(&pt.config)?;
            Ok(DataRow::new().field(pt.config.num_backups).field(res.ns))
        })
    }
}
