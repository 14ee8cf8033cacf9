// Copyright (c) Recovery Bench Developers.
use log::debug;

use super::error::{AttemptResult, FatalFailure};
use super::insist::Insist;
use recovery_bench_intf::{RecoveryConfig, RecoveryMetrics};

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryResult {
    // Client observed recovery time
    pub ns: u64,
    // Run directory holding the logs of the recovery
    pub run: String,
    pub metrics: RecoveryMetrics,
    pub count: u64,
    pub size: u64,
}

impl RecoveryResult {
    pub fn ms(&self) -> f64 {
        rc_util::ns_to_ms(self.ns)
    }
}

/// One crash recovery of a master, end to end. Each attempt must leave
/// nothing behind which could affect the next one.
pub trait RecoveryInvoker {
    fn insist_policy(&self) -> Insist;

    fn attempt(&mut self, cfg: &RecoveryConfig) -> AttemptResult<RecoveryResult>;

    fn insist(&mut self, cfg: &RecoveryConfig) -> Result<RecoveryResult, FatalFailure> {
        cfg.validate().map_err(FatalFailure::new)?;
        let insist = self.insist_policy();
        insist.run(cfg, |nr| {
            debug!("invoker: attempt {} [{}]", nr, cfg);
            self.attempt(cfg)
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::{RecoveryInvoker, RecoveryResult};
    use crate::error::{AttemptResult, Failure, FatalFailure};
    use crate::insist::{Insist, RetryPolicy};
    use anyhow::anyhow;
    use recovery_bench_intf::{HostMetrics, RecoveryConfig, RecoveryMetrics};

    pub fn fake_host(freq: u64, recovery_ticks: u64) -> HostMetrics {
        let mut host = HostMetrics::default();
        host.clock_frequency = freq;
        host.recovery_ticks = recovery_ticks;
        host
    }

    // Deterministic metrics shaped after @cfg: one master per partition, one
    // backup per backup process, per-host work growing with the host index.
    pub fn fake_metrics(cfg: &RecoveryConfig, ns: u64) -> RecoveryMetrics {
        let mut metrics = RecoveryMetrics::default();
        metrics.coordinator = fake_host(1000, ns / 1_000_000);
        for i in 0..cfg.num_partitions as u64 {
            metrics.masters.push(fake_host(1000, 100 * (i + 1)));
        }
        for i in 0..cfg.num_backups as u64 {
            let mut host = fake_host(2000, 1000);
            host.backup.storage_read_ticks = 200 * (i + 1);
            host.backup.storage_read_count = 10 * (i + 1);
            host.backup.reading_data_ticks = 400 * (i + 1);
            metrics.backups.push(host);
        }
        metrics.client.recovery_ns = ns;
        metrics
    }

    type Respond = Box<dyn FnMut(&RecoveryConfig, usize) -> AttemptResult<RecoveryResult>>;

    pub struct FakeInvoker {
        pub insist: Insist,
        pub calls: Vec<RecoveryConfig>,
        respond: Respond,
    }

    impl FakeInvoker {
        pub fn new<F>(respond: F) -> Self
        where
            F: FnMut(&RecoveryConfig, usize) -> AttemptResult<RecoveryResult> + 'static,
        {
            Self {
                insist: Insist::new(RetryPolicy::Attempts(3)),
                calls: vec![],
                respond: Box::new(respond),
            }
        }

        // Always succeeds, recovery time growing with the number of calls.
        pub fn steady() -> Self {
            Self::new(|cfg, nr| {
                let ns = 1_000_000 * (nr as u64 + 1);
                Ok(RecoveryResult {
                    ns,
                    run: format!("recovery/run{}", nr),
                    metrics: fake_metrics(cfg, ns),
                    count: cfg.num_objects,
                    size: cfg.object_size,
                })
            })
        }
    }

    impl RecoveryInvoker for FakeInvoker {
        fn insist_policy(&self) -> Insist {
            self.insist
        }

        fn attempt(&mut self, cfg: &RecoveryConfig) -> AttemptResult<RecoveryResult> {
            self.calls.push(cfg.clone());
            (self.respond)(cfg, self.calls.len() - 1)
        }
    }

    #[test]
    fn test_insist_retries_transient() {
        let _ = ::env_logger::try_init();
        let mut inv = FakeInvoker::new(|cfg, nr| match nr {
            0 | 1 => Err(Failure::transient(anyhow!("backup on rc03 exited with 1"))),
            _ => Ok(RecoveryResult {
                ns: 42,
                run: "recovery/x".into(),
                metrics: fake_metrics(cfg, 42),
                count: cfg.num_objects,
                size: cfg.object_size,
            }),
        });
        let cfg = RecoveryConfig::default();
        let res = inv.insist(&cfg).unwrap();
        assert_eq!(res.ns, 42);
        assert_eq!(inv.calls.len(), 3);
        assert!(inv.calls.iter().all(|c| c == &cfg));
    }

    #[test]
    fn test_insist_rejects_invalid_config() {
        let mut inv = FakeInvoker::steady();
        let cfg = RecoveryConfig::default().with("num_backups", 0u32).unwrap();
        assert!(matches!(inv.insist(&cfg), Err(FatalFailure::Error(_))));
        assert_eq!(inv.calls.len(), 0);
    }
}
