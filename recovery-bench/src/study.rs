// Copyright (c) Recovery Bench Developers.
use rc_util::*;

use super::error::ReduceError;
use recovery_bench_intf::{HostMetrics, RecoveryMetrics};

pub type ReduceResult<T> = std::result::Result<T, ReduceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Masters,
    Backups,
}

impl Role {
    pub fn hosts<'a>(&self, metrics: &'a RecoveryMetrics) -> &'a [HostMetrics] {
        match self {
            Self::Masters => &metrics.masters,
            Self::Backups => &metrics.backups,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Masters => "masters",
            Self::Backups => "backups",
        }
    }
}

pub fn ticks_to_secs(ticks: u64, freq: u64) -> f64 {
    ticks as f64 / freq as f64
}

pub fn ticks_to_ms(ticks: u64, freq: u64) -> f64 {
    ticks as f64 * TO_MSEC / freq as f64
}

pub fn to_gbits(bytes: u64) -> f64 {
    to_gb(bytes) * 8.0
}

/// Per-host scalar sequence reduced into a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub data: Vec<f64>,
}

impl Series {
    pub fn new(name: &str, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    fn check_nonempty(&self) -> ReduceResult<()> {
        match self.data.len() {
            0 => Err(ReduceError::EmptyCollection(self.name.clone())),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn mean(&self) -> ReduceResult<f64> {
        self.check_nonempty()?;
        Ok(statistical::mean(&self.data))
    }

    // Population standard deviation, zero for a single host.
    pub fn stdev(&self) -> ReduceResult<f64> {
        self.check_nonempty()?;
        Ok(match self.data.len() {
            1 => 0.0,
            _ => statistical::population_standard_deviation(&self.data, None),
        })
    }

    pub fn min(&self) -> ReduceResult<f64> {
        self.check_nonempty()?;
        Ok(self.data.iter().cloned().fold(std::f64::MAX, f64::min))
    }

    pub fn max(&self) -> ReduceResult<f64> {
        self.check_nonempty()?;
        Ok(self.data.iter().cloned().fold(std::f64::MIN, f64::max))
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean_min_max(&self) -> ReduceResult<(f64, f64, f64)> {
        Ok((self.mean()?, self.min()?, self.max()?))
    }

    pub fn map<F: Fn(f64) -> f64>(&self, func: F) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.iter().map(|v| func(*v)).collect(),
        }
    }

    pub fn to_ms(&self) -> Self {
        self.map(|v| v * TO_MSEC)
    }
}

fn check_hosts(name: &str, hosts: &[HostMetrics]) -> ReduceResult<()> {
    if hosts.len() == 0 {
        return Err(ReduceError::EmptyCollection(name.into()));
    }
    for host in hosts {
        if host.clock_frequency == 0 {
            return Err(ReduceError::ZeroClock(name.into()));
        }
    }
    Ok(())
}

/// Converts the tick counter picked by `sel` into seconds, per host, using
/// each host's own clock frequency.
pub fn normalize<F>(name: &str, hosts: &[HostMetrics], sel: F) -> ReduceResult<Series>
where
    F: Fn(&HostMetrics) -> u64,
{
    check_hosts(name, hosts)?;
    Ok(Series::new(
        name,
        hosts
            .iter()
            .map(|host| ticks_to_secs(sel(host), host.clock_frequency))
            .collect(),
    ))
}

// Same as normalize() for tick amounts combined from several counters,
// which can go negative when the counters overlap.
pub fn normalize_by<F>(name: &str, hosts: &[HostMetrics], sel: F) -> ReduceResult<Series>
where
    F: Fn(&HostMetrics) -> f64,
{
    check_hosts(name, hosts)?;
    Ok(Series::new(
        name,
        hosts
            .iter()
            .map(|host| sel(host) / host.clock_frequency as f64)
            .collect(),
    ))
}

pub fn normalize_ms<F>(name: &str, hosts: &[HostMetrics], sel: F) -> ReduceResult<Series>
where
    F: Fn(&HostMetrics) -> u64,
{
    check_hosts(name, hosts)?;
    Ok(Series::new(
        name,
        hosts
            .iter()
            .map(|host| ticks_to_ms(sel(host), host.clock_frequency))
            .collect(),
    ))
}

/// Raw per-host counter values.
pub fn counts<F>(name: &str, hosts: &[HostMetrics], sel: F) -> ReduceResult<Series>
where
    F: Fn(&HostMetrics) -> u64,
{
    if hosts.len() == 0 {
        return Err(ReduceError::EmptyCollection(name.into()));
    }
    Ok(Series::new(
        name,
        hosts.iter().map(|host| sel(host) as f64).collect(),
    ))
}

fn rate<B, T>(
    name: &str,
    hosts: &[HostMetrics],
    bytes: B,
    ticks: T,
    unit: fn(u64) -> f64,
) -> ReduceResult<Series>
where
    B: Fn(&HostMetrics) -> u64,
    T: Fn(&HostMetrics) -> u64,
{
    check_hosts(name, hosts)?;
    let mut data = vec![];
    for host in hosts {
        let secs = ticks_to_secs(ticks(host), host.clock_frequency);
        if secs == 0.0 {
            return Err(ReduceError::ZeroDivisor(name.into()));
        }
        data.push(unit(bytes(host)) / secs);
    }
    Ok(Series::new(name, data))
}

/// Per-host throughput in Gbit/s: bytes moved over the time the same host
/// spent moving them.
pub fn rate_gbps<B, T>(name: &str, hosts: &[HostMetrics], bytes: B, ticks: T) -> ReduceResult<Series>
where
    B: Fn(&HostMetrics) -> u64,
    T: Fn(&HostMetrics) -> u64,
{
    rate(name, hosts, bytes, ticks, to_gbits)
}

/// Per-host throughput in MB/s.
pub fn rate_mbps<B, T>(name: &str, hosts: &[HostMetrics], bytes: B, ticks: T) -> ReduceResult<Series>
where
    B: Fn(&HostMetrics) -> u64,
    T: Fn(&HostMetrics) -> u64,
{
    rate(name, hosts, bytes, ticks, to_mb::<u64>)
}

/// Estimates what `b` would have been on the hosts with the smallest and
/// the largest share of `a`, assuming every host processes its share at the
/// same rate: `extreme(a) * sum(b) / sum(a)`. This is an approximation, not
/// a measurement.
pub fn weighted_split(a: &Series, b: &Series) -> ReduceResult<(f64, f64)> {
    if a.len() != b.len() {
        return Err(ReduceError::LengthMismatch {
            name: format!("{}/{}", &a.name, &b.name),
            left: a.len(),
            right: b.len(),
        });
    }
    let sum_a = a.sum();
    if sum_a == 0.0 {
        return Err(ReduceError::ZeroDivisor(a.name.clone()));
    }
    let sum_b = b.sum();
    Ok((a.min()? * sum_b / sum_a, a.max()? * sum_b / sum_a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(freq: u64, recovery_ticks: u64) -> HostMetrics {
        let mut host = HostMetrics::default();
        host.clock_frequency = freq;
        host.recovery_ticks = recovery_ticks;
        host
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_normalize_mean_min_max() {
        let mut metrics = RecoveryMetrics::default();
        metrics.masters = vec![host(1000, 100), host(1000, 200), host(1000, 300)];

        let secs = normalize("masters", Role::Masters.hosts(&metrics), |h| h.recovery_ticks).unwrap();
        let (mean, min, max) = secs.mean_min_max().unwrap();
        assert!(approx(mean, 0.2));
        assert!(approx(min, 0.1));
        assert!(approx(max, 0.3));
        assert!(approx(secs.sum(), 0.6));
        assert!(approx(secs.stdev().unwrap(), (0.02f64 / 3.0).sqrt()));

        let ms = normalize_ms("masters", &metrics.masters, |h| h.recovery_ticks).unwrap();
        assert!(approx(ms.max().unwrap(), 300.0));
    }

    #[test]
    fn test_per_host_frequency() {
        let hosts = vec![host(1000, 500), host(2000, 500)];
        let secs = normalize("backups", &hosts, |h| h.recovery_ticks).unwrap();
        assert_eq!(secs.data, vec![0.5, 0.25]);

        let hosts = vec![host(1000, 500), host(0, 500)];
        assert_eq!(
            normalize("backups", &hosts, |h| h.recovery_ticks),
            Err(ReduceError::ZeroClock("backups".into()))
        );
    }

    #[test]
    fn test_weighted_split() {
        let segments = Series::new("segments", vec![10.0, 20.0]);
        let active = Series::new("active", vec![5.0, 15.0]);
        let (lo, hi) = weighted_split(&segments, &active).unwrap();
        assert!((lo - 6.67).abs() < 0.01);
        assert!((hi - 13.33).abs() < 0.01);

        let zero = Series::new("segments", vec![0.0, 0.0]);
        assert!(weighted_split(&zero, &active).is_err());
        let short = Series::new("segments", vec![1.0]);
        assert!(matches!(
            weighted_split(&short, &active),
            Err(ReduceError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_rate() {
        let mut h = host(1000, 0);
        h.backup.storage_read_bytes = 1 << 30;
        h.backup.storage_read_ticks = 2000;
        let rate = rate_gbps(
            "backups",
            &[h.clone()],
            |h| h.backup.storage_read_bytes,
            |h| h.backup.storage_read_ticks,
        )
        .unwrap();
        assert_eq!(rate.data, vec![4.0]);

        h.backup.storage_read_ticks = 0;
        assert_eq!(
            rate_gbps(
                "backups",
                &[h],
                |h| h.backup.storage_read_bytes,
                |h| h.backup.storage_read_ticks
            ),
            Err(ReduceError::ZeroDivisor("backups".into()))
        );
    }

    #[test]
    fn test_rate_mbps_and_combined_ticks() {
        let mut h = host(2000, 0);
        h.backup.storage_read_bytes = 3 << 20;
        h.backup.storage_write_bytes = 1 << 20;
        h.backup.storage_read_ticks = 1000;
        h.backup.storage_write_ticks = 1000;
        let rate = rate_mbps(
            "backups",
            &[h.clone()],
            |h| h.backup.storage_read_bytes + h.backup.storage_write_bytes,
            |h| h.backup.storage_read_ticks + h.backup.storage_write_ticks,
        )
        .unwrap();
        assert_eq!(rate.data, vec![4.0]);
        assert_eq!(to_gbits(1 << 30), 8.0);

        let other = normalize_by("backups", &[h], |h| {
            h.backup.storage_read_ticks as f64 - 3000.0
        })
        .unwrap();
        assert_eq!(other.data, vec![-1.0]);
        assert_eq!(
            normalize_by("masters", &[], |h| h.recovery_ticks as f64),
            Err(ReduceError::EmptyCollection("masters".into()))
        );
    }

    #[test]
    fn test_empty_collection() {
        let metrics = RecoveryMetrics::default();
        assert_eq!(
            normalize("backups", Role::Backups.hosts(&metrics), |h| h.recovery_ticks),
            Err(ReduceError::EmptyCollection("backups".into()))
        );
        assert!(Series::new("x", vec![]).mean().is_err());
        assert!(counts("masters", &metrics.masters, |h| h.pid).is_err());
    }
}
