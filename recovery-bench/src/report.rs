// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;

use super::error::ReduceError;
use super::study::*;
use rc_util::*;
use recovery_bench_intf::{HostMetrics, RecoveryMetrics};

type Fmt = fn(f64) -> String;

const OF_TOTAL: &str = "of total recovery";
// Per-host link capacity in Gb/s.
const LINK_GBPS: f64 = 32.0;

fn fmt_default(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:6}", v as i64)
    } else {
        format!("{:6.1}", v)
    }
}

fn fmt_f1(v: f64) -> String {
    format!("{:6.1}", v)
}

fn fmt_ms(v: f64) -> String {
    format!("{:6.1} ms", v)
}

fn fmt_ms_avg(v: f64) -> String {
    format!("{:6.2} ms avg", v)
}

fn fmt_secs(v: f64) -> String {
    format!("{:6.3} s", v)
}

fn fmt_bytes_avg(v: f64) -> String {
    format!("{:6.0} bytes avg", v)
}

fn fmt_gbps(v: f64) -> String {
    format!("{:4.2} Gb/s", v)
}

fn fmt_mbps(v: f64) -> String {
    format!("{:6.2} MB/s", v)
}

fn fmt_pct(v: f64) -> String {
    format!("{:6.2}%", v)
}

fn fmt_frac(v: f64) -> String {
    format!("{:6.2}%", v * TO_PCT)
}

/// One titled block of `label: col / col / col  (note)` lines. Lines whose
/// points are empty are left out.
struct Section {
    title: String,
    lines: Vec<(String, String)>,
}

impl Section {
    fn new(title: &str) -> Self {
        Self {
            title: title.into(),
            lines: vec![],
        }
    }

    fn line(&mut self, label: &str, columns: &[String], note: &str) {
        let columns = columns.join(" / ");
        let right = match note {
            "" => columns,
            note => format!("{}  ({})", columns, note),
        };
        self.lines.push((label.into(), right));
    }

    fn mean_stdev(label: &str, points: &[f64]) -> Option<(f64, f64)> {
        let series = Series::new(label, points.to_vec());
        match (series.mean(), series.stdev()) {
            (Ok(mean), Ok(stdev)) => Some((mean, stdev)),
            _ => None,
        }
    }

    // A single point is shown as is, several as average and standard
    // deviation. With @total, the share of it is appended.
    fn avg_std_frac(
        &mut self,
        label: &str,
        points: &[f64],
        fmt: Option<Fmt>,
        total: Option<(f64, &str)>,
        note: &str,
    ) {
        let mut columns = vec![];
        match points {
            [] => return,
            [point] => {
                columns.push(fmt.unwrap_or(fmt_default)(*point));
                if let Some((total, frac_label)) = total {
                    columns.push(format!("{} {}", fmt_frac(*point / total), frac_label));
                }
            }
            points => {
                let fmt = fmt.unwrap_or(fmt_f1);
                let (avg, stdev) = match Self::mean_stdev(label, points) {
                    Some(v) => v,
                    None => return,
                };
                columns.push(format!("{} avg", fmt(avg)));
                columns.push(format!("stddev {}", fmt(stdev)));
                if let Some((total, frac_label)) = total {
                    columns.push(format!("{} avg {}", fmt_frac(avg / total), frac_label));
                }
            }
        }
        self.line(label, &columns, note);
    }

    fn avg_std(&mut self, label: &str, points: &[f64], fmt: Option<Fmt>, note: &str) {
        self.avg_std_frac(label, points, fmt, None, note);
    }

    fn avg_std_sum(&mut self, label: &str, points: &[f64], fmt: Option<Fmt>, note: &str) {
        let mut columns = vec![];
        match points {
            [] => return,
            [point] => columns.push(fmt.unwrap_or(fmt_default)(*point)),
            points => {
                let (avg, stdev) = match Self::mean_stdev(label, points) {
                    Some(v) => v,
                    None => return,
                };
                let sum: f64 = points.iter().sum();
                let (avg_fmt, sum_fmt) = match fmt {
                    Some(fmt) => (fmt, fmt),
                    None => (fmt_f1 as Fmt, fmt_default as Fmt),
                };
                columns.push(format!("{} avg", avg_fmt(avg)));
                columns.push(format!("stddev {}", avg_fmt(stdev)));
                columns.push(format!("{} total", sum_fmt(sum)));
            }
        }
        self.line(label, &columns, note);
    }

    // @secs and @total_secs are in seconds and shown in milliseconds.
    fn ms(&mut self, label: &str, secs: &[f64], total_secs: f64) {
        let ms: Vec<f64> = secs.iter().map(|v| v * TO_MSEC).collect();
        self.avg_std_frac(
            label,
            &ms,
            Some(fmt_ms),
            Some((total_secs * TO_MSEC, OF_TOTAL)),
            "",
        );
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "=== {} ===", &self.title)?;
        let width = self.lines.iter().map(|(l, _)| l.len()).max().unwrap_or(0) + 1;
        for (label, columns) in self.lines.iter() {
            write!(
                f,
                "\n{:width$} {}",
                format!("{}:", label),
                columns,
                width = width
            )?;
        }
        Ok(())
    }
}

fn per_host<F>(hosts: &[HostMetrics], func: F) -> Vec<f64>
where
    F: Fn(&HostMetrics) -> f64,
{
    hosts.iter().map(func).collect()
}

// An absent role has nothing to show, any other reduction error is real.
fn points(res: ReduceResult<Series>) -> Result<Vec<f64>> {
    match res {
        Ok(series) => Ok(series.data),
        Err(ReduceError::EmptyCollection(_)) => Ok(vec![]),
        Err(e) => Err(e.into()),
    }
}

// Only the hosts for which @ticks is non-zero.
fn active_hosts<T>(hosts: &[HostMetrics], ticks: T) -> Vec<HostMetrics>
where
    T: Fn(&HostMetrics) -> u64,
{
    hosts.iter().filter(|h| ticks(*h) > 0).cloned().collect()
}

fn summary(m: &RecoveryMetrics, total: f64) -> Section {
    let mut sect = Section::new("Summary");
    sect.avg_std("Recovery time", &[total], Some(fmt_secs), "");
    sect.avg_std("Masters", &[m.masters.len() as f64], None, "");
    sect.avg_std("Backups", &[m.backups.len() as f64], None, "");
    sect.avg_std(
        "Number of objects",
        &[m.masters.iter().map(|h| h.master.live_object_count).sum::<u64>() as f64],
        None,
        "",
    );
    let sizes: Vec<f64> = m
        .masters
        .iter()
        .filter(|h| h.master.live_object_count > 0)
        .map(|h| h.master.live_object_bytes as f64 / h.master.live_object_count as f64)
        .collect();
    sect.avg_std("Object size", &sizes, Some(fmt_bytes_avg), "");

    if m.backups.len() > 0 {
        let types: BTreeSet<u64> = m.backups.iter().map(|h| h.backup.storage_type).collect();
        let storage = match types.iter().next().cloned() {
            _ if types.len() > 1 => "mixed",
            Some(1) => "memory",
            Some(2) => "disk",
            _ => "unknown",
        };
        sect.line("Storage type", &[storage.to_string()], "");
    }
    sect
}

fn coordinator_time(m: &RecoveryMetrics, total: f64) -> Section {
    let c = &m.coordinator;
    let freq = c.clock_frequency;
    let mut sect = Section::new("Coordinator Time");
    sect.ms("Total", &[ticks_to_secs(c.recovery_ticks, freq)], total);
    sect.ms("  Idle", &[ticks_to_secs(c.idle_ticks, freq)], total);
    sect.ms(
        "  Starting recovery on backups",
        &[ticks_to_secs(c.coordinator.recovery_constructor_ticks, freq)],
        total,
    );
    sect.ms(
        "  Starting recovery on masters",
        &[ticks_to_secs(c.coordinator.recovery_start_ticks, freq)],
        total,
    );
    let other = c.recovery_ticks as f64
        - c.idle_ticks as f64
        - c.coordinator.recovery_constructor_ticks as f64
        - c.coordinator.recovery_start_ticks as f64;
    sect.ms("  Other", &[other / freq as f64], total);
    sect
}

/// Per-host time breakdown of `role`, each line selecting a tick amount.
fn role_time(
    m: &RecoveryMetrics,
    role: Role,
    title: &str,
    total: f64,
    lines: &[(&str, fn(&HostMetrics) -> f64)],
) -> Result<Section> {
    let mut sect = Section::new(title);
    for (label, sel) in lines.iter() {
        let secs = points(normalize_by(role.name(), role.hosts(m), |h| sel(h)))?;
        sect.ms(label, &secs, total);
    }
    Ok(sect)
}

fn master_time(m: &RecoveryMetrics, total: f64) -> Result<Section> {
    role_time(
        m,
        Role::Masters,
        "Master Time",
        total,
        &[
            ("Total", |h| h.recovery_ticks as f64),
            ("Inside recoverSegment", |h| {
                h.master.recover_segment_ticks as f64
            }),
            ("  Backup opens, writes", |h| {
                h.master.backup_manager_ticks as f64
            }),
            ("  Approx. CPU", |h| {
                h.master.recover_segment_ticks as f64 - h.master.backup_manager_ticks as f64
            }),
            ("    Verify checksum", |h| {
                h.master.verify_checksum_ticks as f64
            }),
            ("    Segment append copy", |h| {
                h.master.segment_append_copy_ticks as f64
            }),
            ("    Segment append checksum", |h| {
                h.master.segment_append_checksum_ticks as f64
            }),
            ("    HT, profiler, etc", |h| {
                h.master.recover_segment_ticks as f64
                    - h.master.backup_manager_ticks as f64
                    - h.master.verify_checksum_ticks as f64
                    - h.master.segment_append_copy_ticks as f64
                    - h.master.segment_append_checksum_ticks as f64
            }),
            ("Waiting for backups", |h| {
                (h.master.segment_open_stall_ticks
                    + h.master.segment_write_stall_ticks
                    + h.master.segment_read_stall_ticks) as f64
            }),
            ("  Stalled on segment open", |h| {
                h.master.segment_open_stall_ticks as f64
            }),
            ("  Stalled on segment write", |h| {
                h.master.segment_write_stall_ticks as f64
            }),
            ("  Stalled on segment read", |h| {
                h.master.segment_read_stall_ticks as f64
            }),
            ("Removing tombstones", |h| {
                h.master.remove_tombstone_ticks as f64
            }),
            ("Replicating", |h| h.master.replication_ticks as f64),
            ("Syncing the log", |h| h.master.log_sync_ticks as f64),
            ("Transmitting in transport", |h| {
                h.transport.transmit.ticks as f64
            }),
            ("Opening sessions", |h| {
                h.transport.session_open_ticks as f64
            }),
        ],
    )
}

fn backup_time(m: &RecoveryMetrics, total: f64) -> Result<Section> {
    role_time(
        m,
        Role::Backups,
        "Backup Time",
        total,
        &[
            ("Total in RPC thread", |h| h.recovery_ticks as f64),
            ("  Idle", |h| h.idle_ticks as f64),
            ("  startReadingData", |h| {
                h.backup.start_reading_data_ticks as f64
            }),
            ("  Open/write segment", |h| h.backup.write_ticks as f64),
            ("    Open segment memset", |h| {
                h.backup.write_clear_ticks as f64
            }),
            ("    Copy", |h| h.backup.write_copy_ticks as f64),
            ("    Other", |h| {
                h.backup.write_ticks as f64
                    - h.backup.write_clear_ticks as f64
                    - h.backup.write_copy_ticks as f64
            }),
            ("  Read segment stall", |h| {
                h.backup.read_stall_ticks as f64
            }),
            ("  Transmitting in transport", |h| {
                h.transport.transmit.ticks as f64
            }),
            ("  Other", |h| {
                h.recovery_ticks as f64
                    - h.idle_ticks as f64
                    - h.backup.start_reading_data_ticks as f64
                    - h.backup.write_ticks as f64
                    - h.backup.read_stall_ticks as f64
                    - h.transport.transmit.ticks as f64
            }),
            ("Filtering segments", |h| h.backup.filter_ticks as f64),
        ],
    )
}

fn efficiency(m: &RecoveryMetrics) -> Result<Section> {
    let mut sect = Section::new("Efficiency");
    let masters = Role::Masters;
    let backups = Role::Backups;

    let segments_read: u64 = m.masters.iter().map(|h| h.master.segment_read_count).sum();
    if segments_read > 0 {
        let cpu = points(normalize_by(masters.name(), masters.hosts(m), |h| {
            h.master.recover_segment_ticks as f64 - h.master.backup_manager_ticks as f64
        }))?;
        sect.avg_std(
            "recoverSegment CPU",
            &[cpu.iter().sum::<f64>() * TO_MSEC / segments_read as f64],
            Some(fmt_ms_avg),
            "per filtered segment",
        );
    }

    // Each segment is written twice, once to open and once for the data.
    let segments_written: f64 = m.backups.iter().map(|h| h.backup.write_count as f64 / 2.0).sum();
    if segments_written > 0.0 {
        let write = points(normalize(backups.name(), backups.hosts(m), |h| {
            h.backup.write_ticks
        }))?;
        sect.avg_std(
            "Writing a segment",
            &[write.iter().sum::<f64>() * TO_MSEC / segments_written],
            Some(fmt_ms_avg),
            "backup RPC thread",
        );
    }

    let segments_filtered: u64 = m.backups.iter().map(|h| h.backup.storage_read_count).sum();
    if segments_filtered > 0 {
        let filter = points(normalize(backups.name(), backups.hosts(m), |h| {
            h.backup.filter_ticks
        }))?;
        sect.avg_std(
            "Filtering a segment",
            &[filter.iter().sum::<f64>() * TO_MSEC / segments_filtered as f64],
            Some(fmt_ms_avg),
            "",
        );
    }
    Ok(sect)
}

fn network(m: &RecoveryMetrics, total: f64) -> Result<Section> {
    let mut sect = Section::new("Network Utilization");
    let all = std::iter::once(&m.coordinator)
        .chain(m.masters.iter())
        .chain(m.backups.iter());
    let aggregate = to_gbits(all.map(|h| h.transport.transmit.byte_count).sum()) / total;
    let capacity = m.masters.len().max(m.backups.len()) as f64 * LINK_GBPS;
    if capacity > 0.0 {
        sect.avg_std_frac(
            "Aggregate",
            &[aggregate],
            Some(fmt_gbps),
            Some((capacity, "of network capacity")),
            "overall",
        );
    }

    for role in &[Role::Masters, Role::Backups] {
        let hosts = role.hosts(m);
        let label = match role {
            Role::Masters => "Master",
            Role::Backups => "Backup",
        };
        sect.avg_std_sum(
            &format!("{} in", label),
            &per_host(hosts, |h| to_gbits(h.transport.receive.byte_count) / total),
            Some(fmt_gbps),
            "overall",
        );
        sect.avg_std_sum(
            &format!("{} out", label),
            &per_host(hosts, |h| to_gbits(h.transport.transmit.byte_count) / total),
            Some(fmt_gbps),
            "overall",
        );
        let sending = active_hosts(hosts, |h| h.transport.transmit.ticks);
        let rate = points(rate_gbps(
            role.name(),
            &sending,
            |h| h.transport.transmit.byte_count,
            |h| h.transport.transmit.ticks,
        ))?;
        sect.avg_std_sum(
            &format!("{} out active", label),
            &rate,
            Some(fmt_gbps),
            "while transmitting",
        );
    }
    Ok(sect)
}

fn disk(m: &RecoveryMetrics, total: f64) -> Result<Section> {
    let role = Role::Backups;
    let hosts = role.hosts(m);
    let mut sect = Section::new("Disk Utilization");
    let bytes = |h: &HostMetrics| h.backup.storage_read_bytes + h.backup.storage_write_bytes;
    let ticks = |h: &HostMetrics| h.backup.storage_read_ticks + h.backup.storage_write_ticks;
    let pct_of_total = |secs: Vec<f64>| -> Vec<f64> {
        secs.into_iter().map(|v| v * TO_PCT / total).collect()
    };

    sect.avg_std_sum(
        "Effective bandwidth",
        &per_host(hosts, |h| to_mb(bytes(h)) / total),
        Some(fmt_mbps),
        "",
    );
    let active = points(rate_mbps(
        role.name(),
        &active_hosts(hosts, ticks),
        bytes,
        ticks,
    ))?;
    sect.avg_std_sum("Active bandwidth", &active, Some(fmt_mbps), "");
    sect.avg_std(
        "Disk active",
        &pct_of_total(points(normalize(role.name(), hosts, ticks))?),
        Some(fmt_pct),
        OF_TOTAL,
    );
    sect.avg_std(
        "  Reading",
        &pct_of_total(points(normalize(role.name(), hosts, |h| {
            h.backup.storage_read_ticks
        }))?),
        Some(fmt_pct),
        OF_TOTAL,
    );
    sect.avg_std(
        "  Writing",
        &pct_of_total(points(normalize(role.name(), hosts, |h| {
            h.backup.storage_write_ticks
        }))?),
        Some(fmt_pct),
        OF_TOTAL,
    );
    Ok(sect)
}

fn backup_events(m: &RecoveryMetrics) -> Result<Section> {
    let role = Role::Backups;
    let mut sect = Section::new("Backup Events");
    let lines: &[(&str, fn(&HostMetrics) -> u64)] = &[
        ("Segments read", |h| h.backup.storage_read_count),
        ("Primary segments loaded", |h| h.backup.primary_load_count),
        ("Secondary segments loaded", |h| {
            h.backup.secondary_load_count
        }),
    ];
    for (label, sel) in lines.iter() {
        let nr = points(counts(role.name(), role.hosts(m), sel))?;
        sect.avg_std(label, &nr, None, "");
    }
    Ok(sect)
}

fn local_metrics(m: &RecoveryMetrics, total: f64) -> Result<Section> {
    let mut sect = Section::new("Local Metrics");
    let coord = std::slice::from_ref(&m.coordinator);
    for (hosts, role) in &[
        (coord, "coordinator"),
        (&m.masters[..], "master"),
        (&m.backups[..], "backup"),
    ] {
        let value = |h: &HostMetrics, key: &str| -> u64 {
            h.local(role)
                .and_then(|local| local.get(key))
                .cloned()
                .unwrap_or(0)
        };
        for i in 0..10 {
            let key = format!("ticks{}", i);
            let secs = points(normalize(role, hosts, |h| value(h, &key)))?;
            if secs.iter().any(|v| *v != 0.0) {
                sect.ms(&format!("{}.local.{}", role, &key), &secs, total);
            }
        }
        for i in 0..10 {
            let key = format!("count{}", i);
            let nr = points(counts(role, hosts, |h| value(h, &key)))?;
            if nr.iter().any(|v| *v != 0.0) {
                sect.avg_std(&format!("{}.local.{}", role, &key), &nr, None, "");
            }
        }
    }
    Ok(sect)
}

/// Writes the human readable breakdown of one recovery.
pub fn format_report<W: Write>(out: &mut W, m: &RecoveryMetrics) -> Result<()> {
    m.validate()?;
    if m.client.recovery_ns == 0 {
        bail!("recovery time is zero");
    }
    let total = m.client.recovery_ns as f64 / 1_000_000_000.0;

    let sections = vec![
        summary(m, total),
        coordinator_time(m, total),
        master_time(m, total)?,
        backup_time(m, total)?,
        efficiency(m)?,
        network(m, total)?,
        disk(m, total)?,
        backup_events(m)?,
        local_metrics(m, total)?,
    ];
    let body = sections
        .iter()
        .filter(|sect| sect.lines.len() > 0)
        .map(|sect| format!("{}", sect))
        .collect::<Vec<String>>()
        .join("\n\n");
    writeln!(out, "{}", body)?;
    Ok(())
}
