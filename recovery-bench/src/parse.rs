// Copyright (c) Recovery Bench Developers.
use anyhow::{anyhow, bail, Context, Result};
use log::trace;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use recovery_bench_intf::{ClientMetrics, HostMetrics, RecoveryMetrics};

// Every log line starts with timestamp, source location, function, level
// and thread fields.
const LOG_PREFIX_TOKENS: usize = 6;

fn strip_prefix(line: &str) -> String {
    line.split(' ')
        .skip(LOG_PREFIX_TOKENS)
        .collect::<Vec<&str>>()
        .join(" ")
}

fn insert_path(node: &mut Map<String, Value>, keys: &[&str], val: u64) -> Result<()> {
    match keys {
        [] => bail!("empty metrics path"),
        [key, ..] if key.len() == 0 => bail!("empty component in metrics path"),
        [key] => {
            node.insert(key.to_string(), Value::from(val));
            Ok(())
        }
        [key, rest @ ..] => {
            let child = node
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child.as_object_mut() {
                Some(child) => insert_path(child, rest, val),
                None => bail!("{:?} is both a value and a group", key),
            }
        }
    }
}

/// Parses the metrics block a server logs when it exits.
pub fn parse_host_metrics(name: &str, body: &str) -> Result<HostMetrics> {
    let mut lines: Option<Vec<String>> = None;
    for line in body.lines() {
        let line = strip_prefix(line);
        match line.as_str() {
            "Metrics:" => lines = Some(vec![]),
            "End of Metrics" => break,
            _ => {
                if let Some(lines) = lines.as_mut() {
                    lines.push(line);
                }
            }
        }
    }

    let lines = match lines {
        Some(v) if v.len() > 0 => v,
        _ => bail!("no metrics in {}", name),
    };

    let mut root = Map::new();
    for line in lines.iter() {
        let mut kv = line.splitn(2, " = ");
        let (var, val) = match (kv.next(), kv.next()) {
            (Some(var), Some(val)) => (var, val),
            _ => bail!("{}: malformed metrics line {:?}", name, line),
        };
        let path = match var.find("metrics->") {
            Some(pos) => &var[pos + "metrics->".len()..],
            None => bail!("{}: malformed metrics variable {:?}", name, var),
        };
        let val = val
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{}: invalid value for {:?}", name, path))?;
        trace!("parse: {} {} = {}", name, path, val);
        insert_path(&mut root, &path.split('.').collect::<Vec<&str>>(), val)
            .with_context(|| format!("{}: {:?}", name, path))?;
    }

    serde_json::from_value::<HostMetrics>(Value::Object(root))
        .with_context(|| format!("{}: unexpected metrics layout", name))
}

pub fn parse_client_log(name: &str, body: &str) -> Result<ClientMetrics> {
    const PREFIX: &str = "Recovery completed in ";
    let mut recovery_ns = None;
    for line in body.lines() {
        if let Some(pos) = line.find(PREFIX) {
            let rest = &line[pos + PREFIX.len()..];
            let mut toks = rest.split_whitespace();
            if let (Some(ns), Some("ns")) = (toks.next(), toks.next()) {
                if let Ok(ns) = ns.parse::<u64>() {
                    recovery_ns = Some(ns);
                }
            }
        }
    }
    match recovery_ns {
        Some(recovery_ns) => Ok(ClientMetrics { recovery_ns }),
        None => bail!("no recovery time in {}", name),
    }
}

fn find_logs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/{}", dir.to_string_lossy(), pattern);
    let mut paths = vec![];
    for entry in glob::glob(&pattern)? {
        paths.push(entry?);
    }
    paths.sort();
    Ok(paths)
}

fn parse_log_file(path: &Path) -> Result<HostMetrics> {
    let body = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    parse_host_metrics(&path.to_string_lossy(), &body)
}

fn first_log(dir: &Path, pattern: &str) -> Result<PathBuf> {
    find_logs(dir, pattern)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no {} in {:?}", pattern, dir))
}

/// Reads the metrics tree of the recovery run in `dir` and validates it.
pub fn parse_recovery<P: AsRef<Path>>(dir: P) -> Result<RecoveryMetrics> {
    let dir = dir.as_ref();

    let coordinator = parse_log_file(&first_log(dir, "coordinator.*.log")?)?;

    let mut masters = vec![];
    for path in find_logs(dir, "newMaster.*.log")? {
        masters.push(parse_log_file(&path)?);
    }

    let mut backups = vec![];
    for path in find_logs(dir, "backup.*.log")? {
        backups.push(parse_log_file(&path)?);
    }

    let client_log = first_log(dir, "client.*.log")?;
    let body =
        fs::read_to_string(&client_log).with_context(|| format!("reading {:?}", &client_log))?;
    let client = parse_client_log(&client_log.to_string_lossy(), &body)?;

    let metrics = RecoveryMetrics {
        coordinator,
        masters,
        backups,
        client,
    };
    metrics.validate()?;
    Ok(metrics)
}

#[cfg(test)]
pub mod tests {
    use super::{parse_client_log, parse_host_metrics, parse_recovery};
    use std::fs;
    use std::path::Path;

    const PREFIX: &str = "1317341573.466823 Recovery.cc:129 in log NOTICE [1:1]:";

    pub fn metrics_log(lines: &[(&str, u64)]) -> String {
        let mut buf = format!("{} Server listening\n{} Metrics:\n", PREFIX, PREFIX);
        for (path, val) in lines {
            buf += &format!("{} metrics->{} = {}\n", PREFIX, path, val);
        }
        buf += &format!("{} End of Metrics\n{} Exiting\n", PREFIX, PREFIX);
        buf
    }

    pub fn write_run_dir(dir: &Path, nr_masters: usize, nr_backups: usize, recovery_ns: u64) {
        fs::write(
            dir.join("coordinator.rc01.log"),
            metrics_log(&[("clockFrequency", 1000), ("recoveryTicks", 900)]),
        )
        .unwrap();
        for i in 0..nr_masters {
            fs::write(
                dir.join(format!("newMaster.rc{:02}.log", i + 2)),
                metrics_log(&[
                    ("clockFrequency", 1000),
                    ("recoveryTicks", 100 * (i as u64 + 1)),
                    ("master.liveObjectCount", 1000),
                    ("master.liveObjectBytes", 1024 * 1000),
                ]),
            )
            .unwrap();
        }
        for i in 0..nr_backups {
            fs::write(
                dir.join(format!("backup.rc{:02}.log", i + 2)),
                metrics_log(&[
                    ("clockFrequency", 2000),
                    ("recoveryTicks", 1000),
                    ("backup.storageReadTicks", 200 * (i as u64 + 1)),
                    ("backup.storageReadCount", 10 * (i as u64 + 1)),
                    ("backup.readingDataTicks", 400),
                    ("backup.storageType", 2),
                ]),
            )
            .unwrap();
        }
        fs::write(
            dir.join("client.rc01.log"),
            format!("{} Recovery completed in {} ns\n", PREFIX, recovery_ns),
        )
        .unwrap();
    }

    #[test]
    fn test_parse_host_metrics() {
        let log = metrics_log(&[
            ("serverRole", 1),
            ("clockFrequency", 2_400_000_000),
            ("transport.transmit.byteCount", 4096),
            ("master.segmentReadStallTicks", 77),
            ("master.local.ticks0", 5),
        ]);
        let host = parse_host_metrics("newMaster.rc02.log", &log).unwrap();
        assert_eq!(host.server_role, 1);
        assert_eq!(host.clock_frequency, 2_400_000_000);
        assert_eq!(host.transport.transmit.byte_count, 4096);
        assert_eq!(host.master.segment_read_stall_ticks, 77);
        assert_eq!(host.master.local["ticks0"], 5);

        assert!(parse_host_metrics("empty", "no metrics here\n").is_err());
        let bad = format!("{} Metrics:\n{} metrics->x = lots\n", PREFIX, PREFIX);
        assert!(parse_host_metrics("bad", &bad).is_err());
    }

    #[test]
    fn test_parse_client_log() {
        let log = format!("{} Recovery completed in 812345678 ns\n", PREFIX);
        assert_eq!(parse_client_log("client", &log).unwrap().recovery_ns, 812345678);
        assert!(parse_client_log("client", "crashed\n").is_err());
    }

    #[test]
    fn test_parse_recovery_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_run_dir(dir.path(), 2, 3, 1_500_000_000);

        let metrics = parse_recovery(dir.path()).unwrap();
        assert_eq!(metrics.coordinator.recovery_ticks, 900);
        assert_eq!(metrics.masters.len(), 2);
        assert_eq!(metrics.masters[1].recovery_ticks, 200);
        assert_eq!(metrics.backups.len(), 3);
        assert_eq!(metrics.backups[2].backup.storage_read_count, 30);
        assert_eq!(metrics.client.recovery_ns, 1_500_000_000);

        fs::remove_file(dir.path().join("client.rc01.log")).unwrap();
        assert!(parse_recovery(dir.path()).is_err());
    }
}
