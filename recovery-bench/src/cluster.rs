// Copyright (c) Recovery Bench Developers.
use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use super::error::{AttemptResult, Failure, FatalFailure, OrFailure};
use super::insist::Insist;
use super::invoker::{RecoveryInvoker, RecoveryResult};
use super::parse::parse_recovery;
use rc_util::*;
use recovery_bench_intf::{ClusterConfig, Disk, RecoveryConfig};

const POLL_INTV: Duration = Duration::from_millis(100);
const METRICS_TRIES: u32 = 100;
pub const METRICS_SNAPSHOT: &str = "metrics.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub host: String,
    pub cmdline: String,
    pub log: String,
}

/// Where and how every process of one recovery runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub coordinator_locator: String,
    pub coordinator: Launch,
    pub old_master: Launch,
    pub backups: Vec<Launch>,
    pub new_masters: Vec<Launch>,
    pub client: Launch,
}

impl Plan {
    pub fn new(cluster: &ClusterConfig, cfg: &RecoveryConfig) -> Result<Self> {
        let coord_host = cluster.coordinator_host()?;
        let coord_loc = cluster.locator(coord_host, cluster.coordinator_port);
        let nr_backups = cfg.num_backups as usize;

        // With split disks, the first half of the backups use the primary
        // disk and the second half reuse the same hosts on the secondary
        // disk and port.
        let backup_hosts = match cfg.disk {
            Disk::Split => {
                let first_half = (nr_backups + 1) / 2;
                let hosts = cluster.backup_hosts(first_half)?;
                let mut placed = hosts.clone();
                placed.extend_from_slice(&hosts[..nr_backups / 2]);
                placed
            }
            _ => cluster.backup_hosts(nr_backups)?,
        };

        let mut backups = vec![];
        for (idx, host) in backup_hosts.iter().enumerate() {
            let disk_arg = cfg.disk.backup_arg(idx, nr_backups);
            let (port, log) = match cfg.disk {
                Disk::Split => {
                    let port = if idx < (nr_backups + 1) / 2 {
                        cluster.backup_port
                    } else {
                        cluster.second_backup_port
                    };
                    let dev = disk_arg.rsplit('/').next().unwrap_or("");
                    (port, format!("backup.{}.{}.log", &host.name, dev))
                }
                _ => (cluster.backup_port, format!("backup.{}.log", &host.name)),
            };
            backups.push(Launch {
                host: host.name.clone(),
                cmdline: join_cmdline(&[
                    &cluster.bin("backup"),
                    &disk_arg,
                    "-C",
                    &coord_loc,
                    "-L",
                    &cluster.locator(host, port),
                    &cfg.backup_args,
                ]),
                log,
            });
        }

        let new_masters = cluster
            .new_master_hosts(cfg.num_partitions as usize, cfg.host_allocation)?
            .into_iter()
            .map(|host| Launch {
                host: host.name.clone(),
                cmdline: join_cmdline(&[
                    &cluster.bin("server"),
                    "-r",
                    &format!("{}", cfg.replicas),
                    "-C",
                    &coord_loc,
                    "-L",
                    &cluster.locator(host, cluster.new_master_port),
                    &cfg.new_master_cmdline(),
                ]),
                log: format!("newMaster.{}.log", &host.name),
            })
            .collect();

        Ok(Self {
            coordinator: Launch {
                host: coord_host.name.clone(),
                cmdline: join_cmdline(&[
                    &cluster.bin("coordinator"),
                    "-C",
                    &coord_loc,
                    &cfg.coordinator_args,
                ]),
                log: format!("coordinator.{}.log", &coord_host.name),
            },
            old_master: Launch {
                host: coord_host.name.clone(),
                cmdline: join_cmdline(&[
                    &cluster.bin("server"),
                    "-r",
                    &format!("{}", cfg.replicas),
                    "-C",
                    &coord_loc,
                    "-L",
                    &cluster.locator(coord_host, cluster.old_master_port),
                    &cfg.old_master_cmdline(),
                ]),
                log: format!("oldMaster.{}.log", &coord_host.name),
            },
            backups,
            new_masters,
            client: Launch {
                host: coord_host.name.clone(),
                cmdline: join_cmdline(&[
                    &cluster.bin("client"),
                    "-d",
                    "-C",
                    &coord_loc,
                    "-n",
                    &format!("{}", cfg.num_objects),
                    "-s",
                    &format!("{}", cfg.object_size),
                    "-t",
                    &format!("{}", cfg.num_partitions),
                    "-k",
                    &format!("{}", cfg.num_partitions),
                    &cfg.client_args,
                ]),
                log: format!("client.{}.log", &coord_host.name),
            },
            coordinator_locator: coord_loc,
        })
    }
}

fn join_cmdline(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| p.len() > 0)
        .collect::<Vec<&str>>()
        .join(" ")
}

fn sonce() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

struct Process {
    host: String,
    cmdline: String,
    sonce: String,
    child: Child,
}

/// Owns the remote processes of one recovery attempt. Every process is
/// started through `regexec` under a random nonce so that dropping the
/// sandbox can kill it with `killpid` on the remote host.
pub struct Sandbox<'a> {
    cluster: &'a ClusterConfig,
    procs: Vec<Process>,
}

impl<'a> Sandbox<'a> {
    pub fn new(cluster: &'a ClusterConfig) -> Self {
        Self {
            cluster,
            procs: vec![],
        }
    }

    fn log_file(path: &Path, append: bool) -> Result<(Stdio, Stdio)> {
        let f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .with_context(|| format!("opening {:?}", path))?;
        let f2 = f.try_clone()?;
        Ok((Stdio::from(f), Stdio::from(f2)))
    }

    /// Starts `cmdline` on `host` in the background, output going to `log`.
    pub fn spawn(&mut self, host: &str, cmdline: &str, log: &Path) -> Result<usize> {
        let sonce = sonce();
        let (stdout, stderr) = Self::log_file(log, false)?;
        let mut cmd = Command::new(&self.cluster.ssh);
        cmd.arg(host)
            .arg(self.cluster.script("regexec"))
            .arg(&sonce)
            .arg(format!("'{}'", cmdline))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        debug!("sandbox: {} [{}] {}", host, &sonce, cmdline);
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning {:?} on {}", cmdline, host))?;
        self.procs.push(Process {
            host: host.into(),
            cmdline: cmdline.into(),
            sonce,
            child,
        });
        Ok(self.procs.len() - 1)
    }

    /// Runs `cmdline` on `host` to completion, appending its output to `log`.
    pub fn run(&self, host: &str, cmdline: &str, log: &Path) -> Result<()> {
        let (stdout, stderr) = Self::log_file(log, true)?;
        debug!("sandbox: {} {}", host, cmdline);
        run_command(
            Command::new(&self.cluster.ssh)
                .arg(host)
                .arg(self.cluster.script("remoteexec.py"))
                .arg(format!("'{}'", cmdline))
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr),
            &format!("{:?} failed on {}", cmdline, host),
        )
    }

    pub fn exit_status(&mut self, idx: usize) -> Result<Option<ExitStatus>> {
        match self.procs.get_mut(idx) {
            Some(proc) => Ok(proc.child.try_wait()?),
            None => bail!("invalid sandbox process index {}", idx),
        }
    }

    /// Fails if any process has exited unsuccessfully.
    pub fn check_failures(&mut self) -> Result<()> {
        for proc in self.procs.iter_mut() {
            if let Some(status) = proc.child.try_wait()? {
                if !status.success() {
                    bail!(
                        "{:?} on {} exited with {}",
                        &proc.cmdline,
                        &proc.host,
                        status
                    );
                }
            }
        }
        Ok(())
    }
}

impl<'a> Drop for Sandbox<'a> {
    fn drop(&mut self) {
        for proc in self.procs.iter() {
            let status = Command::new(&self.cluster.ssh)
                .arg(&proc.host)
                .arg(self.cluster.script("remoteexec.py"))
                .arg(format!("'{} {}'", self.cluster.script("killpid"), &proc.sonce))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if let Err(e) = status {
                warn!("sandbox: Failed to kill {} on {} ({})", &proc.sonce, &proc.host, &e);
            }
        }
        for proc in self.procs.iter_mut() {
            let _ = proc.child.kill();
            let _ = proc.child.wait();
        }
    }
}

// Spawn failures mean ssh itself is unusable, retrying won't help.
fn spawn(sb: &mut Sandbox, launch: &Launch, run_dir: &Path) -> AttemptResult<usize> {
    sb.spawn(&launch.host, &launch.cmdline, &run_dir.join(&launch.log))
        .or_fatal()
}

/// Creates `<results_dir>/<YYYYmmddHHMMSS>` and points `latest` at it.
pub fn create_run_dir(results_dir: &Path) -> Result<PathBuf> {
    ensure_dir(results_dir)?;

    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    let mut name = stamp.clone();
    let mut seq = 1;
    while results_dir.join(&name).exists() {
        name = format!("{}-{}", &stamp, seq);
        seq += 1;
    }
    let run_dir = results_dir.join(&name);
    fs::create_dir(&run_dir).with_context(|| format!("creating {:?}", &run_dir))?;

    let latest = results_dir.join("latest");
    if fs::symlink_metadata(&latest).is_ok() {
        fs::remove_file(&latest).with_context(|| format!("removing {:?}", &latest))?;
    }
    std::os::unix::fs::symlink(&name, &latest)
        .with_context(|| format!("linking {:?} to {:?}", &latest, &name))?;
    Ok(run_dir)
}

pub struct ClusterInvoker {
    cluster: ClusterConfig,
    results_dir: PathBuf,
    insist: Insist,
}

impl ClusterInvoker {
    pub fn new(cluster: ClusterConfig, results_dir: PathBuf, insist: Insist) -> Self {
        Self {
            cluster,
            results_dir,
            insist,
        }
    }

    fn check_bins(&self) -> Result<()> {
        for bin in &["coordinator", "server", "backup", "client", "ensureHosts"] {
            let path = self.cluster.bin(bin);
            if !Path::new(&path).exists() {
                bail!("{:?} not found", &path);
            }
        }
        Ok(())
    }

    // Waits until the coordinator knows about @qty servers. Failures of
    // already running processes take precedence over the wait's own error.
    fn ensure_hosts(
        sb: &mut Sandbox,
        plan: &Plan,
        bin: &str,
        run_dir: &Path,
        qty: usize,
    ) -> AttemptResult<()> {
        sb.check_failures().or_transient()?;
        let host = &plan.client.host;
        let res = sb.run(
            host,
            &join_cmdline(&[
                bin,
                "-C",
                &plan.coordinator_locator,
                "-n",
                &format!("{}", qty),
                "-l",
                "1",
            ]),
            &run_dir.join(format!("ensureHosts.{}.log", host)),
        );
        if let Err(e) = res {
            sb.check_failures().or_transient()?;
            return Err(Failure::transient(e));
        }
        Ok(())
    }

    fn wait_client(sb: &mut Sandbox, client: usize, timeout: f64) -> AttemptResult<()> {
        let started_at = Instant::now();
        loop {
            sb.check_failures().or_transient()?;
            if sb.exit_status(client).or_fatal()?.is_some() {
                return Ok(());
            }
            if wait_prog_state(POLL_INTV) == ProgState::Exiting {
                return Err(FatalFailure::Interrupted { attempts: 0 }.into());
            }
            if started_at.elapsed().as_secs_f64() > timeout {
                return Err(Failure::transient(anyhow!(
                    "client didn't finish in {}",
                    format_duration(timeout)
                )));
            }
        }
    }

    // Servers flush their metrics on exit which can lag behind the client.
    fn collect_metrics(run_dir: &Path) -> AttemptResult<recovery_bench_intf::RecoveryMetrics> {
        let mut last_err = None;
        for _ in 0..METRICS_TRIES {
            match parse_recovery(run_dir) {
                Ok(v) => return Ok(v),
                Err(e) => last_err = Some(e),
            }
            if wait_prog_state(POLL_INTV) == ProgState::Exiting {
                return Err(FatalFailure::Interrupted { attempts: 0 }.into());
            }
        }
        Err(Failure::transient(last_err.unwrap_or_else(|| {
            anyhow!("no metrics in {:?}", run_dir)
        })))
    }
}

impl RecoveryInvoker for ClusterInvoker {
    fn insist_policy(&self) -> Insist {
        self.insist
    }

    fn attempt(&mut self, cfg: &RecoveryConfig) -> AttemptResult<RecoveryResult> {
        let plan = Plan::new(&self.cluster, cfg).or_fatal()?;
        self.check_bins().or_fatal()?;
        let run_dir = create_run_dir(&self.results_dir).or_fatal()?;
        let ensure_hosts_bin = self.cluster.bin("ensureHosts");
        info!("cluster: Recovery run {:?}", &run_dir);

        let mut sb = Sandbox::new(&self.cluster);
        let rd = run_dir.as_path();

        spawn(&mut sb, &plan.coordinator, rd)?;
        Self::ensure_hosts(&mut sb, &plan, &ensure_hosts_bin, &run_dir, 0)?;

        spawn(&mut sb, &plan.old_master, rd)?;
        for backup in plan.backups.iter() {
            spawn(&mut sb, backup, rd)?;
        }
        Self::ensure_hosts(&mut sb, &plan, &ensure_hosts_bin, &run_dir, plan.backups.len() + 1)?;

        for master in plan.new_masters.iter() {
            spawn(&mut sb, master, rd)?;
        }
        Self::ensure_hosts(
            &mut sb,
            &plan,
            &ensure_hosts_bin,
            &run_dir,
            plan.backups.len() + 1 + plan.new_masters.len(),
        )?;

        let client = spawn(&mut sb, &plan.client, rd)?;
        Self::wait_client(&mut sb, client, cfg.timeout)?;
        drop(sb);

        let metrics = Self::collect_metrics(&run_dir)?;
        let snapshot = run_dir.join(METRICS_SNAPSHOT);
        if let Err(e) = metrics.save(&snapshot) {
            warn!("cluster: Failed to save {:?} ({:#})", &snapshot, &e);
        }
        Ok(RecoveryResult {
            ns: metrics.client.recovery_ns,
            run: run_dir.to_string_lossy().to_string(),
            metrics,
            count: cfg.num_objects,
            size: cfg.object_size,
        })
    }
}
