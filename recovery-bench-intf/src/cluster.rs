// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::HostAllocation;

const CLUSTER_DOC: &str = "\
//
// Recovery cluster description
//
//  hosts[].name: Host name used for ssh
//  hosts[].addr: Address the servers listen on
//  transport: Transport prefix of service locators (e.g. infrc, fast+udp)
//  bin_dir: Directory holding coordinator, server, backup, client and
//           ensureHosts binaries
//  scripts_dir: Directory holding regexec, killpid and remoteexec.py
//  ssh: Remote shell command
//  *_port: Listen port of each process role
//
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub addr: String,
}

impl Host {
    pub fn new(name: &str, addr: &str) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub hosts: Vec<Host>,
    pub transport: String,
    pub bin_dir: String,
    pub scripts_dir: String,
    pub ssh: String,
    pub coordinator_port: u16,
    pub old_master_port: u16,
    pub backup_port: u16,
    pub second_backup_port: u16,
    pub new_master_port: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: (1..=36)
                .map(|i| Host::new(&format!("rc{:02}", i), &format!("192.168.1.{}", 100 + i)))
                .collect(),
            transport: "infrc".into(),
            bin_dir: "obj.master".into(),
            scripts_dir: "scripts".into(),
            ssh: "ssh".into(),
            coordinator_port: 12246,
            old_master_port: 12242,
            backup_port: 12243,
            second_backup_port: 12244,
            new_master_port: 12247,
        }
    }
}

impl rc_util::JsonLoad for ClusterConfig {}
impl rc_util::JsonSave for ClusterConfig {
    fn preamble() -> Option<String> {
        Some(CLUSTER_DOC.to_string())
    }
}

impl ClusterConfig {
    pub fn locator(&self, host: &Host, port: u16) -> String {
        format!("{}:host={},port={}", &self.transport, &host.addr, port)
    }

    pub fn bin(&self, name: &str) -> String {
        format!("{}/{}", &self.bin_dir, name)
    }

    pub fn script(&self, name: &str) -> String {
        format!("{}/{}", &self.scripts_dir, name)
    }

    // Host 0 runs the coordinator, the dying master and the client.
    pub fn coordinator_host(&self) -> Result<&Host> {
        match self.hosts.first() {
            Some(host) => Ok(host),
            None => bail!("cluster has no hosts"),
        }
    }

    // Hosts available to backups and recovery masters: everything after the
    // coordinator host, with the coordinator host itself last.
    pub fn worker_hosts(&self) -> Vec<&Host> {
        let mut hosts: Vec<&Host> = self.hosts.iter().skip(1).collect();
        if let Some(first) = self.hosts.first() {
            hosts.push(first);
        }
        hosts
    }

    pub fn backup_hosts(&self, nr: usize) -> Result<Vec<&Host>> {
        let workers = self.worker_hosts();
        if nr > workers.len() {
            bail!(
                "{} backup hosts requested but the cluster only has {}",
                nr,
                workers.len()
            );
        }
        Ok(workers[..nr].to_vec())
    }

    pub fn new_master_hosts(&self, nr: usize, alloc: HostAllocation) -> Result<Vec<&Host>> {
        let workers = self.worker_hosts();
        if nr > workers.len() {
            bail!(
                "{} recovery master hosts requested but the cluster only has {}",
                nr,
                workers.len()
            );
        }
        Ok(match alloc {
            HostAllocation::Forward => workers[..nr].to_vec(),
            HostAllocation::Reverse => workers[workers.len() - nr..].iter().rev().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ClusterConfig;
    use crate::HostAllocation;

    #[test]
    fn test_default_cluster() {
        let cluster = ClusterConfig::default();
        assert_eq!(cluster.hosts.len(), 36);
        assert_eq!(cluster.hosts[0].name, "rc01");
        assert_eq!(cluster.hosts[35].addr, "192.168.1.136");

        let coord = cluster.coordinator_host().unwrap();
        assert_eq!(
            cluster.locator(coord, cluster.coordinator_port),
            "infrc:host=192.168.1.101,port=12246"
        );
    }

    #[test]
    fn test_host_allocation() {
        let cluster = ClusterConfig::default();
        let workers = cluster.worker_hosts();
        assert_eq!(workers[0].name, "rc02");
        assert_eq!(workers[35].name, "rc01");

        let fwd = cluster.new_master_hosts(2, HostAllocation::Forward).unwrap();
        assert_eq!(fwd[0].name, "rc02");
        assert_eq!(fwd[1].name, "rc03");

        let rev = cluster.new_master_hosts(2, HostAllocation::Reverse).unwrap();
        assert_eq!(rev[0].name, "rc01");
        assert_eq!(rev[1].name, "rc36");

        assert!(cluster.backup_hosts(37).is_err());
    }
}
