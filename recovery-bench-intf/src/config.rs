// Copyright (c) Recovery Bench Developers.
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use rc_util::parse_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostAllocation {
    Forward,
    // Recovery masters are taken from the end of the host list.
    Reverse,
}

impl HostAllocation {
    pub fn from_index(idx: u64) -> Result<Self> {
        match idx {
            0 => Ok(Self::Forward),
            1 => Ok(Self::Reverse),
            v => bail!("host allocation strategy should be 0 or 1, not {}", v),
        }
    }
}

impl FromStr for HostAllocation {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "forward" => Ok(Self::Forward),
            "reverse" => Ok(Self::Reverse),
            v => Self::from_index(
                v.parse::<u64>()
                    .map_err(|_| anyhow!("invalid host allocation {:?}", v))?,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disk {
    Memory,
    Primary,
    Secondary,
    // Half of the backups on the primary disk, the other half on the
    // secondary one, two backup processes per host.
    Split,
    Raid,
    Device(String),
}

impl Disk {
    pub const PRIMARY_DEV: &'static str = "/dev/sda2";
    pub const SECONDARY_DEV: &'static str = "/dev/sdb2";
    pub const RAID_DEV: &'static str = "/dev/md2";

    pub fn from_index(idx: u64) -> Result<Self> {
        Ok(match idx {
            0 => Self::Memory,
            1 => Self::Primary,
            2 => Self::Secondary,
            3 => Self::Split,
            4 => Self::Raid,
            v => bail!("disk should be an integer between 0 and 4, not {}", v),
        })
    }

    // Storage argument for the @idx'th of @nr backups.
    pub fn backup_arg(&self, idx: usize, nr: usize) -> String {
        match self {
            Self::Memory => "-m".into(),
            Self::Primary => format!("-f {}", Self::PRIMARY_DEV),
            Self::Secondary => format!("-f {}", Self::SECONDARY_DEV),
            Self::Raid => format!("-f {}", Self::RAID_DEV),
            Self::Device(dev) => format!("-f {}", dev),
            Self::Split => {
                if idx < (nr + 1) / 2 {
                    format!("-f {}", Self::PRIMARY_DEV)
                } else {
                    format!("-f {}", Self::SECONDARY_DEV)
                }
            }
        }
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::Primary
    }
}

impl FromStr for Disk {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "memory" => Ok(Self::Memory),
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "split" => Ok(Self::Split),
            "raid" => Ok(Self::Raid),
            v if v.starts_with('/') => Ok(Self::Device(v.into())),
            v => Self::from_index(
                v.parse::<u64>()
                    .map_err(|_| anyhow!("invalid disk selector {:?}", v))?,
            ),
        }
    }
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::Split => write!(f, "split"),
            Self::Raid => write!(f, "raid"),
            Self::Device(dev) => write!(f, "{}", dev),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(u64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as u64),
            Self::Str(v) => v
                .parse::<u64>()
                .map_err(|_| anyhow!("{:?} is not an integer", v)),
            v => bail!("{} is not an integer", v),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Int(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            Self::Str(v) => parse_duration(v),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        let v = self.as_u64()?;
        if v > u32::MAX as u64 {
            bail!("{} is too large", v);
        }
        Ok(v as u32)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(v as u64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

const CONFIG_DOC: &str = "\
//
// Recovery experiment configuration
//
//  num_backups: Number of backup processes
//  num_partitions: Number of partitions, one recovery master each
//  object_size: Object size in bytes
//  num_objects: Number of objects the dying master holds
//  replicas: Number of replicas of each segment
//  disk: memory, primary, secondary, split, raid or a device path
//  timeout: Seconds to wait for the recovery to complete
//  old_master_mem: Memory of the dying master in megabytes
//  new_master_mem: Memory of each recovery master in megabytes
//  *_args: Extra arguments for each process role
//  host_allocation: forward or reverse placement of recovery masters
//
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryConfig {
    pub num_backups: u32,
    pub num_partitions: u32,
    pub object_size: u64,
    pub num_objects: u64,
    pub replicas: u32,
    pub disk: Disk,
    pub timeout: f64,
    pub old_master_mem: u64,
    pub new_master_mem: u64,
    pub coordinator_args: String,
    pub backup_args: String,
    pub old_master_args: String,
    pub new_master_args: String,
    pub client_args: String,
    pub host_allocation: HostAllocation,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            num_backups: 1,
            num_partitions: 1,
            object_size: 1024,
            num_objects: 626012,
            replicas: 1,
            disk: Disk::Primary,
            timeout: 60.0,
            old_master_mem: 2048,
            new_master_mem: 2048,
            coordinator_args: "".into(),
            backup_args: "".into(),
            old_master_args: "".into(),
            new_master_args: "".into(),
            client_args: "-f".into(),
            host_allocation: HostAllocation::Forward,
        }
    }
}

impl rc_util::JsonLoad for RecoveryConfig {}
impl rc_util::JsonSave for RecoveryConfig {
    fn preamble() -> Option<String> {
        Some(CONFIG_DOC.to_string())
    }
}

impl RecoveryConfig {
    pub const PARAMS: &'static [&'static str] = &[
        "num_backups",
        "num_partitions",
        "object_size",
        "num_objects",
        "replicas",
        "disk",
        "timeout",
        "old_master_mem",
        "new_master_mem",
        "coordinator_args",
        "backup_args",
        "old_master_args",
        "new_master_args",
        "client_args",
        "host_allocation",
    ];

    // Objects of @object_size filling one megabyte of log, accounting for
    // the per-object header.
    pub const OBJECT_OVERHEAD: u64 = 40;

    pub fn objects_per_mb(object_size: u64) -> f64 {
        (1u64 << 20) as f64 / (object_size + Self::OBJECT_OVERHEAD) as f64
    }

    pub fn is_param(name: &str) -> bool {
        Self::PARAMS.contains(&name)
    }

    pub fn set(&mut self, name: &str, val: &ParamValue) -> Result<()> {
        let str_val = || -> Result<String> {
            match val {
                ParamValue::Str(v) => Ok(v.clone()),
                v => bail!("{:?} takes a string, not {}", name, v),
            }
        };

        match name {
            "num_backups" => self.num_backups = val.as_u32()?,
            "num_partitions" => self.num_partitions = val.as_u32()?,
            "object_size" => self.object_size = val.as_u64()?,
            "num_objects" => self.num_objects = val.as_u64()?,
            "replicas" => self.replicas = val.as_u32()?,
            "disk" => {
                self.disk = match val {
                    ParamValue::Str(v) => v.parse::<Disk>()?,
                    v => Disk::from_index(v.as_u64()?)?,
                }
            }
            "timeout" => self.timeout = val.as_f64()?,
            "old_master_mem" => self.old_master_mem = val.as_u64()?,
            "new_master_mem" => self.new_master_mem = val.as_u64()?,
            "coordinator_args" => self.coordinator_args = str_val()?,
            "backup_args" => self.backup_args = str_val()?,
            "old_master_args" => self.old_master_args = str_val()?,
            "new_master_args" => self.new_master_args = str_val()?,
            "client_args" => self.client_args = str_val()?,
            "host_allocation" => {
                self.host_allocation = match val {
                    ParamValue::Str(v) => v.parse::<HostAllocation>()?,
                    v => HostAllocation::from_index(v.as_u64()?)?,
                }
            }
            name => bail!("unknown recovery parameter {:?}", name),
        }
        Ok(())
    }

    pub fn with(mut self, name: &str, val: impl Into<ParamValue>) -> Result<Self> {
        self.set(name, &val.into())?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_backups == 0 {
            bail!("num_backups must be at least 1");
        }
        if self.num_partitions == 0 {
            bail!("num_partitions must be at least 1");
        }
        if self.object_size == 0 {
            bail!("object_size must be at least 1");
        }
        if self.replicas == 0 {
            bail!("replicas must be at least 1");
        }
        if !(self.timeout > 0.0) {
            bail!("timeout must be positive, not {}", self.timeout);
        }
        if self.old_master_mem == 0 || self.new_master_mem == 0 {
            bail!("master memory sizes must be positive");
        }
        Ok(())
    }

    pub fn old_master_cmdline(&self) -> String {
        join_args(&format!("-m {}", self.old_master_mem), &self.old_master_args)
    }

    pub fn new_master_cmdline(&self) -> String {
        join_args(&format!("-m {}", self.new_master_mem), &self.new_master_args)
    }
}

fn join_args(base: &str, extra: &str) -> String {
    match extra.trim() {
        "" => base.to_string(),
        extra => format!("{} {}", base, extra),
    }
}

impl fmt::Display for RecoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "backups={} partitions={} objsize={} objects={} replicas={} disk={} timeout={}s",
            self.num_backups,
            self.num_partitions,
            self.object_size,
            self.num_objects,
            self.replicas,
            &self.disk,
            self.timeout
        )?;
        if self.backup_args.len() > 0 {
            write!(f, " backup_args={:?}", &self.backup_args)?;
        }
        Ok(())
    }
}
