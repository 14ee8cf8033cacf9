// Copyright (c) Recovery Bench Developers.
use rc_util::*;

pub mod args;
pub mod benchspec;
pub mod cluster;
pub mod config;
pub mod metrics;

pub use args::{Args, Mode};
pub use benchspec::{BenchProps, BenchSpec};
pub use cluster::{ClusterConfig, Host};
pub use config::{Disk, HostAllocation, ParamValue, RecoveryConfig};
pub use metrics::{
    BackupMetrics, ClientMetrics, CoordinatorMetrics, HostMetrics, MasterMetrics, ReceiveMetrics,
    RecoveryMetrics, TransmitMetrics, TransportMetrics,
};

lazy_static::lazy_static! {
    pub static ref VERSION: &'static str = env!("CARGO_PKG_VERSION");
    pub static ref FULL_VERSION: String = full_version(*VERSION);
}
