// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Scratch counters ("ticks0".."ticks9", "count0".."count9") servers use for
// ad-hoc instrumentation.
pub type LocalMetrics = BTreeMap<String, u64>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransmitMetrics {
    pub ticks: u64,
    pub message_count: u64,
    pub packet_count: u64,
    pub iovec_count: u64,
    pub byte_count: u64,
    pub copy_ticks: u64,
    pub dma_ticks: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReceiveMetrics {
    pub ticks: u64,
    pub message_count: u64,
    pub packet_count: u64,
    pub iovec_count: u64,
    pub byte_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportMetrics {
    pub transmit: TransmitMetrics,
    pub receive: ReceiveMetrics,
    pub session_open_ticks: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorMetrics {
    pub recovery_constructor_ticks: u64,
    pub recovery_start_ticks: u64,
    pub local: LocalMetrics,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MasterMetrics {
    pub tablets_recovered_ticks: u64,
    pub backup_manager_ticks: u64,
    pub segment_append_checksum_ticks: u64,
    pub segment_append_copy_ticks: u64,
    pub segment_open_stall_ticks: u64,
    pub segment_read_count: u64,
    pub segment_read_stall_ticks: u64,
    pub segment_read_byte_count: u64,
    pub verify_checksum_ticks: u64,
    pub recover_segment_ticks: u64,
    pub segment_close_count: u64,
    pub segment_write_stall_ticks: u64,
    pub live_object_count: u64,
    pub live_object_bytes: u64,
    pub object_append_count: u64,
    pub object_discard_count: u64,
    pub tombstone_append_count: u64,
    pub tombstone_discard_count: u64,
    pub log_sync_ticks: u64,
    pub log_sync_bytes: u64,
    pub replication_ticks: u64,
    pub replication_bytes: u64,
    pub recovery_will_ticks: u64,
    pub remove_tombstone_ticks: u64,
    pub local: LocalMetrics,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackupMetrics {
    pub start_reading_data_ticks: u64,
    pub read_count: u64,
    pub read_stall_ticks: u64,
    pub reading_data_ticks: u64,
    pub storage_read_count: u64,
    pub storage_read_bytes: u64,
    pub storage_read_ticks: u64,
    pub write_ticks: u64,
    pub write_clear_ticks: u64,
    pub write_copy_ticks: u64,
    pub write_count: u64,
    pub storage_write_count: u64,
    pub storage_write_bytes: u64,
    pub storage_write_ticks: u64,
    pub filter_ticks: u64,
    pub current_open_segment_count: u64,
    pub total_segment_count: u64,
    pub primary_load_count: u64,
    pub secondary_load_count: u64,
    // 1 = in-memory, 2 = on-disk
    pub storage_type: u64,
    pub local: LocalMetrics,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostMetrics {
    pub server_id: u64,
    pub pid: u64,
    // 0 = coordinator, 1 = master, 2 = backup
    pub server_role: u64,
    pub clock_frequency: u64,
    pub recovery_ticks: u64,
    pub idle_ticks: u64,
    pub transport: TransportMetrics,
    pub coordinator: CoordinatorMetrics,
    pub master: MasterMetrics,
    pub backup: BackupMetrics,
}

impl HostMetrics {
    pub fn local(&self, role: &str) -> Option<&LocalMetrics> {
        match role {
            "coordinator" => Some(&self.coordinator.local),
            "master" => Some(&self.master.local),
            "backup" => Some(&self.backup.local),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientMetrics {
    pub recovery_ns: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryMetrics {
    pub coordinator: HostMetrics,
    pub masters: Vec<HostMetrics>,
    pub backups: Vec<HostMetrics>,
    pub client: ClientMetrics,
}

impl rc_util::JsonLoad for RecoveryMetrics {}
impl rc_util::JsonSave for RecoveryMetrics {}

impl RecoveryMetrics {
    // Tick counters are meaningless without their host's clock frequency.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.clock_frequency == 0 {
            bail!("coordinator has zero clock frequency");
        }
        for (name, hosts) in &[("masters", &self.masters), ("backups", &self.backups)] {
            for (idx, host) in hosts.iter().enumerate() {
                if host.clock_frequency == 0 {
                    bail!("{}[{}] has zero clock frequency", name, idx);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HostMetrics, RecoveryMetrics};

    #[test]
    fn test_camel_case_schema() {
        let host: HostMetrics = serde_json::from_str(
            r#"{
                "clockFrequency": 2000,
                "recoveryTicks": 100,
                "master": { "segmentReadStallTicks": 7, "local": { "ticks3": 9 } },
                "backup": { "storageReadBytes": 1048576 },
                "transport": { "transmit": { "byteCount": 12 } },
                "somethingNew": 1
            }"#,
        )
        .unwrap();
        assert_eq!(host.clock_frequency, 2000);
        assert_eq!(host.recovery_ticks, 100);
        assert_eq!(host.master.segment_read_stall_ticks, 7);
        assert_eq!(host.local("master").unwrap()["ticks3"], 9);
        assert_eq!(host.backup.storage_read_bytes, 1 << 20);
        assert_eq!(host.transport.transmit.byte_count, 12);
        assert!(host.local("client").is_none());
    }

    #[test]
    fn test_validate_clock_frequency() {
        let mut metrics = RecoveryMetrics::default();
        assert!(metrics.validate().is_err());

        metrics.coordinator.clock_frequency = 1000;
        let mut host = HostMetrics::default();
        host.clock_frequency = 1000;
        metrics.masters.push(host.clone());
        metrics.backups.push(host);
        assert!(metrics.validate().is_ok());

        metrics.backups.push(HostMetrics::default());
        let err = metrics.validate().unwrap_err();
        assert_eq!(format!("{}", err), "backups[1] has zero clock frequency");
    }
}
