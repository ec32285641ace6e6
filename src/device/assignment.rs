//! Binding accelerators to processes.
//!
//! Two phases. Every rank reports which machine it runs on and which devices
//! that machine has, the reports are folded into one inventory per machine.
//! Then a deterministic rule walks the ranks of each machine in rank order
//! and hands out the devices that can run long kernels.

use crate::device::DeviceInfo;
use std::collections::BTreeMap;

/// What one rank sees of its machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankReport {
    pub rank: usize,
    pub host: String,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInventory {
    /// Global ranks on this machine, ascending.
    pub ranks: Vec<usize>,
    /// Devices as reported by the lowest rank on the machine.
    pub devices: Vec<DeviceInfo>,
}

impl HostInventory {
    pub fn eligible_devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.iter().filter(|d| !d.kernel_exec_timeout)
    }
}

/// Phase one, fold the reports by machine name.
pub fn gather_inventory(reports: &[RankReport]) -> BTreeMap<String, HostInventory> {
    let mut sorted: Vec<&RankReport> = reports.iter().collect();
    sorted.sort_by_key(|r| r.rank);

    let mut inventory: BTreeMap<String, HostInventory> = BTreeMap::new();
    for report in sorted {
        let entry = inventory.entry(report.host.clone()).or_default();
        if entry.ranks.is_empty() {
            entry.devices = report.devices.clone();
        }
        entry.ranks.push(report.rank);
    }
    inventory
}

/// Phase two.
/// On every machine the first `reserved_local_ranks` ranks stay host only,
/// the following ranks get one eligible device each, in rank order, until
/// the devices run out.
/// Returns one entry per rank, indexed by global rank.
pub fn assign_devices(
    inventory: &BTreeMap<String, HostInventory>,
    reserved_local_ranks: usize,
) -> Vec<Option<DeviceInfo>> {
    let size = inventory
        .values()
        .flat_map(|h| h.ranks.iter())
        .map(|r| r + 1)
        .max()
        .unwrap_or(0);
    let mut result = vec![None; size];

    for (host, machine) in inventory {
        let candidates = machine.ranks.iter().skip(reserved_local_ranks);
        for (rank, device) in candidates.zip(machine.eligible_devices()) {
            tracing::info!(
                rank,
                host = host.as_str(),
                device = device.ordinal,
                name = device.name.as_str(),
                "accelerator bound"
            );
            result[*rank] = Some(device.clone());
        }
    }
    result
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn report(rank: usize, host: &str, devices: &[DeviceInfo]) -> RankReport {
        RankReport {
            rank,
            host: host.to_string(),
            devices: devices.to_vec(),
        }
    }

    #[test]
    fn inventory_by_host() {
        let gpus = [DeviceInfo::new(0, "a"), DeviceInfo::new(1, "b")];
        let reports = vec![
            report(3, "node1", &gpus),
            report(0, "node0", &gpus[..1]),
            report(2, "node1", &gpus),
            report(1, "node0", &gpus[..1]),
        ];
        let inv = gather_inventory(&reports);
        assert_eq!(inv.len(), 2);
        assert_eq!(inv["node0"].ranks, vec![0, 1]);
        assert_eq!(inv["node1"].ranks, vec![2, 3]);
        assert_eq!(inv["node1"].devices.len(), 2);
    }

    #[test]
    fn rank_order_assignment() {
        let gpus = [DeviceInfo::new(0, "a"), DeviceInfo::new(1, "b")];
        let reports: Vec<RankReport> =
            (0..4).map(|r| report(r, "node", &gpus)).collect();
        let inv = gather_inventory(&reports);

        let a = assign_devices(&inv, 0);
        assert_eq!(a.len(), 4);
        assert_eq!(a[0].as_ref().map(|d| d.ordinal), Some(0));
        assert_eq!(a[1].as_ref().map(|d| d.ordinal), Some(1));
        assert!(a[2].is_none());
        assert!(a[3].is_none());

        let a = assign_devices(&inv, 1);
        assert!(a[0].is_none());
        assert_eq!(a[1].as_ref().map(|d| d.ordinal), Some(0));
        assert_eq!(a[2].as_ref().map(|d| d.ordinal), Some(1));
        assert!(a[3].is_none());
    }

    #[test]
    fn timeout_devices_skipped() {
        let mut display = DeviceInfo::new(0, "display");
        display.kernel_exec_timeout = true;
        let gpus = [display, DeviceInfo::new(1, "compute")];
        let reports: Vec<RankReport> =
            (0..2).map(|r| report(r, "node", &gpus)).collect();
        let a = assign_devices(&gather_inventory(&reports), 0);
        assert_eq!(a[0].as_ref().map(|d| d.ordinal), Some(1));
        assert!(a[1].is_none());
    }

    #[test]
    fn machines_are_independent() {
        let reports = vec![
            report(0, "x", &[DeviceInfo::new(0, "a")]),
            report(1, "y", &[DeviceInfo::new(0, "b")]),
            report(2, "x", &[DeviceInfo::new(0, "a")]),
            report(3, "y", &[]),
        ];
        let a = assign_devices(&gather_inventory(&reports), 0);
        assert_eq!(a[0].as_ref().map(|d| d.name.as_str()), Some("a"));
        assert_eq!(a[1].as_ref().map(|d| d.name.as_str()), Some("b"));
        assert!(a[2].is_none());
        assert!(a[3].is_none());
    }
}
