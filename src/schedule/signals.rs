//! Environment signals read from Linux sysfs and procfs

use super::traits::EnvironmentSignals;
use crate::error::SignalError;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Linux truncates process names in `/proc/<pid>/comm` to 15 bytes
const COMM_LEN: usize = 15;

/// Reads power and process state from the running system
#[derive(Debug, Clone)]
pub struct SystemSignals {
    power_supply_root: PathBuf,
    proc_root: PathBuf,
    host_process: String,
}

#[derive(Debug)]
struct PowerSupply {
    kind: String,
    online: Option<bool>,
    status: Option<String>,
}

impl SystemSignals {
    /// Watch for a host application running as `host_process`
    pub fn new(host_process: impl Into<String>) -> Self {
        Self {
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
            proc_root: PathBuf::from("/proc"),
            host_process: host_process.into(),
        }
    }

    /// Read from other sysfs/procfs mounts
    pub fn with_roots(mut self, power_supply_root: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        self.power_supply_root = power_supply_root.into();
        self.proc_root = proc_root.into();
        self
    }

    fn power_supplies(&self) -> Result<Vec<PowerSupply>, SignalError> {
        ensure_dir(&self.power_supply_root)?;

        let mut supplies = Vec::new();
        for entry in WalkDir::new(&self.power_supply_root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = entry.map_err(|e| SignalError::Unavailable(e.to_string()))?;
            let Some(kind) = read_attribute(entry.path(), "type") else {
                continue;
            };

            supplies.push(PowerSupply {
                kind,
                online: read_attribute(entry.path(), "online").map(|v| v == "1"),
                status: read_attribute(entry.path(), "status"),
            });
        }

        log::debug!("Found {} power supplies", supplies.len());
        Ok(supplies)
    }
}

impl EnvironmentSignals for SystemSignals {
    fn on_battery_power(&self) -> Result<bool, SignalError> {
        let supplies = self.power_supplies()?;

        let external_online = supplies
            .iter()
            .any(|supply| supply.kind != "Battery" && supply.online == Some(true));
        if external_online {
            return Ok(false);
        }

        // Machines without a battery report no supplies at all
        Ok(supplies.iter().any(|supply| {
            supply.kind == "Battery" && supply.status.as_deref() == Some("Discharging")
        }))
    }

    fn host_app_is_open(&self) -> Result<bool, SignalError> {
        ensure_dir(&self.proc_root)?;

        let wanted: String = self.host_process.chars().take(COMM_LEN).collect();

        // Processes exit while we scan; their entries are skipped
        let open = WalkDir::new(&self.proc_root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()))
            })
            .any(|entry| read_attribute(entry.path(), "comm").as_deref() == Some(wanted.as_str()));

        Ok(open)
    }
}

fn ensure_dir(path: &Path) -> Result<(), SignalError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SignalError::Unavailable(format!("{:?} is not readable", path)))
    }
}

fn read_attribute(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|value| value.trim().to_string())
}
