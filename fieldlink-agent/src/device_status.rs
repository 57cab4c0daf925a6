//! Device status sampling.

use std::path::{Path, PathBuf};

use fieldlink_agent_framework::DeviceStatus;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Default root of the Linux hardware monitoring tree.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Produces device status snapshots.
pub trait StatusProbe: Send {
    fn sample(&mut self, timestamp: i64) -> DeviceStatus;
}

/// Probe backed by the host: sysinfo for CPU and memory, hwmon for temperature.
pub struct SystemProbe {
    system: System,
    hwmon_root: PathBuf,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::with_hwmon_root(HWMON_ROOT)
    }

    /// Probe reading temperatures from a different hwmon tree.
    pub fn with_hwmon_root(root: impl Into<PathBuf>) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            system,
            hwmon_root: root.into(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusProbe for SystemProbe {
    fn sample(&mut self, timestamp: i64) -> DeviceStatus {
        // CPU usage is the delta since the previous refresh, so the first
        // sample after startup reads low.
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total > 0 {
            round2(self.system.used_memory() as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        // sysinfo reports NaN usage on hosts without a CPU time baseline
        DeviceStatus {
            timestamp,
            cpu_percent: finite_or_zero(round2(self.system.global_cpu_usage() as f64)),
            memory_percent: finite_or_zero(memory_percent),
            temperature_celsius: read_temperature(&self.hwmon_root).filter(|t| t.is_finite()),
        }
    }
}

/// Hottest `temp*_input` reading under `root`, in degrees Celsius.
///
/// Values are millidegrees on disk. Unreadable files are skipped; `None` when
/// nothing usable is found.
pub fn read_temperature(root: &Path) -> Option<f64> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut hottest: Option<f64> = None;

    for entry in entries.flatten() {
        let Ok(files) = std::fs::read_dir(entry.path()) else {
            continue;
        };

        for file in files.flatten() {
            let file_name = file.file_name().to_string_lossy().to_string();
            if !file_name.starts_with("temp") || !file_name.ends_with("_input") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(file.path()) else {
                continue;
            };
            let Ok(milli) = raw.trim().parse::<i64>() else {
                continue;
            };

            let celsius = milli as f64 / 1000.0;
            hottest = Some(hottest.map_or(celsius, |t| t.max(celsius)));
        }
    }

    hottest.map(round2)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
