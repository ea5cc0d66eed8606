//! Host telemetry for the console status surface.
//!
//! One shared `sysinfo::System` is refreshed on demand; CPU usage is a
//! delta measurement, so the first snapshot after startup reads 0 and
//! later ones reflect activity since the previous refresh.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::OnceLock;
use sysinfo::System;

/// A point-in-time host reading.
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

fn system() -> &'static Mutex<System> {
    static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();
    SYSTEM.get_or_init(|| Mutex::new(System::new()))
}

/// Refresh and read the host counters.
pub fn snapshot() -> HostSnapshot {
    let mut sys = system().lock();
    sys.refresh_memory();
    sys.refresh_cpu_usage();
    HostSnapshot {
        cpu_percent: sys.global_cpu_usage(),
        cpu_count: sys.cpus().len(),
        memory_used_bytes: sys.used_memory(),
        memory_total_bytes: sys.total_memory(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_plausible_values() {
        let snap = snapshot();
        assert!(snap.cpu_count > 0);
        assert!(snap.memory_total_bytes > 0);
        assert!(snap.memory_used_bytes <= snap.memory_total_bytes);
        assert!((0.0..=100.0 * snap.cpu_count as f32).contains(&snap.cpu_percent));
    }
}
