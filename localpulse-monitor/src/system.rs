use sysinfo::System;

/// One host resource sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub ram_used: u64,
    pub ram_total: u64,
    pub ram_percent: f64,
}

/// Samples global CPU and memory usage.
///
/// CPU usage is computed between consecutive refreshes, so the first sample
/// after construction reports 0%.
pub struct SystemMonitor {
    system: System,
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }

    pub fn sample(&mut self) -> SystemMetrics {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let ram_used = self.system.used_memory();
        let ram_total = self.system.total_memory();
        let ram_percent = if ram_total > 0 {
            ram_used as f64 / ram_total as f64 * 100.0
        } else {
            0.0
        };

        SystemMetrics {
            cpu_percent: self.system.global_cpu_usage(),
            ram_used,
            ram_total,
            ram_percent,
        }
    }
}

/// Number of logical CPUs available to this process.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
