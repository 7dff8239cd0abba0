//! System metric sampling for the status screen

use std::future::Future;
use std::path::PathBuf;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, warn};

const PROBE_SHELL: &str = "/bin/sh";

/// One reading of the values shown on the status screen
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsSample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    /// Raw probe output, shown as-is
    pub temperature: String,
}

/// Source of status samples
pub trait Sampler: Send {
    fn sample(&mut self) -> impl Future<Output = StatsSample> + Send;
}

/// Samples the live system through sysinfo and the temperature probe
pub struct SystemSampler {
    system: System,
    probe: TemperatureProbe,
}

impl SystemSampler {
    pub fn new(probe_script: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one.
        system.refresh_cpu_usage();
        Self {
            system,
            probe: TemperatureProbe::new(probe_script),
        }
    }
}

impl Sampler for SystemSampler {
    async fn sample(&mut self) -> StatsSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let cpu_percent = self.system.global_cpu_usage() as f64;
        let mem_percent =
            used_percent(self.system.total_memory(), self.system.available_memory());
        let temperature = self.probe.read().await;

        debug!("Sampled cpu={cpu_percent:.1}% mem={mem_percent:.1}% temp={temperature:?}");
        StatsSample { cpu_percent, mem_percent, temperature }
    }
}

/// Share of memory not available to new allocations
fn used_percent(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(available) as f64 / total as f64 * 100.0
}

/// Board-specific temperature script run through the shell
#[derive(Debug, Clone)]
pub struct TemperatureProbe {
    shell: PathBuf,
    script: PathBuf,
}

impl TemperatureProbe {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self::with_shell(PROBE_SHELL, script)
    }

    pub fn with_shell(shell: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self { shell: shell.into(), script: script.into() }
    }

    /// Whatever the script printed, verbatim; empty if it could not run
    pub async fn read(&self) -> String {
        let output = match Command::new(&self.shell).arg(&self.script).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Temperature probe {} failed to start: {e}", self.script.display());
                return String::new();
            }
        };

        if !output.status.success() {
            warn!(
                "Temperature probe {} exited with {}: {}",
                self.script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same sample every time and counts calls
    pub struct FixedSampler {
        sample: StatsSample,
        calls: AtomicUsize,
    }

    impl FixedSampler {
        pub fn new(sample: StatsSample) -> Self {
            Self { sample, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Sampler for FixedSampler {
        async fn sample(&mut self) -> StatsSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sample.clone()
        }
    }
}
