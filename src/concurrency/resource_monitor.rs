// Resource monitor (spec §4.6): samples thermal/memory/power state every
// ~5s and maps it to a concurrency recommendation the scheduler feeds into
// `AsyncSemaphore::set_max_permits`.

use crate::config::PerformanceMode;
use crate::constants::RESOURCE_SAMPLE_INTERVAL_SECS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThermalState {
    Nominal,
    Fair,
    Serious,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub thermal: ThermalState,
    /// Available system memory, in megabytes. Defaults to a sentinel well
    /// above both spec thresholds when the platform offers no cheap signal.
    pub available_memory_mb: u64,
    /// Logical processor count the `base(mode)` formula scales from.
    pub processor_count: usize,
    pub on_battery: bool,
    pub low_power_mode: bool,
}

impl Default for ResourceSample {
    fn default() -> Self {
        Self {
            thermal: ThermalState::Nominal,
            available_memory_mb: u64::MAX,
            processor_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            on_battery: false,
            low_power_mode: false,
        }
    }
}

/// Concurrency recommendation table (spec §4.6):
///
/// | base(mode) | full_speed = cores-2, balanced = cores/2, background = cores/4 |
/// | thermal    | `serious` halves; `critical` forces 1; `fair` multiplies by 3/4 |
/// | memory     | `< 1024 MB` halves; `< 512 MB` forces 1                         |
/// | power      | low-power mode coerces mode to `background`                     |
///
/// Result is clamped to `>= 1`.
pub fn recommend_permits(sample: &ResourceSample, mode: PerformanceMode) -> usize {
    let mode = if sample.low_power_mode { PerformanceMode::Background } else { mode };
    let cores = sample.processor_count.max(1);

    let base = match mode {
        PerformanceMode::FullSpeed => cores.saturating_sub(2).max(1),
        PerformanceMode::Balanced => (cores / 2).max(1),
        PerformanceMode::Background => (cores / 4).max(1),
    };

    let mut recommended = match sample.thermal {
        ThermalState::Nominal => base,
        ThermalState::Fair => (base * 3 / 4).max(1),
        ThermalState::Serious => (base / 2).max(1),
        ThermalState::Critical => 1,
    };

    if sample.available_memory_mb < 512 {
        recommended = 1;
    } else if sample.available_memory_mb < 1024 {
        recommended = (recommended / 2).max(1);
    }

    recommended.max(1)
}

/// Samples system state on a fixed interval and invokes `on_change` whenever
/// the recommended permit count actually changes, so the scheduler only
/// calls into the semaphore when it matters.
pub struct ResourceMonitor {
    stop: Arc<AtomicBool>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Spawns the sampling loop. `sample_fn` is pluggable so platform sampling
    /// (battery/thermal APIs) can be swapped out in tests.
    pub fn spawn<F, C>(&self, mode: PerformanceMode, mut sample_fn: F, mut on_change: C) -> tokio::task::JoinHandle<()>
    where
        F: FnMut() -> ResourceSample + Send + 'static,
        C: FnMut(usize) + Send + 'static,
    {
        let stop = Arc::clone(&self.stop);
        tokio::spawn(async move {
            let mut last_recommended: Option<usize> = None;
            while !stop.load(Ordering::SeqCst) {
                let sample = sample_fn();
                let recommended = recommend_permits(&sample, mode);
                if last_recommended != Some(recommended) {
                    on_change(recommended);
                    last_recommended = Some(recommended);
                }
                tokio::time::sleep(Duration::from_secs(RESOURCE_SAMPLE_INTERVAL_SECS)).await;
            }
        })
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort, platform-specific sampling. Falls back to a nominal sample
/// when the platform has no cheap signal (mirrors the volume resolver's
/// `cfg(target_os = ...)` dispatch pattern).
pub fn sample_system_state() -> ResourceSample {
    #[cfg(target_os = "macos")]
    {
        sample_macos()
    }
    #[cfg(not(target_os = "macos"))]
    {
        ResourceSample::default()
    }
}

#[cfg(target_os = "macos")]
fn sample_macos() -> ResourceSample {
    use std::process::Command;

    let on_battery = Command::new("pmset")
        .arg("-g")
        .arg("batt")
        .output()
        .ok()
        .map(|out| {
            let text = String::from_utf8_lossy(&out.stdout);
            text.contains("Battery Power")
        })
        .unwrap_or(false);

    let low_power_mode = Command::new("pmset")
        .arg("-g")
        .arg("custom")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("lowpowermode        1"))
        .unwrap_or(false);

    let available_memory_mb = Command::new("sysctl")
        .arg("-n")
        .arg("vm.page_free_count")
        .output()
        .ok()
        .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().parse::<u64>().ok())
        .map(|free_pages| free_pages * 4096 / (1024 * 1024))
        .unwrap_or(u64::MAX);

    ResourceSample {
        thermal: ThermalState::Nominal,
        available_memory_mb,
        processor_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        on_battery,
        low_power_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with_cores(cores: usize) -> ResourceSample {
        ResourceSample { processor_count: cores, ..Default::default() }
    }

    #[test]
    fn nominal_full_speed_is_cores_minus_two() {
        let sample = sample_with_cores(16);
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 14);
    }

    #[test]
    fn nominal_balanced_is_half_cores() {
        let sample = sample_with_cores(16);
        assert_eq!(recommend_permits(&sample, PerformanceMode::Balanced), 8);
    }

    #[test]
    fn nominal_background_is_quarter_cores() {
        let sample = sample_with_cores(16);
        assert_eq!(recommend_permits(&sample, PerformanceMode::Background), 4);
    }

    #[test]
    fn low_core_count_never_drops_base_below_one() {
        let sample = sample_with_cores(1);
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 1);
    }

    #[test]
    fn critical_thermal_always_drops_to_one() {
        let sample = ResourceSample {
            thermal: ThermalState::Critical,
            ..sample_with_cores(16)
        };
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 1);
    }

    #[test]
    fn fair_thermal_multiplies_base_by_three_quarters() {
        let sample = ResourceSample {
            thermal: ThermalState::Fair,
            ..sample_with_cores(16)
        };
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 10);
    }

    #[test]
    fn serious_thermal_halves_base() {
        let sample = ResourceSample {
            thermal: ThermalState::Serious,
            ..sample_with_cores(16)
        };
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 7);
    }

    #[test]
    fn low_memory_below_1024mb_halves_recommendation() {
        let sample = ResourceSample {
            available_memory_mb: 800,
            ..sample_with_cores(16)
        };
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 7);
    }

    #[test]
    fn very_low_memory_below_512mb_forces_one() {
        let sample = ResourceSample {
            available_memory_mb: 400,
            ..sample_with_cores(16)
        };
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), 1);
    }

    #[test]
    fn low_power_mode_coerces_mode_to_background_regardless_of_requested_mode() {
        let sample = ResourceSample {
            low_power_mode: true,
            ..sample_with_cores(16)
        };
        let background_base = recommend_permits(&ResourceSample { ..sample_with_cores(16) }, PerformanceMode::Background);
        assert_eq!(recommend_permits(&sample, PerformanceMode::FullSpeed), background_base);
        assert_eq!(recommend_permits(&sample, PerformanceMode::Balanced), background_base);
    }

    #[test]
    fn background_mode_never_exceeds_one_on_a_dual_core_machine() {
        let sample = sample_with_cores(2);
        assert_eq!(recommend_permits(&sample, PerformanceMode::Background), 1);
    }

    #[tokio::test]
    async fn change_callback_fires_only_on_transition() {
        use std::sync::atomic::AtomicUsize;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let monitor = ResourceMonitor::new();
        let handle = monitor.spawn(
            PerformanceMode::FullSpeed,
            || ResourceSample::default(),
            move |_n| {
                calls2.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
