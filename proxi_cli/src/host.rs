//! Host-side stand-ins for the device: console display, restart recorder,
//! and assembly of the simulated sensor and the file store.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use eyre::WrapErr;
use proxi_core::CalibrationStore;
use proxi_core::conversions::store_layout;
use proxi_hardware::{FileStore, SimScene, SimulatedSensor};
use proxi_traits::{BoxError, Clock, DisplaySurface, Lifecycle, Screen};

/// Prints every redraw on stdout, one line per frame.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleDisplay {
    pub json: bool,
}

impl ConsoleDisplay {
    fn line(&self, screen: &Screen) -> String {
        if self.json {
            serde_json::json!({
                "screen": {
                    "title": screen.title,
                    "body": screen.body,
                    "button": screen.button,
                }
            })
            .to_string()
        } else {
            let body = screen.body.split('\n').filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
            match &screen.button {
                Some(b) => format!("[{}] {body} <{b}>", screen.title),
                None => format!("[{}] {body}", screen.title),
            }
        }
    }
}

impl DisplaySurface for ConsoleDisplay {
    fn render(&mut self, screen: &Screen) -> Result<(), BoxError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", self.line(screen))?;
        Ok(())
    }
}

/// Counts restart requests instead of rebooting the host.
#[derive(Debug, Clone, Default)]
pub struct SimLifecycle {
    restarts: Arc<AtomicU32>,
}

impl SimLifecycle {
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }
}

impl Lifecycle for SimLifecycle {
    fn restart(&self) {
        let n = self.restarts.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(restarts = n, "device restart requested");
    }
}

/// 16.16 fixed-point MCps.
fn mcps_fixed(v: f32) -> u32 {
    (f64::from(v) * 65536.0).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

pub fn sim_scene(cfg: &proxi_config::SimulatorCfg) -> SimScene {
    SimScene {
        distance_mm: cfg.near_distance_mm,
        optimal_compensation: cfg.optimal_compensation,
        bias_mm_per_unit: cfg.bias_mm_per_unit,
        signal_rate: mcps_fixed(cfg.signal_mcps),
        ambient_rate: mcps_fixed(cfg.ambient_mcps),
        status: 0,
    }
}

pub fn sim_sensor(cfg: &proxi_config::Config, clock: Arc<dyn Clock + Send + Sync>) -> SimulatedSensor {
    SimulatedSensor::new(sim_scene(&cfg.simulator), clock).with_max_polls(cfg.sensor.max_ready_polls)
}

pub fn open_file_store(cfg: &proxi_config::Config) -> eyre::Result<FileStore> {
    FileStore::open(&cfg.store.path)
        .wrap_err_with(|| format!("open calibration store {}", cfg.store.path.display()))
}

pub fn open_calibration_store(cfg: &proxi_config::Config) -> eyre::Result<CalibrationStore> {
    Ok(CalibrationStore::new(open_file_store(cfg)?, store_layout(cfg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_rates_are_fixed_point() {
        let scene = sim_scene(&proxi_config::SimulatorCfg::default());
        assert_eq!(scene.signal_rate, 20 << 16);
        assert_eq!(scene.ambient_rate, 1 << 16);
        assert_eq!(scene.distance_mm, 600);
    }

    #[test]
    fn text_frame_flattens_body() {
        let d = ConsoleDisplay { json: false };
        let screen = Screen {
            title: "PROXY TEST".into(),
            body: "NEAR\nDist: 420".into(),
            button: Some("CALIBRATE".into()),
        };
        assert_eq!(d.line(&screen), "[PROXY TEST] NEAR Dist: 420 <CALIBRATE>");
    }

    #[test]
    fn lifecycle_counts_restarts() {
        let l = SimLifecycle::default();
        let shared = l.clone();
        l.restart();
        assert_eq!(shared.restarts(), 1);
    }
}
