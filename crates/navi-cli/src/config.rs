//! Configuration Vault – reads/writes `~/.navi/config.toml`.

use navi_fusion::config::FusionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::render::ViewRenderer;

/// Persisted user configuration stored in `~/.navi/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Matching and lifecycle thresholds handed to the engine.
    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub proximity: ProximityConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Tracks closer than this raise an alert.
    #[serde(default = "default_threshold_m")]
    pub threshold_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub renderer: ViewRenderer,

    /// Wall-clock period of the fusion cycle.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_spatial_interval_ms")]
    pub spatial_interval_ms: u64,

    #[serde(default = "default_vision_interval_ms")]
    pub vision_interval_ms: u64,

    /// Upper bound on simultaneously simulated objects.
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// Stop after this many cycles; run until Ctrl-C when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
}

fn default_threshold_m() -> f64 {
    navi_fusion::proximity::DEFAULT_THRESHOLD_M
}
fn default_cycle_interval_ms() -> u64 {
    1000
}
fn default_spatial_interval_ms() -> u64 {
    1000
}
fn default_vision_interval_ms() -> u64 {
    3000
}
fn default_max_objects() -> usize {
    6
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { threshold_m: default_threshold_m() }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            renderer: ViewRenderer::default(),
            cycle_interval_ms: default_cycle_interval_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            spatial_interval_ms: default_spatial_interval_ms(),
            vision_interval_ms: default_vision_interval_ms(),
            max_objects: default_max_objects(),
            max_cycles: None,
        }
    }
}

impl Config {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        self.fusion.validate().map_err(|e| e.to_string())?;
        if !self.proximity.threshold_m.is_finite() || self.proximity.threshold_m < 0.0 {
            return Err(format!(
                "proximity.threshold_m must be non-negative, got {}",
                self.proximity.threshold_m
            ));
        }
        let intervals = [
            ("display.cycle_interval_ms", self.display.cycle_interval_ms),
            ("simulation.spatial_interval_ms", self.simulation.spatial_interval_ms),
            ("simulation.vision_interval_ms", self.simulation.vision_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        Ok(())
    }
}

/// Return the config path: `$NAVI_CONFIG` when set, else
/// `~/.navi/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("NAVI_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navi").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `NAVI_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVI_RENDERER` | `display.renderer` |
/// | `NAVI_CYCLE_INTERVAL_MS` | `display.cycle_interval_ms` |
/// | `NAVI_PROXIMITY_THRESHOLD_M` | `proximity.threshold_m` |
/// | `NAVI_CLEANUP_THRESHOLD_S` | `fusion.cleanup_threshold_s` |
/// | `NAVI_MAX_CYCLES` | `simulation.max_cycles` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("NAVI_RENDERER")
        && let Ok(renderer) = v.parse::<ViewRenderer>() {
            cfg.display.renderer = renderer;
        }
    if let Ok(v) = std::env::var("NAVI_CYCLE_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.display.cycle_interval_ms = ms;
        }
    if let Ok(v) = std::env::var("NAVI_PROXIMITY_THRESHOLD_M")
        && let Ok(m) = v.parse::<f64>() {
            cfg.proximity.threshold_m = m;
        }
    if let Ok(v) = std::env::var("NAVI_CLEANUP_THRESHOLD_S")
        && let Ok(s) = v.parse::<f64>() {
            cfg.fusion.cleanup_threshold_s = s;
        }
    if let Ok(v) = std::env::var("NAVI_MAX_CYCLES")
        && let Ok(n) = v.parse::<u64>() {
            cfg.simulation.max_cycles = Some(n);
        }
}

/// Save the config to disk, creating `~/.navi/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.fusion, FusionConfig::default());
        assert_eq!(loaded.display.cycle_interval_ms, 1000);
        assert_eq!(loaded.simulation.vision_interval_ms, 3000);
    }

    #[test]
    fn config_path_points_to_navi_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".navi"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[fusion]\nmax_angle_delta_deg = 30.0\n\n[display]\nrenderer = \"direction\"\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.fusion.max_angle_delta_deg, 30.0);
        assert_eq!(cfg.fusion.cleanup_threshold_s, 8.0);
        assert_eq!(cfg.display.renderer, ViewRenderer::Direction);
        assert_eq!(cfg.simulation.max_objects, 6);
    }

    #[test]
    fn sectors_are_configurable() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[[fusion.projection.sectors]]\nsensor_ref = 7\nstart_deg = 10.0\nfov_deg = 60.0\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        let sector = cfg.fusion.projection.sector(7).expect("sector 7");
        assert_eq!(sector.fov_deg, 60.0);
        assert!(cfg.fusion.projection.sector(1).is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fusion]\ncleanup_threshold_s = 0.0\n").expect("write");
        let err = load_from(&path).expect_err("must reject");
        assert!(err.contains("cleanup_threshold_s"));

        let cfg = Config {
            display: DisplayConfig { cycle_interval_ms: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fusion\n").expect("write");
        assert!(load_from(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_changes_renderer() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVI_RENDERER", "direction") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.display.renderer, ViewRenderer::Direction);
        unsafe { std::env::remove_var("NAVI_RENDERER") };
    }

    #[test]
    fn apply_env_overrides_changes_proximity_threshold() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVI_PROXIMITY_THRESHOLD_M", "25.5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.proximity.threshold_m, 25.5);
        unsafe { std::env::remove_var("NAVI_PROXIMITY_THRESHOLD_M") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_cycle_interval() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVI_CYCLE_INTERVAL_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.display.cycle_interval_ms, 1000);
        unsafe { std::env::remove_var("NAVI_CYCLE_INTERVAL_MS") };
    }

    #[test]
    fn apply_env_overrides_sets_max_cycles() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("NAVI_MAX_CYCLES", "12") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.simulation.max_cycles, Some(12));
        unsafe { std::env::remove_var("NAVI_MAX_CYCLES") };
    }
}
