use anyhow::{Context, Result};
use facesym_vision::DetectionOptions;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::overlay::OverlayStyle;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACESYM_CONFIG_PATH").unwrap_or("/usr/local/etc/facesym/config.toml"))
});

pub static MODELS_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACESYM_MODELS_DIR").unwrap_or("/usr/local/share/facesym/models"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models_dir: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub overlay: OverlayStyle,
}

impl Default for Config {
    fn default() -> Self {
        let detection = DetectionOptions::default();
        Self {
            models_dir: MODELS_DIR.to_path_buf(),
            score_threshold: detection.score_threshold,
            nms_threshold: detection.nms_threshold,
            overlay: OverlayStyle::default(),
        }
    }
}

impl Config {
    pub fn detection(&self) -> DetectionOptions {
        DetectionOptions {
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data).with_context(|| format!("writing config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "models_dir = \"/srv/models\"\n\n[overlay]\npoint_radius = 4\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(cfg.overlay.point_radius, 4);
        assert!(cfg.overlay.draw_lines);
        assert_eq!(cfg.score_threshold, 0.6);
    }

    #[test]
    fn invalid_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "score_threshold = \"high\"").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            nms_threshold: 0.45,
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }
}
