// Everything the app reads or writes under the project directory:
//
//   <project>/.backtrack/config.json         optional settings
//   <project>/.backtrack/presets/<slug>.json  saved presets
//   <project>/.backtrack/backtrack.log        log file
//   <project>/recordings/take-<n>.wav         recorded takes
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::audio::SampleBuffer;
use crate::config::AppConfig;
use crate::pipeline::preset::Preset;

const BACKTRACK_DIR: &str = ".backtrack";
const CONFIG_FILE: &str = "config.json";
const LOG_FILE: &str = "backtrack.log";
const PRESETS_DIR: &str = "presets";
const RECORDINGS_DIR: &str = "recordings";

pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BACKTRACK_DIR).join(CONFIG_FILE)
}

pub fn log_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BACKTRACK_DIR).join(LOG_FILE)
}

pub fn presets_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(BACKTRACK_DIR).join(PRESETS_DIR)
}

pub fn recordings_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(RECORDINGS_DIR)
}

/// Missing file means defaults; a broken one is logged and also means defaults.
pub fn load_config(project_dir: &Path) -> AppConfig {
    let path = config_path(project_dir);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(_) => {
            log::debug!(target: "session", "no config at {}, using defaults", path.display());
            return AppConfig::default();
        }
    };
    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            log::warn!(target: "session", "ignoring {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

/// Write `preset` as `<slug>.json`, replacing any earlier save of the same name.
pub fn save_preset(project_dir: &Path, preset: &Preset) -> anyhow::Result<PathBuf> {
    let dir = presets_dir(project_dir);
    ensure_dir(&dir)?;
    let path = dir.join(format!("{}.json", preset.slug()));
    std::fs::write(&path, preset.to_json()?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn load_preset(path: &Path) -> anyhow::Result<Preset> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Preset::from_json(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Every preset that parses, sorted by file name. Broken files are skipped.
pub fn list_presets(project_dir: &Path) -> Vec<Preset> {
    let Ok(entries) = std::fs::read_dir(presets_dir(project_dir)) else {
        return vec![];
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    paths
        .iter()
        .filter_map(|p| match load_preset(p) {
            Ok(preset) => Some(preset),
            Err(e) => {
                log::warn!(target: "session", "{e:#}");
                None
            }
        })
        .collect()
}

/// `take-<n>.wav` with n one past the highest existing take.
pub fn next_take_path(project_dir: &Path) -> anyhow::Result<PathBuf> {
    let dir = recordings_dir(project_dir);
    ensure_dir(&dir)?;
    let highest = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.strip_prefix("take-")?.strip_suffix(".wav")?.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0);
    Ok(dir.join(format!("take-{}.wav", highest + 1)))
}

/// Save a finished take; returns where it went and its size in bytes.
pub fn save_take(project_dir: &Path, buffer: &SampleBuffer) -> anyhow::Result<(PathBuf, u64)> {
    let path = next_take_path(project_dir)?;
    let size = buffer.write_wav(&path)?;
    Ok((path, size))
}
