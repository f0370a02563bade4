use crate::cache::DEFAULT_DIFF_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Quiet period that closes a burst of filesystem events.
    pub debounce: Duration,
    /// Upper bound on how long a continuous stream of events is held back.
    pub max_delay: Duration,
    /// How long after a write its own on-disk changes count as expected.
    pub expected_change_window: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            expected_change_window: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepositoryConfig {
    pub watch: WatchConfig,
    pub diff_cache_capacity: usize,
    /// `git` on `PATH` when unset.
    pub git_program: Option<PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            diff_cache_capacity: DEFAULT_DIFF_CACHE_CAPACITY,
            git_program: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct WatchFileV1 {
    enabled: Option<bool>,
    debounce_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    expected_change_window_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct ConfigFileV1 {
    version: u32,
    #[serde(default)]
    watch: WatchFileV1,
    diff_cache_capacity: Option<usize>,
    git_program: Option<String>,
}

const CONFIG_FILE_VERSION_V1: u32 = 1;
const CURRENT_CONFIG_FILE_VERSION: u32 = CONFIG_FILE_VERSION_V1;

/// Loads the configuration from the default location, falling back to defaults.
pub fn load() -> RepositoryConfig {
    let Some(path) = default_config_file_path() else {
        return RepositoryConfig::default();
    };
    load_from_path(&path)
}

/// Missing, malformed and unknown-version files all yield defaults.
pub fn load_from_path(path: &Path) -> RepositoryConfig {
    let Some(file) = load_file_v1(path) else {
        return RepositoryConfig::default();
    };

    let defaults = RepositoryConfig::default();
    let ms = |value: Option<u64>, default: Duration| value.map(Duration::from_millis).unwrap_or(default);
    let debounce = ms(file.watch.debounce_ms, defaults.watch.debounce);
    let max_delay = ms(file.watch.max_delay_ms, defaults.watch.max_delay).max(debounce);

    RepositoryConfig {
        watch: WatchConfig {
            enabled: file.watch.enabled.unwrap_or(defaults.watch.enabled),
            debounce,
            max_delay,
            expected_change_window: ms(
                file.watch.expected_change_window_ms,
                defaults.watch.expected_change_window,
            ),
        },
        diff_cache_capacity: file
            .diff_cache_capacity
            .filter(|capacity| *capacity > 0)
            .unwrap_or(defaults.diff_cache_capacity),
        git_program: file
            .git_program
            .map(|program| program.trim().to_string())
            .filter(|program| !program.is_empty())
            .map(PathBuf::from),
    }
}

pub fn save(config: &RepositoryConfig) -> io::Result<()> {
    let Some(path) = default_config_file_path() else {
        return Ok(());
    };
    save_to_path(config, &path)
}

pub fn save_to_path(config: &RepositoryConfig, path: &Path) -> io::Result<()> {
    let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    let file = ConfigFileV1 {
        version: CURRENT_CONFIG_FILE_VERSION,
        watch: WatchFileV1 {
            enabled: Some(config.watch.enabled),
            debounce_ms: Some(millis(config.watch.debounce)),
            max_delay_ms: Some(millis(config.watch.max_delay)),
            expected_change_window_ms: Some(millis(config.watch.expected_change_window)),
        },
        diff_cache_capacity: Some(config.diff_cache_capacity),
        git_program: config
            .git_program
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
    };
    persist_to_path(path, &file)
}

fn load_file_v1(path: &Path) -> Option<ConfigFileV1> {
    let contents = fs::read_to_string(path).ok()?;
    let value = serde_json::from_str::<serde_json::Value>(&contents).ok()?;
    let version = value.get("version").and_then(|v| v.as_u64())?;
    match u32::try_from(version).ok()? {
        CONFIG_FILE_VERSION_V1 => serde_json::from_value::<ConfigFileV1>(value).ok(),
        other => {
            tracing::warn!(version = other, path = %path.display(), "ignoring config file with unknown version");
            None
        }
    }
}

fn persist_to_path(path: &Path, file: &impl Serialize) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_vec_pretty(file).map_err(io::Error::other)?;
    fs::write(&tmp_path, contents)?;

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Windows can't overwrite an existing file via rename.
            let copy_res = fs::copy(&tmp_path, path);
            let _ = fs::remove_file(&tmp_path);
            match copy_res {
                Ok(_) => Ok(()),
                Err(copy_err) => Err(io::Error::new(
                    copy_err.kind(),
                    format!("rename failed: {rename_err}; copy failed: {copy_err}"),
                )),
            }
        }
    }
}

/// `GITGATE_CONFIG`, else `config.json` in the platform config directory.
pub fn default_config_file_path() -> Option<PathBuf> {
    // Never touch the user's configuration from unit tests.
    if cfg!(test) {
        return None;
    }
    if let Some(explicit) = env::var_os("GITGATE_CONFIG").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    Some(app_config_dir()?.join("config.json"))
}

fn app_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_home) = env::var_os("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(config_home).join("gitgate"));
        }
        let home = env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config/gitgate"))
    }

    #[cfg(target_os = "macos")]
    {
        let home = env::var_os("HOME")?;
        return Some(PathBuf::from(home).join("Library/Application Support/gitgate"));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = env::var_os("APPDATA").or_else(|| env::var_os("LOCALAPPDATA"))?;
        return Some(PathBuf::from(appdata).join("gitgate"));
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitgate"))
    }
}
