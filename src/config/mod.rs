#![forbid(unsafe_code)]

pub mod context;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TaskgoError;

pub const TASKS_FILE: &str = "tasks.json";
pub const CONTEXT_FILE: &str = "context.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(alias = "dir")]
    pub data_dir: String,
    pub flows_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.taskgo".to_owned(),
            flows_file: "~/.taskgo_flows.json".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub icons: bool,
    pub color: bool,
    pub time_format: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            icons: true,
            color: true,
            time_format: "[day] [month repr:short] [year repr:last_two] [hour]:[minute]".to_owned(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), TaskgoError> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(TaskgoError::Config(
                "storage.data_dir must not be empty".to_owned(),
            ));
        }
        if self.storage.flows_file.trim().is_empty() {
            return Err(TaskgoError::Config(
                "storage.flows_file must not be empty".to_owned(),
            ));
        }
        time::format_description::parse_borrowed::<1>(&self.ui.time_format).map_err(|e| {
            TaskgoError::InvalidConfigValue {
                key: "ui.time_format".to_owned(),
                msg: e.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    pub fn tasks_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(TASKS_FILE))
    }

    pub fn context_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(CONTEXT_FILE))
    }

    pub fn flows_path(&self) -> anyhow::Result<PathBuf> {
        expand_path(&self.storage.flows_file)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    let unix = home_config_path_unix();
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("com", "taskgo", "taskgo")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_config_path_unix() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("~"));
    home.join(".config").join("taskgo").join("config.toml")
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("HOME") {
        return Some(PathBuf::from(v));
    }
    if let Some(v) = std::env::var_os("USERPROFILE") {
        return Some(PathBuf::from(v));
    }
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    if input == "~"
        && let Some(home) = home_dir()
    {
        return home.to_string_lossy().to_string();
    }
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    input.to_owned()
}

pub fn expand_path(input: &str) -> anyhow::Result<PathBuf> {
    let expanded = expand_env_vars(&expand_tilde(input.trim()));
    let p = PathBuf::from(expanded);
    if p.is_absolute() {
        return Ok(p);
    }
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    Ok(cwd.join(p))
}

static ENV_VAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").ok());

fn expand_env_vars(input: &str) -> String {
    // $VAR and ${VAR}; unknown vars stay as written.
    let Some(re) = ENV_VAR.as_ref() else {
        return input.to_owned();
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_owned())
    })
    .to_string()
}

pub fn load() -> anyhow::Result<(Config, ConfigPaths)> {
    let paths = default_paths()?;
    let (_doc, cfg) = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok((cfg, paths))
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    let (cfg, _paths) = load()?;
    Ok(toml::to_string_pretty(&cfg)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = default_paths()?;
    set_value_string_at_path(&paths.config_file, key, value)
}

fn load_from_file(path: &Path) -> anyhow::Result<(toml_edit::DocumentMut, Config)> {
    if !path.exists() {
        return Ok((toml_edit::DocumentMut::new(), Config::default()));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let doc = raw
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;

    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok((doc, cfg))
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let (_doc, cfg) = load_from_file(path)?;
    cfg.validate()?;

    let norm = normalize_key(key);
    let value = lookup_value(&cfg, norm);
    Ok(value.map(format_value_for_stdout))
}

pub fn set_value_string_at_path(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let (mut doc, cfg) = load_from_file(path)?;
    cfg.validate()?;

    let norm = normalize_key(key);
    let item = parse_value(key, norm, value)?;
    apply_set(&mut doc, norm, item)?;

    // Re-parse so a bad value never reaches disk.
    let new_raw = doc.to_string();
    let new_cfg: Config = toml::from_str(&new_raw)
        .with_context(|| format!("config update produced invalid TOML for {}", path.display()))?;
    new_cfg.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, new_raw.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    String,
}

fn normalize_key(key: &str) -> &str {
    match key {
        "data_dir" | "storage.dir" => "storage.data_dir",
        "time_format" => "ui.time_format",
        "flows_file" => "storage.flows_file",
        other => other,
    }
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "storage.data_dir" | "storage.flows_file" | "ui.time_format" => KeyType::String,
        "ui.icons" | "ui.color" => KeyType::Bool,
        _ => return None,
    })
}

fn parse_value(raw_key: &str, key: &str, value: &str) -> anyhow::Result<toml_edit::Item> {
    let key_type = key_type(key).ok_or_else(|| TaskgoError::InvalidConfigKey(raw_key.to_owned()))?;
    Ok(match key_type {
        KeyType::Bool => toml_edit::value(parse_bool(value).map_err(|msg| {
            TaskgoError::InvalidConfigValue {
                key: raw_key.to_owned(),
                msg,
            }
        })?),
        KeyType::String => toml_edit::value(value),
    })
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(TaskgoError::InvalidConfigKey(key.to_owned()).into());
    };

    let mut cur = doc.as_table_mut();
    for seg in tables {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur[seg].as_table_mut().ok_or_else(|| {
            TaskgoError::Config(format!("cannot set {key}: '{seg}' is not a table"))
        })?;
    }

    cur.insert(leaf, value);
    Ok(())
}

fn lookup_value(cfg: &Config, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}
