use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use serde::de::Deserializer;
use serde::Deserialize;

use crate::connect::relationship::default_relationships;

const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "kinlink.log";
const APP_NAME: &str = "kinlink";
const TOKEN_ENV: &str = "KINLINK_TOKEN";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub api: ApiConfig,
    /// The signed-in user; never inferred from anything ambient
    pub user_id: String,
    pub phone_region: Option<String>,
    pub relationships: Vec<String>,
    pub search: SearchConfig,
    pub keys: Keys,
    pub ui: UiConfig,
    pub log: LogConfig,
}

/// Connection details for the connections service
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub debounce: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Where the TUI writes its log; CLI commands log to stderr
    pub file: PathBuf,
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

// =============================================================================
// UI configuration
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct UiConfig {
    pub colors: UiColors,
}

#[derive(Debug, Clone)]
pub struct UiColors {
    pub border: RgbColor,
    pub selection_bg: RgbColor,
    pub selection_fg: RgbColor,
    pub error: RgbColor,
    pub muted: RgbColor,
    pub status_fg: RgbColor,
    pub status_bg: RgbColor,
}

impl Default for UiColors {
    fn default() -> Self {
        UiColorsFile::default().into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

// =============================================================================
// Key bindings
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Keys {
    pub list: ListKeys,
    pub modal: ModalKeys,
    pub confirm: ConfirmKeys,
}

/// Connections list
#[derive(Debug, Clone)]
pub struct ListKeys {
    pub quit: Vec<String>,
    pub add: Vec<String>,
    pub edit: Vec<String>,
    pub delete: Vec<String>,
    pub refresh: Vec<String>,
    pub next: Vec<String>,
    pub prev: Vec<String>,
}

/// Add/edit connection popup
#[derive(Debug, Clone)]
pub struct ModalKeys {
    pub close: Vec<String>,
    pub toggle_tab: Vec<String>,
    pub next_field: Vec<String>,
    pub prev_field: Vec<String>,
    pub submit: Vec<String>,
}

/// Yes/no confirmation popup
#[derive(Debug, Clone)]
pub struct ConfirmKeys {
    pub accept: Vec<String>,
    pub reject: Vec<String>,
}

impl Default for ListKeys {
    fn default() -> Self {
        Self {
            quit: vec!["q".into()],
            add: vec!["a".into()],
            edit: vec!["e".into(), "Enter".into()],
            delete: vec!["d".into()],
            refresh: vec!["r".into()],
            next: vec!["j".into(), "Down".into()],
            prev: vec!["k".into(), "Up".into()],
        }
    }
}

impl Default for ModalKeys {
    fn default() -> Self {
        Self {
            close: vec!["Escape".into()],
            toggle_tab: vec!["Ctrl+t".into()],
            next_field: vec!["Tab".into()],
            prev_field: vec!["Backtab".into()],
            submit: vec!["Ctrl+s".into()],
        }
    }
}

impl Default for ConfirmKeys {
    fn default() -> Self {
        Self {
            accept: vec!["y".into(), "Enter".into()],
            reject: vec!["n".into(), "Escape".into()],
        }
    }
}

// =============================================================================
// Serde deserialization types (support both single string and array)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeyBinding {
    Single(String),
    Multiple(Vec<String>),
}

impl KeyBinding {
    fn into_vec(self) -> Vec<String> {
        match self {
            KeyBinding::Single(s) => vec![s],
            KeyBinding::Multiple(v) => v,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct KeysFile {
    list: ListKeysFile,
    modal: ModalKeysFile,
    confirm: ConfirmKeysFile,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ListKeysFile {
    quit: KeyBinding,
    add: KeyBinding,
    edit: KeyBinding,
    delete: KeyBinding,
    refresh: KeyBinding,
    next: KeyBinding,
    prev: KeyBinding,
}

impl Default for ListKeysFile {
    fn default() -> Self {
        let d = ListKeys::default();
        Self {
            quit: KeyBinding::Multiple(d.quit),
            add: KeyBinding::Multiple(d.add),
            edit: KeyBinding::Multiple(d.edit),
            delete: KeyBinding::Multiple(d.delete),
            refresh: KeyBinding::Multiple(d.refresh),
            next: KeyBinding::Multiple(d.next),
            prev: KeyBinding::Multiple(d.prev),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ModalKeysFile {
    close: KeyBinding,
    toggle_tab: KeyBinding,
    next_field: KeyBinding,
    prev_field: KeyBinding,
    submit: KeyBinding,
}

impl Default for ModalKeysFile {
    fn default() -> Self {
        let d = ModalKeys::default();
        Self {
            close: KeyBinding::Multiple(d.close),
            toggle_tab: KeyBinding::Multiple(d.toggle_tab),
            next_field: KeyBinding::Multiple(d.next_field),
            prev_field: KeyBinding::Multiple(d.prev_field),
            submit: KeyBinding::Multiple(d.submit),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConfirmKeysFile {
    accept: KeyBinding,
    reject: KeyBinding,
}

impl Default for ConfirmKeysFile {
    fn default() -> Self {
        let d = ConfirmKeys::default();
        Self {
            accept: KeyBinding::Multiple(d.accept),
            reject: KeyBinding::Multiple(d.reject),
        }
    }
}

impl From<KeysFile> for Keys {
    fn from(file: KeysFile) -> Self {
        Self {
            list: ListKeys {
                quit: file.list.quit.into_vec(),
                add: file.list.add.into_vec(),
                edit: file.list.edit.into_vec(),
                delete: file.list.delete.into_vec(),
                refresh: file.list.refresh.into_vec(),
                next: file.list.next.into_vec(),
                prev: file.list.prev.into_vec(),
            },
            modal: ModalKeys {
                close: file.modal.close.into_vec(),
                toggle_tab: file.modal.toggle_tab.into_vec(),
                next_field: file.modal.next_field.into_vec(),
                prev_field: file.modal.prev_field.into_vec(),
                submit: file.modal.submit.into_vec(),
            },
            confirm: ConfirmKeys {
                accept: file.confirm.accept.into_vec(),
                reject: file.confirm.reject.into_vec(),
            },
        }
    }
}

// =============================================================================
// Key binding validation
// =============================================================================

/// Normalize a key binding string to a canonical form for collision detection.
/// Single characters preserve case (since 'M' means Shift+m, different from 'm').
/// Multi-character key names are case-insensitive (Enter, ENTER, enter are the same).
pub fn normalize_binding(binding: &str) -> String {
    let trimmed = binding.trim();
    if trimmed.chars().count() == 1 {
        trimmed.to_string()
    } else {
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "esc" => "escape".to_string(),
            "shift+tab" => "backtab".to_string(),
            _ => lower,
        }
    }
}

/// Check for collisions within a single context
fn check_context_collisions(bindings: &[(&str, &[String])], context_name: &str) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for (action_name, keys) in bindings {
        for key in *keys {
            let normalized = normalize_binding(key);
            if normalized.is_empty() {
                continue;
            }
            if let Some(existing_action) = seen.get(&normalized) {
                bail!(
                    "key binding collision in [keys.{}]: '{}' is bound to both '{}' and '{}'",
                    context_name,
                    key,
                    existing_action,
                    action_name
                );
            }
            seen.insert(normalized, action_name);
        }
    }

    Ok(())
}

fn validate_key_bindings(keys: &Keys) -> Result<()> {
    check_context_collisions(
        &[
            ("quit", &keys.list.quit),
            ("add", &keys.list.add),
            ("edit", &keys.list.edit),
            ("delete", &keys.list.delete),
            ("refresh", &keys.list.refresh),
            ("next", &keys.list.next),
            ("prev", &keys.list.prev),
        ],
        "list",
    )?;

    check_context_collisions(
        &[
            ("close", &keys.modal.close),
            ("toggle_tab", &keys.modal.toggle_tab),
            ("next_field", &keys.modal.next_field),
            ("prev_field", &keys.modal.prev_field),
            ("submit", &keys.modal.submit),
        ],
        "modal",
    )?;

    check_context_collisions(
        &[
            ("accept", &keys.confirm.accept),
            ("reject", &keys.confirm.reject),
        ],
        "confirm",
    )?;

    Ok(())
}

// =============================================================================
// Config file structure
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api_url: Option<String>,
    user_id: Option<String>,
    token: Option<String>,
    phone_region: Option<String>,
    relationships: Vec<String>,
    request_timeout_secs: u64,
    search: SearchFile,
    keys: KeysFile,
    ui: UiFile,
    log: LogFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            api_url: None,
            user_id: None,
            token: None,
            phone_region: None,
            relationships: Vec::new(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            search: SearchFile::default(),
            keys: KeysFile::default(),
            ui: UiFile::default(),
            log: LogFile::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SearchFile {
    debounce_ms: u64,
}

impl Default for SearchFile {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LogFile {
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct UiFile {
    colors: UiColorsFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct UiColorsFile {
    border: RgbColor,
    selection_bg: RgbColor,
    selection_fg: RgbColor,
    error: RgbColor,
    muted: RgbColor,
    status_fg: RgbColor,
    status_bg: RgbColor,
}

impl Default for UiColorsFile {
    fn default() -> Self {
        Self {
            border: RgbColor::new(95, 175, 215),
            selection_bg: RgbColor::new(95, 175, 215),
            selection_fg: RgbColor::new(0, 0, 0),
            error: RgbColor::new(215, 95, 95),
            muted: RgbColor::new(128, 128, 128),
            status_fg: RgbColor::new(95, 175, 215),
            status_bg: RgbColor::new(0, 0, 0),
        }
    }
}

impl From<UiColorsFile> for UiColors {
    fn from(file: UiColorsFile) -> Self {
        Self {
            border: file.border,
            selection_bg: file.selection_bg,
            selection_fg: file.selection_fg,
            error: file.error,
            muted: file.muted,
            status_fg: file.status_fg,
            status_bg: file.status_bg,
        }
    }
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

fn default_log_file() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.data_dir().join(APP_NAME).join(LOG_FILE_NAME))
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(expand_tilde(path)),
        None => config_path(),
    }
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;

    let value: toml::Value = toml::from_str(&raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))
}

/// Load the configuration from `path`, or from the default location.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = resolve_path(path)?;
    if !path.exists() {
        bail!(
            "configuration file not found at {}. Create it with at least `api_url` and `user_id`.",
            path.display()
        );
    }
    let cfg_file = read_file(&path)?;
    let env_token = std::env::var(TOKEN_ENV).ok();
    build(cfg_file, path, env_token)
}

/// Relationship types from the config file if one exists, the defaults otherwise.
pub fn load_relationships(path: Option<&Path>) -> Result<Vec<String>> {
    let path = resolve_path(path)?;
    if !path.exists() {
        return Ok(default_relationships());
    }
    let cfg_file = read_file(&path)?;
    Ok(relationships_or_default(cfg_file.relationships))
}

fn relationships_or_default(configured: Vec<String>) -> Vec<String> {
    let cleaned: Vec<String> = configured
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if cleaned.is_empty() {
        default_relationships()
    } else {
        cleaned
    }
}

fn build(cfg_file: ConfigFile, path: PathBuf, env_token: Option<String>) -> Result<Config> {
    let url = cfg_file
        .api_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("`api_url` must be specified in configuration"))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("`api_url` must start with http:// or https://, got '{}'", url);
    }

    let user_id = cfg_file
        .user_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("`user_id` must be specified in configuration"))?;

    if cfg_file.request_timeout_secs == 0 {
        bail!("`request_timeout_secs` must be greater than zero");
    }

    // The environment wins so secrets can stay out of the file
    let token = env_token
        .or(cfg_file.token)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let phone_region = cfg_file
        .phone_region
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_uppercase());

    let keys: Keys = cfg_file.keys.into();
    validate_key_bindings(&keys)?;

    let log_file = match cfg_file.log.file {
        Some(file) => expand_tilde(&file),
        None => default_log_file()?,
    };

    Ok(Config {
        config_path: path,
        api: ApiConfig {
            url,
            token,
            request_timeout_secs: cfg_file.request_timeout_secs,
        },
        user_id,
        phone_region,
        relationships: relationships_or_default(cfg_file.relationships),
        search: SearchConfig {
            debounce: Duration::from_millis(cfg_file.search.debounce_ms),
        },
        keys,
        ui: UiConfig {
            colors: cfg_file.ui.colors.into(),
        },
        log: LogConfig { file: log_file },
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from([
        "api_url",
        "user_id",
        "token",
        "phone_region",
        "relationships",
        "request_timeout_secs",
        "search",
        "keys",
        "ui",
        "log",
    ]);

    for key in table.keys() {
        if !known.contains(key.as_str()) {
            eprintln!("warning: unknown configuration key `{}`", key);
        }
    }

    if let Some(v) = table.get("search") {
        warn_unknown_in_section(v, "search", &["debounce_ms"]);
    }
    if let Some(v) = table.get("log") {
        warn_unknown_in_section(v, "log", &["file"]);
    }
    if let Some(keys_val) = table.get("keys") {
        warn_unknown_keys_section(keys_val);
    }
    if let Some(ui_val) = table.get("ui") {
        warn_unknown_in_section(ui_val, "ui", &["colors"]);
        if let Some(colors) = ui_val.get("colors") {
            warn_unknown_in_section(
                colors,
                "ui.colors",
                &[
                    "border",
                    "selection_bg",
                    "selection_fg",
                    "error",
                    "muted",
                    "status_fg",
                    "status_bg",
                ],
            );
        }
    }
}

fn warn_unknown_keys_section(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known_contexts = HashSet::from(["list", "modal", "confirm"]);
    for key in table.keys() {
        if !known_contexts.contains(key.as_str()) {
            eprintln!("warning: unknown keys.* context `{}`", key);
        }
    }

    if let Some(v) = table.get("list") {
        warn_unknown_in_section(
            v,
            "keys.list",
            &["quit", "add", "edit", "delete", "refresh", "next", "prev"],
        );
    }
    if let Some(v) = table.get("modal") {
        warn_unknown_in_section(
            v,
            "keys.modal",
            &["close", "toggle_tab", "next_field", "prev_field", "submit"],
        );
    }
    if let Some(v) = table.get("confirm") {
        warn_unknown_in_section(v, "keys.confirm", &["accept", "reject"]);
    }
}

fn warn_unknown_in_section(value: &toml::Value, section: &str, known: &[&str]) {
    let Some(table) = value.as_table() else {
        return;
    };
    let known_set: HashSet<&str> = known.iter().copied().collect();
    for key in table.keys() {
        if !known_set.contains(key.as_str()) {
            eprintln!("warning: unknown {}.* entry `{}`", section, key);
        }
    }
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl<'de> serde::Deserialize<'de> for RgbColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Array([u8; 3]),
            Map { r: u8, g: u8, b: u8 },
        }

        let helper = Helper::deserialize(deserializer)?;
        let (r, g, b) = match helper {
            Helper::Array(values) => (values[0], values[1], values[2]),
            Helper::Map { r, g, b } => (r, g, b),
        };
        Ok(RgbColor { r, g, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ConfigFile {
        let value: toml::Value = toml::from_str(raw).unwrap();
        value.try_into().unwrap()
    }

    fn built(raw: &str) -> Result<Config> {
        build(parse(raw), PathBuf::from("config.toml"), None)
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = built(
            r#"
            api_url = "https://care.example.com/"
            user_id = "u-42"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.url, "https://care.example.com/");
        assert_eq!(config.api.request_timeout_secs, 15);
        assert_eq!(config.api.token, None);
        assert_eq!(config.user_id, "u-42");
        assert_eq!(config.search.debounce, Duration::from_millis(300));
        assert_eq!(config.relationships, default_relationships());
        assert_eq!(config.keys.list.add, vec!["a".to_string()]);
        assert_eq!(config.keys.modal.submit, vec!["Ctrl+s".to_string()]);
    }

    #[test]
    fn test_required_fields() {
        let err = built(r#"user_id = "u-42""#).unwrap_err();
        assert!(err.to_string().contains("api_url"));

        let err = built(r#"api_url = "https://care.example.com""#).unwrap_err();
        assert!(err.to_string().contains("user_id"));

        let err = built(
            r#"
            api_url = "care.example.com"
            user_id = "u-42"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_overrides_and_env_token() {
        let file = parse(
            r#"
            api_url = "http://localhost:8000"
            user_id = "u-1"
            token = "from-file"
            phone_region = " us "
            relationships = ["Friend", " ", "Doctor"]
            request_timeout_secs = 5

            [search]
            debounce_ms = 150

            [keys.list]
            add = "n"

            [ui.colors]
            border = [1, 2, 3]
            error = { r = 9, g = 8, b = 7 }
            "#,
        );
        let config = build(file, PathBuf::from("c.toml"), Some("from-env".into())).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("from-env"));
        assert_eq!(config.phone_region.as_deref(), Some("US"));
        assert_eq!(config.relationships, vec!["Friend".to_string(), "Doctor".to_string()]);
        assert_eq!(config.api.request_timeout_secs, 5);
        assert_eq!(config.search.debounce, Duration::from_millis(150));
        assert_eq!(config.keys.list.add, vec!["n".to_string()]);
        assert_eq!(config.ui.colors.border, RgbColor::new(1, 2, 3));
        assert_eq!(config.ui.colors.error, RgbColor::new(9, 8, 7));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = built(
            r#"
            api_url = "http://localhost"
            user_id = "u-1"
            request_timeout_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_key_collision_detected() {
        let err = built(
            r#"
            api_url = "http://localhost"
            user_id = "u-1"

            [keys.modal]
            close = ["Esc"]
            submit = ["escape"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("keys.modal"));
    }

    #[test]
    fn test_normalize_binding() {
        assert_eq!(normalize_binding("M"), "M");
        assert_eq!(normalize_binding("ENTER"), "enter");
        assert_eq!(normalize_binding("Esc"), "escape");
        assert_eq!(normalize_binding("Ctrl+S"), "ctrl+s");
    }
}
