/*
 *  config.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML, command line, environment
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::ascii::{FONT_4X6, FONT_6X10};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::bars::{BAR_COUNT, BAR_GAP, BAR_WIDTH, MAX_BAR_HEIGHT};
use crate::levels::LEVEL_PORT;
use crate::nowplaying::{NOW_PLAYING_TOPIC, POLL_WINDOW};

pub const DEFAULT_PANEL_SIZE: u32 = 64;
pub const DEFAULT_FPS: u32 = 60;
pub const DEFAULT_DEVICE: &str = "/dev/fb0";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_SERVICE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = POLL_WINDOW.as_millis() as u64;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
pub const DEFAULT_CLIENT_ID: &str = "vumatrix";

const REDACTED: &str = "********";

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub panel: Option<PanelConfig>,
    pub levels: Option<LevelsConfig>,
    pub mqtt: Option<MqttConfig>,
    /// how often the metadata service gets a turn
    pub service_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PanelConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_bar_height: Option<u32>,
    pub bar_width: Option<u32>,
    pub bar_gap: Option<u32>,
    pub font: Option<FontKind>,
    pub fps: Option<u32>,
    pub driver: Option<DriverKind>,
    pub device: Option<String>,       // e.g. "/dev/fb0"
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LevelsConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MqttConfig {
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FontKind {
    /// 4px wide cells, fits 15 characters on the panel
    TomThumb,
    Terminal,
}

impl FontKind {
    pub fn font(self) -> &'static MonoFont<'static> {
        match self {
            FontKind::TomThumb => &FONT_4X6,
            FontKind::Terminal => &FONT_6X10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Fbdev,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            panel: Some(PanelConfig {
                width: Some(DEFAULT_PANEL_SIZE),
                height: Some(DEFAULT_PANEL_SIZE),
                max_bar_height: Some(MAX_BAR_HEIGHT),
                bar_width: Some(BAR_WIDTH),
                bar_gap: Some(BAR_GAP),
                font: Some(FontKind::TomThumb),
                fps: Some(DEFAULT_FPS),
                driver: Some(DriverKind::Fbdev),
                device: Some(DEFAULT_DEVICE.into()),
            }),
            levels: Some(LevelsConfig {
                bind: Some("0.0.0.0".into()),
                port: Some(LEVEL_PORT),
            }),
            mqtt: Some(MqttConfig {
                broker: None,
                port: Some(DEFAULT_MQTT_PORT),
                username: None,
                password: None,
                topic: Some(NOW_PLAYING_TOPIC.into()),
                client_id: Some(DEFAULT_CLIENT_ID.into()),
                keep_alive_secs: Some(DEFAULT_KEEP_ALIVE_SECS),
                poll_timeout_ms: Some(DEFAULT_POLL_TIMEOUT_MS),
                connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            }),
            service_interval_ms: Some(DEFAULT_SERVICE_INTERVAL_MS),
        }
    }
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn panel(&self) -> PanelConfig {
        self.panel.clone().unwrap_or_default()
    }

    pub fn levels(&self) -> LevelsConfig {
        self.levels.clone().unwrap_or_default()
    }

    pub fn mqtt(&self) -> MqttConfig {
        self.mqtt.clone().unwrap_or_default()
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_millis(self.service_interval_ms.unwrap_or(DEFAULT_SERVICE_INTERVAL_MS))
    }

    /// Copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Config {
        let mut cfg = self.clone();
        if let Some(mqtt) = cfg.mqtt.as_mut() {
            if mqtt.password.is_some() {
                mqtt.password = Some(REDACTED.into());
            }
        }
        cfg
    }
}

impl PanelConfig {
    pub fn width(&self) -> u32 { self.width.unwrap_or(DEFAULT_PANEL_SIZE) }
    pub fn height(&self) -> u32 { self.height.unwrap_or(DEFAULT_PANEL_SIZE) }
    pub fn max_bar_height(&self) -> u32 { self.max_bar_height.unwrap_or(MAX_BAR_HEIGHT) }
    pub fn bar_width(&self) -> u32 { self.bar_width.unwrap_or(BAR_WIDTH) }
    pub fn bar_gap(&self) -> u32 { self.bar_gap.unwrap_or(BAR_GAP) }
    pub fn font(&self) -> FontKind { self.font.unwrap_or(FontKind::TomThumb) }
    pub fn fps(&self) -> u32 { self.fps.unwrap_or(DEFAULT_FPS) }
    pub fn driver(&self) -> DriverKind { self.driver.unwrap_or(DriverKind::Fbdev) }
    pub fn device(&self) -> &str { self.device.as_deref().unwrap_or(DEFAULT_DEVICE) }
}

impl LevelsConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or("0.0.0.0");
        let ip: IpAddr = bind
            .parse()
            .map_err(|_| ConfigError::Validation(format!("levels bind '{}' is not an IP address", bind)))?;
        Ok(SocketAddr::new(ip, self.port.unwrap_or(LEVEL_PORT)))
    }
}

impl MqttConfig {
    pub fn port(&self) -> u16 { self.port.unwrap_or(DEFAULT_MQTT_PORT) }
    pub fn topic(&self) -> &str { self.topic.as_deref().unwrap_or(NOW_PLAYING_TOPIC) }
    pub fn client_id(&self) -> &str { self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID) }
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS))
    }
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.unwrap_or(DEFAULT_POLL_TIMEOUT_MS))
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS))
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "vumatrix", version, about = "Audio-reactive LED matrix", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub panel_width: Option<u32>,
    #[arg(long)]
    pub panel_height: Option<u32>,
    #[arg(long)]
    pub panel_fps: Option<u32>,
    /// tom-thumb | terminal
    #[arg(long, value_parser = parse_font)]
    pub panel_font: Option<FontKind>,
    /// framebuffer device, e.g. /dev/fb1
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub panel_device: Option<String>,
    #[arg(long)]
    pub levels_bind: Option<String>,
    #[arg(long)]
    pub levels_port: Option<u16>,
    /// host or host:port
    #[arg(long)]
    pub mqtt_broker: Option<String>,
    #[arg(long)]
    pub mqtt_topic: Option<String>,
    #[arg(long)]
    pub service_interval_ms: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

fn parse_font(s: &str) -> Result<FontKind, String> {
    match s {
        "tom-thumb" | "tomthumb" => Ok(FontKind::TomThumb),
        "terminal" => Ok(FontKind::Terminal),
        other => Err(format!("unknown font '{}' (tom-thumb | terminal)", other)),
    }
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_from(&cli, |key| std::env::var(key).ok())?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg.redacted())?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Build the effective config from parsed args and an environment lookup.
pub fn load_from<F>(cli: &Cli, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides
    apply_cli_overrides(&mut cfg, cli);

    // 4) broker credentials from the environment
    apply_env(&mut cfg, env);

    // 5) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/vumatrix/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/vumatrix/config.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["vumatrix.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

/// Parse a YAML document where every key is optional.
pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Partial {
        log_level: Option<String>,
        panel: Option<PanelConfig>,
        levels: Option<LevelsConfig>,
        mqtt: Option<MqttConfig>,
        service_interval_ms: Option<u64>,
    }
    // an empty file is a null document, not an error
    let p: Option<Partial> = serde_yaml::from_str(s)?;
    let p = p.unwrap_or_default();
    Ok(Config {
        log_level: p.log_level,
        panel: p.panel,
        levels: p.levels,
        mqtt: p.mqtt,
        service_interval_ms: p.service_interval_ms,
    })
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()           { dst.log_level = src.log_level; }
    if src.service_interval_ms.is_some() { dst.service_interval_ms = src.service_interval_ms; }
    match (&mut dst.panel, src.panel) {
        (None, Some(c)) => dst.panel = Some(c),
        (Some(d), Some(s)) => merge_panel(d, s),
        _ => {}
    }
    match (&mut dst.levels, src.levels) {
        (None, Some(c)) => dst.levels = Some(c),
        (Some(d), Some(s)) => merge_levels(d, s),
        _ => {}
    }
    match (&mut dst.mqtt, src.mqtt) {
        (None, Some(c)) => dst.mqtt = Some(c),
        (Some(d), Some(s)) => merge_mqtt(d, s),
        _ => {}
    }
}

fn merge_panel(dst: &mut PanelConfig, src: PanelConfig) {
    if src.width.is_some()          { dst.width = src.width; }
    if src.height.is_some()         { dst.height = src.height; }
    if src.max_bar_height.is_some() { dst.max_bar_height = src.max_bar_height; }
    if src.bar_width.is_some()      { dst.bar_width = src.bar_width; }
    if src.bar_gap.is_some()        { dst.bar_gap = src.bar_gap; }
    if src.font.is_some()           { dst.font = src.font; }
    if src.fps.is_some()            { dst.fps = src.fps; }
    if src.driver.is_some()         { dst.driver = src.driver; }
    if src.device.is_some()         { dst.device = src.device; }
}

fn merge_levels(dst: &mut LevelsConfig, src: LevelsConfig) {
    if src.bind.is_some() { dst.bind = src.bind; }
    if src.port.is_some() { dst.port = src.port; }
}

fn merge_mqtt(dst: &mut MqttConfig, src: MqttConfig) {
    if src.broker.is_some()             { dst.broker = src.broker; }
    if src.port.is_some()               { dst.port = src.port; }
    if src.username.is_some()           { dst.username = src.username; }
    if src.password.is_some()           { dst.password = src.password; }
    if src.topic.is_some()              { dst.topic = src.topic; }
    if src.client_id.is_some()          { dst.client_id = src.client_id; }
    if src.keep_alive_secs.is_some()    { dst.keep_alive_secs = src.keep_alive_secs; }
    if src.poll_timeout_ms.is_some()    { dst.poll_timeout_ms = src.poll_timeout_ms; }
    if src.connect_timeout_ms.is_some() { dst.connect_timeout_ms = src.connect_timeout_ms; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()           { cfg.log_level = cli.log_level.clone(); }
    if cli.service_interval_ms.is_some() { cfg.service_interval_ms = cli.service_interval_ms; }

    let panel = cfg.panel.get_or_insert_with(PanelConfig::default);
    if cli.panel_width.is_some()  { panel.width = cli.panel_width; }
    if cli.panel_height.is_some() { panel.height = cli.panel_height; }
    if cli.panel_fps.is_some()    { panel.fps = cli.panel_fps; }
    if cli.panel_font.is_some()   { panel.font = cli.panel_font; }
    if cli.panel_device.is_some() { panel.device = cli.panel_device.clone(); }

    let levels = cfg.levels.get_or_insert_with(LevelsConfig::default);
    if cli.levels_bind.is_some() { levels.bind = cli.levels_bind.clone(); }
    if cli.levels_port.is_some() { levels.port = cli.levels_port; }

    let mqtt = cfg.mqtt.get_or_insert_with(MqttConfig::default);
    if let Some((host, port)) = cli.mqtt_broker.as_deref().and_then(parse_broker) {
        mqtt.broker = Some(host);
        if port.is_some() { mqtt.port = port; }
    }
    if cli.mqtt_topic.is_some() { mqtt.topic = cli.mqtt_topic.clone(); }
}

/// MQTT_BROKER, MQTT_USER, MQTT_PASS. An unparsable broker is left unset,
/// which the transport reports as not configured.
fn apply_env<F>(cfg: &mut Config, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mqtt = cfg.mqtt.get_or_insert_with(MqttConfig::default);
    if let Some(raw) = env("MQTT_BROKER") {
        match parse_broker(&raw) {
            Some((host, port)) => {
                mqtt.broker = Some(host);
                if port.is_some() { mqtt.port = port; }
            }
            None => mqtt.broker = None,
        }
    }
    if let Some(user) = env("MQTT_USER").filter(|s| !s.is_empty()) { mqtt.username = Some(user); }
    if let Some(pass) = env("MQTT_PASS").filter(|s| !s.is_empty()) { mqtt.password = Some(pass); }
}

/// `host` or `host:port`. None when the host is empty or the port is not a number.
pub fn parse_broker(raw: &str) -> Option<(String, Option<u16>)> {
    let raw = raw.trim();
    let (host, port) = match raw.rsplit_once(':') {
        // bare IPv6 literal, no port
        Some((h, _)) if h.contains(':') && !h.ends_with(']') => (raw, None),
        Some((h, p)) => (h, Some(p.parse::<u16>().ok().filter(|&p| p != 0)?)),
        None => (raw, None),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let panel = cfg.panel();
    let (w, h) = (panel.width(), panel.height());
    if w == 0 || h == 0 {
        return Err(ConfigError::Validation("panel width/height must be > 0".into()));
    }
    if panel.max_bar_height() == 0 || panel.max_bar_height() > h {
        return Err(ConfigError::Validation(format!(
            "panel max_bar_height must be 1..={}",
            h
        )));
    }
    if panel.bar_width() == 0 {
        return Err(ConfigError::Validation("panel bar_width must be > 0".into()));
    }
    let group = BAR_COUNT as u32 * (panel.bar_width() + panel.bar_gap());
    if group > w {
        return Err(ConfigError::Validation(format!(
            "{} bars of {}+{}px do not fit a {}px panel",
            BAR_COUNT,
            panel.bar_width(),
            panel.bar_gap(),
            w
        )));
    }
    if panel.fps() == 0 {
        return Err(ConfigError::Validation("panel fps must be > 0".into()));
    }

    cfg.levels().socket_addr()?;

    let mqtt = cfg.mqtt();
    if mqtt.topic().is_empty() {
        return Err(ConfigError::Validation("mqtt topic must not be empty".into()));
    }
    if mqtt.keep_alive() < Duration::from_secs(5) {
        return Err(ConfigError::Validation("mqtt keep_alive_secs must be >= 5".into()));
    }
    if mqtt.poll_timeout().is_zero() || mqtt.poll_timeout() >= cfg.service_interval() {
        return Err(ConfigError::Validation(
            "mqtt poll_timeout_ms must be > 0 and shorter than service_interval_ms".into(),
        ));
    }
    if mqtt.connect_timeout().is_zero() {
        return Err(ConfigError::Validation("mqtt connect_timeout_ms must be > 0".into()));
    }
    Ok(())
}
