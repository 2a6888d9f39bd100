//! Configuration surface for the NeonX hero backdrop.
//!
//! Every option of the two background effects is a named TOML key with a
//! default. The JavaScript-style camelCase names (`horizontalBeamOffset`,
//! `mouseSmoothTime`, ...) are accepted as aliases and unknown keys are ignored,
//! so partial documents like the one below are valid:
//!
//! ```toml
//! [laser_flow]
//! color = "#FF79C6"
//! wispIntensity = 3.5
//!
//! [particle_field]
//! density = 0.4
//! seed = 7
//! ```

mod color;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub use color::{ColorError, Rgb};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackdropConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub stage: StageSettings,
    #[serde(default, alias = "laserFlow")]
    pub laser_flow: LaserFlowConfig,
    #[serde(default, alias = "particleField")]
    pub particle_field: ParticleFieldConfig,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window: WindowSettings::default(),
            stage: StageSettings::default(),
            laser_flow: LaserFlowConfig::default(),
            particle_field: ParticleFieldConfig::default(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
    #[serde(
        deserialize_with = "deserialize_antialias",
        serialize_with = "serialize_antialias"
    )]
    pub antialias: AntialiasSetting,
    pub power: PowerSetting,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            title: "NeonX".to_string(),
            antialias: AntialiasSetting::Auto,
            power: PowerSetting::High,
        }
    }
}

/// Page-level settings: what sits behind the effects and in which order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StageSettings {
    /// Page colour the layers composite over (`bg-slate-950`).
    pub background: Rgb,
    /// Bottom-to-top stacking order of the mounted layers.
    pub layers: Vec<LayerKind>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            background: Rgb::from_hex(0x020617),
            layers: vec![LayerKind::ParticleField, LayerKind::LaserFlow],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    #[serde(alias = "laserFlow")]
    LaserFlow,
    #[serde(alias = "particleField")]
    ParticleField,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::LaserFlow => f.write_str("laser_flow"),
            LayerKind::ParticleField => f.write_str("particle_field"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntialiasSetting {
    Auto,
    Off,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
}

impl AntialiasSetting {
    pub fn from_samples(samples: u32) -> Option<Self> {
        match samples {
            0 | 1 => Some(Self::Off),
            2 => Some(Self::Samples2),
            4 => Some(Self::Samples4),
            8 => Some(Self::Samples8),
            16 => Some(Self::Samples16),
            _ => None,
        }
    }

    pub fn samples(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Off => Some(1),
            Self::Samples2 => Some(2),
            Self::Samples4 => Some(4),
            Self::Samples8 => Some(8),
            Self::Samples16 => Some(16),
        }
    }
}

impl fmt::Display for AntialiasSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.samples() {
            None => f.write_str("auto"),
            Some(1) => f.write_str("off"),
            Some(samples) => write!(f, "{samples}"),
        }
    }
}

pub fn parse_antialias(raw: &str) -> Result<AntialiasSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(AntialiasSetting::Auto),
        "off" | "none" | "disable" | "disabled" | "0" | "1" => Ok(AntialiasSetting::Off),
        "2" => Ok(AntialiasSetting::Samples2),
        "4" => Ok(AntialiasSetting::Samples4),
        "8" => Ok(AntialiasSetting::Samples8),
        "16" => Ok(AntialiasSetting::Samples16),
        other => Err(format!("invalid antialias setting '{other}'")),
    }
}

/// Options of the fullscreen laser/fog shader panel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LaserFlowConfig {
    pub enabled: bool,
    pub color: Rgb,
    #[serde(alias = "horizontalBeamOffset")]
    pub horizontal_beam_offset: f32,
    #[serde(alias = "verticalBeamOffset")]
    pub vertical_beam_offset: f32,
    #[serde(alias = "flowSpeed")]
    pub flow_speed: f32,
    #[serde(alias = "wispDensity")]
    pub wisp_density: f32,
    #[serde(alias = "wispSpeed")]
    pub wisp_speed: f32,
    #[serde(alias = "wispIntensity")]
    pub wisp_intensity: f32,
    #[serde(alias = "fogIntensity")]
    pub fog_intensity: f32,
    #[serde(alias = "verticalSizing")]
    pub vertical_sizing: f32,
    #[serde(alias = "horizontalSizing")]
    pub horizontal_sizing: f32,
    #[serde(alias = "flowStrength")]
    pub flow_strength: f32,
    pub decay: f32,
    #[serde(alias = "falloffStart")]
    pub falloff_start: f32,
    #[serde(alias = "fogFallSpeed")]
    pub fog_fall_speed: f32,
    #[serde(alias = "mouseSmoothTime")]
    pub mouse_smooth_time: f32,
    #[serde(alias = "mouseTiltStrength")]
    pub mouse_tilt_strength: f32,
    /// Fixed device pixel ratio; when unset the display ratio is used, capped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpr: Option<f64>,
    #[serde(alias = "devicePixelRatioCap")]
    pub device_pixel_ratio_cap: f64,
    #[serde(
        alias = "fadeIn",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fade_in: Duration,
}

impl Default for LaserFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            color: Rgb::from_hex(0xff79c6),
            horizontal_beam_offset: 0.1,
            vertical_beam_offset: 0.0,
            flow_speed: 0.35,
            wisp_density: 1.0,
            wisp_speed: 15.0,
            wisp_intensity: 5.0,
            fog_intensity: 0.45,
            vertical_sizing: 2.0,
            horizontal_sizing: 0.5,
            flow_strength: 0.25,
            decay: 1.1,
            falloff_start: 1.2,
            fog_fall_speed: 0.6,
            mouse_smooth_time: 0.0,
            mouse_tilt_strength: 0.01,
            dpr: None,
            device_pixel_ratio_cap: 2.0,
            fade_in: Duration::from_millis(800),
        }
    }
}

impl LaserFlowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let knobs = [
            ("horizontal_beam_offset", self.horizontal_beam_offset),
            ("vertical_beam_offset", self.vertical_beam_offset),
            ("flow_speed", self.flow_speed),
            ("wisp_density", self.wisp_density),
            ("wisp_speed", self.wisp_speed),
            ("wisp_intensity", self.wisp_intensity),
            ("fog_intensity", self.fog_intensity),
            ("vertical_sizing", self.vertical_sizing),
            ("horizontal_sizing", self.horizontal_sizing),
            ("flow_strength", self.flow_strength),
            ("decay", self.decay),
            ("falloff_start", self.falloff_start),
            ("fog_fall_speed", self.fog_fall_speed),
            ("mouse_smooth_time", self.mouse_smooth_time),
            ("mouse_tilt_strength", self.mouse_tilt_strength),
        ];
        for (name, value) in knobs {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "laser_flow.{name} must be a finite number"
                )));
            }
        }

        // Both beams divide by the horizontal sizing.
        if self.horizontal_sizing <= 0.0 {
            return Err(ConfigError::Invalid(
                "laser_flow.horizontal_sizing must be greater than zero".into(),
            ));
        }
        if self.decay <= 0.0 {
            return Err(ConfigError::Invalid(
                "laser_flow.decay must be greater than zero".into(),
            ));
        }

        validate_pixel_ratio("laser_flow", self.dpr, self.device_pixel_ratio_cap)
    }
}

/// Options of the procedural chain/coin/node scene.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ParticleFieldConfig {
    pub enabled: bool,
    #[serde(alias = "primaryColor")]
    pub primary_color: Rgb,
    #[serde(alias = "accentColor")]
    pub accent_color: Rgb,
    #[serde(alias = "coinColor")]
    pub coin_color: Rgb,
    /// 0..1, controls how many chains, coins and nodes spawn.
    pub density: f64,
    #[serde(alias = "devicePixelRatioCap")]
    pub device_pixel_ratio_cap: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpr: Option<f64>,
    /// Seed for the procedural layout; entropy-seeded per mount when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(
        alias = "fadeIn",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fade_in: Duration,
}

impl Default for ParticleFieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_color: Rgb::from_hex(0x00e5ff),
            accent_color: Rgb::from_hex(0xa855f7),
            coin_color: Rgb::from_hex(0xfde68a),
            density: 0.8,
            device_pixel_ratio_cap: 2.0,
            dpr: None,
            seed: None,
            fade_in: Duration::ZERO,
        }
    }
}

impl ParticleFieldConfig {
    /// True when `other` differs in a field that shapes the generated scene.
    pub fn requires_rebuild(&self, other: &Self) -> bool {
        self.primary_color != other.primary_color
            || self.accent_color != other.accent_color
            || self.coin_color != other.coin_color
            || self.density != other.density
            || self.dpr != other.dpr
            || self.seed != other.seed
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.density.is_finite() || !(0.0..=1.0).contains(&self.density) {
            return Err(ConfigError::Invalid(format!(
                "particle_field.density must be within [0, 1], got {}",
                self.density
            )));
        }
        validate_pixel_ratio("particle_field", self.dpr, self.device_pixel_ratio_cap)
    }
}

fn validate_pixel_ratio(section: &str, dpr: Option<f64>, cap: f64) -> Result<(), ConfigError> {
    if !cap.is_finite() || cap < 1.0 {
        return Err(ConfigError::Invalid(format!(
            "{section}.device_pixel_ratio_cap must be >= 1"
        )));
    }
    if let Some(ratio) = dpr {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "{section}.dpr must be greater than zero"
            )));
        }
    }
    Ok(())
}

impl BackdropConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BackdropConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window dimensions must be greater than zero".into(),
            ));
        }

        for (index, layer) in self.stage.layers.iter().enumerate() {
            if self.stage.layers[..index].contains(layer) {
                return Err(ConfigError::Invalid(format!(
                    "stage.layers lists '{layer}' more than once"
                )));
            }
        }

        self.laser_flow.validate()?;
        self.particle_field.validate()
    }

    /// Layers that are both listed in the stage order and enabled.
    pub fn active_layers(&self) -> impl Iterator<Item = LayerKind> + '_ {
        self.stage.layers.iter().copied().filter(|kind| match kind {
            LayerKind::LaserFlow => self.laser_flow.enabled,
            LayerKind::ParticleField => self.particle_field.enabled,
        })
    }
}

fn deserialize_antialias<'de, D>(deserializer: D) -> Result<AntialiasSetting, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Str(raw) => parse_antialias(&raw).map_err(de::Error::custom),
        Helper::Num(value) => {
            if value < 0 {
                return Err(de::Error::custom("antialias value must be non-negative"));
            }
            parse_antialias(&value.to_string()).map_err(de::Error::custom)
        }
    }
}

fn serialize_antialias<S>(value: &AntialiasSetting, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_zero() {
        serializer.serialize_str("0s")
    } else {
        serializer.collect_str(&humantime::format_duration(*value))
    }
}
