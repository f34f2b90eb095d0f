//! Configuration Management

use crate::actuation::{default_profiles, ExerciseProfile, DEFAULT_QUEUE_CAPACITY};
use crate::analysis::ToleranceMetric;
use crate::reference::ColumnMapping;
use crate::session::{SessionParams, DEFAULT_TARGET_FPS, DEFAULT_TOLERANCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Reference table settings
    #[serde(default)]
    pub reference: ReferenceConfig,
    /// Actuator device settings
    #[serde(default)]
    pub actuator: ActuatorConfig,
    /// Exercise name -> profile
    #[serde(default = "default_profiles")]
    pub exercises: BTreeMap<String, ExerciseProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reference: ReferenceConfig::default(),
            actuator: ActuatorConfig::default(),
            exercises: default_profiles(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Live frame rate the clock counts against
    pub target_fps: u32,
    /// Normalized distance tolerance
    pub tolerance: f64,
    /// `per_axis` or `radius`
    pub metric: ToleranceMetric,
    /// Process every Nth frame
    pub frame_interval: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            tolerance: DEFAULT_TOLERANCE,
            metric: ToleranceMetric::PerAxis,
            frame_interval: 1,
        }
    }
}

/// Reference table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// CSV file written by the recorder
    pub path: PathBuf,
    /// Which header carries which identity field
    pub columns: ColumnMapping,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("motion_data.csv"),
            columns: ColumnMapping::default(),
        }
    }
}

/// Actuator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Send commands to the device; when false commands are only logged
    pub enabled: bool,
    /// Device base URL
    pub base_url: String,
    /// Request path
    pub path: String,
    /// Per-request timeout (ms)
    pub timeout_ms: u64,
    /// Command queue size
    pub queue_capacity: usize,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://192.168.4.1".to_string(),
            path: "/vibrate".to_string(),
            timeout_ms: 500,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    /// Returns Ok(()) if valid, or Err with a description of the first invalid field.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.session.target_fps == 0 || self.session.target_fps > 240 {
            return Err(crate::Error::Config(format!(
                "target_fps must be in [1, 240], got {}",
                self.session.target_fps
            )));
        }
        if !self.session.tolerance.is_finite() || self.session.tolerance < 0.0 {
            return Err(crate::Error::Config(format!(
                "tolerance must be a finite value >= 0, got {}",
                self.session.tolerance
            )));
        }
        if self.session.frame_interval == 0 {
            return Err(crate::Error::Config("frame_interval must be > 0".to_string()));
        }
        if self.actuator.timeout_ms == 0 {
            return Err(crate::Error::Config("timeout_ms must be > 0".to_string()));
        }
        if self.actuator.queue_capacity == 0 {
            return Err(crate::Error::Config("queue_capacity must be > 0".to_string()));
        }
        if self.actuator.enabled {
            crate::actuation::transport::endpoint_url(&self.actuator.base_url, &self.actuator.path)?;
        }
        for (name, profile) in &self.exercises {
            profile.validate(name)?;
        }
        Ok(())
    }

    /// Session parameters for one invocation, filled from the `[session]` section
    pub fn session_params(&self, exercise: &str, subject: &str, intensity: &str) -> SessionParams {
        SessionParams::new(exercise, subject, intensity)
            .with_target_fps(self.session.target_fps)
            .with_tolerance(self.session.tolerance)
            .with_metric(self.session.metric)
            .with_frame_interval(self.session.frame_interval)
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from default location
    pub fn load_default() -> Result<Self, crate::Error> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        let content = self.to_toml()?;

        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".motion_guide").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Generate TOML representation
    pub fn to_toml(&self) -> Result<String, crate::Error> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    fn to_value(&self) -> Result<toml::Value, crate::Error> {
        toml::Value::try_from(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Read a value by dotted key, e.g. `session.tolerance` or `exercises.knee.channel`
    pub fn get_key(&self, key: &str) -> Result<toml::Value, crate::Error> {
        let root = self.to_value()?;
        let mut current = &root;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| crate::Error::Config(format!("unknown config key '{}'", key)))?;
        }
        Ok(current.clone())
    }

    /// Set a value by dotted key and return the validated result
    ///
    /// `value` is read as a TOML literal (`0.2`, `true`, `[25, 26]`) and falls
    /// back to a plain string. The key must already exist.
    pub fn with_key(&self, key: &str, value: &str) -> Result<Self, crate::Error> {
        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(crate::Error::Config("empty config key".to_string()));
        };

        let mut root = self.to_value()?;
        let mut current = &mut root;
        for part in parents {
            current = current
                .get_mut(*part)
                .ok_or_else(|| crate::Error::Config(format!("unknown config key '{}'", key)))?;
        }
        let table = current
            .as_table_mut()
            .ok_or_else(|| crate::Error::Config(format!("'{}' is not a table", parents.join("."))))?;
        if !table.contains_key(*last) {
            return Err(crate::Error::Config(format!("unknown config key '{}'", key)));
        }
        table.insert(last.to_string(), parse_literal(value));

        let updated: Self = root
            .try_into()
            .map_err(|e: toml::de::Error| crate::Error::Config(e.to_string()))?;
        updated.validate()?;
        Ok(updated)
    }
}

/// Parse a CLI value as a TOML literal, or keep it as a string
fn parse_literal(value: &str) -> toml::Value {
    #[derive(Deserialize)]
    struct Wrapper {
        v: toml::Value,
    }
    toml::from_str::<Wrapper>(&format!("v = {}", value))
        .map(|w| w.v)
        .unwrap_or_else(|_| toml::Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.target_fps, 28);
        assert_eq!(config.session.tolerance, 0.15);
        assert_eq!(config.exercises.len(), 3);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[session]"));
        assert!(toml.contains("[reference]"));
        assert!(toml.contains("[actuator]"));
        assert!(toml.contains("[exercises.knee]"));
        assert!(toml.contains("metric = \"per_axis\""));
    }

    #[test]
    fn test_default_path() {
        let path = Config::default_path();
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_actuator_config_defaults() {
        let actuator = ActuatorConfig::default();
        assert!(actuator.enabled);
        assert_eq!(actuator.path, "/vibrate");
        assert_eq!(actuator.timeout(), Duration::from_millis(500));
        assert_eq!(actuator.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_config_roundtrip_serialization() {
        let original = Config::default();
        let toml_str = original.to_toml().unwrap();
        let deserialized: Config = toml::from_str(&toml_str).expect("Failed to deserialize");
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let mut original = Config::default();
        original.session.tolerance = 0.08;
        original.session.metric = ToleranceMetric::Radius;
        original.actuator.base_url = "http://10.0.0.7:8080".to_string();
        original.exercises.insert(
            "grip".to_string(),
            ExerciseProfile {
                channel: 4,
                pose_landmarks: vec![],
                hand_landmarks: vec![4, 8, 12],
            },
        );

        original.save(&config_path).expect("Failed to save config");
        assert!(config_path.exists());

        let loaded = Config::load(&config_path).expect("Failed to load config");
        assert_eq!(loaded, original);
        assert_eq!(loaded.exercises["grip"].hand_landmarks, vec![4, 8, 12]);
    }

    #[test]
    fn test_config_save_creates_parent_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let nested_path = temp_dir.path().join("nested").join("path").join("config.toml");

        Config::default().save(&nested_path).expect("Failed to save config");
        assert!(nested_path.exists());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let nonexistent_path = PathBuf::from("/tmp/nonexistent_motion_config_12345.toml");
        assert!(Config::load(&nonexistent_path).is_err());
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let partial = r#"
[session]
tolerance = 0.1
"#;
        let config: Config = toml::from_str(partial).expect("Partial config should deserialize");
        assert_eq!(config.session.tolerance, 0.1);
        assert_eq!(config.session.target_fps, 28);
        assert_eq!(config.actuator, ActuatorConfig::default());
        assert_eq!(config.exercises, default_profiles());
        assert_eq!(config.reference.columns.exercise, "n");
    }

    #[test]
    fn test_invalid_toml_parsing() {
        let result: Result<Config, _> = toml::from_str("this is not valid toml {{{}}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<fn(&mut Config)> = vec![
            |c: &mut Config| c.session.target_fps = 0,
            |c: &mut Config| c.session.tolerance = -0.5,
            |c: &mut Config| c.session.tolerance = f64::NAN,
            |c: &mut Config| c.session.frame_interval = 0,
            |c: &mut Config| c.actuator.timeout_ms = 0,
            |c: &mut Config| c.actuator.queue_capacity = 0,
            |c: &mut Config| c.actuator.base_url = "not a url".to_string(),
            |c: &mut Config| {
                c.exercises
                    .insert("bad".to_string(), ExerciseProfile::pose(1, &[40]));
            },
        ];
        for (i, mutate) in cases.into_iter().enumerate() {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "case {} should fail", i);
        }
    }

    #[test]
    fn test_disabled_actuator_skips_url_check() {
        let mut config = Config::default();
        config.actuator.enabled = false;
        config.actuator.base_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_values() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("bad_config.toml");
        std::fs::write(
            &config_path,
            r#"
[session]
target_fps = 0
tolerance = 0.15
"#,
        )
        .expect("Failed to write config");
        assert!(Config::load(&config_path).is_err());
    }

    #[test]
    fn test_session_params_from_config() {
        let mut config = Config::default();
        config.session.frame_interval = 2;
        let params = config.session_params("knee", "2", "weeks");
        assert_eq!(params.exercise, "knee");
        assert_eq!(params.target_fps, 28);
        assert_eq!(params.frame_interval, 2);
    }

    #[test]
    fn test_get_key() {
        let config = Config::default();
        assert_eq!(
            config.get_key("session.tolerance").unwrap(),
            toml::Value::Float(0.15)
        );
        assert_eq!(
            config.get_key("exercises.knee.channel").unwrap(),
            toml::Value::Integer(2)
        );
        assert!(config.get_key("session.nope").is_err());
    }

    #[test]
    fn test_with_key() {
        let config = Config::default();

        let updated = config.with_key("session.tolerance", "0.2").unwrap();
        assert_eq!(updated.session.tolerance, 0.2);

        let updated = config.with_key("session.metric", "radius").unwrap();
        assert_eq!(updated.session.metric, ToleranceMetric::Radius);

        let updated = config
            .with_key("exercises.knee.pose_landmarks", "[23, 25, 26]")
            .unwrap();
        assert_eq!(updated.exercises["knee"].pose_landmarks, vec![23, 25, 26]);

        let updated = config.with_key("actuator.enabled", "false").unwrap();
        assert!(!updated.actuator.enabled);

        // Unknown keys, wrong types and invalid values are rejected
        assert!(config.with_key("session.speed", "3").is_err());
        assert!(config.with_key("session.target_fps", "fast").is_err());
        assert!(config.with_key("session.target_fps", "0").is_err());
    }
}
