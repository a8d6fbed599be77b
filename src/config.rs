use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::{parse_mqtt_endpoint, MqttSinkConfig};
use crate::filter::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::ingest::{snapshot_url, Rotation};
use crate::taxonomy::TaxonomyOverrides;

const DEFAULT_CAMERA_URL: &str = "http://192.168.50.145";
const DEFAULT_SNAPSHOT_PATH: &str = "/cam-hi.jpg";
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CLASS_FILE: &str = "coco.names";
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;
const DEFAULT_MQTT_TOPIC: &str = "animal_watch";
const DEFAULT_MQTT_CLIENT_ID: &str = "animal_watchd";

#[derive(Debug, Deserialize, Default)]
struct WatchConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    filter: Option<FilterConfigFile>,
    taxonomy: Option<TaxonomyConfigFile>,
    runtime: Option<RuntimeConfigFile>,
    display: Option<DisplayConfigFile>,
    alerts: Option<AlertsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    base_url: Option<String>,
    snapshot_path: Option<String>,
    timeout_secs: Option<u64>,
    rotation: Option<Rotation>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<DetectorBackendKind>,
    class_file: Option<PathBuf>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    detector_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TaxonomyConfigFile {
    /// Keys are class ids as strings (TOML table keys cannot be integers).
    animal_ids: Option<BTreeMap<String, String>>,
    turtle_ids: Option<Vec<i32>>,
    turtle_label: Option<String>,
    keywords: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RuntimeConfigFile {
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    snapshot_out: Option<PathBuf>,
    font_path: Option<PathBuf>,
    colors: Option<BTreeMap<String, [u8; 3]>>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    sink: Option<SinkKind>,
    mqtt_broker_addr: Option<String>,
    mqtt_topic: Option<String>,
    mqtt_client_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackendKind {
    Stub,
    Tract,
}

impl DetectorBackendKind {
    /// Tract when compiled in, stub otherwise.
    pub fn compiled_default() -> Self {
        if cfg!(feature = "backend-tract") {
            DetectorBackendKind::Tract
        } else {
            DetectorBackendKind::Stub
        }
    }
}

impl std::str::FromStr for DetectorBackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Ok(DetectorBackendKind::Stub),
            "tract" | "onnx" => Ok(DetectorBackendKind::Tract),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Console,
    Mqtt,
    None,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub confidence_threshold: f32,
    pub taxonomy: TaxonomyOverrides,
    pub retry_backoff: Duration,
    pub display: DisplaySettings,
    pub alerts: AlertSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub base_url: String,
    pub snapshot_path: String,
    pub timeout: Duration,
    pub rotation: Rotation,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CAMERA_URL.to_string(),
            snapshot_path: DEFAULT_SNAPSHOT_PATH.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rotation: Rotation::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: DetectorBackendKind,
    pub class_file: PathBuf,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    /// Threshold handed to the detector (inclusive).
    pub detector_threshold: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DisplaySettings {
    pub snapshot_out: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub colors: BTreeMap<String, [u8; 3]>,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub sink: SinkKind,
    pub mqtt: MqttSinkConfig,
    mqtt_broker_set: bool,
}

impl WatchConfig {
    /// Load from the file named by `ANIMAL_WATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANIMAL_WATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            base_url: camera_file
                .base_url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            snapshot_path: camera_file
                .snapshot_path
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
            timeout: Duration::from_secs(camera_file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            rotation: camera_file.rotation.unwrap_or_default(),
        };

        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            backend: model_file
                .backend
                .unwrap_or_else(DetectorBackendKind::compiled_default),
            class_file: model_file
                .class_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASS_FILE)),
            model_path: model_file.model_path,
            input_width: model_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: model_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            detector_threshold: model_file
                .detector_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };

        let confidence_threshold = file
            .filter
            .and_then(|filter| filter.confidence_threshold)
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        let taxonomy_file = file.taxonomy.unwrap_or_default();
        let animal_ids = match taxonomy_file.animal_ids {
            Some(table) => Some(parse_id_table(table)?),
            None => None,
        };
        let taxonomy = TaxonomyOverrides {
            animal_ids,
            turtle_ids: taxonomy_file.turtle_ids,
            turtle_label: taxonomy_file.turtle_label,
            keywords: taxonomy_file.keywords,
        };

        let retry_backoff = Duration::from_millis(
            file.runtime
                .and_then(|runtime| runtime.retry_backoff_ms)
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        );

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            snapshot_out: display_file.snapshot_out,
            font_path: display_file.font_path,
            colors: display_file.colors.unwrap_or_default(),
        };

        let alerts_file = file.alerts.unwrap_or_default();
        let mqtt_broker_set = alerts_file.mqtt_broker_addr.is_some();
        let alerts = AlertSettings {
            sink: alerts_file.sink.unwrap_or(SinkKind::Console),
            mqtt: MqttSinkConfig {
                broker_addr: alerts_file.mqtt_broker_addr.unwrap_or_default(),
                topic_prefix: alerts_file
                    .mqtt_topic
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC.to_string()),
                client_id: alerts_file
                    .mqtt_client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            },
            mqtt_broker_set,
        };

        Ok(Self {
            camera,
            model,
            confidence_threshold,
            taxonomy,
            retry_backoff,
            display,
            alerts,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("ANIMAL_WATCH_CAMERA_URL") {
            self.camera.base_url = url;
        }
        if let Some(path) = non_empty_env("ANIMAL_WATCH_CLASS_FILE") {
            self.model.class_file = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("ANIMAL_WATCH_MODEL_PATH") {
            self.model.model_path = Some(PathBuf::from(path));
        }
        if let Some(backend) = non_empty_env("ANIMAL_WATCH_BACKEND") {
            self.model.backend = backend.parse()?;
        }
        if let Some(path) = non_empty_env("ANIMAL_WATCH_SNAPSHOT_OUT") {
            self.display.snapshot_out = Some(PathBuf::from(path));
        }
        if let Some(addr) = non_empty_env("ANIMAL_WATCH_MQTT_BROKER") {
            self.alerts.mqtt.broker_addr = addr;
            self.alerts.mqtt_broker_set = true;
            self.alerts.sink = SinkKind::Mqtt;
        }
        if let Ok(backoff) = std::env::var("ANIMAL_WATCH_RETRY_BACKOFF_MS") {
            let millis: u64 = backoff.trim().parse().map_err(|_| {
                anyhow!("ANIMAL_WATCH_RETRY_BACKOFF_MS must be an integer number of milliseconds")
            })?;
            self.retry_backoff = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check settings; rerun after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        snapshot_url(&self.camera.base_url, &self.camera.snapshot_path)?;

        if self.camera.timeout.is_zero() {
            return Err(anyhow!("camera timeout must be greater than zero"));
        }
        for (name, value) in [
            ("filter.confidence_threshold", self.confidence_threshold),
            ("model.detector_threshold", self.model.detector_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
            }
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.alerts.sink == SinkKind::Mqtt {
            if !self.alerts.mqtt_broker_set {
                return Err(anyhow!("alerts.sink = mqtt requires alerts.mqtt_broker_addr"));
            }
            parse_mqtt_endpoint(&self.alerts.mqtt.broker_addr)?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_id_table(table: BTreeMap<String, String>) -> Result<BTreeMap<i32, String>> {
    table
        .into_iter()
        .map(|(id, label)| {
            let id: i32 = id
                .trim()
                .parse()
                .with_context(|| format!("taxonomy.animal_ids key '{}' is not a class id", id))?;
            Ok((id, label.to_lowercase()))
        })
        .collect()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
