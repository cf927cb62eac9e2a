use lazy_static::lazy_static;
use serde::Deserialize;
use tracing::warn;

lazy_static! {
    pub static ref CONFIG: Config = Config::load();
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub camera: Camera,
    pub detection: Detection,
    pub alert: Alert,
    pub store: Store,
    pub alarm: Alarm,
    pub telemetry: Telemetry,
    pub output: Output,
}

impl Config {
    /// Reads the file named by `CONFIG_PATH` (set from the `--config` CLI
    /// flag), falling back to `config.toml`. A missing file yields the
    /// default configuration so the service and its tests can run without
    /// one; a malformed file is a startup failure.
    pub fn load() -> Self {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(err) => panic!("Invalid config file {}: {}", path, err),
            },
            Err(_) => {
                warn!("Config file {} not found, using defaults", path);
                Config::default()
            }
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Server {
    pub bind_address: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Camera {
    /// Device path or stream URL handed to FFmpeg, e.g. "/dev/video0".
    pub source: String,
    /// Process every nth decoded frame.
    pub frame_stride: u64,
    /// Minimum wall-clock spacing between processed frames.
    pub frame_interval_ms: u64,
    pub only_keyframes: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            source: "/dev/video0".to_string(),
            frame_stride: 1,
            frame_interval_ms: 100,
            only_keyframes: false,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Detection {
    pub api_url: String,
    pub target_label: String,
    /// Detections below this confidence (percent) never count as the
    /// target being present. 0 keeps every labeled detection.
    pub minimum_confidence: u8,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8300/detect".to_string(),
            target_label: "drowsy".to_string(),
            minimum_confidence: 0,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Alert {
    /// Continuous detection required before an episode is confirmed.
    pub debounce_seconds: f64,
}

impl Default for Alert {
    fn default() -> Self {
        Self {
            debounce_seconds: 3.0,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Store {
    pub log_file: String,
    pub snapshot_dir: String,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            log_file: "drowsiness_log.txt".to_string(),
            snapshot_dir: "snapshots".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmDriver {
    Gpio,
    Console,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Alarm {
    pub driver: AlarmDriver,
    pub led_pin: u8,
    pub buzzer_pin: u8,
}

impl Default for Alarm {
    fn default() -> Self {
        Self {
            driver: AlarmDriver::Console,
            led_pin: 17,
            buzzer_pin: 25,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub enum TelemetryBackend {
    Blynk,
    Webhook,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Telemetry {
    pub services: Vec<TelemetryBackend>,
    pub blynk: Blynk,
    pub webhook: Webhook,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Blynk {
    pub host: String,
    pub token: String,
    pub vpin_led: u8,
    pub vpin_status: u8,
    pub vpin_terminal: u8,
}

impl Default for Blynk {
    fn default() -> Self {
        Self {
            host: "https://blynk.cloud".to_string(),
            token: String::new(),
            vpin_led: 1,
            vpin_status: 2,
            vpin_terminal: 3,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Webhook {
    pub url: String,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Output {
    /// RGBA box color for the target label.
    pub target_color: [u8; 4],
    /// RGBA box color for every other label.
    pub other_color: [u8; 4],
    pub text_color: [u8; 4],
    pub line_thickness: u32,
    pub font_path: String,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            target_color: [255, 0, 0, 255],
            other_color: [0, 255, 0, 255],
            text_color: [255, 255, 255, 255],
            line_thickness: 2,
            font_path: "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_original_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.detection.target_label, "drowsy");
        assert_eq!(config.alert.debounce_seconds, 3.0);
        assert_eq!(config.store.log_file, "drowsiness_log.txt");
        assert_eq!(config.store.snapshot_dir, "snapshots");
        assert_eq!(config.alarm.led_pin, 17);
        assert_eq!(config.alarm.buzzer_pin, 25);
    }

    #[test]
    fn partial_toml_fills_missing_sections_with_defaults() {
        let raw = r#"
            [detection]
            target_label = "yawning"
            minimum_confidence = 40

            [alert]
            debounce_seconds = 1.5
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.detection.target_label, "yawning");
        assert_eq!(config.detection.minimum_confidence, 40);
        assert_eq!(config.alert.debounce_seconds, 1.5);
        // Untouched sections fall back to defaults.
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.camera.source, "/dev/video0");
    }

    #[test]
    fn telemetry_services_parse_from_names() {
        let raw = r#"
            [telemetry]
            services = ["Blynk", "Webhook"]

            [telemetry.blynk]
            token = "abc123"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.telemetry.services.len(), 2);
        assert_eq!(config.telemetry.blynk.token, "abc123");
        assert_eq!(config.telemetry.blynk.vpin_led, 1);
    }
}
