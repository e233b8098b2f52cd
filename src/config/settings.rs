use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub mqtt: MqttSettings,
    pub hub: HubSettings,
    pub command: CommandSettings,
    pub battery: BatterySettings,
    pub storage: StorageSettings,
    pub fleet: FleetSettings,
}

/// Address the dashboard WebSocket server binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Connection parameters for the shared MQTT connection.
///
/// An empty `host` means no broker is configured and the server runs in
/// degraded mode.
#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
}

impl MqttSettings {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// Broadcast hub sizing.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    /// Capacity of each session's outbound queue.
    pub client_buffer: usize,
    /// Capacity of the coordinator's command channel.
    pub command_buffer: usize,
    /// How long a listener may wait to hand an event to the hub.
    pub submit_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandSettings {
    pub ack_timeout_secs: u64,
    pub broker_op_timeout_secs: u64,
}

/// Voltage range used to derive a battery percentage when a vehicle only
/// reports its voltage.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct BatterySettings {
    pub voltage_empty: f64,
    pub voltage_full: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub path: String,
    pub max_records_per_tree: Option<usize>,
}

/// Vehicles and sensors seeded into the directory on startup.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FleetSettings {
    #[serde(default)]
    pub vehicles: Vec<VehicleSeed>,
    #[serde(default)]
    pub sensors: Vec<SensorSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VehicleSeed {
    pub id: u64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorSeed {
    pub id: u64,
    pub code: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub sensor_type: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub logging: Option<PartialLoggingSettings>,
    pub mqtt: Option<PartialMqttSettings>,
    pub hub: Option<PartialHubSettings>,
    pub command: Option<PartialCommandSettings>,
    pub battery: Option<PartialBatterySettings>,
    pub storage: Option<PartialStorageSettings>,
    pub fleet: Option<FleetSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMqttSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHubSettings {
    pub client_buffer: Option<usize>,
    pub command_buffer: Option<usize>,
    pub submit_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialCommandSettings {
    pub ack_timeout_secs: Option<u64>,
    pub broker_op_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBatterySettings {
    pub voltage_empty: Option<f64>,
    pub voltage_full: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
    pub max_records_per_tree: Option<usize>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = match self.server {
            Some(s) => ServerSettings {
                host: s.host.unwrap_or(default.server.host),
                port: s.port.unwrap_or(default.server.port),
            },
            None => default.server,
        };

        let logging = match self.logging {
            Some(l) => LoggingSettings {
                level: l.level.unwrap_or(default.logging.level),
            },
            None => default.logging,
        };

        let mqtt = match self.mqtt {
            Some(m) => MqttSettings {
                host: m.host.unwrap_or(default.mqtt.host),
                port: m.port.unwrap_or(default.mqtt.port),
                client_id: m.client_id.unwrap_or(default.mqtt.client_id),
                username: m.username.or(default.mqtt.username),
                password: m.password.or(default.mqtt.password),
                topic_prefix: m.topic_prefix.unwrap_or(default.mqtt.topic_prefix),
                keep_alive_secs: m.keep_alive_secs.unwrap_or(default.mqtt.keep_alive_secs),
                initial_backoff_ms: m
                    .initial_backoff_ms
                    .unwrap_or(default.mqtt.initial_backoff_ms),
                max_backoff_secs: m.max_backoff_secs.unwrap_or(default.mqtt.max_backoff_secs),
            },
            None => default.mqtt,
        };

        let hub = match self.hub {
            Some(h) => HubSettings {
                client_buffer: h.client_buffer.unwrap_or(default.hub.client_buffer),
                command_buffer: h.command_buffer.unwrap_or(default.hub.command_buffer),
                submit_timeout_ms: h.submit_timeout_ms.unwrap_or(default.hub.submit_timeout_ms),
            },
            None => default.hub,
        };

        let command = match self.command {
            Some(c) => CommandSettings {
                ack_timeout_secs: c.ack_timeout_secs.unwrap_or(default.command.ack_timeout_secs),
                broker_op_timeout_secs: c
                    .broker_op_timeout_secs
                    .unwrap_or(default.command.broker_op_timeout_secs),
            },
            None => default.command,
        };

        let battery = match self.battery {
            Some(b) => BatterySettings {
                voltage_empty: b.voltage_empty.unwrap_or(default.battery.voltage_empty),
                voltage_full: b.voltage_full.unwrap_or(default.battery.voltage_full),
            },
            None => default.battery,
        };

        let storage = match self.storage {
            Some(s) => StorageSettings {
                path: s.path.unwrap_or(default.storage.path),
                max_records_per_tree: s
                    .max_records_per_tree
                    .or(default.storage.max_records_per_tree),
            },
            None => default.storage,
        };

        Settings {
            server,
            logging,
            mqtt,
            hub,
            command,
            battery,
            storage,
            fleet: self.fleet.unwrap_or(default.fleet),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
            mqtt: MqttSettings {
                host: String::new(),
                port: 1883,
                client_id: "seanolink".to_string(),
                username: None,
                password: None,
                topic_prefix: "seano".to_string(),
                keep_alive_secs: 30,
                initial_backoff_ms: 1000,
                max_backoff_secs: 60,
            },
            hub: HubSettings {
                client_buffer: 256,
                command_buffer: 1024,
                submit_timeout_ms: 250,
            },
            command: CommandSettings {
                ack_timeout_secs: 8,
                broker_op_timeout_secs: 3,
            },
            battery: BatterySettings {
                voltage_empty: 11.0,
                voltage_full: 12.6,
            },
            storage: StorageSettings {
                path: "seanolink_db".to_string(),
                max_records_per_tree: None,
            },
            fleet: FleetSettings::default(),
        }
    }
}
