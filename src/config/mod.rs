mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BatterySettings, CommandSettings, FleetSettings, HubSettings, LoggingSettings, MqttSettings,
    PartialSettings, SensorSeed, ServerSettings, Settings, StorageSettings, VehicleSeed,
};

/// Loads the configuration from `config/default.*` and `SEANO__*` environment
/// variables, merged over the built-in defaults.
///
/// Nested keys use a double underscore, e.g. `SEANO__MQTT__HOST=broker.local`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("SEANO")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge(Settings::default());
    validate(&settings)?;

    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let battery = &settings.battery;
    if battery.voltage_full <= battery.voltage_empty {
        return Err(ConfigError::Message(format!(
            "battery.voltage_full ({}) must be greater than battery.voltage_empty ({})",
            battery.voltage_full, battery.voltage_empty
        )));
    }
    if settings.hub.client_buffer == 0 || settings.hub.command_buffer == 0 {
        return Err(ConfigError::Message(
            "hub buffers must be greater than zero".to_string(),
        ));
    }
    if settings.mqtt.topic_prefix.trim_matches('/').is_empty() {
        return Err(ConfigError::Message(
            "mqtt.topic_prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}
