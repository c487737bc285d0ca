mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, DtoSettings, LatencySettings, LoggingSettings, SampleSettings, Scenario,
    Settings,
};

/// Prefix of the environment variables that override configuration,
/// e.g. `TOPICRELAY__BROKER__MAX_SESSIONS=8`.
pub const ENV_PREFIX: &str = "TOPICRELAY";

/// Loads the configuration from `config/default` and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`], reading the file layer from `path` (extension
/// optional). A missing file is not an error.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}
