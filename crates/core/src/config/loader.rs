use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Well-known credential variables mapped onto their config keys.
const CREDENTIAL_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "providers.text.api_key"),
    ("VOICE_API_KEY", "providers.voice.api_key"),
    ("VIDEO_API_KEY", "providers.video.api_key"),
];

/// Load configuration from file with environment variable overrides.
///
/// `AURORA_SECTION__KEY` overrides any key (double underscore separates
/// nesting levels). The bare provider credential variables listed in
/// [`CREDENTIAL_ENV`] are honored as well.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let mut figment = Figment::new().merge(Toml::file(path));

    for (var, key) in CREDENTIAL_ENV {
        let key: &'static str = key;
        figment = figment.merge(Env::raw().only(&[*var]).map(move |_| key.into()));
    }

    let config: Config = figment
        .merge(Env::prefixed("AURORA_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
