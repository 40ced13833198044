//! Environment variable overrides.
//!
//! Applied after the file is parsed and before validation.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::schema::LogHubConfig;
use crate::config::validation::ValidationError;

pub const ENV_REMOTE: &str = "LOGHUB_REMOTE";
pub const ENV_TOKEN: &str = "LOGHUB_TOKEN";
pub const ENV_BUFFER_SIZE: &str = "LOGHUB_BUFFER_SIZE";
pub const ENV_DISABLE: &str = "LOGHUB_DISABLE";
pub const ENV_HOST: &str = "LOGHUB_HOST";
pub const ENV_DIR: &str = "LOGHUB_DIR";
pub const ENV_QUEUE_SIZE: &str = "LOGHUB_QUEUE_SIZE";

/// Apply overrides read through `lookup`. Unparseable values are reported,
/// not silently ignored.
pub fn apply_overrides<F>(config: &mut LogHubConfig, lookup: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(remote) = get(ENV_REMOTE) {
        config.remote = Some(remote);
    }
    if let Some(token) = get(ENV_TOKEN) {
        config.token = Some(token);
    }
    if let Some(host) = get(ENV_HOST) {
        config.election.host = host;
    }
    if let Some(dir) = get(ENV_DIR) {
        config.election.dir = PathBuf::from(dir);
    }
    if let Some(value) = get(ENV_DISABLE) {
        config.disabled = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(value) = get(ENV_BUFFER_SIZE) {
        match parse(&value) {
            Some(size) => config.hub.buffer_size = size,
            None => errors.push(ValidationError::new(ENV_BUFFER_SIZE, format!("not a count: {value:?}"))),
        }
    }
    if let Some(value) = get(ENV_QUEUE_SIZE) {
        match parse(&value) {
            Some(size) => config.forwarder.queue_capacity = size,
            None => errors.push(ValidationError::new(ENV_QUEUE_SIZE, format!("not a count: {value:?}"))),
        }
    }

    errors
}

fn parse<T: FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}
