//! Small accessors over the schema-free configuration JSON (§6: "unknown
//! keys are allowed and preserved but not consulted by the builder").
//! Shared by [`super::provision`] and [`super::monitor`] so both read the
//! same conventions for the same keys.

use std::net::IpAddr;

use serde_json::Value;

use crate::errors::ProvisionerError;

pub fn require_str<'a>(configuration: &'a Value, key: &str) -> Result<&'a str, ProvisionerError> {
    configuration.get(key).and_then(Value::as_str).ok_or_else(|| ProvisionerError::PrecondFail(format!("configuration is missing '{key}'")))
}

pub fn bool_or(configuration: &Value, key: &str, default: bool) -> bool {
    configuration.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn str_list(configuration: &Value, key: &str) -> Vec<String> {
    configuration
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

pub fn require_ip(configuration: &Value, key: &str) -> Result<IpAddr, ProvisionerError> {
    let raw = require_str(configuration, key)?;
    raw.parse().map_err(|_| ProvisionerError::PrecondFail(format!("configuration key '{key}' is not a valid IP address")))
}

pub fn ip_list(configuration: &Value, key: &str) -> Vec<IpAddr> {
    str_list(configuration, key).iter().filter_map(|s| s.parse().ok()).collect()
}
