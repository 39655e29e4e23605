//! Provider configuration from the process environment
//!
//! Every value can be given directly (`CLOUDFLARE_API_TOKEN=...`) or through a
//! file (`CLOUDFLARE_API_TOKEN_FILE=/run/secrets/token`). The direct value wins.
//! Credentials are base64 encoded, matching how they are stored in Secrets.

use std::fmt;
use std::fs;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cfccm_common::annotations::parse_bool;
use cfccm_common::{Error, Result};

/// API token variable
pub const API_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// Zone id variable
pub const ZONE_ID_ENV: &str = "CLOUDFLARE_ZONE_ID";

/// Account id variable
pub const ACCOUNT_ID_ENV: &str = "CLOUDFLARE_ACCOUNT_ID";

/// Debug logging toggle
pub const DEBUG_ENV: &str = "DEBUG";

/// Suffix selecting the file-based variant of a variable
pub const FILE_SUFFIX: &str = "_FILE";

/// Raw (still base64 encoded) configuration as read from the environment
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Encoded API token
    pub api_token: String,
    /// Encoded zone id
    pub zone_id: String,
    /// Encoded account id
    pub account_id: String,
    /// Verbose logging requested
    pub debug: bool,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .field("account_id", &self.account_id)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Decoded credentials ready for client construction
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token
    pub api_token: String,
    /// Zone holding the load balancers
    pub zone_id: String,
    /// Account holding monitors and pools
    pub account_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .field("account_id", &self.account_id)
            .finish()
    }
}

impl ProviderConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, collecting every problem found
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        let api_token = read_value(&lookup, API_TOKEN_ENV, &mut problems);
        let zone_id = read_value(&lookup, ZONE_ID_ENV, &mut problems);
        let account_id = read_value(&lookup, ACCOUNT_ID_ENV, &mut problems);

        let debug = match lookup(DEBUG_ENV) {
            None => false,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                problems.push(format!("failed to parse {DEBUG_ENV}: invalid boolean {raw:?}"));
                false
            }),
        };

        if !problems.is_empty() {
            return Err(Error::config(problems.join("; ")));
        }

        Ok(Self {
            api_token,
            zone_id,
            account_id,
            debug,
        })
    }

    /// Check that every required value is present
    pub fn validate(&self) -> Result<()> {
        let problems: Vec<String> = [
            (API_TOKEN_ENV, &self.api_token),
            (ZONE_ID_ENV, &self.zone_id),
            (ACCOUNT_ID_ENV, &self.account_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| format!("environment variable {name:?} is required"))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }

    /// Base64-decode the credentials
    pub fn decode(&self) -> Result<Credentials> {
        let mut problems = Vec::new();

        let api_token = decode_value(API_TOKEN_ENV, &self.api_token, &mut problems);
        let zone_id = decode_value(ZONE_ID_ENV, &self.zone_id, &mut problems);
        let account_id = decode_value(ACCOUNT_ID_ENV, &self.account_id, &mut problems);

        if !problems.is_empty() {
            return Err(Error::config(problems.join("; ")));
        }

        Ok(Credentials {
            api_token,
            zone_id,
            account_id,
        })
    }
}

fn read_value<F>(lookup: &F, name: &str, problems: &mut Vec<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(name) {
        return value;
    }

    let file_var = format!("{name}{FILE_SUFFIX}");
    let Some(path) = lookup(&file_var) else {
        return String::new();
    };

    match fs::read_to_string(&path) {
        Ok(contents) => contents.trim().to_string(),
        Err(e) => {
            problems.push(format!("failed to read {file_var} ({path}): {e}"));
            String::new()
        }
    }
}

fn decode_value(name: &str, encoded: &str, problems: &mut Vec<String>) -> String {
    let decoded = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            problems.push(format!("{name} is not valid base64: {e}"));
            return String::new();
        }
    };

    match String::from_utf8(decoded) {
        Ok(value) => value.trim().to_string(),
        Err(_) => {
            problems.push(format!("{name} does not decode to UTF-8"));
            String::new()
        }
    }
}
