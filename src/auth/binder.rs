use base64::Engine;
use std::collections::BTreeMap;
use tracing::warn;

use super::credentials::{ApiKeyLocation, AuthConfig, BasicCredentials, SecretString};
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq)]
enum Placement {
    Header { name: String, value: SecretString },
    Query { name: String, value: SecretString },
}

/// Applies a resolved credential to outgoing requests.
///
/// All encoding happens once, in [`AuthBinder::new`]; a binder that was built
/// successfully always has a credential to apply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthBinder {
    placement: Option<Placement>,
}

fn required(value: &Option<SecretString>, what: &str) -> Result<SecretString, ConfigError> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(format!("{} value is not configured", what)))
}

fn encode_basic(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password))
}

impl AuthBinder {
    /// A binder that adds nothing, for unauthenticated APIs.
    pub fn none() -> Self {
        Self::default()
    }

    /// Resolves `config` into a concrete header or query placement.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        let placement = match config {
            AuthConfig::ApiKey {
                location,
                name,
                value,
            } => {
                let value = required(value, "apiKey")?;
                match location {
                    ApiKeyLocation::Header => Placement::Header {
                        name: name.clone(),
                        value,
                    },
                    ApiKeyLocation::Query => Placement::Query {
                        name: name.clone(),
                        value,
                    },
                }
            }
            AuthConfig::HttpBearer { value } => {
                let token = required(value, "HTTP bearer")?;
                Placement::Header {
                    name: "Authorization".to_string(),
                    value: SecretString::new(format!("Bearer {}", token.expose())),
                }
            }
            AuthConfig::HttpBasic(credentials) => {
                let encoded = match credentials {
                    BasicCredentials::UsernamePassword { username, password } => {
                        encode_basic(username, password.expose())
                    }
                    BasicCredentials::Value(value) if value.is_empty() => {
                        return Err(ConfigError::MissingCredential(
                            "HTTP basic value is not configured".to_string(),
                        ));
                    }
                    BasicCredentials::Value(value) => match value.expose().split_once(':') {
                        Some((username, password)) => encode_basic(username, password),
                        None => value.expose().to_string(),
                    },
                    BasicCredentials::Missing => {
                        return Err(ConfigError::MissingCredential(
                            "HTTP basic credentials are not configured".to_string(),
                        ));
                    }
                };
                Placement::Header {
                    name: "Authorization".to_string(),
                    value: SecretString::new(format!("Basic {}", encoded)),
                }
            }
            AuthConfig::OAuth2 {
                value,
                client_id,
                client_secret,
            } => {
                if client_id.is_some() || client_secret.is_some() {
                    warn!(
                        "OAuth2 client credentials are configured but token exchange \
                         is not supported; using the configured access token as-is"
                    );
                }
                let token = required(value, "OAuth2 access token")?;
                Placement::Header {
                    name: "Authorization".to_string(),
                    value: SecretString::new(format!("Bearer {}", token.expose())),
                }
            }
        };

        Ok(Self {
            placement: Some(placement),
        })
    }

    /// Adds the credential to the request's header or query bucket. Header
    /// names compare case-insensitively, so the credential replaces any
    /// caller-supplied header of the same name.
    pub fn apply(
        &self,
        headers: &mut BTreeMap<String, String>,
        query: &mut BTreeMap<String, String>,
    ) {
        match &self.placement {
            Some(Placement::Header { name, value }) => {
                headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
                headers.insert(name.clone(), value.expose().to_string());
            }
            Some(Placement::Query { name, value }) => {
                query.insert(name.clone(), value.expose().to_string());
            }
            None => {}
        }
    }

    /// The query parameter this binder adds, if it uses one.
    pub fn query_param(&self) -> Option<(&str, &str)> {
        match &self.placement {
            Some(Placement::Query { name, value }) => Some((name.as_str(), value.expose())),
            _ => None,
        }
    }
}
