use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{ConfigError, SecuritySchemeSpec};

/// A credential string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw credential. Only the auth binder should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Where an API key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

impl ApiKeyLocation {
    pub fn parse(location: &str) -> Option<Self> {
        match location.to_ascii_lowercase().as_str() {
            "header" => Some(Self::Header),
            "query" => Some(Self::Query),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
        }
    }
}

/// Credentials for HTTP basic authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicCredentials {
    /// Separate username and password
    UsernamePassword {
        username: String,
        password: SecretString,
    },
    /// A single value: either `user:pass` or an already base64-encoded token
    Value(SecretString),
    /// Required but not supplied yet
    Missing,
}

/// Authentication configuration for one API.
///
/// A `None` value (or [`BasicCredentials::Missing`]) means the scheme is known
/// but the credential has not been supplied; binding such a config fails.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawAuthConfig")]
pub enum AuthConfig {
    ApiKey {
        location: ApiKeyLocation,
        name: String,
        value: Option<SecretString>,
    },
    HttpBearer {
        value: Option<SecretString>,
    },
    HttpBasic(BasicCredentials),
    /// Pre-obtained bearer token. Client credentials are accepted but unused.
    OAuth2 {
        value: Option<SecretString>,
        client_id: Option<String>,
        client_secret: Option<SecretString>,
    },
}

impl AuthConfig {
    /// API key sent as a header.
    pub fn api_key_header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ApiKey {
            location: ApiKeyLocation::Header,
            name: name.into(),
            value: Some(SecretString::new(value)),
        }
    }

    /// API key sent as a query parameter.
    pub fn api_key_query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ApiKey {
            location: ApiKeyLocation::Query,
            name: name.into(),
            value: Some(SecretString::new(value)),
        }
    }

    pub fn bearer(value: impl Into<String>) -> Self {
        Self::HttpBearer {
            value: Some(SecretString::new(value)),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::HttpBasic(BasicCredentials::UsernamePassword {
            username: username.into(),
            password: SecretString::new(password),
        })
    }

    pub fn basic_value(value: impl Into<String>) -> Self {
        Self::HttpBasic(BasicCredentials::Value(SecretString::new(value)))
    }

    pub fn oauth2(value: impl Into<String>) -> Self {
        Self::OAuth2 {
            value: Some(SecretString::new(value)),
            client_id: None,
            client_secret: None,
        }
    }

    /// The OpenAPI security scheme type this config satisfies.
    pub fn scheme_type(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "apiKey",
            Self::HttpBearer { .. } | Self::HttpBasic(_) => "http",
            Self::OAuth2 { .. } => "oauth2",
        }
    }

    /// The HTTP auth scheme, for `http` configs.
    pub fn http_scheme(&self) -> Option<&'static str> {
        match self {
            Self::HttpBearer { .. } => Some("bearer"),
            Self::HttpBasic(_) => Some("basic"),
            _ => None,
        }
    }
}

/// Authentication as written in configuration files.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RawAuthConfig {
    /// `apiKey`, `http` or `oauth2`
    #[serde(rename = "type")]
    pub auth_type: String,
    /// `header` or `query`, for `apiKey`
    #[serde(rename = "in", alias = "in_field", default)]
    pub location: Option<String>,
    /// Header or query parameter name, for `apiKey`
    #[serde(default)]
    pub name: Option<String>,
    /// `bearer` or `basic`, for `http`
    #[serde(default)]
    pub scheme: Option<String>,
    /// The credential itself
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::new)
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        match raw.auth_type.to_ascii_lowercase().as_str() {
            "apikey" => {
                let location = raw
                    .location
                    .as_deref()
                    .and_then(ApiKeyLocation::parse)
                    .ok_or_else(|| {
                        ConfigError::InvalidAuth(format!(
                            "apiKey location must be 'header' or 'query', got {:?}",
                            raw.location
                        ))
                    })?;
                let name = raw.name.filter(|n| !n.is_empty()).ok_or_else(|| {
                    ConfigError::InvalidAuth("apiKey requires a 'name'".to_string())
                })?;
                Ok(Self::ApiKey {
                    location,
                    name,
                    value: secret(raw.value),
                })
            }
            "http" => match raw.scheme.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("bearer") => Ok(Self::HttpBearer {
                    value: secret(raw.value),
                }),
                Some("basic") => {
                    let password = secret(raw.password);
                    let credentials = match (raw.username, password, secret(raw.value)) {
                        (Some(username), Some(password), _) if !username.is_empty() => {
                            BasicCredentials::UsernamePassword { username, password }
                        }
                        (_, _, Some(value)) => BasicCredentials::Value(value),
                        _ => BasicCredentials::Missing,
                    };
                    Ok(Self::HttpBasic(credentials))
                }
                other => Err(ConfigError::InvalidAuth(format!(
                    "unsupported HTTP auth scheme {:?}",
                    other
                ))),
            },
            "oauth2" => Ok(Self::OAuth2 {
                value: secret(raw.value),
                client_id: raw.client_id.filter(|c| !c.is_empty()),
                client_secret: secret(raw.client_secret),
            }),
            other => Err(ConfigError::InvalidAuth(format!(
                "unsupported authentication type '{}'",
                other
            ))),
        }
    }
}

/// Checks the configured authentication against the API's first global
/// security requirement.
pub fn validate_security(
    auth: Option<&AuthConfig>,
    schemes: &BTreeMap<String, SecuritySchemeSpec>,
    requirements: &[BTreeMap<String, Vec<String>>],
) -> Result<(), ConfigError> {
    let Some(scheme_name) = requirements.first().and_then(|req| req.keys().next()) else {
        return Ok(());
    };
    let Some(scheme) = schemes.get(scheme_name) else {
        return Ok(());
    };
    let required_type = scheme.scheme_type.to_ascii_lowercase();

    let Some(auth) = auth else {
        let message = match required_type.as_str() {
            "apikey" => format!(
                "API requires apiKey authentication with key '{}' in {}, \
                 but no authentication config was provided",
                scheme.name.as_deref().unwrap_or_default(),
                scheme.location.as_deref().unwrap_or_default()
            ),
            "http" => format!(
                "API requires HTTP {} authentication, but no authentication config was provided",
                scheme.scheme.as_deref().unwrap_or_default()
            ),
            other => format!(
                "API requires '{}' authentication, but no authentication config was provided",
                other
            ),
        };
        return Err(ConfigError::MissingCredential(message));
    };

    match (required_type.as_str(), auth) {
        ("apikey", AuthConfig::ApiKey { location, name, .. }) => {
            let expected_name = scheme.name.as_deref().unwrap_or_default();
            let expected_location = scheme.location.as_deref().and_then(ApiKeyLocation::parse);
            if name != expected_name || expected_location != Some(*location) {
                return Err(ConfigError::AuthMismatch(format!(
                    "API requires apiKey '{}' in {}, but config specified '{}' in {}",
                    expected_name,
                    scheme.location.as_deref().unwrap_or_default(),
                    name,
                    location.as_str()
                )));
            }
            Ok(())
        }
        ("http", AuthConfig::HttpBearer { .. } | AuthConfig::HttpBasic(_)) => {
            let expected = scheme.scheme.as_deref().unwrap_or_default().to_ascii_lowercase();
            let configured = auth.http_scheme().unwrap_or_default();
            if expected != configured {
                return Err(ConfigError::AuthMismatch(format!(
                    "API requires HTTP {} authentication, but config specified HTTP {}",
                    expected, configured
                )));
            }
            Ok(())
        }
        ("oauth2", AuthConfig::OAuth2 { .. } | AuthConfig::HttpBearer { .. }) => Ok(()),
        ("apikey" | "http" | "oauth2", other) => Err(ConfigError::AuthMismatch(format!(
            "API requires {} authentication but config provided {}",
            scheme.scheme_type,
            other.scheme_type()
        ))),
        _ => Ok(()),
    }
}
