//! Authentication: credential configuration and request binding.

pub mod binder;
pub mod credentials;

pub use binder::AuthBinder;
pub use credentials::{
    validate_security, ApiKeyLocation, AuthConfig, BasicCredentials, RawAuthConfig, SecretString,
};
