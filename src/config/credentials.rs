//! Credential and region resolution.
//!
//! Explicit values win over environment variables. A named profile and a
//! static key pair are mutually exclusive: when a profile resolves, the keys
//! are ignored. Reading the process environment is confined to [`ProcessEnv`].

use std::collections::HashMap;
use std::path::Path;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

/// Environment variable names consulted during resolution.
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret access key variable.
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Session token variable.
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
/// Region variable.
pub const ENV_REGION: &str = "AWS_REGION";
/// Fallback region variable.
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
/// Profile variable.
pub const ENV_PROFILE: &str = "AWS_PROFILE";

const PROVIDER_NAME: &str = "cloudrig";

/// Source of environment variables.
pub trait EnvSource {
    /// Returns the value of a variable, if set and non-empty.
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl ProcessEnv {
    /// Loads a `.env` file (if present) into the process environment first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn with_dotenv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("Loading environment from: {}", path.display());
            dotenvy::from_path(path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", path.display());
        }
        Ok(Self)
    }
}

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

/// Caller-supplied connection values. Unset fields fall back to the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOptions {
    /// Static access key id.
    pub access_key_id: Option<String>,
    /// Static secret access key.
    pub secret_access_key: Option<String>,
    /// Optional session token for temporary keys.
    pub session_token: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// Named profile.
    pub profile: Option<String>,
}

/// How the connection authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Named profile from the shared config files.
    Profile(String),
    /// Static key pair.
    StaticKeys {
        /// Access key id.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Session token.
        session_token: Option<String>,
    },
    /// The SDK's default provider chain.
    DefaultChain,
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
            Self::StaticKeys { access_key_id, .. } => f
                .debug_struct("StaticKeys")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish_non_exhaustive(),
            Self::DefaultChain => f.write_str("DefaultChain"),
        }
    }
}

/// The single connection descriptor both engines are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    /// Region, if one resolved.
    pub region: Option<String>,
    /// Authentication mode.
    pub auth: AuthMode,
}

fn pick(explicit: Option<&String>, env: &impl EnvSource, names: &[&str]) -> Option<String> {
    explicit
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .or_else(|| names.iter().find_map(|n| env.var(n)))
}

impl CredentialOptions {
    /// Merges explicit options with the environment into one descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if only one half of a static key pair is available.
    pub fn resolve(&self, env: &impl EnvSource) -> Result<ResolvedConnection> {
        let region = pick(self.region.as_ref(), env, &[ENV_REGION, ENV_DEFAULT_REGION]);
        let profile = pick(self.profile.as_ref(), env, &[ENV_PROFILE]);

        if let Some(profile) = profile {
            debug!("Using profile-based credentials: {profile}");
            return Ok(ResolvedConnection {
                region,
                auth: AuthMode::Profile(profile),
            });
        }

        let access_key_id = pick(self.access_key_id.as_ref(), env, &[ENV_ACCESS_KEY_ID]);
        let secret_access_key =
            pick(self.secret_access_key.as_ref(), env, &[ENV_SECRET_ACCESS_KEY]);

        let auth = match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                debug!("Using key-based credentials for {access_key_id}");
                AuthMode::StaticKeys {
                    access_key_id,
                    secret_access_key,
                    session_token: pick(self.session_token.as_ref(), env, &[ENV_SESSION_TOKEN]),
                }
            }
            (Some(_), None) => {
                return Err(ConfigError::IncompleteCredentials {
                    missing: String::from(ENV_SECRET_ACCESS_KEY),
                }
                .into());
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteCredentials {
                    missing: String::from(ENV_ACCESS_KEY_ID),
                }
                .into());
            }
            (None, None) => {
                debug!("No explicit credentials, using the default provider chain");
                AuthMode::DefaultChain
            }
        };

        Ok(ResolvedConnection { region, auth })
    }
}

impl ResolvedConnection {
    /// Builds the shared SDK configuration for this descriptor.
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }

        loader = match &self.auth {
            AuthMode::Profile(name) => loader.profile_name(name),
            AuthMode::StaticKeys {
                access_key_id,
                secret_access_key,
                session_token,
            } => loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                session_token.clone(),
                None,
                PROVIDER_NAME,
            )),
            AuthMode::DefaultChain => loader,
        };

        loader.load().await
    }
}
