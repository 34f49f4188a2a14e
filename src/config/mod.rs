//! Configuration module for cloudrig.
//!
//! This module handles everything that happens before the first network call:
//! - Resolving credentials and region from explicit values, `.env` and the environment
//! - Normalizing parameters and option bags, applying defaults
//! - Loading `cloudrig.deploy.yaml` deployment files

mod credentials;
mod options;
mod parser;

pub use credentials::{
    AuthMode, CredentialOptions, EnvSource, ProcessEnv, ResolvedConnection, ENV_ACCESS_KEY_ID,
    ENV_DEFAULT_REGION, ENV_PROFILE, ENV_REGION, ENV_SECRET_ACCESS_KEY, ENV_SESSION_TOKEN,
};
pub use options::{
    parameters_from_map, parameters_from_pairs, parse_parameter_pairs, BulkOptions,
    DeploymentOptions, DestroyOptions, FailureAction, ObjectOptions, StackParameter,
    TemplateSource, DEFAULT_CAPABILITIES, DEFAULT_POLL_INTERVAL, DEFAULT_THROTTLE,
};
pub use parser::{find_config_file, ConfigParser, DeployFile, DeployFileOptions, DEFAULT_CONFIG_FILES};
