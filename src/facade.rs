//! Single entry point per credential set.
//!
//! [`Cloudrig`] resolves credentials once, loads one SDK configuration and
//! builds both engines from it.

use aws_config::SdkConfig;
use tracing::info;

use crate::config::{CredentialOptions, EnvSource, ResolvedConnection};
use crate::error::Result;
use crate::stack::{CloudFormationApi, StackApi, StackReconciler};
use crate::storage::{BulkObjectOperations, ObjectStorage, S3Storage};

/// Stack and object storage engines sharing one connection.
#[derive(Debug)]
pub struct Cloudrig<A: StackApi = CloudFormationApi, S: ObjectStorage = S3Storage> {
    /// Resolved connection descriptor.
    connection: ResolvedConnection,
    /// Stack reconciliation engine.
    stacks: StackReconciler<A>,
    /// Bulk object operations engine.
    storage: BulkObjectOperations<S>,
}

impl Cloudrig {
    /// Resolves credentials and builds both AWS-backed engines.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be resolved.
    pub async fn connect(options: &CredentialOptions, env: &impl EnvSource) -> Result<Self> {
        let connection = options.resolve(env)?;
        let config = connection.load_sdk_config().await;
        info!(
            "Connected ({:?}, region {})",
            connection.auth,
            connection.region.as_deref().unwrap_or("from provider chain")
        );
        Ok(Self::from_sdk_config(connection, &config))
    }

    /// Builds both AWS-backed engines from an already loaded configuration.
    #[must_use]
    pub fn from_sdk_config(connection: ResolvedConnection, config: &SdkConfig) -> Self {
        Self {
            connection,
            stacks: StackReconciler::new(CloudFormationApi::from_conf(config)),
            storage: BulkObjectOperations::new(S3Storage::from_conf(config)),
        }
    }
}

impl<A: StackApi, S: ObjectStorage> Cloudrig<A, S> {
    /// Assembles a facade from prebuilt engines.
    #[must_use]
    pub const fn from_parts(
        connection: ResolvedConnection,
        stacks: StackReconciler<A>,
        storage: BulkObjectOperations<S>,
    ) -> Self {
        Self {
            connection,
            stacks,
            storage,
        }
    }

    /// Gets the connection descriptor.
    #[must_use]
    pub const fn connection(&self) -> &ResolvedConnection {
        &self.connection
    }

    /// Gets the stack engine.
    #[must_use]
    pub const fn stacks(&self) -> &StackReconciler<A> {
        &self.stacks
    }

    /// Gets the object storage engine.
    #[must_use]
    pub const fn storage(&self) -> &BulkObjectOperations<S> {
        &self.storage
    }
}
