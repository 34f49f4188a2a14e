// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cloudrig
//!
//! Change-set-safe `CloudFormation` stack deployment and pagination-aware
//! bulk S3 object operations.
//!
//! ## Overview
//!
//! Cloudrig is a client-side orchestration layer over two control planes:
//!
//! - Converge a named stack to a template and parameter set, reviewing every
//!   update as a change set before executing it
//! - Refuse updates that would replace protected resource types
//! - Poll to a terminal state within an optional millisecond budget
//! - Copy, move, delete and upload across whole prefixes, following
//!   truncated listings to completion under a per-call throttle
//!
//! ## Architecture
//!
//! Both pipelines follow "submit, then poll until terminal":
//!
//! 1. **Credentials**: explicit values, `.env` and the environment resolve
//!    into one connection descriptor
//! 2. **Engines**: [`stack::StackReconciler`] and
//!    [`storage::BulkObjectOperations`] talk to the control planes only
//!    through the [`stack::StackApi`] and [`storage::ObjectStorage`] seams
//! 3. **Facade**: [`facade::Cloudrig`] builds both engines from one SDK
//!    configuration
//!
//! ## Modules
//!
//! - [`config`]: Credentials, option normalization and deployment files
//! - [`stack`]: Stack reconciliation engine
//! - [`storage`]: Listing paginator and bulk object operations
//! - [`facade`]: One entry point per credential set
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! stack: my-stack
//! template: ./template.yaml
//! parameters:
//!   - { key: Env, value: prod }
//! options:
//!   timeout_ms: 1800000
//!   protected_resource_types: [AWS::RDS::DBInstance]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod facade;
pub mod stack;
pub mod storage;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, CredentialOptions, DeploymentOptions, EnvSource, ProcessEnv};
pub use error::{CloudrigError, Result};
pub use facade::Cloudrig;
pub use stack::{CloudFormationApi, DeploymentOutcome, DeploymentRequest, StackApi, StackReconciler};
pub use storage::{BulkObjectOperations, ObjectKeyRef, ObjectStorage, PrefixRef, S3Storage};
