//! Cloudrig CLI entrypoint.
//!
//! This is the main entrypoint for the cloudrig command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cloudrig::cli::{BulkArgs, Cli, Commands, DeployArgs, OutputFormatter, S3Uri, TransferArgs};
use cloudrig::config::{
    find_config_file, parse_parameter_pairs, ConfigParser, CredentialOptions, DestroyOptions,
    ProcessEnv, TemplateSource,
};
use cloudrig::error::{CloudrigError, Result};
use cloudrig::facade::Cloudrig;
use cloudrig::stack::DeploymentRequest;
use cloudrig::storage::{join_prefix, ObjectKeyRef};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable that turns on debug logging.
const DEBUG_ENV: &str = "CLOUDRIG_DEBUG";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let formatter = OutputFormatter::new(cli.output);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, &formatter)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", formatter.format_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins; otherwise `--verbose` or `CLOUDRIG_DEBUG=true` selects debug.
fn init_logging(verbose: bool) {
    let debug_env = std::env::var(DEBUG_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    let level = if verbose || debug_env { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    let env = ProcessEnv::with_dotenv(&cli.env_file)?;
    let credentials = CredentialOptions {
        region: cli.region.clone(),
        profile: cli.profile.clone(),
        ..Default::default()
    };

    // Deployment input is validated before any connection is made
    let request = match &cli.command {
        Commands::Deploy(args) => Some(build_request(cli.config.as_ref(), args)?),
        _ => None,
    };

    let cloudrig = Cloudrig::connect(&credentials, &env).await?;
    let stacks = cloudrig.stacks();
    let storage = cloudrig.storage();

    let output = match cli.command {
        Commands::Deploy(_) => {
            let request =
                request.ok_or_else(|| CloudrigError::internal("deploy request missing"))?;
            formatter.format_outcome(&stacks.deploy(&request).await?)
        }
        Commands::Destroy {
            stack,
            no_wait,
            timeout_ms,
        } => {
            let options = DestroyOptions {
                wait_for_completion: !no_wait,
                timeout_ms,
            };
            formatter.format_outcome(&stacks.destroy(&stack, &options).await?)
        }
        Commands::Exists { stack } => formatter.format_exists(&stack, stacks.exists(&stack).await?),
        Commands::Status { stack } => formatter.format_snapshot(&stacks.describe(&stack).await?),
        Commands::Protect { stack, disable } => {
            formatter.format_ack(&stacks.change_termination_protection(&stack, !disable).await?)
        }
        Commands::Outputs { stack } => formatter.format_outputs(&stacks.get_outputs(&stack).await?),
        Commands::Params { stack } => {
            formatter.format_parameters(&stacks.get_parameters(&stack).await?)
        }
        Commands::Buckets => formatter.format_buckets(&storage.list_buckets().await?),
        Commands::Ls { location } => {
            formatter.format_objects(&storage.list_bucket(&location.prefix()).await?)
        }
        Commands::Cp(args) => cmd_transfer(&cloudrig, args, false, formatter).await?,
        Commands::Mv(args) => cmd_transfer(&cloudrig, args, true, formatter).await?,
        Commands::Rm {
            target,
            recursive,
            version_id,
            bulk,
        } => cmd_remove(&cloudrig, &target, recursive, version_id, &bulk, formatter).await?,
        Commands::Upload {
            source,
            destination,
            recursive,
            bulk,
            object,
        } => {
            let object_options = object.to_options();
            if recursive {
                let receipts = storage
                    .upload_directory(
                        &source,
                        &destination.prefix(),
                        &bulk.to_options(),
                        &object_options,
                    )
                    .await?;
                formatter.format_uploads(&receipts)
            } else {
                let target = upload_target(&source, &destination);
                let receipt = storage.upload_file(&target, &source, &object_options).await?;
                formatter.format_uploads(&[receipt])
            }
        }
        Commands::Download {
            source,
            destination,
        } => {
            let written = storage.download_object(&source.object(), &destination).await?;
            formatter.format_message(&format!(
                "Downloaded s3://{}/{} ({written} bytes)",
                source.bucket, source.key
            ))
        }
    };

    emit(&output)
}

/// Builds the deployment request from the command line, the deployment file, or both.
fn build_request(config_path: Option<&PathBuf>, args: &DeployArgs) -> Result<DeploymentRequest> {
    let mut request = if args.is_self_contained() && config_path.is_none() {
        let template = TemplateSource::from_parts(args.template.clone(), args.template_url.clone())?;
        DeploymentRequest::new(args.stack.clone().unwrap_or_default(), template)
    } else {
        let path = config_path.map_or_else(|| find_config_file("."), |p| Ok(p.clone()))?;
        debug!("Loading deployment from: {}", path.display());
        let mut request = ConfigParser::new().load_file(&path)?;
        if args.template.is_some() || args.template_url.is_some() {
            request.template =
                TemplateSource::from_parts(args.template.clone(), args.template_url.clone())?;
        }
        request
    };

    if let Some(stack) = &args.stack {
        request.stack_name.clone_from(stack);
    }
    request
        .parameters
        .extend(parse_parameter_pairs(&args.params)?);

    let options = &mut request.options;
    options.protected_resource_types.extend(args.protect.iter().cloned());
    options.notification_targets.extend(args.notify.iter().cloned());
    if let Some(action) = args.on_failure {
        options.failure_action = action;
    }
    if args.termination_protection {
        options.termination_protection_on_create = true;
    }
    if args.no_wait {
        options.wait_for_completion = false;
    }
    if args.timeout_ms.is_some() {
        options.timeout_ms = args.timeout_ms;
    }

    request.validate()?;
    info!("Deploying stack {} from {}", request.stack_name, request.template.label());
    Ok(request)
}

/// Copy or move one object or a whole prefix.
async fn cmd_transfer(
    cloudrig: &Cloudrig,
    args: TransferArgs,
    is_move: bool,
    formatter: &OutputFormatter,
) -> Result<String> {
    let storage = cloudrig.storage();
    let object_options = args.object.to_options();
    let verb = if is_move { "Moved" } else { "Copied" };
    let location = format!(
        "s3://{}/{} -> s3://{}/{}",
        args.source.bucket, args.source.key, args.destination.bucket, args.destination.key
    );

    if args.recursive {
        let (source, destination, options) =
            (args.source.prefix(), args.destination.prefix(), args.bulk.to_options());
        let count = if is_move {
            storage.move_prefix(&source, &destination, &options, &object_options).await?
        } else {
            storage.copy_prefix(&source, &destination, &options, &object_options).await?
        };
        return Ok(formatter.format_count(verb, &location, count));
    }

    let (source, destination) = (args.source.object(), args.destination.object());
    if is_move {
        storage.move_object(&source, &destination, &object_options).await?;
    } else {
        storage.copy_object(&source, &destination, &object_options).await?;
    }
    Ok(formatter.format_count(verb, &location, 1))
}

/// Delete one object or every version under a prefix.
async fn cmd_remove(
    cloudrig: &Cloudrig,
    target: &S3Uri,
    recursive: bool,
    version_id: Option<String>,
    bulk: &BulkArgs,
    formatter: &OutputFormatter,
) -> Result<String> {
    let location = format!("s3://{}/{}", target.bucket, target.key);

    if recursive {
        let count = cloudrig
            .storage()
            .delete_prefix(&target.prefix(), &bulk.to_options())
            .await?;
        return Ok(formatter.format_count("Deleted", &location, count));
    }

    cloudrig
        .storage()
        .delete_object(&target.object().with_version(version_id))
        .await?;
    Ok(formatter.format_count("Deleted", &location, 1))
}

/// Uploading to a prefix (`s3://bucket/dir/`) appends the file name.
fn upload_target(source: &Path, destination: &S3Uri) -> ObjectKeyRef {
    if destination.key.is_empty() || destination.key.ends_with('/') {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ObjectKeyRef::new(
            &destination.bucket,
            join_prefix(&destination.key, &name),
        )
    } else {
        destination.object()
    }
}
