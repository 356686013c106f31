//! Command execution.
//!
//! Commands that need no container (`matrix`) and argument lookups that can
//! fail early (an unknown `publish-aot` target) run before docker is touched.
//! Everything else connects to the daemon, then runs under the optional
//! `--deadline` and Ctrl-C cancellation.

mod managed;
mod matrix;
mod native;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::PipelineConfig;
use crate::docker::{ContainerLimits, DockerEngine};
use crate::error::{ConfigError, PipelineError, Result};
use crate::matrix::BuildMatrix;
use crate::native::FailurePolicy;
use crate::pipeline::Pipeline;
use crate::source::SourceTree;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Execute the parsed command, returning the process exit code.
///
/// Failures are reported here, with recovery suggestions, and become exit
/// code 1. Invalid arguments exit with 2.
pub async fn execute_command(args: Args) -> i32 {
    if let Err(validation_error) = args.validate() {
        let output = super::OutputManager::new(false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return 2;
    }

    let config = RuntimeConfig::from(&args);

    let result = if args.command.needs_engine() {
        execute_with_engine(&args, &config).await
    } else {
        match &args.command {
            Command::Matrix { os, json } => matrix::execute_matrix(*os, *json, &config),
            _ => Ok(0),
        }
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(e) => {
            report_error(&args.command, &e, &config);
            1
        }
    }
}

fn report_error(command: &Command, error: &PipelineError, config: &RuntimeConfig) {
    let output = config.output();
    output.error(&format!("Command '{}' failed: {}", command.name(), error));

    match error {
        PipelineError::Environment(e) => {
            if let Some(details) = e.diagnostic_output() {
                output.error_detail(&details);
            }
        }
        PipelineError::Aggregate { failures } => {
            for failure in failures {
                output.error_detail(&failure.to_string());
            }
        }
        _ => {}
    }

    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() {
        output.println_err("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            output.println_err(&format!("  • {}", suggestion));
        }
    }
}

/// Pipeline configuration with CLI overrides applied last
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(args.config.as_deref(), &args.source)?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Command::Native {
        continue_on_error: true,
        ..
    } = args.command
    {
        config.failure_policy = FailurePolicy::ContinueOnError;
    }
    config.validate()?;
    Ok(config)
}

fn container_limits(args: &Args, config: &PipelineConfig) -> Result<ContainerLimits> {
    let concurrency = match args.command {
        Command::Native { .. } => config.concurrency,
        _ => 1,
    };
    let detected = ContainerLimits::detect_safe_limits(concurrency);

    if args.docker_memory.is_none()
        && args.docker_memory_swap.is_none()
        && args.docker_cpus.is_none()
        && args.docker_pids_limit == detected.pids_limit
    {
        return Ok(detected);
    }

    let memory = args.docker_memory.clone().unwrap_or(detected.memory);
    let memory_swap = args.docker_memory_swap.clone().or_else(|| {
        // Detected swap only pairs with detected memory
        args.docker_memory.is_none().then_some(detected.memory_swap)
    });
    let cpus = args.docker_cpus.clone().or(Some(detected.cpus));

    ContainerLimits::from_cli(memory, memory_swap, cpus, args.docker_pids_limit)
        .map_err(|reason| ConfigError::Invalid { reason }.into())
}

async fn execute_with_engine(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    // Fail on an unknown target before requiring docker
    if let Command::PublishAot { target, .. } = &args.command {
        BuildMatrix::standard().lookup(target)?;
    }

    let pipeline_config = load_config(args)?;
    let source = SourceTree::open(&args.source)?;
    let limits = container_limits(args, &pipeline_config)?;

    log::debug!("container limits: {:?}", limits);
    let engine = DockerEngine::connect(
        limits,
        pipeline_config.volume_prefix.clone(),
        pipeline_config.scratch_dir.clone(),
    )
    .await?;

    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, cancelling");
                token.cancel();
            }
        })
    };

    let pipeline = Pipeline::new(engine, pipeline_config).with_cancellation(token.clone());
    let work = dispatch(&pipeline, &source, &args.command, config);
    tokio::pin!(work);

    let result = match args.deadline {
        Some(seconds) => match tokio::time::timeout(Duration::from_secs(seconds), &mut work).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("deadline of {}s reached, cancelling", seconds);
                // Let the cancelled work remove its containers before reporting.
                token.cancel();
                let _ = work.await;
                Err(PipelineError::DeadlineExceeded { seconds })
            }
        },
        None => work.await,
    };

    ctrl_c.abort();
    result
}

async fn dispatch(
    pipeline: &Pipeline<DockerEngine>,
    source: &SourceTree,
    command: &Command,
    config: &RuntimeConfig,
) -> Result<i32> {
    match command {
        Command::Build => managed::execute_build(pipeline, source, config).await,
        Command::Test { allow_failure } => {
            managed::execute_test(pipeline, source, *allow_failure, config).await
        }
        Command::VsTest => managed::execute_vs_test(pipeline, source, config).await,
        Command::Run { args } => managed::execute_run(pipeline, source, args, config).await,
        Command::Tool => managed::execute_tool(pipeline, source, config).await,
        Command::Publish => managed::execute_publish(pipeline, source, config).await,
        Command::SmokeTest { fixture } => {
            managed::execute_smoke_test(pipeline, source, fixture, config).await
        }
        Command::PublishAot { target, out } => {
            native::execute_publish_aot(pipeline, source, target, out, config).await
        }
        Command::Native { os, out, .. } => {
            native::execute_native(pipeline, source, *os, out, config).await
        }
        Command::Matrix { os, json } => matrix::execute_matrix(*os, *json, config),
    }
}
