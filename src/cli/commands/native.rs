//! Native ahead-of-time builds: one target, or every target of an OS family.

use crate::cli::RuntimeConfig;
use crate::docker::DockerEngine;
use crate::error::Result;
use crate::matrix::OperatingSystem;
use crate::native::OutputDirectory;
use crate::pipeline::Pipeline;
use crate::source::SourceTree;
use std::path::Path;

pub(super) async fn execute_publish_aot(
    pipeline: &Pipeline<DockerEngine>,
    source: &SourceTree,
    target: &str,
    out: &Path,
    config: &RuntimeConfig,
) -> Result<i32> {
    let output = config.output();
    output.section(&format!("Native build: {}", target));

    let artifact = pipeline.publish_aot(source, target).await?;
    let mut directory = OutputDirectory::new();
    directory.insert(artifact)?;

    write_output(&directory, out, config)?;
    Ok(0)
}

pub(super) async fn execute_native(
    pipeline: &Pipeline<DockerEngine>,
    source: &SourceTree,
    os: OperatingSystem,
    out: &Path,
    config: &RuntimeConfig,
) -> Result<i32> {
    let output = config.output();
    let targets: Vec<String> = pipeline
        .matrix()
        .for_os(os)
        .iter()
        .map(|e| e.target.to_string())
        .collect();

    output.section(&format!("Native builds: {}", os));
    output.progress(&format!(
        "targets: {} (concurrency {})",
        targets.join(", "),
        pipeline.config().concurrency
    ));

    let report = pipeline.build_native_report(source, os).await?;

    // Under continue-on-error whatever did build is still written out
    write_output(&report.output, out, config)?;
    report.into_result().map(|_| 0)
}

fn write_output(directory: &OutputDirectory, out: &Path, config: &RuntimeConfig) -> Result<()> {
    let output = config.output();
    if directory.is_empty() {
        output.warn("No artifacts produced");
        return Ok(());
    }

    let written = directory.write_to(out)?;
    for (path, (_, artifact)) in written.iter().zip(directory.entries()) {
        output.result(&path.display().to_string());
        output.indent(&format!("{} bytes", artifact.len()));
    }
    output.success(&format!("{} artifact(s) written to {}", written.len(), out.display()));
    Ok(())
}
