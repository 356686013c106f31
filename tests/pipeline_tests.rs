mod common;

use clausewitz_pipeline::environment::{Expect, Mount};
use clausewitz_pipeline::{EnvError, Phase, Pipeline, PipelineError, Realized};
use common::{ScriptedEngine, config, source_tree};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SOLUTION_DIR: &str = "/repo/src";
const CLI_DIR: &str = "/repo/src/MageeSoft.Paradox.Clausewitz.Save.Cli";

fn only_step(pipeline: &Pipeline<ScriptedEngine>) -> (String, Option<String>) {
    let envs = pipeline.engine().environments();
    assert_eq!(envs.len(), 1);
    let steps = envs[0].steps();
    assert_eq!(steps.len(), 1);
    (steps[0].command_line(), steps[0].workdir.clone())
}

#[tokio::test]
async fn test_build_runs_in_solution_dir_with_cache() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(ScriptedEngine::new(), config());

    let handle = pipeline.build(&source).await.unwrap();
    assert_eq!(handle.exit_code(), Some(0));

    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet build");
    assert_eq!(workdir.as_deref(), Some(SOLUTION_DIR));

    let env = &pipeline.engine().environments()[0];
    assert_eq!(env.image(), "mcr.microsoft.com/dotnet/sdk:10.0-preview");
    assert!(env.mounts_cache("nuget"));
}

#[tokio::test]
async fn test_test_returns_runner_output() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(
        ScriptedEngine::new().with_stdout("dotnet test", "Passed! - Failed: 0, Passed: 42\n"),
        config(),
    );

    let stdout = pipeline.test(&source).await.unwrap();
    assert!(stdout.contains("Passed: 42"));

    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet test");
    assert_eq!(workdir.as_deref(), Some(SOLUTION_DIR));
}

#[tokio::test]
async fn test_failing_tests_fail_the_call() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(ScriptedEngine::new().fail_command("dotnet test", 1), config());

    let err = pipeline.test(&source).await.unwrap_err();
    match err {
        PipelineError::Environment(EnvError::CommandFailed {
            phase,
            command,
            exit_code,
            ..
        }) => {
            assert_eq!(phase, Phase::Run);
            assert_eq!(command, "dotnet test");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("expected command failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_keeps_output_of_failing_run() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(ScriptedEngine::new().fail_command("dotnet test", 1), config());

    let outcome = pipeline.test_report(&source).await.unwrap();

    assert!(!outcome.passed());
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.stdout, "ran dotnet test\n");
    assert!(outcome.stderr.contains("scripted run failure"));
    assert_eq!(pipeline.engine().environments()[0].steps()[0].expect, Expect::Any);
}

#[tokio::test]
async fn test_vs_test_runs_test_project() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(ScriptedEngine::new(), config());

    pipeline.vs_test(&source).await.unwrap();

    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet run --project MageeSoft.Paradox.Clausewitz.Save.Tests");
    assert_eq!(workdir.as_deref(), Some(SOLUTION_DIR));
}

#[tokio::test]
async fn test_tool_and_publish_run_in_cli_dir() {
    let (_dir, source) = source_tree();

    let pipeline = Pipeline::new(ScriptedEngine::new(), config());
    pipeline.tool(&source).await.unwrap();
    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet publish -p:PackAsTool=true");
    assert_eq!(workdir.as_deref(), Some(CLI_DIR));

    let pipeline = Pipeline::new(ScriptedEngine::new(), config());
    pipeline.publish(&source).await.unwrap();
    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet publish");
    assert_eq!(workdir.as_deref(), Some(CLI_DIR));
}

#[tokio::test]
async fn test_run_forwards_arguments() {
    let (_dir, source) = source_tree();
    let pipeline = Pipeline::new(ScriptedEngine::new(), config());

    let args = vec!["summary".to_string(), "--json".to_string()];
    let stdout = pipeline.run(&source, &args).await.unwrap();

    assert_eq!(stdout, "ran dotnet run -- summary --json\n");
    let (_, workdir) = only_step(&pipeline);
    assert_eq!(workdir.as_deref(), Some(CLI_DIR));
}

#[tokio::test]
async fn test_smoke_test_mounts_fixture_and_lists() {
    let (_dir, source) = source_tree();
    let fixture = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(fixture.path(), b"SAV0102").unwrap();
    let pipeline = Pipeline::new(
        ScriptedEngine::new().with_stdout("dotnet run -- list", "my test empire  2310.01.01\n"),
        config(),
    );

    let stdout = pipeline.smoke_test(&source, fixture.path()).await.unwrap();
    assert!(stdout.contains("my test empire"));

    let (command, workdir) = only_step(&pipeline);
    assert_eq!(command, "dotnet run -- list");
    assert_eq!(workdir.as_deref(), Some(CLI_DIR));

    let env = &pipeline.engine().environments()[0];
    assert!(env.mounts().iter().any(|m| matches!(
        m,
        Mount::File { path, host_file }
            if path == "/root/.paradoxlauncher/Stellaris/save games/my test empire/ironman.sav"
                && host_file == fixture.path()
    )));
}

#[tokio::test]
async fn test_smoke_test_rejects_empty_output() {
    let (_dir, source) = source_tree();
    let fixture = tempfile::NamedTempFile::new().unwrap();
    let pipeline = Pipeline::new(
        ScriptedEngine::new().with_stdout("dotnet run -- list", "  \n"),
        config(),
    );

    let err = pipeline.smoke_test(&source, fixture.path()).await.unwrap_err();
    match err {
        PipelineError::EmptyOutput { command } => assert_eq!(command, "dotnet run -- list"),
        other => panic!("expected empty output error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (_dir, source) = source_tree();
    let token = CancellationToken::new();
    token.cancel();
    let pipeline = Pipeline::new(
        ScriptedEngine::new().with_delay(Duration::from_secs(30)),
        config(),
    )
    .with_cancellation(token);

    let err = pipeline.build(&source).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_custom_sdk_image_from_config() {
    let (_dir, source) = source_tree();
    let mut cfg = config();
    cfg.sdk_image = "registry.local/dotnet/sdk:10.0".to_string();
    let pipeline = Pipeline::new(ScriptedEngine::new(), cfg);

    pipeline.build(&source).await.unwrap();
    assert_eq!(
        pipeline.engine().environments()[0].image(),
        "registry.local/dotnet/sdk:10.0"
    );
}
