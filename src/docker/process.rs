//! Running docker CLI commands with captured, streamed output.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Exit status and captured output of a finished command.
#[derive(Debug)]
pub(super) struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run `docker <args>`, logging each output line at debug level under `label`.
///
/// The child is killed if the returned future is dropped.
pub(super) async fn run_streaming(
    docker: &Path,
    args: &[String],
    label: &str,
) -> std::io::Result<CommandOutput> {
    log::debug!("docker {}", args.join(" "));

    let mut child = Command::new(docker)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr, status) = tokio::join!(
        collect_lines(stdout, label),
        collect_lines(stderr, label),
        child.wait()
    );

    Ok(CommandOutput {
        status: status?,
        stdout,
        stderr,
    })
}

async fn collect_lines<R>(stream: Option<R>, label: &str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return String::new();
    };
    let mut reader = BufReader::new(stream);
    let mut captured = String::new();
    let mut buf = Vec::new();
    // Drain to EOF even on bad bytes; closing the pipe early would kill the writer.
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                log::debug!("[{}] {}", label, line);
                captured.push_str(line);
                captured.push('\n');
            }
            Err(e) => {
                log::warn!("[{}] output capture failed: {}", label, e);
                break;
            }
        }
    }
    captured
}

/// Run `docker <args>` and collect raw stdout bytes (for archive streams).
pub(super) async fn run_raw(docker: &Path, args: &[String]) -> std::io::Result<std::process::Output> {
    log::debug!("docker {}", args.join(" "));
    Command::new(docker)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
}
