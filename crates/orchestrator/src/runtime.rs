// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Container runtime seam.
//!
//! [`ContainerRuntime`] splits a compose run into the four steps the run
//! state machine observes. [`DockerCompose`] implements it on top of
//! `docker compose`: `start` spawns `up --exit-code-from loadgen` and keeps
//! the child, `wait` awaits that child's exit status.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::compose::LOADGEN_SERVICE;
use crate::error::RuntimeError;

/// Result of a runtime step.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Steps of one isolated run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build all images of `descriptor`.
    async fn build(&self, project: &str, descriptor: &str) -> RuntimeResult<()>;

    /// Start the environment; output goes to `log_path` as well.
    async fn start(&self, project: &str, descriptor: &str, log_path: &Path) -> RuntimeResult<()>;

    /// Wait for the load generator to exit. A non-zero status is an error.
    async fn wait(&self, project: &str) -> RuntimeResult<()>;

    /// Remove containers, orphans and locally built images.
    async fn down(&self, project: &str) -> RuntimeResult<()>;
}

struct Running {
    child: Child,
    command: String,
    tees: Vec<JoinHandle<()>>,
}

/// `docker compose` as an external process.
pub struct DockerCompose {
    binary: String,
    running: Mutex<HashMap<String, Running>>,
}

impl DockerCompose {
    /// Use `binary` (e.g. `docker`) as `<binary> compose ...`.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            running: Mutex::new(HashMap::new()),
        }
    }

    fn command(&self, project: &str, args: &[&str]) -> (Command, String) {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("compose").arg("--project-name").arg(project).args(args);
        let line = format!("{} compose --project-name {} {}", self.binary, project, args.join(" "));
        (cmd, line)
    }

    async fn spawn_with_descriptor(mut cmd: Command, line: &str, descriptor: &str) -> RuntimeResult<Child> {
        let mut child = cmd
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: line.to_string(),
                source,
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(descriptor.as_bytes())
                .await
                .map_err(|source| RuntimeError::Io {
                    context: format!("writing descriptor to `{}`", line),
                    source,
                })?;
        }
        Ok(child)
    }

    async fn check_status(child: &mut Child, line: &str) -> RuntimeResult<()> {
        let status = child.wait().await.map_err(|source| RuntimeError::Io {
            context: format!("waiting for `{}`", line),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Exit {
                command: line.to_string(),
                status: status.to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn build(&self, project: &str, descriptor: &str) -> RuntimeResult<()> {
        let (cmd, line) = self.command(project, &["--file", "-", "build"]);
        info!(project, "running compose build");
        let mut child = Self::spawn_with_descriptor(cmd, &line, descriptor).await?;
        Self::check_status(&mut child, &line).await
    }

    async fn start(&self, project: &str, descriptor: &str, log_path: &Path) -> RuntimeResult<()> {
        let (mut cmd, line) = self.command(project, &["--file", "-", "up", "--exit-code-from", LOADGEN_SERVICE]);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let log = File::create(log_path).await.map_err(|source| RuntimeError::Io {
            context: format!("creating {}", log_path.display()),
            source,
        })?;
        let log = Arc::new(Mutex::new(log));

        info!(project, log = %log_path.display(), "running compose up");
        let mut child = Self::spawn_with_descriptor(cmd, &line, descriptor).await?;

        let mut tees = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            tees.push(tokio::spawn(tee(stdout, tokio::io::stdout(), log.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            tees.push(tokio::spawn(tee(stderr, tokio::io::stderr(), log)));
        }

        self.running.lock().await.insert(
            project.to_string(),
            Running {
                child,
                command: line,
                tees,
            },
        );
        Ok(())
    }

    async fn wait(&self, project: &str) -> RuntimeResult<()> {
        let mut running = self
            .running
            .lock()
            .await
            .remove(project)
            .ok_or_else(|| RuntimeError::NotStarted(project.to_string()))?;

        let status = Self::check_status(&mut running.child, &running.command).await;
        for tee in running.tees.drain(..) {
            if let Err(e) = tee.await {
                warn!(project, error = %e, "log forwarding task failed");
            }
        }
        status
    }

    async fn down(&self, project: &str) -> RuntimeResult<()> {
        let leftover = self.running.lock().await.remove(project);
        if let Some(mut leftover) = leftover {
            debug!(project, "stopping compose up before teardown");
            if let Err(e) = leftover.child.kill().await {
                warn!(project, error = %e, "could not stop compose up");
            }
        }

        let (mut cmd, line) = self.command(project, &["down", "--remove-orphans", "--rmi", "local"]);
        info!(project, "running compose down");
        let status = cmd.status().await.map_err(|source| RuntimeError::Spawn {
            command: line.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Exit {
                command: line,
                status: status.to_string(),
            })
        }
    }
}

/// Copy `reader` to `echo` and to the shared log file until EOF.
async fn tee<R, W>(mut reader: R, mut echo: W, log: Arc<Mutex<File>>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "reading compose output");
                break;
            }
        };
        let chunk = &buf[..n];
        if let Err(e) = log.lock().await.write_all(chunk).await {
            warn!(error = %e, "writing compose log");
        }
        // Echo failures (closed terminal) must not stop the log copy.
        let _ = echo.write_all(chunk).await;
    }
    if let Err(e) = log.lock().await.flush().await {
        warn!(error = %e, "flushing compose log");
    }
    let _ = echo.flush().await;
}
