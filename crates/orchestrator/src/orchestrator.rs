// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sequential benchmark runs.
//!
//! Variants run one after the other, each through the [`RunState`] machine.
//! Once a variant has entered `Building` it is torn down exactly once,
//! whether it completed, failed, timed out or was cancelled. The first
//! failed variant aborts the benchmark; artifacts of earlier variants stay
//! on disk.

use overhead_bench_core::config::find_dockerfile;
use overhead_bench_core::{BenchmarkConfig, RunArtifact, RunRecord, RunState, RunVariant, Settings};
use overhead_bench_results::io::{COMPOSE_FILE, COMPOSE_LOG_FILE};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::compose::ComposeDescriptor;
use crate::error::{OrchestratorError, Result, RuntimeError};
use crate::layout;
use crate::runtime::ContainerRuntime;

/// Outcome of one variant.
#[derive(Debug)]
pub struct VariantRun {
    /// State history of the run
    pub record: RunRecord,
    /// Artifact, or the first error the run hit
    pub result: Result<RunArtifact>,
}

/// Runs benchmarks against a [`ContainerRuntime`].
pub struct Orchestrator<'a, R> {
    runtime: R,
    settings: &'a Settings,
    cancel: CancellationToken,
    max_wait: Option<Duration>,
}

impl<'a, R: ContainerRuntime> Orchestrator<'a, R> {
    /// Create an orchestrator. Fails when `max_wait` does not parse.
    pub fn new(runtime: R, settings: &'a Settings) -> Result<Self> {
        Ok(Self {
            runtime,
            settings,
            cancel: CancellationToken::new(),
            max_wait: settings.max_wait_duration()?,
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts the current run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every variant of `cfg` in order.
    pub async fn run_benchmark(&self, cfg: &BenchmarkConfig) -> Result<Vec<RunArtifact>> {
        let span = info_span!("benchmark", id = %cfg.id, platform = %cfg.platform.display());
        async {
            info!(variants = cfg.runs.len(), "benchmark started");
            let mut artifacts = Vec::with_capacity(cfg.runs.len());
            for variant in &cfg.runs {
                let run = self.run_variant(cfg, variant).await;
                match run.result {
                    Ok(artifact) => artifacts.push(artifact),
                    Err(e) => {
                        error!(variant = %variant.name, error = %e, "aborting benchmark");
                        return Err(e);
                    }
                }
            }
            info!(completed = artifacts.len(), "benchmark finished");
            Ok(artifacts)
        }
        .instrument(span)
        .await
    }

    /// Run a single variant through the state machine.
    pub async fn run_variant(&self, cfg: &BenchmarkConfig, variant: &RunVariant) -> VariantRun {
        let project = layout::project_name(cfg, variant);
        let span = info_span!("run", variant = %variant.name, project = %project);
        self.run_variant_inner(cfg, variant, project).instrument(span).await
    }

    async fn run_variant_inner(&self, cfg: &BenchmarkConfig, variant: &RunVariant, project: String) -> VariantRun {
        let mut record = RunRecord::new(&variant.name, &project);

        if self.cancel.is_cancelled() {
            return VariantRun {
                record,
                result: Err(self.cancelled(variant)),
            };
        }
        if let Err(e) = record.transition(RunState::Building) {
            return VariantRun {
                record,
                result: Err(e.into()),
            };
        }
        info!(state = ?record.state, "run started");

        let outcome = self.execute(cfg, variant, &project, &mut record).await;
        if let Err(e) = &outcome {
            warn!(state = ?record.state, error = %e, "run failed");
            record.record_failure(e.to_string());
        }

        let teardown = self.teardown(variant, &project, &mut record).await;
        let result = match (outcome, teardown) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(artifact), Ok(())) => Ok(artifact),
        };

        match record.finish() {
            Ok(state) => info!(state = ?state, duration_ms = ?record.duration_ms, "run finished"),
            Err(e) => error!(error = %e, "could not finish run"),
        }
        VariantRun { record, result }
    }

    /// Building through AwaitingCompletion.
    async fn execute(
        &self,
        cfg: &BenchmarkConfig,
        variant: &RunVariant,
        project: &str,
        record: &mut RunRecord,
    ) -> Result<RunArtifact> {
        let artifact_dir = layout::artifact_dir(&self.settings.result_root, cfg, variant);
        let dockerfile = find_dockerfile(&cfg.variant_dir(variant))?;
        tokio::fs::create_dir_all(&artifact_dir)
            .await
            .map_err(|source| io_error(&artifact_dir, source))?;
        let mount = tokio::fs::canonicalize(&artifact_dir)
            .await
            .map_err(|source| io_error(&artifact_dir, source))?;

        let descriptor =
            ComposeDescriptor::for_run(cfg, variant, self.settings, &dockerfile, &mount).to_yaml()?;
        let descriptor_path = artifact_dir.join(COMPOSE_FILE);
        tokio::fs::write(&descriptor_path, &descriptor)
            .await
            .map_err(|source| io_error(&descriptor_path, source))?;

        self.cancellable(variant, async {
            self.runtime
                .build(project, &descriptor)
                .await
                .map_err(runtime_error(variant))
        })
        .await?;

        record.transition(RunState::Started)?;
        let log_path = artifact_dir.join(COMPOSE_LOG_FILE);
        self.cancellable(variant, async {
            self.runtime
                .start(project, &descriptor, &log_path)
                .await
                .map_err(runtime_error(variant))
        })
        .await?;

        record.transition(RunState::AwaitingCompletion)?;
        self.cancellable(variant, self.await_completion(variant, project)).await?;

        Ok(RunArtifact {
            variant_name: variant.name.clone(),
            artifact_path: artifact_dir,
            compose_descriptor: descriptor,
        })
    }

    async fn await_completion(&self, variant: &RunVariant, project: &str) -> Result<()> {
        let wait = self.runtime.wait(project);
        let status = match self.max_wait {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(status) => status,
                Err(_) => {
                    return Err(OrchestratorError::WaitTimeout {
                        variant: variant.name.clone(),
                        waited: limit,
                    })
                }
            },
            None => wait.await,
        };
        status.map_err(runtime_error(variant))
    }

    /// Teardown is never cancelled.
    async fn teardown(&self, variant: &RunVariant, project: &str, record: &mut RunRecord) -> Result<()> {
        record.transition(RunState::TearingDown)?;
        info!(state = ?record.state, "tearing down");
        if let Err(e) = self.runtime.down(project).await {
            let e = runtime_error(variant)(e);
            warn!(error = %e, "teardown failed");
            record.record_failure(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    async fn cancellable<T>(&self, variant: &RunVariant, step: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled(variant)),
            res = step => res,
        }
    }

    fn cancelled(&self, variant: &RunVariant) -> OrchestratorError {
        OrchestratorError::Cancelled {
            variant: variant.name.clone(),
        }
    }
}

fn runtime_error(variant: &RunVariant) -> impl FnOnce(RuntimeError) -> OrchestratorError + '_ {
    move |source| OrchestratorError::Runtime {
        variant: variant.name.clone(),
        source,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockContainerRuntime, RuntimeResult};
    use async_trait::async_trait;
    use overhead_bench_core::BenchmarkId;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{"target": {"path": "/update?queries=10"}, "rps": 10, "duration": "1s"}"#;

    struct Fixture {
        _tmp: TempDir,
        cfg: BenchmarkConfig,
        settings: Settings,
    }

    fn fixture(variants: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let platform = tmp.path().join("platform").join("python").join("django");
        fs::create_dir_all(&platform).unwrap();
        fs::write(platform.join("config.json"), CONFIG).unwrap();
        for v in variants {
            fs::create_dir_all(platform.join(v)).unwrap();
            fs::write(platform.join(v).join("Dockerfile"), "FROM scratch\n").unwrap();
        }
        let mut cfg = BenchmarkConfig::from_path(&platform).unwrap();
        cfg.id = BenchmarkId::from_bytes(*b"fooo");
        let settings = Settings {
            result_root: tmp.path().join("result"),
            ..Settings::default()
        };
        Fixture {
            _tmp: tmp,
            cfg,
            settings,
        }
    }

    fn exit_error() -> RuntimeError {
        RuntimeError::Exit {
            command: "docker compose".into(),
            status: "exit status: 1".into(),
        }
    }

    fn happy_mock(runs: usize) -> MockContainerRuntime {
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(runs).returning(|_, _| Ok(()));
        mock.expect_start().times(runs).returning(|_, _, _| Ok(()));
        mock.expect_wait().times(runs).returning(|_| Ok(()));
        mock.expect_down().times(runs).returning(|_| Ok(()));
        mock
    }

    #[tokio::test]
    async fn test_successful_benchmark_writes_descriptors() {
        let f = fixture(&["baseline", "instrumented"]);
        let orch = Orchestrator::new(happy_mock(2), &f.settings).unwrap();

        let artifacts = orch.run_benchmark(&f.cfg).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].variant_name, "baseline");
        assert_eq!(
            artifacts[1].artifact_path,
            layout::artifact_dir(&f.settings.result_root, &f.cfg, &f.cfg.runs[1])
        );
        for artifact in &artifacts {
            let written = fs::read_to_string(artifact.artifact_path.join(COMPOSE_FILE)).unwrap();
            assert_eq!(written, artifact.compose_descriptor);
        }
        assert!(artifacts[1].compose_descriptor.contains("relay:"));
        assert!(!artifacts[0].compose_descriptor.contains("relay:"));
    }

    #[tokio::test]
    async fn test_completed_run_history() {
        let f = fixture(&["baseline"]);
        let orch = Orchestrator::new(happy_mock(1), &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.result.is_ok());
        assert!(run.record.is_completed());
        let states: Vec<RunState> = run.record.history.iter().map(|c| c.to).collect();
        assert_eq!(
            states,
            vec![
                RunState::Building,
                RunState::Started,
                RunState::AwaitingCompletion,
                RunState::TearingDown,
                RunState::Completed,
            ]
        );
        assert_eq!(run.record.project_name, "python-django-baseline-mzxw63y");
    }

    #[tokio::test]
    async fn test_build_failure_tears_down_once() {
        let f = fixture(&["baseline"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(1).returning(|_, _| Err(exit_error()));
        mock.expect_start().times(0);
        mock.expect_wait().times(0);
        mock.expect_down().times(1).returning(|_| Ok(()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(matches!(run.result, Err(OrchestratorError::Runtime { .. })));
        assert!(run.record.is_failed());
        assert_eq!(run.record.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_tears_down_once() {
        let f = fixture(&["instrumented"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(1).returning(|_, _| Ok(()));
        mock.expect_start().times(1).returning(|_, _, _| Err(exit_error()));
        mock.expect_wait().times(0);
        mock.expect_down().times(1).returning(|_| Ok(()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.result.is_err());
        assert!(run.record.is_failed());
        assert_eq!(run.record.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_loadgen_exit_code_fails_run() {
        let f = fixture(&["baseline"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(1).returning(|_, _| Ok(()));
        mock.expect_start().times(1).returning(|_, _, _| Ok(()));
        mock.expect_wait().times(1).returning(|_| Err(exit_error()));
        mock.expect_down().times(1).returning(|_| Ok(()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.record.is_failed());
        assert_eq!(run.record.teardown_count(), 1);
        assert!(run.record.error_message.unwrap().contains("exit status: 1"));
    }

    #[tokio::test]
    async fn test_teardown_failure_fails_run() {
        let f = fixture(&["baseline"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(1).returning(|_, _| Ok(()));
        mock.expect_start().times(1).returning(|_, _, _| Ok(()));
        mock.expect_wait().times(1).returning(|_| Ok(()));
        mock.expect_down().times(1).returning(|_| Err(exit_error()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.result.is_err());
        assert!(run.record.is_failed());
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_variants() {
        let f = fixture(&["baseline", "instrumented"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(1).returning(|_, _| Err(exit_error()));
        mock.expect_start().times(0);
        mock.expect_wait().times(0);
        mock.expect_down().times(1).returning(|_| Ok(()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let err = orch.run_benchmark(&f.cfg).await.unwrap_err();
        assert!(err.to_string().contains("baseline"));
    }

    #[tokio::test]
    async fn test_missing_dockerfile_still_tears_down() {
        let f = fixture(&["baseline"]);
        fs::remove_file(f.cfg.variant_dir(&f.cfg.runs[0]).join("Dockerfile")).unwrap();
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(0);
        mock.expect_down().times(1).returning(|_| Ok(()));
        let orch = Orchestrator::new(mock, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(matches!(run.result, Err(OrchestratorError::Core(_))));
        assert_eq!(run.record.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_teardown() {
        let f = fixture(&["baseline"]);
        let mut mock = MockContainerRuntime::new();
        mock.expect_build().times(0);
        mock.expect_down().times(0);
        let orch = Orchestrator::new(mock, &f.settings).unwrap();
        orch.cancellation_token().cancel();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.result.unwrap_err().is_cancelled());
        assert_eq!(run.record.state, RunState::Idle);
    }

    /// Load generator that never exits.
    struct HangingRuntime {
        downs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContainerRuntime for HangingRuntime {
        async fn build(&self, _: &str, _: &str) -> RuntimeResult<()> {
            Ok(())
        }

        async fn start(&self, _: &str, _: &str, _: &Path) -> RuntimeResult<()> {
            Ok(())
        }

        async fn wait(&self, _: &str) -> RuntimeResult<()> {
            std::future::pending().await
        }

        async fn down(&self, _: &str) -> RuntimeResult<()> {
            self.downs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_while_awaiting_tears_down() {
        let f = fixture(&["baseline"]);
        let downs = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(HangingRuntime { downs: downs.clone() }, &f.settings).unwrap();

        let token = orch.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(run.result.unwrap_err().is_cancelled());
        assert!(run.record.is_failed());
        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert_eq!(run.record.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_max_wait_times_out() {
        let mut f = fixture(&["baseline"]);
        f.settings.max_wait = Some("50ms".to_string());
        let downs = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(HangingRuntime { downs: downs.clone() }, &f.settings).unwrap();

        let run = orch.run_variant(&f.cfg, &f.cfg.runs[0]).await;
        assert!(matches!(
            run.result,
            Err(OrchestratorError::WaitTimeout { waited, .. }) if waited == Duration::from_millis(50)
        ));
        assert_eq!(downs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_max_wait_rejected() {
        let settings = Settings {
            max_wait: Some("eventually".into()),
            ..Settings::default()
        };
        let result = Orchestrator::new(MockContainerRuntime::new(), &settings);
        assert!(matches!(result, Err(OrchestratorError::Core(_))));
    }
}
