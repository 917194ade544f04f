//! Run lifecycle tracking.
//!
//! A dispatched run is persisted as PENDING and completed in the background;
//! pollers read the store and must never observe a terminal run regress.
//! The store is an injected interface so tests run against memory instead of
//! the filesystem; every transition is a full read-modify-write of the
//! bounded history under the store's lock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use warden_types::config::RunnerConfig;
use warden_types::run::{RunRecord, RunStatus, TriggeredBy};

/// Simulated completion delay, mirroring a short real execution.
const SIMULATED_RUN_DELAY: Duration = Duration::from_millis(500);

pub trait RunStore: Send + Sync {
    /// Insert or replace by run id. A run that already reached a terminal
    /// status is immutable; later writes for it are dropped.
    fn upsert(&self, run: &RunRecord) -> Result<()>;
    fn list(&self) -> Result<Vec<RunRecord>>;
}

/// Replace-or-append against a bounded history, oldest evicted first.
/// Shared by both store implementations so the retention and immutability
/// rules cannot drift apart.
fn apply_upsert(runs: &mut Vec<RunRecord>, run: &RunRecord, max_runs: usize) {
    if let Some(existing) = runs.iter_mut().find(|r| r.run_id == run.run_id) {
        if existing.is_terminal() {
            warn!(run_id = %run.run_id, "ignoring write to a completed run");
            return;
        }
        *existing = run.clone();
    } else {
        runs.push(run.clone());
    }
    if runs.len() > max_runs {
        let excess = runs.len() - max_runs;
        runs.drain(..excess);
    }
}

pub struct MemoryRunStore {
    runs: Mutex<Vec<RunRecord>>,
    max_runs: usize,
}

impl MemoryRunStore {
    pub fn new(max_runs: usize) -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            max_runs,
        }
    }
}

impl RunStore for MemoryRunStore {
    fn upsert(&self, run: &RunRecord) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        apply_upsert(&mut runs, run, self.max_runs);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RunRecord>> {
        Ok(self.runs.lock().unwrap().clone())
    }
}

/// JSON-file-backed history. The file is rewritten whole on every
/// transition; the mutex is the single-writer discipline.
pub struct JsonFileRunStore {
    path: PathBuf,
    max_runs: usize,
    lock: Mutex<()>,
}

impl JsonFileRunStore {
    pub fn new(path: impl Into<PathBuf>, max_runs: usize) -> Self {
        Self {
            path: path.into(),
            max_runs,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Vec<RunRecord> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn save(&self, runs: &[RunRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(runs)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl RunStore for JsonFileRunStore {
    fn upsert(&self, run: &RunRecord) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut runs = self.load();
        apply_upsert(&mut runs, run, self.max_runs);
        self.save(&runs)
    }

    fn list(&self) -> Result<Vec<RunRecord>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.load())
    }
}

/// Execution backend, chosen once at construction.
pub enum Backend {
    /// Completes every run successfully after a short delay; used when no
    /// process runner is available.
    Simulated,
    /// Spawns `<agents_path>/<agent_id>/run.sh <action>`.
    Process { agents_path: PathBuf },
}

pub struct RunManager {
    backend: Backend,
    store: Arc<dyn RunStore>,
    max_output_bytes: usize,
}

impl RunManager {
    pub fn new(backend: Backend, store: Arc<dyn RunStore>, max_output_bytes: usize) -> Self {
        Self {
            backend,
            store,
            max_output_bytes,
        }
    }

    pub fn from_config(cfg: &RunnerConfig, store: Arc<dyn RunStore>) -> Self {
        let backend = match cfg.backend.as_str() {
            "process" => Backend::Process {
                agents_path: PathBuf::from(&cfg.agents_path),
            },
            _ => Backend::Simulated,
        };
        Self::new(backend, store, cfg.max_output_bytes)
    }

    /// Dispatch a run. Persists PENDING and returns immediately; completion
    /// happens in a background task. The one exception is a missing runner
    /// script, which fails the run before it ever starts.
    pub fn dispatch(
        &self,
        agent_id: &str,
        action: &str,
        triggered_by: TriggeredBy,
    ) -> Result<RunRecord> {
        let run = RunRecord::pending(agent_id, action, triggered_by);
        self.store.upsert(&run)?;

        match &self.backend {
            Backend::Simulated => {
                self.spawn_simulated(run.clone());
                Ok(run)
            }
            Backend::Process { agents_path } => {
                let script = agents_path.join(agent_id).join("run.sh");
                if !script.exists() {
                    let mut failed = run;
                    failed.status = RunStatus::Failed;
                    failed.completed_at = Some(Utc::now());
                    failed.duration_ms = Some(0);
                    failed.output = format!("Runner script not found: {}", script.display());
                    failed.exit_code = Some(-1);
                    self.store.upsert(&failed)?;
                    error!(agent_id, script = %script.display(), "runner script not found");
                    return Ok(failed);
                }

                let mut running = run.clone();
                running.status = RunStatus::Running;
                self.store.upsert(&running)?;
                self.spawn_process(running, script);
                Ok(run)
            }
        }
    }

    /// Most recent runs first, optionally filtered by agent.
    pub fn list_runs(&self, agent_id: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.store.list()?;
        let mut filtered: Vec<RunRecord> = runs
            .into_iter()
            .filter(|r| agent_id.map_or(true, |id| r.agent_id == id))
            .collect();
        let keep = filtered.len().saturating_sub(limit);
        filtered.drain(..keep);
        filtered.reverse();
        Ok(filtered)
    }

    fn spawn_simulated(&self, run: RunRecord) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            tokio::time::sleep(SIMULATED_RUN_DELAY).await;

            let mut completed = run;
            completed.status = RunStatus::Success;
            completed.completed_at = Some(Utc::now());
            completed.duration_ms = Some(started.elapsed().as_millis() as i64);
            completed.output = format!(
                "[SIMULATED] Agent {} executed action '{}' successfully.",
                completed.agent_id, completed.action
            );
            completed.exit_code = Some(0);
            if let Err(err) = store.upsert(&completed) {
                error!(%err, run_id = %completed.run_id, "failed to persist simulated run");
            } else {
                info!(run_id = %completed.run_id, "simulated run completed");
            }
        });
    }

    fn spawn_process(&self, run: RunRecord, script: PathBuf) {
        let store = Arc::clone(&self.store);
        let max_output = self.max_output_bytes;
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let outcome = execute_runner(&script, &run.action, max_output).await;

            let mut completed = run;
            completed.completed_at = Some(Utc::now());
            completed.duration_ms = Some(started.elapsed().as_millis() as i64);
            match outcome {
                Ok((output, exit_code)) => {
                    completed.status = if exit_code == 0 {
                        RunStatus::Success
                    } else {
                        RunStatus::Failed
                    };
                    completed.output = output;
                    completed.exit_code = Some(exit_code);
                }
                Err(err) => {
                    completed.status = RunStatus::Failed;
                    completed.output = format!("Spawn error: {err}");
                    completed.exit_code = Some(-1);
                }
            }
            info!(
                run_id = %completed.run_id,
                status = %completed.status,
                exit = ?completed.exit_code,
                "run finished"
            );
            if let Err(err) = store.upsert(&completed) {
                error!(%err, run_id = %completed.run_id, "failed to persist run result");
            }
        });
    }
}

/// Spawn the runner script and stream combined stdout/stderr into a
/// tail-bounded buffer; returns the captured output and exit code.
async fn execute_runner(
    script: &std::path::Path,
    action: &str,
    max_output: usize,
) -> Result<(String, i32)> {
    let mut child = tokio::process::Command::new("sh")
        .arg(script)
        .arg(action)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {}", script.display()))?;

    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(read_bounded(stdout, Arc::clone(&buffer), max_output)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(read_bounded(stderr, Arc::clone(&buffer), max_output)));
    }

    let status = child.wait().await.context("failed to wait for runner")?;
    for reader in readers {
        let _ = reader.await;
    }

    let output = {
        let buf = buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).trim().to_string()
    };
    Ok((output, status.code().unwrap_or(-1)))
}

/// Append a stream to the shared buffer, keeping only the last `max` bytes.
async fn read_bounded<R>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>, max: usize)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buf = buffer.lock().unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > max {
                    let excess = buf.len() - max;
                    buf.drain(..excess);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_terminal(manager: &RunManager, run_id: uuid::Uuid) -> RunRecord {
        for _ in 0..100 {
            let runs = manager.list_runs(None, 100).unwrap();
            if let Some(run) = runs.iter().find(|r| r.run_id == run_id) {
                if run.is_terminal() {
                    return run.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("run {run_id} never reached a terminal state");
    }

    fn simulated_manager() -> RunManager {
        RunManager::new(Backend::Simulated, Arc::new(MemoryRunStore::new(200)), 10_000)
    }

    #[test]
    fn store_caps_history_and_evicts_oldest() {
        let store = MemoryRunStore::new(3);
        let mut ids = Vec::new();
        for i in 0..5 {
            let run = RunRecord::pending("agent_x", &format!("a{i}"), TriggeredBy::Manual);
            ids.push(run.run_id);
            store.upsert(&run).unwrap();
        }
        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].run_id, ids[2]);
        assert_eq!(runs[2].run_id, ids[4]);
    }

    #[test]
    fn terminal_runs_are_immutable() {
        let store = MemoryRunStore::new(10);
        let mut run = RunRecord::pending("agent_x", "a", TriggeredBy::Manual);
        store.upsert(&run).unwrap();

        run.status = RunStatus::Success;
        run.exit_code = Some(0);
        store.upsert(&run).unwrap();

        // A late RUNNING write must not regress the record.
        run.status = RunStatus::Running;
        run.exit_code = None;
        store.upsert(&run).unwrap();

        let runs = store.list().unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].exit_code, Some(0));
    }

    #[test]
    fn json_store_roundtrips_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRunStore::new(dir.path().join("runs.json"), 2);
        for i in 0..3 {
            let run = RunRecord::pending("agent_x", &format!("a{i}"), TriggeredBy::Cron);
            store.upsert(&run).unwrap();
        }
        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].action, "a1");
        assert_eq!(runs[0].triggered_by, TriggeredBy::Cron);
    }

    #[tokio::test]
    async fn simulated_run_reaches_success_once() {
        let manager = simulated_manager();
        let run = manager.dispatch("agent_dba", "db-drift-check", TriggeredBy::Manual).unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        let done = wait_terminal(&manager, run.run_id).await;
        assert_eq!(done.status, RunStatus::Success);
        assert_eq!(done.exit_code, Some(0));
        assert!(done.completed_at.is_some());
        assert!(done.output.contains("db-drift-check"));

        // Polling after completion never shows an earlier state again.
        for _ in 0..5 {
            let runs = manager.list_runs(Some("agent_dba"), 10).unwrap();
            assert_eq!(runs[0].status, RunStatus::Success);
        }
    }

    #[tokio::test]
    async fn missing_runner_fails_immediately_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRunStore::new(200));
        let manager = RunManager::new(
            Backend::Process { agents_path: dir.path().to_path_buf() },
            Arc::clone(&store) as Arc<dyn RunStore>,
            10_000,
        );

        let run = manager.dispatch("agent_ghost", "noop", TriggeredBy::Manual).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.exit_code, Some(-1));
        assert!(run.output.contains("not found"));

        let stored = store.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn process_run_captures_output_and_exit() {
        let dir = tempfile::tempdir().unwrap();
        let agent_dir = dir.path().join("agent_echo");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(agent_dir.join("run.sh"), "echo \"ran action $1\"\n").unwrap();

        let manager = RunManager::new(
            Backend::Process { agents_path: dir.path().to_path_buf() },
            Arc::new(MemoryRunStore::new(200)),
            10_000,
        );
        let run = manager.dispatch("agent_echo", "greet", TriggeredBy::Manual).unwrap();
        let done = wait_terminal(&manager, run.run_id).await;
        assert_eq!(done.status, RunStatus::Success);
        assert_eq!(done.exit_code, Some(0));
        assert_eq!(done.output, "ran action greet");
    }

    #[tokio::test]
    async fn failing_script_yields_failed_with_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let agent_dir = dir.path().join("agent_bad");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(agent_dir.join("run.sh"), "echo boom >&2\nexit 7\n").unwrap();

        let manager = RunManager::new(
            Backend::Process { agents_path: dir.path().to_path_buf() },
            Arc::new(MemoryRunStore::new(200)),
            10_000,
        );
        let run = manager.dispatch("agent_bad", "explode", TriggeredBy::Manual).unwrap();
        let done = wait_terminal(&manager, run.run_id).await;
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(done.exit_code, Some(7));
        assert!(done.output.contains("boom"));
    }

    #[tokio::test]
    async fn long_output_keeps_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let agent_dir = dir.path().join("agent_loud");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(
            agent_dir.join("run.sh"),
            "for i in $(seq 1 200); do echo line-$i; done\n",
        )
        .unwrap();

        let manager = RunManager::new(
            Backend::Process { agents_path: dir.path().to_path_buf() },
            Arc::new(MemoryRunStore::new(200)),
            128,
        );
        let run = manager.dispatch("agent_loud", "spam", TriggeredBy::Manual).unwrap();
        let done = wait_terminal(&manager, run.run_id).await;
        assert!(done.output.len() <= 128);
        assert!(done.output.contains("line-200"));
        assert!(!done.output.contains("line-1\n"));
    }

    #[tokio::test]
    async fn list_runs_filters_and_orders() {
        let manager = simulated_manager();
        let r1 = manager.dispatch("agent_a", "one", TriggeredBy::Manual).unwrap();
        let r2 = manager.dispatch("agent_b", "two", TriggeredBy::Manual).unwrap();
        let r3 = manager.dispatch("agent_a", "three", TriggeredBy::Manual).unwrap();

        let all = manager.list_runs(None, 10).unwrap();
        assert_eq!(all[0].run_id, r3.run_id);
        assert_eq!(all[1].run_id, r2.run_id);
        assert_eq!(all[2].run_id, r1.run_id);

        let only_a = manager.list_runs(Some("agent_a"), 10).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|r| r.agent_id == "agent_a"));

        let limited = manager.list_runs(None, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].run_id, r3.run_id);
    }
}
