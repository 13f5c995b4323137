//! Bounded local script executor.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use autocd_core::classify::{KeywordClassifier, LineClassifier, LineLevel};
use autocd_core::executor::{
    EnvVars, ExecutionResult, ExecutorConfig, LogLine, LogStream, RunInfo, RunOutcome,
    ScriptRunner, TIMEOUT_EXIT_CODE,
};
use autocd_core::{Error, Result, RunId};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::process;
use crate::registry::RunRegistry;

/// Runs scripts from a directory with at most `max_concurrent` alive at once.
///
/// Callers beyond the limit wait in [`ScriptExecutor::execute`] until a slot
/// frees up. Each admitted run gets its own deadline, is registered so it can
/// be stopped, and always releases its slot and registry entry on exit.
pub struct ScriptExecutor {
    config: ExecutorConfig,
    slots: Semaphore,
    registry: RunRegistry,
    classifier: Arc<dyn LineClassifier>,
    drain_grace: Duration,
}

impl ScriptExecutor {
    /// How long output is still read once the script has exited or been killed.
    pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(250);

    pub fn new(config: ExecutorConfig) -> Self {
        let config = config.normalized();
        Self {
            slots: Semaphore::new(config.max_concurrent),
            registry: RunRegistry::new(),
            classifier: Arc::new(KeywordClassifier::default()),
            drain_grace: Self::DEFAULT_DRAIN_GRACE,
            config,
        }
    }

    /// Set how long to keep reading output after the script is gone.
    ///
    /// Background jobs that inherited stdout or stderr keep the pipes open;
    /// their output is abandoned once this grace period ends.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Replace the default keyword classifier for output lines.
    pub fn with_classifier(mut self, classifier: impl LineClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Number of slots not currently held by a run.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn is_running(&self, event: &str) -> bool {
        self.registry.is_running(event)
    }

    /// Refuse new runs and stop the live ones. Queued callers get
    /// [`Error::ExecutorClosed`].
    pub fn shutdown(&self) -> usize {
        self.slots.close();
        self.registry.stop_all()
    }

    /// Resolve `event` to a script file inside the scripts directory.
    pub fn resolve_script(&self, event: &str) -> Result<PathBuf> {
        let mut components = Path::new(event).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_name {
            return Err(Error::InvalidScriptName(event.to_string()));
        }

        let path = self.config.scripts_dir.join(event);
        if !path.is_file() {
            return Err(Error::ScriptNotFound(path));
        }

        std::path::absolute(&path)
            .map_err(|e| Error::Internal(format!("failed to resolve {}: {}", path.display(), e)))
    }

    /// Run the script named `event`, layering `env` over the default environment.
    ///
    /// Returns an error only when the run could not be started. A script that
    /// exits non-zero, times out or is stopped still yields a result.
    pub async fn execute(&self, event: &str, env: EnvVars) -> Result<ExecutionResult> {
        let script = self.resolve_script(event)?;
        let run_id = RunId::new();
        let span = info_span!("script_run", %run_id, event);

        self.run(run_id, event, script, env).instrument(span).await
    }

    async fn run(
        &self,
        run_id: RunId,
        event: &str,
        script: PathBuf,
        env: EnvVars,
    ) -> Result<ExecutionResult> {
        debug!(available = self.available_slots(), "Waiting for a run slot");
        let _permit = self.slots.acquire().await.map_err(|_| Error::ExecutorClosed)?;
        let deadline = Instant::now() + self.config.timeout;
        let started_at = Utc::now();

        let mut command = Command::new(&self.config.shell);
        command
            .arg(&script)
            .current_dir(&self.config.scripts_dir)
            .envs(self.config.default_env.iter().map(|(k, v)| (k, v)))
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", script.display(), e)))?;
        let pid = child.id();
        let mut group = GroupGuard { pid, armed: true };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Pipe("stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Pipe("stderr".to_string()))?;

        let cancel = CancellationToken::new();
        let _registration = self.registry.register(
            RunInfo {
                id: run_id,
                event: event.to_string(),
                pid,
                started_at,
            },
            cancel.clone(),
        );
        info!(script = %script.display(), pid = ?pid, "Script started");

        let log = Arc::new(Mutex::new(RunLog::default()));
        let stdout_task = tokio::spawn(
            drain(
                stdout,
                LogStream::Stdout,
                log.clone(),
                self.classifier.clone(),
            )
            .in_current_span(),
        );
        let stderr_task = tokio::spawn(
            drain(
                stderr,
                LogStream::Stderr,
                log.clone(),
                self.classifier.clone(),
            )
            .in_current_span(),
        );

        let wait = child.wait();
        tokio::pin!(wait);

        // Only the script itself is raced against the deadline and stop
        // requests. Once it has been reaped its status stands.
        let (status, termination) = tokio::select! {
            biased;
            status = &mut wait => (status, None),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout = ?self.config.timeout, "Script timed out, killing it");
                process::kill_process_group(pid);
                (wait.await, Some(RunOutcome::TimedOut))
            }
            _ = cancel.cancelled() => {
                warn!("Stop requested, killing script");
                process::kill_process_group(pid);
                (wait.await, Some(RunOutcome::Stopped))
            }
        };
        finish_drains([stdout_task, stderr_task], self.drain_grace).await;
        group.armed = false;

        let RunLog { lines, output } = std::mem::take(&mut *log.lock());
        let mut result = ExecutionResult {
            run_id,
            event: event.to_string(),
            output,
            exit_code: 0,
            error: None,
            logs: lines,
            outcome: RunOutcome::Succeeded,
            started_at,
            finished_at: Utc::now(),
        };

        match status {
            Ok(status) => result.exit_code = process::exit_code(&status),
            Err(e) => {
                result.exit_code = -1;
                result.error = Some(format!("failed to wait for script: {}", e));
                result.outcome = RunOutcome::Failed;
            }
        }

        match termination {
            Some(RunOutcome::TimedOut) => {
                result.exit_code = TIMEOUT_EXIT_CODE;
                result.error = Some(format!(
                    "script timed out after {:?}",
                    self.config.timeout
                ));
                result.outcome = RunOutcome::TimedOut;
            }
            Some(outcome) => {
                result.error = Some("script stopped by request".to_string());
                result.outcome = outcome;
            }
            None if result.error.is_some() => {}
            None if result.exit_code == 0 => {}
            None => {
                result.error = Some(format!("exit status {}", result.exit_code));
                result.outcome = RunOutcome::Failed;
            }
        }

        let duration_ms = (result.finished_at - result.started_at).num_milliseconds();
        if result.is_success() {
            info!(duration_ms, lines = result.logs.len(), "Script finished");
        } else {
            warn!(
                duration_ms,
                exit_code = result.exit_code,
                outcome = ?result.outcome,
                error = ?result.error,
                "Script did not succeed"
            );
        }

        Ok(result)
    }
}

#[async_trait]
impl ScriptRunner for ScriptExecutor {
    async fn execute(&self, event: &str, env: EnvVars) -> Result<ExecutionResult> {
        ScriptExecutor::execute(self, event, env).await
    }

    fn stop(&self, event: &str) -> Result<usize> {
        let stopped = self.registry.stop_event(event)?;
        info!(event, stopped, "Stop requested");
        Ok(stopped)
    }

    fn stop_run(&self, id: RunId) -> Result<()> {
        self.registry.stop_run(id)?;
        info!(run_id = %id, "Stop requested");
        Ok(())
    }

    fn stop_all(&self) -> usize {
        let stopped = self.registry.stop_all();
        info!(stopped, "Stop requested for all runs");
        stopped
    }

    fn running(&self) -> Vec<RunInfo> {
        self.registry.snapshot()
    }
}

/// Kills the run's process group if the run is abandoned before the child
/// has been reaped (caller dropped the future, or a setup step failed).
struct GroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            process::kill_process_group(self.pid);
        }
    }
}

#[derive(Default)]
struct RunLog {
    lines: Vec<LogLine>,
    output: String,
}

impl RunLog {
    fn push(&mut self, line: LogLine) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        self.output.push_str(&line.content);
        self.lines.push(line);
    }
}

/// Wait up to `grace` for the drain tasks, then abort the ones still reading.
async fn finish_drains(tasks: [JoinHandle<()>; 2], grace: Duration) {
    let deadline = Instant::now() + grace;
    for mut task in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Output drain task ended abnormally"),
            Err(_) => {
                debug!("Output pipe still held by a leftover process, abandoning it");
                task.abort();
            }
        }
    }
}

/// Read `reader` line by line into the shared log until end of stream.
async fn drain<R>(
    reader: R,
    stream: LogStream,
    log: Arc<Mutex<RunLog>>,
    classifier: Arc<dyn LineClassifier>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let content = line.trim_end();
                if content.trim().is_empty() {
                    continue;
                }

                let level = classifier.classify(content);
                match level {
                    LineLevel::Error => error!(%stream, "{}", content),
                    LineLevel::Info => info!(%stream, "{}", content),
                }

                log.lock().push(LogLine {
                    timestamp: Utc::now(),
                    stream,
                    level,
                    content: content.to_string(),
                });
            }
            Err(e) => {
                warn!(%stream, error = %e, "Error reading script output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) {
        std::fs::write(dir.path().join(name), format!("#!/bin/bash\n{}\n", body)).unwrap();
    }

    fn executor(dir: &TempDir, max_concurrent: usize) -> ScriptExecutor {
        ScriptExecutor::new(
            ExecutorConfig::new(dir.path())
                .with_timeout(Duration::from_secs(20))
                .with_max_concurrent(max_concurrent),
        )
    }

    async fn wait_until_running(executor: &ScriptExecutor, event: &str) {
        for _ in 0..500 {
            if executor.is_running(event) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never started", event);
    }

    #[tokio::test]
    async fn test_successful_run_captures_both_streams() {
        let dir = TempDir::new().unwrap();
        write_script(
            &dir,
            "deploy.sh",
            r#"echo "hexo generate"
echo ""
echo "   "
echo "error: missing theme" >&2
echo done"#,
        );
        let executor = executor(&dir, 2);

        let result = executor.execute("deploy.sh", Vec::new()).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert!(result.error.is_none());
        assert_eq!(result.event, "deploy.sh");
        assert_eq!(result.logs.len(), 3, "blank lines are dropped: {:?}", result.logs);
        assert!(result.output.contains("hexo generate"));
        assert!(result.output.contains("done"));

        let stderr: Vec<_> = result
            .logs
            .iter()
            .filter(|l| l.stream == LogStream::Stderr)
            .collect();
        assert_eq!(stderr.len(), 1);
        assert_eq!(stderr[0].level, LineLevel::Error);
        assert_eq!(stderr[0].content, "error: missing theme");

        let stdout_levels: Vec<_> = result
            .logs
            .iter()
            .filter(|l| l.stream == LogStream::Stdout)
            .map(|l| l.level)
            .collect();
        assert_eq!(stdout_levels, vec![LineLevel::Info, LineLevel::Info]);

        assert!(executor.registry().is_empty());
        assert_eq!(executor.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_stdout_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "count.sh", "for i in $(seq 1 200); do echo \"line $i\"; done");
        let executor = executor(&dir, 1);

        let result = executor.execute("count.sh", Vec::new()).await.unwrap();

        let lines: Vec<_> = result.logs.iter().map(|l| l.content.clone()).collect();
        let expected: Vec<_> = (1..=200).map(|i| format!("line {}", i)).collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result_not_an_error() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "fail.sh", "echo building\nexit 3");
        let executor = executor(&dir, 1);

        let result = executor.execute("fail.sh", Vec::new()).await.unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.outcome, RunOutcome::Failed);
        assert_eq!(result.error.as_deref(), Some("exit status 3"));
        assert_eq!(result.output, "building");
        assert!(!executor.is_running("fail.sh"));
    }

    #[tokio::test]
    async fn test_missing_script_consumes_no_slot() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, 2);

        let err = executor.execute("absent.sh", Vec::new()).await.unwrap_err();

        assert!(matches!(err, Error::ScriptNotFound(path) if path.ends_with("absent.sh")));
        assert_eq!(executor.available_slots(), 2);
        assert!(executor.registry().is_empty());
    }

    #[tokio::test]
    async fn test_script_names_cannot_escape_the_directory() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, 1);

        for name in ["", ".", "..", "../etc/passwd", "sub/deploy.sh", "/bin/ls"] {
            let err = executor.execute(name, Vec::new()).await.unwrap_err();
            assert!(
                matches!(err, Error::InvalidScriptName(_)),
                "{:?} gave {:?}",
                name,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_directories_are_not_scripts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("hooks")).unwrap();
        let executor = executor(&dir, 1);

        let err = executor.execute("hooks", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::ScriptNotFound(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_script() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "slow.sh", "echo $$ > pid\necho started\nsleep 30");
        let executor = ScriptExecutor::new(
            ExecutorConfig::new(dir.path()).with_timeout(Duration::from_millis(300)),
        );

        let start = std::time::Instant::now();
        let result = executor.execute("slow.sh", Vec::new()).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.outcome, RunOutcome::TimedOut);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(result.output, "started");
        assert!(!executor.is_running("slow.sh"));
        assert_eq!(executor.available_slots(), 5);

        let pid: i32 = std::fs::read_to_string(dir.path().join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "sleep.sh", "sleep 0.5");
        let executor = Arc::new(executor(&dir, 2));

        let start = std::time::Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.execute("sleep.sh", Vec::new()).await })
            })
            .collect();

        let mut max_live = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            max_live = max_live.max(executor.registry().len());
            assert!(executor.available_slots() <= 2);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let results = futures::future::join_all(handles).await;
        for result in results {
            assert!(result.unwrap().unwrap().is_success());
        }

        assert_eq!(max_live, 2);
        // The third run could only start once one of the first two released its slot.
        assert!(start.elapsed() >= Duration::from_millis(950));
        assert_eq!(executor.available_slots(), 2);
        assert!(executor.registry().is_empty());
    }

    fn kill_leftover(dir: &TempDir, pid_file: &str) {
        let pid: i32 = std::fs::read_to_string(dir.path().join(pid_file))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let _ = kill(Pid::from_raw(pid), nix::sys::signal::Signal::SIGKILL);
    }

    #[tokio::test]
    async fn test_timeout_does_not_wait_for_escaped_descendants() {
        let dir = TempDir::new().unwrap();
        // The detached sleep leaves the process group but keeps stdout open.
        write_script(&dir, "daemon.sh", "setsid sleep 6 &
echo $! > bg
echo hi
sleep 30");
        let executor = ScriptExecutor::new(
            ExecutorConfig::new(dir.path()).with_timeout(Duration::from_millis(300)),
        );

        let start = std::time::Instant::now();
        let result = executor.execute("daemon.sh", Vec::new()).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
        assert_eq!(result.outcome, RunOutcome::TimedOut);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.output, "hi");
        assert!(executor.registry().is_empty());
        assert_eq!(executor.available_slots(), 5);

        kill_leftover(&dir, "bg");
    }

    #[tokio::test]
    async fn test_background_job_does_not_hide_exit_status() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "serve.sh", "sleep 3 &
echo $! > bg
echo deployed
exit 0");
        let executor = ScriptExecutor::new(
            ExecutorConfig::new(dir.path()).with_timeout(Duration::from_secs(2)),
        );

        let start = std::time::Instant::now();
        let result = executor.execute("serve.sh", Vec::new()).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
        assert_eq!(result.output, "deployed");

        // The background job is left alone.
        let bg: i32 = std::fs::read_to_string(dir.path().join("bg"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(kill(Pid::from_raw(bg), None).is_ok());
        kill_leftover(&dir, "bg");
    }

    #[tokio::test]
    async fn test_stop_after_exit_keeps_real_status() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "quick.sh", "sleep 5 &
echo $! > bg
echo deployed
exit 0");
        let executor = Arc::new(executor(&dir, 1).with_drain_grace(Duration::from_secs(2)));

        let handle = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute("quick.sh", Vec::new()).await })
        };
        wait_until_running(&executor, "quick.sh").await;
        // The script has exited; the run is only waiting on the held pipe.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ScriptRunner::stop(executor.as_ref(), "quick.sh").unwrap(), 1);

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
        assert!(executor.registry().is_empty());

        kill_leftover(&dir, "bg");
    }

    #[tokio::test]
    async fn test_stop_terminates_a_running_script() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "long.sh", "echo running\nsleep 30");
        let executor = Arc::new(executor(&dir, 2));

        let handle = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute("long.sh", Vec::new()).await })
        };
        wait_until_running(&executor, "long.sh").await;

        assert_eq!(ScriptRunner::stop(executor.as_ref(), "long.sh").unwrap(), 1);

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.outcome, RunOutcome::Stopped);
        assert_eq!(result.exit_code, 128 + 9);
        assert!(result.error.is_some());
        assert!(!executor.is_running("long.sh"));
    }

    #[tokio::test]
    async fn test_stop_without_running_script_errors() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "deploy.sh", "true");
        let executor = executor(&dir, 1);

        let err = ScriptRunner::stop(&executor, "deploy.sh").unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_stop_all_and_stop_run() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "a.sh", "sleep 30");
        write_script(&dir, "b.sh", "sleep 30");
        write_script(&dir, "c.sh", "sleep 30");
        let executor = Arc::new(executor(&dir, 3));

        let spawn = |name: &'static str| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(name, Vec::new()).await })
        };
        let a = spawn("a.sh");
        let b = spawn("b.sh");
        let c = spawn("c.sh");
        for name in ["a.sh", "b.sh", "c.sh"] {
            wait_until_running(&executor, name).await;
        }

        let c_id = ScriptRunner::running(executor.as_ref())
            .into_iter()
            .find(|run| run.event == "c.sh")
            .map(|run| run.id)
            .unwrap();
        ScriptRunner::stop_run(executor.as_ref(), c_id).unwrap();
        assert_eq!(c.await.unwrap().unwrap().outcome, RunOutcome::Stopped);

        assert_eq!(ScriptRunner::stop_all(executor.as_ref()), 2);
        assert_eq!(a.await.unwrap().unwrap().outcome, RunOutcome::Stopped);
        assert_eq!(b.await.unwrap().unwrap().outcome, RunOutcome::Stopped);
        assert!(executor.registry().is_empty());
    }

    #[tokio::test]
    async fn test_environment_layering() {
        let dir = TempDir::new().unwrap();
        write_script(
            &dir,
            "env.sh",
            r#"echo "A=$A B=$B C=$C"
echo "PATH_SET=${PATH:+yes}"
pwd -P"#,
        );
        let executor = ScriptExecutor::new(
            ExecutorConfig::new(dir.path()).with_default_env(vec![
                ("A".to_string(), "default".to_string()),
                ("B".to_string(), "default".to_string()),
            ]),
        );

        let result = executor
            .execute(
                "env.sh",
                vec![
                    ("B".to_string(), "payload".to_string()),
                    ("C".to_string(), "c".to_string()),
                ],
            )
            .await
            .unwrap();

        let lines: Vec<_> = result.logs.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(lines[0], "A=default B=payload C=c");
        assert_eq!(lines[1], "PATH_SET=yes");
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(lines[2], cwd.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "out.sh", "echo '!alert'\necho 'error: plain'");
        let executor = executor(&dir, 1).with_classifier(|line: &str| {
            if line.starts_with('!') {
                LineLevel::Error
            } else {
                LineLevel::Info
            }
        });

        let result = executor.execute("out.sh", Vec::new()).await.unwrap();

        let levels: Vec<_> = result.logs.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![LineLevel::Error, LineLevel::Info]);
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_captured_lossily() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "bin.sh", "printf 'ok \\xff\\n'\necho after");
        let executor = executor(&dir, 1);

        let result = executor.execute("bin.sh", Vec::new()).await.unwrap();

        assert_eq!(result.logs.len(), 2);
        assert!(result.logs[0].content.starts_with("ok "));
        assert_eq!(result.logs[1].content, "after");
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_runs() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "deploy.sh", "true");
        let executor = executor(&dir, 1);

        assert_eq!(executor.shutdown(), 0);
        let err = executor.execute("deploy.sh", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::ExecutorClosed));
    }

    #[tokio::test]
    async fn test_missing_shell_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "deploy.sh", "true");
        let executor = ScriptExecutor::new(
            ExecutorConfig::new(dir.path()).with_shell("/nonexistent/shell"),
        );

        let err = executor.execute("deploy.sh", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
        assert!(executor.registry().is_empty());
        assert_eq!(executor.available_slots(), 5);
    }
}
