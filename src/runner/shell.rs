//! Shell subprocess runner - executes commands the way a CI worker does

use crate::runner::{
    CommandOutcome, CommandRunner, Invocation, OutputSink, OutputStream, RunnerConfig, RunnerError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs each command in a fresh shell, carrying exported variables over
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell executable (e.g. "bash", "/bin/sh")
    shell: String,

    /// Timeout for a single command in seconds
    timeout_secs: u64,
}

impl ShellRunner {
    /// Create a runner from configuration
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            shell: config.resolve_shell(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Wrap a command so its final environment is dumped to `dump`
    ///
    /// The command's own exit status is preserved.
    fn wrap(command: &str, dump: &Path) -> String {
        format!(
            "{}\n__cirun_status=$?\nenv -0 > '{}' 2>/dev/null\nexit $__cirun_status\n",
            command,
            dump.display()
        )
    }

    async fn read_exports(dump: &Path, baseline: &HashMap<String, String>) -> HashMap<String, String> {
        let exported = match tokio::fs::read(dump).await {
            Ok(bytes) => parse_env_dump(&bytes)
                .into_iter()
                .filter(|(k, v)| baseline.get(k) != Some(v))
                .collect(),
            Err(_) => HashMap::new(),
        };
        let _ = tokio::fs::remove_file(dump).await;
        exported
    }
}

/// Kills the shell's whole process group when dropped, unless released
///
/// The shell forks the user's commands, so killing the shell alone would
/// leave them running.
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            #[cfg(unix)]
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
            debug!("Killed process group {}", pgid);
        }
    }

    /// The shell exited on its own; leave any background processes alone
    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Parse the NUL-separated output of `env -0`
pub fn parse_env_dump(bytes: &[u8]) -> HashMap<String, String> {
    bytes
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (name, value) = entry.split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn record_line(
    output: &mut String,
    sink: Option<&dyn OutputSink>,
    job: &str,
    stream: OutputStream,
    raw: Vec<u8>,
) {
    let line = String::from_utf8_lossy(&raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    if let Some(sink) = sink {
        sink.on_line(job, stream, line);
    }
    output.push_str(line);
    output.push('\n');
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, RunnerError> {
        debug!(
            "Spawning {} for job {}: {}",
            self.shell, invocation.job, invocation.command
        );

        let dump: PathBuf = std::env::temp_dir().join(format!("cirun-env-{}", Uuid::new_v4()));
        let started = Instant::now();

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(Self::wrap(&invocation.command, &dump))
            .envs(&invocation.env)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::Spawn(format!("{}: {}", self.shell, e)))?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Spawn("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Spawn("stderr was not captured".to_string()))?;

        let job = invocation.job.as_str();
        let collect = async {
            let mut out_lines = BufReader::new(stdout).split(b'\n');
            let mut err_lines = BufReader::new(stderr).split(b'\n');
            let mut output = String::new();
            let (mut out_done, mut err_done) = (false, false);

            while !(out_done && err_done) {
                tokio::select! {
                    line = out_lines.next_segment(), if !out_done => match line? {
                        Some(raw) => record_line(&mut output, sink, job, OutputStream::Stdout, raw),
                        None => out_done = true,
                    },
                    line = err_lines.next_segment(), if !err_done => match line? {
                        Some(raw) => record_line(&mut output, sink, job, OutputStream::Stderr, raw),
                        None => err_done = true,
                    },
                }
            }

            let status = child.wait().await?;
            Ok::<_, RunnerError>((status, output))
        };

        let result = timeout(Duration::from_secs(self.timeout_secs), collect).await;
        let (status, output) = match result {
            Ok(inner) => {
                let finished = inner?;
                group.release();
                finished
            }
            Err(_) => {
                warn!(
                    "Command timed out after {}s in job {}: {}",
                    self.timeout_secs, invocation.job, invocation.command
                );
                group.kill();
                let _ = tokio::fs::remove_file(&dump).await;
                return Err(RunnerError::Timeout(self.timeout_secs));
            }
        };

        let mut baseline: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        baseline.extend(invocation.env.clone());
        let exported = Self::read_exports(&dump, &baseline).await;

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            "Command exited with {} after {}ms",
            exit_code,
            started.elapsed().as_millis()
        );

        Ok(CommandOutcome {
            exit_code,
            output,
            duration_ms: started.elapsed().as_millis() as u64,
            exported,
        })
    }
}
