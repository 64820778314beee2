//! Executor driving the `terraform` binary

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ApplyReport, Executor, ExecutorConfig, ExecutorError, ExecutorFactory, Outputs};

/// Environment variable overriding the terraform binary
pub const TERRAFORM_BIN_ENV: &str = "TRELLIS_TERRAFORM_BIN";

/// Locate the terraform binary: `TRELLIS_TERRAFORM_BIN`, then `PATH`
pub fn terraform_binary() -> Result<PathBuf, ExecutorError> {
    if let Ok(bin) = std::env::var(TERRAFORM_BIN_ENV) {
        if !bin.is_empty() {
            return Ok(PathBuf::from(bin));
        }
    }
    which::which("terraform").map_err(|e| ExecutorError::BinaryNotFound(e.to_string()))
}

#[derive(Deserialize)]
struct RawOutput {
    value: Value,
}

/// Parse `terraform output -json` into output values
pub fn parse_outputs(json: &str) -> Result<Outputs, ExecutorError> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Outputs::new());
    }
    let raw: BTreeMap<String, RawOutput> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(|(name, o)| (name, o.value)).collect())
}

/// Executor running terraform as a child process in its working directory
#[derive(Debug)]
pub struct TerraformExecutor {
    binary: PathBuf,
    working_dir: PathBuf,
    verbose: bool,
    initialized: AtomicBool,
}

impl TerraformExecutor {
    /// Create an executor using the terraform found by [`terraform_binary`]
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::with_binary(terraform_binary()?, config)
    }

    /// Create an executor using a specific terraform binary
    pub fn with_binary(binary: PathBuf, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        if !config.working_dir.is_dir() {
            return Err(ExecutorError::MissingWorkingDir(config.working_dir));
        }
        Ok(Self {
            binary,
            working_dir: config.working_dir,
            verbose: config.verbose,
            initialized: AtomicBool::new(false),
        })
    }

    /// Binary this executor runs
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .kill_on_drop(true);
        cmd
    }

    fn describe(args: &[&str]) -> String {
        format!("terraform {}", args.join(" "))
    }

    fn ensure_initialized(&self) -> Result<(), ExecutorError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExecutorError::NotInitialized(self.working_dir.clone()))
        }
    }

    /// Run a command and capture stdout
    async fn run(&self, args: &[&str]) -> Result<String, ExecutorError> {
        debug!(command = %Self::describe(args), "running terraform");
        let output = self.command(args).output().await?;

        if !output.status.success() {
            return Err(ExecutorError::CommandFailed {
                command: Self::describe(args),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command, handing each stdout line to `on_line` as it arrives
    ///
    /// Returns the exit status and collected stderr.
    async fn stream(
        &self,
        args: &[&str],
        mut on_line: impl FnMut(&str),
    ) -> Result<(ExitStatus, String), ExecutorError> {
        debug!(command = %Self::describe(args), "running terraform");
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    on_line(&line);
                }
            }
            Ok::<_, std::io::Error>(())
        };

        let (stdout_result, stderr_result) = tokio::join!(read_stdout, collect_lines(stderr));
        stdout_result?;
        let stderr_lines = stderr_result?;

        let status = child.wait().await?;
        Ok((status, stderr_lines.join("\n")))
    }

    /// Run a command, echoing stdout when verbose
    async fn run_with_output(&self, args: &[&str]) -> Result<(), ExecutorError> {
        let verbose = self.verbose;
        let (status, stderr) = self
            .stream(args, |line| {
                if verbose {
                    println!("    {}", line);
                }
            })
            .await?;

        if !status.success() {
            return Err(ExecutorError::CommandFailed {
                command: Self::describe(args),
                message: stderr,
            });
        }
        Ok(())
    }
}

async fn collect_lines<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<String>> {
    let mut collected = Vec::new();
    if let Some(reader) = reader {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            collected.push(line);
        }
    }
    Ok(collected)
}

#[async_trait]
impl Executor for TerraformExecutor {
    fn working_dir(&self) -> PathBuf {
        self.working_dir.clone()
    }

    async fn init(&self) -> Result<(), ExecutorError> {
        info!(dir = %self.working_dir.display(), "initializing terraform");
        self.run_with_output(&["init", "-input=false", "-no-color"])
            .await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn outputs(&self) -> Result<Outputs, ExecutorError> {
        self.ensure_initialized()?;
        let stdout = self.run(&["output", "-json", "-no-color"]).await?;
        parse_outputs(&stdout)
    }

    async fn output(&self, name: &str) -> Result<Value, ExecutorError> {
        let mut outputs = self.outputs().await?;
        outputs
            .remove(name)
            .ok_or_else(|| ExecutorError::OutputNotFound(name.to_string()))
    }

    async fn apply(&self) -> Result<ApplyReport, ExecutorError> {
        self.ensure_initialized()?;
        let args = ["apply", "-auto-approve", "-input=false", "-json"];
        let verbose = self.verbose;
        let mut report = ApplyReport::default();

        let (status, stderr) = self
            .stream(&args, |line| {
                if let Some(message) = report.record(line) {
                    if verbose && !message.is_empty() {
                        println!("    {}", message);
                    }
                }
            })
            .await?;

        // A failed run that produced no per-resource failure is a command failure
        if !status.success() && report.is_success() {
            return Err(ExecutorError::CommandFailed {
                command: Self::describe(&args),
                message: stderr,
            });
        }

        info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "terraform apply finished"
        );
        Ok(report)
    }

    async fn destroy(&self) -> Result<(), ExecutorError> {
        self.ensure_initialized()?;
        self.run_with_output(&["destroy", "-auto-approve", "-input=false", "-no-color"])
            .await
    }
}

/// Factory creating [`TerraformExecutor`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct TerraformFactory;

impl ExecutorFactory for TerraformFactory {
    fn create(&self, config: ExecutorConfig) -> Result<Box<dyn Executor>, ExecutorError> {
        Ok(Box::new(TerraformExecutor::new(config)?))
    }
}
