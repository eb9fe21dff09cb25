//! Job manifests.
//!
//! A manifest lists the jobs for one `trackq run`. Each job is either a single
//! external command or a playlist of commands processed one after another:
//!
//! ```yaml
//! jobs:
//!   - id: single-track
//!     priority: 0
//!     timeout: 10m
//!     command: yt-dlp
//!     args: ["-x", "--audio-format", "flac", "https://example.com/watch?v=1"]
//!   - id: album
//!     playlist:
//!       - command: yt-dlp
//!         args: ["-x", "https://example.com/watch?v=2"]
//!       - command: yt-dlp
//!         args: ["-x", "https://example.com/watch?v=3"]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use trackq_core::jobs::{
    CompositeJob, JobContext, JobError, JobResult, JobSpec, Sequencer, SubItem, Work,
};

/// Parsed manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

/// One job of a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    /// Job id; generated when missing
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub priority: Option<i64>,

    /// Per-attempt timeout, e.g. "90s". For a playlist it is the default for
    /// items without their own.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Program to run for a single job
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Ordered items for a playlist job
    #[serde(default)]
    pub playlist: Option<Vec<PlaylistEntry>>,
}

/// One item of a playlist job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl JobEntry {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Short description for tables.
    pub fn kind(&self) -> String {
        match &self.playlist {
            Some(items) => format!("playlist ({} items)", items.len()),
            None => format!("command ({})", self.command.as_deref().unwrap_or("?")),
        }
    }

    /// Build the scheduler job for this entry.
    ///
    /// Playlists become self-managed jobs: the sequencer applies timeouts and
    /// retries per item, so the scheduler never times out or replays the list.
    pub fn to_spec(&self, sequencer: &Sequencer) -> JobSpec {
        let mut spec = match &self.playlist {
            Some(items) => CompositeJob::new(self.id())
                .with_items(
                    items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| item.to_sub_item(index, self.timeout)),
                )
                .into_spec(sequencer.clone()),
            None => {
                let spec = JobSpec::new(
                    self.id(),
                    command_work(
                        self.command.clone().unwrap_or_default(),
                        self.args.clone(),
                        self.env.clone(),
                    ),
                );
                match self.timeout {
                    Some(timeout) => spec.with_timeout(timeout),
                    None => spec,
                }
            }
        }
        .with_metadata(self.metadata.clone());

        if let Some(priority) = self.priority {
            spec = spec.with_priority(priority);
        }
        spec
    }
}

impl PlaylistEntry {
    fn to_sub_item(&self, index: usize, default_timeout: Option<Duration>) -> SubItem {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| format!("item-{}", index + 1));
        let mut item = SubItem::new(
            id,
            command_work(self.command.clone(), self.args.clone(), self.env.clone()),
        )
        .with_metadata(self.metadata.clone());
        if let Some(timeout) = self.timeout.or(default_timeout) {
            item = item.with_timeout(timeout);
        }
        item
    }
}

impl Manifest {
    /// Load a manifest, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut manifest: Manifest = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            other => bail!("Unsupported manifest format '{}' (use yaml, toml or json)", other),
        };

        manifest.assign_missing_ids();
        manifest.validate()?;
        Ok(manifest)
    }

    fn assign_missing_ids(&mut self) {
        for job in &mut self.jobs {
            if job.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                job.id = Some(uuid::Uuid::new_v4().to_string());
            }
        }
    }

    /// Check every job names exactly one kind of work and ids are unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            let id = job.id();
            if !seen.insert(id) {
                bail!("Duplicate job id '{}'", id);
            }
            match (&job.command, &job.playlist) {
                (Some(_), Some(_)) => {
                    bail!("Job '{}' has both a command and a playlist", id)
                }
                (None, None) => bail!("Job '{}' needs a command or a playlist", id),
                (Some(command), None) if command.trim().is_empty() => {
                    bail!("Job '{}' has an empty command", id)
                }
                (None, Some(items)) => {
                    if let Some(item) = items.iter().find(|i| i.command.trim().is_empty()) {
                        bail!(
                            "Playlist '{}' has an item with an empty command ({})",
                            id,
                            item.id.as_deref().unwrap_or("unnamed")
                        );
                    }
                }
                _ => {}
            }
            if job.timeout == Some(Duration::ZERO) {
                bail!("Job '{}' has a zero timeout", id);
            }
            let zero_item = job
                .playlist
                .iter()
                .flatten()
                .any(|item| item.timeout == Some(Duration::ZERO));
            if zero_item {
                bail!("Playlist '{}' has an item with a zero timeout", id);
            }
        }
        Ok(())
    }
}

/// Unit of work that runs an external program once per attempt.
pub fn command_work(
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
) -> impl Work {
    move |ctx: JobContext| {
        let program = program.clone();
        let args = args.clone();
        let env = env.clone();
        async move { run_command(&program, &args, &env, &ctx).await }
    }
}

async fn run_command(
    program: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    ctx: &JobContext,
) -> JobResult {
    ctx.log_info(&format!("running {}", program));
    let child = tokio::process::Command::new(program)
        .args(args)
        .envs(env)
        .env("TRACKQ_JOB_ID", ctx.job_id().as_str())
        .env("TRACKQ_ATTEMPT", ctx.attempt().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| JobError::execution(format!("failed to start {}: {}", program, e)))?;

    let output = tokio::select! {
        output = child.wait_with_output() => output
            .map_err(|e| JobError::execution(format!("failed to wait for {}: {}", program, e)))?,
        _ = ctx.cancellation().cancelled() => return Err(JobError::cancelled()),
    };

    let stdout = tail(&output.stdout);
    if output.status.success() {
        return Ok(serde_json::json!({ "exit_code": 0, "stdout": stdout }));
    }

    let code = output.status.code();
    ctx.log_warn(&format!("{} exited with {}", program, output.status));
    let mut error = JobError::execution(format!("{} exited with {}", program, output.status))
        .with_context(serde_json::json!({ "stderr": tail(&output.stderr) }));
    if let Some(code) = code {
        error = error.with_code(format!("EXIT_{}", code));
    }
    Err(error)
}

/// Last few lines of process output.
fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}
