//! JSON-lines manifest of training runs.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use eta_pipeline::{model::Evaluation, TrainingReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunManifestEntry {
    pub job_id: String,
    pub submitted_at: DateTime<Utc>,
    pub config: PathBuf,
    pub data: PathBuf,
    pub artifacts: PathBuf,
    pub log_path: PathBuf,
    pub status: RunStatus,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Run id stamped on the artifacts, once training succeeds.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunManifestEntry {
    pub fn new(config: PathBuf, data: PathBuf, artifacts: PathBuf, log_path: PathBuf) -> Self {
        Self {
            job_id: format!("job-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            config,
            data,
            artifacts,
            log_path,
            status: RunStatus::Queued,
            finished_at: None,
            run_id: None,
            model: None,
            evaluation: None,
            error: None,
        }
    }

    /// Matches either the manifest job id or the artifact run id.
    pub fn matches(&self, id: &str) -> bool {
        self.job_id == id || self.run_id.is_some_and(|run| run.to_string() == id)
    }

    pub fn complete(&mut self, report: &TrainingReport) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.run_id = Some(report.run_id);
        self.model = Some(report.selected.clone());
        self.evaluation = report.selected_candidate().map(|c| c.evaluation);
    }

    pub fn fail(&mut self, error: &anyhow::Error) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(format!("{error:#}"));
    }
}

pub fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: RunManifestEntry = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Rewrites the entry with `job_id`; returns false when it is absent.
pub fn update_entry(path: &Path, job_id: &str, apply: impl FnOnce(&mut RunManifestEntry)) -> Result<bool> {
    let mut entries = read_manifest(path)?;
    let Some(entry) = entries.iter_mut().find(|e| e.job_id == job_id) else {
        return Ok(false);
    };
    apply(entry);
    let temp = path.with_extension("jsonl.tmp");
    {
        let mut file = File::create(&temp)?;
        for entry in &entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(true)
}
