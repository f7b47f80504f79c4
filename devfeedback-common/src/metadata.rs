//! Host, repository and toolchain metadata for outbound reports.

use crate::types::{CommonMetadata, UNKNOWN_VALUE};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::process::Command;
use tracing::debug;

/// Supplies the metadata merged into every report.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Build a fresh metadata record for a measurement of `time_taken` ms.
    ///
    /// `custom_identifier` falls back to `npm_lifecycle_event` when `None`.
    async fn metadata(&self, time_taken: f64, custom_identifier: Option<&str>) -> CommonMetadata;
}

/// Facts about the machine that do not change while the daemon runs.
#[derive(Debug, Clone)]
pub struct HostFacts {
    pub cpu_count: usize,
    pub cpu_models: Vec<String>,
    pub cpu_speed: Vec<u64>,
    pub total_memory: u64,
    pub hostname: String,
    pub platform: String,
    pub os: String,
    pub node_version: String,
    pub v8_version: String,
}

impl HostFacts {
    pub async fn detect() -> Self {
        let (node_version, v8_version) = tokio::join!(
            run_command("node", &["--version"], None),
            run_command("node", &["-p", "process.versions.v8"], None),
        );
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_memory(MemoryRefreshKind::everything())
                .with_cpu(CpuRefreshKind::everything()),
        );

        let cpus = system.cpus();
        Self {
            cpu_count: cpus.len(),
            cpu_models: cpus.iter().map(|cpu| cpu.brand().to_string()).collect(),
            cpu_speed: cpus.iter().map(|cpu| cpu.frequency()).collect(),
            total_memory: system.total_memory(),
            hostname: System::host_name().unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            platform: platform_name().to_string(),
            os: System::kernel_version().unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            node_version: node_version.unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            v8_version: v8_version.unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
        }
    }
}

/// Name of the OS family in the form Node's `os.type()` reports it.
fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows_NT",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

/// Metadata provider backed by the real host and the project's git checkout.
pub struct HostMetadata {
    root: PathBuf,
    facts: HostFacts,
}

impl HostMetadata {
    pub async fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_facts(root, HostFacts::detect().await)
    }

    pub fn with_facts(root: impl Into<PathBuf>, facts: HostFacts) -> Self {
        Self {
            root: root.into(),
            facts,
        }
    }

    async fn git(&self, args: &[&str]) -> Option<String> {
        run_command("git", args, Some(&self.root)).await
    }
}

#[async_trait]
impl MetadataProvider for HostMetadata {
    async fn metadata(&self, time_taken: f64, custom_identifier: Option<&str>) -> CommonMetadata {
        // Branch and commit move while the dev server runs; ask git each time.
        let (repository, branch, commit_sha) = tokio::join!(
            self.git(&["config", "--get", "remote.origin.url"]),
            self.git(&["rev-parse", "--abbrev-ref", "HEAD"]),
            self.git(&["rev-parse", "HEAD"]),
        );
        let repository_name = repository
            .as_deref()
            .map(repo_name_from_url)
            .unwrap_or_else(|| UNKNOWN_VALUE.to_string());
        let now = Utc::now();

        CommonMetadata {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: resolve_user_name(),
            cpu_count: self.facts.cpu_count,
            hostname: self.facts.hostname.clone(),
            platform: self.facts.platform.clone(),
            os: self.facts.os.clone(),
            time_taken,
            branch: branch.unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            project_name: repository_name.clone(),
            repository: repository.unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            repository_name,
            timestamp: Some(now.timestamp_millis()),
            built_at: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            total_memory: self.facts.total_memory,
            cpu_models: self.facts.cpu_models.clone(),
            cpu_speed: self.facts.cpu_speed.clone(),
            node_version: self.facts.node_version.clone(),
            v8_version: self.facts.v8_version.clone(),
            commit_sha: commit_sha.unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            custom_identifier: Some(resolve_custom_identifier(custom_identifier)),
        }
    }
}

/// Repository name from a remote URL: last path segment without `.git`.
pub fn repo_name_from_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let name = url.rsplit(['/', ':']).next().unwrap_or(url);
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        UNKNOWN_VALUE.to_string()
    } else {
        name.to_string()
    }
}

/// CI login first (GitLab, then GitHub), then the OS account.
fn resolve_user_name() -> String {
    ["GITLAB_USER_LOGIN", "GITHUB_ACTOR", "USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

fn resolve_custom_identifier(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("npm_lifecycle_event").ok())
        .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

/// Run a command and return its trimmed stdout, or `None` on any failure.
async fn run_command(program: &str, args: &[&str], cwd: Option<&Path>) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    match command.output().await {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if text.is_empty() { None } else { Some(text) }
        }
        Ok(output) => {
            debug!(program, ?args, status = %output.status, "metadata command failed");
            None
        }
        Err(e) => {
            debug!(program, ?args, "metadata command unavailable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_facts() -> HostFacts {
        HostFacts {
            cpu_count: 2,
            cpu_models: vec!["Test CPU".to_string(), "Test CPU".to_string()],
            cpu_speed: vec![2400, 2400],
            total_memory: 8 * 1024 * 1024 * 1024,
            hostname: "ci-runner".to_string(),
            platform: "Linux".to_string(),
            os: "6.1.0".to_string(),
            node_version: "v20.11.0".to_string(),
            v8_version: "11.3.244.8".to_string(),
        }
    }

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(repo_name_from_url("git@github.com:acme/shop-web.git"), "shop-web");
        assert_eq!(repo_name_from_url("https://gitlab.example.com/team/api"), "api");
        assert_eq!(repo_name_from_url("https://example.com/team/api/"), "api");
        assert_eq!(repo_name_from_url(""), UNKNOWN_VALUE);
    }

    #[tokio::test]
    async fn test_metadata_outside_git_repository_uses_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let provider = HostMetadata::with_facts(dir.path(), fixed_facts());

        let metadata = provider.metadata(42.5, Some("start")).await;
        assert_eq!(metadata.time_taken, 42.5);
        assert_eq!(metadata.custom_identifier.as_deref(), Some("start"));
        assert_eq!(metadata.hostname, "ci-runner");
        assert_eq!(metadata.cpu_count, 2);
        assert_eq!(metadata.repository, UNKNOWN_VALUE);
        assert_eq!(metadata.repository_name, UNKNOWN_VALUE);
        assert_eq!(metadata.commit_sha, UNKNOWN_VALUE);
        assert!(metadata.timestamp.is_some());
        assert!(uuid::Uuid::parse_str(&metadata.id).is_ok());
    }

    #[tokio::test]
    async fn test_each_record_gets_a_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let provider = HostMetadata::with_facts(dir.path(), fixed_facts());
        let a = provider.metadata(1.0, None).await;
        let b = provider.metadata(1.0, None).await;
        assert_ne!(a.id, b.id);
        assert!(a.custom_identifier.is_some());
    }

    #[tokio::test]
    async fn test_missing_program_yields_none() {
        assert_eq!(
            run_command("devfeedback-no-such-binary", &["--version"], None).await,
            None
        );
    }
}
