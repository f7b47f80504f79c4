//! Vitest run summaries.
//!
//! The reporter shim posts the finished files with their task trees; suites
//! are flattened into individual test cases named `"Suite > Inner > test"`.

use devfeedback_common::{
    CommonMetadata, ReportKind, TestCaseRecord, TestFileRecord, TestRunReport,
};
use serde::Deserialize;

const NAME_SEPARATOR: &str = " > ";

/// Result block attached to files and tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub state: Option<String>,
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub errors: Vec<TaskError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
}

/// A test or a suite. Anything that is not a `test` is walked as a suite.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitestTask {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub tasks: Vec<VitestTask>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitestFile {
    pub name: String,
    pub collect_duration: Option<f64>,
    pub setup_duration: Option<f64>,
    pub prepare_duration: Option<f64>,
    pub environment_load: Option<f64>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub tasks: Vec<VitestTask>,
}

/// Payload posted when a vitest run finishes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitestRun {
    pub vitest_version: Option<String>,
    pub mode: Option<String>,
    pub max_concurrency: Option<u32>,
    pub watch_mode: Option<bool>,
    pub test_environment: Option<String>,
    #[serde(default)]
    pub files: Vec<VitestFile>,
}

impl VitestRun {
    /// Sum of the per-file durations in milliseconds.
    pub fn total_duration(&self) -> f64 {
        self.files
            .iter()
            .filter_map(|file| file.result.as_ref().and_then(|r| r.duration))
            .sum()
    }

    pub fn file_records(&self) -> Vec<TestFileRecord> {
        self.files
            .iter()
            .map(|file| {
                let result = file.result.clone().unwrap_or_default();
                TestFileRecord {
                    name: file.name.clone(),
                    collect_duration: file.collect_duration,
                    setup_duration: file.setup_duration,
                    prepare_duration: file.prepare_duration,
                    environment_load: file.environment_load,
                    status: result.state,
                    start_time: result.start_time.unwrap_or(0.0),
                    duration: result.duration.unwrap_or(0.0),
                }
            })
            .collect()
    }

    pub fn test_cases(&self) -> Vec<TestCaseRecord> {
        let mut cases = Vec::new();
        for file in &self.files {
            flatten_tasks(&file.name, None, &file.tasks, &mut cases);
        }
        cases
    }

    /// Assemble the collector record.
    pub fn into_report(self, metadata: CommonMetadata, run_id: String) -> TestRunReport {
        let files = self.file_records();
        let testcases = self.test_cases();
        TestRunReport {
            metadata,
            kind: ReportKind::Vitest,
            vitest_version: self.vitest_version,
            mode: self.mode,
            max_concurrency: self.max_concurrency,
            watch_mode: self.watch_mode,
            test_environment: self.test_environment,
            run_id,
            files,
            testcases,
        }
    }
}

fn flatten_tasks(
    filename: &str,
    prefix: Option<&str>,
    tasks: &[VitestTask],
    out: &mut Vec<TestCaseRecord>,
) {
    for task in tasks {
        let name = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, NAME_SEPARATOR, task.name),
            None => task.name.clone(),
        };

        if task.kind != "test" {
            flatten_tasks(filename, Some(&name), &task.tasks, out);
            continue;
        }

        let result = task.result.clone().unwrap_or_default();
        let error_message = if result.errors.is_empty() {
            None
        } else {
            Some(result.errors.into_iter().map(|e| e.message).collect())
        };
        out.push(TestCaseRecord {
            name,
            status: result.state,
            start_time: result.start_time.unwrap_or(0.0),
            duration: result.duration.unwrap_or(0.0),
            error_message,
            filename: filename.to_string(),
        });
    }
}
