use jmtcore::{
    error::ValueError,
    task::{
        Task,
        TaskStatus,
    },
};
use jmttqs::process::{
    ProcessHandle,
    read_capped,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    path::PathBuf,
    process::Stdio,
};
use tokio::process::Command;

use crate::{
    error::PlatformError,
    settings::Settings,
};

/// What became of one report-generation request.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReportOutcome {
    pub task_id: i64,
    pub report_path: Option<String>,
    pub success: bool,
    pub message: String,
}

/// Render the HTML report for a completed task's result log.
///
/// Renderer trouble is reported inside the outcome, never as an error;
/// a completed run stays completed whatever happens here.  Errors are
/// reserved for requests that should not have been made at all.
pub(crate) async fn generate(
    settings: &Settings,
    task: &Task,
) -> Result<ReportOutcome, PlatformError> {
    if task.status() != TaskStatus::Completed {
        return Err(PlatformError::Validation(
            format!("report requested for task {} which has not completed", task.id)
        ));
    }
    let output_path = PathBuf::from(task.output_path
        .as_deref()
        .ok_or(ValueError::UninitializedAttribute("task missing output path"))?
    );
    if !output_path.is_file() {
        return Err(PlatformError::NotFound(
            format!("result log not found: {}", output_path.display())
        ));
    }
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PlatformError::Validation(
            format!("unusable result log name: {}", output_path.display())
        ))?;

    std::fs::create_dir_all(&settings.report_root)?;
    let report_dir = settings.report_root.join(stem);
    if report_dir.exists() {
        log::info!("removing existing report directory: {}", report_dir.display());
        std::fs::remove_dir_all(&report_dir)?;
    }
    let stderr_path = settings.report_root.join(format!("{stem}.stderr"));
    let stderr_file = File::create(&stderr_path)?;

    let mut command = Command::new(settings.jmeter_bin());
    command
        .arg("-g")
        .arg(&output_path)
        .arg("-o")
        .arg(&report_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file));
    log::info!("rendering report for task {} into {}", task.id, report_dir.display());

    let handle = match ProcessHandle::spawn(&mut command) {
        Ok(handle) => handle,
        Err(e) => return Ok(ReportOutcome {
            task_id: task.id,
            report_path: None,
            success: false,
            message: format!("report renderer failed to start: {e}"),
        }),
    };
    match handle.wait(settings.report_timeout()).await {
        Ok(outcome) if outcome.exit_status == 0 => Ok(ReportOutcome {
            task_id: task.id,
            report_path: Some(report_dir.to_string_lossy().into_owned()),
            success: true,
            message: format!(
                "report rendered in {:.2}s",
                outcome.elapsed.as_secs_f64(),
            ),
        }),
        Ok(outcome) => {
            let stderr = read_capped(&stderr_path).unwrap_or_default();
            Ok(ReportOutcome {
                task_id: task.id,
                report_path: None,
                success: false,
                message: format!(
                    "report renderer exited with {}: {}",
                    outcome.exit_status,
                    stderr.trim(),
                ),
            })
        }
        Err(e) => Ok(ReportOutcome {
            task_id: task.id,
            report_path: None,
            success: false,
            message: format!("report renderer did not finish: {e}"),
        }),
    }
}
