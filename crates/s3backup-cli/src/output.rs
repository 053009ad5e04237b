//! Human and JSON rendering of run results

use s3backup_core::domain::CountersSnapshot;
use s3backup_sync::{RetentionReport, UploadReport};
use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &Value) {}
}

/// JSON output formatter; only structured summaries reach stdout
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

pub fn counters_json(counters: &CountersSnapshot) -> Value {
    json!({
        "uploaded": counters.uploaded,
        "skipped": counters.skipped,
        "deleted": counters.deleted,
    })
}

pub fn retention_json(report: &RetentionReport) -> Value {
    json!({
        "success": report.is_success(),
        "scanned": report.scanned(),
        "deleted_local": report.deleted_local,
        "deleted_remote": report.deleted_remote,
        "groups": report.groups,
        "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "warnings": report.warnings,
    })
}

pub fn upload_json(report: &UploadReport, retention: Option<&RetentionReport>) -> Value {
    json!({
        "success": report.is_success(),
        "counters": counters_json(&report.counters),
        "error": report.error.as_ref().map(ToString::to_string),
        "retention": retention.map(retention_json),
    })
}

/// Prints a rotation summary in either format
pub fn render_retention(formatter: &dyn OutputFormatter, format: OutputFormat, report: &RetentionReport) {
    if format == OutputFormat::Json {
        formatter.print_json(&retention_json(report));
        return;
    }

    for (group, summary) in &report.groups {
        formatter.info(&format!("{group}: {} of {} deleted", summary.deleted, summary.scanned));
    }
    for warning in &report.warnings {
        formatter.warn(warning);
    }
    for err in &report.errors {
        formatter.error(&err.to_string());
    }
    formatter.success(&format!(
        "Rotation: {} local and {} remote backups deleted",
        report.deleted_local, report.deleted_remote
    ));
}

/// Prints an upload summary (and the rotation that preceded it)
pub fn render_upload(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    report: &UploadReport,
    retention: Option<&RetentionReport>,
) {
    if format == OutputFormat::Json {
        formatter.print_json(&upload_json(report, retention));
        return;
    }

    if let Some(retention) = retention {
        render_retention(formatter, format, retention);
    }
    let c = &report.counters;
    let line = format!("{} uploaded, {} skipped, {} deleted", c.uploaded, c.skipped, c.deleted);
    match &report.error {
        None => formatter.success(&format!("Upload complete: {line}")),
        Some(err) => {
            formatter.info(&line);
            formatter.error(&err.to_string());
        }
    }
}
