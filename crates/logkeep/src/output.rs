//! Terminal output formatting

use colored::Colorize;
use logkeep_logs::WorkloadSummary;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

#[derive(Tabled)]
pub struct WorkloadRow {
    #[tabled(rename = "workload")]
    pub name: String,
    #[tabled(rename = "files")]
    pub files: usize,
    #[tabled(rename = "size")]
    pub size: String,
    #[tabled(rename = "latest")]
    pub latest: String,
}

/// JSON-friendly workload representation
#[derive(Serialize)]
pub struct WorkloadJson {
    pub name: String,
    pub files: usize,
    pub bytes: u64,
    pub latest: Option<String>,
}

impl From<&WorkloadSummary> for WorkloadJson {
    fn from(summary: &WorkloadSummary) -> Self {
        WorkloadJson {
            name: summary.name.clone(),
            files: summary.files,
            bytes: summary.bytes,
            latest: summary.latest.map(|d| d.to_string()),
        }
    }
}

impl From<&WorkloadSummary> for WorkloadRow {
    fn from(summary: &WorkloadSummary) -> Self {
        WorkloadRow {
            name: summary.name.cyan().to_string(),
            files: summary.files,
            size: format_bytes(summary.bytes),
            latest: summary
                .latest
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".dimmed().to_string()),
        }
    }
}

pub fn print_workload_table(workloads: &[WorkloadSummary]) {
    if is_json_mode() {
        let json: Vec<WorkloadJson> = workloads.iter().map(WorkloadJson::from).collect();
        match serde_json::to_string_pretty(&json) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
        return;
    }

    if workloads.is_empty() {
        print_info("No archived workloads");
        return;
    }

    let rows: Vec<WorkloadRow> = workloads.iter().map(WorkloadRow::from).collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1}G", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1}M", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.0}K", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print logs in JSON format if enabled
pub fn print_logs(lines: &[String]) {
    if is_json_mode() {
        match serde_json::to_string_pretty(&lines) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
        return;
    }

    for line in lines {
        println!("{}", line);
    }
}

/// JSON wrapper for generic responses
#[derive(Serialize)]
pub struct ResponseJson<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Print a success message in JSON format if enabled
pub fn print_success_json<T: Serialize>(message: &str, data: Option<T>) {
    if is_json_mode() {
        let response = ResponseJson {
            success: true,
            message: Some(message.to_string()),
            data,
        };
        if let Ok(json) = serde_json::to_string_pretty(&response) {
            println!("{}", json);
        }
    } else {
        print_success(message);
    }
}
