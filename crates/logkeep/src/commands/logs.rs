//! Logs command implementation

use anyhow::{bail, Result};
use logkeep_core::TimeRange;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::cli::LogsArgs;
use crate::output::print_logs;

#[derive(Deserialize)]
struct LogsBody {
    logs: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub async fn execute(args: LogsArgs) -> Result<()> {
    // Compile grep pattern if provided
    let grep_regex = if let Some(pattern) = &args.grep {
        Some(Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex pattern: {}", e))?)
    } else {
        None
    };

    let lines = if args.remote {
        fetch_remote(&args).await?
    } else {
        let range = TimeRange::from_bounds(args.since.as_deref(), args.until.as_deref())?;
        let reader = super::get_reader(&args.archive);
        debug!("querying {} under {}", args.workload, reader.root().display());
        reader.query(&args.workload, &range)?
    };

    print_logs(&filter_lines(lines, grep_regex.as_ref()));
    Ok(())
}

fn filter_lines(lines: Vec<String>, grep: Option<&Regex>) -> Vec<String> {
    match grep {
        Some(regex) => lines.into_iter().filter(|line| regex.is_match(line)).collect(),
        None => lines,
    }
}

/// Query a running daemon
async fn fetch_remote(args: &LogsArgs) -> Result<Vec<String>> {
    let client = super::get_client()?;

    let mut query = Vec::new();
    if let Some(since) = &args.since {
        query.push(("start", since.as_str()));
    }
    if let Some(until) = &args.until {
        query.push(("end", until.as_str()));
    }

    let mut request = client
        .get(super::api_url(&args.daemon.url, &args.workload))
        .query(&query);
    if let Some(token) = &args.daemon.token {
        request = request.bearer_auth(token);
    }

    debug!("querying {} at {}", args.workload, args.daemon.url);
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        let body: LogsBody = response.json().await?;
        return Ok(body.logs);
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => bail!("{} ({})", body.error, status),
        Err(_) => bail!("Daemon answered {}", status),
    }
}
