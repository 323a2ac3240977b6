//! Ping command implementation

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::cli::RemoteArgs;
use crate::output::print_success_json;

#[derive(Serialize)]
struct PingJson {
    url: String,
    version: String,
}

pub async fn execute(args: RemoteArgs) -> Result<()> {
    let client = super::get_client()?;

    let health = client
        .get(super::api_url(&args.url, "health"))
        .send()
        .await
        .with_context(|| format!("Daemon is not reachable at {}", args.url))?;
    let status = health.status();
    let body = health.text().await?;
    if !status.is_success() || body.trim() != "OK" {
        bail!("Daemon is unhealthy ({}): {}", status, body.trim());
    }

    let version = client
        .get(super::api_url(&args.url, "version"))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    print_success_json(
        &format!("Daemon at {} is alive (version {})", args.url, version.trim()),
        Some(PingJson {
            url: args.url.clone(),
            version: version.trim().to_string(),
        }),
    );
    Ok(())
}
