//! `stagehand status` — last sync per service, pending changes, containers.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use stagehand_core::{ProjectConfig, ServiceConfig, Severity};
use stagehand_sync::{
    plan,
    state::{self, format_age},
    SyncError, SyncRequest,
};

use super::Globals;

/// Arguments for `stagehand status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON (implies --no-containers).
    #[arg(long)]
    pub json: bool,

    /// Skip the container listing.
    #[arg(long)]
    pub no_containers: bool,
}

impl StatusArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let dispatcher = globals.dispatcher()?;
        let config = dispatcher.config();

        let rows = config
            .services
            .iter()
            .map(|service| service_status(config, service))
            .collect::<Result<Vec<_>>>()?;

        if self.json {
            let payload = StatusJson {
                project: config.project.clone(),
                services: rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(globals, config, rows);

        if !self.no_containers {
            println!();
            dispatcher.status().context("container status failed")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusJson {
    project: String,
    services: Vec<ServiceStatus>,
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    service: String,
    source: String,
    build: String,
    last_sync_at: Option<String>,
    last_sync_age: String,
    outcome: Option<String>,
    /// `None` when the source tree is missing.
    pending_changes: Option<usize>,
    failed: Vec<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "pending")]
    pending: String,
}

fn service_status(config: &ProjectConfig, service: &ServiceConfig) -> Result<ServiceStatus> {
    let record = state::load_at(&config.state_path(), service.name.as_str())
        .with_context(|| format!("failed to load sync record for '{}'", service.name))?;
    let request = SyncRequest::for_service(config, service)?;

    let pending_changes =
        match plan(&request.source_root, &request.build_root, &request.exclusions) {
            Ok(planned) => Some(planned.pending()),
            Err(SyncError::SourceUnavailable { .. }) => None,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to plan '{}'", service.name))
            }
        };

    let now = Utc::now();
    Ok(ServiceStatus {
        service: service.name.to_string(),
        source: service.source.display().to_string(),
        build: service.build.display().to_string(),
        last_sync_at: record.as_ref().map(|r| r.synced_at.to_rfc3339()),
        last_sync_age: record
            .as_ref()
            .map(|r| format_age(r.synced_at, now))
            .unwrap_or_else(|| "never".to_string()),
        outcome: record.as_ref().map(|r| r.outcome.to_string()),
        pending_changes,
        failed: record
            .map(|r| r.failed.iter().map(|p| p.display().to_string()).collect())
            .unwrap_or_default(),
    })
}

fn print_table(globals: &Globals, config: &ProjectConfig, rows: Vec<ServiceStatus>) {
    println!(
        "{}",
        globals.out.heading(&format!(
            "Stagehand v{} | {} | {} services",
            env!("CARGO_PKG_VERSION"),
            config.project,
            rows.len()
        ))
    );

    let dirty = rows
        .iter()
        .filter(|row| row.pending_changes != Some(0))
        .count();
    let failed: Vec<String> = rows.iter().flat_map(|row| row.failed.clone()).collect();

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            service: row.service,
            source: row.source,
            last_sync: row.last_sync_age,
            outcome: row.outcome.unwrap_or_else(|| "-".to_string()),
            pending: match row.pending_changes {
                Some(0) => "in sync".to_string(),
                Some(n) => format!("{n} change(s)"),
                None => "source missing".to_string(),
            },
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    for path in failed {
        println!("{}", globals.out.detail("✗", &format!("last run failed on {path}")));
    }
    if dirty > 0 {
        println!(
            "{}",
            globals
                .out
                .render(Severity::Info, "run `stagehand sync SERVICE` to bring build trees up to date")
        );
    }
}
