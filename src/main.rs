//! lead-cache-core - command line front end for the lead lifecycle core
//!
//! Every subcommand prints JSON on stdout; logs go to stderr.

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lead_cache_core::{
    backend::{HttpLeadBackend, InMemoryLeadBackend, LeadBackend},
    cache::ListQuery,
    config::{Args, Command},
    lead::LeadPatch,
    pipeline::{list_stages, Priority, Stage},
    quality::evaluate_value,
    selection::SelectionSet,
    LeadSession,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let fmt_layer = if args.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lead_cache_core={},info", log_level).into()),
        )
        .with(fmt_layer)
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args.core_config();
    let output = match &args.seed_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading seed file {}", path.display()))?;
            let leads: Vec<Value> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing seed file {}", path.display()))?;
            info!(leads = leads.len(), "Using in-memory backend");
            let backend = Arc::new(InMemoryLeadBackend::with_leads(leads));
            run(LeadSession::new(backend, &config), args.command).await
        }
        None => {
            info!(api_url = %config.api_url, "Using REST backend");
            let backend = Arc::new(HttpLeadBackend::new(&config.api_url, config.request_timeout)?);
            run(LeadSession::new(backend, &config), args.command).await
        }
    };

    match output {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            let message = match e.downcast_ref::<lead_cache_core::CoreError>() {
                Some(core) => core.user_message(),
                None => format!("{e:#}"),
            };
            eprintln!("{}", json!({ "error": message }));
            std::process::exit(1);
        }
    }
}

async fn run<B: LeadBackend + 'static>(session: LeadSession<B>, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::Stages => Ok(stages()),

        Command::Evaluate { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let lead: Value = serde_json::from_str(&raw)?;
            let report = evaluate_value(&lead);
            Ok(json!({
                "pass": report.pass,
                "missing": report.missing,
                "completeness": report.completeness(),
            }))
        }

        Command::List { params } => {
            let query = parse_query(&params)?;
            let list = session.queries.fetch_list(query).await?;
            Ok(list.to_value())
        }

        Command::Show { id } => {
            let lead = session.queries.fetch_one(&id).await?.to_value();
            let report = evaluate_value(&lead);
            Ok(json!({ "lead": lead, "quality": report }))
        }

        Command::Update {
            id,
            stage,
            priority,
            agent,
        } => {
            let mut patch = LeadPatch::new();
            if let Some(stage) = stage {
                patch = patch.stage(stage.parse::<Stage>()?);
            }
            if let Some(priority) = priority {
                patch = patch.priority(priority.parse::<Priority>()?);
            }
            if let Some(agent) = agent {
                patch = if agent.trim().is_empty() {
                    patch.unassign()
                } else {
                    patch.assign_to(agent.trim())
                };
            }
            if patch.is_empty() {
                bail!("nothing to update: pass --stage, --priority or --agent");
            }
            Ok(session.mutations.update(&id, patch).await?)
        }

        Command::BulkAssign { agent, ids } => {
            let mut selection = select_all(ids);
            let outcome = session.bulk.bulk_assign(&mut selection, &agent).await?;
            Ok(serde_json::to_value(outcome)?)
        }

        Command::BulkDelete { ids } => {
            let mut selection = select_all(ids);
            let outcome = session.bulk.bulk_delete(&mut selection).await?;
            Ok(serde_json::to_value(outcome)?)
        }

        Command::Kpis => {
            let kpis = session.queries.fetch_kpis().await?.to_value();
            let funnel = session.queries.fetch_funnel().await?.to_value();
            Ok(json!({ "kpis": kpis, "funnel": funnel }))
        }
    }
}

fn stages() -> Value {
    let stages: Vec<Value> = list_stages()
        .iter()
        .map(|stage| {
            json!({
                "key": stage.key(),
                "position": stage.position(),
                "terminal": stage.is_terminal(),
                "meetingStage": stage.is_meeting_stage(),
                "flagsRecording": stage.flags_recording(),
            })
        })
        .collect();
    let priorities: Vec<Value> = Priority::ALL
        .iter()
        .map(|p| json!({ "key": p.key(), "label": p.label() }))
        .collect();
    json!({ "stages": stages, "priorities": priorities })
}

fn parse_query(params: &[String]) -> anyhow::Result<ListQuery> {
    let mut query = ListQuery::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("query parameter must be key=value, got {param}");
        };
        query = query.param(key.trim(), value.trim());
    }
    Ok(query)
}

fn select_all(ids: Vec<String>) -> SelectionSet {
    let mut selection = SelectionSet::with_visible(ids);
    selection.select_all_visible();
    selection
}
