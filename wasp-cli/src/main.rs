//! wasp: command-line surface for the gateway.
//!
//! Exit codes: `check` exits 0 when the contact is allowed and 1 when
//! denied; `serve` exits 1 when the store is not initialized; everything
//! else exits 0 on success and non-zero on error. `--json` switches every
//! command to a single newline-terminated JSON document.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use wasp_core::config::{self, CoreConfig, DEFAULT_CONFIG_TOML};
use wasp_core::{audit, canary, contacts, quarantine};
use wasp_core::{Decision, Error as CoreError, Platform, Store, TrustLevel};

#[derive(Parser)]
#[command(name = "wasp", about = "Policy gateway guarding an agentic assistant")]
struct Cli {
    /// Emit one JSON document instead of human text.
    #[arg(long, global = true)]
    json: bool,

    /// Data directory (defaults to $WASP_ROOT, then ~/.wasp).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the data directory, config file and database schema.
    Init,
    /// Add or update a whitelisted contact.
    Add {
        identifier: String,
        #[arg(long, default_value = "webchat")]
        platform: String,
        #[arg(long, default_value = "limited")]
        trust: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a contact from the whitelist.
    Remove {
        identifier: String,
        #[arg(long, default_value = "webchat")]
        platform: String,
    },
    /// List whitelisted contacts, newest first.
    List {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        trust: Option<String>,
    },
    /// Trust decision for one identifier. Exits 0 if allowed, 1 if denied.
    Check {
        identifier: String,
        #[arg(long, default_value = "webchat")]
        platform: String,
    },
    /// Show recent audit entries.
    Log {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        decision: Option<String>,
    },
    /// Run the administrative HTTP facade.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Review quarantined messages; bare `review` lists them.
    Review {
        /// Release this sender's messages (marks them reviewed).
        #[arg(long, conflicts_with = "deny")]
        approve: Option<String>,
        /// Delete this sender's messages.
        #[arg(long)]
        deny: Option<String>,
        #[arg(long, default_value = "webchat")]
        platform: String,
    },
    /// List unreviewed quarantined messages.
    Blocked,
    /// Injection telemetry: recent hits, aggregates, or purges.
    Canary {
        #[arg(long)]
        stats: bool,
        #[arg(long)]
        clear: bool,
        /// Purge telemetry older than this many days.
        #[arg(long)]
        days: Option<u32>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            report_error(cli.json, &e);
            // `serve` on a missing store must exit 1; other failures do too.
            ExitCode::from(1)
        }
    }
}

fn report_error(json: bool, e: &anyhow::Error) {
    if json {
        let detail = e.chain().nth(1).map(|c| c.to_string());
        let mut doc = json!({ "error": e.to_string() });
        if let Some(d) = detail {
            doc["detail"] = json!(d);
        }
        println!("{doc}");
    } else {
        eprintln!("error: {e}");
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let root = cli.root.clone().unwrap_or_else(config::data_root);
    match &cli.cmd {
        Cmd::Init => cmd_init(cli, &root),
        Cmd::Add {
            identifier,
            platform,
            trust,
            name,
            notes,
        } => cmd_add(cli, &root, identifier, platform, trust, name, notes),
        Cmd::Remove {
            identifier,
            platform,
        } => cmd_remove(cli, &root, identifier, platform),
        Cmd::List { platform, trust } => cmd_list(cli, &root, platform, trust),
        Cmd::Check {
            identifier,
            platform,
        } => cmd_check(cli, &root, identifier, platform),
        Cmd::Log { limit, decision } => cmd_log(cli, &root, *limit, decision),
        Cmd::Serve { bind } => cmd_serve(cli, &root, bind),
        Cmd::Review {
            approve,
            deny,
            platform,
        } => cmd_review(cli, &root, approve, deny, platform),
        Cmd::Blocked => cmd_blocked(cli, &root),
        Cmd::Canary { stats, clear, days } => cmd_canary(cli, &root, *stats, *clear, *days),
    }
}

fn open_store(root: &PathBuf) -> Result<Store> {
    Store::open_existing(root).map_err(|e| match e {
        CoreError::NotInitialized => anyhow!("store not initialized; run `wasp init` first"),
        other => anyhow!(other),
    })
}

// ----------- init -----------

fn cmd_init(cli: &Cli, root: &PathBuf) -> Result<ExitCode> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    if root.exists() {
        existed.push(root.display().to_string());
    } else {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create_dir_all({})", root.display()))?;
        created.push(root.display().to_string());
    }

    let config_path = root.join(config::CONFIG_FILE);
    if config_path.exists() {
        existed.push(config::CONFIG_FILE.to_string());
    } else {
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("writing {}", config::CONFIG_FILE))?;
        created.push(config::CONFIG_FILE.to_string());
    }

    let had_db = Store::is_initialized(root);
    let store = Store::open(root)?;
    if had_db {
        existed.push(config::DB_FILE.to_string());
    } else {
        created.push(config::DB_FILE.to_string());
    }
    let version = store.schema_version()?;

    if cli.json {
        println!(
            "{}",
            json!({ "created": created, "existed": existed, "schema_version": version })
        );
    } else {
        println!("initialized {} (schema v{version})", root.display());
        for c in &created {
            println!("  created {c}");
        }
        for e in &existed {
            println!("  existed {e}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ----------- contacts -----------

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    cli: &Cli,
    root: &PathBuf,
    identifier: &str,
    platform: &str,
    trust: &str,
    name: &Option<String>,
    notes: &Option<String>,
) -> Result<ExitCode> {
    let store = open_store(root)?;
    let platform = Platform::from_str(platform)?;
    let trust = TrustLevel::from_str(trust)?;
    let contact = contacts::upsert(
        &store,
        identifier,
        platform,
        trust,
        name.as_deref(),
        notes.as_deref(),
    )?;
    if cli.json {
        println!("{}", serde_json::to_string(&contact)?);
    } else {
        println!("added {identifier} on {platform} as {trust}");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_remove(cli: &Cli, root: &PathBuf, identifier: &str, platform: &str) -> Result<ExitCode> {
    let store = open_store(root)?;
    let platform = Platform::from_str(platform)?;
    let removed = contacts::remove(&store, identifier, platform)?;
    if cli.json {
        println!("{}", json!({ "removed": removed }));
    } else if removed {
        println!("removed {identifier} on {platform}");
    } else {
        println!("no such contact: {identifier} on {platform}");
    }
    Ok(if removed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_list(
    cli: &Cli,
    root: &PathBuf,
    platform: &Option<String>,
    trust: &Option<String>,
) -> Result<ExitCode> {
    let store = open_store(root)?;
    let platform = platform.as_deref().map(Platform::from_str).transpose()?;
    let trust = trust.as_deref().map(TrustLevel::from_str).transpose()?;
    let rows = contacts::list(&store, platform, trust)?;
    if cli.json {
        println!("{}", serde_json::to_string(&rows)?);
    } else if rows.is_empty() {
        println!("no contacts");
    } else {
        for c in &rows {
            let name = c.name.as_deref().unwrap_or("-");
            println!(
                "{:<10} {:<24} {:<10} {}",
                c.platform, c.identifier, c.trust, name
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(cli: &Cli, root: &PathBuf, identifier: &str, platform: &str) -> Result<ExitCode> {
    let store = open_store(root)?;
    let platform = Platform::from_str(platform)?;
    let result = contacts::check(&store, identifier, platform)?;
    audit::log(
        &store,
        identifier,
        platform.as_str(),
        contacts::decision_for(&result),
        &result.reason,
    )?;
    if cli.json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        let label = result
            .trust
            .map(|t| t.as_str())
            .unwrap_or("unknown");
        println!(
            "{} ({label}): {}",
            if result.allowed { "allowed" } else { "denied" },
            result.reason
        );
    }
    Ok(if result.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

// ----------- audit log -----------

fn cmd_log(
    cli: &Cli,
    root: &PathBuf,
    limit: Option<usize>,
    decision: &Option<String>,
) -> Result<ExitCode> {
    let store = open_store(root)?;
    let decision = decision.as_deref().map(Decision::from_str).transpose()?;
    let q = audit::AuditQuery {
        limit,
        decision,
        since: None,
    };
    let rows = audit::query(&store, &q)?;
    if cli.json {
        println!("{}", serde_json::to_string(&rows)?);
    } else if rows.is_empty() {
        println!("no audit entries");
    } else {
        for e in &rows {
            println!(
                "{} {:<7} {}@{} {}",
                e.timestamp, e.decision, e.identifier, e.platform, e.reason
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ----------- serve -----------

fn cmd_serve(cli: &Cli, root: &PathBuf, bind: &Option<String>) -> Result<ExitCode> {
    if !Store::is_initialized(root) {
        return Err(anyhow!("store not initialized; run `wasp init` first"));
    }
    let cfg = CoreConfig::load(root)?;
    let store = Arc::new(Store::open(root)?);
    let state = Arc::new(wasp_http::AppState::with_env_token(store, cfg.ratelimit));
    let bind = bind.clone().unwrap_or_else(|| cfg.server.bind.clone());

    if cli.json {
        println!("{}", json!({ "serving": bind }));
    } else {
        println!("serving on {bind}");
    }
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime
        .block_on(wasp_http::serve(&bind, state))
        .context("admin facade terminated")?;
    Ok(ExitCode::SUCCESS)
}

// ----------- quarantine review -----------

fn cmd_review(
    cli: &Cli,
    root: &PathBuf,
    approve: &Option<String>,
    deny: &Option<String>,
    platform: &str,
) -> Result<ExitCode> {
    let store = open_store(root)?;
    let platform = Platform::from_str(platform)?;

    if let Some(identifier) = approve {
        let released = quarantine::release(&store, identifier, platform)?;
        if cli.json {
            println!("{}", serde_json::to_string(&released)?);
        } else {
            println!("released {} message(s) from {identifier}", released.len());
        }
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(identifier) = deny {
        let n = quarantine::delete(&store, identifier, platform)?;
        if cli.json {
            println!("{}", json!({ "deleted": n }));
        } else {
            println!("deleted {n} message(s) from {identifier}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    print_unreviewed(cli, &store)
}

fn cmd_blocked(cli: &Cli, root: &PathBuf) -> Result<ExitCode> {
    let store = open_store(root)?;
    print_unreviewed(cli, &store)
}

fn print_unreviewed(cli: &Cli, store: &Store) -> Result<ExitCode> {
    let rows = quarantine::list_unreviewed(store, 100)?;
    if cli.json {
        println!("{}", serde_json::to_string(&rows)?);
    } else if rows.is_empty() {
        println!("no unreviewed messages");
    } else {
        for m in &rows {
            println!(
                "{} {}@{} {}",
                m.created_at, m.identifier, m.platform, m.preview
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ----------- canary telemetry -----------

fn cmd_canary(
    cli: &Cli,
    root: &PathBuf,
    stats: bool,
    clear: bool,
    days: Option<u32>,
) -> Result<ExitCode> {
    let store = open_store(root)?;

    if clear {
        let n = canary::clear(&store)?;
        if cli.json {
            println!("{}", json!({ "cleared": n }));
        } else {
            println!("cleared {n} telemetry row(s)");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(days) = days {
        let n = canary::purge_older_than(&store, days)?;
        if cli.json {
            println!("{}", json!({ "purged": n, "days": days }));
        } else {
            println!("purged {n} telemetry row(s) older than {days} day(s)");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if stats {
        let s = canary::stats(&store)?;
        if cli.json {
            println!("{}", serde_json::to_string(&s)?);
        } else {
            println!("hits: {}  mean score: {:.2}", s.total, s.mean_score);
            for (name, count) in &s.by_pattern {
                println!("  {name:<22} {count}");
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let rows = canary::recent(&store, 20)?;
    if cli.json {
        println!("{}", serde_json::to_string(&rows)?);
    } else if rows.is_empty() {
        println!("no canary hits");
    } else {
        for h in &rows {
            println!(
                "{} {}@{} score={:.2} [{}] {}",
                h.timestamp,
                h.identifier,
                h.platform,
                h.score,
                h.patterns.join(","),
                h.preview
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
