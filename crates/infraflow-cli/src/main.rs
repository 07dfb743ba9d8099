//! Infraflow CLI - infrastructure project approval workflow

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use infraflow_core::actor::{Actor, Role};
use infraflow_core::audit::SqliteAuditSink;
use infraflow_core::commands::project::{self, Project, ProjectDetail, ProjectType};
use infraflow_core::config::Config;
use infraflow_core::storage::{Database, DatabaseConfig};
use infraflow_core::workflow::{
    DisbursementFields, InfraWorkflow, NewExecutionLog, NewRkbItem, ProposalFields, RkbFields,
    Stage, StageFields,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "infraflow")]
#[command(author, version, about = "Infrastructure project approval workflow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides database.path from the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Id of the acting user
    #[arg(long, global = true, default_value = "cli")]
    actor_id: String,

    /// Display name recorded as approver
    #[arg(long, global = true, default_value = "")]
    actor_name: String,

    /// Role of the acting user (admin, staff, user)
    #[arg(long, global = true, default_value = "user")]
    actor_role: String,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProjectKind {
    Infrastructure,
    WebDev,
}

impl From<ProjectKind> for ProjectType {
    fn from(kind: ProjectKind) -> Self {
        match kind {
            ProjectKind::Infrastructure => ProjectType::Infrastructure,
            ProjectKind::WebDev => ProjectType::WebDev,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Project proposal stage
    Proposal {
        #[command(subcommand)]
        action: ProposalAction,
    },

    /// RKB budget stage and line items
    Rkb {
        #[command(subcommand)]
        action: RkbAction,
    },

    /// Fund disbursement stage
    Disbursement {
        #[command(subcommand)]
        action: DisbursementAction,
    },

    /// Execution progress logs
    Execution {
        #[command(subcommand)]
        action: ExecutionAction,
    },

    /// Phase control
    Phase {
        #[command(subcommand)]
        action: PhaseAction,
    },

    /// Audit trail
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project
    Create {
        name: String,
        #[arg(short = 't', long = "type", default_value = "infrastructure")]
        kind: ProjectKind,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        manager: Option<String>,
    },
    /// List projects
    List {
        #[arg(short = 't', long = "type")]
        kind: Option<ProjectKind>,
    },
    /// Show a project with all workflow records
    Show { id: String },
}

/// Actions shared by every approvable stage
#[derive(Subcommand)]
enum StageAction {
    /// Submit for approval
    Submit { project_id: String },
    /// Approve (admin or staff)
    Approve { project_id: String },
    /// Reject with a reason (admin or staff)
    Reject {
        project_id: String,
        #[arg(short, long)]
        reason: String,
    },
    /// Show the stage record
    Show { project_id: String },
}

#[derive(Args)]
struct ProposalArgs {
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    objectives: Option<String>,
    #[arg(long)]
    scope: Option<String>,
    #[arg(long)]
    benefits: Option<String>,
    #[arg(long)]
    risk_analysis: Option<String>,
    #[arg(long)]
    attachment_url: Option<String>,
}

impl From<ProposalArgs> for ProposalFields {
    fn from(args: ProposalArgs) -> Self {
        Self {
            background: args.background,
            objectives: args.objectives,
            scope: args.scope,
            benefits: args.benefits,
            risk_analysis: args.risk_analysis,
            attachment_url: args.attachment_url,
        }
    }
}

#[derive(Subcommand)]
enum ProposalAction {
    /// Create or update the proposal draft
    Save {
        project_id: String,
        #[command(flatten)]
        fields: ProposalArgs,
    },
    #[command(flatten)]
    Stage(StageAction),
}

#[derive(Subcommand)]
enum RkbAction {
    /// Create or update the RKB draft
    Save {
        project_id: String,
        #[arg(long)]
        submission_number: Option<String>,
        #[arg(long)]
        justification: Option<String>,
    },
    /// Add a budget line item
    AddItem {
        project_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        unit: String,
        #[arg(long)]
        unit_price: i64,
        #[arg(long)]
        specification: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a budget line item
    RemoveItem { item_id: String },
    #[command(flatten)]
    Stage(StageAction),
}

#[derive(Subcommand)]
enum DisbursementAction {
    /// Create or update the disbursement draft
    Save {
        project_id: String,
        #[arg(long)]
        approved_budget: Option<i64>,
        #[arg(long)]
        disbursed_amount: Option<i64>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        date: Option<DateTime<Utc>>,
        #[arg(long)]
        payment_method: Option<String>,
        #[arg(long)]
        reference_number: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(flatten)]
    Stage(StageAction),
}

#[derive(Subcommand)]
enum ExecutionAction {
    /// Record execution progress
    Log {
        project_id: String,
        #[arg(short, long)]
        description: String,
        #[arg(short, long)]
        progress: i64,
        /// RFC 3339 timestamp or YYYY-MM-DD (defaults to now)
        #[arg(long, value_parser = parse_date)]
        date: Option<DateTime<Utc>>,
        #[arg(long)]
        findings: Option<String>,
        #[arg(long)]
        completed_by: Option<String>,
        #[arg(long)]
        photo_url: Option<String>,
    },
    /// List execution logs, newest first
    List { project_id: String },
    /// Mark the project completed
    Complete { project_id: String },
}

#[derive(Subcommand)]
enum PhaseAction {
    /// Advance to the next phase once the current stage is approved
    Advance { project_id: String },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Show recent audit entries
    List {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{}': expected RFC 3339 or YYYY-MM-DD", s))
}

/// Output settings shared by all commands
#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print a status line unless quiet or emitting JSON
    fn say(&self, message: impl std::fmt::Display) {
        if !self.quiet && !self.json() {
            println!("{}", message);
        }
    }

    fn print_json(&self, value: &impl Serialize) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a record as JSON, or as indented `key: value` lines
    fn print_record(&self, title: &str, value: &impl Serialize) -> anyhow::Result<()> {
        if self.json() {
            return self.print_json(value);
        }
        println!("{}", title);
        if let Value::Object(map) = serde_json::to_value(value)? {
            for (key, value) in map {
                match value {
                    Value::Null | Value::Object(_) | Value::Array(_) => {}
                    Value::String(s) => println!("  {}: {}", key, s),
                    other => println!("  {}: {}", key, other),
                }
            }
        }
        Ok(())
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("infraflow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<infraflow_core::Error>() {
            Some(err) => {
                eprintln!("Error [{}]: {}", err.code(), err);
                if let Some(hint) = err.suggestion() {
                    eprintln!("  Hint: {}", hint);
                }
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    if let Commands::Config { action } = cli.command {
        return cmd_config(action, out);
    }

    let config = Config::load()?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.database.resolved_path());

    if let Commands::Doctor = cli.command {
        return cmd_doctor(&config, db_path, out).await;
    }

    let role = Role::parse(&cli.actor_role)
        .ok_or_else(|| anyhow::anyhow!("Invalid role: {}. Valid options: admin, staff, user", cli.actor_role))?;
    let actor = Actor::new(cli.actor_id.clone(), cli.actor_name.clone(), role);

    let db = Database::new(
        DatabaseConfig::with_path(&db_path).max_connections(config.database.max_connections),
    )
    .await?;
    debug!(path = %db_path.display(), "Opened database");

    let sink = SqliteAuditSink::new(db.clone());
    let workflow = InfraWorkflow::new(&db)
        .with_policy(config.workflow)
        .with_audit(&sink)
        .acting_as(&actor);

    let result = match cli.command {
        Commands::Projects { action } => cmd_projects(&db, action, out).await,
        Commands::Proposal { action } => cmd_proposal(&workflow, action, out).await,
        Commands::Rkb { action } => cmd_rkb(&workflow, action, out).await,
        Commands::Disbursement { action } => cmd_disbursement(&workflow, action, out).await,
        Commands::Execution { action } => cmd_execution(&workflow, action, out).await,
        Commands::Phase { action } => cmd_phase(&workflow, action, out).await,
        Commands::Audit { action } => cmd_audit(&sink, action, out).await,
        Commands::Config { .. } | Commands::Doctor => Ok(()),
    };

    db.close().await;
    result
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_projects(db: &Database, action: ProjectAction, out: Output) -> anyhow::Result<()> {
    match action {
        ProjectAction::Create {
            name,
            kind,
            description,
            manager,
        } => {
            let mut new_project = Project::new(name, kind.into());
            if let Some(description) = description {
                new_project = new_project.with_description(description);
            }
            if let Some(manager) = manager {
                new_project = new_project.with_manager(manager);
            }
            let created = project::create_project(db, new_project).await?;

            if out.json() {
                return out.print_json(&created);
            }
            out.say("Project created successfully!");
            println!("  ID: {}", created.id);
            out.say(format!("  Name: {}", created.name));
            if let Some(phase) = created.current_phase {
                out.say(format!("  Phase: {}", phase));
                out.say("\nNext step: infraflow proposal save <id> --background <text>");
            }
        }
        ProjectAction::List { kind } => {
            let projects = project::list_projects(db, kind.map(Into::into)).await?;
            if out.json() {
                return out.print_json(&projects);
            }
            if projects.is_empty() {
                out.say("No projects found.");
                out.say("\nCreate one with: infraflow projects create <name>");
                return Ok(());
            }
            out.say("Projects:");
            for p in projects {
                let phase = p
                    .current_phase
                    .map(|ph| ph.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} - {} ({}, {}) [{}]",
                    short_id(&p.id),
                    p.name,
                    p.project_type.as_str(),
                    p.status.as_str(),
                    phase
                );
            }
        }
        ProjectAction::Show { id } => {
            let detail = project::get_full_project_data(db, &id).await?;
            if out.json() {
                return out.print_json(&detail);
            }
            print_project_detail(&detail);
        }
    }
    Ok(())
}

fn print_project_detail(detail: &ProjectDetail) {
    let p = &detail.project;
    println!("{} ({})", p.name, p.id);
    println!("  Type: {}", p.project_type.as_str());
    println!("  Status: {}", p.status.as_str());
    if let Some(phase) = p.current_phase {
        println!("  Phase: {}", phase);
    }
    if let Some(description) = &p.description {
        println!("  Description: {}", description);
    }

    if !p.is_infrastructure() {
        return;
    }

    print_stage_line("Proposal", detail.proposal.as_ref());
    print_stage_line("RKB", detail.rkb_submission.as_ref());
    if let Some(rkb) = &detail.rkb_submission {
        println!("    Total budget: {}", rkb.fields.total_budget);
    }
    for item in &detail.rkb_items {
        println!(
            "    - {} x{} {} @ {} = {} [{}]",
            item.item_name,
            item.quantity,
            item.unit,
            item.unit_price,
            item.total_price,
            short_id(&item.id)
        );
    }
    print_stage_line("Disbursement", detail.disbursement.as_ref());
    println!("  Execution: {}% ({} logs)", detail.current_progress(), detail.execution_logs.len());
}

fn print_stage_line<T>(label: &str, stage: Option<&Stage<T>>) {
    match stage {
        Some(s) => {
            let mut line = format!("  {}: {}", label, s.approval_status);
            if let Some(by) = &s.approved_by {
                line.push_str(&format!(" by {}", by));
            }
            if let Some(reason) = &s.rejection_reason {
                line.push_str(&format!(" ({})", reason));
            }
            println!("{}", line);
        }
        None => println!("  {}: -", label),
    }
}

/// Submit / approve / reject / show for any stage
async fn cmd_stage<T: StageFields + Serialize>(
    workflow: &InfraWorkflow<'_>,
    action: StageAction,
    out: Output,
) -> anyhow::Result<()> {
    let label = T::KIND.label();
    match action {
        StageAction::Submit { project_id } => {
            let stage = workflow.submit_stage::<T>(&project_id).await?;
            out.say(format!("{} submitted for approval.", label));
            if out.json() {
                out.print_json(&stage)?;
            }
        }
        StageAction::Approve { project_id } => {
            let decision = workflow.approve_stage::<T>(&project_id).await?;
            if out.json() {
                return out.print_json(&decision);
            }
            out.say(format!(
                "{} approved by {}. Project is now in the {} phase.",
                label,
                decision.stage.approved_by.as_deref().unwrap_or("-"),
                decision.phase
            ));
        }
        StageAction::Reject { project_id, reason } => {
            let stage = workflow.reject_stage::<T>(&project_id, &reason).await?;
            out.say(format!("{} rejected: {}", label, reason));
            if out.json() {
                out.print_json(&stage)?;
            }
        }
        StageAction::Show { project_id } => match workflow.get_stage::<T>(&project_id).await? {
            Some(stage) => out.print_record(label, &stage)?,
            None if out.json() => out.print_json(&Value::Null)?,
            None => println!("No {} for project {}.", label, project_id),
        },
    }
    Ok(())
}

async fn cmd_proposal(workflow: &InfraWorkflow<'_>, action: ProposalAction, out: Output) -> anyhow::Result<()> {
    match action {
        ProposalAction::Save { project_id, fields } => {
            let stage = workflow.save_proposal(&project_id, &fields.into()).await?;
            out.say("Proposal saved as draft.");
            if out.json() {
                out.print_json(&stage)?;
            }
            Ok(())
        }
        ProposalAction::Stage(action) => cmd_stage::<ProposalFields>(workflow, action, out).await,
    }
}

async fn cmd_rkb(workflow: &InfraWorkflow<'_>, action: RkbAction, out: Output) -> anyhow::Result<()> {
    match action {
        RkbAction::Save {
            project_id,
            submission_number,
            justification,
        } => {
            let fields = RkbFields {
                submission_number,
                justification,
                ..Default::default()
            };
            let stage = workflow.save_rkb(&project_id, &fields).await?;
            out.say("RKB saved as draft.");
            if out.json() {
                out.print_json(&stage)?;
            }
        }
        RkbAction::AddItem {
            project_id,
            name,
            quantity,
            unit,
            unit_price,
            specification,
            vendor,
            notes,
        } => {
            let item = NewRkbItem {
                item_name: name,
                specification,
                quantity,
                unit,
                unit_price,
                vendor,
                notes,
            };
            let change = workflow.add_rkb_item(&project_id, &item).await?;
            if out.json() {
                return out.print_json(&change);
            }
            out.say(format!(
                "Added {} ({} x {} = {}). Total budget: {}",
                change.item.item_name,
                change.item.quantity,
                change.item.unit_price,
                change.item.total_price,
                change.total_budget
            ));
            out.say(format!("  Item ID: {}", change.item.id));
        }
        RkbAction::RemoveItem { item_id } => {
            let change = workflow.remove_rkb_item(&item_id).await?;
            if out.json() {
                return out.print_json(&change);
            }
            out.say(format!(
                "Removed {}. Total budget: {}",
                change.item.item_name, change.total_budget
            ));
        }
        RkbAction::Stage(StageAction::Show { project_id }) if !out.json() => {
            cmd_stage::<RkbFields>(workflow, StageAction::Show { project_id: project_id.clone() }, out).await?;
            let items = workflow.rkb_items(&project_id).await?;
            if !items.is_empty() {
                println!("  items:");
                for item in items {
                    println!(
                        "    - {} x{} {} @ {} = {} [{}]",
                        item.item_name,
                        item.quantity,
                        item.unit,
                        item.unit_price,
                        item.total_price,
                        item.id
                    );
                }
            }
        }
        RkbAction::Stage(action) => cmd_stage::<RkbFields>(workflow, action, out).await?,
    }
    Ok(())
}

async fn cmd_disbursement(
    workflow: &InfraWorkflow<'_>,
    action: DisbursementAction,
    out: Output,
) -> anyhow::Result<()> {
    match action {
        DisbursementAction::Save {
            project_id,
            approved_budget,
            disbursed_amount,
            date,
            payment_method,
            reference_number,
            notes,
        } => {
            let fields = DisbursementFields {
                approved_budget,
                disbursed_amount,
                disbursement_date: date,
                payment_method,
                reference_number,
                notes,
            };
            let stage = workflow.save_disbursement(&project_id, &fields).await?;
            out.say("Disbursement saved as draft.");
            if out.json() {
                out.print_json(&stage)?;
            }
            Ok(())
        }
        DisbursementAction::Stage(action) => {
            cmd_stage::<DisbursementFields>(workflow, action, out).await
        }
    }
}

async fn cmd_execution(workflow: &InfraWorkflow<'_>, action: ExecutionAction, out: Output) -> anyhow::Result<()> {
    match action {
        ExecutionAction::Log {
            project_id,
            description,
            progress,
            date,
            findings,
            completed_by,
            photo_url,
        } => {
            let entry = NewExecutionLog {
                activity_description: description,
                execution_date: date,
                progress_percentage: progress,
                findings,
                completed_by,
                photo_url,
            };
            let log = workflow.add_execution_log(&project_id, &entry).await?;
            if out.json() {
                return out.print_json(&log);
            }
            out.say(format!("Logged progress {}%: {}", log.progress_percentage, log.activity_description));
        }
        ExecutionAction::List { project_id } => {
            let logs = workflow.execution_logs(&project_id).await?;
            if out.json() {
                return out.print_json(&logs);
            }
            if logs.is_empty() {
                out.say("No execution logs.");
            }
            for log in logs {
                println!(
                    "  {} {:>3}% {}",
                    log.execution_date.format("%Y-%m-%d"),
                    log.progress_percentage,
                    log.activity_description
                );
            }
        }
        ExecutionAction::Complete { project_id } => {
            let completed = workflow.complete_project(&project_id).await?;
            if out.json() {
                return out.print_json(&completed);
            }
            out.say(format!("Project {} completed.", completed.name));
        }
    }
    Ok(())
}

async fn cmd_phase(workflow: &InfraWorkflow<'_>, action: PhaseAction, out: Output) -> anyhow::Result<()> {
    match action {
        PhaseAction::Advance { project_id } => {
            let phase = workflow.advance_phase(&project_id).await?;
            if out.json() {
                return out.print_json(&serde_json::json!({ "project_id": project_id, "phase": phase }));
            }
            out.say(format!("Project advanced to the {} phase.", phase));
        }
    }
    Ok(())
}

async fn cmd_audit(sink: &SqliteAuditSink, action: AuditAction, out: Output) -> anyhow::Result<()> {
    match action {
        AuditAction::List { project, limit } => {
            let entries = sink.recent(project.as_deref(), limit).await?;
            if out.json() {
                return out.print_json(&entries);
            }
            if entries.is_empty() {
                out.say("No audit entries.");
            }
            for entry in entries {
                println!(
                    "  {} {:<22} {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    short_id(&entry.entity_id),
                    entry.user_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            out.say(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: serde_json::Map<String, Value> =
                    items.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
                return out.print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            out.say("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &Config, db_path: PathBuf, out: Output) -> anyhow::Result<()> {
    out.say("Infraflow Health Check");
    out.say("======================");
    out.say("");

    let mut all_ok = true;

    match config.validate() {
        Ok(()) => out.say("[OK] Configuration: Valid"),
        Err(e) => {
            all_ok = false;
            out.say(format!("[!!] Configuration: Error - {}", e));
        }
    }

    if let Ok(path) = Config::config_path() {
        if path.exists() {
            out.say(format!("[OK] Config file: {}", path.display()));
        } else {
            out.say(format!("[--] Config file: {} (using defaults)", path.display()));
        }
    }

    out.say(format!(
        "[--] Policy: edit={}, progress={}, phase guard={}",
        config.workflow.edit_policy.as_str(),
        config.workflow.progress_policy.as_str(),
        config.workflow.enforce_phase_guard
    ));

    match Database::new(DatabaseConfig::with_path(&db_path).max_connections(1)).await {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => out.say(format!("[OK] Database: {}", db_path.display())),
                Err(e) => {
                    all_ok = false;
                    out.say(format!("[!!] Database: Error - {}", e));
                }
            }
            match db.migration_status().await {
                Ok(status) if !status.needs_migration => {
                    out.say(format!("[OK] Schema: version {}", status.current_version))
                }
                Ok(status) => {
                    all_ok = false;
                    out.say(format!(
                        "[!!] Schema: version {} of {}",
                        status.current_version, status.target_version
                    ));
                }
                Err(e) => {
                    all_ok = false;
                    out.say(format!("[!!] Schema: Error - {}", e));
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            warn!(error = %e, "Database unavailable");
            out.say(format!("[!!] Database: {} - {}", db_path.display(), e));
        }
    }

    out.say("");
    if all_ok {
        out.say("All checks passed.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Health check found problems"))
    }
}
