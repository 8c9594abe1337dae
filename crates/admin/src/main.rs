// Relying-party client registry admin tool
// Registers and maintains OIDC clients directly against the registry database

mod cli;
mod config;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, FileArgs};
use config::{Config, LogFormat};
use dotenvy::dotenv;
use rp_database::{AuditRepository, Database, PgClientRepository};
use rp_models::{ClientStatus, CreateClientRequest, UpdateClientRequest};
use rp_registry::{
    AuditContext, ClientError, ClientManagementService, ClientService, ErrorClass, PgAuditSink,
    ReadVisibility,
};
use serde::Serialize;
use std::io::Read;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env());

    if let Err(err) = run(cli).await {
        report(&err);
        process::exit(exit_code(&err));
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rp_registry=debug"));

    // stdout carries command output only
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing::debug!("Connecting to database");
    let database = Database::new(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    database.ping().await.context("Database is not answering")?;

    if let Command::Migrate = cli.command {
        database.migrate().await?;
        database.close().await;
        return Ok(());
    }

    let mut policy = config.policy;
    if let Command::Get(args) = &cli.command {
        if args.include_inactive {
            policy.read_visibility = ReadVisibility::IncludeInactive;
        }
    }

    let request_id = Uuid::new_v4().to_string();
    tracing::debug!(operator = %config.operator, request_id = %request_id, "Running command");

    let (audit, audit_writer) = PgAuditSink::spawn(AuditRepository::new(database.pool().clone()));
    let service = ClientService::with_policy(
        Arc::new(PgClientRepository::new(database.pool().clone())),
        Arc::new(audit),
        policy,
    )
    .with_audit_context(AuditContext::actor("admin", config.operator).with_request_id(request_id));

    let result = execute(&service, &database, cli.command, cli.pretty).await;

    // Flush queued audit events before the pool goes away
    drop(service);
    audit_writer.finish().await;
    database.close().await;

    result
}

async fn execute(
    service: &ClientService,
    database: &Database,
    command: Command,
    pretty: bool,
) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Create(args) => {
            let request: CreateClientRequest = read_json(&args)?;
            let client = service.create_oidc_client(request).await?;
            print_json(&client, pretty)
        }
        Command::Update(args) => {
            let request: UpdateClientRequest = read_json(&args.input)?;
            let client = service.update_oidc_client(&args.client_id, request).await?;
            print_json(&client, pretty)
        }
        Command::Get(args) => {
            let client = service.get_client_details(&args.client_id).await?;
            print_json(&client, pretty)
        }
        Command::Activate(args) => {
            set_status(service, &args.client_id, ClientStatus::Active, pretty).await
        }
        Command::Deactivate(args) => {
            set_status(service, &args.client_id, ClientStatus::Inactive, pretty).await
        }
        Command::RotateKey(args) => {
            let public_key: serde_json::Value = read_json(&args.input)?;
            let client = service.rotate_client_key(&args.client_id, public_key).await?;
            print_json(&client, pretty)
        }
        Command::Audit(args) => {
            let logs = AuditRepository::new(database.pool().clone())
                .list_for_client(&args.client_id, i64::from(args.limit))
                .await
                .context("Failed to read audit logs")?;
            print_json(&logs, pretty)
        }
    }
}

async fn set_status(
    service: &ClientService,
    client_id: &str,
    status: ClientStatus,
    pretty: bool,
) -> anyhow::Result<()> {
    let request = UpdateClientRequest {
        status: Some(status),
        ..Default::default()
    };
    let client = service.update_oidc_client(client_id, request).await?;
    print_json(&client, pretty)
}

fn read_json<T: serde::de::DeserializeOwned>(args: &FileArgs) -> anyhow::Result<T> {
    let raw = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?
    };

    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", args.file.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    if let Some(client_err) = err.downcast_ref::<ClientError>() {
        if !client_err.violations().is_empty() {
            if let Ok(body) = serde_json::to_string_pretty(client_err.violations()) {
                eprintln!("{}", body);
            }
        }
    }
}

/// 2 when the request needs fixing, 1 for everything else
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<serde_json::Error>().is_some() {
        return 2;
    }
    match err.downcast_ref::<ClientError>().map(ClientError::class) {
        Some(ErrorClass::ClientFault) => 2,
        _ => 1,
    }
}
