use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Manage registered OIDC relying-party clients
#[derive(Debug, Parser)]
#[command(name = "rp-admin", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply database migrations
    Migrate,
    /// Register a new client from a JSON request
    Create(FileArgs),
    /// Update a client from a JSON request with the fields to change
    Update(UpdateArgs),
    /// Show a client
    Get(GetArgs),
    /// Mark a client ACTIVE
    Activate(ClientIdArg),
    /// Mark a client INACTIVE
    Deactivate(ClientIdArg),
    /// Bind a new public key (JWK) to a client
    RotateKey(UpdateArgs),
    /// Show the audit trail of a client
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
pub struct FileArgs {
    /// JSON file to read, `-` for stdin
    #[arg(long, short)]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ClientIdArg {
    pub client_id: String,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub client_id: String,

    #[command(flatten)]
    pub input: FileArgs,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    pub client_id: String,

    /// Also return INACTIVE clients
    #[arg(long)]
    pub include_inactive: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    pub client_id: String,

    /// Number of entries to show
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub limit: u32,
}
