use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bazaar-core")]
#[command(about = "Bazaar Core - wallet ledger and checkout service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Financial audit commands
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Reconcile all COMPLETED orders against their snapshots and ledger entries
    Reconcile,

    /// Verify the global wallet vs ledger balance invariant
    Balance,
}
