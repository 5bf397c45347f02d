use clap::{Parser, Subcommand};

/// Greenlight — human approval gate for automated pipelines
#[derive(Parser)]
#[command(name = "greenlight", version, about)]
pub struct Cli {
    /// Base URL of a running Greenlight server (for request subcommands).
    #[arg(long, env = "GREENLIGHT_URL", default_value = "http://127.0.0.1:8443")]
    pub url: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the approval engine and management API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8443)]
        port: u16,
    },
    /// Inspect and resolve approval requests on a running server
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
}

#[derive(Subcommand)]
pub enum RequestCommands {
    /// List requests, newest first
    List {
        /// Filter: pending | approved | rejected | timed_out | cancelled
        #[arg(long)]
        status: Option<String>,
        /// Filter by the submitting producer's owner tag
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// Show one request in full
    Show { request_id: String },
    /// Approve a pending request
    Approve {
        request_id: String,
        #[arg(long)]
        decided_by: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a pending request (a reason is required by default policy)
    Reject {
        request_id: String,
        #[arg(long)]
        decided_by: String,
        #[arg(long)]
        reason: String,
    },
    /// Cancel a pending request whose producer is gone
    Cancel { request_id: String },
}
