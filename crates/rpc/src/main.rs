//! TrustDesk CLI - Main entry point

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trustdesk_audit::RequestContext;
use trustdesk_core::{BookingId, DisputeId, UserId, VerificationId};
use trustdesk_dispute::DisputeStatus;
use trustdesk_identity::VerificationStatus;
use trustdesk_rpc::commands::{self, AuditFilter};
use trustdesk_rpc::{AppContext, Caller, ErrorResponse, Role, RpcResult, TrustConfig};

#[derive(Parser)]
#[command(name = "trustdesk")]
#[command(about = "TrustDesk - booking trust & risk core", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, global = true, default_value = "./data")]
    data: PathBuf,

    /// JSON config file (falls back to $TRUSTDESK_CONFIG, then defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Acting user id
    #[arg(long = "as-user", global = true)]
    as_user: Option<UserId>,

    /// Acting role: user, admin, super_admin or system
    #[arg(long, global = true, default_value = "user")]
    role: Role,

    /// Client address recorded on audit entries
    #[arg(long, global = true)]
    ip: Option<String>,

    /// Client user agent recorded on audit entries
    #[arg(long, global = true)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a booking from a JSON signal bundle
    FraudCheck {
        /// Signal JSON, e.g. '{"account_age_days": 3, ...}'
        signal: String,
        /// Record the decision against this booking
        #[arg(long)]
        booking: Option<BookingId>,
    },

    /// Dispute resolution
    #[command(subcommand)]
    Dispute(DisputeCommands),

    /// Identity verification
    #[command(subcommand)]
    Identity(IdentityCommands),

    /// Audit trail
    #[command(subcommand)]
    Audit(AuditCommands),
}

#[derive(Subcommand)]
enum DisputeCommands {
    /// Open a dispute as the acting user
    Open {
        booking: BookingId,
        reason: String,
        /// RiskDecision JSON from an earlier fraud-check
        #[arg(long)]
        risk: Option<String>,
    },
    /// Show one dispute
    Show { id: DisputeId },
    /// Move an open dispute to review
    Review { id: DisputeId },
    /// Resolve a dispute
    Resolve { id: DisputeId, resolution: String },
    /// Reject a dispute
    Reject { id: DisputeId, reason: String },
    /// Escalate disputes past their severity window
    Escalate,
    /// List disputes by status and/or booking
    List {
        #[arg(long)]
        status: Option<DisputeStatus>,
        #[arg(long)]
        booking: Option<BookingId>,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Submit a document as the acting user
    Submit {
        document_type: String,
        document_url: String,
        /// Supersede an active verification
        #[arg(long)]
        force_replace: bool,
    },
    /// Issue a phone verification code
    SendCode { id: VerificationId, phone: String },
    /// Confirm a phone verification code
    Confirm { id: VerificationId, code: String },
    /// Reject a verification
    Reject { id: VerificationId, reason: String },
    /// List verifications in a status
    List {
        #[arg(long, default_value = "PENDING")]
        status: VerificationStatus,
    },
    /// Expire verifications whose code deadline has passed
    Expire,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Query entries, newest first
    List {
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        entity_id: Option<Uuid>,
        #[arg(long)]
        actor: Option<UserId>,
        #[arg(long)]
        action: Option<String>,
        /// Inclusive lower bound (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Exclusive upper bound (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Verify the hash chain
    Verify,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TrustConfig::load(cli.config.as_deref())?;
    let ctx = AppContext::new(&cli.data, config)?;
    let caller = Caller::new(cli.as_user, cli.role)
        .with_request(RequestContext::new(cli.ip.clone(), cli.user_agent.clone()));

    match run(&ctx, &caller, cli.command) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            let response = ErrorResponse::from(&e);
            eprintln!("{}", serde_json::to_string_pretty(&response)?);
            std::process::exit(1);
        }
    }
}

fn run(ctx: &AppContext, caller: &Caller, command: Commands) -> RpcResult<serde_json::Value> {
    match command {
        Commands::FraudCheck { signal, booking } => {
            commands::fraud_check(ctx, caller, &signal, booking)
        }

        Commands::Dispute(cmd) => match cmd {
            DisputeCommands::Open {
                booking,
                reason,
                risk,
            } => commands::dispute_open(ctx, caller, booking, &reason, risk.as_deref()),
            DisputeCommands::Show { id } => commands::dispute_show(ctx, caller, id),
            DisputeCommands::Review { id } => commands::dispute_review(ctx, caller, id),
            DisputeCommands::Resolve { id, resolution } => {
                commands::dispute_resolve(ctx, caller, id, &resolution)
            }
            DisputeCommands::Reject { id, reason } => {
                commands::dispute_reject(ctx, caller, id, &reason)
            }
            DisputeCommands::Escalate => commands::dispute_escalate(ctx, caller),
            DisputeCommands::List { status, booking } => {
                commands::dispute_list(ctx, caller, status, booking)
            }
        },

        Commands::Identity(cmd) => match cmd {
            IdentityCommands::Submit {
                document_type,
                document_url,
                force_replace,
            } => commands::identity_submit(ctx, caller, &document_type, &document_url, force_replace),
            IdentityCommands::SendCode { id, phone } => {
                commands::identity_send_code(ctx, caller, id, &phone)
            }
            IdentityCommands::Confirm { id, code } => {
                commands::identity_confirm(ctx, caller, id, &code)
            }
            IdentityCommands::Reject { id, reason } => {
                commands::identity_reject(ctx, caller, id, &reason)
            }
            IdentityCommands::List { status } => commands::identity_list(ctx, caller, status),
            IdentityCommands::Expire => commands::identity_expire(ctx, caller),
        },

        Commands::Audit(cmd) => match cmd {
            AuditCommands::List {
                entity_type,
                entity_id,
                actor,
                action,
                from,
                to,
                limit,
            } => commands::audit_list(
                ctx,
                caller,
                AuditFilter {
                    entity_type,
                    entity_id,
                    actor_id: actor,
                    action,
                    from,
                    to,
                    limit,
                },
            ),
            AuditCommands::Verify => commands::audit_verify(ctx, caller),
        },
    }
}
