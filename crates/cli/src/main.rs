use anyhow::Context;
use api_shared::RegisterReq;
use clap::{Parser, Subcommand};
use chs_core::constants::{DEFAULT_AUDIT_LIMIT, DEFAULT_DATA_DIR};
use chs_core::{
    prepare_data_dir, AccountService, AuditService, CoreConfig, PatientService, PaymentService,
    RequestContext, RequestOrigin,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chs")]
#[command(about = "Community health records operator CLI")]
struct Cli {
    /// Data directory shared with the server
    #[arg(long, env = "CHS_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account of any role (use this to bootstrap the first administrator)
    CreateAccount {
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        /// admin, doctor or chw
        #[arg(long, default_value = "admin")]
        role: String,
        #[arg(long, env = "CHS_ACCOUNT_PASSWORD")]
        password: String,
        #[arg(long)]
        facility: Option<String>,
    },
    /// List active patients visible to an account
    ListPatients {
        /// Username whose access rules apply
        #[arg(long = "as")]
        acting_as: String,
        /// Substring of name, patient number or national id
        #[arg(long)]
        search: Option<String>,
    },
    /// Activate or deactivate an account
    ToggleAccount {
        username: String,
        /// Administrator performing the change
        #[arg(long = "as")]
        acting_as: String,
    },
    /// Print the most recent audit entries, newest first
    AuditTail {
        #[arg(long, default_value_t = DEFAULT_AUDIT_LIMIT)]
        limit: usize,
    },
    /// Move a completed payment to refunded
    MarkRefunded {
        /// Payment reference, e.g. CHS20260301A1B2C3D4
        reference: String,
    },
}

fn operator() -> RequestContext {
    RequestContext::anonymous(RequestOrigin {
        ip_address: None,
        user_agent: Some("chs-cli".into()),
    })
}

/// Context acting as an existing, active account.
fn acting_as(accounts: &AccountService, username: &str) -> anyhow::Result<RequestContext> {
    let account = accounts
        .get_by_username(username)
        .with_context(|| format!("no account named {username}"))?;
    anyhow::ensure!(account.is_active, "account {username} is inactive");
    Ok(RequestContext::for_actor(account.to_actor(), operator().origin))
}

fn run(cfg: Arc<CoreConfig>, command: Commands) -> anyhow::Result<()> {
    let accounts = AccountService::new(cfg.clone());

    match command {
        Commands::CreateAccount {
            username,
            email,
            first_name,
            last_name,
            role,
            password,
            facility,
        } => {
            let req = RegisterReq {
                username,
                email,
                confirm_password: password.clone(),
                password,
                first_name,
                last_name,
                role,
                phone: None,
                county: None,
                subcounty: None,
                ward: None,
                facility_name: facility,
                license_number: None,
            };
            let account = accounts.register(&operator(), &req)?;
            println!(
                "Created {} account {} with id: {}",
                account.role, account.username, account.id
            );
        }
        Commands::ListPatients { acting_as: who, search } => {
            let ctx = acting_as(&accounts, &who)?;
            let patients = PatientService::new(cfg).list(&ctx, search.as_deref())?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "ID: {}, Number: {}, Name: {}, Created: {}",
                        patient.id,
                        patient.patient_number,
                        patient.full_name(),
                        patient.created_at.to_rfc3339()
                    );
                }
            }
        }
        Commands::ToggleAccount {
            username,
            acting_as: who,
        } => {
            let ctx = acting_as(&accounts, &who)?;
            let target = accounts.get_by_username(&username)?;
            let account = accounts.toggle_active(&ctx, &target.id)?;
            let state = if account.is_active { "active" } else { "inactive" };
            println!("Account {} is now {}", account.username, state);
        }
        Commands::AuditTail { limit } => {
            for entry in AuditService::new(cfg).recent(limit)? {
                println!(
                    "{} {} actor={} {}",
                    entry.created_at.to_rfc3339(),
                    entry.action.as_str(),
                    entry
                        .actor_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".into()),
                    entry.details
                );
            }
        }
        Commands::MarkRefunded { reference } => {
            let payment = PaymentService::new(cfg).mark_refunded(&operator(), &reference)?;
            println!(
                "Payment {} is now {}",
                payment.payment_reference,
                payment.status.as_str()
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'chs --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::new(cli.data_dir)?;
    prepare_data_dir(&cfg)?;
    run(Arc::new(cfg), command)
}
