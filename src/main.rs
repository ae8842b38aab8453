mod api;
mod auth;
mod config;
mod dashboard;
mod models;
mod tui;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::File;
use std::io::{self, Write};

use api::{ApiClient, CreateOutcome};
use auth::{AuthClient, Session};
use config::Config;
use dashboard::{FormField, validate_fields};
use models::{ApplicationDraft, ApplicationRecord, Status, StatusFilter, visible_records};

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Job application tracker - manage applications and sign-ins from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        /// Email address to register
        email: String,

        /// Password (prompted for when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Confirm a new account with the emailed code
    Confirm {
        /// Email address being confirmed
        email: String,

        /// Confirmation code from the email
        code: String,
    },

    /// Sign in and store the session
    Login {
        /// Email address
        email: String,

        /// Password (prompted for when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and discard the stored session
    Logout,

    /// Show who is signed in
    Whoami,

    /// Send a password reset code
    Forgot {
        /// Email address
        email: String,
    },

    /// Complete a password reset with the emailed code
    Reset {
        /// Email address
        email: String,

        /// Reset code from the email
        code: String,

        /// New password (prompted for when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// List applications
    List {
        /// Filter by status (applied, interview, offer, rejected)
        #[arg(short, long)]
        status: Option<String>,

        /// Case-insensitive search over company and title
        #[arg(long)]
        search: Option<String>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// Add an application
    Add {
        /// Company name
        #[arg(short, long)]
        company: String,

        /// Job title
        #[arg(short, long)]
        title: String,

        /// Job post URL
        #[arg(short, long)]
        url: Option<String>,

        /// Status (applied, interview, offer, rejected)
        #[arg(short, long)]
        status: Option<String>,

        /// Date applied (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Follow-up date (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        follow_up: Option<String>,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Update an application
    Update {
        /// Application ID
        id: String,

        /// Company name
        #[arg(short, long)]
        company: Option<String>,

        /// Job title
        #[arg(short, long)]
        title: Option<String>,

        /// Job post URL (pass an empty string to clear)
        #[arg(short, long)]
        url: Option<String>,

        /// Status (applied, interview, offer, rejected)
        #[arg(short, long)]
        status: Option<String>,

        /// Date applied (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,

        /// Follow-up date (pass an empty string to clear)
        #[arg(short = 'f', long)]
        follow_up: Option<String>,

        /// Notes (pass an empty string to clear)
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete an application
    Delete {
        /// Application ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Open the interactive dashboard
    Dash,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Dash));

    let config = Config::from_env()?;
    let auth = AuthClient::new(&config)?;

    match cli.command {
        Commands::Signup { email, password } => {
            let password = prompt_if_missing(password, "Password")?;
            auth.sign_up(&email, &password)?;
            println!("Account created. Check {email} for a confirmation code, then run:");
            println!("  apptrack confirm {email} <code>");
        }

        Commands::Confirm { email, code } => {
            auth.confirm_sign_up(&email, &code)?;
            println!("Account confirmed. Sign in with: apptrack login {email}");
        }

        Commands::Login { email, password } => {
            let password = prompt_if_missing(password, "Password")?;
            let session = auth.sign_in(&email, &password)?;
            println!("Signed in as {}", session.email);
        }

        Commands::Logout => {
            auth.sign_out()?;
            println!("Signed out.");
        }

        Commands::Whoami => match auth.current_session()? {
            Some(session) => println!("Signed in as {}", session.email),
            None => println!("Not signed in. Run: apptrack login <email>"),
        },

        Commands::Forgot { email } => {
            auth.forgot_password(&email)?;
            println!("Reset code sent to {email}. Complete it with:");
            println!("  apptrack reset {email} <code>");
        }

        Commands::Reset {
            email,
            code,
            password,
        } => {
            let password = prompt_if_missing(password, "New password")?;
            auth.confirm_password(&email, &code, &password)?;
            println!("Password updated. Sign in with: apptrack login {email}");
        }

        Commands::List { status, search } => {
            require_session(&auth)?;
            let client = ApiClient::new(&config);
            let filter = match status {
                Some(name) => StatusFilter::Only(parse_status(&name)?),
                None => StatusFilter::All,
            };
            let records = client.list()?;
            let rows = visible_records(&records, search.as_deref().unwrap_or(""), &filter);
            if rows.is_empty() {
                println!("No applications found.");
            } else {
                print_table(&rows);
            }
        }

        Commands::Show { id } => {
            require_session(&auth)?;
            let client = ApiClient::new(&config);
            let records = client.list()?;
            match records.iter().find(|r| r.application_id == id) {
                Some(record) => print_record(record),
                None => println!("Application '{id}' not found."),
            }
        }

        Commands::Add {
            company,
            title,
            url,
            status,
            date,
            follow_up,
            notes,
        } => {
            require_session(&auth)?;
            let client = ApiClient::new(&config);

            let mut draft = ApplicationDraft::new();
            draft.company_name = company;
            draft.job_title = title;
            draft.job_post_url = url.and_then(|v| blank_to_none(&v));
            if let Some(name) = status {
                draft.status = parse_status(&name)?;
            }
            if let Some(value) = date {
                draft.date_applied = value;
            }
            draft.follow_up_date = follow_up.and_then(|v| blank_to_none(&v));
            draft.notes = notes.and_then(|v| blank_to_none(&v));
            check_draft(&draft)?;

            match client.create(&draft)? {
                CreateOutcome::Created(record) => {
                    println!(
                        "Added application {} ({} at {})",
                        record.application_id, record.job_title, record.company_name
                    );
                }
                CreateOutcome::Unknown => {
                    // Stored without an echo; refresh to learn the id.
                    let records = client.list()?;
                    match records.iter().find(|r| {
                        r.company_name == draft.company_name
                            && r.job_title == draft.job_title
                            && r.date_applied == draft.date_applied
                    }) {
                        Some(record) => println!("Added application {}", record.application_id),
                        None => println!("Added application ({} total)", records.len()),
                    }
                }
            }
        }

        Commands::Update {
            id,
            company,
            title,
            url,
            status,
            date,
            follow_up,
            notes,
        } => {
            require_session(&auth)?;
            let client = ApiClient::new(&config);
            let records = client.list()?;
            let record = records
                .iter()
                .find(|r| r.application_id == id)
                .ok_or_else(|| anyhow!("Application '{id}' not found"))?;

            let mut draft = record.draft();
            if let Some(value) = company {
                draft.company_name = value;
            }
            if let Some(value) = title {
                draft.job_title = value;
            }
            if let Some(value) = url {
                draft.job_post_url = blank_to_none(&value);
            }
            if let Some(name) = status {
                draft.status = parse_status(&name)?;
            }
            if let Some(value) = date {
                draft.date_applied = value;
            }
            if let Some(value) = follow_up {
                draft.follow_up_date = blank_to_none(&value);
            }
            if let Some(value) = notes {
                draft.notes = blank_to_none(&value);
            }
            check_draft(&draft)?;

            client.update(&id, &draft)?;
            println!("Updated application {id}");
        }

        Commands::Delete { id, yes } => {
            require_session(&auth)?;
            let client = ApiClient::new(&config);
            if !yes && !confirm(&format!("Delete application {id}? [y/N] "))? {
                println!("Aborted.");
                return Ok(());
            }
            client.delete(&id)?;
            println!("Deleted application {id}");
        }

        Commands::Dash => {
            let session = require_session(&auth)?;
            let client = ApiClient::new(&config);
            tui::run_dashboard(client, session)?;
        }
    }

    Ok(())
}

/// File logging always; terminal logging only for the line-oriented
/// commands. The dashboard owns the terminal, so its warnings go to the
/// file instead of tearing the UI.
fn init_logging(dashboard_mode: bool) {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if !dashboard_mode {
        loggers.push(TermLogger::new(
            LevelFilter::Warn,
            log_config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    let log_path = config::data_dir().join("apptrack.log");
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match File::create(&log_path) {
        Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Info, log_config, file)),
        Err(err) => eprintln!("Warning: no log file at {}: {err}", log_path.display()),
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}

fn require_session(auth: &AuthClient) -> Result<Session> {
    auth.current_session()?
        .ok_or_else(|| anyhow!("Not signed in. Run: apptrack login <email>"))
}

fn parse_status(name: &str) -> Result<Status> {
    match name.to_lowercase().as_str() {
        "applied" => Ok(Status::Applied),
        "interview" => Ok(Status::Interview),
        "offer" => Ok(Status::Offer),
        "rejected" => Ok(Status::Rejected),
        _ => bail!("Unknown status '{name}'. Available: applied, interview, offer, rejected"),
    }
}

fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn check_draft(draft: &ApplicationDraft) -> Result<()> {
    let errors = validate_fields(
        &draft.company_name,
        &draft.job_title,
        draft.job_post_url.as_deref().unwrap_or(""),
    );
    if errors.is_empty() {
        return Ok(());
    }
    for field in FormField::ORDER {
        if let Some(message) = errors.get(&field) {
            eprintln!("{}: {}", field.label(), message);
        }
    }
    bail!("Validation failed")
}

fn prompt_if_missing(provided: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = provided {
        return Ok(value);
    }
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{label} must not be empty");
    }
    Ok(value)
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn print_table(rows: &[&ApplicationRecord]) {
    println!(
        "{:<14} {:<10} {:<22} {:<26} {:>10}",
        "ID", "STATUS", "COMPANY", "TITLE", "APPLIED"
    );
    println!("{}", "-".repeat(86));
    for record in rows {
        println!(
            "{:<14} {:<10} {:<22} {:<26} {:>10}",
            truncate(&record.application_id, 12),
            truncate(record.status.as_str(), 10),
            truncate(&record.company_name, 20),
            truncate(&record.job_title, 24),
            record.date_applied
        );
    }
}

fn print_record(record: &ApplicationRecord) {
    println!("Application {}", record.application_id);
    println!("Company: {}", record.company_name);
    println!("Title: {}", record.job_title);
    println!("Status: {}", record.status);
    println!("Applied: {}", record.date_applied);
    if let Some(follow_up) = &record.follow_up_date {
        println!("Follow up: {}", follow_up);
    }
    if let Some(url) = &record.job_post_url {
        println!("URL: {}", url);
    }
    if let Some(notes) = &record.notes {
        println!("\nNotes:\n{}", notes);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
