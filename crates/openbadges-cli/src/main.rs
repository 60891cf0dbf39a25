//! openbadges-signer - issue a signed, baked Open Badge to one recipient.

use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

mod config;
mod error;
mod mail;
mod output;

use config::SignerConfig;
use error::CliError;
use mail::{mailer_for, BadgeMailer, MailTemplate, OutgoingMail};
use openbadges_issuer::{issue, IssueContext, IssueRequest};

#[derive(Parser)]
#[command(name = "openbadges-signer", version)]
#[command(about = "Sign an Open Badges assertion and bake it into the badge image")]
#[command(group(
    ArgGroup::new("evidence_choice")
        .required(true)
        .args(["evidence", "no_evidence"])
))]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Badge to issue, as named in the configuration
    #[arg(short, long)]
    badge: String,

    /// Recipient email address
    #[arg(short, long, visible_alias = "receptor")]
    recipient: String,

    /// Directory the baked badge is written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Mail the baked badge to the recipient
    #[arg(short = 'M', long)]
    mail_badge: bool,

    /// URL of the recipient's evidence
    #[arg(short, long)]
    evidence: Option<String>,

    /// Issue without evidence
    #[arg(short = 'E', long)]
    no_evidence: bool,

    /// Expire the badge after DAYS days
    #[arg(short = 'x', long, value_name = "DAYS", value_parser = clap::value_parser!(i64).range(1..))]
    expires: Option<i64>,

    /// Show debug messages
    #[arg(short, long)]
    debug: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Console logging on stderr, plus the signer log when one is configured.
fn init_tracing(debug: bool, signer_log: Option<&Path>) -> Result<(), CliError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("openbadges_signer=debug,openbadges_issuer=debug,openbadges_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("openbadges_signer=info,openbadges_issuer=info"))
    };

    let file_layer = match signer_log {
        Some(path) => {
            let open_err = |e: std::io::Error| {
                CliError::Config(format!("cannot open signer log {}: {}", path.display(), e))
            };
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(open_err)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(open_err)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("openbadges_signer=info,openbadges_issuer=info")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // The signer log location comes from the configuration, so it is read first.
    let result = SignerConfig::load(&cli.config).and_then(|config| {
        init_tracing(cli.debug, config.signer_log().as_deref())?;
        run(&cli, &config)
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli, config: &SignerConfig) -> Result<(), CliError> {
    let definition = config.definition(&cli.badge)?;

    // Mail settings are checked up front so a misconfiguration never follows a signature.
    let mailing = if cli.mail_badge {
        let (settings, template_path) = config.mail_settings(&cli.badge)?;
        let template = MailTemplate::load(&template_path)
            .map_err(|e| CliError::Config(e.to_string()))?;
        let mailer = mailer_for(&settings).map_err(|e| CliError::Config(e.to_string()))?;
        Some((settings, template, mailer))
    } else {
        None
    };

    let ctx = IssueContext::new(&definition.id);
    info!(recipient = %cli.recipient, "generating signature for badge '{}'", definition.name);
    let issued = issue(
        &ctx,
        &IssueRequest {
            definition: &definition,
            recipient: &cli.recipient,
            evidence: cli.evidence.as_deref(),
            no_evidence: cli.no_evidence,
            expires_days: cli.expires,
            output_dir: &cli.output,
        },
    )?;
    output::print_summary(&issued, cli.json);

    if let Some((settings, template, mailer)) = mailing {
        let mail = OutgoingMail::for_badge(&settings.from, &template, &issued)?;
        mailer.deliver(&mail)?;
    }
    Ok(())
}
