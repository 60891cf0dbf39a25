use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::CliError;
use openbadges_canonical::{BadgeId, HttpUrl};
use openbadges_core::BadgeDefinition;

/// Directory settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory badge images are looked up in; `local_image` is relative to it.
    #[serde(default)]
    pub base_image: Option<PathBuf>,
    /// Directory log files are written to.
    #[serde(default)]
    pub base_log: Option<PathBuf>,
}

/// Log file settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsConfig {
    /// Signer log recording every badge issued, relative to `paths.base_log`.
    #[serde(default)]
    pub signer: Option<PathBuf>,
}

/// How badge mail leaves this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// Submit to an SMTP relay.
    #[default]
    Smtp,
    /// Write `.eml` files for a local MTA.
    Spool,
}

/// Connection security for SMTP submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, port 465 unless `smtp_port` is set.
    #[default]
    Tls,
    /// STARTTLS upgrade, port 587 unless `smtp_port` is set.
    Starttls,
    /// Unencrypted, port 25 unless `smtp_port` is set.
    Plain,
}

/// Mail delivery settings, needed only with `--mail-badge`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    /// Sender address.
    pub from: String,
    #[serde(default)]
    pub transport: MailTransport,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub security: SmtpSecurity,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Directory outgoing messages are spooled to.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

/// One `[badges.<id>]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BadgeConfig {
    /// Display name.
    pub name: String,
    /// URL of the BadgeClass JSON.
    pub badge: HttpUrl,
    /// Public URL of the badge image.
    pub image: HttpUrl,
    /// Public URL of the issuer's verification key.
    pub verify_key: HttpUrl,
    /// Carrier image file.
    pub local_image: PathBuf,
    /// Issuer private key file.
    pub private_key: PathBuf,
    /// Mail template file.
    #[serde(default)]
    pub mail: Option<PathBuf>,
}

/// Signer configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignerConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub mail: Option<MailConfig>,

    #[serde(default)]
    pub badges: BTreeMap<String, BadgeConfig>,

    /// Directory of the configuration file; relative paths resolve against it.
    #[serde(skip)]
    base_dir: PathBuf,

    #[serde(skip)]
    source: PathBuf,
}

impl SignerConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// A missing or empty file is an error; the signer has no usable defaults.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                CliError::Config(format!("config file {} does not exist", path.display()))
            }
            _ => CliError::Config(format!("cannot read {}: {}", path.display(), e)),
        })?;
        if contents.trim().is_empty() {
            return Err(CliError::Config(format!(
                "config file {} is empty",
                path.display()
            )));
        }

        let mut config: SignerConfig = toml::from_str(&contents)?;
        config.base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.source = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.badges.is_empty() {
            return Err(CliError::Config("no badges are defined".into()));
        }
        for (id, badge) in &self.badges {
            BadgeId::parse(id.as_str())
                .map_err(|e| CliError::Config(format!("badge '{}': {}", id, e)))?;
            if badge.name.trim().is_empty() {
                return Err(CliError::Config(format!("badge '{}' has an empty name", id)));
            }
        }
        if let Some(mail) = &self.mail {
            if !mail.from.contains('@') {
                return Err(CliError::Config(format!(
                    "mail.from must be an email address, got '{}'",
                    mail.from
                )));
            }
            match mail.transport {
                MailTransport::Smtp if mail.smtp_server.as_deref().map_or(true, str::is_empty) => {
                    return Err(CliError::Config(
                        "mail.smtp_server is required for the smtp transport".into(),
                    ));
                }
                MailTransport::Spool if mail.spool_dir.is_none() => {
                    return Err(CliError::Config(
                        "mail.spool_dir is required for the spool transport".into(),
                    ));
                }
                _ => {}
            }
            if mail.username.is_some() != mail.password.is_some() {
                return Err(CliError::Config(
                    "mail.username and mail.password must be set together".into(),
                ));
            }
        }
        Ok(())
    }

    /// Resolved path of the signer log, if one is configured.
    pub fn signer_log(&self) -> Option<PathBuf> {
        let file = self.logs.signer.as_ref()?;
        let dir = match &self.paths.base_log {
            Some(dir) => self.resolve(dir),
            None => self.base_dir.clone(),
        };
        Some(dir.join(file))
    }

    /// Builds the definition of badge `id` with file paths resolved.
    pub fn definition(&self, id: &str) -> Result<BadgeDefinition, CliError> {
        let badge = self.badge(id)?;
        let image_dir = match &self.paths.base_image {
            Some(dir) => self.resolve(dir),
            None => self.base_dir.clone(),
        };

        Ok(BadgeDefinition {
            id: BadgeId::parse(id).map_err(|e| CliError::Config(e.to_string()))?,
            name: badge.name.clone(),
            json_url: badge.badge.clone(),
            image_url: badge.image.clone(),
            verify_key_url: badge.verify_key.clone(),
            local_image: image_dir.join(&badge.local_image),
            private_key: self.resolve(&badge.private_key),
        })
    }

    /// Mail settings and the resolved template path for badge `id`.
    pub fn mail_settings(&self, id: &str) -> Result<(MailConfig, PathBuf), CliError> {
        let mail = self
            .mail
            .as_ref()
            .ok_or_else(|| CliError::Config("mailing requested but [mail] is not configured".into()))?;
        let template = self.badge(id)?.mail.as_ref().ok_or_else(|| {
            CliError::Config(format!("badge '{}' has no mail template", id))
        })?;

        let mut mail = mail.clone();
        mail.spool_dir = mail.spool_dir.map(|dir| self.resolve(&dir));
        Ok((mail, self.resolve(template)))
    }

    fn badge(&self, id: &str) -> Result<&BadgeConfig, CliError> {
        self.badges.get(id).ok_or_else(|| CliError::BadgeNotDefined {
            badge: id.to_string(),
            config: self.source.clone(),
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}
