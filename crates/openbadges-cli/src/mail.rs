//! Notification mail for issued badges.
//!
//! Templates are plain text: the first line is the subject, the rest is the
//! body. `{badge}`, `{recipient}` and `{uid}` are substituted.
//!
//! Messages are submitted over SMTP, or written as `.eml` files into a spool
//! directory for a local MTA, depending on `[mail] transport`.

use crate::config::{MailConfig, MailTransport, SmtpSecurity};
use lettre::address::AddressError;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use openbadges_issuer::IssuedBadge;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from rendering or delivering badge mail.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("cannot read mail template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mail template {} has no subject line", .0.display())]
    EmptyTemplate(PathBuf),

    #[error("mail {field} contains control characters")]
    InvalidHeader { field: &'static str },

    #[error("mail {field} is not a valid address: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: AddressError,
    },

    #[error("cannot read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot compose message: {0}")]
    Compose(String),

    #[error("cannot spool message to {}: {source}", path.display())]
    Spool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Subject and body with placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailTemplate {
    subject: String,
    body: String,
}

impl MailTemplate {
    /// Reads a template file.
    pub fn load(path: &Path) -> Result<Self, MailError> {
        let text = std::fs::read_to_string(path).map_err(|source| MailError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).ok_or_else(|| MailError::EmptyTemplate(path.to_path_buf()))
    }

    /// Splits template text into subject and body; `None` if there is no subject.
    pub fn parse(text: &str) -> Option<Self> {
        let (subject, body) = text.split_once('\n').unwrap_or((text, ""));
        let subject = subject.trim();
        if subject.is_empty() {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            body: body.trim_start_matches(['\r', '\n']).to_string(),
        })
    }

    /// Fills in the placeholders for an issued badge.
    pub fn render(&self, issued: &IssuedBadge) -> (String, String) {
        let fill = |text: &str| {
            text.replace("{badge}", issued.badge_id.as_str())
                .replace("{recipient}", &issued.recipient)
                .replace("{uid}", issued.uid.as_str())
        };
        (fill(&self.subject), fill(&self.body))
    }
}

/// A message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Baked badge to attach.
    pub attachment: PathBuf,
}

impl OutgoingMail {
    /// Renders `template` for `issued`, attaching the baked artifact.
    ///
    /// Header values must be single-line: a CR or LF in the sender, the
    /// recipient or the rendered subject is rejected.
    pub fn for_badge(
        from: &str,
        template: &MailTemplate,
        issued: &IssuedBadge,
    ) -> Result<Self, MailError> {
        let (subject, body) = template.render(issued);
        let headers = [
            ("sender", from),
            ("recipient", issued.recipient.as_str()),
            ("subject", subject.as_str()),
        ];
        for (field, value) in headers {
            if value.chars().any(char::is_control) {
                return Err(MailError::InvalidHeader { field });
            }
        }

        Ok(Self {
            from: from.to_string(),
            to: issued.recipient.clone(),
            subject,
            body,
            attachment: issued.path.clone(),
        })
    }

    fn file_name(&self) -> &str {
        self.attachment
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("badge.svg")
    }

    /// Builds the MIME message: text body plus the badge as a base64 attachment.
    fn compose(&self) -> Result<Message, MailError> {
        let address = |field: &'static str, value: &str| {
            value
                .parse::<Mailbox>()
                .map_err(|source| MailError::Address { field, source })
        };
        let bytes = std::fs::read(&self.attachment).map_err(|source| MailError::Attachment {
            path: self.attachment.clone(),
            source,
        })?;

        let file_name = self.file_name();
        let content_type = match file_name.rsplit_once('.').map(|(_, ext)| ext) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        };
        let content_type =
            ContentType::parse(content_type).map_err(|e| MailError::Compose(e.to_string()))?;
        let body = Body::new_with_encoding(bytes, ContentTransferEncoding::Base64)
            .map_err(|_| MailError::Compose("attachment encoding".to_string()))?;

        Message::builder()
            .from(address("sender", &self.from)?)
            .to(address("recipient", &self.to)?)
            .subject(self.subject.as_str())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.body.clone()))
                    .singlepart(Attachment::new(file_name.to_string()).body(body, content_type)),
            )
            .map_err(|e| MailError::Compose(e.to_string()))
    }
}

/// Hands a badge message to some delivery mechanism.
pub trait BadgeMailer {
    /// Delivers `mail`.
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Builds the mailer selected by `[mail] transport`.
pub fn mailer_for(settings: &MailConfig) -> Result<Box<dyn BadgeMailer>, MailError> {
    match settings.transport {
        MailTransport::Smtp => Ok(Box::new(SmtpMailer::new(settings)?)),
        MailTransport::Spool => Ok(Box::new(SpoolMailer::new(
            settings.spool_dir.clone().unwrap_or_default(),
        ))),
    }
}

/// Submits messages to an SMTP relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Prepares a relay connection; nothing is contacted until delivery.
    pub fn new(settings: &MailConfig) -> Result<Self, MailError> {
        let server = settings.smtp_server.as_deref().unwrap_or_default();
        let mut builder = match settings.security {
            SmtpSecurity::Tls => SmtpTransport::relay(server)?,
            SmtpSecurity::Starttls => SmtpTransport::starttls_relay(server)?,
            SmtpSecurity::Plain => SmtpTransport::builder_dangerous(server),
        }
        .timeout(Some(SMTP_TIMEOUT));

        if let Some(port) = settings.smtp_port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl BadgeMailer for SmtpMailer {
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = mail.compose()?;
        self.transport.send(&message)?;
        tracing::info!(to = %mail.to, "badge mail sent");
        Ok(())
    }
}

/// Writes each message as an `.eml` file into a spool directory for a local
/// MTA to pick up.
#[derive(Debug, Clone)]
pub struct SpoolMailer {
    spool_dir: PathBuf,
}

impl SpoolMailer {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    /// Where the message for `mail` is spooled.
    pub fn target(&self, mail: &OutgoingMail) -> PathBuf {
        let file_name = mail.file_name();
        let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
        self.spool_dir.join(format!("{stem}.eml"))
    }
}

impl BadgeMailer for SpoolMailer {
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let spool_err = |source: std::io::Error| MailError::Spool {
            path: self.spool_dir.clone(),
            source,
        };

        let message = mail.compose()?;
        std::fs::create_dir_all(&self.spool_dir).map_err(spool_err)?;
        let target = self.target(mail);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.spool_dir).map_err(spool_err)?;
        tmp.write_all(&message.formatted()).map_err(spool_err)?;
        tmp.persist(&target).map_err(|e| spool_err(e.error))?;

        tracing::info!(to = %mail.to, path = %target.display(), "badge mail spooled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openbadges_canonical::{BadgeId, Uid};
    use openbadges_core::JwsAlgorithm;
    use tempfile::TempDir;

    fn issued(recipient: &str, path: PathBuf) -> IssuedBadge {
        IssuedBadge {
            badge_id: BadgeId::parse("bio101").unwrap(),
            recipient: recipient.into(),
            uid: Uid::parse("0123456789abcdef0123456789abcdef").unwrap(),
            path,
            alg: JwsAlgorithm::RS256,
            expires: None,
        }
    }

    fn smtp_settings(port: u16) -> MailConfig {
        MailConfig {
            from: "badges@example.org".into(),
            transport: MailTransport::Smtp,
            smtp_server: Some("127.0.0.1".into()),
            smtp_port: Some(port),
            security: SmtpSecurity::Plain,
            username: None,
            password: None,
            spool_dir: None,
        }
    }

    #[test]
    fn test_template_render() {
        let template =
            MailTemplate::parse("Your {badge} badge\n\nHello {recipient},\nuid {uid}\n").unwrap();
        let (subject, body) =
            template.render(&issued("alice@example.org", PathBuf::from("x.svg")));
        assert_eq!(subject, "Your bio101 badge");
        assert_eq!(
            body,
            "Hello alice@example.org,\nuid 0123456789abcdef0123456789abcdef\n"
        );
    }

    #[test]
    fn test_template_without_subject() {
        assert!(MailTemplate::parse("\nbody only").is_none());
        assert!(MailTemplate::parse("").is_none());
    }

    #[test]
    fn test_header_injection_is_rejected() {
        let template = MailTemplate::parse("Your {badge} badge\nbody").unwrap();
        let badge = PathBuf::from("bio101_0123.svg");

        let err = OutgoingMail::for_badge(
            "badges@example.org",
            &template,
            &issued("alice@example.org\r\nBcc: mallory@example.org", badge.clone()),
        )
        .unwrap_err();
        assert!(matches!(err, MailError::InvalidHeader { field: "recipient" }));

        let err = OutgoingMail::for_badge(
            "badges@example.org\n",
            &template,
            &issued("alice@example.org", badge.clone()),
        )
        .unwrap_err();
        assert!(matches!(err, MailError::InvalidHeader { field: "sender" }));

        // Placeholders are filled before the check.
        let template = MailTemplate::parse("Badge for {recipient}\nbody").unwrap();
        let err = OutgoingMail::for_badge(
            "badges@example.org",
            &template,
            &issued("alice@example.org\rX-Spam: yes", badge),
        )
        .unwrap_err();
        assert!(matches!(err, MailError::InvalidHeader { .. }));
    }

    #[test]
    fn test_spool_writes_mime_message() {
        let dir = TempDir::new().unwrap();
        let badge = dir.path().join("bio101_0123.svg");
        std::fs::write(&badge, "<svg/>").unwrap();

        let template = MailTemplate::parse("Your {badge} badge\nCongratulations!").unwrap();
        let mail = OutgoingMail::for_badge(
            "badges@example.org",
            &template,
            &issued("alice@example.org", badge),
        )
        .unwrap();
        let mailer = SpoolMailer::new(dir.path().join("outbox"));
        mailer.deliver(&mail).unwrap();

        let spooled = mailer.target(&mail);
        assert_eq!(spooled, dir.path().join("outbox").join("bio101_0123.eml"));
        let message = std::fs::read_to_string(&spooled).unwrap();
        assert!(message.contains("To: alice@example.org\r\n"));
        assert!(message.contains("Subject: Your bio101 badge\r\n"));
        assert!(message.contains("Content-Type: image/svg+xml"));
        assert!(message.contains("filename=\"bio101_0123.svg\""));
        // base64 of `<svg/>`
        assert!(message.contains("PHN2Zy8+"));
        assert!(message.contains("Congratulations!"));
    }

    #[test]
    fn test_invalid_address_is_rejected_before_delivery() {
        let dir = TempDir::new().unwrap();
        let badge = dir.path().join("bio101_0123.svg");
        std::fs::write(&badge, "<svg/>").unwrap();

        let template = MailTemplate::parse("Your badge\nbody").unwrap();
        let mail =
            OutgoingMail::for_badge("badges@example.org", &template, &issued("not an address", badge))
                .unwrap();
        let mailer = SpoolMailer::new(dir.path().join("outbox"));
        assert!(matches!(
            mailer.deliver(&mail),
            Err(MailError::Address { field: "recipient", .. })
        ));
        assert!(!mailer.target(&mail).exists());
    }

    #[test]
    fn test_smtp_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let badge = dir.path().join("bio101_0123.svg");
        std::fs::write(&badge, "<svg/>").unwrap();

        // Bind then drop a listener so the port is known to be closed.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let template = MailTemplate::parse("Your badge\nbody").unwrap();
        let mail = OutgoingMail::for_badge(
            "badges@example.org",
            &template,
            &issued("alice@example.org", badge),
        )
        .unwrap();

        let mailer = mailer_for(&smtp_settings(port)).unwrap();
        assert!(matches!(mailer.deliver(&mail), Err(MailError::Smtp(_))));
    }
}
