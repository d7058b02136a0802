//! SMTP mailbox probe: EHLO, MAIL FROM, RCPT TO, QUIT. No DATA is ever sent.
//!
//! The probe reports existence only for conclusive server answers; transient
//! codes, greylisting and connection trouble come back inconclusive so the
//! caller can decide whether a retry is worth it.

use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::time::Duration;

use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::commands::{Ehlo, Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Severity;
use lettre::Address;
use tracing::{debug, warn};

/// Outcome of one RCPT probe.
#[derive(Debug, Clone)]
pub struct SmtpProbeResult {
    /// `Some(true)` = mailbox exists, `Some(false)` = rejected,
    /// `None` = inconclusive.
    pub exists: Option<bool>,
    pub message: String,
    pub should_retry: bool,
}

impl SmtpProbeResult {
    fn conclusive(exists: bool, message: String) -> Self {
        SmtpProbeResult {
            exists: Some(exists),
            message,
            should_retry: false,
        }
    }

    fn inconclusive(message: String, should_retry: bool) -> Self {
        SmtpProbeResult {
            exists: None,
            message,
            should_retry,
        }
    }
}

/// Probe `email` against `mail_server` on port 25. The connection setup uses
/// blocking I/O; callers run this through `spawn_blocking`.
pub fn probe_mailbox(
    email: &str,
    mail_server: &str,
    sender: &str,
    timeout: Duration,
) -> SmtpProbeResult {
    debug!("SMTP probe for {} via {}", email, mail_server);

    let recipient = match Address::from_str(email) {
        Ok(addr) => addr,
        Err(e) => {
            return SmtpProbeResult::conclusive(false, format!("invalid recipient format: {}", e));
        }
    };
    let sender_address = match Address::from_str(sender) {
        Ok(addr) => addr,
        Err(e) => {
            return SmtpProbeResult::inconclusive(format!("invalid sender address: {}", e), false);
        }
    };

    let socket_addr = match (mail_server, 25_u16)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
    {
        Some(addr) => addr,
        None => {
            return SmtpProbeResult::inconclusive(
                format!("could not resolve mail server {}", mail_server),
                false,
            );
        }
    };

    let helo = ClientId::Domain("localhost".to_string());
    let mut conn = match SmtpConnection::connect(socket_addr, Some(timeout), &helo, None, None) {
        Ok(conn) => conn,
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("timed out") || msg.contains("connection refused") {
                // Port 25 is blocked on most consumer networks.
                return SmtpProbeResult::inconclusive(
                    format!("connection to {} failed: {}", mail_server, msg),
                    false,
                );
            }
            return SmtpProbeResult::inconclusive(format!("SMTP connect error: {}", msg), true);
        }
    };

    if let Err(e) = conn.command(Ehlo::new(helo.clone())) {
        conn.quit().ok();
        return SmtpProbeResult::inconclusive(format!("EHLO rejected: {}", e), true);
    }

    match conn.command(Mail::new(Some(sender_address), vec![])) {
        Ok(response) if response.is_positive() => {}
        Ok(response) => {
            conn.quit().ok();
            return SmtpProbeResult::inconclusive(
                format!("MAIL FROM rejected: {}", response.code()),
                false,
            );
        }
        Err(e) => {
            conn.quit().ok();
            return SmtpProbeResult::inconclusive(format!("MAIL FROM error: {}", e), true);
        }
    }

    let result = match conn.command(Rcpt::new(recipient, vec![])) {
        Ok(response) => {
            let code = response.code();
            let message = response.message().collect::<Vec<&str>>().join(" ");
            debug!("RCPT TO {} -> {} {}", email, code, message);

            match code.severity {
                Severity::PositiveCompletion => {
                    // Accept 250/251 only; anything else positive is odd
                    // enough to treat as inconclusive.
                    let numeric = u16::from(code);
                    if numeric == 250 || numeric == 251 {
                        SmtpProbeResult::conclusive(true, format!("accepted: {} {}", code, message))
                    } else {
                        SmtpProbeResult::inconclusive(
                            format!("unexpected positive code: {} {}", code, message),
                            true,
                        )
                    }
                }
                Severity::PositiveIntermediate => SmtpProbeResult::inconclusive(
                    format!("unexpected intermediate code: {} {}", code, message),
                    true,
                ),
                Severity::TransientNegativeCompletion => SmtpProbeResult::inconclusive(
                    format!("transient failure (greylisting?): {} {}", code, message),
                    true,
                ),
                Severity::PermanentNegativeCompletion => SmtpProbeResult::conclusive(
                    false,
                    format!("rejected: {} {}", code, message),
                ),
            }
        }
        Err(e) => {
            let msg = e.to_string();
            if is_user_unknown(&msg) {
                SmtpProbeResult::conclusive(false, format!("user unknown: {}", msg))
            } else if msg.contains("timed out") || msg.contains("connection reset") {
                SmtpProbeResult::inconclusive(format!("RCPT error: {}", msg), true)
            } else {
                warn!("Unhandled SMTP error for {}: {}", email, msg);
                SmtpProbeResult::inconclusive(format!("RCPT error: {}", msg), true)
            }
        }
    };

    conn.quit().ok();
    result
}

fn is_user_unknown(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("550")
        && [
            "does not exist",
            "no such user",
            "user unknown",
            "recipient not found",
            "mailbox unavailable",
        ]
        .iter()
        .any(|phrase| lower.contains(phrase))
}
