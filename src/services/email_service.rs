use crate::config::AppConfig;
use crate::utils::{time::format_long_date, AppError};
use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const LIBRARY_NAME: &str = "ASTUMSJ Library";
const SUPPORT_ADDRESS: &str = "support@astumsj.library.com";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outgoing mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build mail client: {}", e)))?;

        Ok(Self { client, url, api_key, from })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Mail relay unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Mail relay answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no relay is configured: messages only reach the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        log::info!("📧 [mail disabled] to={} subject=\"{}\"", message.to, message.subject);
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>, AppError> {
    match &config.mail_api_url {
        Some(url) => {
            log::info!("📧 Mail relay: {}", url);
            let mailer = HttpMailer::new(url.clone(), config.mail_api_key.clone(), config.mail_from.clone())?;
            Ok(Arc::new(mailer))
        }
        None => {
            log::warn!("⚠️  MAIL_API_URL not set, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Sends and reports success; a failed send is logged and never propagated.
pub async fn send_email(mailer: &dyn Mailer, message: EmailMessage) -> bool {
    match mailer.send(&message).await {
        Ok(()) => {
            log::info!("📧 Email sent to {}: {}", message.to, message.subject);
            true
        }
        Err(e) => {
            log::error!("❌ Email to {} failed: {}", message.to, e);
            false
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px;">
  <h1 style="color: #8B4513; text-align: center;">{title}</h1>
  {body}
  <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #e0e0e0; text-align: center;">
    <p style="margin: 0; color: #666;">{LIBRARY_NAME} Management System</p>
  </div>
</div>"#
    )
}

pub fn verification_email(to: &str, verification_link: &str) -> EmailMessage {
    let link = encode_double_quoted_attribute(verification_link);
    let body = format!(
        r#"<p>Thank you for applying for membership with {LIBRARY_NAME}!</p>
  <p>To complete your membership application, we need to verify your email address.</p>
  <div style="text-align: center; margin: 30px 0;">
    <a href="{link}" style="background-color: #8B4513; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">Verify Email Address</a>
  </div>
  <p>This verification link will expire in 24 hours.</p>
  <p>If you didn't request this membership, you can safely ignore this email.</p>"#
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Verify Your Email for {} Membership", LIBRARY_NAME),
        html: layout(&format!("Email Verification for {} Membership", LIBRARY_NAME), &body),
    }
}

pub fn request_received_email(to: &str, user_name: &str) -> EmailMessage {
    let name = encode_text(user_name);
    let body = format!(
        r#"<p>Dear {name},</p>
  <p>We have received your membership request for the {LIBRARY_NAME}. Your request is currently being processed.</p>
  <p><strong>Next steps:</strong></p>
  <ol>
    <li>Verify your email address using the link sent separately</li>
    <li>Our staff will review your ID card and payment proof</li>
    <li>You will receive an email once your membership is approved</li>
  </ol>
  <p>If you have any questions, please contact our support team at <a href="mailto:{SUPPORT_ADDRESS}">{SUPPORT_ADDRESS}</a></p>"#
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("{} Membership Request Submitted", LIBRARY_NAME),
        html: layout("Thank You for Your Membership Request", &body),
    }
}

pub fn approval_email(to: &str, user_name: &str, expiry_date: i64) -> EmailMessage {
    let name = encode_text(user_name);
    let expiry = format_long_date(expiry_date);
    let body = format!(
        r#"<p>Dear {name},</p>
  <p>We are delighted to inform you that your {LIBRARY_NAME} membership application has been approved!</p>
  <div style="background-color: #f9f5f0; padding: 15px; border-radius: 5px; margin: 20px 0;">
    <p style="margin: 0;"><strong>Your membership is valid until: {expiry}</strong></p>
  </div>
  <p>You can now borrow books from the library or through the online portal.</p>
  <p>Happy reading!</p>"#
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Your {} Membership is Approved!", LIBRARY_NAME),
        html: layout("Congratulations! Your Membership is Approved", &body),
    }
}

pub fn rejection_email(to: &str, user_name: &str, reason: &str) -> EmailMessage {
    let name = encode_text(user_name);
    let reason = encode_text(reason);
    let body = format!(
        r#"<p>Dear {name},</p>
  <p>Thank you for your interest in becoming a member of the {LIBRARY_NAME}. We have reviewed your application carefully.</p>
  <p>Unfortunately, we are unable to approve your membership application at this time due to the following reason:</p>
  <div style="background-color: #fdf2f2; padding: 15px; border-left: 4px solid #c0392b; margin: 20px 0;">
    <p style="margin: 0;">{reason}</p>
  </div>
  <p>You are welcome to submit a new application addressing the issues mentioned above.</p>"#
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Update on Your {} Membership Application", LIBRARY_NAME),
        html: layout(&format!("{} Membership Status Update", LIBRARY_NAME), &body),
    }
}

pub fn due_soon_email(to: &str, user_name: &str, book_title: &str, due_date: i64) -> EmailMessage {
    let body = format!(
        "<p>Dear {},</p>\n  <p>This is a reminder that <strong>{}</strong> is due on <strong>{}</strong>.</p>\n  <p>Please return it on time to avoid late fees.</p>",
        encode_text(user_name),
        encode_text(book_title),
        format_long_date(due_date)
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Reminder: \"{}\" is due soon", book_title),
        html: layout("Book Due Soon", &body),
    }
}

pub fn overdue_email(to: &str, user_name: &str, book_title: &str, due_date: i64, fee_per_day: f64) -> EmailMessage {
    let fee_line = if fee_per_day > 0.0 {
        format!("<p>A late fee of {:.2} per day applies until the book is returned.</p>", fee_per_day)
    } else {
        String::new()
    };
    let body = format!(
        "<p>Dear {},</p>\n  <p><strong>{}</strong> was due on <strong>{}</strong> and is now overdue.</p>\n  {}\n  <p>Please return it as soon as possible.</p>",
        encode_text(user_name),
        encode_text(book_title),
        format_long_date(due_date),
        fee_line
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Overdue: \"{}\"", book_title),
        html: layout("Book Overdue", &body),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every message in memory.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<EmailMessage>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Internal("relay down".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_user_text_is_escaped() {
        let received = request_received_email("a@example.com", "<b>Tom & Jerry</b>");
        assert!(received.html.contains("Dear &lt;b&gt;Tom &amp; Jerry&lt;/b&gt;,"));
        assert!(!received.html.contains("<b>Tom"));

        let due = due_soon_email("a@example.com", "Amina", "<script>x</script>", 0);
        assert!(due.html.contains("&lt;script&gt;x&lt;/script&gt;"));
    }

    #[test]
    fn test_verification_link_cannot_break_out_of_href() {
        let verify = verification_email("a@example.com", "http://x/verify?a=1&b=\"><script>");
        assert!(verify.html.contains(r#"href="http://x/verify?a=1&amp;b=&quot;&gt;&lt;script&gt;""#));
        assert!(!verify.html.contains("\"><script>"));
    }

    #[test]
    fn test_templates() {
        let verify = verification_email("a@example.com", "http://localhost:5000/api/membership/verify-email/abc");
        assert!(verify.html.contains("/verify-email/abc"));
        assert!(verify.html.contains("24 hours"));

        let expiry = Utc.with_ymd_and_hms(2026, 9, 5, 0, 0, 0).unwrap().timestamp();
        let approved = approval_email("a@example.com", "Amina", expiry);
        assert!(approved.html.contains("September 5, 2026"));
        assert!(approved.subject.contains("Approved"));

        let rejected = rejection_email("a@example.com", "Amina", "<blurry> ID");
        assert!(rejected.html.contains("&lt;blurry&gt; ID"));

        let overdue = overdue_email("a@example.com", "Amina", "Al-Muqaddimah", expiry, 2.0);
        assert!(overdue.html.contains("2.00 per day"));
        let overdue = overdue_email("a@example.com", "Amina", "Al-Muqaddimah", expiry, 0.0);
        assert!(!overdue.html.contains("late fee"));
    }

    #[tokio::test]
    async fn test_send_email_reports_outcome() {
        let ok = RecordingMailer::default();
        assert!(send_email(&ok, request_received_email("a@example.com", "Amina")).await);
        assert_eq!(ok.sent.lock().unwrap().len(), 1);

        let down = RecordingMailer { fail: true, ..Default::default() };
        assert!(!send_email(&down, request_received_email("a@example.com", "Amina")).await);
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&due_soon_email("a@example.com", "Amina", "Book", 0)).await.is_ok());
    }
}
