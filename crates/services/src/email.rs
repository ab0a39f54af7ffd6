//! SMTP email: direct sends from chat, a test message, and the nightly
//! daily-summary digest. The SMTP password lives in config encrypted by
//! the secret box; it is decrypted only at connection time.
//!
//! The service holds the live config handle and reads the email sections
//! fresh on every call, so a `POST /api/email/config` patch takes effect
//! without a restart.

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, warn};

use nexira_actions::EmailSender;
use nexira_config::{AppConfig, DailyEmailConfig, EmailConfig};
use nexira_store::{SecretBox, Store};

pub struct EmailService {
    store: Arc<Store>,
    secret_box: Arc<SecretBox>,
    config: Arc<RwLock<AppConfig>>,
}

impl EmailService {
    pub fn new(store: Arc<Store>, secret_box: Arc<SecretBox>, config: Arc<RwLock<AppConfig>>) -> Self {
        Self {
            store,
            secret_box,
            config,
        }
    }

    /// Fresh snapshot of the SMTP section.
    fn email(&self) -> EmailConfig {
        self.config.read().expect("config lock").email.clone()
    }

    /// Fresh snapshot of the daily-summary section.
    fn daily(&self) -> DailyEmailConfig {
        self.config.read().expect("config lock").daily_email.clone()
    }

    pub fn enabled(&self) -> bool {
        let email = self.email();
        email.enabled && !email.smtp_server.is_empty() && !email.username.is_empty()
    }

    pub fn daily_enabled(&self) -> bool {
        let daily = self.daily();
        self.enabled() && daily.enabled && !daily.recipient.is_empty()
    }

    /// The daily summary goes out at most once per calendar day.
    pub fn should_send_today(&self) -> bool {
        if !self.daily_enabled() {
            return false;
        }
        !self.store.email_sent_today("daily_summary").unwrap_or(true)
    }

    /// Send one message over SMTP. The transport is blocking, so it runs
    /// on the blocking pool with a 10 s connection timeout.
    pub async fn send_email(&self, to: &str, subject: &str, body: &str, email_type: &str) -> Result<()> {
        if !self.enabled() {
            return Err(anyhow!("email is not configured"));
        }
        let email = self.email();

        let message = Message::builder()
            .from(email.from_address.parse().context("parsing from address")?)
            .to(to.parse().context("parsing recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("building message")?;

        let password = self.secret_box.decrypt(&email.password);
        let credentials = Credentials::new(email.username.clone(), password);
        let transport = SmtpTransport::starttls_relay(&email.smtp_server)
            .context("building smtp transport")?
            .port(email.smtp_port)
            .credentials(credentials)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        let send_result =
            tokio::task::spawn_blocking(move || transport.send(&message)).await?;

        match send_result {
            Ok(_) => {
                self.store.log_email(to, subject, email_type, true, None)?;
                info!(to, subject, email_type, "email sent");
                Ok(())
            }
            Err(err) => {
                self.store
                    .log_email(to, subject, email_type, false, Some(&err.to_string()))?;
                warn!(?err, to, "email send failed");
                Err(err.into())
            }
        }
    }

    /// Chat-originated and test emails fall back to the from-address when
    /// no daily recipient is configured.
    fn default_recipient(&self) -> String {
        let daily = self.daily();
        if daily.recipient.is_empty() {
            self.email().from_address
        } else {
            daily.recipient
        }
    }

    pub async fn send_test_email(&self, ai_name: Option<&str>) -> Result<()> {
        let name = ai_name.unwrap_or("your AI");
        self.send_email(
            &self.default_recipient(),
            &format!("Test message from {name}"),
            "If you can read this, the SMTP configuration works.",
            "test",
        )
        .await
    }

    /// Assemble the daily digest from the day's stored activity.
    pub fn compose_daily_summary(&self, ai_name: Option<&str>) -> Result<(String, String)> {
        let name = ai_name.unwrap_or("Your AI");
        let date = Local::now().format("%A, %B %d, %Y");

        let conversations = self.store.user_message_count()?;
        let knowledge = self.store.knowledge_count()?;
        let curiosity = self.store.curiosity_counts()?;
        let goals = self.store.active_goals()?;
        let personality_changes = self.store.personality_history(5)?;
        let activity = self.store.recent_activity(8)?;

        let goals_block = if goals.is_empty() {
            "  (no active goals)".to_string()
        } else {
            goals
                .iter()
                .take(5)
                .map(|goal| format!("  - {} — {:.0}%", goal.name, goal.progress))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let changes_block = if personality_changes.is_empty() {
            "  (no drift today)".to_string()
        } else {
            personality_changes
                .iter()
                .map(|change| {
                    format!(
                        "  - {}: {:.2} → {:.2}",
                        change.trait_name, change.old_value, change.new_value
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let activity_block = if activity.is_empty() {
            "  (quiet day)".to_string()
        } else {
            activity
                .iter()
                .map(|event| format!("  - [{}] {}", event.event_type, event.label))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let subject = format!("{name} — daily summary for {date}");
        let body = format!(
            "Daily summary from {name}\n{date}\n\n\
             Totals:\n  - Conversations: {conversations}\n  - Knowledge entries: {knowledge}\n  - Curiosity queue: {pending} pending / {completed} researched\n\n\
             Active goals:\n{goals_block}\n\n\
             Personality drift (latest):\n{changes_block}\n\n\
             Recent autonomous activity:\n{activity_block}\n",
            pending = curiosity.pending,
            completed = curiosity.completed,
        );
        Ok((subject, body))
    }

    pub async fn send_daily_summary(&self, ai_name: Option<&str>) -> Result<()> {
        if !self.daily_enabled() {
            return Err(anyhow!("daily summary email is not enabled"));
        }
        let (subject, body) = self.compose_daily_summary(ai_name)?;
        let recipient = self.daily().recipient;
        self.send_email(&recipient, &subject, &body, "daily_summary").await
    }

    pub fn log(&self, limit: usize) -> Result<Vec<nexira_store::outputs::EmailLogRow>> {
        Ok(self.store.email_log(limit)?)
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send_chat_email(&self, subject: &str, body: &str) -> Result<()> {
        self.send_email(&self.default_recipient(), subject, body, "chat").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(enabled: bool, daily: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.email = EmailConfig {
            enabled,
            smtp_server: if enabled { "smtp.example.org".into() } else { String::new() },
            smtp_port: 587,
            username: if enabled { "sygma@example.org".into() } else { String::new() },
            password: "pw".into(),
            from_address: "sygma@example.org".into(),
        };
        config.daily_email = DailyEmailConfig {
            enabled: daily,
            send_time: "20:00".into(),
            recipient: if daily { "user@example.org".into() } else { String::new() },
        };
        config
    }

    fn service(enabled: bool, daily: bool) -> EmailService {
        EmailService::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(SecretBox::disabled()),
            Arc::new(RwLock::new(app_config(enabled, daily))),
        )
    }

    #[test]
    fn enablement_requires_server_and_username() {
        assert!(!service(false, false).enabled());
        assert!(service(true, false).enabled());
        assert!(!service(true, false).daily_enabled());
        assert!(service(true, true).daily_enabled());
    }

    #[test]
    fn should_send_today_respects_the_log() {
        let service = service(true, true);
        assert!(service.should_send_today());
        service
            .store
            .log_email("user@example.org", "s", "daily_summary", true, None)
            .unwrap();
        assert!(!service.should_send_today());
    }

    #[test]
    fn config_patches_apply_without_a_rebuild() {
        let config = Arc::new(RwLock::new(AppConfig::default()));
        let service = EmailService::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(SecretBox::disabled()),
            config.clone(),
        );
        assert!(!service.enabled());
        assert!(!service.should_send_today());

        // A config patch through the shared handle flips the service live.
        {
            let mut live = config.write().unwrap();
            live.email.enabled = true;
            live.email.smtp_server = "smtp.example.org".into();
            live.email.username = "sygma@example.org".into();
            live.daily_email.enabled = true;
            live.daily_email.recipient = "user@example.org".into();
        }
        assert!(service.enabled());
        assert!(service.daily_enabled());
        assert!(service.should_send_today());
    }

    #[test]
    fn daily_summary_includes_counters_and_goals() {
        let service = service(true, true);
        service
            .store
            .insert_goal("Have 100 meaningful conversations", "growth", 100.0, "", "system")
            .unwrap();
        service
            .store
            .log_activity("search", "web search", "rust traits", None)
            .unwrap();

        let (subject, body) = service.compose_daily_summary(Some("Sygma")).unwrap();
        assert!(subject.starts_with("Sygma — daily summary"));
        assert!(body.contains("Conversations: 0"));
        assert!(body.contains("Have 100 meaningful conversations"));
        assert!(body.contains("[search] web search"));
    }

    #[tokio::test]
    async fn disabled_service_refuses_to_send() {
        let service = service(false, false);
        assert!(service
            .send_email("user@example.org", "s", "b", "general")
            .await
            .is_err());
    }
}
