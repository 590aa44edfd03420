use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use sendgrid::v3::{Content, Email, Personalization, Sender};
use tokio::sync::{Notify, Semaphore};
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, message: &Message) -> Result<()>;
}

pub type DynEmailClient = Arc<dyn EmailClient>;

/// Keeps sent emails in memory.
///
/// Useful for tests and local development where no mail should leave the
/// process.
#[derive(Default)]
pub struct OutboxMailer {
    delivered: Notify,
    fail: bool,
    hold: Option<Semaphore>,
    sent: Mutex<Vec<Message>>,
}

impl OutboxMailer {
    /// A mailer whose every send fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A mailer whose sends wait until [`OutboxMailer::release`] is called.
    pub fn held() -> Self {
        Self {
            hold: Some(Semaphore::new(0)),
            ..Default::default()
        }
    }

    /// Let held sends through.
    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.add_permits(1);
        }
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Wait until at least `count` messages have been sent.
    pub async fn wait_for(&self, count: usize) -> Vec<Message> {
        loop {
            // Registered before checking so a send in between isn't missed.
            let delivered = self.delivered.notified();

            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }

            delivered.await;
        }
    }
}

#[async_trait]
impl EmailClient for OutboxMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await?;
        }

        if self.fail {
            bail!("Outbox is not accepting mail.");
        }

        self.sent.lock().push(message.clone());
        self.delivered.notify_waiters();

        Ok(())
    }
}

/// Writes emails to stdout instead of sending them.
pub struct ConsoleMailer {
    pub from: String,
}

#[async_trait]
impl EmailClient for ConsoleMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        println!("From: {}", self.from);
        println!("To: {}", message.to);
        println!("Subject: {}", message.subject);
        println!("{}", "-".repeat(80));
        println!("{}\n", message.text);

        Ok(())
    }
}

pub struct SendgridMailer {
    from: Email,
    sender: Sender,
}

impl SendgridMailer {
    pub fn new(api_key: String, from_address: String, from_name: String) -> Self {
        Self {
            from: Email::new(from_address).set_name(from_name),
            sender: Sender::new(api_key),
        }
    }
}

#[async_trait]
impl EmailClient for SendgridMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        let personalization = Personalization::new(Email::new(message.to.to_owned()));

        let sendable_message = sendgrid::v3::Message::new(self.from.clone())
            .set_subject(&message.subject)
            .add_content(
                Content::new()
                    .set_content_type("text/plain")
                    .set_value(message.text.to_owned()),
            )
            .add_personalization(personalization);

        self.sender.send(&sendable_message).await?;
        info!(subject = %message.subject, "Sent email via SendGrid.");

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn message() -> Message {
        Message {
            to: "jdoe@example.com".to_owned(),
            subject: "Reset Your Password".to_owned(),
            text: "hello".to_owned(),
        }
    }

    #[tokio::test]
    async fn outbox_keeps_messages() {
        let mailer = OutboxMailer::default();

        mailer.send(&message()).await.expect("send should succeed");

        assert_eq!(vec![message()], mailer.sent());
    }

    #[tokio::test]
    async fn held_outbox_waits_for_release() {
        let mailer = Arc::new(OutboxMailer::held());

        let sending = tokio::spawn({
            let mailer = mailer.clone();
            async move { mailer.send(&message()).await }
        });
        tokio::task::yield_now().await;
        assert!(mailer.sent().is_empty());

        mailer.release();
        let sent = mailer.wait_for(1).await;

        assert_eq!(vec![message()], sent);
        sending
            .await
            .expect("send task should not panic")
            .expect("send should succeed");
    }

    #[tokio::test]
    async fn failing_outbox_keeps_nothing() {
        let mailer = OutboxMailer::failing();

        assert!(mailer.send(&message()).await.is_err());
        assert!(mailer.sent().is_empty());
    }
}
