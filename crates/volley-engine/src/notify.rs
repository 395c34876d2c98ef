//! Operator notification channel.
//!
//! Messages carry a `forced` flag. Forced messages (gate transitions, batch
//! aborts) always go out; the rest are rate limited by [`RateLimited`].

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use volley_core::config::NotificationConfig;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Dropped by rate limiting.
    Suppressed,
}

pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        message: &'a str,
        forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn send<'a>(
        &'a self,
        message: &'a str,
        forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>> {
        (**self).send(message, forced)
    }
}

/// Send and log failures. Notifications never fail the caller.
pub async fn notify(notifier: &dyn Notifier, message: &str, forced: bool) {
    if let Err(e) = notifier.send(message, forced).await {
        tracing::warn!(error = %e, forced, "notification failed");
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes notifications to the log. Used when no transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(
        &'a self,
        message: &'a str,
        forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>> {
        Box::pin(async move {
            tracing::warn!(forced, "notify: {message}");
            Ok(Delivery::Sent)
        })
    }
}

// ---------------------------------------------------------------------------
// TelegramNotifier
// ---------------------------------------------------------------------------

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
    bot_name: String,
}

impl TelegramNotifier {
    pub fn new(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        bot_name: impl Into<String>,
    ) -> Self {
        Self::with_api_base(TELEGRAM_API, token, chat_id, bot_name)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            bot_name: bot_name.into(),
        }
    }

    async fn post(&self, message: &str) -> Result<Delivery, NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        self.client
            .post(url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": format!("[{}] {message}", self.bot_name),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(Delivery::Sent)
    }
}

impl Notifier for TelegramNotifier {
    fn send<'a>(
        &'a self,
        message: &'a str,
        _forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>> {
        Box::pin(self.post(message))
    }
}

// ---------------------------------------------------------------------------
// RateLimited
// ---------------------------------------------------------------------------

/// Drops non-forced messages until `min_gap` has passed since the last
/// delivered one.
pub struct RateLimited<N> {
    inner: N,
    min_gap: Duration,
    clock: Arc<dyn Clock>,
    last_sent: Mutex<Option<DateTime<Utc>>>,
}

impl<N: Notifier> RateLimited<N> {
    pub fn new(inner: N, min_gap: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            min_gap,
            clock,
            last_sent: Mutex::new(None),
        }
    }

    fn suppressed(&self) -> bool {
        let last = *self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        match last {
            Some(at) => (self.clock.now() - at)
                .to_std()
                .map(|elapsed| elapsed < self.min_gap)
                .unwrap_or(true),
            None => false,
        }
    }

    async fn deliver(&self, message: &str, forced: bool) -> Result<Delivery, NotifyError> {
        if !forced && self.suppressed() {
            tracing::debug!("notification suppressed by rate limit");
            return Ok(Delivery::Suppressed);
        }
        let delivery = self.inner.send(message, forced).await?;
        if delivery == Delivery::Sent {
            *self.last_sent.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.clock.now());
        }
        Ok(delivery)
    }
}

impl<N: Notifier> Notifier for RateLimited<N> {
    fn send<'a>(
        &'a self,
        message: &'a str,
        forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>> {
        Box::pin(self.deliver(message, forced))
    }
}

/// Telegram when configured, log otherwise; both rate limited.
pub fn from_config(cfg: &NotificationConfig, clock: Arc<dyn Clock>) -> Arc<dyn Notifier> {
    let gap = Duration::from_secs(cfg.message_delay_secs);
    match (cfg.enabled, &cfg.token, &cfg.channel_id) {
        (true, Some(token), Some(chat)) => Arc::new(RateLimited::new(
            TelegramNotifier::new(token, chat, &cfg.bot_name),
            gap,
            clock,
        )),
        _ => Arc::new(RateLimited::new(LogNotifier, gap, clock)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::RecordingNotifier;

    fn limited() -> (RateLimited<Arc<RecordingNotifier>>, Arc<RecordingNotifier>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(1_000_000));
        let rec = Arc::new(RecordingNotifier::default());
        (
            RateLimited::new(rec.clone(), Duration::from_secs(7200), clock.clone()),
            rec,
            clock,
        )
    }

    #[tokio::test]
    async fn non_forced_messages_are_rate_limited() {
        let (n, rec, clock) = limited();
        assert_eq!(n.send("one", false).await.unwrap(), Delivery::Sent);
        assert_eq!(n.send("two", false).await.unwrap(), Delivery::Suppressed);
        clock.advance(Duration::from_secs(7200));
        assert_eq!(n.send("three", false).await.unwrap(), Delivery::Sent);
        assert_eq!(rec.messages(), vec!["one".to_string(), "three".to_string()]);
    }

    #[tokio::test]
    async fn forced_messages_bypass_the_limit() {
        let (n, rec, _) = limited();
        n.send("routine", false).await.unwrap();
        assert_eq!(n.send("gate blocked", true).await.unwrap(), Delivery::Sent);
        assert_eq!(n.send("gate open", true).await.unwrap(), Delivery::Sent);
        assert_eq!(rec.forced_count(), 2);
    }

    #[tokio::test]
    async fn telegram_posts_to_bot_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botT0KEN/sendMessage")
            .match_body(mockito::Matcher::PartialJson(json!({
                "chat_id": "42",
                "text": "[volley] hello",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let n = TelegramNotifier::with_api_base(server.url(), "T0KEN", "42", "volley");
        assert_eq!(n.send("hello", true).await.unwrap(), Delivery::Sent);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn telegram_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botbad/sendMessage")
            .with_status(401)
            .create_async()
            .await;
        let n = TelegramNotifier::with_api_base(server.url(), "bad", "42", "volley");
        assert!(n.send("hello", true).await.is_err());
    }
}
