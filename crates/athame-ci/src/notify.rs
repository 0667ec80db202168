//! Best-effort pipeline notifications.

use std::sync::Arc;

use async_trait::async_trait;
use athame_engine::{ContainerEngine, Secret};
use athame_tools::apprise::Apprise;
use athame_tools::ntfy::{NtfyClient, NtfyConfig, SendOptions};
use athame_tools::ToolResult;
use tracing::debug;

use crate::error::NotifyError;
use crate::obs;

/// A message sent around a phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: Option<String>,
    pub tags: Option<String>,
    pub markdown: bool,
    pub actions: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: None,
            tags: None,
            markdown: false,
            actions: None,
        }
    }

    /// Something began.
    pub fn started(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message)
            .with_priority("default")
            .with_tags("hourglass_flowing_sand")
    }

    pub fn succeeded(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message)
            .with_priority("default")
            .with_tags("white_check_mark")
    }

    /// Something failed; details are in the logs.
    pub fn failed(title: impl Into<String>) -> Self {
        Self::new(title, "Check logs for details.")
            .with_priority("high")
            .with_tags("warning")
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    /// Add a "View Site" action button opening `url`.
    pub fn with_view_action(mut self, url: &str) -> Self {
        self.actions = Some(format!("view, View Site, {url}"));
        self
    }

    fn send_options(&self) -> SendOptions {
        SendOptions {
            title: Some(self.title.clone()),
            priority: self.priority.clone(),
            tags: self.tags.clone(),
            markdown: self.markdown,
            actions: self.actions.clone(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts to an ntfy topic.
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    client: NtfyClient,
}

impl NtfyNotifier {
    pub fn new(config: NtfyConfig) -> ToolResult<Self> {
        Ok(Self {
            client: NtfyClient::new(config)?,
        })
    }

    pub fn from_env() -> ToolResult<Self> {
        Self::new(NtfyConfig::from_env())
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let topic = self.client.config().topic.clone();
        let out = self
            .client
            .send(&topic, &notification.message, &notification.send_options())
            .await?;
        debug!("{out}");
        Ok(())
    }
}

/// Sends through Apprise running in a container.
pub struct AppriseNotifier {
    engine: Arc<dyn ContainerEngine>,
    apprise: Apprise,
    service: Secret,
}

impl AppriseNotifier {
    pub fn new(engine: Arc<dyn ContainerEngine>, service: Secret) -> Self {
        Self {
            engine,
            apprise: Apprise::default(),
            service,
        }
    }
}

#[async_trait]
impl Notifier for AppriseNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let spec = self
            .apprise
            .send(&notification.title, &notification.message, &self.service);
        self.engine.stdout(&spec).await?;
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(title = %notification.title, "notifications disabled");
        Ok(())
    }
}

/// Send `notification`, logging instead of returning any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        obs::emit_notification_failed(&notification.title, &e);
    }
}

/// Pass `result` through, sending a failure notice titled `title` on error.
pub async fn notify_on_failure<T, E>(
    notifier: &dyn Notifier,
    title: &str,
    result: Result<T, E>,
) -> Result<T, E> {
    if result.is_err() {
        notify_best_effort(notifier, Notification::failed(title)).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use athame_engine::fakes::ScriptedEngine;

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Tool(athame_tools::ToolError::Status {
                service: "ntfy",
                status: 500,
            }))
        }
    }

    #[test]
    fn failed_notifications_point_at_logs() {
        let n = Notification::failed("Tests Failed");
        assert_eq!(n.message, "Check logs for details.");
        assert_eq!(n.priority.as_deref(), Some("high"));
    }

    #[test]
    fn view_action_format() {
        let n = Notification::succeeded("Render Deploy Completed", "Deployed to Render.")
            .with_view_action("https://docs.onrender.com");
        assert_eq!(
            n.send_options().actions.as_deref(),
            Some("view, View Site, https://docs.onrender.com")
        );
        assert_eq!(n.send_options().title.as_deref(), Some("Render Deploy Completed"));
    }

    #[tokio::test]
    async fn best_effort_swallows_errors() {
        notify_best_effort(&Broken, Notification::new("Tests Completed", "ok")).await;
    }

    #[tokio::test]
    async fn apprise_runs_in_a_container() {
        let engine = ScriptedEngine::new();
        let notifier = AppriseNotifier::new(
            Arc::new(engine.clone()),
            Secret::new("APPRISE_SERVICE_URL", "json://hook"),
        );
        notifier
            .notify(&Notification::new("Tests Completed", "Tests passed."))
            .await
            .unwrap();
        let line = engine.calls()[0].command_line();
        assert!(line.contains("'Tests Completed'"));
        assert!(!line.contains("json://hook"));
    }
}
