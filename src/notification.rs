//! Export results and their delivery to the freedesktop notification service.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use zbus::{Connection, proxy};

/// Whether an export attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Fail,
}

/// What produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Destination,
    Plugin,
}

/// Outcome of one export attempt.
///
/// A fresh value is built for every attempt. Fields are read-only; the only
/// way to change one is [`Notification::into_failure`], used while a fault is
/// being handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    kind: NotificationKind,
    source: String,
    source_type: SourceType,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
}

impl Notification {
    pub fn success(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            source: source.into(),
            source_type: SourceType::Destination,
            text: text.into(),
            error_text: None,
        }
    }

    pub fn fail(
        source: impl Into<String>,
        text: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self::success(source, text).into_failure(None, error_text)
    }

    /// Notification for a plugin that could not be started because of a fault.
    pub fn plugin_failure(plugin: &str, error_text: impl Into<String>) -> Self {
        let mut notification = Self::fail(
            plugin,
            format!("Plugin '{}' failed to start", plugin),
            error_text,
        );
        notification.source_type = SourceType::Plugin;
        notification
    }

    /// Turns this notification into a failure, optionally replacing the summary.
    pub fn into_failure(mut self, text: Option<String>, error_text: impl Into<String>) -> Self {
        self.kind = NotificationKind::Fail;
        if let Some(text) = text {
            self.text = text;
        }
        let error_text = error_text.into();
        self.error_text = Some(if error_text.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error_text
        });
        self
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn is_success(&self) -> bool {
        self.kind == NotificationKind::Success
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    /// Icon name used when surfacing the notification on the desktop.
    fn icon_name(&self) -> &'static str {
        match self.kind {
            NotificationKind::Success => "document-send",
            NotificationKind::Fail => "dialog-error",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.error_text) {
            (NotificationKind::Fail, Some(error)) => {
                write!(f, "[{}] {}: {}", self.source, self.text, error)
            }
            _ => write!(f, "[{}] {}", self.source, self.text),
        }
    }
}

/// D-Bus interface for freedesktop Notifications.
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// Send a notification and return its id.
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// Show an export result as a desktop notification.
pub async fn send_notification(notification: &Notification) -> Result<(), String> {
    let connection = Connection::session()
        .await
        .map_err(|e| format!("Failed to connect to session bus: {}", e))?;

    let proxy = NotificationsProxy::new(&connection)
        .await
        .map_err(|e| format!("Failed to create notifications proxy: {}", e))?;

    let body = notification.error_text().unwrap_or_default();

    proxy
        .notify(
            "Wayscriber",
            0,
            notification.icon_name(),
            notification.text(),
            body,
            vec![],
            HashMap::new(),
            3000, // 3 second timeout
        )
        .await
        .map_err(|e| format!("Failed to send notification: {}", e))?;

    Ok(())
}
