//! The export destination contract.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ordering::dedup_by_key;
use super::types::{Cancelled, DestinationError, ExportContext, Icon};
use crate::capture::Capture;
use crate::i18n::Language;
use crate::notification::Notification;
use crate::ui::panic_message;

/// The work a destination performs when a capture is exported to it.
///
/// Implementations decide for themselves whether part of the work needs the
/// UI thread and request it through [`ExportContext::ui`].
#[async_trait]
pub trait ExportOperation: Send + Sync {
    async fn export(
        &self,
        context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError>;
}

/// Produces the current children of a group destination.
#[async_trait]
pub trait ChildDiscovery: Send + Sync {
    async fn discover(
        &self,
        context: &ExportContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Destination>, DestinationError>;
}

struct Labels {
    display: String,
    failure: String,
}

struct Inner {
    designation: String,
    source: String,
    priority: i32,
    icon: Icon,
    text_key: Option<String>,
    failure_key: Option<String>,
    labels: RwLock<Labels>,
    children: RwLock<Arc<Vec<Destination>>>,
    operation: Option<Arc<dyn ExportOperation>>,
    discovery: Option<Arc<dyn ChildDiscovery>>,
}

/// One place a capture can be exported to.
///
/// Cloning yields another handle to the same destination. The designation,
/// icon and bound operation never change; labels change in place on language
/// switches and children are replaced wholesale by [`Destination::refresh`].
#[derive(Clone)]
pub struct Destination {
    inner: Arc<Inner>,
}

impl Destination {
    pub fn builder(designation: impl Into<String>) -> DestinationBuilder {
        DestinationBuilder {
            designation: designation.into(),
            source: None,
            priority: 100,
            icon: Icon::default(),
            display_text: None,
            failure_text: None,
            text_key: None,
            failure_key: None,
            operation: None,
            discovery: None,
        }
    }

    pub fn designation(&self) -> &str {
        &self.inner.designation
    }

    /// Provenance tag put on notifications produced by this destination.
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn icon(&self) -> &Icon {
        &self.inner.icon
    }

    pub fn display_text(&self) -> String {
        self.inner.labels.read().display.clone()
    }

    pub fn has_export(&self) -> bool {
        self.inner.operation.is_some()
    }

    pub fn can_refresh(&self) -> bool {
        self.inner.discovery.is_some()
    }

    /// Snapshot of the current children. Always a complete list, either the
    /// one before or the one after any in-flight refresh.
    pub fn children(&self) -> Arc<Vec<Destination>> {
        self.inner.children.read().clone()
    }

    pub fn find_child(&self, designation: &str) -> Option<Destination> {
        self.children()
            .iter()
            .find(|child| child.designation() == designation)
            .cloned()
    }

    /// True when both handles refer to the same destination instance.
    pub fn same_as(&self, other: &Destination) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Re-resolve localized labels after a language change. Literal labels
    /// (printer names, album titles) are left alone.
    pub fn relabel(&self, language: &Language) {
        {
            let mut labels = self.inner.labels.write();
            if let Some(key) = &self.inner.text_key {
                labels.display = language.get(key);
            }
            if let Some(key) = &self.inner.failure_key {
                labels.failure = language.get(key);
            }
        }
        for child in self.children().iter() {
            child.relabel(language);
        }
    }

    /// Rediscover children and swap them in as one update on the UI thread.
    ///
    /// Returns the number of children now visible. On cancellation or a
    /// discovery error the previous children stay in place.
    pub async fn refresh(
        &self,
        context: &ExportContext,
        cancel: &CancellationToken,
    ) -> Result<usize, DestinationError> {
        let Some(discovery) = &self.inner.discovery else {
            return Ok(self.children().len());
        };
        if cancel.is_cancelled() {
            return Err(DestinationError::Cancelled);
        }

        log::debug!("Refreshing children of {}", self.designation());
        let discovered = match discovery.discover(context, cancel).await {
            Ok(children) => children,
            Err(_) if cancel.is_cancelled() => return Err(DestinationError::Cancelled),
            Err(err) => {
                log::warn!(
                    "Could not refresh children of {}: {}",
                    self.designation(),
                    err
                );
                return Err(err);
            }
        };
        if cancel.is_cancelled() {
            return Err(DestinationError::Cancelled);
        }

        let replacement = Arc::new(dedup_by_key(discovered, |child| child.designation()));
        let count = replacement.len();
        let inner = Arc::clone(&self.inner);
        context
            .ui()
            .run(cancel, move || {
                *inner.children.write() = replacement;
            })
            .await?;

        log::info!("{} now has {} children", self.designation(), count);
        Ok(count)
    }

    /// Export `capture` through the bound operation.
    ///
    /// Never fails: faults inside the operation, including panics, come back
    /// as a failed notification. Cancellation is reported as [`Cancelled`].
    ///
    /// # Panics
    /// If no export operation was bound when the destination was built.
    pub async fn export(
        &self,
        context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, Cancelled> {
        let Some(operation) = &self.inner.operation else {
            panic!(
                "destination '{}' has no export operation bound",
                self.designation()
            );
        };
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        log::info!(
            "Exporting '{}' to {} (requested by {})",
            capture.details().title,
            self.designation(),
            context.caller()
        );

        let outcome = AssertUnwindSafe(operation.export(context, capture, cancel))
            .catch_unwind()
            .await;

        let error_text = match outcome {
            Ok(Ok(notification)) => return Ok(notification),
            Ok(Err(DestinationError::Cancelled)) => {
                log::info!("Export to {} cancelled", self.designation());
                return Err(Cancelled);
            }
            Ok(Err(_)) if cancel.is_cancelled() => {
                log::info!("Export to {} aborted by cancellation", self.designation());
                return Err(Cancelled);
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload),
        };

        log::error!("Export to {} failed: {}", self.designation(), error_text);
        let failure_text = self.inner.labels.read().failure.clone();
        Ok(Notification::fail(self.source(), failure_text, error_text))
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("designation", &self.inner.designation)
            .field("display_text", &self.display_text())
            .field("children", &self.children().len())
            .finish_non_exhaustive()
    }
}

/// Binds everything a destination needs before it is exposed to the host.
pub struct DestinationBuilder {
    designation: String,
    source: Option<String>,
    priority: i32,
    icon: Icon,
    display_text: Option<String>,
    failure_text: Option<String>,
    text_key: Option<String>,
    failure_key: Option<String>,
    operation: Option<Arc<dyn ExportOperation>>,
    discovery: Option<Arc<dyn ChildDiscovery>>,
}

impl DestinationBuilder {
    /// Literal label, used for discovered children.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.display_text = Some(text.into());
        self
    }

    /// Localized label and failure summary, re-resolved on language changes.
    pub fn localized(mut self, language: &Language, text_key: &str, failure_key: &str) -> Self {
        self.display_text = Some(language.get(text_key));
        self.failure_text = Some(language.get(failure_key));
        self.text_key = Some(text_key.to_string());
        self.failure_key = Some(failure_key.to_string());
        self
    }

    /// Localized failure summary for destinations with a literal label.
    pub fn localized_failure(mut self, language: &Language, failure_key: &str) -> Self {
        self.failure_text = Some(language.get(failure_key));
        self.failure_key = Some(failure_key.to_string());
        self
    }

    pub fn failure_text(mut self, text: impl Into<String>) -> Self {
        self.failure_text = Some(text.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn icon(mut self, icon: Icon) -> Self {
        self.icon = icon;
        self
    }

    pub fn export(mut self, operation: impl ExportOperation + 'static) -> Self {
        self.operation = Some(Arc::new(operation));
        self
    }

    pub fn discovery(mut self, discovery: impl ChildDiscovery + 'static) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    /// # Panics
    /// If the designation is empty.
    pub fn build(self) -> Destination {
        assert!(
            !self.designation.trim().is_empty(),
            "destination designation must not be empty"
        );

        let display = self
            .display_text
            .unwrap_or_else(|| self.designation.clone());
        let failure = self.failure_text.unwrap_or_else(|| display.clone());

        Destination {
            inner: Arc::new(Inner {
                source: self.source.unwrap_or_else(|| self.designation.clone()),
                designation: self.designation,
                priority: self.priority,
                icon: self.icon,
                text_key: self.text_key,
                failure_key: self.failure_key,
                labels: RwLock::new(Labels { display, failure }),
                children: RwLock::new(Arc::new(Vec::new())),
                operation: self.operation,
                discovery: self.discovery,
            }),
        }
    }
}
