//! Localized strings used by the destinations, with change notifications.
//!
//! Loading translation catalogs belongs to the host application. This module
//! only holds the active catalog, answers lookups, and tells subscribers when
//! the host swaps the catalog.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DESTINATION_PRINTER: &str = "destination.printer";
pub const PRINTER_ERROR: &str = "printer.error";
pub const PRINTER_SUCCESS: &str = "printer.success";
pub const DESTINATION_OCR: &str = "destination.ocr";
pub const OCR_ERROR: &str = "ocr.error";
pub const OCR_SUCCESS: &str = "ocr.success";
pub const DESTINATION_UPLOAD: &str = "destination.upload";
pub const UPLOAD_ERROR: &str = "upload.error";
pub const UPLOAD_SUCCESS: &str = "upload.success";
pub const UPLOAD_CONFIGURE: &str = "upload.configure";

const ENGLISH: &[(&str, &str)] = &[
    (DESTINATION_PRINTER, "Print"),
    (PRINTER_ERROR, "An error occurred while trying to print."),
    (PRINTER_SUCCESS, "Sent to {printer}"),
    (DESTINATION_OCR, "OCR"),
    (OCR_ERROR, "Text recognition failed."),
    (OCR_SUCCESS, "Recognized {count} characters"),
    (DESTINATION_UPLOAD, "Upload to photo service"),
    (UPLOAD_ERROR, "An error occurred while uploading."),
    (UPLOAD_SUCCESS, "Uploaded to {url}"),
    (UPLOAD_CONFIGURE, "Configure upload"),
];

/// Identifies one change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeHandler = Arc<dyn Fn(&Language) + Send + Sync>;

/// Active translation catalog.
pub struct Language {
    code: RwLock<String>,
    entries: RwLock<HashMap<String, String>>,
    handlers: Mutex<Vec<(SubscriptionId, ChangeHandler)>>,
    next_id: AtomicU64,
}

impl Language {
    /// Built-in English catalog.
    pub fn english() -> Self {
        Self::with_entries(
            "en-US",
            ENGLISH
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    pub fn with_entries(code: impl Into<String>, entries: HashMap<String, String>) -> Self {
        Self {
            code: RwLock::new(code.into()),
            entries: RwLock::new(entries),
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn code(&self) -> String {
        self.code.read().clone()
    }

    /// Translation for `key`, or the key itself when the catalog lacks it.
    pub fn get(&self, key: &str) -> String {
        match self.entries.read().get(key) {
            Some(value) => value.clone(),
            None => {
                log::debug!("Missing translation for '{}' in {}", key, self.code());
                key.to_string()
            }
        }
    }

    /// Translation for `key` with `{name}` placeholders substituted.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter()
            .fold(self.get(key), |text, (name, value)| {
                text.replace(&format!("{{{}}}", name), value)
            })
    }

    /// Replace the active catalog and notify every subscriber.
    ///
    /// Missing keys fall back to the previous catalog's values.
    pub fn switch_to(&self, code: impl Into<String>, entries: HashMap<String, String>) {
        let code = code.into();
        {
            let mut current = self.entries.write();
            current.extend(entries);
            *self.code.write() = code.clone();
        }
        log::info!("Language switched to {}", code);

        // Handlers run without the lock held so they may unsubscribe themselves.
        let handlers: Vec<ChangeHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(self);
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Language) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns false when it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::english()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn missing_keys_fall_back_to_key() {
        let language = Language::english();
        assert_eq!(language.get(DESTINATION_PRINTER), "Print");
        assert_eq!(language.get("does.not.exist"), "does.not.exist");
    }

    #[test]
    fn format_substitutes_placeholders() {
        let language = Language::english();
        assert_eq!(
            language.format(UPLOAD_SUCCESS, &[("url", "https://img.example/1")]),
            "Uploaded to https://img.example/1"
        );
    }

    #[test]
    fn switch_notifies_subscribers_until_unsubscribed() {
        let language = Language::english();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = language.subscribe(move |lang| {
            assert_eq!(lang.get(DESTINATION_PRINTER), "Drucken");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let german = HashMap::from([(DESTINATION_PRINTER.to_string(), "Drucken".to_string())]);
        language.switch_to("de-DE", german.clone());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(language.code(), "de-DE");
        // untouched keys keep their previous value
        assert_eq!(language.get(DESTINATION_OCR), "OCR");

        assert!(language.unsubscribe(id));
        assert!(!language.unsubscribe(id));
        language.switch_to("de-DE", german);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
