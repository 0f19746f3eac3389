//! Export destinations for wayscriber screenshots.
//!
//! Plugins contribute [`destination::Destination`]s (printer, OCR, photo
//! upload) to a host registry. Exports and child discovery run on background
//! tasks; anything touching UI-owned state goes through [`ui::UiDispatch`].

pub mod capture;
pub mod clipboard;
pub mod config;
pub mod destination;
pub mod host;
pub mod i18n;
pub mod notification;
pub mod plugin;
pub mod plugins;
pub mod ui;

pub use config::Config;
pub use destination::{Destination, DestinationError};
pub use notification::Notification;
