//! UI-thread plumbing shared by the host and the destinations.

mod dispatch;
pub mod settings;

pub(crate) use dispatch::panic_message;
pub use dispatch::{DispatchError, UiDispatch, UiLoop, UiStopHandle};
pub use settings::{DialogResult, SettingsDraft, SettingsSurface};
