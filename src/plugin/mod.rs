//! Plugin lifecycle and the host registry plugins register into.

mod lifecycle;
mod registry;


pub use lifecycle::{
    Acquired, MenuItem, Plugin, PluginContext, PluginError, PluginHost, PluginLifecycle,
    PluginSetup, PluginState, ShutdownOutcome, StartOutcome,
};
pub use registry::MenuRegistry;
