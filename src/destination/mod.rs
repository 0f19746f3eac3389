//! Export destinations: the places a capture can be sent.
//!
//! A [`Destination`] binds a designation, labels, an icon and an export
//! operation. Group destinations (one child per printer, one per album) also
//! bind a [`ChildDiscovery`] and rebuild their children on `refresh`.

pub mod ordering;
mod target;
pub mod types;

#[cfg(test)]
mod tests;

pub use target::{ChildDiscovery, Destination, DestinationBuilder, ExportOperation};
pub use types::{Cancelled, DestinationError, ExportContext, Icon};
