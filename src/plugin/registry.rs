//! In-process host registry: the list of destinations and plugin menu items
//! the host shows to the user.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::lifecycle::PluginHost;
use crate::destination::Destination;

#[derive(Default)]
pub struct MenuRegistry {
    destinations: RwLock<Vec<Destination>>,
    menu_items: RwLock<BTreeMap<String, String>>,
}

impl MenuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered destinations ordered by priority, then designation.
    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations.read().clone()
    }

    pub fn len(&self) -> usize {
        self.destinations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.read().is_empty()
    }

    pub fn find(&self, designation: &str) -> Option<Destination> {
        self.destinations
            .read()
            .iter()
            .find(|destination| destination.designation() == designation)
            .cloned()
    }

    /// Menu items as `(id, text)` pairs ordered by id.
    pub fn menu_items(&self) -> Vec<(String, String)> {
        self.menu_items
            .read()
            .iter()
            .map(|(id, text)| (id.clone(), text.clone()))
            .collect()
    }

    pub fn menu_text(&self, id: &str) -> Option<String> {
        self.menu_items.read().get(id).cloned()
    }
}

impl PluginHost for MenuRegistry {
    fn register_destination(&self, destination: Destination) {
        let mut destinations = self.destinations.write();
        if let Some(existing) = destinations
            .iter_mut()
            .find(|existing| existing.designation() == destination.designation())
        {
            log::warn!(
                "Destination {} registered twice, replacing",
                destination.designation()
            );
            *existing = destination;
        } else {
            log::debug!("Registered destination {}", destination.designation());
            destinations.push(destination);
        }
        destinations.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.designation().cmp(b.designation()))
        });
    }

    fn unregister_destination(&self, designation: &str) -> bool {
        let mut destinations = self.destinations.write();
        let before = destinations.len();
        destinations.retain(|destination| destination.designation() != designation);
        let removed = destinations.len() != before;
        if removed {
            log::debug!("Unregistered destination {}", designation);
        }
        removed
    }

    fn add_menu_item(&self, id: &str, text: &str) {
        self.menu_items
            .write()
            .insert(id.to_string(), text.to_string());
    }

    fn relabel_menu_item(&self, id: &str, text: &str) {
        match self.menu_items.write().get_mut(id) {
            Some(current) => *current = text.to_string(),
            None => log::warn!("Cannot relabel unknown menu item {}", id),
        }
    }

    fn remove_menu_item(&self, id: &str) -> bool {
        self.menu_items.write().remove(id).is_some()
    }
}
