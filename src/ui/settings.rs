//! Modal settings surface used by plugin `configure`.

/// How the user closed a modal dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResult {
    Ok,
    Cancel,
}

/// Editable copy of a plugin's settings.
///
/// Plugins fill a draft from their live configuration, hand it to a
/// [`SettingsSurface`], and only apply it when the surface returns
/// [`DialogResult::Ok`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsDraft {
    fields: Vec<(String, String)>,
}

impl SettingsDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Update an existing field. Unknown keys are rejected.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, current)) => {
                *current = value.into();
                true
            }
            None => false,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// A modal view that lets the user edit a settings draft.
pub trait SettingsSurface {
    fn show(&self, title: &str, draft: &mut SettingsDraft) -> DialogResult;
}
