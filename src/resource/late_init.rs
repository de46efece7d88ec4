//! One-directional merge of server-observed defaults into a desired spec.
//!
//! A field is only filled when the user left it unset. Set values are never
//! touched, so re-running late-init over an already filled spec is a no-op.

use std::collections::BTreeMap;

/// Tracks which spec fields were filled during one late-init pass.
#[derive(Debug, Default)]
pub struct LateInitializer {
    changed: Vec<&'static str>,
}

impl LateInitializer {
    /// Creates an initializer with no recorded changes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            changed: Vec::new(),
        }
    }

    /// Fills an unset string from a non-empty observed value.
    pub fn string(&mut self, field: &'static str, target: &mut Option<String>, observed: &str) {
        if target.is_none() && !observed.is_empty() {
            *target = Some(observed.to_string());
            self.changed.push(field);
        }
    }

    /// Fills an unset value from an observed value that differs from the default.
    pub fn value<T>(&mut self, field: &'static str, target: &mut Option<T>, observed: T)
    where
        T: Default + PartialEq,
    {
        if target.is_none() && observed != T::default() {
            *target = Some(observed);
            self.changed.push(field);
        }
    }

    /// Fills an unset flag when the remote reports it enabled.
    ///
    /// An observed `false` leaves the flag unset so the server default keeps
    /// applying; an explicit user `false` is never overwritten.
    pub fn flag(&mut self, field: &'static str, target: &mut Option<bool>, observed: bool) {
        if target.is_none() && observed {
            *target = Some(true);
            self.changed.push(field);
        }
    }

    /// Fills an empty list from a non-empty observed list.
    pub fn list<T: Clone>(&mut self, field: &'static str, target: &mut Vec<T>, observed: &[T]) {
        if target.is_empty() && !observed.is_empty() {
            *target = observed.to_vec();
            self.changed.push(field);
        }
    }

    /// Fills an empty map from a non-empty observed map.
    pub fn map(
        &mut self,
        field: &'static str,
        target: &mut BTreeMap<String, String>,
        observed: &BTreeMap<String, String>,
    ) {
        if target.is_empty() && !observed.is_empty() {
            target.clone_from(observed);
            self.changed.push(field);
        }
    }

    /// Returns true if any field was filled.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Returns the names of the filled fields.
    #[must_use]
    pub fn changed_fields(&self) -> &[&'static str] {
        &self.changed
    }
}
