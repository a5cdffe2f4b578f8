//! Username interning.

use std::collections::HashMap;

use thiserror::Error;

/// Error type for reverse lookups of ids that were never interned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("user id {0} not found")]
pub struct UnknownUserId(pub u32);

/// Interns usernames into dense u32 ids.
///
/// The forward map vivifies on first sight during ingestion; the reverse map
/// serves diagnostics and must only be asked about ids it handed out.
#[derive(Debug, Default)]
pub struct UserTable {
    next_id: u32,
    forward: HashMap<String, u32>,
    reverse: HashMap<u32, String>,
}

impl UserTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, interning it on first sight.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.forward.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.forward.insert(name.to_string(), id);
        self.reverse.insert(id, name.to_string());
        id
    }

    /// Reverse lookup for diagnostics.
    pub fn name(&self, id: u32) -> Result<&str, UnknownUserId> {
        self.reverse
            .get(&id)
            .map(String::as_str)
            .ok_or(UnknownUserId(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
