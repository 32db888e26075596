use dashmap::DashMap;

use super::ConnectionId;

/// Language assumed for connections that never registered one.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Reduces a tag like `pt-BR` or `en_US` to its lower-cased base subtag.
pub fn base_language(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Preferred language per live connection.
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    languages: DashMap<ConnectionId, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the base subtag of `tag`, replacing any earlier registration.
    /// A tag with an empty base is treated as no registration.
    pub fn set_language(&self, connection: ConnectionId, tag: &str) {
        let base = base_language(tag);
        if base.is_empty() {
            self.languages.remove(&connection);
            return;
        }
        self.languages.insert(connection, base);
    }

    pub fn get_language(&self, connection: ConnectionId) -> String {
        self.languages
            .get(&connection)
            .map(|lang| lang.value().clone())
            .unwrap_or_else(|| FALLBACK_LANGUAGE.to_owned())
    }

    pub fn remove(&self, connection: ConnectionId) {
        self.languages.remove(&connection);
    }
}
