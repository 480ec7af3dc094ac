//! Named system prompts.

use std::collections::HashMap;

/// Lookup table from prompt name to prompt text.
///
/// Users only ever select a name; the text is resolved when a backend call
/// is built.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    prompts: HashMap<String, String>,
}

impl PromptCatalog {
    pub fn new(prompts: HashMap<String, String>) -> Self {
        Self { prompts }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.prompts.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prompts.contains_key(name)
    }

    /// An empty catalog accepts any name.
    pub fn accepts(&self, name: &str) -> bool {
        self.is_empty() || self.contains(name)
    }

    /// Prompt names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.prompts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
