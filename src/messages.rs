//! Message templates.
//!
//! Validation errors and system failures carry catalog keys plus positional
//! arguments. The catalog resolves `{0}`, `{1}`, ... placeholders; a key with
//! no template formats as the key itself.

use std::collections::HashMap;

/// Key used for the generic system failure message.
pub const GENERAL_EXCEPTION: &str = "exception.general";

/// A keyed set of message templates.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    templates: HashMap<String, String>,
}

impl MessageCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the messages the service itself emits.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog
            .insert(GENERAL_EXCEPTION, "A system error has occurred [{0}]")
            .insert("validation.required", "{0} is required")
            .insert("validation.maxLength", "{0} must be at most {1} characters")
            .insert("validation.type", "{0} must be a {1} value");
        catalog
    }

    /// Add or replace a template.
    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<String>) -> &mut Self {
        self.templates.insert(key.into(), template.into());
        self
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(key, template);
        self
    }

    /// Resolve `key` and substitute positional arguments.
    pub fn format<S: AsRef<str>>(&self, key: &str, args: &[S]) -> String {
        let template = self.templates.get(key).map(String::as_str).unwrap_or(key);
        substitute(template, args)
    }
}

fn substitute<S: AsRef<str>>(template: &str, args: &[S]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg.as_ref(), close))
        });

        match replaced {
            Some((arg, close)) => {
                output.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}
