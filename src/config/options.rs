// src/config/options.rs

//! Option-channel composition.
//!
//! Workers usually read runtime options from a single environment variable
//! (`JAVA_OPTS` and friends). Instead of a chain of builder subclasses each
//! overriding the previous one, options are assembled from an ordered list of
//! independent contributors:
//!
//! 1. tokens seeded from the caller's environment (optional),
//! 2. every registered [`OptionContributor`], in registration order,
//! 3. explicit user tokens.
//!
//! Later steps see (and may replace) what earlier steps produced, so the
//! precedence is simply the order of application.

use std::fmt;

/// Ordered list of option tokens such as `-Xmx512m` or `-Dfoo=bar`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    tokens: Vec<String>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split an options-channel value into tokens.
    ///
    /// Tokens are separated at whitespace that precedes a `-`, so values
    /// containing spaces (`-Dname=two words`) survive a round trip.
    pub fn parse(value: &str) -> Self {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_whitespace() && chars.peek() == Some(&'-') {
                push_trimmed(&mut tokens, &current);
                current.clear();
            } else {
                current.push(c);
            }
        }
        push_trimmed(&mut tokens, &current);

        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.tokens.iter().any(|t| t.starts_with(prefix))
    }

    pub fn push(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !token.trim().is_empty() {
            self.tokens.push(token.trim().to_string());
        }
    }

    /// Drop every token starting with `prefix`.
    pub fn remove(&mut self, prefix: &str) {
        self.tokens.retain(|t| !t.starts_with(prefix));
    }

    /// Replace all tokens starting with `prefix` by a single `prefix + value`.
    ///
    /// An empty value removes the option entirely.
    pub fn replace(&mut self, prefix: &str, value: &str) {
        self.remove(prefix);
        if !value.is_empty() {
            self.tokens.push(format!("{prefix}{value}"));
        }
    }

    /// Add `prefix + value` only when no token with `prefix` exists yet.
    pub fn add_if_absent(&mut self, prefix: &str, value: &str) {
        if !self.contains_prefix(prefix) {
            self.tokens.push(format!("{prefix}{value}"));
        }
    }

    /// Render back into a single options-channel value.
    pub fn render(&self) -> String {
        self.tokens.join(" ")
    }
}

fn push_trimmed(tokens: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        tokens.push(trimmed.to_string());
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A step that edits the option set during `ConfigurationBuilder::build`.
pub trait OptionContributor: Send + Sync {
    fn contribute(&self, options: &mut OptionSet);
}

impl<F> OptionContributor for F
where
    F: Fn(&mut OptionSet) + Send + Sync,
{
    fn contribute(&self, options: &mut OptionSet) {
        self(options)
    }
}

/// Heap sizing for JVM-style workers.
///
/// `Some("")` removes an inherited setting, `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapOptions {
    pub initial: Option<String>,
    pub max: Option<String>,
}

impl OptionContributor for HeapOptions {
    fn contribute(&self, options: &mut OptionSet) {
        if let Some(initial) = &self.initial {
            options.replace("-Xms", initial);
        }
        if let Some(max) = &self.max {
            options.replace("-Xmx", max);
        }
    }
}

/// System properties rendered as `-Dkey=value`, replacing earlier values for
/// the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemProperties(pub Vec<(String, String)>);

impl OptionContributor for SystemProperties {
    fn contribute(&self, options: &mut OptionSet) {
        for (key, value) in &self.0 {
            options.remove(&format!("-D{key}="));
            options.push(format!("-D{key}={value}"));
        }
    }
}
