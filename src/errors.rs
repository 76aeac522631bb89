use std::fmt;

use thiserror::Error;

/// Ordered, append-only list of problems found while compiling a graph.
///
/// Every stage pushes into the same list and keeps going, so one run
/// reports as much as it can.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    items: Vec<String>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::debug!("recorded: {msg}");
        self.items.push(msg);
    }

    pub fn extend<I, S>(&mut self, msgs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for m in msgs {
            self.push(m);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|e| e.contains(needle))
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }

    /// Text printed once at the end of a run: every message, then the count.
    pub fn closing_report(&self) -> String {
        format!("{self}There were {} errors.\n", self.items.len())
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.items {
            writeln!(f, "{e}")?;
        }
        Ok(())
    }
}

/// The one condition that stops a load outright: a conditional key needs a
/// context field that was never supplied.
#[derive(Debug, Clone, Error)]
#[error("There were {} errors. One was fatal.", .errors.len())]
pub struct FatalError {
    pub errors: Errors,
}

impl FatalError {
    pub fn missing_condition(condition: &str, mut errors: Errors) -> Self {
        errors.push(format!(
            "Fatal error: Condition \"{condition}\" not found in deployment context. \
             Unable to resolve conditional resources. Consider adding \"--{condition}\""
        ));
        Self { errors }
    }
}
