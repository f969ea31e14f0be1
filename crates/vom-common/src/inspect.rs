//! Inspection registrar.
//!
//! Object kinds register a handler under one or more short names; an
//! operator front-end passes commands to [`Inspect::handle_input`] and gets
//! a human-readable listing back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

/// Renders the state of one object kind.
pub trait CommandHandler: Send + Sync {
    /// Writes every object of the kind to `out`.
    fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Error type for handler registration.
#[derive(Debug, Clone, Error)]
pub enum InspectError {
    #[error("Inspect name already registered: {0}")]
    DuplicateName(String),

    #[error("Inspect handler needs at least one name")]
    NoNames,
}

struct Registration {
    names: Vec<String>,
    description: String,
    handler: Arc<dyn CommandHandler>,
}

#[derive(Default)]
struct InspectInner {
    by_name: BTreeMap<String, usize>,
    registrations: Vec<Registration>,
}

/// Maps inspection names to handlers.
#[derive(Default)]
pub struct Inspect {
    inner: RwLock<InspectInner>,
}

impl Inspect {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `names` with `handler`.
    pub fn register_handler(
        &self,
        names: &[&str],
        description: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), InspectError> {
        if names.is_empty() {
            return Err(InspectError::NoNames);
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(dup) = names.iter().find(|n| inner.by_name.contains_key(**n)) {
            return Err(InspectError::DuplicateName(dup.to_string()));
        }

        let index = inner.registrations.len();
        for name in names {
            inner.by_name.insert(name.to_string(), index);
        }
        inner.registrations.push(Registration {
            names: names.iter().map(|n| n.to_string()).collect(),
            description: description.to_string(),
            handler,
        });
        Ok(())
    }

    /// Runs one inspection command.
    ///
    /// `help` (or nothing) lists the commands, `all` shows every kind, and
    /// any registered name shows that kind.
    pub fn handle_input(&self, input: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        let command = input.trim();
        match command {
            "" | "help" => self.help(out),
            "all" => {
                for (description, handler) in self.all() {
                    writeln!(out, "{}:", description)?;
                    handler.show(out)?;
                }
                Ok(())
            }
            name => match self.lookup(name) {
                Some(handler) => handler.show(out),
                None => {
                    writeln!(out, "unknown command: {}", name)?;
                    self.help(out)
                }
            },
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_name
            .get(name)
            .map(|i| Arc::clone(&inner.registrations[*i].handler))
    }

    fn all(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .registrations
            .iter()
            .map(|r| (r.description.clone(), Arc::clone(&r.handler)))
            .collect()
    }

    fn help(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "Commands:")?;
        writeln!(out, "  {:<24} {}", "help", "this message")?;
        writeln!(out, "  {:<24} {}", "all", "show every object kind")?;
        for r in &inner.registrations {
            writeln!(out, "  {:<24} {}", r.names.join(", "), r.description)?;
        }
        Ok(())
    }
}
