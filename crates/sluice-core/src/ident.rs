//! SQL identifier handling.
//!
//! Table and column names cannot be bound as parameters, so every identifier that
//! reaches a statement is validated and then quoted for the target dialect.

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    fn check(self, identifier: &str) -> Option<String> {
        if identifier.trim().is_empty() {
            return Some("identifier is empty".into());
        }
        if identifier.contains('\0') {
            return Some("identifier contains a NUL byte".into());
        }
        match self {
            // Postgres silently truncates past NAMEDATALEN - 1 bytes.
            Dialect::Postgres if identifier.len() > 63 => {
                Some("identifier is longer than 63 bytes".into())
            }
            Dialect::MySql if identifier.chars().count() > 64 => {
                Some("identifier is longer than 64 characters".into())
            }
            Dialect::MySql if identifier.ends_with(' ') => {
                Some("identifier ends with a space".into())
            }
            _ => None,
        }
    }

    pub fn validate(self, identifier: &str) -> Result<()> {
        match self.check(identifier) {
            Some(reason) => Err(PipelineError::InvalidIdentifier {
                identifier: identifier.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn quote(self, identifier: &str) -> Result<String> {
        self.validate(identifier)?;
        Ok(match self {
            Dialect::Postgres => format!("\"{}\"", identifier.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
        })
    }

    /// Quotes every identifier, failing on the first invalid one.
    pub fn quote_all<'a, I>(self, identifiers: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        identifiers
            .into_iter()
            .map(|identifier| self.quote(identifier))
            .collect()
    }
}
