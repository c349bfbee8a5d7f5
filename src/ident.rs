//! Parameter-safe SQL identifier composition.
//!
//! All dynamic SQL in this crate goes through [`Ident`] for table/schema/
//! column names — never raw string interpolation. Values go through the
//! driver's own parameter binding; only identifiers need manual quoting
//! since PostgreSQL has no placeholder syntax for them.

use std::fmt;

/// A quoted SQL identifier, or a dotted pair of them (`schema.table`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl AsRef<str>) -> Self {
        Ident(quote_identifier(name.as_ref()))
    }

    pub fn schema_qualified(schema: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Ident(format!(
            "{}.{}",
            quote_identifier(schema.as_ref()),
            quote_identifier(name.as_ref())
        ))
    }

    /// The quoted form, ready to splice into SQL text.
    pub fn as_sql(&self) -> &str {
        &self.0
    }

    /// The identifier with its quoting stripped back off, for error messages.
    pub fn display_unquoted(&self) -> String {
        self.0.replace('"', "")
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote a single SQL identifier, doubling any embedded double quotes.
fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
