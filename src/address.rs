//! # Queue Addressing
//!
//! Resolution of logical queue names into fully-qualified table identifiers.
//! The transport only ever consumes the qualified table name plus the logical
//! name (for diagnostics and error-queue routing); how addresses are resolved
//! belongs to the hosting framework, expressed here as a trait seam.

/// A resolved queue address: logical name plus `(schema, catalog, table)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueAddress {
    /// Logical queue name as the host refers to it
    pub name: String,
    /// Table name backing the queue
    pub table: String,
    /// Schema containing the table
    pub schema: String,
    /// Catalog, when the address pins one (diagnostics only on Postgres)
    pub catalog: Option<String>,
}

impl QueueAddress {
    /// Fully-qualified, identifier-quoted table reference.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quote an identifier, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Translates logical queue names to physical addresses. Supplied by the
/// hosting framework; the transport treats it as opaque.
pub trait QueueAddressTranslator: Send + Sync {
    fn translate(&self, logical: &str) -> QueueAddress;
}

/// Default translator parsing `table[@schema[@catalog]]` addresses.
#[derive(Debug, Clone)]
pub struct DelimitedAddressTranslator {
    default_schema: String,
}

impl DelimitedAddressTranslator {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }
}

impl Default for DelimitedAddressTranslator {
    fn default() -> Self {
        Self::new("public")
    }
}

impl QueueAddressTranslator for DelimitedAddressTranslator {
    fn translate(&self, logical: &str) -> QueueAddress {
        let mut parts = logical.splitn(3, '@');
        let table = parts.next().unwrap_or(logical).to_string();
        let schema = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_schema.clone());
        let catalog = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

        QueueAddress {
            name: logical.to_string(),
            table,
            schema,
            catalog,
        }
    }
}
