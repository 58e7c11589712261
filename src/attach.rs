//! Attach every user table of a remote schema as local views.
use crate::{config::Config, connection::Connection, sql::quote_literal, Result};

/// Options of the attach helper.
#[derive(Clone, Debug)]
pub struct AttachOptions {
    /// Remote schema to enumerate.
    pub source_schema: String,
    /// Local schema the views are registered under.
    pub sink_schema: String,
    /// Replace existing views.
    pub overwrite: bool,
    /// Route views through the pushdown-capable scan variant.
    pub filter_pushdown: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        AttachOptions {
            source_schema: "public".into(),
            sink_schema: "main".into(),
            overwrite: false,
            filter_pushdown: false,
        }
    }
}

/// What a registered view scans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewDefinition {
    pub dsn: String,
    pub source_schema: String,
    pub table: String,
    /// Whether the view should call the pushdown-capable scan variant.
    pub filter_pushdown: bool,
}

/// The engine-side catalog the views land in.
///
/// The scanner does not own a view catalog; the embedding engine does, so
/// registration goes through this seam.
pub trait ViewCatalog {
    /// Register (or, with `overwrite`, replace) one view.
    fn register_view(
        &mut self,
        sink_schema: &str,
        name: &str,
        definition: ViewDefinition,
        overwrite: bool,
    ) -> Result<()>;
}

/// Enumerate the user tables of `source_schema` and register a scan view
/// per table. Returns the number of registered views.
pub fn attach(dsn: &str, options: &AttachOptions, catalog: &mut dyn ViewCatalog) -> Result<usize> {
    let config = Config::parse(dsn)?;
    let mut conn = Connection::connect(&config)?;

    // plain relations with at least one user column
    let tables = conn.query::<(String,)>(&format!(
        "SELECT relname \
         FROM pg_class JOIN pg_namespace ON pg_class.relnamespace = pg_namespace.oid \
         JOIN pg_attribute ON pg_class.oid = pg_attribute.attrelid \
         WHERE relkind = 'r' AND attnum > 0 AND nspname = {} \
         GROUP BY relname \
         ORDER BY relname",
        quote_literal(&options.source_schema),
    ))?;

    let count = tables.len();
    for (table,) in tables {
        tracing::debug!(table = %table, sink_schema = %options.sink_schema, "attaching view");
        let definition = ViewDefinition {
            dsn: dsn.into(),
            source_schema: options.source_schema.clone(),
            table: table.clone(),
            filter_pushdown: options.filter_pushdown,
        };
        catalog.register_view(&options.sink_schema, &table, definition, options.overwrite)?;
    }

    conn.close()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_named_options() {
        let options = AttachOptions::default();
        assert_eq!(options.source_schema, "public");
        assert_eq!(options.sink_schema, "main");
        assert!(!options.overwrite);
        assert!(!options.filter_pushdown);
    }
}
