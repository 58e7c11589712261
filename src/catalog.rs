//! Bind: table introspection into a scan descriptor.
use std::sync::Arc;

use crate::{
    config::Config,
    connection::Connection,
    postgres::Oid,
    sql::{quote_ident, quote_literal},
    types::{map_type, RemoteTypeInfo, TargetType, TypeKind},
    ErrorKind, Result,
};

/// Default number of physical pages per worker task.
pub const DEFAULT_PAGES_PER_TASK: u64 = 1000;

/// One column of the bound table, immutable after bind.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Namespace of the remote type.
    pub type_namespace: String,
    /// Name of the remote type, e.g. `int4` or `_text`.
    pub type_name: String,
    pub type_kind: TypeKind,
    /// `pg_type.typlen`; negative values denote variable width.
    pub type_len: i64,
    /// `pg_attribute.atttypmod`, carrying e.g. decimal precision and scale.
    pub type_modifier: i32,
    /// `pg_type.typelem`; zero unless the type is an array.
    pub element_oid: Oid,
    /// Element descriptor for array columns, used by the nested decode.
    pub element: Option<Box<ColumnDescriptor>>,
    /// The type this column materializes into.
    pub target: TargetType,
    /// Whether the projection casts the column to text server-side.
    pub needs_text_cast: bool,
}

/// Everything a scan needs to know about its table, created once at bind
/// time and shared read-only by all workers.
#[derive(Debug)]
pub struct ScanDescriptor {
    pub config: Config,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    /// `pg_class.relpages`, clamped to at least one. Not authoritative; the
    /// last page-range task is widened to compensate.
    pub approx_pages: u64,
    /// Snapshot id exported by the bind transaction, adopted by every
    /// worker. `None` on a standby server.
    pub snapshot: Option<String>,
    pub in_recovery: bool,
    pub pages_per_task: u64,
}

/// A bound table plus the connection owning its exported snapshot.
///
/// The snapshot is only adoptable while the exporting transaction lives, so
/// the bind connection is kept open for the lifetime of the scan.
#[derive(Debug)]
pub struct BoundTable {
    desc: Arc<ScanDescriptor>,
    conn: Connection,
}

impl BoundTable {
    pub fn descriptor(&self) -> &Arc<ScanDescriptor> {
        &self.desc
    }

    /// Gracefully end the bind transaction and connection.
    pub fn close(self) -> Result<()> {
        self.conn.close()
    }
}

/// Introspect `schema.table` and produce a scan descriptor.
///
/// Opens a `REPEATABLE READ READ ONLY` transaction, exports its snapshot
/// (unless the server is in recovery), estimates the page count and maps
/// every column to a target type.
pub fn bind(config: Config, schema: &str, table: &str) -> Result<BoundTable> {
    bind_with(config, schema, table, DEFAULT_PAGES_PER_TASK)
}

/// [`bind`] with an explicit page-range task size.
pub fn bind_with(
    config: Config,
    schema: &str,
    table: &str,
    pages_per_task: u64,
) -> Result<BoundTable> {
    let mut conn = Connection::connect(&config).map_err(|e| e.context("bind"))?;

    conn.execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")?;

    // export the transaction snapshot so the parallel reader threads can all
    // adopt the same view; a standby cannot export one
    let (in_recovery,) = conn.query_one::<(bool,)>("SELECT pg_is_in_recovery()")?;
    let snapshot = if in_recovery {
        tracing::debug!("server in recovery, workers run without a shared snapshot");
        None
    } else {
        Some(conn.query_one::<(String,)>("SELECT pg_export_snapshot()")?.0)
    };

    // resolve the relation oid up front to keep the column query join-free
    let relations = conn.query::<(Oid, i64)>(&format!(
        "SELECT pg_class.oid, GREATEST(relpages, 1) \
         FROM pg_class JOIN pg_namespace ON relnamespace = pg_namespace.oid \
         WHERE nspname={} AND relname={}",
        quote_literal(schema),
        quote_literal(table),
    ))?;
    if relations.len() != 1 {
        return Err(ErrorKind::TableNotFound {
            schema: schema.into(),
            table: table.into(),
        }
        .into());
    }
    let (relation_oid, approx_pages) = relations[0];

    let attributes = conn.query::<AttributeRow>(&format!(
        "SELECT \
             attname, atttypmod, pg_namespace.nspname, \
             pg_type.typname, pg_type.typlen, pg_type.typtype, pg_type.typelem, \
             pg_type_elem.typname elem_typname, pg_type_elem.typlen elem_typlen, \
             pg_type_elem.typtype elem_typtype \
         FROM pg_attribute \
             JOIN pg_type ON atttypid=pg_type.oid \
             LEFT JOIN pg_type pg_type_elem ON pg_type.typelem=pg_type_elem.oid \
             LEFT JOIN pg_namespace ON pg_type.typnamespace = pg_namespace.oid \
         WHERE attrelid={relation_oid} AND attnum > 0 \
         ORDER BY attnum",
    ))?;

    // tables without columns exist, but cannot be scanned
    if attributes.is_empty() {
        return Err(ErrorKind::EmptyRelation { table: table.into() }.into());
    }

    let mut columns = Vec::with_capacity(attributes.len());
    for row in attributes {
        columns.push(bind_column(&mut conn, row)?);
    }

    tracing::debug!(
        schema,
        table,
        columns = columns.len(),
        approx_pages,
        in_recovery,
        "bound table",
    );

    let desc = ScanDescriptor {
        config,
        schema: schema.into(),
        table: table.into(),
        columns,
        approx_pages: approx_pages.max(1) as u64,
        snapshot,
        in_recovery,
        pages_per_task,
    };

    Ok(BoundTable { desc: Arc::new(desc), conn })
}

type AttributeRow = (
    String,         // attname
    i32,            // atttypmod
    Option<String>, // type namespace
    String,         // typname
    i64,            // typlen
    String,         // typtype
    Oid,            // typelem
    Option<String>, // elem_typname
    Option<i64>,    // elem_typlen
    Option<String>, // elem_typtype
);

fn bind_column(conn: &mut Connection, row: AttributeRow) -> Result<ColumnDescriptor> {
    let (
        name,
        type_modifier,
        type_namespace,
        type_name,
        type_len,
        typtype,
        element_oid,
        elem_typname,
        elem_typlen,
        elem_typtype,
    ) = row;
    let type_namespace = type_namespace.unwrap_or_default();
    let type_kind = TypeKind::from_catalog(&typtype, &type_name);

    let elem_kind = match (&elem_typname, &elem_typtype) {
        (Some(name), Some(typtype)) => Some(TypeKind::from_catalog(typtype, name)),
        _ => None,
    };
    let elem_info = match (&elem_typname, elem_kind) {
        (Some(name), Some(kind)) => Some(RemoteTypeInfo {
            namespace: type_namespace.as_str(),
            name: name.as_str(),
            kind,
            element: None,
        }),
        _ => None,
    };
    let info = RemoteTypeInfo {
        namespace: type_namespace.as_str(),
        name: type_name.as_str(),
        kind: type_kind,
        element: elem_info.as_ref(),
    };

    let mut resolve_enum = |namespace: &str, name: &str| -> Result<Vec<String>> {
        let labels = conn.query::<(String,)>(&format!(
            "SELECT unnest(enum_range(NULL::{}.{}))",
            quote_ident(namespace),
            quote_ident(name),
        ))?;
        Ok(labels.into_iter().map(|(l,)| l).collect())
    };
    let mapped = map_type(&info, type_modifier, &mut resolve_enum)?;

    // unsupported types are cast to text on read
    let needs_text_cast = target_unsupported(&mapped);
    let target = if needs_text_cast { TargetType::Text } else { mapped };

    let element = match (&target, elem_typname) {
        (TargetType::List(inner), Some(elem_name)) => Some(Box::new(ColumnDescriptor {
            name: name.clone(),
            type_namespace: type_namespace.clone(),
            type_kind: TypeKind::from_catalog(
                elem_typtype.as_deref().unwrap_or(""),
                &elem_name,
            ),
            type_name: elem_name,
            type_len: elem_typlen.unwrap_or(-1),
            type_modifier,
            element_oid: 0,
            element: None,
            target: (**inner).clone(),
            needs_text_cast: false,
        })),
        _ => None,
    };

    Ok(ColumnDescriptor {
        name,
        type_namespace,
        type_name,
        type_kind,
        type_len,
        type_modifier,
        element_oid,
        element,
        target,
        needs_text_cast,
    })
}

/// A type (or any nested element type) without a binary decode path.
fn target_unsupported(target: &TargetType) -> bool {
    match target {
        TargetType::Invalid => true,
        TargetType::List(inner) => target_unsupported(inner),
        _ => false,
    }
}
