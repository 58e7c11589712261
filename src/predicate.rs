//! Predicate projection: restricted filter trees rendered into SQL
//! fragments appended to the worker COPY query for server-side pushdown.
use std::borrow::Cow;

use crate::{
    catalog::ColumnDescriptor,
    sql::{quote_ident, quote_literal},
    ErrorKind, Result,
};

/// Comparison operators appearing in filter trees.
///
/// Only the six plain comparisons can be pushed down; pattern matching is
/// representable so the projector can reject it explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Like,
    NotLike,
}

impl CompareOp {
    fn sql(self) -> Result<&'static str> {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::LtEq => "<=",
            CompareOp::GtEq => ">=",
            CompareOp::Like | CompareOp::NotLike => {
                return Err(unsupported("pattern comparison"))
            }
        };
        Ok(op)
    }
}

/// A filter tree over the bound table's columns.
///
/// Column indexes refer to the scan descriptor's column order.
#[derive(Clone, Debug)]
pub enum Predicate {
    IsNull { column: usize },
    IsNotNull { column: usize },
    /// Constant comparison; the constant is rendered as a quoted literal and
    /// the server coerces it to the column type.
    Compare { column: usize, op: CompareOp, value: String },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// A set of filter trees combined with `AND`.
#[derive(Clone, Debug, Default)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new() -> PredicateSet {
        PredicateSet::default()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Render the pushdown fragment appended to the worker COPY query.
    ///
    /// Returns an empty string, or ` AND (..)` covering every supported
    /// filter. A filter containing an unsupported node is dropped from
    /// pushdown (the scan then returns its rows unfiltered, which is sound
    /// because pushdown only narrows the result).
    pub fn render(&self, columns: &[ColumnDescriptor]) -> String {
        let mut parts = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            match render_node(predicate, columns) {
                Ok(sql) => parts.push(sql),
                Err(e) => {
                    tracing::warn!("predicate not pushed down: {}", e.kind());
                }
            }
        }
        if parts.is_empty() {
            return String::new();
        }
        format!(" AND ({})", parts.join(" AND "))
    }

    /// Render every filter, failing on the first unsupported node.
    pub fn try_render(&self, columns: &[ColumnDescriptor]) -> Result<String> {
        let mut parts = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            parts.push(render_node(predicate, columns)?);
        }
        Ok(match parts.is_empty() {
            true => String::new(),
            false => format!(" AND ({})", parts.join(" AND ")),
        })
    }
}

impl FromIterator<Predicate> for PredicateSet {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        PredicateSet { predicates: iter.into_iter().collect() }
    }
}

fn unsupported(what: impl Into<Cow<'static, str>>) -> crate::Error {
    ErrorKind::UnsupportedPredicate(what.into()).into()
}

fn column_name<'a>(columns: &'a [ColumnDescriptor], idx: usize) -> Result<&'a str> {
    columns
        .get(idx)
        .map(|c| c.name.as_str())
        .ok_or_else(|| ErrorKind::ColumnIndexOutOfBounds.into())
}

fn render_node(predicate: &Predicate, columns: &[ColumnDescriptor]) -> Result<String> {
    let sql = match predicate {
        Predicate::IsNull { column } => {
            format!("{} IS NULL", quote_ident(column_name(columns, *column)?))
        }
        Predicate::IsNotNull { column } => {
            format!("{} IS NOT NULL", quote_ident(column_name(columns, *column)?))
        }
        Predicate::Compare { column, op, value } => format!(
            "{} {} {}",
            quote_ident(column_name(columns, *column)?),
            op.sql()?,
            quote_literal(value),
        ),
        Predicate::And(children) => render_conjunction(children, columns, " AND ")?,
        Predicate::Or(children) => render_conjunction(children, columns, " OR ")?,
    };
    Ok(sql)
}

fn render_conjunction(
    children: &[Predicate],
    columns: &[ColumnDescriptor],
    op: &str,
) -> Result<String> {
    if children.is_empty() {
        return Err(unsupported("empty conjunction"));
    }
    let rendered = children
        .iter()
        .map(|c| render_node(c, columns))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", rendered.join(op)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::column;
    use crate::types::TargetType;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            column("x", "int4", TargetType::Int32),
            column("y", "text", TargetType::Text),
            column("z", "text", TargetType::Text),
        ]
    }

    #[test]
    fn conjunction_rendering() {
        let mut set = PredicateSet::new();
        set.push(Predicate::Compare { column: 0, op: CompareOp::Gt, value: "10".into() });
        set.push(Predicate::Or(vec![
            Predicate::IsNull { column: 1 },
            Predicate::Compare { column: 2, op: CompareOp::Eq, value: "a".into() },
        ]));

        assert_eq!(
            set.render(&columns()),
            r#" AND ("x" > '10' AND ("y" IS NULL OR "z" = 'a'))"#,
        );
    }

    #[test]
    fn unsupported_filter_is_dropped() {
        let mut set = PredicateSet::new();
        set.push(Predicate::Compare { column: 0, op: CompareOp::Gt, value: "10".into() });
        set.push(Predicate::Compare { column: 1, op: CompareOp::Like, value: "a%".into() });

        // the LIKE filter silently drops out of pushdown
        assert_eq!(set.render(&columns()), r#" AND ("x" > '10')"#);

        let err = set.try_render(&columns()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedPredicate(_)));
    }

    #[test]
    fn empty_set_renders_nothing() {
        assert_eq!(PredicateSet::new().render(&columns()), "");
    }

    #[test]
    fn literals_are_escaped() {
        let mut set = PredicateSet::new();
        set.push(Predicate::Compare {
            column: 1,
            op: CompareOp::Eq,
            value: "it's \\ here".into(),
        });
        assert_eq!(set.render(&columns()), r#" AND ("y" = E'it''s \\ here')"#);
    }

    #[test]
    fn out_of_bounds_column_is_not_pushed() {
        let mut set = PredicateSet::new();
        set.push(Predicate::IsNull { column: 99 });
        assert_eq!(set.render(&columns()), "");
    }
}
