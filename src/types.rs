//! Remote column metadata to target type mapping.
use std::sync::Arc;

use crate::{ErrorKind, Result};

/// Classification of a remote type from `pg_type.typtype` plus the array
/// naming convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Base,
    Enum,
    Array,
    Other,
}

impl TypeKind {
    /// `typtype` is a single character; postgres array types additionally
    /// start with an underscore.
    pub fn from_catalog(typtype: &str, typname: &str) -> TypeKind {
        if typname.starts_with('_') {
            return TypeKind::Array;
        }
        match typtype {
            "b" => TypeKind::Base,
            "e" => TypeKind::Enum,
            _ => TypeKind::Other,
        }
    }
}

/// A mapped enumerated type with its ordered label set.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub labels: Vec<String>,
}

impl EnumType {
    /// Position of `label` within the mapped label set.
    pub fn ordinal_of(&self, label: &str) -> Option<u32> {
        self.labels.iter().position(|l| l == label).map(|p| p as u32)
    }
}

/// Target type a remote column materializes into.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetType {
    Bool,
    Int16,
    Int32,
    Int64,
    UInt32,
    Float32,
    Float64,
    Decimal { width: u8, scale: u8 },
    Text,
    Blob,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Enum(Arc<EnumType>),
    List(Box<TargetType>),
    /// No binary decode path; the column is cast to text server-side.
    Invalid,
}

impl TargetType {
    pub fn is_invalid(&self) -> bool {
        matches!(self, TargetType::Invalid)
    }
}

/// Remote type metadata as read from `pg_type`.
#[derive(Debug)]
pub struct RemoteTypeInfo<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub kind: TypeKind,
    pub element: Option<&'a RemoteTypeInfo<'a>>,
}

/// Extract `(precision, scale)` from a non-default `numeric` typmod.
pub fn decimal_typmod(typmod: i32) -> (u8, u8) {
    let width = ((typmod - 4) >> 16) & 0xffff;
    let scale = (((typmod - 4) & 0x7ff) ^ 1024) - 1024;
    (width as u8, scale as u8)
}

/// Map remote column metadata to a target type.
///
/// Enumerated types need their label set, which lives in the remote catalog;
/// `resolve_enum` is called with `(namespace, type name)` to fetch it.
/// Unknown base types map to [`TargetType::Invalid`], which the binder turns
/// into a server-side text cast.
pub fn map_type(
    info: &RemoteTypeInfo<'_>,
    typmod: i32,
    resolve_enum: &mut dyn FnMut(&str, &str) -> Result<Vec<String>>,
) -> Result<TargetType> {
    if info.kind == TypeKind::Array {
        let element = info
            .element
            .ok_or_else(|| ErrorKind::UnsupportedType("array type without element type".into()))?;
        let inner = map_type(element, typmod, resolve_enum)?;
        return Ok(TargetType::List(Box::new(inner)));
    }

    if info.kind == TypeKind::Enum {
        let labels = resolve_enum(info.namespace, info.name)?;
        return Ok(TargetType::Enum(Arc::new(EnumType {
            name: info.name.into(),
            labels,
        })));
    }

    let target = match info.name {
        "bool" => TargetType::Bool,
        "int2" => TargetType::Int16,
        "int4" => TargetType::Int32,
        "int8" => TargetType::Int64,
        // "The oid type is currently implemented as an unsigned four-byte integer."
        "oid" => TargetType::UInt32,
        "float4" => TargetType::Float32,
        "float8" => TargetType::Float64,
        "numeric" => {
            if typmod == -1 {
                // unbounded numeric, returned as double
                TargetType::Float64
            } else {
                let (width, scale) = decimal_typmod(typmod);
                TargetType::Decimal { width, scale }
            }
        }
        "char" | "bpchar" | "varchar" | "text" | "json" | "jsonb" => TargetType::Text,
        "date" => TargetType::Date,
        "bytea" => TargetType::Blob,
        "time" => TargetType::Time,
        "timetz" => TargetType::TimeTz,
        "timestamp" => TargetType::Timestamp,
        "timestamptz" => TargetType::TimestampTz,
        "interval" => TargetType::Interval,
        "uuid" => TargetType::Uuid,
        _ => TargetType::Invalid,
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_enums(_: &str, _: &str) -> Result<Vec<String>> {
        panic!("unexpected enum resolution")
    }

    fn base(name: &str) -> RemoteTypeInfo<'_> {
        RemoteTypeInfo { namespace: "pg_catalog", name, kind: TypeKind::Base, element: None }
    }

    #[test]
    fn numeric_typmod_extraction() {
        // numeric(10,2) is ((10 << 16) | 2) + 4
        assert_eq!(decimal_typmod(((10 << 16) | 2) + 4), (10, 2));
        assert_eq!(decimal_typmod(((38 << 16) | 0) + 4), (38, 0));
        assert_eq!(decimal_typmod(((4 << 16) | 4) + 4), (4, 4));
    }

    #[test]
    fn scalar_mappings() {
        assert_eq!(map_type(&base("int8"), -1, &mut no_enums).unwrap(), TargetType::Int64);
        assert_eq!(map_type(&base("oid"), -1, &mut no_enums).unwrap(), TargetType::UInt32);
        assert_eq!(map_type(&base("jsonb"), -1, &mut no_enums).unwrap(), TargetType::Text);
        assert_eq!(map_type(&base("timetz"), -1, &mut no_enums).unwrap(), TargetType::TimeTz);
    }

    #[test]
    fn unbounded_numeric_is_double() {
        assert_eq!(map_type(&base("numeric"), -1, &mut no_enums).unwrap(), TargetType::Float64);
        assert_eq!(
            map_type(&base("numeric"), ((10 << 16) | 2) + 4, &mut no_enums).unwrap(),
            TargetType::Decimal { width: 10, scale: 2 },
        );
    }

    #[test]
    fn unknown_type_is_invalid() {
        assert_eq!(map_type(&base("tsvector"), -1, &mut no_enums).unwrap(), TargetType::Invalid);
    }

    #[test]
    fn array_maps_to_list_of_element() {
        let elem = base("int4");
        let info = RemoteTypeInfo {
            namespace: "pg_catalog",
            name: "_int4",
            kind: TypeKind::Array,
            element: Some(&elem),
        };
        assert_eq!(
            map_type(&info, -1, &mut no_enums).unwrap(),
            TargetType::List(Box::new(TargetType::Int32)),
        );
    }

    #[test]
    fn enum_labels_are_resolved() {
        let info = RemoteTypeInfo {
            namespace: "public",
            name: "color",
            kind: TypeKind::Enum,
            element: None,
        };
        let mut resolve = |ns: &str, name: &str| {
            assert_eq!((ns, name), ("public", "color"));
            Ok(vec!["red".into(), "green".into(), "blue".into()])
        };
        let TargetType::Enum(e) = map_type(&info, -1, &mut resolve).unwrap() else {
            panic!("expected enum")
        };
        assert_eq!(e.ordinal_of("blue"), Some(2));
        assert_eq!(e.ordinal_of("mauve"), None);
    }
}
