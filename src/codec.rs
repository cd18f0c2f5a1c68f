//! Column codecs: typed scan targets and SQL literal rendering.
//!
//! A [`Codec`] is chosen once per column from the catalog-reported type name,
//! nullability and array flag. It knows how to pull a value of that column out
//! of a [`Row`] (the scan slot) and every scanned [`Value`] knows how to print
//! itself as a PostgreSQL literal. Combinations without a codec are rejected
//! up front with [`Error::UnsupportedColumnKind`].

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

/// Integer storage width on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    /// `smallint`
    Small,
    /// `integer`
    Regular,
    /// `bigint`
    Big,
}

/// Floating point storage width on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    /// `real`
    Single,
    /// `double precision`
    Double,
}

/// How a textual column travels from the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRepr {
    /// Binary format is already the text itself
    Native,
    /// `json` / `jsonb`, read natively but typed by the destination in arrays
    Json,
    /// Selected as `::text` so the exact textual form survives
    Cast,
}

/// Temporal flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    /// `timestamp without time zone`
    Timestamp,
    /// `timestamp with time zone`
    TimestampTz,
    /// `date`
    Date,
    /// `time without time zone`
    Time,
    /// `time with time zone`, carried as text
    TimeTz,
}

/// Semantic kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Whole numbers
    Integer(IntWidth),
    /// Floating point numbers
    Float(FloatWidth),
    /// Strings, JSON, numerics and anything else round-tripped as text
    Text(TextRepr),
    /// Dates, times and timestamps
    Temporal(TemporalKind),
    /// `boolean`
    Boolean,
    /// `uuid`
    Identifier,
}

impl ColumnKind {
    /// Classify a catalog type name (`information_schema.columns.data_type`).
    pub fn from_catalog(data_type: &str) -> Option<Self> {
        let kind = match data_type {
            "smallint" | "smallserial" => ColumnKind::Integer(IntWidth::Small),
            "integer" | "serial" => ColumnKind::Integer(IntWidth::Regular),
            "bigint" | "bigserial" => ColumnKind::Integer(IntWidth::Big),
            "real" => ColumnKind::Float(FloatWidth::Single),
            "double precision" => ColumnKind::Float(FloatWidth::Double),
            "character varying" | "varchar" | "character" | "char" | "text" | "name" => {
                ColumnKind::Text(TextRepr::Native)
            }
            "json" | "jsonb" => ColumnKind::Text(TextRepr::Json),
            "decimal" | "numeric" | "money" | "tsvector" | "bytea" | "interval" | "inet"
            | "cidr" | "macaddr" | "xml" | "USER-DEFINED" => ColumnKind::Text(TextRepr::Cast),
            "timestamp without time zone" => ColumnKind::Temporal(TemporalKind::Timestamp),
            "timestamp with time zone" => ColumnKind::Temporal(TemporalKind::TimestampTz),
            "date" => ColumnKind::Temporal(TemporalKind::Date),
            "time without time zone" => ColumnKind::Temporal(TemporalKind::Time),
            "time with time zone" => ColumnKind::Temporal(TemporalKind::TimeTz),
            "boolean" => ColumnKind::Boolean,
            "uuid" => ColumnKind::Identifier,
            _ => return None,
        };
        Some(kind)
    }
}

/// Scan target and literal renderer for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    kind: ColumnKind,
    nullable: bool,
    array: bool,
}

impl Codec {
    /// Select the codec for a column, failing fast on unknown combinations.
    pub fn bind(column: &str, data_type: &str, nullable: bool, array: bool) -> Result<Self> {
        let unsupported = || Error::UnsupportedColumnKind {
            column: column.to_string(),
            data_type: data_type.to_string(),
            nullable,
            array,
        };

        let kind = ColumnKind::from_catalog(data_type).ok_or_else(unsupported)?;
        match kind {
            ColumnKind::Temporal(_) if array => return Err(unsupported()),
            ColumnKind::Identifier if array || nullable => return Err(unsupported()),
            _ => {}
        }

        Ok(Self {
            kind,
            nullable,
            array,
        })
    }

    /// Semantic kind.
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Whether NULL is a legal value.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the column holds a one-dimensional array.
    pub fn is_array(&self) -> bool {
        self.array
    }

    /// Cast to apply in the row SELECT, if any.
    pub fn select_cast(&self) -> Option<&'static str> {
        match self.kind {
            ColumnKind::Text(TextRepr::Cast) | ColumnKind::Temporal(TemporalKind::TimeTz) => {
                Some(if self.array { "text[]" } else { "text" })
            }
            _ => None,
        }
    }

    /// Read column `idx` of `row` into a [`Value`].
    pub fn scan(&self, row: &Row, idx: usize) -> std::result::Result<Value, tokio_postgres::Error> {
        let nullable = self.nullable;

        if self.array {
            let value = match self.kind {
                ColumnKind::Integer(IntWidth::Small) => {
                    get::<Vec<Option<i16>>>(row, idx, nullable)?
                        .map(|v| Value::IntArray(v.into_iter().map(|x| x.map(i64::from)).collect()))
                }
                ColumnKind::Integer(IntWidth::Regular) => {
                    get::<Vec<Option<i32>>>(row, idx, nullable)?
                        .map(|v| Value::IntArray(v.into_iter().map(|x| x.map(i64::from)).collect()))
                }
                ColumnKind::Integer(IntWidth::Big) => {
                    get::<Vec<Option<i64>>>(row, idx, nullable)?.map(Value::IntArray)
                }
                ColumnKind::Float(FloatWidth::Single) => {
                    get::<Vec<Option<f32>>>(row, idx, nullable)?.map(Value::Float4Array)
                }
                ColumnKind::Float(FloatWidth::Double) => {
                    get::<Vec<Option<f64>>>(row, idx, nullable)?.map(Value::Float8Array)
                }
                ColumnKind::Text(repr) => {
                    get::<Vec<Option<PgText>>>(row, idx, nullable)?.map(|v| {
                        let elements = v.into_iter().map(|x| x.map(|t| t.0)).collect();
                        // Only string arrays coerce from text[]; the rest must
                        // take their element type from the destination column.
                        if repr == TextRepr::Native {
                            Value::TextArray(elements)
                        } else {
                            Value::UntypedArray(elements)
                        }
                    })
                }
                ColumnKind::Boolean => {
                    get::<Vec<Option<bool>>>(row, idx, nullable)?.map(Value::BoolArray)
                }
                // Rejected in bind()
                ColumnKind::Temporal(_) | ColumnKind::Identifier => None,
            };
            return Ok(value.unwrap_or(Value::Null));
        }

        let value = match self.kind {
            ColumnKind::Integer(IntWidth::Small) => {
                get::<i16>(row, idx, nullable)?.map(|v| Value::Int(v.into()))
            }
            ColumnKind::Integer(IntWidth::Regular) => {
                get::<i32>(row, idx, nullable)?.map(|v| Value::Int(v.into()))
            }
            ColumnKind::Integer(IntWidth::Big) => get::<i64>(row, idx, nullable)?.map(Value::Int),
            ColumnKind::Float(FloatWidth::Single) => {
                get::<f32>(row, idx, nullable)?.map(Value::Float4)
            }
            ColumnKind::Float(FloatWidth::Double) => {
                get::<f64>(row, idx, nullable)?.map(Value::Float8)
            }
            ColumnKind::Text(_) | ColumnKind::Temporal(TemporalKind::TimeTz) => {
                get::<PgText>(row, idx, nullable)?.map(|t| Value::Text(t.0))
            }
            ColumnKind::Temporal(TemporalKind::Timestamp) => {
                get::<NaiveDateTime>(row, idx, nullable)?.map(Value::Timestamp)
            }
            ColumnKind::Temporal(TemporalKind::TimestampTz) => {
                get::<DateTime<Utc>>(row, idx, nullable)?.map(Value::TimestampTz)
            }
            ColumnKind::Temporal(TemporalKind::Date) => {
                get::<NaiveDate>(row, idx, nullable)?.map(Value::Date)
            }
            ColumnKind::Temporal(TemporalKind::Time) => {
                get::<NaiveTime>(row, idx, nullable)?.map(Value::Time)
            }
            ColumnKind::Boolean => get::<bool>(row, idx, nullable)?.map(Value::Bool),
            ColumnKind::Identifier => get::<Uuid>(row, idx, nullable)?.map(Value::Uuid),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

fn get<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    nullable: bool,
) -> std::result::Result<Option<T>, tokio_postgres::Error> {
    if nullable {
        row.try_get::<_, Option<T>>(idx)
    } else {
        row.try_get::<_, T>(idx).map(Some)
    }
}

/// Text-backed scan target for every type whose binary format is its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgText(pub String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let raw = if *ty == Type::JSONB {
            match raw.split_first() {
                Some((&1, rest)) => rest,
                _ => return Err("unsupported jsonb encoding version".into()),
            }
        } else {
            raw
        };
        Ok(PgText(std::str::from_utf8(raw)?.to_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
            || *ty == Type::UNKNOWN
            || *ty == Type::JSON
            || *ty == Type::JSONB
            || matches!(ty.kind(), Kind::Enum(_))
            || ty.name() == "citext"
    }
}

/// One scanned column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Any integer width
    Int(i64),
    /// `real`
    Float4(f32),
    /// `double precision`
    Float8(f64),
    /// Text-backed value
    Text(String),
    /// `timestamp without time zone`
    Timestamp(NaiveDateTime),
    /// `timestamp with time zone`
    TimestampTz(DateTime<Utc>),
    /// `date`
    Date(NaiveDate),
    /// `time without time zone`
    Time(NaiveTime),
    /// `boolean`
    Bool(bool),
    /// `uuid`
    Uuid(Uuid),
    /// Integer array
    IntArray(Vec<Option<i64>>),
    /// `real[]`
    Float4Array(Vec<Option<f32>>),
    /// `double precision[]`
    Float8Array(Vec<Option<f64>>),
    /// String array (`text[]`, `varchar[]`, ...)
    TextArray(Vec<Option<String>>),
    /// Any other text-backed array, rendered as an untyped `'{...}'` literal
    UntypedArray(Vec<Option<String>>),
    /// `boolean[]`
    BoolArray(Vec<Option<bool>>),
}

impl Value {
    /// Render as a PostgreSQL literal.
    pub fn literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float4(v) => float_literal(*v as f64, v.is_finite(), || v.to_string()),
            Value::Float8(v) => float_literal(*v, v.is_finite(), || v.to_string()),
            Value::Text(s) => quote_literal(s),
            Value::Timestamp(ts) => quote_literal(&format_timestamp(ts)),
            Value::TimestampTz(ts) => quote_literal(&format_timestamptz(ts)),
            Value::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => quote_literal(&t.format("%H:%M:%S%.6f").to_string()),
            Value::Bool(b) => bool_literal(*b).to_string(),
            Value::Uuid(u) => quote_literal(&u.hyphenated().to_string()),
            Value::IntArray(vs) => array_literal(vs, |v| v.to_string()),
            Value::Float4Array(vs) => {
                array_literal(vs, |v| float_literal(*v as f64, v.is_finite(), || v.to_string()))
            }
            Value::Float8Array(vs) => {
                array_literal(vs, |v| float_literal(*v, v.is_finite(), || v.to_string()))
            }
            Value::TextArray(vs) => array_literal(vs, |s| quote_literal(s)),
            Value::UntypedArray(vs) => untyped_array_literal(vs),
            Value::BoolArray(vs) => array_literal(vs, |b| bool_literal(*b).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal())
    }
}

// Rust's float Display is the shortest round-trip form and never uses
// exponent notation.
fn float_literal(v: f64, finite: bool, shortest: impl FnOnce() -> String) -> String {
    if finite {
        shortest()
    } else if v.is_nan() {
        "'NaN'".to_string()
    } else if v > 0.0 {
        "'Infinity'".to_string()
    } else {
        "'-Infinity'".to_string()
    }
}

fn bool_literal(b: bool) -> &'static str {
    if b { "TRUE" } else { "FALSE" }
}

fn array_literal<T>(values: &[Option<T>], element: impl Fn(&T) -> String) -> String {
    if values.is_empty() {
        return "'{}'".to_string();
    }
    // ARRAY[NULL, ...] has no element type to resolve, an untyped literal does.
    if values.iter().all(Option::is_none) {
        return format!("'{{{}}}'", vec!["NULL"; values.len()].join(","));
    }
    let elements: Vec<String> = values
        .iter()
        .map(|v| v.as_ref().map(&element).unwrap_or_else(|| "NULL".to_string()))
        .collect();
    format!("ARRAY[{}]", elements.join(", "))
}

/// `'{"a","b",NULL}'`: the array input syntax inside a string literal, so the
/// destination column decides the element type.
fn untyped_array_literal(values: &[Option<String>]) -> String {
    let elements: Vec<String> = values
        .iter()
        .map(|v| match v {
            Some(element) => {
                let mut quoted = String::with_capacity(element.len() + 2);
                quoted.push('"');
                for ch in element.chars() {
                    if ch == '"' || ch == '\\' {
                        quoted.push('\\');
                    }
                    quoted.push(ch);
                }
                quoted.push('"');
                quoted
            }
            None => "NULL".to_string(),
        })
        .collect();
    quote_literal(&format!("{{{}}}", elements.join(",")))
}

/// Quote a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// `YYYY-MM-DD HH:MM:SS.ssssss`
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// `YYYY-MM-DD HH:MM:SS.ssssss+00`
pub fn format_timestamptz(ts: &DateTime<Utc>) -> String {
    format!("{}+00", format_timestamp(&ts.naive_utc()))
}

/// `'YYYY-MM-DD HH:MM:SS.ssssss+00'::timestamptz`, for comparisons.
///
/// The explicit type makes a `timestamp without time zone` operand go through
/// the session time zone instead of dropping the offset from the literal.
pub fn timestamptz_literal(ts: &DateTime<Utc>) -> String {
    format!("{}::timestamptz", quote_literal(&format_timestamptz(ts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn unsupported(result: Result<Codec>) -> bool {
        matches!(result, Err(Error::UnsupportedColumnKind { .. }))
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("foobar"), "'foobar'");
        assert_eq!(quote_literal("foo'bar"), "'foo''bar'");
        assert_eq!(quote_literal(""), "''");
        assert_eq!(quote_literal("''"), "''''''");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("id"), "\"id\"");
        assert_eq!(quote_ident("camelCase2"), "\"camelCase2\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_bind_classifies_catalog_types() {
        let c = Codec::bind("a", "integer", false, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Integer(IntWidth::Regular));
        let c = Codec::bind("a", "bigserial", true, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Integer(IntWidth::Big));
        assert!(c.nullable());
        let c = Codec::bind("a", "double precision", false, true).unwrap();
        assert_eq!(c.kind(), ColumnKind::Float(FloatWidth::Double));
        assert!(c.is_array());
        let c = Codec::bind("a", "jsonb", true, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Text(TextRepr::Json));
        let c = Codec::bind("a", "character varying", true, true).unwrap();
        assert_eq!(c.kind(), ColumnKind::Text(TextRepr::Native));
        let c = Codec::bind("a", "numeric", true, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Text(TextRepr::Cast));
        let c = Codec::bind("a", "timestamp with time zone", true, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Temporal(TemporalKind::TimestampTz));
        let c = Codec::bind("a", "uuid", false, false).unwrap();
        assert_eq!(c.kind(), ColumnKind::Identifier);
    }

    #[test]
    fn test_bind_rejects_unsupported() {
        assert!(unsupported(Codec::bind("a", "point", false, false)));
        assert!(unsupported(Codec::bind("a", "point", false, true)));
        assert!(unsupported(Codec::bind("a", "date", false, true)));
        assert!(unsupported(Codec::bind(
            "a",
            "timestamp with time zone",
            true,
            true
        )));
        assert!(unsupported(Codec::bind("a", "uuid", true, false)));
        assert!(unsupported(Codec::bind("a", "uuid", false, true)));
    }

    #[test]
    fn test_select_cast() {
        let c = Codec::bind("a", "numeric", false, false).unwrap();
        assert_eq!(c.select_cast(), Some("text"));
        let c = Codec::bind("a", "USER-DEFINED", false, true).unwrap();
        assert_eq!(c.select_cast(), Some("text[]"));
        let c = Codec::bind("a", "time with time zone", true, false).unwrap();
        assert_eq!(c.select_cast(), Some("text"));
        let c = Codec::bind("a", "text", false, false).unwrap();
        assert_eq!(c.select_cast(), None);
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Value::Null.literal(), "NULL");
        assert_eq!(Value::Int(-42).literal(), "-42");
        assert_eq!(Value::Text("it's".into()).literal(), "'it''s'");
        assert_eq!(Value::Bool(true).literal(), "TRUE");
        assert_eq!(Value::Bool(false).literal(), "FALSE");
        let u = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            Value::Uuid(u).literal(),
            "'67e55044-10b1-426f-9247-bb680e5fe0c8'"
        );
    }

    #[test]
    fn test_float_literals_keep_precision() {
        assert_eq!(Value::Float8(0.1).literal(), "0.1");
        assert_eq!(Value::Float8(1e21).literal(), "1000000000000000000000");
        assert_eq!(Value::Float8(1.5e-7).literal(), "0.00000015");
        assert_eq!(Value::Float4(0.1).literal(), "0.1");
        assert_eq!(Value::Float8(f64::NAN).literal(), "'NaN'");
        assert_eq!(Value::Float8(f64::INFINITY).literal(), "'Infinity'");
        assert_eq!(Value::Float4(f32::NEG_INFINITY).literal(), "'-Infinity'");
    }

    #[test]
    fn test_temporal_literals() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(89);
        assert_eq!(
            Value::TimestampTz(ts).literal(),
            "'2021-03-04 05:06:07.000089+00'"
        );
        assert_eq!(
            Value::Timestamp(ts.naive_utc()).literal(),
            "'2021-03-04 05:06:07.000089'"
        );
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()).literal(),
            "'1999-12-31'"
        );
        assert_eq!(
            Value::Time(NaiveTime::from_hms_micro_opt(23, 59, 1, 5).unwrap()).literal(),
            "'23:59:01.000005'"
        );
    }

    #[test]
    fn test_array_literals() {
        assert_eq!(Value::IntArray(vec![]).literal(), "'{}'");
        assert_eq!(
            Value::IntArray(vec![Some(1), Some(2), Some(3)]).literal(),
            "ARRAY[1, 2, 3]"
        );
        assert_eq!(
            Value::IntArray(vec![Some(1), None]).literal(),
            "ARRAY[1, NULL]"
        );
        assert_eq!(Value::IntArray(vec![None, None]).literal(), "'{NULL,NULL}'");
        assert_eq!(
            Value::TextArray(vec![Some("a'b".into()), Some(String::new())]).literal(),
            "ARRAY['a''b', '']"
        );
        assert_eq!(Value::TextArray(vec![]).literal(), "'{}'");
        assert_eq!(Value::UntypedArray(vec![]).literal(), "'{}'");
        assert_eq!(
            Value::BoolArray(vec![Some(true), Some(false)]).literal(),
            "ARRAY[TRUE, FALSE]"
        );
        assert_eq!(
            Value::Float8Array(vec![Some(0.5), Some(f64::NAN)]).literal(),
            "ARRAY[0.5, 'NaN']"
        );
    }

    #[test]
    fn test_untyped_array_literals() {
        assert_eq!(
            Value::UntypedArray(vec![Some("1.50".into()), None, Some("-3".into())]).literal(),
            r#"'{"1.50",NULL,"-3"}'"#
        );
        assert_eq!(
            Value::UntypedArray(vec![Some(r#"{"a": "x'y"}"#.into())]).literal(),
            r#"'{"{\"a\": \"x''y\"}"}'"#
        );
        assert_eq!(
            Value::UntypedArray(vec![Some(r"C:\dir".into()), Some("NULL".into())]).literal(),
            r#"'{"C:\\dir","NULL"}'"#
        );
        assert_eq!(Value::UntypedArray(vec![None]).literal(), "'{NULL}'");
    }

    #[test]
    fn test_non_string_text_arrays_scan_untyped() {
        for data_type in ["jsonb", "json", "numeric", "USER-DEFINED", "interval", "inet"] {
            let codec = Codec::bind("a", data_type, true, true).unwrap();
            assert_ne!(codec.kind(), ColumnKind::Text(TextRepr::Native), "{data_type}");
        }
        for data_type in ["text", "character varying", "character", "name"] {
            let codec = Codec::bind("a", data_type, true, true).unwrap();
            assert_eq!(codec.kind(), ColumnKind::Text(TextRepr::Native), "{data_type}");
        }
    }

    #[test]
    fn test_timestamptz_literal_is_typed() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            timestamptz_literal(&ts),
            "'2024-01-02 03:04:05.000000+00'::timestamptz"
        );
    }

    proptest! {
        #[test]
        fn prop_quote_literal_unquotes_to_input(s in ".*") {
            let quoted = quote_literal(&s);
            prop_assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("''", "'"), s.clone());
            prop_assert_eq!(inner.matches('\'').count(), 2 * s.matches('\'').count());
        }

        #[test]
        fn prop_quote_ident_unquotes_to_input(s in ".*") {
            let quoted = quote_ident(&s);
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("\"\"", "\""), s);
        }
    }
}
