//! SQL literal rendering shared by the relational sources
//!
//! Rows leave the relational sources as value tuples such as
//! `(1, 'O''Brien', NULL)` that can be pasted into an `INSERT ... VALUES`
//! statement of the same dialect.

/// SQL dialect used for quoting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mysql,
}

/// Literal for SQL NULL
pub const NULL: &str = "NULL";

/// Quote a string literal
///
/// MySQL treats backslashes inside literals as escapes, so they are doubled
/// there as well.
pub fn quote_string(value: &str, dialect: Dialect) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' if dialect == Dialect::Mysql => out.push_str("\\\\"),
            '\0' if dialect == Dialect::Mysql => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier (table or column name)
pub fn quote_ident(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
    }
}

/// Render a binary value as a literal
pub fn quote_bytes(value: &[u8], dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgres => format!("'\\x{}'", hex::encode(value)),
        Dialect::Mysql => format!("X'{}'", hex::encode(value)),
    }
}

/// Render a float, quoting the non-finite values
pub fn render_float(value: f64, dialect: Dialect) -> String {
    if value.is_finite() {
        value.to_string()
    } else if value.is_nan() {
        quote_string("NaN", dialect)
    } else if value.is_sign_positive() {
        quote_string("Infinity", dialect)
    } else {
        quote_string("-Infinity", dialect)
    }
}

/// Render a boolean
pub fn render_bool(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

/// Join rendered values into a row tuple
pub fn render_tuple(values: &[String]) -> String {
    format!("({})", values.join(", "))
}

/// PostgreSQL `udt_name`s decoded natively by the source
const POSTGRES_NATIVE: &[&str] = &[
    "bool", "int2", "int4", "int8", "float4", "float8", "numeric", "text", "varchar", "bpchar",
    "name", "uuid", "timestamp", "timestamptz", "date", "time", "json", "jsonb", "bytea",
];

/// MySQL `DATA_TYPE`s decoded natively by the source
const MYSQL_NATIVE: &[&str] = &[
    "tinyint", "smallint", "mediumint", "int", "bigint", "float", "double", "decimal", "date",
    "datetime", "timestamp", "time", "json", "binary", "varbinary", "tinyblob", "blob",
    "mediumblob", "longblob", "bit", "char", "varchar", "tinytext", "text", "mediumtext",
    "longtext",
];

const MYSQL_SPATIAL: &[&str] = &[
    "geometry", "point", "linestring", "polygon", "multipoint", "multilinestring",
    "multipolygon", "geometrycollection", "geomcollection",
];

/// Whether values of a column type are decoded without a text cast
pub fn is_native_type(type_name: &str, dialect: Dialect) -> bool {
    let type_name = type_name.to_ascii_lowercase();
    let native = match dialect {
        Dialect::Postgres => POSTGRES_NATIVE,
        Dialect::Mysql => MYSQL_NATIVE,
    };
    native.contains(&type_name.as_str())
}

/// Build the select list of a data query
///
/// Columns whose type has no native decoding (arrays, enums, intervals,
/// network and spatial types, ...) are cast to text under their own name, so
/// every value reaches the renderer as a string.
///
/// # Arguments
/// * `columns` - `(name, type)` pairs in ordinal order
/// * `dialect` - Dialect used for quoting and casts
///
/// # Returns
/// * `String` - Comma-separated select list, `*` when no columns are known
pub fn select_list(columns: &[(String, String)], dialect: Dialect) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }

    columns
        .iter()
        .map(|(name, type_name)| {
            let ident = quote_ident(name, dialect);
            if is_native_type(type_name, dialect) {
                return ident;
            }
            match dialect {
                Dialect::Postgres => format!("{ident}::text AS {ident}"),
                Dialect::Mysql if MYSQL_SPATIAL.contains(&type_name.to_ascii_lowercase().as_str()) => {
                    format!("ST_AsText({ident}) AS {ident}")
                }
                Dialect::Mysql => format!("CAST({ident} AS CHAR) AS {ident}"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
