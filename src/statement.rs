//! SELECT and INSERT/UPSERT statement rendering.

use crate::codec::quote_ident;
use crate::error::{Error, Result};
use crate::schema::Column;

/// What to do when an inserted row collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict<'a> {
    /// Plain INSERT, collisions fail
    Fail,
    /// `ON CONFLICT DO NOTHING`
    Ignore,
    /// `ON CONFLICT (<col>) DO UPDATE SET ...`
    Update(&'a str),
}

impl<'a> Conflict<'a> {
    /// Resolve the conflict policy from the two mutually exclusive options.
    pub fn from_options(conflict_column: Option<&'a str>, no_conflict: bool) -> Result<Self> {
        match (conflict_column, no_conflict) {
            (Some(_), true) => Err(Error::MutuallyExclusiveOptions),
            (Some(column), false) => Ok(Conflict::Update(column)),
            (None, true) => Ok(Conflict::Ignore),
            (None, false) => Ok(Conflict::Fail),
        }
    }
}

/// Rendering knobs for INSERT statements.
#[derive(Debug, Clone, Copy)]
pub struct InsertOptions<'a> {
    /// Conflict policy
    pub conflict: Conflict<'a>,
    /// Leave out the `(<col>, ...)` list
    pub skip_column_names: bool,
}

/// `SELECT <cols> FROM <table>` for the given columns.
pub fn render_select(table: &str, columns: &[Column]) -> String {
    let exprs: Vec<String> = columns.iter().map(Column::select_expr).collect();
    format!("SELECT {} FROM {}", exprs.join(", "), table)
}

/// INSERT statement for the values currently held by `columns`.
pub fn render_insert(dest_table: &str, columns: &[Column], opts: &InsertOptions<'_>) -> Result<String> {
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        values.push(col.literal()?);
    }

    let mut st = format!("INSERT INTO {dest_table}");
    if !opts.skip_column_names {
        let names: Vec<String> = columns.iter().map(Column::quoted_name).collect();
        st.push_str(&format!(" ({})", names.join(", ")));
    }
    st.push_str(&format!(" VALUES ({})", values.join(", ")));

    match opts.conflict {
        Conflict::Fail => {}
        Conflict::Ignore => st.push_str(" ON CONFLICT DO NOTHING"),
        Conflict::Update(conflict_column) => {
            let target = quote_ident(conflict_column);
            let updates: Vec<String> = columns
                .iter()
                .filter(|col| col.name() != conflict_column)
                .map(|col| {
                    let name = col.quoted_name();
                    format!("{name}=EXCLUDED.{name}")
                })
                .collect();
            if updates.is_empty() {
                st.push_str(&format!(" ON CONFLICT ({target}) DO NOTHING"));
            } else {
                st.push_str(&format!(
                    " ON CONFLICT ({target}) DO UPDATE SET {}",
                    updates.join(", ")
                ));
            }
        }
    }

    st.push_str(";\n");
    Ok(st)
}
