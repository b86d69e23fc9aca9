pub mod pool;
pub mod schema;

use crate::atom::types::Value;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

/// Quotes an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Float(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Boolean(v) => ToSqlOutput::from(i64::from(*v)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::quote_ident;
    use crate::atom::types::Value;
    use rusqlite::Connection;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("monster__mana"), "\"monster__mana\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn values_bind_with_sqlite_affinity() {
        let conn = Connection::open_in_memory().expect("open");
        let (kind, flag): (String, i64) = conn
            .query_row(
                "SELECT typeof(?1), ?2",
                [Value::Float(2.5), Value::Boolean(true)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("select");
        assert_eq!(kind, "real");
        assert_eq!(flag, 1);

        let text: String = conn
            .query_row("SELECT ?1", [Value::Text("ember".into())], |row| row.get(0))
            .expect("select");
        assert_eq!(text, "ember");
    }
}
