use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SelectItem, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Column order for a positional `INSERT INTO reservations VALUES (...)`.
pub const INSERT_COLUMNS: [&str; 5] = ["table_id", "name", "phone", "email", "arrival_time"];

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertReservation {
        request: ReservationRequest,
        returning: bool,
    },
    SelectReservations,
    SelectTableBookings {
        table_id: String,
    },
    SelectTakenTables {
        arrival_time: String,
    },
    DeleteReservation {
        id: ReservationId,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        if values.len() != INSERT_COLUMNS.len() {
            return Err(SqlError::WrongArity(
                "reservations",
                INSERT_COLUMNS.len(),
                values.len(),
            ));
        }
        INSERT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("reservations", columns.len(), values.len()));
    }

    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(SqlError::Unsupported(format!("column {column} given twice")));
        }
    }

    let mut request = ReservationRequest::default();
    for (column, value) in columns.iter().zip(values.iter()) {
        let text = parse_text_or_null(value)?;
        match column.as_str() {
            "table_id" => request.table_id = text,
            "name" => request.name = text,
            "phone" => request.phone = text,
            "email" => request.email = text,
            "arrival_time" => request.arrival_time = text,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::InsertReservation {
        request,
        returning: insert.returning.is_some(),
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_eq(&delete.selection, "id")?;
    Ok(Command::DeleteReservation { id: parse_id(id)? })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    // Every view has a fixed row shape.
    if !matches!(select.projection.as_slice(), [SelectItem::Wildcard(_)]) {
        return Err(SqlError::Unsupported("column lists; use SELECT *".into()));
    }

    match table.as_str() {
        "reservations" => {
            if select.selection.is_some() {
                return Err(SqlError::Unsupported("filters on reservations".into()));
            }
            Ok(Command::SelectReservations)
        }
        "table_bookings" => {
            let value = extract_where_eq(&select.selection, "table_id")?;
            Ok(Command::SelectTableBookings {
                table_id: parse_text(value)?,
            })
        }
        "taken_tables" => {
            let value = extract_where_eq(&select.selection, "arrival_time")?;
            Ok(Command::SelectTakenTables {
                arrival_time: parse_text(value)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT; book one table at a time".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// Right-hand side of `WHERE <column> = <value>`.
fn extract_where_eq<'a>(
    selection: &'a Option<Expr>,
    column: &'static str,
) -> Result<&'a Expr, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    extract_where_eq_expr(sel, column)
}

fn extract_where_eq_expr<'a>(expr: &'a Expr, column: &'static str) -> Result<&'a Expr, SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => Ok(right),
        Expr::Nested(inner) => extract_where_eq_expr(inner, column),
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// String or number literal as text. Table ids arrive either way.
fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

/// Like `parse_text`, with NULL read as an empty field.
fn parse_text_or_null(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(String::new()),
        _ => parse_text(expr),
    }
}

fn parse_id(expr: &Expr) -> Result<ReservationId, SqlError> {
    let text = parse_text(expr)?;
    text.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad reservation id {text:?}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_request(sql: &str) -> (ReservationRequest, bool) {
        match parse_sql(sql).unwrap() {
            Command::InsertReservation { request, returning } => (request, returning),
            cmd => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_with_columns() {
        let sql = "INSERT INTO reservations (table_id, name, phone, email, arrival_time) \
                   VALUES ('5', 'Ada', '555-0100', '', '2024-01-01T12:00')";
        let (req, returning) = insert_request(sql);
        assert_eq!(req.table_id, "5");
        assert_eq!(req.name, "Ada");
        assert_eq!(req.phone, "555-0100");
        assert_eq!(req.email, "");
        assert_eq!(req.arrival_time, "2024-01-01T12:00");
        assert!(!returning);
    }

    #[test]
    fn parse_insert_columns_in_any_order() {
        let sql = "INSERT INTO reservations (arrival_time, email, name, table_id) \
                   VALUES ('2024-01-01 12:00', 'a@b.c', 'Ada', 7)";
        let (req, _) = insert_request(sql);
        assert_eq!(req.table_id, "7");
        assert_eq!(req.email, "a@b.c");
        assert_eq!(req.phone, "");
        assert_eq!(req.arrival_time, "2024-01-01 12:00");
    }

    #[test]
    fn parse_insert_positional() {
        let sql = "INSERT INTO reservations VALUES ('5', 'Ada', NULL, 'a@b.c', '2024-01-01T12:00')";
        let (req, _) = insert_request(sql);
        assert_eq!(req.table_id, "5");
        assert_eq!(req.phone, "");
        assert_eq!(req.email, "a@b.c");
    }

    #[test]
    fn parse_insert_positional_wrong_arity() {
        let sql = "INSERT INTO reservations VALUES ('5', 'Ada')";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::WrongArity("reservations", 5, 2))
        ));
    }

    #[test]
    fn parse_insert_returning() {
        let sql = "INSERT INTO reservations (table_id, name, phone, arrival_time) \
                   VALUES ('5', 'Ada', '1', '2024-01-01T12:00') RETURNING *";
        let (_, returning) = insert_request(sql);
        assert!(returning);
    }

    #[test]
    fn parse_insert_unknown_column() {
        let sql = "INSERT INTO reservations (table_id, party_size) VALUES ('5', 4)";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn(c)) if c == "party_size"));
    }

    #[test]
    fn parse_insert_multi_row_rejected() {
        let sql = "INSERT INTO reservations (table_id, name) VALUES ('1', 'a'), ('2', 'b')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_reservations() {
        assert_eq!(
            parse_sql("SELECT * FROM reservations").unwrap(),
            Command::SelectReservations
        );
    }

    #[test]
    fn parse_select_reservations_rejects_filters_and_columns() {
        for sql in [
            "SELECT * FROM reservations WHERE id = 7",
            "SELECT id, name FROM reservations",
            "SELECT arrival_time FROM taken_tables WHERE arrival_time = '2024-01-01T12:00'",
        ] {
            assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))), "{sql}");
        }
    }

    #[test]
    fn parse_insert_repeated_column_rejected() {
        let sql = "INSERT INTO reservations (table_id, name, name, phone, arrival_time) \
                   VALUES ('5', 'Ada', 'Eve', '555', '2024-01-01T12:00')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
        let sql = "INSERT INTO reservations (table_id, NAME, name) VALUES ('5', 'Ada', 'Eve')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_table_bookings() {
        assert_eq!(
            parse_sql("SELECT * FROM table_bookings WHERE table_id = '5'").unwrap(),
            Command::SelectTableBookings { table_id: "5".into() }
        );
        assert_eq!(
            parse_sql("SELECT * FROM table_bookings WHERE table_id = 12").unwrap(),
            Command::SelectTableBookings { table_id: "12".into() }
        );
    }

    #[test]
    fn parse_select_table_bookings_requires_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM table_bookings"),
            Err(SqlError::MissingFilter("table_id"))
        ));
    }

    #[test]
    fn parse_select_taken_tables() {
        let sql = "SELECT * FROM taken_tables WHERE arrival_time = '2024-01-01T12:00'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectTakenTables {
                arrival_time: "2024-01-01T12:00".into()
            }
        );
    }

    #[test]
    fn parse_delete_reservation() {
        assert_eq!(
            parse_sql("DELETE FROM reservations WHERE id = 7").unwrap(),
            Command::DeleteReservation { id: 7 }
        );
        assert_eq!(
            parse_sql("DELETE FROM reservations WHERE id = '8'").unwrap(),
            Command::DeleteReservation { id: 8 }
        );
    }

    #[test]
    fn parse_delete_bad_id() {
        assert!(matches!(
            parse_sql("DELETE FROM reservations WHERE id = 'seven'"),
            Err(SqlError::Parse(_))
        ));
    }

    #[test]
    fn parse_delete_requires_id_filter() {
        assert!(matches!(
            parse_sql("DELETE FROM reservations"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM menu"),
            Err(SqlError::UnknownTable(t)) if t == "menu"
        ));
        assert!(parse_sql("INSERT INTO tables (id) VALUES (1)").is_err());
    }

    #[test]
    fn parse_unsupported_statement() {
        assert!(matches!(
            parse_sql("DROP TABLE reservations"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
