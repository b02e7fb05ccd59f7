use chrono::NaiveDate;
use sqlparser::ast::{
    self, BinaryOperator, Expr, FromTable, Ident, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        id: Ulid,
        number: String,
        category: String,
        rate: f64,
        capacity: u32,
    },
    DeleteRoom {
        id: Ulid,
    },
    SetRoomStatus {
        room_id: Ulid,
        status: RoomStatus,
    },
    InsertGuest {
        id: Ulid,
        name: String,
        passport: String,
        phone: Option<String>,
    },
    DeleteGuest {
        id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        guest_id: Ulid,
        room_id: Ulid,
        check_in: Option<NaiveDate>,
        check_out: Option<NaiveDate>,
    },
    CheckIn {
        booking_id: Ulid,
    },
    CheckOut {
        booking_id: Ulid,
        paid: bool,
    },
    InsertPayment {
        booking_id: Ulid,
        amount: f64,
        paid: bool,
    },
    MarkPaid {
        booking_id: Ulid,
    },
    SelectRooms,
    SelectGuests,
    SelectPayments,
    SelectBookings {
        status: Option<BookingStatus>,
    },
    SelectAvailability {
        check_in: Option<NaiveDate>,
        check_out: Option<NaiveDate>,
    },
    SelectArrivals {
        date: Option<NaiveDate>,
    },
    SelectDepartures,
    Login {
        username: String,
        password: String,
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

fn require(table: &'static str, values: &[Expr], n: usize) -> Result<(), SqlError> {
    if values.len() < n {
        return Err(SqlError::WrongArity(table, n, values.len()));
    }
    Ok(())
}

/// Column order each insertable table binds positionally, and how many
/// leading columns are required.
fn insert_columns(table: &str) -> Option<(&'static [&'static str], usize)> {
    let columns: (&'static [&'static str], usize) = match table {
        "rooms" => (&["id", "number", "category", "rate", "capacity"], 5),
        "room_status" => (&["room_id", "status"], 2),
        "guests" => (&["id", "name", "passport", "phone"], 3),
        "bookings" => (&["id", "guest_id", "room_id", "check_in", "check_out"], 5),
        "check_ins" | "paid_bookings" => (&["booking_id"], 1),
        "check_outs" => (&["booking_id", "paid"], 1),
        "payments" => (&["booking_id", "amount", "paid"], 2),
        _ => return None,
    };
    Some(columns)
}

/// Reorder `values` into the table's column order when the statement names
/// its columns. Without a column list, values bind by position.
fn bind_columns(table: &str, named: &[Ident], values: Vec<Expr>) -> Result<Vec<Expr>, SqlError> {
    let (columns, required) =
        insert_columns(table).ok_or_else(|| SqlError::UnknownTable(table.to_string()))?;
    if named.is_empty() {
        return Ok(values);
    }
    if named.len() != values.len() {
        return Err(SqlError::Parse(format!(
            "{} columns but {} values",
            named.len(),
            values.len()
        )));
    }

    let mut slots: Vec<Option<Expr>> = vec![None; columns.len()];
    for (ident, value) in named.iter().zip(values) {
        let name = ident.value.to_lowercase();
        let idx = columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| SqlError::UnknownColumn(table.to_string(), name.clone()))?;
        if slots[idx].replace(value).is_some() {
            return Err(SqlError::Parse(format!("column {name} given twice")));
        }
    }

    let mut bound = Vec::with_capacity(columns.len());
    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(value) if bound.len() == idx => bound.push(value),
            Some(_) => return Err(SqlError::MissingColumn(columns[bound.len()])),
            None if idx < required => return Err(SqlError::MissingColumn(columns[idx])),
            None => {}
        }
    }
    Ok(bound)
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = bind_columns(&table, &insert.columns, extract_insert_values(insert)?)?;

    match table.as_str() {
        "rooms" => {
            require("rooms", &values, 5)?;
            Ok(Command::InsertRoom {
                id: parse_ulid(&values[0])?,
                number: parse_string(&values[1])?,
                category: parse_string(&values[2])?,
                rate: parse_f64(&values[3])?,
                capacity: parse_u32(&values[4])?,
            })
        }
        "room_status" => {
            require("room_status", &values, 2)?;
            let status = parse_string(&values[1])?;
            Ok(Command::SetRoomStatus {
                room_id: parse_ulid(&values[0])?,
                status: status
                    .parse()
                    .map_err(|e: ParseStatusError| SqlError::Parse(e.to_string()))?,
            })
        }
        "guests" => {
            require("guests", &values, 3)?;
            let phone = match values.get(3) {
                Some(v) => parse_string_or_null(v)?,
                None => None,
            };
            Ok(Command::InsertGuest {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                passport: parse_string(&values[2])?,
                phone,
            })
        }
        "bookings" => {
            require("bookings", &values, 5)?;
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                guest_id: parse_ulid(&values[1])?,
                room_id: parse_ulid(&values[2])?,
                check_in: parse_date_or_null(&values[3])?,
                check_out: parse_date_or_null(&values[4])?,
            })
        }
        "check_ins" => {
            require("check_ins", &values, 1)?;
            Ok(Command::CheckIn {
                booking_id: parse_ulid(&values[0])?,
            })
        }
        "check_outs" => {
            require("check_outs", &values, 1)?;
            let paid = match values.get(1) {
                Some(v) => parse_bool(v)?,
                None => false,
            };
            Ok(Command::CheckOut {
                booking_id: parse_ulid(&values[0])?,
                paid,
            })
        }
        "payments" => {
            require("payments", &values, 2)?;
            let paid = match values.get(2) {
                Some(v) => parse_bool(v)?,
                None => false,
            };
            Ok(Command::InsertPayment {
                booking_id: parse_ulid(&values[0])?,
                amount: parse_f64(&values[1])?,
                paid,
            })
        }
        "paid_bookings" => {
            require("paid_bookings", &values, 1)?;
            Ok(Command::MarkPaid {
                booking_id: parse_ulid(&values[0])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "guests" => Ok(Command::DeleteGuest { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
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

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters);
    }

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms),
        "guests" => Ok(Command::SelectGuests),
        "payments" => Ok(Command::SelectPayments),
        "departures" => Ok(Command::SelectDepartures),
        "bookings" => {
            let status = match find_filter(&filters, "status", &[BinaryOperator::Eq]) {
                Some(expr) => Some(
                    parse_string(expr)?
                        .parse()
                        .map_err(|e: ParseStatusError| SqlError::Parse(e.to_string()))?,
                ),
                None => None,
            };
            Ok(Command::SelectBookings { status })
        }
        "availability" => {
            let check_in = find_filter(
                &filters,
                "check_in",
                &[BinaryOperator::GtEq, BinaryOperator::Eq],
            )
            .map(parse_date_or_null)
            .transpose()?
            .flatten();
            let check_out = find_filter(
                &filters,
                "check_out",
                &[BinaryOperator::LtEq, BinaryOperator::Eq],
            )
            .map(parse_date_or_null)
            .transpose()?
            .flatten();
            Ok(Command::SelectAvailability {
                check_in,
                check_out,
            })
        }
        "arrivals" => {
            let date = find_filter(
                &filters,
                "check_in",
                &[BinaryOperator::LtEq, BinaryOperator::Eq],
            )
                .map(parse_date_or_null)
                .transpose()?
                .flatten();
            Ok(Command::SelectArrivals { date })
        }
        "login" => Ok(Command::Login {
            username: parse_string(
                find_filter(&filters, "username", &[BinaryOperator::Eq])
                    .ok_or(SqlError::MissingFilter("username"))?,
            )?,
            password: parse_string(
                find_filter(&filters, "password", &[BinaryOperator::Eq])
                    .ok_or(SqlError::MissingFilter("password"))?,
            )?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `column op value` comparisons joined by AND.
struct Filter<'a> {
    column: String,
    op: BinaryOperator,
    value: &'a Expr,
}

fn collect_filters<'a>(expr: &'a Expr, out: &mut Vec<Filter<'a>>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_filters(left, out);
            collect_filters(right, out);
        }
        Expr::BinaryOp { left, op, right } => {
            if let Some(column) = expr_column_name(left) {
                out.push(Filter {
                    column,
                    op: op.clone(),
                    value: right,
                });
            }
        }
        Expr::Nested(inner) => collect_filters(inner, out),
        _ => {}
    }
}

fn find_filter<'a>(filters: &[Filter<'a>], column: &str, ops: &[BinaryOperator]) -> Option<&'a Expr> {
    filters
        .iter()
        .find(|f| f.column == column && ops.contains(&f.op))
        .map(|f| f.value)
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
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
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

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_date_or_null(expr: &Expr) -> Result<Option<NaiveDate>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected date, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_f64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad number {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|_| SqlError::Parse(format!("{s} out of u32 range"))),
        Some(value) => Err(SqlError::Parse(format!("expected integer, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => n
                .parse::<f64>()
                .map(|v| v != 0.0)
                .map_err(|e| SqlError::Parse(format!("bad bool {n:?}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    UnknownColumn(String, String),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::UnknownColumn(t, col) => write!(f, "{t}: unknown column {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
