use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertLocation {
        id: u32,
        name: String,
        address: String,
    },
    DeleteLocation {
        id: u32,
    },
    InsertSlotType {
        slot_type: SlotType,
    },
    InsertVehicleType {
        vehicle_type: VehicleType,
    },
    /// Multi-row INSERT into slot_pricing: atomic replacement of the
    /// location's pricing set. Each row carries the location id it named.
    ReplacePricing {
        rows: Vec<(u32, PricingRow)>,
    },
    InsertReservation {
        reservation: NewReservation,
    },
    CancelReservation {
        id: u64,
        by_admin: bool,
    },
    ApproveReservation {
        id: u64,
    },
    MarkPaid {
        id: u64,
    },
    CheckIn {
        id: u64,
    },
    CheckOut {
        id: u64,
    },
    SelectLocations,
    SelectSlotTypes,
    SelectVehicleTypes,
    SelectPricing {
        location_id: u32,
    },
    SelectReservations {
        user: Option<String>,
    },
    SelectAvailability {
        location_id: u32,
        vehicle_type_id: u32,
        date: NaiveDate,
        time: NaiveTime,
    },
    SelectNotifications {
        user: String,
        unread_only: bool,
    },
    MarkNotificationsRead {
        user: String,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "locations" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 3 {
                return Err(SqlError::WrongArity("locations", 3, values.len()));
            }
            Ok(Command::InsertLocation {
                id: parse_u32(&values[0], "id")?,
                name: parse_string(&values[1], "name")?,
                address: parse_string(&values[2], "address")?,
            })
        }
        "slot_types" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 4 {
                return Err(SqlError::WrongArity("slot_types", 4, values.len()));
            }
            Ok(Command::InsertSlotType {
                slot_type: SlotType {
                    id: parse_u32(&values[0], "id")?,
                    name: parse_string(&values[1], "name")?,
                    description: parse_string(&values[2], "description")?,
                    kind: parse_string(&values[3], "type")?,
                },
            })
        }
        "vehicle_types" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 2 {
                return Err(SqlError::WrongArity("vehicle_types", 2, values.len()));
            }
            Ok(Command::InsertVehicleType {
                vehicle_type: VehicleType {
                    id: parse_u32(&values[0], "id")?,
                    name: parse_string(&values[1], "name")?,
                },
            })
        }
        "slot_pricing" => {
            let all_rows = extract_all_insert_rows(insert)?;
            let mut rows = Vec::with_capacity(all_rows.len());
            for row in &all_rows {
                if row.len() < 5 {
                    return Err(SqlError::WrongArity("slot_pricing", 5, row.len()));
                }
                rows.push((
                    parse_u32(&row[0], "location_id")?,
                    PricingRow {
                        slot_type_id: parse_u32(&row[1], "slot_type_id")?,
                        vehicle_type_id: parse_u32(&row[2], "vehicle_type_id")?,
                        rate_per_hour: parse_decimal(&row[3], "rate_per_hour")?,
                        available_slots: parse_u32(&row[4], "available_slots")?,
                    },
                ));
            }
            Ok(Command::ReplacePricing { rows })
        }
        "reservations" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 13 {
                return Err(SqlError::WrongArity("reservations", 13, values.len()));
            }
            Ok(Command::InsertReservation {
                reservation: NewReservation {
                    id: parse_u64(&values[0], "id")?,
                    user: parse_string_or_null(&values[1], "user")?,
                    location_id: parse_u32(&values[2], "location_id")?,
                    slot_type_id: parse_u32(&values[3], "slot_type_id")?,
                    vehicle_type_id: parse_u32(&values[4], "vehicle_type_id")?,
                    date: parse_date(&values[5])?,
                    time: parse_time(&values[6])?,
                    duration_hours: parse_u32_or_default(&values[7], "duration_hours", 1)?,
                    plate_number: parse_string(&values[8], "plate_number")?,
                    vehicle_make: parse_string(&values[9], "vehicle_make")?,
                    vehicle_model: parse_string(&values[10], "vehicle_model")?,
                    color: parse_string(&values[11], "color")?,
                    mode_of_payment: parse_string(&values[12], "mode_of_payment")?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "locations" => {
            let id = extract_where_id(&delete.selection)?;
            Ok(Command::DeleteLocation {
                id: u32::try_from(id)
                    .map_err(|_| SqlError::invalid("id", "out of range"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Reservation lifecycle flags and notification reads arrive as UPDATEs.
/// One flag per statement; flags are only ever set, never cleared.
fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;

    match table.as_str() {
        "reservations" => {
            let id = extract_where_id(selection)?;
            let mut flag: Option<&str> = None;
            let mut by_admin = false;
            for a in assignments {
                let col = assignment_column(a)?;
                match col.as_str() {
                    "cancelled_by" => {
                        by_admin = parse_string(&a.value, "cancelled_by")? == "admin";
                    }
                    "is_cancelled" | "is_approved" | "is_paid" | "has_arrived" | "has_exited" => {
                        if !parse_bool(&a.value)? {
                            return Err(SqlError::invalid(
                                "assignment",
                                "flags can only be set to true",
                            ));
                        }
                        if flag.is_some() {
                            return Err(SqlError::invalid(
                                "assignment",
                                "one flag per statement",
                            ));
                        }
                        flag = Some(match col.as_str() {
                            "is_cancelled" => "is_cancelled",
                            "is_approved" => "is_approved",
                            "is_paid" => "is_paid",
                            "has_arrived" => "has_arrived",
                            _ => "has_exited",
                        });
                    }
                    _ => return Err(SqlError::invalid("assignment", "unknown column")),
                }
            }
            match flag {
                Some("is_cancelled") => Ok(Command::CancelReservation { id, by_admin }),
                Some("is_approved") => Ok(Command::ApproveReservation { id }),
                Some("is_paid") => Ok(Command::MarkPaid { id }),
                Some("has_arrived") => Ok(Command::CheckIn { id }),
                Some("has_exited") => Ok(Command::CheckOut { id }),
                _ => Err(SqlError::invalid("assignment", "no flag assignment")),
            }
        }
        "notifications" => {
            let mut is_read = false;
            for a in assignments {
                if assignment_column(a)? == "is_read" {
                    is_read = parse_bool(&a.value)?;
                }
            }
            if !is_read {
                return Err(SqlError::invalid("is_read", "can only be set to true"));
            }
            let sel = selection.as_ref().ok_or(SqlError::MissingFilter("user"))?;
            let mut user = None;
            let mut unread_only = false;
            extract_notification_filters(sel, &mut user, &mut unread_only)?;
            Ok(Command::MarkNotificationsRead {
                user: user.ok_or(SqlError::MissingFilter("user"))?,
            })
        }
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

    match table.as_str() {
        "locations" => Ok(Command::SelectLocations),
        "slot_types" => Ok(Command::SelectSlotTypes),
        "vehicle_types" => Ok(Command::SelectVehicleTypes),
        "slot_pricing" => {
            let sel = select
                .selection
                .as_ref()
                .ok_or(SqlError::MissingFilter("location_id"))?;
            let mut location_id = None;
            extract_pricing_filters(sel, &mut location_id)?;
            Ok(Command::SelectPricing {
                location_id: location_id.ok_or(SqlError::MissingFilter("location_id"))?,
            })
        }
        "reservations" => {
            let mut user = None;
            if let Some(sel) = &select.selection {
                extract_user_filter(sel, &mut user)?;
            }
            Ok(Command::SelectReservations { user })
        }
        "availability" => {
            let sel = select
                .selection
                .as_ref()
                .ok_or(SqlError::MissingFilter("location_id"))?;
            let (mut location_id, mut vehicle_type_id, mut date, mut time) =
                (None, None, None, None);
            extract_availability_filters(
                sel,
                &mut location_id,
                &mut vehicle_type_id,
                &mut date,
                &mut time,
            )?;
            Ok(Command::SelectAvailability {
                location_id: location_id.ok_or(SqlError::MissingFilter("location_id"))?,
                vehicle_type_id: vehicle_type_id
                    .ok_or(SqlError::MissingFilter("vehicle_type_id"))?,
                date: date.ok_or(SqlError::MissingFilter("date"))?,
                time: time.ok_or(SqlError::MissingFilter("time"))?,
            })
        }
        "notifications" => {
            let sel = select
                .selection
                .as_ref()
                .ok_or(SqlError::MissingFilter("user"))?;
            let mut user = None;
            let mut unread_only = false;
            extract_notification_filters(sel, &mut user, &mut unread_only)?;
            Ok(Command::SelectNotifications {
                user: user.ok_or(SqlError::MissingFilter("user"))?,
                unread_only,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_availability_filters(
    expr: &Expr,
    location_id: &mut Option<u32>,
    vehicle_type_id: &mut Option<u32>,
    date: &mut Option<NaiveDate>,
    time: &mut Option<NaiveTime>,
) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_availability_filters(left, location_id, vehicle_type_id, date, time)?;
                extract_availability_filters(right, location_id, vehicle_type_id, date, time)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("location_id") => *location_id = Some(parse_u32(right, "location_id")?),
                Some("vehicle_type_id") => {
                    *vehicle_type_id = Some(parse_u32(right, "vehicle_type_id")?)
                }
                Some("date") => *date = Some(parse_date(right)?),
                Some("time") => *time = Some(parse_time(right)?),
                _ => {}
            },
            _ => {}
        }
    }
    Ok(())
}

fn extract_pricing_filters(expr: &Expr, location_id: &mut Option<u32>) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_pricing_filters(left, location_id)?;
                extract_pricing_filters(right, location_id)?;
            }
            ast::BinaryOperator::Eq => {
                if expr_column_name(left).as_deref() == Some("location_id") {
                    *location_id = Some(parse_u32(right, "location_id")?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn extract_user_filter(expr: &Expr, user: &mut Option<String>) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_user_filter(left, user)?;
                extract_user_filter(right, user)?;
            }
            ast::BinaryOperator::Eq => {
                if expr_column_name(left).as_deref() == Some("user") {
                    *user = Some(parse_string(right, "user")?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn extract_notification_filters(
    expr: &Expr,
    user: &mut Option<String>,
    unread_only: &mut bool,
) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_notification_filters(left, user, unread_only)?;
                extract_notification_filters(right, user, unread_only)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("user") => *user = Some(parse_string(right, "user")?),
                Some("is_read") => *unread_only = !parse_bool(right)?,
                _ => {}
            },
            _ => {}
        }
    }
    Ok(())
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

fn assignment_column(a: &ast::Assignment) -> Result<String, SqlError> {
    match &a.target {
        AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let rows = extract_all_insert_rows(insert)?;
    Ok(rows.into_iter().next().unwrap_or_default())
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<u64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_u64(right, "id")
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
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

fn parse_u64(expr: &Expr, field: &'static str) -> Result<u64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::invalid(field, format!("bad integer: {e}"))),
            _ => Err(SqlError::invalid(field, format!("expected number, got {value:?}"))),
        }
    } else {
        Err(SqlError::invalid(field, format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr, field: &'static str) -> Result<u32, SqlError> {
    let v = parse_u64(expr, field)?;
    u32::try_from(v).map_err(|_| SqlError::invalid(field, format!("{v} out of range")))
}

fn parse_u32_or_default(
    expr: &Expr,
    field: &'static str,
    default: u32,
) -> Result<u32, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(default);
    }
    parse_u32(expr, field)
}

fn parse_string(expr: &Expr, field: &'static str) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::invalid(field, format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::invalid(field, format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr, field: &'static str) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_string(expr, field).map(Some)
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::invalid("boolean", format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::invalid("boolean", format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::invalid("boolean", format!("expected value, got {expr:?}")))
    }
}

fn parse_decimal(expr: &Expr, field: &'static str) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::invalid(field, format!("bad decimal: {e}"))),
            _ => Err(SqlError::invalid(field, format!("expected decimal, got {value:?}"))),
        }
    } else {
        Err(SqlError::invalid(field, format!("expected value, got {expr:?}")))
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr, "date")?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|_| SqlError::invalid("date", format!("expected YYYY-MM-DD, got {s:?}")))
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr, "time")?;
    NaiveTime::parse_from_str(&s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .map_err(|_| SqlError::invalid("time", format!("expected HH:MM, got {s:?}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl SqlError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SqlError::InvalidValue {
            field,
            message: message.into(),
        }
    }
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
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidValue { field, message } => write!(f, "invalid {field}: {message}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parse_insert_location() {
        let sql = "INSERT INTO locations (id, name, address) VALUES (1, 'Main Lot', '123 Main St')";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertLocation {
                id: 1,
                name: "Main Lot".into(),
                address: "123 Main St".into(),
            }
        );
    }

    #[test]
    fn parse_delete_location() {
        let sql = "DELETE FROM locations WHERE id = 3";
        assert_eq!(parse_sql(sql).unwrap(), Command::DeleteLocation { id: 3 });
    }

    #[test]
    fn parse_delete_other_table_rejected() {
        let sql = "DELETE FROM reservations WHERE id = 3";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_insert_slot_type() {
        let sql = r#"INSERT INTO slot_types (id, name, description, "type") VALUES (1, 'standard', 'Uncovered outdoor spot', 'outdoor')"#;
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertSlotType { slot_type } => {
                assert_eq!(slot_type.name, "standard");
                assert_eq!(slot_type.kind, "outdoor");
            }
            _ => panic!("expected InsertSlotType, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_vehicle_type() {
        let sql = "INSERT INTO vehicle_types (id, name) VALUES (1, 'Car')";
        let cmd = parse_sql(sql).unwrap();
        assert!(matches!(cmd, Command::InsertVehicleType { .. }));
    }

    #[test]
    fn parse_multi_row_pricing_insert() {
        let sql = "INSERT INTO slot_pricing (location_id, slot_type_id, vehicle_type_id, rate_per_hour, available_slots) \
                   VALUES (1, 1, 1, 50.00, 5), (1, 2, 1, 80.00, 2)";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::ReplacePricing { rows } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].0, 1);
                assert_eq!(rows[0].1.rate_per_hour, Decimal::from_str("50.00").unwrap());
                assert_eq!(rows[1].1.slot_type_id, 2);
                assert_eq!(rows[1].1.available_slots, 2);
            }
            _ => panic!("expected ReplacePricing, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_pricing_rate_as_string_keeps_scale() {
        let sql = "INSERT INTO slot_pricing (location_id, slot_type_id, vehicle_type_id, rate_per_hour, available_slots) \
                   VALUES (1, 1, 1, '120.00', 5)";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::ReplacePricing { rows } => {
                assert_eq!(rows[0].1.rate_per_hour.to_string(), "120.00");
            }
            _ => panic!("expected ReplacePricing, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = "INSERT INTO reservations (id, \"user\", location_id, slot_type_id, vehicle_type_id, date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
                   VALUES (7, 'alice', 1, 1, 1, '2025-06-25', '12:00', 2, 'ABC-123', 'Toyota', 'Vios', 'red', 'GCash')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertReservation { reservation } => {
                assert_eq!(reservation.id, 7);
                assert_eq!(reservation.user.as_deref(), Some("alice"));
                assert_eq!(reservation.date, NaiveDate::from_ymd_opt(2025, 6, 25).unwrap());
                assert_eq!(reservation.time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
                assert_eq!(reservation.duration_hours, 2);
                assert_eq!(reservation.mode_of_payment, "GCash");
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_null_user_and_duration() {
        let sql = "INSERT INTO reservations (id, \"user\", location_id, slot_type_id, vehicle_type_id, date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
                   VALUES (7, NULL, 1, 1, 1, '2025-06-25', '12:00', NULL, 'ABC-123', 'Toyota', 'Vios', 'red', 'Cash')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertReservation { reservation } => {
                assert_eq!(reservation.user, None);
                assert_eq!(reservation.duration_hours, 1); // default
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_reservation_bad_date_names_the_field() {
        let sql = "INSERT INTO reservations (id, \"user\", location_id, slot_type_id, vehicle_type_id, date, time, duration_hours, plate_number, vehicle_make, vehicle_model, color, mode_of_payment) \
                   VALUES (7, NULL, 1, 1, 1, 'June 25', '12:00', 1, 'ABC-123', 'Toyota', 'Vios', 'red', 'Cash')";
        match parse_sql(sql) {
            Err(SqlError::InvalidValue { field: "date", .. }) => {}
            other => panic!("expected date error, got {other:?}"),
        }
    }

    #[test]
    fn parse_cancel_update() {
        let sql = "UPDATE reservations SET is_cancelled = true WHERE id = 7";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CancelReservation { id: 7, by_admin: false }
        );
    }

    #[test]
    fn parse_admin_cancel_update() {
        let sql = "UPDATE reservations SET is_cancelled = true, cancelled_by = 'admin' WHERE id = 7";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CancelReservation { id: 7, by_admin: true }
        );
    }

    #[test]
    fn parse_flag_updates() {
        assert_eq!(
            parse_sql("UPDATE reservations SET is_approved = true WHERE id = 1").unwrap(),
            Command::ApproveReservation { id: 1 }
        );
        assert_eq!(
            parse_sql("UPDATE reservations SET is_paid = true WHERE id = 1").unwrap(),
            Command::MarkPaid { id: 1 }
        );
        assert_eq!(
            parse_sql("UPDATE reservations SET has_arrived = true WHERE id = 1").unwrap(),
            Command::CheckIn { id: 1 }
        );
        assert_eq!(
            parse_sql("UPDATE reservations SET has_exited = true WHERE id = 1").unwrap(),
            Command::CheckOut { id: 1 }
        );
    }

    #[test]
    fn parse_flag_clear_rejected() {
        let sql = "UPDATE reservations SET is_paid = false WHERE id = 1";
        assert!(parse_sql(sql).is_err());
    }

    #[test]
    fn parse_two_flags_rejected() {
        let sql = "UPDATE reservations SET is_paid = true, is_approved = true WHERE id = 1";
        assert!(parse_sql(sql).is_err());
    }

    #[test]
    fn parse_update_without_id_rejected() {
        let sql = "UPDATE reservations SET is_paid = true";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_mark_notifications_read() {
        let sql = "UPDATE notifications SET is_read = true WHERE \"user\" = 'alice'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::MarkNotificationsRead { user: "alice".into() }
        );
    }

    #[test]
    fn parse_select_availability() {
        let sql = "SELECT * FROM availability WHERE location_id = 1 AND vehicle_type_id = 1 AND date = '2025-06-25' AND time = '12:30'";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::SelectAvailability {
                location_id: 1,
                vehicle_type_id: 1,
                date: NaiveDate::from_ymd_opt(2025, 6, 25).unwrap(),
                time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            }
        );
    }

    #[test]
    fn parse_select_availability_missing_filter() {
        let sql = "SELECT * FROM availability WHERE location_id = 1 AND date = '2025-06-25' AND time = '12:30'";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("vehicle_type_id"))
        ));
    }

    #[test]
    fn parse_select_availability_time_with_seconds() {
        let sql = "SELECT * FROM availability WHERE location_id = 1 AND vehicle_type_id = 1 AND date = '2025-06-25' AND time = '12:30:00'";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::SelectAvailability { time, .. } => {
                assert_eq!(time, NaiveTime::from_hms_opt(12, 30, 0).unwrap());
            }
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_catalog_tables() {
        assert_eq!(parse_sql("SELECT * FROM locations").unwrap(), Command::SelectLocations);
        assert_eq!(parse_sql("SELECT * FROM slot_types").unwrap(), Command::SelectSlotTypes);
        assert_eq!(
            parse_sql("SELECT * FROM vehicle_types").unwrap(),
            Command::SelectVehicleTypes
        );
        assert_eq!(
            parse_sql("SELECT * FROM slot_pricing WHERE location_id = 2").unwrap(),
            Command::SelectPricing { location_id: 2 }
        );
    }

    #[test]
    fn parse_select_reservations() {
        assert_eq!(
            parse_sql("SELECT * FROM reservations").unwrap(),
            Command::SelectReservations { user: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM reservations WHERE \"user\" = 'alice'").unwrap(),
            Command::SelectReservations { user: Some("alice".into()) }
        );
    }

    #[test]
    fn parse_select_notifications() {
        assert_eq!(
            parse_sql("SELECT * FROM notifications WHERE \"user\" = 'alice'").unwrap(),
            Command::SelectNotifications { user: "alice".into(), unread_only: false }
        );
        assert_eq!(
            parse_sql("SELECT * FROM notifications WHERE \"user\" = 'alice' AND is_read = false")
                .unwrap(),
            Command::SelectNotifications { user: "alice".into(), unread_only: true }
        );
    }

    #[test]
    fn parse_listen() {
        let sql = "LISTEN location_7";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::Listen { channel: "location_7".into() }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "INSERT INTO foobar (id) VALUES (1)";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
