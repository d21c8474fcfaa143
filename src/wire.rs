use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::ParkdAuthSource;
use crate::engine::Engine;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct ParkdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<ParkdQueryParser>,
}

impl ParkdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(ParkdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn run_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.execute_command(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertLocation { id, name, address } => {
                engine
                    .create_location(id, name, address)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteLocation { id } => {
                engine.delete_location(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertSlotType { slot_type } => {
                engine.create_slot_type(slot_type).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertVehicleType { vehicle_type } => {
                engine
                    .create_vehicle_type(vehicle_type)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ReplacePricing { rows } => {
                let (_, count) = engine.replace_pricing(rows).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(count))])
            }
            Command::InsertReservation { reservation } => {
                engine
                    .create_reservation(reservation)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::CancelReservation { id, by_admin } => {
                engine
                    .cancel_reservation(id, by_admin)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::ApproveReservation { id } => {
                engine.approve_reservation(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::MarkPaid { id } => {
                engine.mark_paid(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CheckIn { id } => {
                engine.check_in(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CheckOut { id } => {
                engine.check_out(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::MarkNotificationsRead { user } => {
                let count = engine
                    .mark_notifications_read(&user)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(count))])
            }
            Command::SelectAvailability {
                location_id,
                vehicle_type_id,
                date,
                time,
            } => {
                let rows = engine
                    .check_availability(location_id, vehicle_type_id, date, time)
                    .await;

                let schema = Arc::new(availability_schema());
                let rows: Vec<PgWireResult<_>> = rows
                    .into_iter()
                    .map(|row| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&row.slot_type)?;
                        encoder.encode_field(&row.rate_per_hour.to_string())?;
                        encoder.encode_field(&(row.available_slots as i32))?;
                        encoder.encode_field(&row.description)?;
                        encoder.encode_field(&row.kind)?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectLocations => {
                let schema = Arc::new(locations_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_locations()
                    .await
                    .into_iter()
                    .map(|l| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(l.id as i32))?;
                        encoder.encode_field(&l.name)?;
                        encoder.encode_field(&l.address)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSlotTypes => {
                let schema = Arc::new(slot_types_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_slot_types()
                    .into_iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(t.id as i32))?;
                        encoder.encode_field(&t.name)?;
                        encoder.encode_field(&t.description)?;
                        encoder.encode_field(&t.kind)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectVehicleTypes => {
                let schema = Arc::new(vehicle_types_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_vehicle_types()
                    .into_iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(t.id as i32))?;
                        encoder.encode_field(&t.name)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectPricing { location_id } => {
                let schema = Arc::new(pricing_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .get_pricing(location_id)
                    .await
                    .into_iter()
                    .map(|row| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(location_id as i32))?;
                        encoder.encode_field(&(row.slot_type_id as i32))?;
                        encoder.encode_field(&(row.vehicle_type_id as i32))?;
                        encoder.encode_field(&row.rate_per_hour.to_string())?;
                        encoder.encode_field(&(row.available_slots as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectReservations { user } => {
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_reservations(user.as_deref())
                    .await
                    .into_iter()
                    .map(|r| encode_reservation(&schema, &r))
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectNotifications { user, unread_only } => {
                let schema = Arc::new(notifications_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_notifications(&user, unread_only)
                    .into_iter()
                    .map(|n| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(n.id as i64))?;
                        encoder.encode_field(&n.user)?;
                        encoder.encode_field(&(n.reservation_id as i64))?;
                        encoder.encode_field(&n.message)?;
                        encoder.encode_field(&n.is_read)?;
                        encoder.encode_field(&n.created_at)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let location_id_str = channel.strip_prefix("location_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected location_{{id}})"),
                    )))
                })?;
                let _location_id: u32 = location_id_str.parse().map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad location id in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

fn encode_reservation(
    schema: &Arc<Vec<FieldInfo>>,
    r: &Reservation,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&(r.id as i64))?;
    encoder.encode_field(&r.user)?;
    encoder.encode_field(&(r.location_id as i32))?;
    encoder.encode_field(&(r.slot_type_id as i32))?;
    encoder.encode_field(&(r.vehicle_type_id as i32))?;
    encoder.encode_field(&r.date.to_string())?;
    encoder.encode_field(&r.time.format("%H:%M:%S").to_string())?;
    encoder.encode_field(&(r.duration_hours as i32))?;
    encoder.encode_field(&r.plate_number)?;
    encoder.encode_field(&r.vehicle_make)?;
    encoder.encode_field(&r.vehicle_model)?;
    encoder.encode_field(&r.color)?;
    encoder.encode_field(&r.mode_of_payment)?;
    encoder.encode_field(&r.is_paid)?;
    encoder.encode_field(&r.is_cancelled)?;
    encoder.encode_field(&r.has_arrived)?;
    encoder.encode_field(&r.has_exited)?;
    encoder.encode_field(&r.is_approved)?;
    encoder.encode_field(&r.created_at)?;
    Ok(encoder.take_row())
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int4_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text)
}

fn int8_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn bool_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("slot_type"),
        text_field("rate_per_hour"),
        int4_field("available_slots"),
        text_field("description"),
        text_field("type"),
    ]
}

fn locations_schema() -> Vec<FieldInfo> {
    vec![int4_field("id"), text_field("name"), text_field("address")]
}

fn slot_types_schema() -> Vec<FieldInfo> {
    vec![
        int4_field("id"),
        text_field("name"),
        text_field("description"),
        text_field("type"),
    ]
}

fn vehicle_types_schema() -> Vec<FieldInfo> {
    vec![int4_field("id"), text_field("name")]
}

fn pricing_schema() -> Vec<FieldInfo> {
    vec![
        int4_field("location_id"),
        int4_field("slot_type_id"),
        int4_field("vehicle_type_id"),
        text_field("rate_per_hour"),
        int4_field("available_slots"),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        int8_field("id"),
        text_field("user"),
        int4_field("location_id"),
        int4_field("slot_type_id"),
        int4_field("vehicle_type_id"),
        text_field("date"),
        text_field("time"),
        int4_field("duration_hours"),
        text_field("plate_number"),
        text_field("vehicle_make"),
        text_field("vehicle_model"),
        text_field("color"),
        text_field("mode_of_payment"),
        bool_field("is_paid"),
        bool_field("is_cancelled"),
        bool_field("has_arrived"),
        bool_field("has_exited"),
        bool_field("is_approved"),
        int8_field("created_at"),
    ]
}

fn notifications_schema() -> Vec<FieldInfo> {
    vec![
        int8_field("id"),
        text_field("user"),
        int8_field("reservation_id"),
        text_field("message"),
        bool_field("is_read"),
        int8_field("created_at"),
    ]
}

/// Result schema for a statement, used by Describe in the extended protocol.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("NOTIFICATIONS") {
        notifications_schema()
    } else if upper.contains("RESERVATIONS") {
        reservations_schema()
    } else if upper.contains("SLOT_PRICING") {
        pricing_schema()
    } else if upper.contains("SLOT_TYPES") {
        slot_types_schema()
    } else if upper.contains("VEHICLE_TYPES") {
        vehicle_types_schema()
    } else if upper.contains("LOCATIONS") {
        locations_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for ParkdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ParkdQueryParser;

#[async_trait]
impl QueryParser for ParkdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ParkdHandler {
    type Statement = String;
    type QueryParser = ParkdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.run_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_statement(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ParkdFactory {
    handler: Arc<ParkdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<ParkdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl ParkdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = ParkdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(ParkdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ParkdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Drive one client connection through the pgwire protocol machinery.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> Result<(), io::Error> {
    let factory = Arc::new(ParkdFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
