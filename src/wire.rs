use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
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
use tracing::error;

use crate::auth::{CafeAuthSource, Credentials};
use crate::engine::{now_local, Engine, EngineError, Rejection, ReserveOutcome};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};

pub struct CafeHandler {
    engine: Arc<Engine>,
    credentials: Credentials,
    query_parser: Arc<CafeQueryParser>,
}

impl CafeHandler {
    pub fn new(engine: Arc<Engine>, credentials: Credentials) -> Self {
        Self {
            engine,
            credentials,
            query_parser: Arc::new(CafeQueryParser),
        }
    }

    fn session_access<C: ClientInfo>(&self, client: &C) -> Access {
        let user = client.metadata().get("user").map(String::as_str);
        self.credentials.access_for(user)
    }

    async fn run(&self, access: Access, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(access, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, access: Access, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertReservation { request, returning } => {
                let outcome = self
                    .engine
                    .reserve(request, now_local())
                    .await
                    .map_err(engine_err)?;
                match outcome {
                    ReserveOutcome::Rejected(rejection) => Err(rejection_err(rejection)),
                    ReserveOutcome::Confirmed(reservation) if returning => {
                        Ok(reservation_rows(vec![reservation]))
                    }
                    ReserveOutcome::Confirmed(_) => {
                        Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
                    }
                }
            }
            Command::SelectReservations => {
                let all = self
                    .engine
                    .list_reservations(access)
                    .await
                    .map_err(engine_err)?;
                Ok(reservation_rows(all))
            }
            Command::SelectTableBookings { table_id } => {
                let times = self
                    .engine
                    .table_bookings(&table_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(table_bookings_schema());
                let rows: Vec<PgWireResult<_>> = times
                    .iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&format_timestamp(t))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectTakenTables { arrival_time } => {
                let tables = self
                    .engine
                    .taken_tables(&arrival_time)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(taken_tables_schema());
                let rows: Vec<PgWireResult<_>> = tables
                    .into_iter()
                    .map(|table_id| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&table_id)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::DeleteReservation { id } => {
                let removed = self
                    .engine
                    .delete_reservation(access, id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(
                    Tag::new("DELETE").with_rows(usize::from(removed)),
                ))
            }
        }
    }
}

fn reservation_rows(reservations: Vec<Reservation>) -> Response {
    let schema = Arc::new(reservations_schema());
    let rows: Vec<PgWireResult<_>> = reservations
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&(r.id as i64))?;
            encoder.encode_field(&r.table_id)?;
            encoder.encode_field(&r.name)?;
            encoder.encode_field(&r.phone.unwrap_or_default())?;
            encoder.encode_field(&r.email.unwrap_or_default())?;
            encoder.encode_field(&format_timestamp(&r.arrival_time))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::INT8, FieldFormat::Text),
        text_field("table_id"),
        text_field("name"),
        text_field("phone"),
        text_field("email"),
        text_field("arrival_time"),
    ]
}

fn table_bookings_schema() -> Vec<FieldInfo> {
    vec![text_field("arrival_time")]
}

fn taken_tables_schema() -> Vec<FieldInfo> {
    vec![text_field("table_id")]
}

/// Row description for a statement, decided from its text so it also works
/// before parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_uppercase();
    if upper.starts_with("SELECT") {
        if upper.contains("TAKEN_TABLES") {
            taken_tables_schema()
        } else if upper.contains("TABLE_BOOKINGS") {
            table_bookings_schema()
        } else {
            reservations_schema()
        }
    } else if upper.starts_with("INSERT") && upper.contains("RETURNING") {
        reservations_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for CafeHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let access = self.session_access(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        Ok(vec![self.run(access, cmd).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CafeQueryParser;

#[async_trait]
impl QueryParser for CafeQueryParser {
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
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CafeHandler {
    type Statement = String;
    type QueryParser = CafeQueryParser;

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
        let access = self.session_access(client);
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(access, cmd).await
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
            result_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Byte spans of `$N` placeholders outside single-quoted literals, with N.
fn placeholders(sql: &str) -> Vec<(std::ops::Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // A doubled '' inside a literal toggles twice and stays inside.
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|b| String::from_utf8_lossy(b).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

/// Single left-to-right pass; inserted values are never scanned again.
/// Placeholders without a bound value are left as written.
fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    for (span, n) in placeholders(sql) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        result.push_str(&sql[copied..span.start]);
        match param {
            Some(text) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            None => result.push_str("NULL"),
        }
        copied = span.end;
    }
    result.push_str(&sql[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CafeFactory {
    handler: Arc<CafeHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CafeAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CafeFactory {
    pub fn new(engine: Arc<Engine>, credentials: Credentials) -> Self {
        let auth_source = CafeAuthSource::new(credentials.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CafeHandler::new(engine, credentials)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CafeFactory {
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

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    credentials: Credentials,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(CafeFactory::new(engine, credentials));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

/// SQLSTATE for a turned-away booking. One code per reason, so clients can
/// branch without parsing the message.
fn rejection_sqlstate(rejection: &Rejection) -> &'static str {
    match rejection {
        Rejection::NoTable => "23502",
        Rejection::NameRequired => "23514",
        Rejection::ContactRequired => "23000",
        Rejection::InvalidTime => "22007",
        Rejection::InPast => "22008",
        Rejection::TooFarAhead => "22015",
        Rejection::Conflict { .. } => "23P01",
    }
}

fn rejection_err(rejection: Rejection) -> PgWireError {
    user_error(rejection_sqlstate(&rejection), rejection.to_string())
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::Unauthorized(_) => "42501",
        EngineError::LimitExceeded(_) => "P0001",
        EngineError::Storage(_) => {
            error!("{e}");
            "58030"
        }
    };
    user_error(code, e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
