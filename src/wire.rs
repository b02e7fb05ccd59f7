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

use crate::auth::FrontDeskAuthSource;
use crate::engine::{today, Engine, EngineError, ErrorKind};
use crate::model::*;
use crate::observability::{self, AUTH_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

pub struct FrontDeskHandler {
    engine: Arc<Engine>,
    query_parser: Arc<FrontDeskQueryParser>,
}

impl FrontDeskHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(FrontDeskQueryParser),
        }
    }

    /// Parse, execute and record RED metrics for one statement.
    async fn run(&self, sql: &str, format: Option<&Format>) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd, format).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(
        &self,
        cmd: Command,
        format: Option<&Format>,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertRoom {
                id,
                number,
                category,
                rate,
                capacity,
            } => {
                engine
                    .save_room(id, &number, &category, rate, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SetRoomStatus { room_id, status } => {
                engine
                    .set_room_status(room_id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::InsertGuest {
                id,
                name,
                passport,
                phone,
            } => {
                engine
                    .save_guest(id, &name, &passport, phone.as_deref())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::DeleteGuest { id } => {
                engine.delete_guest(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking {
                id,
                guest_id,
                room_id,
                check_in,
                check_out,
            } => {
                engine
                    .create_booking(id, guest_id, room_id, check_in, check_out)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::CheckIn { booking_id } => {
                engine.check_in(booking_id).await.map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::CheckOut { booking_id, paid } => {
                let total = engine
                    .check_out(booking_id, paid)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(cost_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&total)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::InsertPayment {
                booking_id,
                amount,
                paid,
            } => {
                engine
                    .record_payment(booking_id, amount, paid)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::MarkPaid { booking_id } => {
                engine.mark_paid(booking_id).await.map_err(engine_err)?;
                Ok(vec![insert_tag()])
            }
            Command::SelectRooms => Ok(vec![room_rows(engine.list_rooms().await, format)]),
            Command::SelectAvailability {
                check_in,
                check_out,
            } => Ok(vec![room_rows(
                engine.available_rooms(check_in, check_out).await,
                format,
            )]),
            Command::SelectGuests => {
                let schema = Arc::new(guest_schema(format));
                let rows: Vec<PgWireResult<_>> = engine
                    .list_guests()
                    .into_iter()
                    .map(|g| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&g.id.to_string())?;
                        encoder.encode_field(&g.name)?;
                        encoder.encode_field(&g.passport)?;
                        encoder.encode_field(&g.phone)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectPayments => {
                let schema = Arc::new(payment_schema(format));
                let rows: Vec<PgWireResult<_>> = engine
                    .list_payments()
                    .into_iter()
                    .map(|p| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&p.id.to_string())?;
                        encoder.encode_field(&p.booking_id.to_string())?;
                        encoder.encode_field(&p.amount)?;
                        encoder.encode_field(&p.paid)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectBookings { status } => {
                let views = match status {
                    Some(s) => engine.bookings_by_status(s).await,
                    None => engine.list_bookings().await,
                };
                Ok(vec![booking_rows(views, format)])
            }
            Command::SelectArrivals { date } => {
                let views = engine.bookings_due_in(date.unwrap_or_else(today)).await;
                Ok(vec![booking_rows(views, format)])
            }
            Command::SelectDepartures => Ok(vec![booking_rows(
                engine.bookings_awaiting_checkout().await,
                format,
            )]),
            Command::Login { username, password } => {
                let ok = engine.login(&username, &password).await;
                if !ok {
                    metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                }
                let schema = Arc::new(login_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&ok)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
        }
    }
}

fn insert_tag() -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(1))
}

fn room_rows(rooms: Vec<Room>, format: Option<&Format>) -> Response {
    let schema = Arc::new(room_schema(format));
    let rows: Vec<PgWireResult<_>> = rooms
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.number)?;
            encoder.encode_field(&r.category)?;
            encoder.encode_field(&r.rate)?;
            encoder.encode_field(&(r.capacity as i32))?;
            encoder.encode_field(&r.status.as_str())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn booking_rows(views: Vec<BookingView>, format: Option<&Format>) -> Response {
    let schema = Arc::new(booking_schema(format));
    let rows: Vec<PgWireResult<_>> = views
        .into_iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.room_id.to_string())?;
            encoder.encode_field(&b.room_number)?;
            encoder.encode_field(&b.guest_id.to_string())?;
            encoder.encode_field(&b.guest_name)?;
            encoder.encode_field(&b.check_in.to_string())?;
            encoder.encode_field(&b.check_out.to_string())?;
            encoder.encode_field(&b.nights)?;
            encoder.encode_field(&b.status.as_str())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Result schemas ───────────────────────────────────────────────

fn fields(columns: &[(&str, Type)], format: Option<&Format>) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            let field_format = format.map_or(FieldFormat::Text, |f| f.format_for(i));
            FieldInfo::new((*name).into(), None, None, ty.clone(), field_format)
        })
        .collect()
}

fn room_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("number", Type::VARCHAR),
            ("category", Type::VARCHAR),
            ("rate", Type::FLOAT8),
            ("capacity", Type::INT4),
            ("status", Type::VARCHAR),
        ],
        format,
    )
}

fn guest_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("name", Type::VARCHAR),
            ("passport", Type::VARCHAR),
            ("phone", Type::VARCHAR),
        ],
        format,
    )
}

fn booking_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("room_id", Type::VARCHAR),
            ("room_number", Type::VARCHAR),
            ("guest_id", Type::VARCHAR),
            ("guest_name", Type::VARCHAR),
            ("check_in", Type::VARCHAR),
            ("check_out", Type::VARCHAR),
            ("nights", Type::INT8),
            ("status", Type::VARCHAR),
        ],
        format,
    )
}

fn payment_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("booking_id", Type::VARCHAR),
            ("amount", Type::FLOAT8),
            ("paid", Type::BOOL),
        ],
        format,
    )
}

fn cost_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(&[("total_cost", Type::FLOAT8)], format)
}

fn login_schema(format: Option<&Format>) -> Vec<FieldInfo> {
    fields(&[("authenticated", Type::BOOL)], format)
}

/// Result columns a statement will produce, judged from its text alone
/// (parameters are not bound yet at describe time).
fn result_schema_for(stmt: &str, format: Option<&Format>) -> Vec<FieldInfo> {
    let lower = stmt.to_lowercase();
    let mut words = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';' || c == ',')
        .filter(|w| !w.is_empty());
    let verb = words.next().unwrap_or_default();
    let target = words
        .skip_while(|w| *w != "from" && *w != "into")
        .nth(1)
        .map(|w| w.trim_matches('"'))
        .unwrap_or_default();
    match (verb, target) {
        ("select", "rooms" | "availability") => room_schema(format),
        ("select", "guests") => guest_schema(format),
        ("select", "payments") => payment_schema(format),
        ("select", "bookings" | "arrivals" | "departures") => booking_schema(format),
        ("select", "login") => login_schema(format),
        ("insert", "check_outs") => cost_schema(format),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for FrontDeskHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query, None).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct FrontDeskQueryParser;

#[async_trait]
impl QueryParser for FrontDeskQueryParser {
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
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema_for(stmt, column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for FrontDeskHandler {
    type Statement = String;
    type QueryParser = FrontDeskQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql, Some(&portal.result_column_format)).await?;
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
            result_schema_for(&target.statement, None),
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
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement,
            Some(&target.result_column_format),
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
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Inline the portal's bound parameters (text format) into its statement.
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// Replace each `$N` outside string literals with parameter N as a quoted
/// literal, in one pass. Substituted text is never rescanned.
fn bind_params<P: AsRef<[u8]>>(sql: &str, params: &[Option<P>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }
        let mut end = i + 1;
        while let Some(&(j, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = j + 1;
            chars.next();
        }
        let bound = sql[i + 1..end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        match bound {
            Some(Some(bytes)) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => out.push_str(&sql[i..end]),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct FrontDeskFactory {
    handler: Arc<FrontDeskHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<FrontDeskAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl FrontDeskFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = FrontDeskAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(FrontDeskHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for FrontDeskFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(FrontDeskFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn sqlstate(e: &EngineError) -> &'static str {
    match (e.kind(), e) {
        (_, EngineError::RoomUnavailable { .. }) => "23P01",
        (ErrorKind::Validation, _) => "22023",
        (ErrorKind::NotFound, _) => "P0002",
        (ErrorKind::Conflict, _) => "55000",
        (ErrorKind::Persistence, _) => "58030",
        (ErrorKind::Limit, _) => "54000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn names(schema: &[FieldInfo]) -> Vec<String> {
        schema.iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn schema_follows_target_table() {
        assert_eq!(names(&result_schema_for("SELECT * FROM rooms", None))[1], "number");
        assert_eq!(
            names(&result_schema_for(
                "select * from availability where check_in >= $1 and check_out <= $2",
                None
            ))
            .len(),
            6
        );
        assert_eq!(names(&result_schema_for("SELECT * FROM arrivals", None)).len(), 9);
        assert_eq!(
            names(&result_schema_for("INSERT INTO check_outs (booking_id, paid) VALUES ($1, $2)", None)),
            vec!["total_cost"]
        );
        assert!(result_schema_for("INSERT INTO rooms VALUES ($1, $2, $3, $4, $5)", None).is_empty());
        assert!(result_schema_for("DELETE FROM rooms WHERE id = $1", None).is_empty());
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(count_params("INSERT INTO payments VALUES ($1, $3, $2)"), 3);
        assert_eq!(count_params("INSERT INTO rooms VALUES ($10, $2)"), 10);
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let params: Vec<Option<&[u8]>> = vec![
            Some(&b"01ARZ3NDEKTSV4RRFFQ69G5FAV"[..]),
            Some(&b"Ann"[..]),
            Some(&b"P$1X"[..]),
            None,
        ];
        assert_eq!(
            bind_params("INSERT INTO guests VALUES ($1, $2, $3, $4)", &params),
            "INSERT INTO guests VALUES ('01ARZ3NDEKTSV4RRFFQ69G5FAV', 'Ann', 'P$1X', NULL)"
        );
    }

    #[test]
    fn bind_params_quotes_and_skips_literals() {
        let params: Vec<Option<&[u8]>> = vec![Some(&b"O'Brien"[..]), Some(&b"$2"[..])];
        assert_eq!(
            bind_params("SELECT '$1', $1, $2, $3", &params),
            "SELECT '$1', 'O''Brien', '$2', $3"
        );
        let ten: Vec<Option<&[u8]>> = (1..=10)
            .map(|i| Some(if i == 10 { &b"ten"[..] } else { &b"x"[..] }))
            .collect();
        assert_eq!(bind_params("$10 $1", &ten), "'ten' 'x'");
    }

    #[test]
    fn sqlstate_by_error_kind() {
        let id = Ulid::new();
        assert_eq!(sqlstate(&EngineError::InvalidDateRange), "22023");
        assert_eq!(sqlstate(&EngineError::PastDateBooking), "22023");
        assert_eq!(sqlstate(&EngineError::BookingNotFound(id)), "P0002");
        assert_eq!(
            sqlstate(&EngineError::RoomUnavailable {
                room_id: id,
                conflicting: id
            }),
            "23P01"
        );
        assert_eq!(
            sqlstate(&EngineError::InvalidStateTransition {
                booking_id: id,
                from: BookingStatus::CheckedOut,
                to: BookingStatus::CheckedIn,
            }),
            "55000"
        );
        assert_eq!(sqlstate(&EngineError::WalError("disk".into())), "58030");
        assert_eq!(sqlstate(&EngineError::LimitExceeded("x")), "54000");
    }
}
