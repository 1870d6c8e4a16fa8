//! Admin REST API for the controller driving the agent.
//!
//! Provides endpoints for agent status, connections, credential and
//! presentation exchange, mediator routes, basic messages, trust pings,
//! action menus, and schemas and credential definitions on the ledger.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use courier_core::{
    CoreError, CredentialValues, InjectionContext, Ledger, Storage, TagFilter, Wallet,
};
use courier_messaging::messages::{BasicMessage, ConnectionInvitation, MenuRequest, Perform, Ping};
use courier_messaging::{AgentMessage, ConnectionTarget, OutboundMessage};
use courier_protocols::menu::retrieve_connection_menu;
use courier_protocols::{
    ConnectionManager, ConnectionRecord, CredentialExchangeRecord, CredentialManager,
    DispatchResponder, Dispatcher, PresentationExchangeRecord, PresentationManager, ProtocolError,
    ReplyBindings, Responder, RouteRecord, RoutingManager,
};

/// Shared state behind every admin handler.
pub struct AdminState {
    pub dispatcher: Arc<Dispatcher>,
    pub outbound: mpsc::Sender<OutboundMessage>,
    pub label: String,
    pub endpoint: Option<String>,
    pub start_time: Instant,
}

impl AdminState {
    fn context(&self) -> &InjectionContext {
        self.dispatcher.context()
    }

    /// A connection that can carry messages, with its addressing.
    async fn ready_connection(
        &self,
        connection_id: &str,
    ) -> Result<(ConnectionRecord, ConnectionTarget), ProtocolError> {
        let connections = ConnectionManager::new(self.context())?;
        let record = connections.get_connection(connection_id).await?;
        if !record.is_ready() {
            return Err(ProtocolError::ConnectionProtocol(format!(
                "connection {} is not ready: {}",
                connection_id, record.state
            )));
        }
        let target = connections.get_connection_target(&record).await?;
        Ok((record, target))
    }

    async fn send_over(
        &self,
        connection_id: &str,
        target: ConnectionTarget,
        message: AgentMessage,
    ) -> Result<(), ProtocolError> {
        DispatchResponder::new(
            self.dispatcher.factory().clone(),
            ReplyBindings::for_target(connection_id, target),
            self.outbound.clone(),
        )
        .send_reply(message)
        .await
    }

    async fn send_to_connection(
        &self,
        connection_id: &str,
        message: AgentMessage,
    ) -> Result<(), ProtocolError> {
        let (record, target) = self.ready_connection(connection_id).await?;
        self.send_over(&record.connection_id, target, message).await
    }
}

/// Render an invitation as a `c_i` URL on its own endpoint.
pub fn invitation_url(invitation: &ConnectionInvitation) -> Result<Option<String>, ProtocolError> {
    let message = AgentMessage::new(invitation.clone());
    match &invitation.endpoint {
        Some(endpoint) => Ok(Some(invitation.to_url(endpoint, message.id())?)),
        None => Ok(None),
    }
}

// --- Response types ---

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub label: String,
    pub endpoint: Option<String>,
    pub public_did: Option<String>,
    pub connection_count: usize,
    pub in_flight: usize,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    fn new(results: Vec<T>) -> Self {
        let count = results.len();
        Self { results, count }
    }
}

#[derive(Serialize)]
pub struct InvitationResponse {
    pub connection_id: String,
    pub invitation: ConnectionInvitation,
    pub invitation_url: Option<String>,
}

#[derive(Serialize)]
pub struct SentResponse {
    pub connection_id: String,
    pub message_id: String,
}

#[derive(Serialize)]
pub struct SchemaResponse {
    pub schema_id: String,
}

#[derive(Serialize)]
pub struct CredentialDefinitionResponse {
    pub credential_definition_id: String,
}

// --- Request types ---

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ListQuery {
    pub state: Option<String>,
    pub connection_id: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> TagFilter {
        let mut filter = TagFilter::new();
        if let Some(state) = &self.state {
            filter.insert("state".into(), state.clone());
        }
        if let Some(connection_id) = &self.connection_id {
            filter.insert("connection_id".into(), connection_id.clone());
        }
        filter
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateInvitationRequest {
    pub label: Option<String>,
    pub seed: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ReceiveInvitationRequest {
    pub invitation: Option<ConnectionInvitation>,
    pub invitation_url: Option<String>,
    /// Answer the invitation with a connection request right away.
    pub auto_accept: bool,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SendPingRequest {
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct PerformRequest {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct SendOfferRequest {
    pub connection_id: String,
    pub credential_definition_id: String,
    #[serde(default)]
    pub credential_values: Option<CredentialValues>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct IssueRequest {
    pub credential_values: Option<CredentialValues>,
}

#[derive(Deserialize)]
pub struct SendPresentationRequestRequest {
    pub connection_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub requested_attributes: Vec<Value>,
    #[serde(default)]
    pub requested_predicates: Vec<Value>,
}

#[derive(Deserialize)]
pub struct SendPresentationRequest {
    pub requested_credentials: Value,
}

#[derive(Deserialize)]
pub struct SchemaRequest {
    pub schema_name: String,
    pub schema_version: String,
    pub attributes: Vec<String>,
}

fn default_tag() -> String {
    "default".into()
}

#[derive(Deserialize)]
pub struct CredentialDefinitionRequest {
    pub schema_id: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

// --- Errors ---

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_response(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn protocol_error(e: ProtocolError) -> ApiError {
    let status = match &e {
        ProtocolError::Core(core) if core.is_not_found() => StatusCode::NOT_FOUND,
        ProtocolError::ExchangeNotFound(_) | ProtocolError::NoRecipient(_) => StatusCode::NOT_FOUND,
        ProtocolError::Core(CoreError::StorageError(_) | CoreError::WalletError(_))
        | ProtocolError::MessagePrepare(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "admin request failed");
    }
    error_response(status, e)
}

fn core_error(e: CoreError) -> ApiError {
    protocol_error(e.into())
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(State(state): State<Arc<AdminState>>) -> ApiResult<StatusResponse> {
    let wallet = state.context().inject::<dyn Wallet>().map_err(core_error)?;
    let public_did = wallet
        .get_public_did()
        .await
        .map_err(core_error)?
        .map(|info| info.did);
    let connections = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .list_connections(&TagFilter::new())
        .await
        .map_err(protocol_error)?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        label: state.label.clone(),
        endpoint: state.endpoint.clone(),
        public_did,
        connection_count: connections.len(),
        in_flight: state.dispatcher.in_flight(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// Connections

async fn handle_list_connections(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ListResponse<ConnectionRecord>> {
    // Connection records carry no connection_id tag.
    let mut filter = TagFilter::new();
    if let Some(s) = query.state {
        filter.insert("state".into(), s);
    }
    let records = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .list_connections(&filter)
        .await
        .map_err(protocol_error)?;
    Ok(Json(ListResponse::new(records)))
}

async fn handle_get_connection(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<ConnectionRecord> {
    let record = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .get_connection(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_create_invitation(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<CreateInvitationRequest>,
) -> ApiResult<InvitationResponse> {
    let (record, invitation) = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .create_invitation(req.label.as_deref(), None, req.seed.as_deref())
        .await
        .map_err(protocol_error)?;
    let invitation_url = invitation_url(&invitation).map_err(protocol_error)?;
    Ok(Json(InvitationResponse {
        connection_id: record.connection_id,
        invitation,
        invitation_url,
    }))
}

async fn handle_receive_invitation(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<ReceiveInvitationRequest>,
) -> ApiResult<ConnectionRecord> {
    let invitation = match (req.invitation, req.invitation_url) {
        (Some(invitation), _) => invitation,
        (None, Some(url)) => ConnectionInvitation::from_url(&url)
            .map_err(|e| protocol_error(e.into()))?,
        (None, None) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "invitation or invitation_url is required",
            ))
        }
    };
    let connections = ConnectionManager::new(state.context()).map_err(protocol_error)?;
    let record = connections
        .receive_invitation(&invitation)
        .await
        .map_err(protocol_error)?;
    if !req.auto_accept {
        return Ok(Json(record));
    }
    let (record, request, target) = connections
        .accept_invitation(&record.connection_id)
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&record.connection_id, target, request)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_accept_invitation(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<ConnectionRecord> {
    let (record, request, target) = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .accept_invitation(&id)
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&record.connection_id, target, request)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_accept_request(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<ConnectionRecord> {
    let (record, response, target) = ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .accept_request(&id)
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&record.connection_id, target, response)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_remove_connection(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    ConnectionManager::new(state.context())
        .map_err(protocol_error)?
        .remove_connection(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(json!({})))
}

async fn handle_send_message(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<SentResponse> {
    let message = AgentMessage::new(BasicMessage::new(req.content));
    let message_id = message.id().to_string();
    state
        .send_to_connection(&id, message)
        .await
        .map_err(protocol_error)?;
    Ok(Json(SentResponse {
        connection_id: id,
        message_id,
    }))
}

async fn handle_send_ping(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(req): Json<SendPingRequest>,
) -> ApiResult<SentResponse> {
    let message = AgentMessage::new(Ping {
        comment: req.comment,
        response_requested: true,
    });
    let message_id = message.id().to_string();
    state
        .send_to_connection(&id, message)
        .await
        .map_err(protocol_error)?;
    Ok(Json(SentResponse {
        connection_id: id,
        message_id,
    }))
}

// Action menus

async fn handle_fetch_menu(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let storage = state.context().inject::<dyn Storage>().map_err(core_error)?;
    let menu = retrieve_connection_menu(storage.as_ref(), &id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(json!({ "result": menu })))
}

async fn handle_request_menu(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<SentResponse> {
    let message = AgentMessage::new(MenuRequest {});
    let message_id = message.id().to_string();
    state
        .send_to_connection(&id, message)
        .await
        .map_err(protocol_error)?;
    Ok(Json(SentResponse {
        connection_id: id,
        message_id,
    }))
}

async fn handle_perform_menu(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(req): Json<PerformRequest>,
) -> ApiResult<SentResponse> {
    let message = AgentMessage::new(Perform {
        name: req.name,
        params: req.params,
    });
    let message_id = message.id().to_string();
    state
        .send_to_connection(&id, message)
        .await
        .map_err(protocol_error)?;
    Ok(Json(SentResponse {
        connection_id: id,
        message_id,
    }))
}

// Credential exchange

async fn handle_list_credential_exchanges(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ListResponse<CredentialExchangeRecord>> {
    let records = CredentialManager::new(state.context())
        .map_err(protocol_error)?
        .list(&query.filter())
        .await
        .map_err(protocol_error)?;
    Ok(Json(ListResponse::new(records)))
}

async fn handle_get_credential_exchange(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<CredentialExchangeRecord> {
    let record = CredentialManager::new(state.context())
        .map_err(protocol_error)?
        .get(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_send_offer(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<SendOfferRequest>,
) -> ApiResult<CredentialExchangeRecord> {
    let (connection, target) = state
        .ready_connection(&req.connection_id)
        .await
        .map_err(protocol_error)?;
    let (record, offer) = CredentialManager::new(state.context())
        .map_err(protocol_error)?
        .create_offer(
            &connection.connection_id,
            &req.credential_definition_id,
            req.credential_values,
        )
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&connection.connection_id, target, offer)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_send_credential_request(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<CredentialExchangeRecord> {
    let credentials = CredentialManager::new(state.context()).map_err(protocol_error)?;
    let exchange = credentials.get(&id).await.map_err(protocol_error)?;
    let (connection, target) = state
        .ready_connection(&exchange.connection_id)
        .await
        .map_err(protocol_error)?;
    let my_did = connection
        .my_did
        .clone()
        .ok_or_else(|| core_error(CoreError::MissingField("my_did".into())))?;
    let (record, request) = credentials
        .send_request(&id, &my_did)
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&connection.connection_id, target, request)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_issue_credential(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(req): Json<IssueRequest>,
) -> ApiResult<CredentialExchangeRecord> {
    let credentials = CredentialManager::new(state.context()).map_err(protocol_error)?;
    let exchange = credentials.get(&id).await.map_err(protocol_error)?;
    let (connection, target) = state
        .ready_connection(&exchange.connection_id)
        .await
        .map_err(protocol_error)?;
    let (record, issue) = credentials
        .issue(&id, req.credential_values.as_ref())
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&connection.connection_id, target, issue)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_remove_credential_exchange(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    CredentialManager::new(state.context())
        .map_err(protocol_error)?
        .remove(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(json!({})))
}

// Presentation exchange

async fn handle_list_presentation_exchanges(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ListResponse<PresentationExchangeRecord>> {
    let records = PresentationManager::new(state.context())
        .map_err(protocol_error)?
        .list(&query.filter())
        .await
        .map_err(protocol_error)?;
    Ok(Json(ListResponse::new(records)))
}

async fn handle_get_presentation_exchange(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<PresentationExchangeRecord> {
    let record = PresentationManager::new(state.context())
        .map_err(protocol_error)?
        .get(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_send_presentation_request(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<SendPresentationRequestRequest>,
) -> ApiResult<PresentationExchangeRecord> {
    let (connection, target) = state
        .ready_connection(&req.connection_id)
        .await
        .map_err(protocol_error)?;
    let (record, request) = PresentationManager::new(state.context())
        .map_err(protocol_error)?
        .create_request(
            &req.name,
            &req.version,
            req.requested_attributes,
            req.requested_predicates,
            &connection.connection_id,
        )
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&connection.connection_id, target, request)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_send_presentation(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(req): Json<SendPresentationRequest>,
) -> ApiResult<PresentationExchangeRecord> {
    let presentations = PresentationManager::new(state.context()).map_err(protocol_error)?;
    let exchange = presentations.get(&id).await.map_err(protocol_error)?;
    let (connection, target) = state
        .ready_connection(&exchange.connection_id)
        .await
        .map_err(protocol_error)?;
    let (record, presentation) = presentations
        .send_presentation(&id, &req.requested_credentials)
        .await
        .map_err(protocol_error)?;
    state
        .send_over(&connection.connection_id, target, presentation)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_verify_presentation(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<PresentationExchangeRecord> {
    let record = PresentationManager::new(state.context())
        .map_err(protocol_error)?
        .verify(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(record))
}

async fn handle_remove_presentation_exchange(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    PresentationManager::new(state.context())
        .map_err(protocol_error)?
        .remove(&id)
        .await
        .map_err(protocol_error)?;
    Ok(Json(json!({})))
}

// Routing

async fn handle_list_routes(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ListResponse<RouteRecord>> {
    let routes = RoutingManager::new(state.context())
        .map_err(protocol_error)?
        .get_routes(query.connection_id.as_deref(), None)
        .await
        .map_err(protocol_error)?;
    Ok(Json(ListResponse::new(routes)))
}

// Ledger

async fn handle_send_schema(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<SchemaRequest>,
) -> ApiResult<SchemaResponse> {
    let ledger = state.context().inject::<dyn Ledger>().map_err(core_error)?;
    let schema_id = ledger
        .send_schema(&req.schema_name, &req.schema_version, &req.attributes)
        .await
        .map_err(core_error)?;
    tracing::info!(schema_id = %schema_id, "schema published");
    Ok(Json(SchemaResponse { schema_id }))
}

async fn handle_get_schema(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let ledger = state.context().inject::<dyn Ledger>().map_err(core_error)?;
    ledger
        .get_schema(&id)
        .await
        .map_err(core_error)?
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("unknown schema: {}", id)))
}

async fn handle_send_credential_definition(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<CredentialDefinitionRequest>,
) -> ApiResult<CredentialDefinitionResponse> {
    let ledger = state.context().inject::<dyn Ledger>().map_err(core_error)?;
    let credential_definition_id = ledger
        .send_credential_definition(&req.schema_id, &req.tag)
        .await
        .map_err(core_error)?;
    tracing::info!(
        credential_definition_id = %credential_definition_id,
        "credential definition published"
    );
    Ok(Json(CredentialDefinitionResponse {
        credential_definition_id,
    }))
}

async fn handle_get_credential_definition(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let ledger = state.context().inject::<dyn Ledger>().map_err(core_error)?;
    ledger
        .get_credential_definition(&id)
        .await
        .map_err(core_error)?
        .map(Json)
        .ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                format!("unknown credential definition: {}", id),
            )
        })
}

// --- Server ---

pub fn build_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/connections", get(handle_list_connections))
        .route("/api/v1/connections/create-invitation", post(handle_create_invitation))
        .route("/api/v1/connections/receive-invitation", post(handle_receive_invitation))
        .route("/api/v1/connections/{id}", get(handle_get_connection))
        .route("/api/v1/connections/{id}/accept-invitation", post(handle_accept_invitation))
        .route("/api/v1/connections/{id}/accept-request", post(handle_accept_request))
        .route("/api/v1/connections/{id}/remove", post(handle_remove_connection))
        .route("/api/v1/connections/{id}/send-message", post(handle_send_message))
        .route("/api/v1/connections/{id}/send-ping", post(handle_send_ping))
        .route("/api/v1/action-menu/{id}", get(handle_fetch_menu))
        .route("/api/v1/action-menu/{id}/request", post(handle_request_menu))
        .route("/api/v1/action-menu/{id}/perform", post(handle_perform_menu))
        .route("/api/v1/credential_exchange", get(handle_list_credential_exchanges))
        .route("/api/v1/credential_exchange/send-offer", post(handle_send_offer))
        .route("/api/v1/credential_exchange/{id}", get(handle_get_credential_exchange))
        .route(
            "/api/v1/credential_exchange/{id}/send-request",
            post(handle_send_credential_request),
        )
        .route("/api/v1/credential_exchange/{id}/issue", post(handle_issue_credential))
        .route(
            "/api/v1/credential_exchange/{id}/remove",
            post(handle_remove_credential_exchange),
        )
        .route("/api/v1/presentation_exchange", get(handle_list_presentation_exchanges))
        .route(
            "/api/v1/presentation_exchange/send-request",
            post(handle_send_presentation_request),
        )
        .route("/api/v1/presentation_exchange/{id}", get(handle_get_presentation_exchange))
        .route(
            "/api/v1/presentation_exchange/{id}/send-presentation",
            post(handle_send_presentation),
        )
        .route(
            "/api/v1/presentation_exchange/{id}/verify-presentation",
            post(handle_verify_presentation),
        )
        .route(
            "/api/v1/presentation_exchange/{id}/remove",
            post(handle_remove_presentation_exchange),
        )
        .route("/api/v1/routes", get(handle_list_routes))
        .route("/api/v1/schemas", post(handle_send_schema))
        .route("/api/v1/schemas/{id}", get(handle_get_schema))
        .route("/api/v1/credential-definitions", post(handle_send_credential_definition))
        .route("/api/v1/credential-definitions/{id}", get(handle_get_credential_definition))
        .with_state(state)
}

/// Bind the admin API and serve it until `shutdown` fires.
pub async fn start_admin_server(
    listen_addr: SocketAddr,
    state: Arc<AdminState>,
    shutdown: CancellationToken,
    tasks: &TaskTracker,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    let addr = listener.local_addr()?;
    tasks.spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "admin API server failed");
        }
    });
    tracing::info!(%addr, "admin API server started");
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: ProtocolError| protocol_error(e).0;
        assert_eq!(
            status(CoreError::StorageNotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ProtocolError::NoRecipient("k".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(CoreError::WalletError("locked".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(CoreError::LedgerError("no public DID".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ProtocolError::ConnectionProtocol("not ready".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_invitation_url_round_trip() {
        let invitation = ConnectionInvitation::with_keys("Alice", vec!["K1".into()], "https://alice");
        let url = invitation_url(&invitation).unwrap().unwrap();
        assert!(url.starts_with("https://alice/?c_i="));
        assert_eq!(ConnectionInvitation::from_url(&url).unwrap(), invitation);

        let by_did = ConnectionInvitation {
            label: "Alice".into(),
            did: Some("did:sov:alice".into()),
            ..Default::default()
        };
        assert!(invitation_url(&by_did).unwrap().is_none());
    }
}
