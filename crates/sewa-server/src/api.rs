use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sewa_shared::BookingId;
use sewa_store::{Booking, Message};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{principal_from, Authenticated, IdentityProvider};
use crate::bookings::{BookingService, CreateBookingRequest};
use crate::config::ServerConfig;
use crate::conversations::{ConversationService, ConversationView};
use crate::directory::StoreDirectory;
use crate::error::ServiceError;
use crate::gateway::Gateway;
use crate::hub::ChannelHub;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::payments::{
    FailureCallback, InitiatePaymentRequest, PaymentInitiation, PaymentService, SuccessCallback,
};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub conversations: Arc<ConversationService>,
    pub payments: Arc<PaymentService>,
    pub gateway: Arc<Gateway>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        store: Store,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        config: ServerConfig,
    ) -> Self {
        let config = Arc::new(config);
        let directory = Arc::new(StoreDirectory::new(store.clone()));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            directory,
            NotificationDispatcher::new(notifier),
        ));
        let conversations = Arc::new(ConversationService::new(store.clone(), ChannelHub::new()));
        let payments = Arc::new(PaymentService::new(store, bookings.clone(), config.clone()));
        let gateway = Arc::new(Gateway::new(
            bookings.clone(),
            conversations.clone(),
            config.ws_idle_timeout,
        ));

        Self {
            bookings,
            conversations,
            payments,
            gateway,
            identity,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/mine", get(my_bookings))
        .route("/api/bookings/seller", get(seller_bookings))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/status", patch(update_status))
        .route("/api/payments/initiate", post(initiate_payment))
        .route("/api/payments/esewa/success", get(payment_success))
        .route("/api/payments/esewa/failure", get(payment_failure))
        .route("/api/conversations", get(list_conversations))
        .route(
            "/api/conversations/:booking_id/messages",
            get(list_messages).post(post_message),
        )
        .route("/ws/chat/:booking_id", get(chat_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request bodies that fail to decode are reported like any other bad argument.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ServiceError::InvalidArgument(e.body_text()))
}

fn booking_id(raw: &str) -> Result<BookingId, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::NotFound("Booking not found".into()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    live_channels: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        live_channels: state.conversations.hub().channel_count().await,
    })
}

// ─── Bookings ───

async fn create_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ServiceError> {
    let booking = state.bookings.create_booking(&principal, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn my_bookings(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<Booking>>, ServiceError> {
    Ok(Json(state.bookings.list_for_buyer(&principal).await?))
}

async fn seller_bookings(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<Booking>>, ServiceError> {
    Ok(Json(state.bookings.list_for_seller(&principal).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ServiceError> {
    Ok(Json(state.bookings.get_booking(&principal, booking_id(&id)?).await?))
}

#[derive(Deserialize)]
struct StatusRequest {
    status: Option<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Booking>, ServiceError> {
    let status = body(payload)?
        .status
        .ok_or_else(|| ServiceError::InvalidArgument("status is required".into()))?;
    let booking = state
        .bookings
        .transition_status(&principal, booking_id(&id)?, &status)
        .await?;
    Ok(Json(booking))
}

// ─── Payments ───

async fn initiate_payment(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentInitiation>, ServiceError> {
    Ok(Json(state.payments.initiate(&principal, body(payload)?).await?))
}

/// Gateway redirect after a successful payment. Any problem sends the browser
/// to the generic error page; details only go to the log.
async fn payment_success(
    State(state): State<AppState>,
    Query(callback): Query<SuccessCallback>,
) -> Redirect {
    let oid = callback.oid.clone().unwrap_or_default();
    match state.payments.complete(callback).await {
        Ok(booking) => {
            info!(booking = %booking, transaction = %oid, "Payment callback accepted");
            Redirect::to(&state.payments.success_redirect(booking))
        }
        Err(e) => {
            warn!(transaction = %oid, error = %e, "Payment callback rejected");
            Redirect::to(&state.payments.failure_redirect())
        }
    }
}

async fn payment_failure(
    State(state): State<AppState>,
    Query(callback): Query<FailureCallback>,
) -> Redirect {
    state.payments.fail(callback).await;
    Redirect::to(&state.payments.failure_redirect())
}

// ─── Conversations ───

async fn list_conversations(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<ConversationView>>, ServiceError> {
    Ok(Json(state.conversations.list_conversations(&principal).await?))
}

async fn list_messages(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ServiceError> {
    let messages = state
        .conversations
        .list_messages(&principal, booking_id(&id)?)
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct PostMessageRequest {
    #[serde(default, alias = "body")]
    message: String,
}

async fn post_message(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ServiceError> {
    let req = body(payload)?;
    let message = state
        .conversations
        .post_message(&principal, booking_id(&id)?, &req.message)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ─── Real-time ───

async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let principal = principal_from(
        &state.identity,
        &headers,
        query.get("token").map(String::as_str),
    );
    let channel = format!("{}{raw}", sewa_shared::constants::CHANNEL_PREFIX);
    let gateway = state.gateway.clone();

    ws.on_upgrade(move |socket| gateway.run(socket, channel, principal))
        .into_response()
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
