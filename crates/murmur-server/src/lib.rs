pub mod config;
pub mod reconcile;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use murmur_api::conversations::ConversationEngine;
use murmur_api::middleware::require_auth;
use murmur_api::notify::JobQueue;
use murmur_api::password::PasswordHashing;
use murmur_api::session::SessionManager;
use murmur_api::tokens::TokenService;
use murmur_api::{AppState, AppStateInner, auth, messages};
use murmur_db::Database;
use murmur_gateway::{DeliveryCoordinator, PresenceDirectory, handle_connection};

use crate::config::Config;

/// Wire the stores, session manager, conversation engine and presence
/// directory into one shared state.
pub fn build_state(
    db: Arc<Database>,
    config: &Config,
    jobs: Arc<dyn JobQueue>,
    hasher: Arc<dyn PasswordHashing>,
) -> AppState {
    let tokens = TokenService::new(config.token_secrets(), config.token_ttls());
    let presence = PresenceDirectory::new();

    Arc::new(AppStateInner {
        sessions: SessionManager::new(db.clone(), tokens.clone(), hasher, jobs, config.store_timeout),
        conversations: ConversationEngine::new(db.clone(), db.clone(), db, config.store_timeout),
        delivery: DeliveryCoordinator::new(presence.clone()),
        presence,
        verifier: Arc::new(tokens),
    })
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/user/register", post(auth::register))
        .route("/api/user/verify/{token}", get(auth::verify_email))
        .route("/api/user/login", post(auth::login))
        .route("/api/user/renew-token", post(auth::renew_token));

    let protected_routes = Router::new()
        .route("/api/user/logout", post(auth::logout))
        .route("/api/messages/{peer_id}", get(messages::get_messages))
        .route("/api/messages/send/{peer_id}", post(messages::send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_connection(socket, state.presence.clone(), state.verifier.clone())
    })
}
