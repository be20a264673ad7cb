use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use harbor_api::auth::{self, AppState, AppStateInner};
use harbor_api::middleware::require_auth;
use harbor_api::{conversations, messages, users};
use harbor_chat::router::DeliveryRouter;
use harbor_chat::seen::SeenReconciler;
use harbor_chat::store::ConversationStore;
use harbor_gateway::connection;
use harbor_gateway::dispatcher::Dispatcher;
use harbor_types::api::Claims;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HARBOR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("HARBOR_DB_PATH").unwrap_or_else(|_| "harbor.db".into());
    let host = std::env::var("HARBOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HARBOR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = harbor_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state: the dispatcher is the single connection registry, the
    // router and reconciler share it with the REST handlers.
    let dispatcher = Dispatcher::new();
    let store: Arc<dyn ConversationStore> = Arc::new(db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        store: store.clone(),
        router: DeliveryRouter::new(store.clone(), dispatcher.clone()),
        reconciler: SeenReconciler::new(store, dispatcher.clone()),
        jwt_secret: jwt_secret.clone(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route(
            "/messages/{user_id}",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/{conversation_id}/seen",
            post(conversations::mark_seen),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(GatewayState {
        dispatcher,
        jwt_secret,
    });

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Harbor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// Validate the JWT before upgrading: a bad token gets a 401, never a
/// socket. The handshake carries the token as a query parameter because
/// browsers cannot set headers on WebSocket requests.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token_data = match decode::<Claims>(
        &query.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data,
        Err(e) => {
            warn!("Gateway upgrade rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let user_id = token_data.claims.sub;
    let username = token_data.claims.username;
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, user_id, username)
    })
    .into_response()
}
