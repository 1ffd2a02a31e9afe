use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use diesel::prelude::*;
use socketioxide::extract::{SocketRef, TryData};
use socketioxide::SocketIo;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

mod config;
mod events;
mod models;
mod routes;
mod schema;
mod services;
mod socket;

use config::AppConfig;
use pulse_shared::clients::blob::BlobClient;
use pulse_shared::clients::db::{create_pool, DbPool};
use pulse_shared::clients::redis::RedisClient;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub redis: RedisClient,
    pub blob: BlobClient,
    pub io: SocketIo,
    /// Socket id -> authenticated subject, for the shutdown flush.
    pub connected: DashMap<String, Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulse_shared::middleware::init_tracing("pulse-gateway");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url, config.db_pool_size);
    let redis = RedisClient::connect(&config.redis_url).await?;
    let blob = BlobClient::new(
        &config.blob_endpoint,
        &config.blob_access_key,
        &config.blob_secret_key,
        &config.blob_bucket,
    )
    .await;

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the Socket.IO layer - io lives in AppState so the bus consumer
    // can emit into rooms.
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let state = Arc::new(AppState {
        db,
        config,
        redis,
        blob,
        io: io.clone(),
        connected: DashMap::new(),
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: SocketRef, auth: TryData<socket::handlers::AuthPayload>| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect_with_state(socket, auth, state).await;
            }
        }
    });

    // Every instance consumes the bus, including for its own sends.
    let sub_state = state.clone();
    tokio::spawn(async move {
        events::subscriber::listen_chat_messages(sub_state).await;
    });

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Identity
        .route("/auth/sync", post(routes::auth::sync_user))
        .route("/auth/me", get(routes::auth::me))
        // Conversations
        .route(
            "/conversations",
            post(routes::conversations::create_conversation)
                .get(routes::conversations::list_conversations),
        )
        .route("/conversations/:id", get(routes::conversations::get_conversation))
        // Messages
        .route("/messages", post(routes::messages::send_message))
        .route("/messages/single/:message_id", get(routes::messages::get_message))
        .route("/messages/:conversation_id", get(routes::messages::list_messages))
        // Media
        .route("/media/upload-url", post(routes::media::upload_url))
        .route("/media/url", get(routes::media::media_url))
        // Presence
        .route("/presence/online", get(routes::presence::online_users))
        .layer(sio_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "pulse-gateway starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    flush_connected(&state).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// Last-seen flush for principals still connected when the instance stops.
/// Their disconnect handlers will never run.
async fn flush_connected(state: &Arc<AppState>) {
    let user_ids: std::collections::HashSet<Uuid> =
        state.connected.iter().map(|entry| *entry.value()).collect();
    if user_ids.is_empty() {
        return;
    }

    tracing::info!(count = user_ids.len(), "flushing last-seen for connected principals");
    let now = chrono::Utc::now();

    for user_id in user_ids {
        if let Err(e) = services::presence::mark_offline(&state.redis, user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to clear presence on shutdown");
        }
        if let Ok(mut conn) = state.db.get() {
            let _ = diesel::update(schema::users::table.find(user_id))
                .set(schema::users::last_seen_at.eq(now))
                .execute(&mut conn);
        }
    }
}
