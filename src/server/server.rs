use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error};

use crate::mailer::Mailer;
use crate::scheduler::ReminderScheduler;
use crate::store::{FullStore, NewTransaction, TransactionStore};
use tower_http::services::ServeDir;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::settings_routes::make_settings_routes;
use super::{log_requests, session::Session, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub active_reminders: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_reminders: state.scheduler.active_count().await,
    };
    Json(stats)
}

async fn get_me(session: Session) -> impl IntoResponse {
    Json(serde_json::json!({
        "id": session.user_id,
        "email": session.email,
        "name": session.name,
    }))
}

#[derive(Deserialize, Debug)]
struct TransactionsQuery {
    year: Option<i32>,
}

async fn get_transactions(
    session: Session,
    State(store): State<GuardedStore>,
    Query(query): Query<TransactionsQuery>,
) -> Response {
    match store.get_transactions(session.user_id, query.year) {
        Ok(transactions) => Json(transactions).into_response(),
        Err(err) => {
            error!("Failed to load transactions: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_transaction(
    session: Session,
    State(store): State<GuardedStore>,
    Json(body): Json<NewTransaction>,
) -> Response {
    match store.add_transaction(session.user_id, &body) {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(err) => {
            error!("Failed to add transaction: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn put_transaction(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
    Json(body): Json<NewTransaction>,
) -> Response {
    debug!("Updating transaction with id {}", id);
    match store.update_transaction(session.user_id, id, &body) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update transaction: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_transaction(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> Response {
    match store.delete_transaction(session.user_id, id) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete transaction: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_report(
    session: Session,
    State(store): State<GuardedStore>,
    Path(year): Path<i32>,
) -> Response {
    match store.eur_report(session.user_id, year) {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!("Failed to build report: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    store: Arc<dyn FullStore>,
    scheduler: Arc<ReminderScheduler>,
    mailer: Arc<dyn Mailer>,
) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        store,
        scheduler,
        mailer,
    };

    let api_routes: Router = Router::new()
        .route("/health", get(health))
        .route("/me", get(get_me))
        .route("/transactions", get(get_transactions))
        .route("/transactions", post(post_transaction))
        .route("/transactions/{id}", put(put_transaction))
        .route("/transactions/{id}", delete(delete_transaction))
        .route("/report/{year}", get(get_report))
        .merge(make_settings_routes())
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new(),
    };

    home_router
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    store: Arc<dyn FullStore>,
    scheduler: Arc<ReminderScheduler>,
    mailer: Arc<dyn Mailer>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, store, scheduler, mailer);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
