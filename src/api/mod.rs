mod handlers;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::db::Database;

/// Router with permissive CORS, for local use and tests.
pub fn create_router(db: Database) -> Router {
    create_router_with_config(db, &ServerConfig::local())
}

pub fn create_router_with_config(db: Database, config: &ServerConfig) -> Router {
    let api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route("/projects/{id}", get(handlers::get_project))
        // Tree
        .route("/projects/{id}/tree", get(handlers::get_tree))
        .route("/projects/{id}/export", get(handlers::export_tree))
        // Nodes
        .route("/projects/{id}/nodes", post(handlers::create_node))
        .route("/projects/{id}/nodes/bulk", post(handlers::bulk_create))
        .route("/projects/{id}/nodes/search", get(handlers::search_nodes))
        .route(
            "/projects/{id}/nodes/{node_id}",
            get(handlers::get_node)
                .put(handlers::update_node)
                .delete(handlers::delete_node),
        )
        .route(
            "/projects/{id}/nodes/{node_id}/children",
            get(handlers::list_children),
        )
        .route(
            "/projects/{id}/nodes/{node_id}/status",
            put(handlers::update_status),
        )
        .route(
            "/projects/{id}/nodes/{node_id}/restore",
            post(handlers::restore_node),
        )
        // Import preview (not project-scoped, nothing is written)
        .route("/import", post(handlers::import_preview))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config)),
        )
        .with_state(db)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let Some(origins) = &config.cors_origins else {
        return CorsLayer::permissive();
    };

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
