pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::StagingConfig;
use crate::services::temp_avatar::TempAvatarStore;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::temp_avatars::upload_temp_avatar,
        api::handlers::temp_avatars::list_temp_avatars,
        api::handlers::temp_avatars::get_temp_avatar,
        api::handlers::temp_avatars::delete_temp_avatar,
        api::handlers::temp_avatars::promote_temp_avatar,
        api::handlers::temp_avatars::temp_avatar_stats,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            models::StagedUpload,
            models::PromotedUpload,
            models::StagingStats,
        )
    ),
    tags(
        (name = "temp-avatars", description = "Staged avatar uploads awaiting their owning entity"),
        (name = "system", description = "Health and operational endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TempAvatarStore>,
    pub config: StagingConfig,
}

impl AppState {
    pub fn new(store: Arc<TempAvatarStore>) -> Self {
        let config = store.config().clone();
        Self { store, config }
    }
}

pub fn create_app(state: AppState) -> Router {
    let owner_layer = from_fn(api::middleware::owner::owner_middleware);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/temp-avatars/stats",
            get(api::handlers::temp_avatars::temp_avatar_stats),
        )
        .route(
            "/temp-avatars",
            post(api::handlers::temp_avatars::upload_temp_avatar)
                .get(api::handlers::temp_avatars::list_temp_avatars)
                .layer(axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 1024 * 1024, // Add 1MB buffer for multipart overhead
                ))
                .layer(owner_layer.clone()),
        )
        .route(
            "/temp-avatars/:handle",
            get(api::handlers::temp_avatars::get_temp_avatar)
                .delete(api::handlers::temp_avatars::delete_temp_avatar)
                .layer(owner_layer.clone()),
        )
        .route(
            "/temp-avatars/:handle/promote",
            post(api::handlers::temp_avatars::promote_temp_avatar).layer(owner_layer),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
