use actix_web::{middleware::Compress, web, App, HttpServer};
use actix_cors::Cors;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use favortrack::config::AppConfig;
use favortrack::openapi::ApiDoc;
use favortrack::rate_limit::RateLimiterFacade;
use favortrack::repo::Repo;
use favortrack::{config, AppState, SecurityHeaders};

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory document store");
    Ok(Arc::new(favortrack::repo::inmem::InMemRepo::new()))
}

#[cfg(feature = "postgres-store")]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    use anyhow::Context;
    use sqlx::postgres::PgPoolOptions;
    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new().max_connections(5).connect_lazy(&db_url)?;
    let repo = favortrack::repo::pg::PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres document store");
    Ok(Arc::new(repo))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    info!("Bootstrapping favor tracker");
    info!("Cloudinary uploads configured: {}", cfg.cloudinary.is_some());
    info!("Bootstrap admins: {}", cfg.bootstrap_admins.len());

    let repo = match build_repo().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to initialise document store: {e:#}");
            std::process::exit(1);
        }
    };

    let bind_addr = cfg.bind_addr.clone();
    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;
    let state = AppState::new(repo, cfg).with_rate_limiter(RateLimiterFacade::from_env());
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            // during local dev allow the Vite dev server
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);
        if let Some(front) = frontend_url.as_deref() {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind(bind_addr.as_str())?;

    info!("Listening on http://{bind_addr}");

    server.run().await
}
