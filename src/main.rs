mod api;
mod config;
mod database;
mod jobs;
mod middleware;
mod models;
mod seeds;
mod services;
mod utils;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("🚀 Starting Library Service...");

    // Initialize MongoDB connection
    let db = match database::MongoDB::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("❌ Failed to connect to MongoDB: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("✅ MongoDB connected successfully");

    // 🌱 Default settings
    seeds::settings_seed::seed_default_settings(&db).await;

    let mailer = match services::email_service::mailer_from_config(&config) {
        Ok(mailer) => mailer,
        Err(e) => {
            log::error!("❌ Failed to configure mailer: {}", e);
            std::process::exit(1);
        }
    };

    std::fs::create_dir_all(&config.upload_dir)?;

    log::info!("📅 Starting background jobs...");
    jobs::borrow_monitor::start_borrow_monitor(db.clone(), mailer.clone(), config.monitor_interval_secs).await;

    let bind_address = config.bind_address();
    log::info!("🌐 Server starting on {}", bind_address);
    log::info!("📚 Swagger UI available at: http://{}/swagger-ui/", bind_address);
    log::info!("📄 OpenAPI spec at: http://{}/api-docs/openapi.json", bind_address);

    let db_data = web::Data::new(db);
    let mailer_data: web::Data<dyn services::email_service::Mailer> = web::Data::from(mailer);
    let config_data = web::Data::new(config);

    // Start HTTP server
    HttpServer::new(move || {
        let config = config_data.get_ref();

        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);
        if config.allows_any_origin() {
            cors = cors.allow_any_origin();
        } else {
            for origin in &config.cors_origins {
                cors = cors.allowed_origin(origin);
            }
            cors = cors.supports_credentials();
        }

        let json_config = web::JsonConfig::default()
            .limit(1024 * 1024)
            .error_handler(|err, _req| {
                utils::AppError::InvalidRequest(format!("Invalid JSON body: {}", err)).into()
            });

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(mailer_data.clone())
            .app_data(config_data.clone())
            .app_data(json_config)
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(middleware::RequestMetrics)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Metrics
            .route("/metrics", web::get().to(api::metrics::get_metrics))
            // Uploaded images (membership, borrow and payment proofs)
            .service(Files::new("/uploads", config.upload_dir.clone()))
            .configure(api::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
