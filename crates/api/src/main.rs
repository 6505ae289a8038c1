use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use newsroom_core::roles::{ROLE_ADMIN, ROLE_EDITOR};
use newsroom_core::subscriber::validate_email;
use newsroom_db::models::admin_user::CreateAdminUser;
use newsroom_db::repositories::AdminUserRepo;
use newsroom_db::DbPool;
use newsroom_events::{mailer_from_env, EventBus};
use newsroom_pipeline::{DeliveryConfig, Sender};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsroom_api::auth::password::{hash_password, validate_password_strength};
use newsroom_api::config::ServerConfig;
use newsroom_api::router::build_app_router;
use newsroom_api::state::AppState;
use newsroom_api::triggers::TriggerRouter;

const USAGE: &str = "usage: newsroom-api [create-admin <email> <password> [admin|editor]]";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsroom_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => serve().await,
        Some("create-admin") => {
            let pool = connect().await;
            if let Err(message) = create_admin(&pool, &args[1..]).await {
                eprintln!("{message}");
                std::process::exit(1);
            }
        }
        Some(_) => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn serve() {
    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pool = connect().await;

    // --- Delivery ---
    let mailer = mailer_from_env().expect("Failed to configure mail delivery");
    if !mailer.is_configured() {
        tracing::warn!("No mail transport configured, sends will fail");
    }
    let sender = Sender::new(pool.clone(), mailer, DeliveryConfig::from_env());
    match sender.recover_abandoned_sends().await {
        Ok(0) => {}
        Ok(recovered) => tracing::warn!(recovered, "Abandoned sends recovered"),
        Err(e) => tracing::error!(error = %e, "Failed to recover abandoned sends"),
    }

    // --- Event bus + automation triggers ---
    let event_bus = Arc::new(EventBus::default());
    let state = AppState::new(pool, config.clone(), Arc::clone(&event_bus), sender.clone());

    let trigger_router = TriggerRouter::new(state.automations.clone());
    let trigger_handle = tokio::spawn(trigger_router.run(event_bus.subscribe()));
    tracing::info!("Trigger router started");

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Dropping the last bus handle closes the channel and ends the router.
    drop(event_bus);
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, trigger_handle).await.is_err() {
        tracing::warn!("Trigger router did not stop in time");
    }

    // Running newsletter sends stop at their next batch boundary.
    if tokio::time::timeout(grace, sender.shutdown()).await.is_err() {
        tracing::warn!("Newsletter sends did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
}

async fn connect() -> DbPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = newsroom_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    newsroom_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    newsroom_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    pool
}

/// `create-admin <email> <password> [role]`: bootstrap an admin account.
async fn create_admin(pool: &DbPool, args: &[String]) -> Result<(), String> {
    let [email, password, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let role = match rest.first().map(String::as_str) {
        None | Some("admin") => ROLE_ADMIN,
        Some("editor") => ROLE_EDITOR,
        Some(other) => return Err(format!("Unknown role '{other}'")),
    };

    let email = validate_email(email).map_err(|e| e.to_string())?;
    validate_password_strength(password)?;
    let password_hash = hash_password(password).map_err(|e| e.to_string())?;

    let user = AdminUserRepo::create(
        pool,
        &CreateAdminUser {
            email,
            password_hash,
            role: role.to_string(),
        },
    )
    .await
    .map_err(|e| format!("Could not create admin: {e}"))?;

    tracing::info!(user_id = user.id, role = %user.role, "Admin user created");
    println!("Created {} user {} (id {})", user.role, user.email, user.id);
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
