use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jojoprompts::cache::UserCache;
use jojoprompts::config::Config;
use jojoprompts::db::{AppState, create_pool, init_db, queries};
use jojoprompts::handlers;
use jojoprompts::models::{CreatePlan, CreateUser};
use jojoprompts::payments::{PayPalClient, TapClient};
use jojoprompts::rate_limit;

#[derive(Parser, Debug)]
#[command(name = "jojoprompts")]
#[command(about = "Payment backend for the JojoPrompts storefront")]
struct Cli {
    /// Seed the database with dev data (admin, demo user, plans) and print tokens
    #[arg(long)]
    seed: bool,
}

/// Seeds the database with dev data. Only runs in dev mode and when no plans exist.
fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seeding");

    let plans = queries::list_plans(&conn).expect("Failed to list plans");
    if !plans.is_empty() {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let tx = conn.transaction().expect("Failed to start seed transaction");

    let seed_plans = [
        ("basic", "Basic", 999, Some(30), false),
        ("pro", "Pro", 1999, Some(30), false),
        ("lifetime", "Lifetime", 9900, None, true),
    ];
    for (id, name, price_cents, duration_days, is_lifetime) in seed_plans {
        let plan = queries::create_plan(
            &tx,
            &CreatePlan {
                id: id.to_string(),
                name: name.to_string(),
                price_cents,
                currency: "USD".to_string(),
                duration_days,
                is_lifetime,
            },
        )
        .expect("Failed to create plan");
        tracing::info!("Plan: {} ({} cents)", plan.id, plan.price_cents);
    }

    let admin = queries::create_user(
        &tx,
        &CreateUser {
            email: "admin@jojoprompts.local".to_string(),
            name: "Dev Admin".to_string(),
            is_admin: true,
        },
    )
    .expect("Failed to create admin user");
    let admin_tokens = queries::issue_tokens(&tx, &admin.id).expect("Failed to issue admin tokens");

    let demo = queries::create_user(
        &tx,
        &CreateUser {
            email: "buyer@jojoprompts.local".to_string(),
            name: "Demo Buyer".to_string(),
            is_admin: false,
        },
    )
    .expect("Failed to create demo user");
    let demo_tokens = queries::issue_tokens(&tx, &demo.id).expect("Failed to issue demo tokens");

    tx.commit().expect("Failed to commit seed data");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  admin_user_id: {}", admin.id);
    println!("  admin_access_token: {}", admin_tokens.access_token);
    println!("  demo_user_id: {}", demo.id);
    println!("  demo_access_token: {}", demo_tokens.access_token);
    println!("  demo_refresh_token: {}", demo_tokens.refresh_token);
    println!("--- END COPY ---");
    println!();
}

/// Periodic maintenance: webhook dedup records, ended subscriptions, dead tokens.
fn spawn_cleanup_task(state: AppState, webhook_retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            let conn = match state.db.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                    continue;
                }
            };

            if webhook_retention_days > 0 {
                match queries::purge_old_webhook_events(&conn, webhook_retention_days) {
                    Ok(count) if count > 0 => {
                        tracing::debug!("Purged {} old webhook events", count)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to purge webhook events: {}", e),
                }
            }

            match queries::expire_ended_subscriptions(&conn) {
                Ok(count) if count > 0 => tracing::info!("Expired {} subscriptions", count),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to expire subscriptions: {}", e),
            }

            match queries::purge_expired_tokens(&conn) {
                Ok(count) if count > 0 => tracing::debug!("Purged {} expired tokens", count),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to purge expired tokens: {}", e),
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .max_age(Duration::from_secs(60 * 60))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jojoprompts=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.paypal.is_none() {
        tracing::warn!("PayPal credentials not set; PayPal endpoints will return 503");
    }
    if config.tap.is_none() {
        tracing::warn!("Tap secret key not set; Tap endpoints will return 503");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        site_url: config.site_url.clone(),
        paypal: config.paypal.as_ref().map(PayPalClient::new),
        tap: config.tap.as_ref().map(TapClient::new),
        user_cache: UserCache::new(
            config.user_cache_capacity,
            Duration::from_secs(config.user_cache_ttl_secs),
        ),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set JOJO_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_cleanup_task(state.clone(), config.webhook_event_retention_days);

    let app = Router::new()
        .merge(handlers::public::router(config.rate_limit))
        .merge(handlers::webhooks::router())
        .merge(
            handlers::admin::router(state.clone())
                .layer(rate_limit::standard_layer(config.rate_limit.standard_rpm)),
        )
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("JojoPrompts payments server listening on {}", addr);

    // Connect info is required for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
