use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use clap::{Parser, Subcommand};
use opentelemetry::KeyValue;
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcpgate::auth::KeyAuthenticator;
use mcpgate::cache::TieredCache;
use mcpgate::policy::PolicyResolver;
use mcpgate::proxy::orchestrator::proxy_handler;
use mcpgate::proxy::upstream::UpstreamClient;
use mcpgate::state::AppState;
use mcpgate::{audit, config, metrics, store};

#[derive(Parser)]
#[command(name = "mcpgated")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the governance proxy.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Migrate) => {
            let pool = store::connect(&cfg.database_url).await?;
            store::migrate(&pool).await
        }
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        None => run_server(cfg, None).await,
    };

    if let Err(ref err) = result {
        eprintln!("fatal: {err:?}");
    }
    result
}

fn init_telemetry() {
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(
                sdktrace::config()
                    .with_resource(Resource::new(vec![KeyValue::new("service.name", "mcpgate")])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .expect("failed to install OpenTelemetry tracer");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcpgate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();
}

async fn run_server(cfg: config::Config, port_override: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("connecting to database");
    let pool = store::connect(&cfg.database_url).await?;

    tracing::info!("running migrations");
    store::migrate(&pool).await?;

    tracing::info!("connecting to redis");
    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let cache = TieredCache::new(redis_conn);

    let authenticator = KeyAuthenticator::new(pool.clone());
    let policy_resolver = PolicyResolver::new(pool.clone(), cache.clone(), cfg.policy_cache_ttl_seconds);
    let upstream = UpstreamClient::new(&cfg);
    let audit = audit::AuditEmitter::spawn(pool.clone(), cfg.audit_channel_capacity);

    let port = port_override.unwrap_or(cfg.port);

    let state = Arc::new(AppState {
        config: cfg,
        pool,
        cache,
        authenticator,
        policy_resolver,
        upstream,
        audit,
    });

    let app = axum::Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .route("/governance-plane/api/v1/proxy/*path", post(proxy_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            let dashboard_origin =
                std::env::var("MCPGATE_ADMIN_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("mcpgate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Renders the process's `prometheus` registry in the text exposition
/// format: audit-channel drops and guardrail trigger counts.
async fn metrics_handler() -> impl IntoResponse {
    ([("content-type", "text/plain; version=0.0.4")], metrics::render())
}

/// Mints the one request id this call will be known by everywhere: the
/// `X-Request-Id` response header, `RequestContext.request_id` on the audit
/// row, and the `X-Gateway-Request-ID` header sent upstream. Stashed in the
/// request extensions so `proxy_handler` reads the same id instead of a
/// second one being minted downstream.
async fn request_id_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4();
    req.extensions_mut().insert(mcpgate::models::RequestId(req_id));

    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id.to_string()) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("X-XSS-Protection", "1; mode=block".parse().unwrap());
    headers.insert("Cache-Control", "no-store".parse().unwrap());
    headers.insert("Referrer-Policy", "no-referrer".parse().unwrap());
    headers.insert(
        "Permissions-Policy",
        "camera=(), microphone=(), geolocation=()".parse().unwrap(),
    );
    headers.remove("Server");

    resp
}
