use std::sync::Arc;

use crate::domain::ports::{ImageGenerator, Mailer};
use crate::frameworks::config::Config;
use crate::frameworks::db;
use crate::interface_adapters::analytics::CsvAnalytics;
use crate::interface_adapters::clients::{
    ApiMailer, GoogleOAuthClient, LogMailer, MockGenerator, StabilityClient,
};
use crate::interface_adapters::pg::PgStore;
use crate::interface_adapters::routes;
use crate::interface_adapters::state::{AppState, SystemClock};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

fn build_generator(config: &Config) -> Arc<dyn ImageGenerator> {
    match config.ai_provider.as_str() {
        "stability" => match &config.stability_api_key {
            Some(key) => Arc::new(StabilityClient::new(key.clone())),
            None => {
                tracing::warn!("AI_PROVIDER=stability but STABILITY_API_KEY is unset, using mock");
                Arc::new(MockGenerator)
            }
        },
        other => {
            if other != "mock" {
                tracing::warn!(provider = other, "unknown AI_PROVIDER, using mock");
            }
            Arc::new(MockGenerator)
        }
    }
}

fn build_mailer(config: &Config) -> Arc<dyn Mailer> {
    match (&config.email_api_key, &config.email_sender) {
        (Some(key), Some(sender)) => Arc::new(ApiMailer::new(key.clone(), sender.clone())),
        _ => {
            tracing::warn!("email delivery not configured, codes will be logged instead");
            Arc::new(LogMailer)
        }
    }
}

pub async fn run() {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return;
        }
    };

    let pool = match db::connect_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            return;
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        return;
    }

    for dir in [&config.upload_dir, &config.analytics_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::error!(path = %dir.display(), error = %e, "failed to create directory");
            return;
        }
    }

    let store = Arc::new(PgStore::new(pool));
    let generator = build_generator(&config);
    let mailer = build_mailer(&config);
    tracing::info!(
        provider = generator.name(),
        google_oauth = config.google_oauth_configured(),
        "integrations wired"
    );

    let oauth = Arc::new(GoogleOAuthClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.google_redirect_uri.clone(),
    ));
    let analytics = Arc::new(CsvAnalytics::new(config.analytics_dir.clone()));

    let addr = config.listen_addr;
    let state = AppState {
        clock: Arc::new(SystemClock),
        users: store.clone(),
        guests: store.clone(),
        tokens: store.clone(),
        usage: store,
        mailer,
        generator,
        oauth,
        analytics,
        config: Arc::new(config),
    };

    let app = routes::app(state);

    tracing::info!(%addr, "listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
    }
}
