use std::net::SocketAddr;
use std::path::PathBuf;

use crate::use_cases::entitlement::LedgerConfig;
use crate::use_cases::register::random_token;

// Explicit runtime configuration, read once at startup and passed down.
// Nothing below this layer touches the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub public_base_url: String,
    pub frontend_base_url: String,

    // "mock" | "stability"
    pub ai_provider: String,
    pub stability_api_key: Option<String>,

    pub jwt_secret: String,
    pub jwt_expire_minutes: i64,

    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: String,

    pub email_api_key: Option<String>,
    pub email_sender: Option<String>,
    pub owner_email: Option<String>,

    pub upload_dir: PathBuf,
    pub analytics_dir: PathBuf,

    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid LISTEN_ADDR: {e}"))?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let frontend_base_url = std::env::var("FRONTEND_BASE_URL")
            .unwrap_or_else(|_| format!("{public_base_url}/web"));

        let ai_provider = std::env::var("AI_PROVIDER")
            .unwrap_or_else(|_| "mock".to_string())
            .to_lowercase();

        // A random per-process secret keeps dev setups working; sessions
        // then do not survive restarts, so production must set JWT_SECRET.
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| random_token());
        let jwt_expire_minutes = std::env::var("JWT_EXPIRE_MIN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(43_200);

        let google_redirect_uri = std::env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{public_base_url}/auth/google/callback"));

        Ok(Self {
            listen_addr,
            database_url,
            public_base_url,
            frontend_base_url,
            ai_provider,
            stability_api_key: non_empty_env("STABILITY_API_KEY"),
            jwt_secret,
            jwt_expire_minutes,
            google_client_id: non_empty_env("GOOGLE_CLIENT_ID"),
            google_client_secret: non_empty_env("GOOGLE_CLIENT_SECRET"),
            google_redirect_uri,
            email_api_key: non_empty_env("EMAIL_API_KEY"),
            email_sender: non_empty_env("EMAIL_SENDER"),
            owner_email: non_empty_env("OWNER_EMAIL"),
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
            analytics_dir: std::env::var("ANALYTICS_DIR")
                .unwrap_or_else(|_| "analytics".to_string())
                .into(),
            ledger: LedgerConfig::default(),
        })
    }

    pub fn google_oauth_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }

    #[cfg(test)]
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            listen_addr: "127.0.0.1:0".parse().expect("expected test addr"),
            database_url: String::new(),
            public_base_url: "http://127.0.0.1:8000".to_string(),
            frontend_base_url: "http://127.0.0.1:8000/web".to_string(),
            ai_provider: "mock".to_string(),
            stability_api_key: None,
            jwt_secret: "test-secret".to_string(),
            jwt_expire_minutes: 43_200,
            google_client_id: None,
            google_client_secret: None,
            google_redirect_uri: "http://127.0.0.1:8000/auth/google/callback".to_string(),
            email_api_key: None,
            email_sender: None,
            owner_email: Some("owner@example.com".to_string()),
            upload_dir,
            analytics_dir: std::env::temp_dir(),
            ledger: LedgerConfig::default(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
