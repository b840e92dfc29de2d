use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::domain::errors::GenerationError;
use crate::domain::ports::{ImageGenerator, Mailer, OAuthProvider, OAuthUserInfo};
use crate::domain::prompt::PromptPlan;

// The clients defined here are reqwest wrappers for external services.

const STABILITY_BASE: &str = "https://api.stability.ai";
const STABILITY_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";

// Provider used when no real backend is configured: echoes the upload so the
// rest of the pipeline stays exercisable.
pub struct MockGenerator;

#[async_trait]
impl ImageGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn restyle(
        &self,
        image: Vec<u8>,
        _filename: &str,
        _plan: &PromptPlan,
    ) -> Result<Vec<u8>, GenerationError> {
        Ok(image)
    }
}

// Thin wrapper around the Stability image-to-image endpoint.
pub struct StabilityClient {
    http: Client,
    api_key: String,
}

impl StabilityClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StabilityArtifact {
    base64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StabilityResponse {
    #[serde(default)]
    artifacts: Vec<StabilityArtifact>,
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[async_trait]
impl ImageGenerator for StabilityClient {
    fn name(&self) -> &'static str {
        "stability"
    }

    async fn restyle(
        &self,
        image: Vec<u8>,
        filename: &str,
        plan: &PromptPlan,
    ) -> Result<Vec<u8>, GenerationError> {
        let part = multipart::Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let form = multipart::Form::new()
            .part("init_image", part)
            .text("image_strength", plan.image_strength.to_string())
            .text("steps", plan.steps.to_string())
            .text("cfg_scale", plan.cfg_scale.to_string())
            .text("samples", "1")
            .text("output_format", "png")
            .text("text_prompts[0][text]", plan.positive.clone())
            .text("text_prompts[0][weight]", "1")
            .text("text_prompts[1][text]", plan.negative.clone())
            .text("text_prompts[1][weight]", "-1");

        let url = format!("{STABILITY_BASE}/v1/generation/{STABILITY_ENGINE}/image-to-image");
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = res.status();
        let is_json = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        if is_json {
            let payload: StabilityResponse = res
                .json()
                .await
                .map_err(|e| GenerationError::Transport(e.to_string()))?;
            let encoded = payload
                .artifacts
                .into_iter()
                .find_map(|a| a.base64)
                .ok_or_else(|| GenerationError::EmptyResult("no artifacts".to_string()))?;
            BASE64
                .decode(encoded)
                .map_err(|e| GenerationError::EmptyResult(e.to_string()))
        } else {
            let bytes = res
                .bytes()
                .await
                .map_err(|e| GenerationError::Transport(e.to_string()))?;
            Ok(bytes.to_vec())
        }
    }
}

// Google OAuth redirect-flow client.
pub struct GoogleOAuthClient {
    http: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            client_id,
            client_secret,
            redirect_uri: redirect_uri.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn authorize_url(&self, state: &str) -> String {
        let mut url = Url::parse("https://accounts.google.com/o/oauth2/v2/auth")
            .expect("static url is valid");
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_deref().unwrap_or_default())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthUserInfo, String> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_deref().unwrap_or_default()),
            (
                "client_secret",
                self.client_secret.as_deref().unwrap_or_default(),
            ),
            ("redirect_uri", &self.redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        let res = self
            .http
            .post("https://oauth2.googleapis.com/token")
            .form(&params)
            .send()
            .await
            .map_err(|e| format!("token exchange transport error: {e}"))?;
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(format!("token exchange failed: {body}"));
        }
        let token: GoogleTokenResponse = res
            .json()
            .await
            .map_err(|e| format!("token decode error: {e}"))?;
        let access_token = token.access_token.ok_or("no access token")?;

        let res = self
            .http
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| format!("userinfo transport error: {e}"))?;
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(format!("failed to fetch userinfo: {body}"));
        }
        let info: GoogleUserInfo = res
            .json()
            .await
            .map_err(|e| format!("userinfo decode error: {e}"))?;
        let email = info.email.filter(|e| !e.is_empty()).ok_or("no email")?;

        Ok(OAuthUserInfo {
            email,
            email_verified: info.email_verified,
        })
    }
}

// Transactional-email HTTP API adapter.
pub struct ApiMailer {
    http: Client,
    api_key: String,
    sender: String,
}

impl ApiMailer {
    pub fn new(api_key: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            sender: sender.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody<'a> {
    sender: EmailAddress<'a>,
    to: Vec<EmailAddress<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

#[async_trait]
impl Mailer for ApiMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), String> {
        let body = SendEmailBody {
            sender: EmailAddress { email: &self.sender },
            to: vec![EmailAddress { email: to }],
            subject,
            html_content: html,
        };
        let res = self
            .http
            .post("https://api.brevo.com/v3/smtp/email")
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("email transport error: {e}"))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("email upstream error {status}: {body}"));
        }
        Ok(())
    }
}

// Dev fallback: logs the message instead of sending when no email API is
// configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), String> {
        info!(%to, %subject, body = %html, "email (dev mode, not sent)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_authorize_url_is_built_then_state_and_scope_are_encoded() {
        let client = GoogleOAuthClient::new(
            Some("client-1".to_string()),
            Some("secret".to_string()),
            "http://127.0.0.1:8000/auth/google/callback",
        );

        let url = client.authorize_url("xyz");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("scope=openid+email+profile"));
    }

    #[test]
    fn when_oauth_credentials_are_missing_then_client_reports_unconfigured() {
        let client = GoogleOAuthClient::new(None, None, "http://localhost/cb");

        assert!(!client.is_configured());
    }

    #[test]
    fn when_filename_has_jpeg_extension_then_jpeg_mime_is_used() {
        assert_eq!(mime_for("room.JPG"), "image/jpeg");
        assert_eq!(mime_for("room.png"), "image/png");
        assert_eq!(mime_for("room"), "image/png");
    }
}
