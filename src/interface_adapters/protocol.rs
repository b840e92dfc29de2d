use serde::{Deserialize, Serialize};

// Simple error envelope for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OkResponse {
    pub fn new() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyLinkQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

// Response payload for a styled image, field names matching the frontend
// contract.
#[derive(Debug, Serialize)]
pub struct StyleResponse {
    #[serde(rename = "styledUrls")]
    pub styled_urls: Vec<String>,
    pub filename: String,
    #[serde(rename = "predictionId")]
    pub prediction_id: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
