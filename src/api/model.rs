use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Partial package update carrying only the carousel columns.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct CarouselUpdate {
    pub promoted: bool,
    pub carousel_order: i32,
}

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Deserialize, Debug)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}
