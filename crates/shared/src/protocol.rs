use serde::{Deserialize, Serialize};

pub const EPSON_AUTH_PATH: &str = "/api/epson/auth";

/// Body of `POST /api/epson/auth`.
///
/// The page only collects the account email; `password` is always sent as an
/// empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpsonAuthRequest {
    pub email: String,
    pub password: String,
}

impl EpsonAuthRequest {
    pub fn for_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: String::new(),
        }
    }
}
