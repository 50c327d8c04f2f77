use classroom_system::{User, UserRole};
use serde::Deserialize;
use thiserror::Error;

/// Query string of a connection request: `/ws?deviceCode=..&main=true`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub device_code: String,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing device code")]
    MissingDeviceCode,
    #[error("unknown role {0:?}")]
    UnknownRole(String),
}

/// Maps connection parameters to a user. The primary device is the teacher.
pub fn authenticate(params: &ConnectParams) -> Result<User, AuthError> {
    let device_code = params.device_code.trim();
    if device_code.is_empty() {
        return Err(AuthError::MissingDeviceCode);
    }
    let role = if params.main {
        UserRole::Teacher
    } else {
        match params.role.as_deref() {
            None | Some("student") => UserRole::Student,
            Some("observer") => UserRole::Observer,
            Some(other) => return Err(AuthError::UnknownRole(other.to_owned())),
        }
    };
    Ok(User::new(device_code, device_code, role))
}
