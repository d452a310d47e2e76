// Portal session decoded from the bearer token

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::responses::ApplicationStatus;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("session token has expired")]
    Expired,
    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("session token has an invalid expiry")]
    InvalidExpiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    SuperAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Edit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePermission {
    pub module: String,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_edit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    role: Role,
    #[serde(default)]
    permissions: Vec<ModulePermission>,
    #[serde(default)]
    application_status: Option<ApplicationStatus>,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
    pub application_status: Option<ApplicationStatus>,
    pub expires_at: DateTime<Utc>,
    permissions: HashMap<String, ModulePermission>,
}

impl Session {
    /// Read the claims of a portal token. The signature is the backend's
    /// concern; only expiry is checked here.
    pub fn from_token(token: &str) -> Result<Self, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;

        let data = decode::<Claims>(token.trim(), &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e),
            })?;
        let claims = data.claims;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::InvalidExpiry)?;

        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            application_status: claims.application_status,
            expires_at,
            permissions: claims
                .permissions
                .into_iter()
                .map(|p| (p.module.to_ascii_lowercase(), p))
                .collect(),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Super admins pass every check; everyone else needs an explicit grant.
    pub fn can(&self, module: &str, action: Action) -> bool {
        if self.role == Role::SuperAdmin {
            return true;
        }
        match self.permissions.get(&module.to_ascii_lowercase()) {
            Some(p) => match action {
                Action::View => p.can_view,
                Action::Create => p.can_create,
                Action::Edit => p.can_edit,
            },
            None => false,
        }
    }

    pub fn can_view(&self, module: &str) -> bool {
        self.can(module, Action::View)
    }

    pub fn can_create(&self, module: &str) -> bool {
        self.can(module, Action::Create)
    }

    pub fn can_edit(&self, module: &str) -> bool {
        self.can(module, Action::Edit)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub(crate) fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"backend-only-secret"),
        )
        .unwrap()
    }

    pub(crate) fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn decodes_claims_without_the_signing_key() {
        let t = token(json!({
            "sub": "user-17",
            "email": "applicant@example.org",
            "role": "member",
            "applicationStatus": "draft",
            "exp": in_one_hour()
        }));
        let s = Session::from_token(&t).unwrap();
        assert_eq!(s.user_id, "user-17");
        assert_eq!(s.role, Role::Member);
        assert_eq!(s.application_status, Some(ApplicationStatus::Draft));
        assert!(!s.is_expired_at(Utc::now()));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let t = token(json!({
            "sub": "user-17",
            "role": "member",
            "exp": Utc::now().timestamp() - 3600
        }));
        assert!(matches!(Session::from_token(&t), Err(AuthError::Expired)));
    }

    #[test]
    fn garbage_is_an_invalid_token() {
        assert!(matches!(
            Session::from_token("not-a-jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn permissions_are_per_module_and_super_admin_passes_all() {
        let t = token(json!({
            "sub": "admin-2",
            "role": "admin",
            "permissions": [
                { "module": "Events", "canView": true, "canCreate": true },
                { "module": "users", "canView": true }
            ],
            "exp": in_one_hour()
        }));
        let admin = Session::from_token(&t).unwrap();
        assert!(admin.can_create("events"));
        assert!(!admin.can_edit("events"));
        assert!(admin.can_view("Users"));
        assert!(!admin.can_view("reports"));

        let t = token(json!({ "sub": "root", "role": "super_admin", "exp": in_one_hour() }));
        let root = Session::from_token(&t).unwrap();
        assert!(root.can_edit("reports"));
    }
}
