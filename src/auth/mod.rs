//! Authentication and authorization module
//!
//! Bearer JWTs identify the caller for the HIPAA auth check and gate the
//! operator endpoints.

mod jwt;
mod middleware;

pub use jwt::{bearer_claims, create_token, decode_token, Claims};
pub use middleware::{auth_middleware, require_role};

use serde::{Deserialize, Serialize};

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can read usage and catalog data
    #[default]
    Viewer,
    /// Can make governed AI calls
    Clinician,
    /// Can flip the emergency breaker
    Admin,
}

impl Role {
    pub fn can_chat(&self) -> bool {
        matches!(self, Role::Clinician | Role::Admin)
    }

    pub fn can_administer(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Clinician => write!(f, "clinician"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
