use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Identity handed over by the auth middleware. Role is kept as the raw claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Management,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Management => write!(f, "management"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "management" | "admin" => Ok(Role::Management),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// An authenticated caller of the scheduling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn patient(id: Uuid) -> Self {
        Self::new(id, Role::Patient)
    }

    pub fn doctor(id: Uuid) -> Self {
        Self::new(id, Role::Doctor)
    }

    pub fn management(id: Uuid) -> Self {
        Self::new(id, Role::Management)
    }
}

impl TryFrom<&User> for Actor {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Forbidden("User id is not a valid identifier".to_string()))?;
        let role = user.role.as_deref()
            .ok_or_else(|| AppError::Forbidden("User has no role".to_string()))?
            .parse::<Role>()
            .map_err(AppError::Forbidden)?;

        Ok(Actor { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Option<&str>) -> User {
        User {
            id: id.to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn admin_claim_maps_to_management() {
        let id = Uuid::new_v4();
        let actor = Actor::try_from(&user(&id.to_string(), Some("admin"))).unwrap();
        assert_eq!(actor, Actor::management(id));
    }

    #[test]
    fn role_parsing_ignores_case() {
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert!("receptionist".parse::<Role>().is_err());
    }

    #[test]
    fn actor_requires_uuid_and_role() {
        assert!(Actor::try_from(&user("not-a-uuid", Some("patient"))).is_err());
        assert!(Actor::try_from(&user(&Uuid::new_v4().to_string(), None)).is_err());
    }
}
