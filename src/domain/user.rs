//! User domain model

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a user within a school
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    SchoolAdmin,
    Teacher,
    Student,
    Parent,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "SCHOOL_ADMIN" => Ok(Role::SchoolAdmin),
            "TEACHER" => Ok(Role::Teacher),
            "STUDENT" => Ok(Role::Student),
            "PARENT" => Ok(Role::Parent),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "SUPER_ADMIN"),
            Role::SchoolAdmin => write!(f, "SCHOOL_ADMIN"),
            Role::Teacher => write!(f, "TEACHER"),
            Role::Student => write!(f, "STUDENT"),
            Role::Parent => write!(f, "PARENT"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for Role {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for Role {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for Role {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = self.to_string();
        <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s, buf)
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "disabled" => Ok(UserStatus::Disabled),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for UserStatus {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for UserStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for UserStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = self.to_string();
        <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s, buf)
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: StringUuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub school_id: StringUuid,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for provisioning a new user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub school_id: StringUuid,
}
