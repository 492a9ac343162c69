//! School (tenant) domain model

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Subscription status of a school
///
/// The gating pipeline only reads this; it is mutated exclusively through
/// administrative updates. Anything that is not `Active` fails the
/// subscription gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchoolStatus {
    #[default]
    Active,
    Inactive,
    Expired,
    Suspended,
}

impl std::str::FromStr for SchoolStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SchoolStatus::Active),
            "inactive" => Ok(SchoolStatus::Inactive),
            "expired" => Ok(SchoolStatus::Expired),
            "suspended" => Ok(SchoolStatus::Suspended),
            _ => Err(format!("Unknown school status: {}", s)),
        }
    }
}

impl std::fmt::Display for SchoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchoolStatus::Active => write!(f, "active"),
            SchoolStatus::Inactive => write!(f, "inactive"),
            SchoolStatus::Expired => write!(f, "expired"),
            SchoolStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for SchoolStatus {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for SchoolStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for SchoolStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = self.to_string();
        <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s, buf)
    }
}

/// School settings stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolSettings {
    /// Feature modules enabled for this school
    #[serde(default)]
    pub modules_enabled: Vec<String>,
    /// Enrollment ceiling for the current plan
    #[serde(default = "default_max_students")]
    pub max_students: u32,
    /// Locale used for generated documents and messages
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_max_students() -> u32 {
    500
}

fn default_locale() -> String {
    "fr".to_string()
}

impl Default for SchoolSettings {
    fn default() -> Self {
        Self {
            modules_enabled: Vec::new(),
            max_students: default_max_students(),
            locale: default_locale(),
        }
    }
}

/// School entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct School {
    pub id: StringUuid,
    pub name: String,
    /// Unique, lowercase DNS label resolved from the request's Host header
    pub subdomain: String,
    #[sqlx(json)]
    pub settings: SchoolSettings,
    pub status: SchoolStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for School {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            name: String::new(),
            subdomain: String::new(),
            settings: SchoolSettings::default(),
            status: SchoolStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for provisioning a new school
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSchoolInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 63), custom(function = "validate_subdomain"))]
    pub subdomain: String,
    pub settings: Option<SchoolSettings>,
}

/// Validate subdomain format (lowercase alphanumeric with hyphens)
fn validate_subdomain(subdomain: &str) -> Result<(), validator::ValidationError> {
    if SUBDOMAIN_REGEX.is_match(subdomain) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_subdomain"))
    }
}

// Regex for subdomain validation
lazy_static::lazy_static! {
    pub static ref SUBDOMAIN_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}
