use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Permission tier of a console user.
///
/// Producers disagree on casing (`"admin"` vs `"ADMIN"`), so parsing is
/// case-insensitive and the enum is the only representation used past the
/// decode boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Accountant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Accountant => "ACCOUNTANT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("admin") {
            Ok(Role::Admin)
        } else if trimmed.eq_ignore_ascii_case("accountant") {
            Ok(Role::Accountant)
        } else {
            Err(UnknownRole(value.to_string()))
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(alias = "_id", deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn id_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(value) => value,
        RawId::Number(value) => value.to_string(),
    })
}

/// Envelope every backend endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn empty_success() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    pub token: String,
    pub user: UserRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Shape of a failed response body; either field may carry the reason.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" Accountant ".parse::<Role>(), Ok(Role::Accountant));
        assert!("librarian".parse::<Role>().is_err());
    }

    #[test]
    fn user_record_accepts_numeric_ids_and_mixed_case_roles() {
        let user: UserRecord = serde_json::from_value(json!({
            "id": 7,
            "email": "bursar@school.test",
            "role": "accountant",
            "created_at": "2024-01-15T08:30:00Z"
        }))
        .expect("decode user");

        assert_eq!(user.id, "7");
        assert_eq!(user.role, Role::Accountant);
        assert!(user.created_at.is_some());

        let encoded = serde_json::to_value(&user).expect("encode user");
        assert_eq!(encoded["role"], "ACCOUNTANT");
    }

    #[test]
    fn unknown_role_is_a_decode_error() {
        let result = serde_json::from_value::<UserRecord>(json!({
            "id": "u1",
            "email": "x@school.test",
            "role": "janitor"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn change_password_uses_camel_case_fields() {
        let payload = ChangePasswordRequest {
            current_password: "old".into(),
            new_password: "new".into(),
        };
        let encoded = serde_json::to_value(&payload).expect("encode");
        assert_eq!(encoded, json!({"currentPassword": "old", "newPassword": "new"}));
    }

    #[test]
    fn error_body_prefers_message_over_error() {
        let body: ErrorBody =
            serde_json::from_value(json!({"message": "Invalid email", "error": "Bad Request"}))
                .expect("decode");
        assert_eq!(body.into_message().as_deref(), Some("Invalid email"));

        let body: ErrorBody = serde_json::from_value(json!({"error": "  "})).expect("decode");
        assert_eq!(body.into_message(), None);
    }
}
