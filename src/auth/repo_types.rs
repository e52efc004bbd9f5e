use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,                      // assigned by the store
    pub email: String,                // canonical (trimmed, lower-case)
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,             // Argon2 PHC string, never the plaintext
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Insert candidate. `password` is plaintext and is hashed by the store.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Trim and lower-case. Every store operation compares emails in this form.
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}
