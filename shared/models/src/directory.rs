use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub org_id: String,
    pub username: String,
    pub emp_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub user_type: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields written by the ESB user-account consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub org_id: String,
    pub username: String,
    pub emp_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub user_type: String,
}

/// Outcome of an account upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitStatusUpdate {
    pub org_id: String,
    pub unit_id: String,
    pub username: Option<String>,
    pub is_login: bool,
    pub status_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub at: DateTime<Utc>,
}
