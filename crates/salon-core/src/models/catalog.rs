//! Records returned by the identity and catalog collaborators

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Salon branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub name: String,
}

/// Bookable service offered by a salon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonService {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: Decimal,
}

/// Service provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylist {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
}
