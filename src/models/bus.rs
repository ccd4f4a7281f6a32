use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bus {
    pub id: Uuid,
    pub number: String,
    pub total_seats: i32,
}
