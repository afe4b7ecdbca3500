use serde::{Deserialize, Serialize};

use super::OperatingWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub window: OperatingWindow,
    pub retired: bool,
}
