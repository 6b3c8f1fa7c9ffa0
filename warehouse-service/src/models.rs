use diesel::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern a product code must match before any locking or I/O happens.
static PRODUCT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[A-Z0-9]{3}-[A-Z0-9]{3}-[A-Z0-9]{3}-[A-Z0-9]{3}$")
        .expect("product code pattern is a valid regex")
});

/// One entry of an incoming reservation/exemption payload. Only the code is
/// meaningful to the service; the descriptive fields are accepted and echoed
/// back for items that fail validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
}

impl ProductRequest {
    pub fn has_valid_code(&self) -> bool {
        PRODUCT_CODE.is_match(&self.code)
    }
}

/// A fully resolved catalog record. Values of this type only come out of the
/// store, so anything persisted downstream is resolved by construction.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Serialize, Deserialize)]
pub struct Product {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub size: i32,
    pub count: i32,
}

/// A warehouse location. The id is scanned as nullable on purpose: a storage
/// row arriving without an id is a checked failure state, never a valid
/// selection result.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Serialize, Deserialize)]
pub struct Storage {
    pub id: Option<i32>,
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation {
    pub storage_id: i32,
    pub product_id: i32,
}
