//! Shared fixtures for unit tests.

use crate::api::ParkingApi;
use crate::request::MockHttpClient;
use crate::session::SessionStore;
use crate::storage::MemoryStorage;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use parkspot_shared::{Role, SpotNumber};
use serde_json::json;
use std::rc::Rc;

pub const BASE_URL: &str = "http://parking.test";

pub fn url(path: &str) -> String {
    format!("{}{}", BASE_URL, path)
}

fn sign(claims: serde_json::Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"server-side-secret"),
    )
    .unwrap()
}

pub fn token(user_id: i64, role: Role) -> String {
    sign(json!({
        "sub": user_id,
        "account_type": role,
        "exp": Utc::now().timestamp() + 3600,
    }))
}

pub fn expired_token(user_id: i64, role: Role) -> String {
    sign(json!({
        "sub": user_id,
        "account_type": role,
        "exp": Utc::now().timestamp() - 3600,
    }))
}

pub fn spot(n: i64) -> SpotNumber {
    SpotNumber::new(n).unwrap()
}

/// A session store on fresh memory storage and an API client on a mock transport.
pub struct Harness {
    pub store: Rc<SessionStore>,
    pub api: Rc<ParkingApi<MockHttpClient>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Rc::new(SessionStore::standalone(Rc::new(MemoryStorage::new())));
        let api = Rc::new(ParkingApi::new(
            BASE_URL,
            MockHttpClient::new(),
            Rc::clone(&store),
        ));
        Self { store, api }
    }

    pub fn signed_in(role: Role) -> Self {
        let harness = Self::new();
        harness.store.save(&token(1, role)).unwrap();
        harness
    }

    pub fn http(&self) -> &MockHttpClient {
        self.api.client()
    }
}
