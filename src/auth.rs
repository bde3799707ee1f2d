//! Login, registration and logout.
//!
//! A successful login or registration stores the returned token through the
//! session store; listeners (the router among them) pick the change up from
//! there. Nothing here navigates.

use crate::api::ParkingApi;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::request::HttpClient;
use crate::session::{Session, SessionStore};
use parkspot_shared::protocol::{LoginRequest, RegisterRequest};

pub const LOGIN_FAILED: &str = "Invalid email or password";
pub const REGISTRATION_FAILED: &str = "Registration failed";
pub const FILL_ALL_FIELDS: &str = "Fill in all fields";
pub const PASSWORDS_DIFFER: &str = "Passwords do not match";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn new(email: &str, password: &str, confirm_password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
        }
    }

    pub fn validate(&self) -> ClientResult<RegisterRequest> {
        if self.email.trim().is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(ClientError::validation(FILL_ALL_FIELDS));
        }
        if self.password != self.confirm_password {
            return Err(ClientError::validation(PASSWORDS_DIFFER));
        }
        Ok(RegisterRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

pub async fn login<C: HttpClient>(
    api: &ParkingApi<C>,
    email: &str,
    password: &str,
) -> ClientResult<Session> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ClientError::validation(FILL_ALL_FIELDS).in_op("auth.login"));
    }

    let req = LoginRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
    };
    let res = api.send(&req).await.map_err(|e| match e.kind {
        // Whatever the server says, the user sees one message for bad credentials.
        ErrorKind::Auth | ErrorKind::ServerRejection => {
            let status = e.status().unwrap_or(401);
            ClientError::auth(LOGIN_FAILED)
                .with_status(status)
                .in_op("auth.login")
        }
        _ => e.in_op("auth.login"),
    })?;

    let session = api.session().save(&res.token).map_err(|e| e.in_op("auth.login"))?;
    tracing::info!(user_id = session.user_id, "logged in");
    Ok(session)
}

pub async fn register<C: HttpClient>(
    api: &ParkingApi<C>,
    form: &RegistrationForm,
) -> ClientResult<Session> {
    let req = form.validate().map_err(|e| e.in_op("auth.register"))?;

    let res = api.send(&req).await.map_err(|e| {
        if e.kind == ErrorKind::ServerRejection && e.server_message().is_none() {
            let status = e.status().unwrap_or(400);
            ClientError::new(ErrorKind::ServerRejection, REGISTRATION_FAILED)
                .with_status(status)
                .in_op("auth.register")
        } else {
            e.in_op("auth.register")
        }
    })?;

    let session = api.session().save(&res.token).map_err(|e| e.in_op("auth.register"))?;
    tracing::info!(user_id = session.user_id, "registered");
    Ok(session)
}

/// Drop the session. Redirects follow from the store's change notification.
pub fn logout(store: &SessionStore) -> ClientResult<()> {
    store.clear().map_err(|e| e.in_op("auth.logout"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{AppRoute, Router};
    use crate::test_support::{Harness, token, url};
    use parkspot_shared::Role;
    use parkspot_shared::protocol::HttpMethod;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn registration_form_checks_fields_first() {
        let err = RegistrationForm::new("a@b.c", "", "").validate().unwrap_err();
        assert_eq!(err.message(), FILL_ALL_FIELDS);

        let err = RegistrationForm::new("a@b.c", "one", "two").validate().unwrap_err();
        assert_eq!(err.message(), PASSWORDS_DIFFER);

        let req = RegistrationForm::new(" a@b.c ", "pw", "pw").validate().unwrap();
        assert_eq!(req.email, "a@b.c");
    }

    #[tokio::test]
    async fn login_stores_token_and_router_can_land_on_booking() {
        let h = Harness::new();
        let router = Router::new(Rc::clone(&h.store), "/login");
        h.http().mock_response(
            HttpMethod::Post,
            &url("/api/login"),
            200,
            json!({ "token": token(5, Role::User), "user": { "id": 5, "email": "a@b.c", "account_type": "user" } }),
        );

        let session = login(&h.api, "a@b.c", "secret").await.unwrap();
        assert_eq!(session.user_id, 5);
        assert!(h.store.is_authenticated());

        let sent = h.http().last(HttpMethod::Post, &url("/api/login")).unwrap();
        assert_eq!(sent.json_body(), Some(json!({ "email": "a@b.c", "password": "secret" })));
        assert!(!sent.headers.contains_key("Authorization"));

        assert_eq!(
            router.navigate_to(AppRoute::login_success_redirect()),
            AppRoute::Booking
        );
    }

    #[tokio::test]
    async fn bad_credentials_show_one_message() {
        let h = Harness::new();
        h.http().mock_text(HttpMethod::Post, &url("/api/login"), 401, "Invalid credentials");

        let err = login(&h.api, "a@b.c", "wrong").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.message(), LOGIN_FAILED);
        assert!(!h.store.is_authenticated());
    }

    #[tokio::test]
    async fn empty_login_sends_nothing() {
        let h = Harness::new();
        let err = login(&h.api, "  ", "pw").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.http().total(), 0);
    }

    #[tokio::test]
    async fn register_reports_server_message_verbatim() {
        let h = Harness::new();
        let target = url("/api/register");
        h.http().mock_response(HttpMethod::Post, &target, 409, json!({ "message": "User already exists" }));
        h.http().mock_response(HttpMethod::Post, &target, 500, json!({}));

        let form = RegistrationForm::new("a@b.c", "pw", "pw");
        let err = register(&h.api, &form).await.unwrap_err();
        assert_eq!(err.message(), "User already exists");

        let err = register(&h.api, &form).await.unwrap_err();
        assert_eq!(err.message(), REGISTRATION_FAILED);
    }

    #[tokio::test]
    async fn register_then_logout() {
        let h = Harness::new();
        h.http().mock_response(
            HttpMethod::Post,
            &url("/api/register"),
            200,
            json!({ "token": token(9, Role::User) }),
        );

        let form = RegistrationForm::new("new@b.c", "pw", "pw");
        let session = register(&h.api, &form).await.unwrap();
        assert_eq!(session.role, Role::User);

        logout(&h.store).unwrap();
        assert!(!h.store.is_authenticated());
    }

    #[tokio::test]
    async fn mismatched_passwords_never_reach_the_server() {
        let h = Harness::new();
        let form = RegistrationForm::new("a@b.c", "one", "two");
        assert!(register(&h.api, &form).await.unwrap_err().is_validation());
        assert_eq!(h.http().total(), 0);
    }
}
