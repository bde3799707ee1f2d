use crate::error::{ClientError, ClientResult};
use crate::request::{HttpClient, HttpRequest, HttpResponse};
use crate::session::SessionStore;
use parkspot_shared::protocol::{ApiRequest, ErrorBody};
use parkspot_shared::{CONTENT_TYPE_JSON, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE};
use std::rc::Rc;

/// Typed client for the parking REST API.
///
/// Bearer endpoints read the token from the session store at send time. With
/// no session the request fails with an auth error before anything goes on
/// the wire; a 401 on a bearer endpoint clears the session.
///
/// 管理员端点在本地会话不是管理员时同样不发送，直接返回鉴权错误。
pub struct ParkingApi<C: HttpClient> {
    base_url: String,
    client: C,
    session: Rc<SessionStore>,
}

impl<C: HttpClient> ParkingApi<C> {
    pub fn new(base_url: impl Into<String>, client: C, session: Rc<SessionStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client,
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> &Rc<SessionStore> {
        &self.session
    }

    pub async fn send<R: ApiRequest>(&self, req: &R) -> ClientResult<R::Response> {
        let path = req.path();
        let mut http = HttpRequest::new(&self.url(&path), R::METHOD);

        if R::AUTH.needs_token() {
            let session = self.session.load().ok_or_else(|| {
                ClientError::auth("not signed in").in_op_with("api.send", path.clone())
            })?;
            if R::AUTH.needs_admin() && !session.is_admin() {
                tracing::warn!(%path, user_id = session.user_id, "admin endpoint refused for non-admin session");
                return Err(ClientError::auth("admin role required").in_op_with("api.send", path));
            }
            http = http.with_header(HEADER_AUTHORIZATION, &session.bearer());
        }

        if R::METHOD.has_body() {
            let body = serde_json::to_value(req).map_err(|e| {
                ClientError::serialization(e.to_string()).in_op_with("api.encode", path.clone())
            })?;
            http = http
                .with_header(HEADER_CONTENT_TYPE, CONTENT_TYPE_JSON)
                .with_body(body);
        }

        tracing::debug!(method = R::METHOD.as_str(), %path, "sending request");
        let res = self
            .client
            .send(http)
            .await
            .map_err(|e| e.in_op_with("api.send", path.clone()))?;

        if res.ok() {
            return res
                .json::<R::Response>()
                .map_err(|e| e.in_op_with("api.decode", path));
        }

        tracing::debug!(status = res.status, %path, "request rejected");

        if res.status == 401 {
            if R::AUTH.needs_token() {
                tracing::warn!(%path, "token rejected by server, clearing session");
                if let Err(e) = self.session.clear() {
                    tracing::warn!(error = %e, "could not clear rejected session");
                }
            }
            let message = server_message(&res).unwrap_or_else(|| "not authorized".to_string());
            return Err(ClientError::auth(message)
                .with_status(401)
                .in_op_with("api.send", path));
        }

        let err = match server_message(&res) {
            Some(message) => ClientError::rejected(res.status, message),
            None => ClientError::rejected_silently(res.status),
        };
        Err(err.in_op_with("api.send", path))
    }
}

/// Message the server attached to an error response.
///
/// A JSON `{"message": ..}` wins; any other JSON body carries no message;
/// a non-JSON body is taken as plain text.
pub fn server_message(res: &HttpResponse) -> Option<String> {
    let body = res.body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::from_value::<ErrorBody>(value)
            .ok()
            .and_then(|b| b.message)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        Err(_) => Some(body.to_string()),
    }
}
