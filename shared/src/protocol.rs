use crate::{AdminBooking, BookingId, Role, SpotNumber, UserId, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// HTTP Methods for API Requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a JSON body.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

/// Credentials an endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    Public,
    Bearer,
    /// Bearer token of an admin account. The server re-validates the role.
    Admin,
}

impl AuthScope {
    pub fn needs_token(&self) -> bool {
        !matches!(self, AuthScope::Public)
    }

    /// 客户端在发送前就要求会话角色为管理员
    pub fn needs_admin(&self) -> bool {
        matches!(self, AuthScope::Admin)
    }
}

/// A trait that defines the request-response relationship and metadata for an API endpoint.
pub trait ApiRequest: Serialize {
    /// The response type returned by this request.
    type Response: DeserializeOwned;
    /// The URL path (or prefix, for endpoints addressed by id).
    const PATH: &'static str;
    /// The HTTP method.
    const METHOD: HttpMethod;
    /// The credentials the endpoint requires.
    const AUTH: AuthScope;

    /// Concrete path of this request. Endpoints addressed by id override it.
    fn path(&self) -> String {
        Self::PATH.to_string()
    }
}

// =========================================================
// 通用响应体 (Generic Bodies)
// =========================================================

/// Body of mutation endpoints that answer `{}` or `{"success":..,"message":..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error payload some endpoints attach to non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

// =========================================================
// 请求定义: 鉴权 (Auth)
// =========================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

impl ApiRequest for LoginRequest {
    type Response = LoginResponse;
    const PATH: &'static str = "/api/login";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthScope = AuthScope::Public;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub token: String,
}

impl ApiRequest for RegisterRequest {
    type Response = RegisterResponse;
    const PATH: &'static str = "/api/register";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthScope = AuthScope::Public;
}

// =========================================================
// 请求定义: 预订 (Booking)
// =========================================================

/// List the currently occupied spots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupiedSpotsRequest;

/// Spot numbers are kept raw so that one bad entry does not void the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OccupiedSpotsResponse {
    #[serde(rename = "occupiedSpots", default)]
    pub occupied_spots: Option<Vec<i64>>,
}

impl ApiRequest for OccupiedSpotsRequest {
    type Response = OccupiedSpotsResponse;
    const PATH: &'static str = "/api/bookings";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthScope = AuthScope::Bearer;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub parking_spot: SpotNumber,
    pub car_number: String,
    pub hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    pub end_time: DateTime<Utc>,
}

impl ApiRequest for CreateBookingRequest {
    type Response = CreateBookingResponse;
    const PATH: &'static str = "/api/booking";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthScope = AuthScope::Bearer;
}

// =========================================================
// 请求定义: 管理 (Admin)
// =========================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBookingsRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminBookingsResponse {
    #[serde(default)]
    pub bookings: Option<Vec<AdminBooking>>,
}

impl ApiRequest for AdminBookingsRequest {
    type Response = AdminBookingsResponse;
    const PATH: &'static str = "/api/admin/bookings";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthScope = AuthScope::Admin;
}

/// Cancel a booking. The id travels in the path, the body is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(skip)]
    pub id: BookingId,
}

impl ApiRequest for CancelBookingRequest {
    type Response = Ack;
    const PATH: &'static str = "/api/admin/bookings";
    const METHOD: HttpMethod = HttpMethod::Delete;
    const AUTH: AuthScope = AuthScope::Admin;

    fn path(&self) -> String {
        format!("{}/{}", Self::PATH, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedSpotsRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockedSpotsResponse {
    #[serde(rename = "blockedSpots", default)]
    pub blocked_spots: Option<Vec<i64>>,
}

impl ApiRequest for BlockedSpotsRequest {
    type Response = BlockedSpotsResponse;
    const PATH: &'static str = "/api/admin/blocked-spots";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthScope = AuthScope::Admin;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSpotBlockRequest {
    pub spot_number: SpotNumber,
}

impl ApiRequest for ToggleSpotBlockRequest {
    type Response = Ack;
    const PATH: &'static str = "/api/admin/spots/toggle-block";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthScope = AuthScope::Admin;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUsersRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminUsersResponse {
    #[serde(default)]
    pub users: Option<Vec<UserRecord>>,
}

impl ApiRequest for AdminUsersRequest {
    type Response = AdminUsersResponse;
    const PATH: &'static str = "/api/admin/users";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthScope = AuthScope::Admin;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRoleRequest {
    #[serde(skip)]
    pub id: UserId,
    pub role: Role,
}

impl ApiRequest for UpdateUserRoleRequest {
    type Response = Ack;
    const PATH: &'static str = "/api/admin/users";
    const METHOD: HttpMethod = HttpMethod::Put;
    const AUTH: AuthScope = AuthScope::Admin;

    fn path(&self) -> String {
        format!("{}/{}/role", Self::PATH, self.id)
    }
}
