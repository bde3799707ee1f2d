//! Admin console: users, active bookings and blocked spots.
//!
//! Each panel loads on mount and reloads only after one of its mutations
//! succeeds. Nothing is updated optimistically. A control is busy for the
//! length of its own request; different controls run side by side.

use crate::api::ParkingApi;
use crate::availability::AvailabilityFetcher;
use crate::error::ClientResult;
use crate::gate::{Access, AppRoute, AuthGate};
use crate::request::HttpClient;
use parkspot_shared::protocol::{
    Ack, AdminBookingsRequest, AdminBookingsResponse, AdminUsersRequest, AdminUsersResponse,
    ApiRequest, BlockedSpotsRequest, BlockedSpotsResponse, CancelBookingRequest,
    ToggleSpotBlockRequest, UpdateUserRoleRequest,
};
use parkspot_shared::{AdminBooking, BookingId, SpotBoard, SpotNumber, UserId, UserRecord};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;
use std::rc::Rc;

pub const CANCEL_FAILED: &str = "Failed to cancel the booking";
pub const ROLE_CHANGE_FAILED: &str = "Failed to change the user role";
pub const SPOT_TOGGLE_FAILED: &str = "Failed to change the spot status";
pub const ADMIN_REQUIRED: &str = "Admin access required";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The same control already has a request in flight.
    Ignored,
    Done(String),
    Failed(String),
    Unauthorized,
}

/// One clickable control of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    UserRole(UserId),
    CancelBooking(BookingId),
    SpotBlock(SpotNumber),
}

// =========================================================
// 面板 (Panel)
// =========================================================

struct Panel<T, K> {
    items: RefCell<Vec<T>>,
    in_flight: RefCell<HashSet<K>>,
}

impl<T: Clone, K: Eq + Hash + Copy> Panel<T, K> {
    fn new() -> Self {
        Self {
            items: RefCell::new(Vec::new()),
            in_flight: RefCell::new(HashSet::new()),
        }
    }

    fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    fn replace(&self, items: Vec<T>) {
        *self.items.borrow_mut() = items;
    }

    /// Mark `key` busy. `false` when it already was.
    fn begin(&self, key: K) -> bool {
        self.in_flight.borrow_mut().insert(key)
    }

    fn finish(&self, key: &K) {
        self.in_flight.borrow_mut().remove(key);
    }

    fn is_busy(&self, key: &K) -> bool {
        self.in_flight.borrow().contains(key)
    }
}

// =========================================================
// 管理控制台 (Console)
// =========================================================

pub struct AdminConsole<C: HttpClient> {
    api: Rc<ParkingApi<C>>,
    availability: Option<Rc<AvailabilityFetcher<C>>>,
    users: Panel<UserRecord, UserId>,
    bookings: Panel<AdminBooking, BookingId>,
    blocked: Panel<SpotNumber, SpotNumber>,
    notice: RefCell<Option<Notice>>,
    mounted: Cell<bool>,
}

impl<C: HttpClient> AdminConsole<C> {
    pub fn new(api: Rc<ParkingApi<C>>) -> Self {
        Self {
            api,
            availability: None,
            users: Panel::new(),
            bookings: Panel::new(),
            blocked: Panel::new(),
            notice: RefCell::new(None),
            mounted: Cell::new(false),
        }
    }

    /// Also refresh this availability snapshot after a cancellation.
    pub fn with_availability(mut self, availability: Rc<AvailabilityFetcher<C>>) -> Self {
        self.availability = Some(availability);
        self
    }

    /// Gate the view, then load all three panels concurrently.
    pub async fn mount(&self) -> Access {
        if let Access::Redirect(target) = AuthGate::check(self.api.session(), &AppRoute::Admin) {
            return Access::Redirect(target);
        }

        self.mounted.set(true);
        let (users, bookings, blocked) =
            futures::join!(self.load_users(), self.load_bookings(), self.load_blocked());

        if users.is_err() || bookings.is_err() || blocked.is_err() {
            tracing::info!("admin console lost its session");
            self.mounted.set(false);
            return Access::Redirect(AppRoute::auth_failure_redirect());
        }
        Access::Permit
    }

    pub fn unmount(&self) {
        self.mounted.set(false);
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.users.items()
    }

    pub fn bookings(&self) -> Vec<AdminBooking> {
        self.bookings.items()
    }

    pub fn blocked_spots(&self) -> BTreeSet<SpotNumber> {
        self.blocked.items().into_iter().collect()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice.borrow().clone()
    }

    pub fn clear_notice(&self) {
        *self.notice.borrow_mut() = None;
    }

    pub fn is_busy(&self, control: Control) -> bool {
        match control {
            Control::UserRole(id) => self.users.is_busy(&id),
            Control::CancelBooking(id) => self.bookings.is_busy(&id),
            Control::SpotBlock(spot) => self.blocked.is_busy(&spot),
        }
    }

    /// All 16 spots: blocked ones, then spots held by active bookings.
    pub fn spot_board(&self) -> SpotBoard {
        let occupied: BTreeSet<SpotNumber> = self
            .bookings
            .items
            .borrow()
            .iter()
            .map(|b| b.parking_spot)
            .collect();
        SpotBoard::from_snapshots(&occupied, &self.blocked_spots())
    }

    fn set_notice(&self, notice: Notice) {
        *self.notice.borrow_mut() = Some(notice);
    }

    // --- 列表加载 ---

    /// Fetch one list into its panel. A failure leaves the panel empty with a
    /// notice; only auth errors are returned.
    async fn load<R, T, K>(
        &self,
        panel: &Panel<T, K>,
        req: R,
        what: &str,
        extract: impl FnOnce(R::Response) -> Vec<T>,
    ) -> ClientResult<()>
    where
        R: ApiRequest,
        T: Clone,
        K: Eq + Hash + Copy,
    {
        let result = self.api.send(&req).await;
        if !self.mounted.get() {
            tracing::debug!(what, "discarding response for unmounted admin console");
            return Ok(());
        }

        match result {
            Ok(res) => {
                let items = extract(res);
                tracing::debug!(what, count = items.len(), "admin list loaded");
                panel.replace(items);
                Ok(())
            }
            Err(e) if e.is_auth() => {
                panel.replace(Vec::new());
                Err(e)
            }
            Err(e) => {
                tracing::warn!(what, error = %e, "admin list unavailable");
                panel.replace(Vec::new());
                self.set_notice(Notice::error(format!("Could not load {}", what)));
                Ok(())
            }
        }
    }

    pub async fn load_users(&self) -> ClientResult<()> {
        self.load(&self.users, AdminUsersRequest, "users", |res: AdminUsersResponse| {
            res.users.unwrap_or_default()
        })
        .await
    }

    pub async fn load_bookings(&self) -> ClientResult<()> {
        self.load(&self.bookings, AdminBookingsRequest, "bookings", |res: AdminBookingsResponse| {
            res.bookings.unwrap_or_default()
        })
        .await
    }

    pub async fn load_blocked(&self) -> ClientResult<()> {
        self.load(&self.blocked, BlockedSpotsRequest, "blocked spots", |res: BlockedSpotsResponse| {
            res.blocked_spots
                .unwrap_or_default()
                .into_iter()
                .filter_map(|n| match SpotNumber::new(n) {
                    Ok(spot) => Some(spot),
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring blocked spot from server");
                        None
                    }
                })
                .collect()
        })
        .await
    }

    // --- 变更操作 ---

    /// 变更前重新过一遍门禁：未挂载或会话已不是管理员时不发请求
    fn admit(&self) -> Option<MutationOutcome> {
        if !self.mounted.get() {
            tracing::debug!("admin console not mounted, refusing mutation");
            self.set_notice(Notice::error(ADMIN_REQUIRED));
            return Some(MutationOutcome::Unauthorized);
        }
        if let Access::Redirect(target) = AuthGate::check(self.api.session(), &AppRoute::Admin) {
            tracing::info!(%target, "session no longer admin, refusing mutation");
            self.mounted.set(false);
            self.set_notice(Notice::error(ADMIN_REQUIRED));
            return Some(MutationOutcome::Unauthorized);
        }
        None
    }

    async fn mutate<R, T, K>(
        &self,
        panel: &Panel<T, K>,
        key: K,
        req: R,
        success: String,
        failure: &str,
    ) -> MutationOutcome
    where
        R: ApiRequest<Response = Ack>,
        T: Clone,
        K: Eq + Hash + Copy,
    {
        if let Some(refused) = self.admit() {
            return refused;
        }
        if !panel.begin(key) {
            tracing::debug!(path = %req.path(), "control busy, ignoring");
            return MutationOutcome::Ignored;
        }

        let result = self.api.send(&req).await;
        panel.finish(&key);

        match result {
            Ok(_) => {
                tracing::info!(path = %req.path(), "admin mutation applied");
                self.set_notice(Notice::info(success.clone()));
                MutationOutcome::Done(success)
            }
            Err(e) if e.is_auth() => {
                tracing::info!(error = %e, "admin mutation refused, session no longer valid");
                self.set_notice(Notice::error(e.message()));
                MutationOutcome::Unauthorized
            }
            Err(e) => {
                tracing::warn!(error = %e, "admin mutation failed");
                let text = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| failure.to_string());
                self.set_notice(Notice::error(text.clone()));
                MutationOutcome::Failed(text)
            }
        }
    }

    /// Switch a listed user between `user` and `admin`.
    pub async fn toggle_user_role(&self, id: UserId) -> MutationOutcome {
        if let Some(refused) = self.admit() {
            return refused;
        }
        let current = self
            .users
            .items
            .borrow()
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.role);
        let Some(current) = current else {
            let text = format!("User {} is not listed", id);
            self.set_notice(Notice::error(text.clone()));
            return MutationOutcome::Failed(text);
        };

        let role = current.toggled();
        let outcome = self
            .mutate(
                &self.users,
                id,
                UpdateUserRoleRequest { id, role },
                format!("User role changed to {}", role),
                ROLE_CHANGE_FAILED,
            )
            .await;

        if matches!(outcome, MutationOutcome::Done(_)) && self.load_users().await.is_err() {
            return MutationOutcome::Unauthorized;
        }
        outcome
    }

    pub async fn cancel_booking(&self, id: BookingId) -> MutationOutcome {
        let outcome = self
            .mutate(
                &self.bookings,
                id,
                CancelBookingRequest { id },
                "Booking cancelled".to_string(),
                CANCEL_FAILED,
            )
            .await;

        if matches!(outcome, MutationOutcome::Done(_)) {
            if self.load_bookings().await.is_err() {
                return MutationOutcome::Unauthorized;
            }
            if let Some(availability) = &self.availability {
                if let Err(e) = availability.refresh().await {
                    tracing::warn!(error = %e, "availability refresh after cancellation failed");
                }
            }
        }
        outcome
    }

    pub async fn toggle_spot_block(&self, spot: SpotNumber) -> MutationOutcome {
        let outcome = self
            .mutate(
                &self.blocked,
                spot,
                ToggleSpotBlockRequest { spot_number: spot },
                format!("Spot {} status changed", spot),
                SPOT_TOGGLE_FAILED,
            )
            .await;

        if matches!(outcome, MutationOutcome::Done(_)) && self.load_blocked().await.is_err() {
            return MutationOutcome::Unauthorized;
        }
        outcome
    }
}
