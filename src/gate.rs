//! Routes and the auth gate.
//!
//! [`AuthGate::require`] is a pure function of the session; [`Router`] keeps
//! the current route and re-runs the gate whenever the session store changes.

use crate::session::{Session, SessionStore, SubscriptionId};
use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppRoute {
    #[default]
    Home,
    Map,
    Booking,
    Login,
    Register,
    Admin,
    NotFound,
}

impl AppRoute {
    pub fn from_path(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        match path {
            "" => Self::Home,
            "/map" => Self::Map,
            "/booking" => Self::Booking,
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/admin" => Self::Admin,
            _ => Self::NotFound,
        }
    }

    pub fn to_path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Map => "/map",
            Self::Booking => "/booking",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Admin => "/admin",
            Self::NotFound => "/404",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Booking | Self::Admin)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn auth_failure_redirect() -> Self {
        Self::Login
    }

    /// Where a signed-in user without the admin role is sent.
    pub fn forbidden_redirect() -> Self {
        Self::Home
    }

    pub fn login_success_redirect() -> Self {
        Self::Booking
    }

    pub fn register_success_redirect() -> Self {
        Self::Home
    }
}

impl Display for AppRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Permit,
    Redirect(AppRoute),
}

impl Access {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Access::Permit)
    }
}

pub struct AuthGate;

impl AuthGate {
    pub fn require(session: Option<&Session>, route: &AppRoute) -> Access {
        if !route.requires_auth() {
            return Access::Permit;
        }
        match session {
            None => Access::Redirect(AppRoute::auth_failure_redirect()),
            Some(s) if route.requires_admin() && !s.is_admin() => {
                Access::Redirect(AppRoute::forbidden_redirect())
            }
            Some(_) => Access::Permit,
        }
    }

    /// Gate against the store's current session.
    pub fn check(store: &SessionStore, route: &AppRoute) -> Access {
        let access = Self::require(store.load().as_ref(), route);
        if let Access::Redirect(target) = &access {
            tracing::info!(%route, %target, "access denied, redirecting");
        }
        access
    }
}

/// 持有当前挂载的路由
///
/// 所有导航都经过门禁。路由器监听会话存储，会话不再允许时立即离开受保护路由。
pub struct Router {
    store: Rc<SessionStore>,
    current: RefCell<AppRoute>,
    history: RefCell<Vec<AppRoute>>,
    subscription: Cell<Option<SubscriptionId>>,
}

impl Router {
    pub fn new(store: Rc<SessionStore>, initial_path: &str) -> Rc<Self> {
        let router = Rc::new(Self {
            store: Rc::clone(&store),
            current: RefCell::new(AppRoute::default()),
            history: RefCell::new(Vec::new()),
            subscription: Cell::new(None),
        });
        router.navigate(initial_path);

        let weak: Weak<Router> = Rc::downgrade(&router);
        let id = store.on_change(move |session| {
            if let Some(router) = weak.upgrade() {
                router.on_session_change(session);
            }
        });
        router.subscription.set(Some(id));
        router
    }

    pub fn current(&self) -> AppRoute {
        self.current.borrow().clone()
    }

    /// Routes visited so far, the current one last.
    pub fn history(&self) -> Vec<AppRoute> {
        self.history.borrow().clone()
    }

    /// Navigate to a path and return the route actually mounted.
    pub fn navigate(&self, path: &str) -> AppRoute {
        self.navigate_to(AppRoute::from_path(path))
    }

    pub fn navigate_to(&self, target: AppRoute) -> AppRoute {
        let landed = match AuthGate::check(&self.store, &target) {
            Access::Permit => target,
            Access::Redirect(redirect) => redirect,
        };
        self.push(landed.clone());
        landed
    }

    /// Return to the previous route, re-checked against the current session.
    pub fn back(&self) -> AppRoute {
        let previous = {
            let mut history = self.history.borrow_mut();
            if history.len() > 1 {
                history.pop();
            }
            history.last().cloned().unwrap_or_default()
        };
        let landed = match AuthGate::check(&self.store, &previous) {
            Access::Permit => previous,
            Access::Redirect(redirect) => redirect,
        };
        self.replace(landed.clone());
        landed
    }

    fn on_session_change(&self, session: Option<&Session>) {
        let route = self.current();
        if let Access::Redirect(target) = AuthGate::require(session, &route) {
            tracing::info!(%route, %target, "session changed, leaving protected route");
            self.push(target);
        }
    }

    fn push(&self, route: AppRoute) {
        self.history.borrow_mut().push(route.clone());
        *self.current.borrow_mut() = route;
    }

    fn replace(&self, route: AppRoute) {
        {
            let mut history = self.history.borrow_mut();
            match history.last_mut() {
                Some(last) => *last = route.clone(),
                None => history.push(route.clone()),
            }
        }
        *self.current.borrow_mut() = route;
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
    }
}
