//! Client core for the parking reservation service.
//!
//! - [`session`]: bearer token storage with change notification
//! - [`gate`]: routes, the auth gate and the router
//! - [`availability`]: advisory snapshot of occupied spots
//! - [`booking`]: booking form and submission
//! - [`admin`]: admin panels for users, bookings and blocked spots
//!
//! Everything runs on one thread; components share state through `Rc`.

pub mod admin;
pub mod api;
pub mod auth;
pub mod availability;
pub mod booking;
pub mod config;
pub mod error;
pub mod gate;
pub mod request;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use parkspot_shared as shared;

pub use admin::{AdminConsole, Control, MutationOutcome, Notice};
pub use api::ParkingApi;
pub use availability::{AvailabilityFetcher, RefreshOutcome};
pub use booking::{BookingConfirmation, BookingForm, BookingPhase, BookingSubmitter, SubmitOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ErrorKind};
pub use gate::{Access, AppRoute, AuthGate, Router};
pub use request::{HttpClient, ReqwestHttpClient};
pub use session::{Session, SessionBus, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
