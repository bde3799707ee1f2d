//! Booking form and submission.
//!
//! Phases run `Idle -> Validating -> Submitting -> Succeeded | Failed`, and
//! back to `Idle` on [`BookingSubmitter::acknowledge`]. Validation failures
//! return to `Idle` straight away with a reason and send nothing.

use crate::api::ParkingApi;
use crate::availability::AvailabilityFetcher;
use crate::error::{ClientError, ClientResult};
use crate::gate::{Access, AppRoute, AuthGate};
use crate::request::HttpClient;
use chrono::{DateTime, Utc};
use parkspot_shared::protocol::CreateBookingRequest;
use parkspot_shared::{SpotNumber, price};
use std::cell::RefCell;
use std::rc::Rc;

pub const GENERIC_BOOKING_FAILURE: &str = "Booking failed, please try again later";
pub const MISSING_CAR_NUMBER: &str = "Enter the car number";
pub const MISSING_SPOT: &str = "Select a parking spot";
pub const INVALID_HOURS: &str = "Hours must be at least 1";

fn spot_taken(spot: SpotNumber) -> String {
    format!("Spot {} is already occupied", spot)
}

// =========================================================
// 预订表单 (Form)
// =========================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingForm {
    pub car_number: String,
    pub spot: Option<SpotNumber>,
    pub hours: u32,
}

impl BookingForm {
    pub fn new() -> Self {
        Self {
            car_number: String::new(),
            spot: None,
            hours: 1,
        }
    }

    pub fn price(&self) -> u64 {
        price(self.hours)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn to_request(&self) -> ClientResult<CreateBookingRequest> {
        let car_number = self.car_number.trim();
        if car_number.is_empty() {
            return Err(ClientError::validation(MISSING_CAR_NUMBER));
        }
        let Some(spot) = self.spot else {
            return Err(ClientError::validation(MISSING_SPOT));
        };
        if self.hours < 1 {
            return Err(ClientError::validation(INVALID_HOURS));
        }

        Ok(CreateBookingRequest {
            parking_spot: spot,
            car_number: car_number.to_string(),
            hours: self.hours,
        })
    }
}

impl Default for BookingForm {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================
// 提交状态 (Submission State)
// =========================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfirmation {
    pub spot: SpotNumber,
    pub car_number: String,
    pub hours: u32,
    pub price: u64,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BookingPhase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Succeeded(BookingConfirmation),
    Failed(String),
}

impl BookingPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, BookingPhase::Validating | BookingPhase::Submitting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A submission was already in flight.
    Ignored,
    /// Refused before sending.
    Rejected(String),
    Confirmed(BookingConfirmation),
    Failed(String),
    /// The session is gone; the gate takes over.
    Unauthorized,
}

pub struct BookingSubmitter<C: HttpClient> {
    availability: Rc<AvailabilityFetcher<C>>,
    form: RefCell<BookingForm>,
    phase: RefCell<BookingPhase>,
    notice: RefCell<Option<String>>,
}

impl<C: HttpClient> BookingSubmitter<C> {
    pub fn new(availability: Rc<AvailabilityFetcher<C>>) -> Self {
        Self {
            availability,
            form: RefCell::new(BookingForm::new()),
            phase: RefCell::new(BookingPhase::Idle),
            notice: RefCell::new(None),
        }
    }

    fn api(&self) -> &Rc<ParkingApi<C>> {
        self.availability.api()
    }

    pub fn availability(&self) -> &Rc<AvailabilityFetcher<C>> {
        &self.availability
    }

    /// Gate the view, then load the first snapshot.
    pub async fn mount(&self) -> Access {
        if let Access::Redirect(target) = AuthGate::check(self.api().session(), &AppRoute::Booking) {
            return Access::Redirect(target);
        }

        self.availability.mount();
        match self.availability.refresh().await {
            Ok(_) => Access::Permit,
            Err(e) => {
                tracing::info!(error = %e, "booking view lost its session");
                self.availability.unmount();
                Access::Redirect(AppRoute::auth_failure_redirect())
            }
        }
    }

    pub fn unmount(&self) {
        self.availability.unmount();
    }

    pub fn form(&self) -> BookingForm {
        self.form.borrow().clone()
    }

    pub fn phase(&self) -> BookingPhase {
        self.phase.borrow().clone()
    }

    /// Reason the last submission was refused, if it was.
    pub fn notice(&self) -> Option<String> {
        self.notice.borrow().clone()
    }

    pub fn is_submit_disabled(&self) -> bool {
        self.phase.borrow().is_busy()
    }

    pub fn price(&self) -> u64 {
        self.form.borrow().price()
    }

    pub fn set_car_number(&self, car_number: &str) {
        self.form.borrow_mut().car_number = car_number.to_string();
    }

    /// Returns the new price.
    pub fn set_hours(&self, hours: u32) -> ClientResult<u64> {
        if hours < 1 {
            return Err(ClientError::validation(INVALID_HOURS));
        }
        let mut form = self.form.borrow_mut();
        form.hours = hours;
        Ok(form.price())
    }

    /// Spots occupied in the latest snapshot cannot be selected.
    pub fn select_spot(&self, spot: SpotNumber) -> ClientResult<()> {
        if self.availability.is_occupied(spot) {
            return Err(ClientError::validation(spot_taken(spot)));
        }
        self.form.borrow_mut().spot = Some(spot);
        Ok(())
    }

    pub fn clear_spot(&self) {
        self.form.borrow_mut().spot = None;
    }

    /// Leave a finished submission.
    pub fn acknowledge(&self) {
        let mut phase = self.phase.borrow_mut();
        if matches!(*phase, BookingPhase::Succeeded(_) | BookingPhase::Failed(_)) {
            *phase = BookingPhase::Idle;
        }
    }

    fn set_phase(&self, phase: BookingPhase) {
        *self.phase.borrow_mut() = phase;
    }

    fn validate(&self) -> ClientResult<CreateBookingRequest> {
        let req = self.form.borrow().to_request()?;
        if self.availability.is_occupied(req.parking_spot) {
            return Err(ClientError::validation(spot_taken(req.parking_spot)));
        }
        Ok(req)
    }

    pub async fn submit(&self) -> SubmitOutcome {
        if self.phase.borrow().is_busy() {
            tracing::debug!("submission already in flight");
            return SubmitOutcome::Ignored;
        }

        self.set_phase(BookingPhase::Validating);
        *self.notice.borrow_mut() = None;

        let req = match self.validate() {
            Ok(req) => req,
            Err(e) => {
                self.set_phase(BookingPhase::Idle);
                *self.notice.borrow_mut() = Some(e.message().to_string());
                return SubmitOutcome::Rejected(e.message.clone());
            }
        };

        self.set_phase(BookingPhase::Submitting);
        tracing::info!(spot = %req.parking_spot, hours = req.hours, "submitting booking");

        match self.api().send(&req).await {
            Ok(res) => {
                let confirmation = BookingConfirmation {
                    spot: req.parking_spot,
                    car_number: req.car_number,
                    hours: req.hours,
                    price: price(req.hours),
                    end_time: res.end_time,
                };
                tracing::info!(spot = %confirmation.spot, end_time = %confirmation.end_time, "booking confirmed");

                self.form.borrow_mut().reset();

                // 刷新完成前保持 Submitting，提交按钮不可再次点击
                if let Err(e) = self.availability.refresh().await {
                    tracing::warn!(error = %e, "availability refresh after booking failed");
                }
                self.set_phase(BookingPhase::Succeeded(confirmation.clone()));
                SubmitOutcome::Confirmed(confirmation)
            }
            Err(e) if e.is_auth() => {
                tracing::info!(error = %e, "booking refused, session no longer valid");
                self.set_phase(BookingPhase::Idle);
                *self.notice.borrow_mut() = Some(e.message().to_string());
                SubmitOutcome::Unauthorized
            }
            Err(e) => {
                tracing::warn!(error = %e, "booking failed");
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| GENERIC_BOOKING_FAILURE.to_string());
                self.set_phase(BookingPhase::Failed(message.clone()));
                SubmitOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests;
