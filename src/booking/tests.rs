use super::*;
use crate::request::MockHttpClient;
use crate::test_support::{Harness, spot, url};
use parkspot_shared::Role;
use parkspot_shared::protocol::HttpMethod;
use serde_json::json;

const END_TIME: &str = "2024-05-01T12:00:00Z";

fn submitter(h: &Harness) -> BookingSubmitter<MockHttpClient> {
    let availability = Rc::new(AvailabilityFetcher::new(Rc::clone(&h.api)));
    BookingSubmitter::new(availability)
}

fn occupied(h: &Harness, spots: serde_json::Value) {
    h.http()
        .mock_response(HttpMethod::Get, &url("/api/bookings"), 200, json!({ "occupiedSpots": spots }));
}

fn fill(s: &BookingSubmitter<MockHttpClient>, car: &str, n: i64, hours: u32) {
    s.set_car_number(car);
    s.select_spot(spot(n)).unwrap();
    s.set_hours(hours).unwrap();
}

// =========================================================
// 表单 (Form)
// =========================================================

#[test]
fn form_defaults_and_price() {
    let form = BookingForm::default();
    assert_eq!(form.car_number, "");
    assert_eq!(form.spot, None);
    assert_eq!(form.hours, 1);
    assert_eq!(form.price(), 100);
}

#[test]
fn form_trims_car_number() {
    let form = BookingForm {
        car_number: "  X123 ".into(),
        spot: Some(spot(5)),
        hours: 2,
    };
    let req = form.to_request().unwrap();
    assert_eq!(req.car_number, "X123");

    let blank = BookingForm {
        car_number: "   ".into(),
        ..form
    };
    assert_eq!(blank.to_request().unwrap_err().message(), MISSING_CAR_NUMBER);
}

#[test]
fn hours_below_one_are_refused() {
    let h = Harness::signed_in(Role::User);
    let s = submitter(&h);
    assert_eq!(s.set_hours(3).unwrap(), 300);
    assert!(s.set_hours(0).unwrap_err().is_validation());
    assert_eq!(s.form().hours, 3);
    assert_eq!(s.price(), 300);
}

// =========================================================
// 挂载 (Mount)
// =========================================================

#[tokio::test]
async fn mount_without_session_redirects_before_fetching() {
    let h = Harness::new();
    let s = submitter(&h);

    assert_eq!(s.mount().await, Access::Redirect(AppRoute::Login));
    assert_eq!(h.http().total(), 0);
}

#[tokio::test]
async fn mount_redirects_when_server_rejects_token() {
    let h = Harness::signed_in(Role::User);
    h.http().mock_text(HttpMethod::Get, &url("/api/bookings"), 401, "Invalid token");
    let s = submitter(&h);

    assert_eq!(s.mount().await, Access::Redirect(AppRoute::Login));
    assert!(!h.store.is_authenticated());
}

#[tokio::test]
async fn mount_survives_network_failure() {
    let h = Harness::signed_in(Role::User);
    h.http().mock_network_failure(HttpMethod::Get, &url("/api/bookings"));
    let s = submitter(&h);

    assert_eq!(s.mount().await, Access::Permit);
    assert!(s.availability().occupied().is_empty());
    assert!(s.availability().notice().is_some());
    assert!(!s.is_submit_disabled());
}

// =========================================================
// 校验 (Validation)
// =========================================================

#[tokio::test]
async fn occupied_spot_is_refused_without_a_request() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    occupied(&h, json!([3, 7]));
    let s = submitter(&h);
    s.mount().await;

    // Picked while the snapshot was empty; the next snapshot shows it taken.
    fill(&s, "X123", 3, 1);
    s.availability().refresh().await.unwrap();

    let outcome = s.submit().await;
    assert_eq!(outcome, SubmitOutcome::Rejected("Spot 3 is already occupied".into()));
    assert_eq!(s.phase(), BookingPhase::Idle);
    assert_eq!(h.http().count(HttpMethod::Post, &url("/api/booking")), 0);

    assert!(s.select_spot(spot(7)).is_err());
    assert!(s.select_spot(spot(4)).is_ok());
}

#[tokio::test]
async fn missing_fields_never_send() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    let s = submitter(&h);
    s.mount().await;

    assert_eq!(s.submit().await, SubmitOutcome::Rejected(MISSING_CAR_NUMBER.into()));

    s.set_car_number("X123");
    assert_eq!(s.submit().await, SubmitOutcome::Rejected(MISSING_SPOT.into()));
    assert_eq!(s.notice().as_deref(), Some(MISSING_SPOT));

    assert_eq!(h.http().count(HttpMethod::Post, &url("/api/booking")), 0);
}

// =========================================================
// 提交 (Submission)
// =========================================================

#[tokio::test]
async fn successful_booking_resets_form_and_refetches_once() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([3, 7]));
    h.http()
        .mock_response(HttpMethod::Post, &url("/api/booking"), 200, json!({ "endTime": END_TIME }));
    let s = submitter(&h);
    s.mount().await;
    assert_eq!(h.http().count(HttpMethod::Get, &url("/api/bookings")), 1);

    fill(&s, "X123", 5, 2);
    assert_eq!(s.price(), 200);

    let outcome = s.submit().await;
    let SubmitOutcome::Confirmed(confirmation) = outcome else {
        panic!("expected confirmation, got {:?}", outcome);
    };
    assert_eq!(confirmation.spot, spot(5));
    assert_eq!(confirmation.car_number, "X123");
    assert_eq!(confirmation.price, 200);
    assert_eq!(confirmation.end_time.to_rfc3339(), "2024-05-01T12:00:00+00:00");

    let sent = h.http().last(HttpMethod::Post, &url("/api/booking")).unwrap();
    assert_eq!(
        sent.json_body(),
        Some(json!({ "parkingSpot": 5, "carNumber": "X123", "hours": 2 }))
    );

    assert_eq!(s.form(), BookingForm::default());
    assert_eq!(s.price(), 100);
    assert_eq!(s.phase(), BookingPhase::Succeeded(confirmation));
    assert_eq!(h.http().count(HttpMethod::Get, &url("/api/bookings")), 2);

    s.acknowledge();
    assert_eq!(s.phase(), BookingPhase::Idle);
}

#[tokio::test]
async fn second_click_while_submitting_is_ignored() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    h.http()
        .mock_response(HttpMethod::Post, &url("/api/booking"), 200, json!({ "endTime": END_TIME }));
    let s = submitter(&h);
    s.mount().await;
    fill(&s, "X123", 5, 1);

    let (first, second) = futures::join!(s.submit(), async {
        assert!(s.is_submit_disabled());
        s.submit().await
    });

    assert!(matches!(first, SubmitOutcome::Confirmed(_)));
    assert_eq!(second, SubmitOutcome::Ignored);
    assert_eq!(h.http().count(HttpMethod::Post, &url("/api/booking")), 1);
}

#[tokio::test]
async fn click_during_post_booking_refresh_is_ignored() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    occupied(&h, json!([5]));
    h.http()
        .mock_response(HttpMethod::Post, &url("/api/booking"), 200, json!({ "endTime": END_TIME }));
    let s = submitter(&h);
    s.mount().await;
    fill(&s, "X123", 5, 1);

    let (first, second) = futures::join!(s.submit(), async {
        // 等到成功后的刷新请求已经发出
        while h.http().count(HttpMethod::Get, &url("/api/bookings")) < 2 {
            tokio::task::yield_now().await;
        }
        assert!(s.is_submit_disabled());
        s.submit().await
    });

    let SubmitOutcome::Confirmed(confirmation) = first else {
        panic!("expected confirmation, got {:?}", first);
    };
    assert_eq!(second, SubmitOutcome::Ignored);
    assert_eq!(s.phase(), BookingPhase::Succeeded(confirmation));
    assert_eq!(s.notice(), None);
    assert!(s.availability().is_occupied(spot(5)));
    assert_eq!(h.http().count(HttpMethod::Post, &url("/api/booking")), 1);
}

#[tokio::test]
async fn server_message_shown_verbatim_and_form_kept() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    h.http().mock_response(
        HttpMethod::Post,
        &url("/api/booking"),
        409,
        json!({ "message": "Parking spot already booked" }),
    );
    let s = submitter(&h);
    s.mount().await;
    fill(&s, "X123", 5, 2);

    let outcome = s.submit().await;
    assert_eq!(outcome, SubmitOutcome::Failed("Parking spot already booked".into()));
    assert_eq!(s.phase(), BookingPhase::Failed("Parking spot already booked".into()));
    assert_eq!(s.form().car_number, "X123");
    assert_eq!(s.form().spot, Some(spot(5)));
    assert_eq!(s.form().hours, 2);
    // No re-fetch after a failed mutation.
    assert_eq!(h.http().count(HttpMethod::Get, &url("/api/bookings")), 1);
}

#[tokio::test]
async fn silent_failure_uses_generic_message() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    h.http().mock_network_failure(HttpMethod::Post, &url("/api/booking"));
    let s = submitter(&h);
    s.mount().await;
    fill(&s, "X123", 5, 1);

    assert_eq!(s.submit().await, SubmitOutcome::Failed(GENERIC_BOOKING_FAILURE.into()));

    s.acknowledge();
    assert_eq!(s.phase(), BookingPhase::Idle);
    assert_eq!(s.form().spot, Some(spot(5)));
}

#[tokio::test]
async fn expired_session_during_submit_returns_to_idle() {
    let h = Harness::signed_in(Role::User);
    occupied(&h, json!([]));
    h.http().mock_text(HttpMethod::Post, &url("/api/booking"), 401, "Invalid token");
    let s = submitter(&h);
    s.mount().await;
    fill(&s, "X123", 5, 1);

    assert_eq!(s.submit().await, SubmitOutcome::Unauthorized);
    assert_eq!(s.phase(), BookingPhase::Idle);
    assert!(!h.store.is_authenticated());
    assert_eq!(s.notice().as_deref(), Some("Invalid token"));
}
