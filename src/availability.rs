//! 已占用车位的参考快照
//!
//! 快照只是最近一次生效的查询结果，不具权威性，服务端会重新校验每笔预订。

use crate::api::ParkingApi;
use crate::error::ClientResult;
use crate::request::HttpClient;
use parkspot_shared::protocol::OccupiedSpotsRequest;
use parkspot_shared::{SpotBoard, SpotNumber};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

pub const AVAILABILITY_UNAVAILABLE: &str = "Spot availability could not be loaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot now holds the server's answer.
    Updated,
    /// The fetch failed; the snapshot is empty and a notice is set.
    Degraded,
    /// The view unmounted or a newer fetch started; the answer was dropped.
    Discarded,
}

pub struct AvailabilityFetcher<C: HttpClient> {
    api: Rc<ParkingApi<C>>,
    occupied: RefCell<BTreeSet<SpotNumber>>,
    notice: RefCell<Option<String>>,
    generation: Cell<u64>,
    mounted: Cell<bool>,
}

impl<C: HttpClient> AvailabilityFetcher<C> {
    pub fn new(api: Rc<ParkingApi<C>>) -> Self {
        Self {
            api,
            occupied: RefCell::new(BTreeSet::new()),
            notice: RefCell::new(None),
            generation: Cell::new(0),
            mounted: Cell::new(false),
        }
    }

    pub fn api(&self) -> &Rc<ParkingApi<C>> {
        &self.api
    }

    /// 向服务端查询一次，越界的车位号直接丢弃
    pub async fn fetch_occupied_spots(&self) -> ClientResult<BTreeSet<SpotNumber>> {
        let res = self
            .api
            .send(&OccupiedSpotsRequest)
            .await
            .map_err(|e| e.in_op("availability.fetch"))?;

        let spots = res
            .occupied_spots
            .unwrap_or_default()
            .into_iter()
            .filter_map(|n| match SpotNumber::new(n) {
                Ok(spot) => Some(spot),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring occupied spot from server");
                    None
                }
            })
            .collect();
        Ok(spots)
    }

    /// Fetch and apply a fresh snapshot.
    ///
    /// Only auth errors are returned; the caller hands those to the gate.
    /// Any other failure degrades to an empty snapshot with a notice.
    pub async fn refresh(&self) -> ClientResult<RefreshOutcome> {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let result = self.fetch_occupied_spots().await;

        if !self.mounted.get() || self.generation.get() != generation {
            tracing::debug!(generation, "discarding stale availability response");
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(spots) => {
                tracing::debug!(occupied = spots.len(), "availability updated");
                *self.occupied.borrow_mut() = spots;
                *self.notice.borrow_mut() = None;
                Ok(RefreshOutcome::Updated)
            }
            Err(e) if e.is_auth() => {
                self.occupied.borrow_mut().clear();
                *self.notice.borrow_mut() = None;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "availability degraded to empty snapshot");
                let text = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| AVAILABILITY_UNAVAILABLE.to_string());
                self.occupied.borrow_mut().clear();
                *self.notice.borrow_mut() = Some(text);
                Ok(RefreshOutcome::Degraded)
            }
        }
    }

    pub fn occupied(&self) -> BTreeSet<SpotNumber> {
        self.occupied.borrow().clone()
    }

    pub fn is_occupied(&self, spot: SpotNumber) -> bool {
        self.occupied.borrow().contains(&spot)
    }

    pub fn notice(&self) -> Option<String> {
        self.notice.borrow().clone()
    }

    /// Status of all spots as far as this view knows. Blocked spots are
    /// only visible to admins, so none are marked here.
    pub fn board(&self) -> SpotBoard {
        SpotBoard::from_snapshots(&self.occupied.borrow(), &BTreeSet::new())
    }

    pub fn mount(&self) {
        self.mounted.set(true);
    }

    pub fn unmount(&self) {
        self.mounted.set(false);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }
}
