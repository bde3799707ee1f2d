use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub mod protocol;

// =========================================================
// 常量定义 (Constants)
// =========================================================

/// Number of numbered stalls on the lot. Spots are `1..=SPOT_COUNT`.
pub const SPOT_COUNT: u8 = 16;
/// Price of one hour of parking.
pub const UNIT_RATE: u64 = 100;

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_TYPE_JSON: &str = "application/json";

pub type UserId = i64;
pub type BookingId = i64;

// =========================================================
// 领域模型 (Domain Models)
// =========================================================

/// Account type carried in the `account_type` token claim and user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// The role an admin toggle switches to.
    pub fn toggled(self) -> Self {
        match self {
            Role::User => Role::Admin,
            Role::Admin => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stall number, always within `1..=SPOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SpotNumber(u8);

impl SpotNumber {
    pub fn new(n: i64) -> Result<Self, SpotOutOfRange> {
        if (1..=SPOT_COUNT as i64).contains(&n) {
            Ok(Self(n as u8))
        } else {
            Err(SpotOutOfRange(n))
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Every spot on the lot, in ascending order.
    pub fn all() -> impl Iterator<Item = SpotNumber> {
        (1..=SPOT_COUNT).map(SpotNumber)
    }
}

impl TryFrom<i64> for SpotNumber {
    type Error = SpotOutOfRange;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<SpotNumber> for i64 {
    fn from(spot: SpotNumber) -> Self {
        spot.0 as i64
    }
}

impl fmt::Display for SpotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotOutOfRange(pub i64);

impl fmt::Display for SpotOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spot number {} is outside 1..={}", self.0, SPOT_COUNT)
    }
}

impl std::error::Error for SpotOutOfRange {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotStatus {
    Free,
    Occupied,
    Blocked,
}

impl SpotStatus {
    pub fn is_selectable(&self) -> bool {
        matches!(self, SpotStatus::Free)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spot {
    pub number: SpotNumber,
    pub status: SpotStatus,
}

/// Status of all stalls, recomputed from the latest snapshots.
///
/// A spot listed both as blocked and occupied is reported as blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotBoard {
    spots: Vec<Spot>,
}

impl SpotBoard {
    pub fn from_snapshots(occupied: &BTreeSet<SpotNumber>, blocked: &BTreeSet<SpotNumber>) -> Self {
        let spots = SpotNumber::all()
            .map(|number| {
                let status = if blocked.contains(&number) {
                    SpotStatus::Blocked
                } else if occupied.contains(&number) {
                    SpotStatus::Occupied
                } else {
                    SpotStatus::Free
                };
                Spot { number, status }
            })
            .collect();
        Self { spots }
    }

    pub fn status(&self, number: SpotNumber) -> SpotStatus {
        self.spots[(number.get() - 1) as usize].status
    }

    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    pub fn selectable(&self) -> impl Iterator<Item = SpotNumber> + '_ {
        self.spots
            .iter()
            .filter(|s| s.status.is_selectable())
            .map(|s| s.number)
    }
}

/// Total price for a stay of `hours`.
///
/// 按 u64 计算，任何 u32 小时数都不会溢出。
#[inline]
pub fn price(hours: u32) -> u64 {
    u64::from(hours) * UNIT_RATE
}

/// End of a reservation that started at `reserved_at` and lasts `hours`.
///
/// 超出 chrono 可表示范围时取最大时间。
pub fn end_time(reserved_at: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    reserved_at
        .checked_add_signed(Duration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "account_type")]
    pub role: Role,
}

/// An active booking as listed by the admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminBooking {
    pub id: BookingId,
    pub parking_spot: SpotNumber,
    pub car_number: String,
    pub reserved_at: DateTime<Utc>,
    pub hours: u32,
}

impl AdminBooking {
    pub fn end_time(&self) -> DateTime<Utc> {
        end_time(self.reserved_at, self.hours)
    }

    pub fn price(&self) -> u64 {
        price(self.hours)
    }
}
