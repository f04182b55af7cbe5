// =============================================================================
// Market Clock — Indian equities/derivatives session classification (§4.H)
// =============================================================================
//
// Pure function of the current instant in market-local (IST) time. No shared
// mutable state, no locking — every call recomputes from `Utc::now()` (or an
// injected instant in tests), matching the original `MarketHours` classmethod
// design (`original_source/backend/app/services/market_hours.py`) translated
// into a Rust value type with no process-wide singleton.
// =============================================================================

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// NSE/BSE holiday calendar for 2025. Carried verbatim from the Python
/// original's `HOLIDAYS_2025` — update annually.
const HOLIDAYS_2025: &[(i32, u32, u32)] = &[
    (2025, 1, 26),  // Republic Day
    (2025, 2, 26),  // Mahashivratri
    (2025, 3, 14),  // Holi
    (2025, 3, 31),  // Id-Ul-Fitr
    (2025, 4, 10),  // Mahavir Jayanti
    (2025, 4, 14),  // Dr. Ambedkar Jayanti
    (2025, 4, 18),  // Good Friday
    (2025, 5, 1),   // Maharashtra Day
    (2025, 6, 7),   // Id-Ul-Adha (Bakri Id)
    (2025, 8, 15),  // Independence Day
    (2025, 8, 27),  // Ganesh Chaturthi
    (2025, 10, 2),  // Gandhi Jayanti
    (2025, 10, 21), // Dussehra
    (2025, 10, 30), // Diwali-Laxmi Pujan
    (2025, 11, 5),  // Diwali-Balipratipada
    (2025, 11, 24), // Gurunanak Jayanti
    (2025, 12, 25), // Christmas
];

const PRE_OPEN_START: (u32, u32) = (9, 0);
const MARKET_OPEN: (u32, u32) = (9, 15);
const MARKET_CLOSE: (u32, u32) = (15, 30);
const POST_CLOSE: (u32, u32) = (16, 0);

/// Session classification returned by [`MarketClock::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    PreOpen,
    PostMarketClosed,
    ClosedWeekend,
    ClosedHoliday,
    ClosedAfterHours,
}

impl MarketStatus {
    pub fn should_stream_data(self) -> bool {
        matches!(self, MarketStatus::Open | MarketStatus::PreOpen)
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "OPEN"),
            MarketStatus::PreOpen => write!(f, "PRE-OPEN"),
            MarketStatus::PostMarketClosed => write!(f, "POST-MARKET CLOSED"),
            MarketStatus::ClosedWeekend => write!(f, "CLOSED (WEEKEND)"),
            MarketStatus::ClosedHoliday => write!(f, "CLOSED (HOLIDAY)"),
            MarketStatus::ClosedAfterHours => write!(f, "CLOSED (AFTER-HOURS)"),
        }
    }
}

/// Full human-readable snapshot, used by the `/market/status` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatusReport {
    pub status: MarketStatus,
    pub current_time_ist: String,
    pub next_open: Option<String>,
}

/// IST = UTC+5:30, no DST. Shared with anything that needs to group
/// timestamps by market-local calendar day (e.g. the opening-range breakout
/// strategy, §4.F).
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 1800).expect("valid fixed offset")
}

/// Indian market-hours classifier. Stateless; `ist_offset` is fixed rather
/// than using a tz database, since the core has no other use for one.
pub struct MarketClock {
    ist_offset: FixedOffset,
}

impl Default for MarketClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketClock {
    pub fn new() -> Self {
        Self {
            ist_offset: ist_offset(),
        }
    }

    fn now_ist(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.ist_offset)
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        HOLIDAYS_2025
            .iter()
            .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
    }

    /// Weekend or explicit-calendar holiday.
    pub fn is_market_holiday_at(&self, at: DateTime<FixedOffset>) -> bool {
        at.weekday().num_days_from_monday() >= 5 || self.is_holiday(at.date_naive())
    }

    /// Current session classification (§4.H).
    pub fn status(&self) -> MarketStatus {
        self.status_at(self.now_ist())
    }

    fn status_at(&self, now: DateTime<FixedOffset>) -> MarketStatus {
        if self.is_holiday(now.date_naive()) {
            return MarketStatus::ClosedHoliday;
        }
        if now.weekday().num_days_from_monday() >= 5 {
            return MarketStatus::ClosedWeekend;
        }

        let t = now.time();
        let pre_open_start = NaiveTime::from_hms_opt(PRE_OPEN_START.0, PRE_OPEN_START.1, 0).unwrap();
        let market_open = NaiveTime::from_hms_opt(MARKET_OPEN.0, MARKET_OPEN.1, 0).unwrap();
        let market_close = NaiveTime::from_hms_opt(MARKET_CLOSE.0, MARKET_CLOSE.1, 0).unwrap();
        let post_close = NaiveTime::from_hms_opt(POST_CLOSE.0, POST_CLOSE.1, 0).unwrap();

        if t >= pre_open_start && t < market_open {
            MarketStatus::PreOpen
        } else if t >= market_open && t < market_close {
            MarketStatus::Open
        } else if t >= market_close && t < post_close {
            MarketStatus::PostMarketClosed
        } else {
            MarketStatus::ClosedAfterHours
        }
    }

    pub fn is_market_open(&self) -> bool {
        self.status() == MarketStatus::Open
    }

    pub fn should_stream_data(&self) -> bool {
        self.status().should_stream_data()
    }

    /// Next `09:15` market-local open, walking forward day-by-day and
    /// skipping weekends/holidays, bounded at 10 days (§4.H).
    pub fn next_market_open(&self) -> Option<DateTime<FixedOffset>> {
        self.next_market_open_from(self.now_ist())
    }

    fn next_market_open_from(&self, from: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let market_close = NaiveTime::from_hms_opt(MARKET_CLOSE.0, MARKET_CLOSE.1, 0).unwrap();

        let start_date = if from.time() >= market_close {
            from.date_naive() + Duration::days(1)
        } else {
            from.date_naive()
        };

        for i in 0..10 {
            let candidate = start_date + Duration::days(i);
            let candidate_dt = self
                .ist_offset
                .from_local_datetime(
                    &candidate.and_hms_opt(MARKET_OPEN.0, MARKET_OPEN.1, 0).unwrap(),
                )
                .single()?;
            if !self.is_market_holiday_at(candidate_dt) {
                return Some(candidate_dt);
            }
        }
        None
    }

    /// Full status report including human-readable next-open string, used
    /// by the REST status endpoint (§4.H, supplemented accessor).
    pub fn status_report(&self) -> MarketStatusReport {
        let now = self.now_ist();
        let status = self.status_at(now);
        let next_open = if matches!(status, MarketStatus::Open | MarketStatus::PreOpen) {
            None
        } else {
            self.next_market_open_from(now).map(|dt| dt.format("%d %b %Y, %I:%M %p").to_string())
        };

        MarketStatusReport {
            status,
            current_time_ist: now.format("%I:%M:%S %p").to_string(),
            next_open,
        }
    }

    /// Whether `at` (market-local) is at-or-past the configured
    /// auto-square-off time on a trading day.
    pub fn is_past_square_off(&self, hour: u32, minute: u32) -> bool {
        let now = self.now_ist();
        let cutoff = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
        now.time() >= cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist(clock: &MarketClock, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        clock
            .ist_offset
            .from_local_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap())
            .single()
            .unwrap()
    }

    #[test]
    fn classifies_open_session() {
        let clock = MarketClock::new();
        // 2025-07-28 is a Monday.
        let at = ist(&clock, 2025, 7, 28, 10, 0);
        assert_eq!(clock.status_at(at), MarketStatus::Open);
    }

    #[test]
    fn classifies_pre_open() {
        let clock = MarketClock::new();
        let at = ist(&clock, 2025, 7, 28, 9, 5);
        assert_eq!(clock.status_at(at), MarketStatus::PreOpen);
    }

    #[test]
    fn boundary_at_market_open_is_open_not_pre_open() {
        let clock = MarketClock::new();
        let at = ist(&clock, 2025, 7, 28, 9, 15);
        assert_eq!(clock.status_at(at), MarketStatus::Open);
    }

    #[test]
    fn boundary_at_market_close_is_post_market() {
        let clock = MarketClock::new();
        let at = ist(&clock, 2025, 7, 28, 15, 30);
        assert_eq!(clock.status_at(at), MarketStatus::PostMarketClosed);
    }

    #[test]
    fn boundary_at_post_close_is_after_hours() {
        let clock = MarketClock::new();
        let at = ist(&clock, 2025, 7, 28, 16, 0);
        assert_eq!(clock.status_at(at), MarketStatus::ClosedAfterHours);
    }

    #[test]
    fn classifies_weekend() {
        let clock = MarketClock::new();
        // 2025-07-26 is a Saturday.
        let at = ist(&clock, 2025, 7, 26, 10, 0);
        assert_eq!(clock.status_at(at), MarketStatus::ClosedWeekend);
    }

    #[test]
    fn classifies_explicit_holiday() {
        let clock = MarketClock::new();
        // Republic Day 2025, a Sunday -- holiday check runs before weekend.
        let at = ist(&clock, 2025, 1, 26, 10, 0);
        assert_eq!(clock.status_at(at), MarketStatus::ClosedHoliday);
    }

    #[test]
    fn should_stream_data_only_open_or_pre_open() {
        assert!(MarketStatus::Open.should_stream_data());
        assert!(MarketStatus::PreOpen.should_stream_data());
        assert!(!MarketStatus::ClosedWeekend.should_stream_data());
        assert!(!MarketStatus::PostMarketClosed.should_stream_data());
    }

    #[test]
    fn next_open_skips_weekend() {
        let clock = MarketClock::new();
        // Friday 2025-07-25 after close -> next open should be Monday 2025-07-28.
        let from = ist(&clock, 2025, 7, 25, 16, 30);
        let next = clock.next_market_open_from(from).unwrap();
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2025, 7, 28).unwrap());
        assert_eq!(next.time(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
    }

    #[test]
    fn next_open_skips_holiday() {
        let clock = MarketClock::new();
        // 2025-08-14 (Thursday) before open; 2025-08-15 is Independence Day.
        let from = ist(&clock, 2025, 8, 14, 7, 0);
        let next = clock.next_market_open_from(from).unwrap();
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2025, 8, 14).unwrap());
    }
}
