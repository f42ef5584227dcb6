//! Indian Standard Time helpers and the BSE trading window

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// UTC+05:30
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn ist_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

/// Trading session for one IST day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketWindow {
    pub is_open: bool,
    pub open: DateTime<FixedOffset>,
    pub close: DateTime<FixedOffset>,
}

impl MarketWindow {
    pub const OPEN: (u32, u32) = (9, 15);
    pub const CLOSE: (u32, u32) = (15, 30);

    /// Window for the IST calendar day containing `now`
    ///
    /// Open only Monday to Friday between 09:15 and 15:30 inclusive.
    /// Exchange holidays are not modelled.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        let local = now.with_timezone(&ist());
        let day = local.date_naive();
        let at_time = |(h, m): (u32, u32)| {
            let time = NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
            ist()
                .from_local_datetime(&day.and_time(time))
                .single()
                .unwrap_or(local)
        };

        let open = at_time(Self::OPEN);
        let close = at_time(Self::CLOSE);
        let weekday = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);

        Self {
            is_open: weekday && local >= open && local <= close,
            open,
            close,
        }
    }

    pub fn now() -> Self {
        Self::at(ist_now())
    }

    /// True once the session of that day has ended
    pub fn is_after_close(&self, now: DateTime<FixedOffset>) -> bool {
        now > self.close
    }
}
