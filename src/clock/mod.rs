use time::format_description::FormatItem;
use time::macros::{format_description, offset};
use time::{OffsetDateTime, UtcOffset};

/// Trades are stamped in exchange-local time. Kuala Lumpur has not observed daylight saving since
/// 1982 so a fixed offset is exact.
pub const TRADE_OFFSET: UtcOffset = offset!(+8);

const TRADE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12]:[minute]:[second] [period] [day]/[month]/[year]");

///Clock is the source of trade timestamps.
///
///Servers use the system clock. Tests pin the clock so that transaction rows can be compared
///exactly.
#[derive(Clone, Copy, Debug, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(OffsetDateTime),
}

impl Clock {
    pub fn fixed(now: OffsetDateTime) -> Self {
        Clock::Fixed(now)
    }

    pub fn now(&self) -> OffsetDateTime {
        match self {
            Clock::System => OffsetDateTime::now_utc(),
            Clock::Fixed(now) => *now,
        }
    }

    pub fn stamp(&self) -> String {
        trade_time(self.now())
    }
}

/// Formats an instant as `hh:mm:ss AM dd/mm/yyyy` in [TRADE_OFFSET].
pub fn trade_time(now: OffsetDateTime) -> String {
    let local = now.to_offset(TRADE_OFFSET);
    //Formatting only fails on components the description does not use
    local
        .format(TRADE_TIME_FORMAT)
        .unwrap_or_else(|_| local.to_string())
}
