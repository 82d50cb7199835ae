//! Aggregate usage counters.
//!
//! Stats are best effort: a store that cannot be reached yields all zeros, and a failed scan
//! yields the total with zero daily and monthly counts. Callers always get an [`ApiStats`].

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::bosbase::{ListQuery, Record, StoreConnector};
use crate::config::StatsTimezone;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiStats {
    pub total_calls: u64,
    pub calls_today: u64,
    pub calls_this_month: u64,
    /// Most recent call, in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_call_time: Option<i64>,
}

/// Start of the current day and of the current month, in `now`'s timezone.
fn period_starts<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let today = now.date_naive();
    let month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);

    // A midnight skipped by a DST change falls back to the UTC reading of the same wall time.
    let start_of = |date: NaiveDate| {
        let naive = date.and_time(NaiveTime::MIN);
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    };
    (start_of(today), start_of(month))
}

pub fn boundaries(now: DateTime<Utc>, timezone: StatsTimezone) -> (DateTime<Utc>, DateTime<Utc>) {
    match timezone {
        StatsTimezone::Utc => period_starts(&now),
        StatsTimezone::Local => period_starts(&now.with_timezone(&Local)),
    }
}

/// Parse either RFC 3339 or the store's `YYYY-MM-DD HH:MM:SS.sssZ` format.
pub fn parse_store_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// When the call happened: the store's `created`, else the client-supplied `timestamp`.
fn event_time(record: &Record) -> Option<DateTime<Utc>> {
    record
        .str_field("created")
        .and_then(parse_store_timestamp)
        .or_else(|| record.str_field("timestamp").and_then(parse_store_timestamp))
}

/// Running day, month and latest-call counters, fed one page of records at a time.
#[derive(Debug)]
pub struct Tally {
    day_start: DateTime<Utc>,
    month_start: DateTime<Utc>,
    pub today: u64,
    pub month: u64,
    pub last: Option<DateTime<Utc>>,
}

impl Tally {
    pub fn new(now: DateTime<Utc>, timezone: StatsTimezone) -> Self {
        let (day_start, month_start) = boundaries(now, timezone);
        Self {
            day_start,
            month_start,
            today: 0,
            month: 0,
            last: None,
        }
    }

    pub fn add(&mut self, records: &[Record]) {
        for time in records.iter().filter_map(event_time) {
            if time >= self.day_start {
                self.today += 1;
            }
            if time >= self.month_start {
                self.month += 1;
            }
            self.last = Some(self.last.map_or(time, |l| l.max(time)));
        }
    }
}

pub struct StatsReader<'a> {
    connector: &'a dyn StoreConnector,
    collection: &'a str,
    timezone: StatsTimezone,
    page_size: u32,
}

impl<'a> StatsReader<'a> {
    pub fn new(connector: &'a dyn StoreConnector, collection: &'a str, timezone: StatsTimezone, page_size: u32) -> Self {
        Self {
            connector,
            collection,
            timezone,
            page_size,
        }
    }

    pub async fn get_stats(&self) -> ApiStats {
        self.get_stats_at(Utc::now()).await
    }

    #[instrument(skip(self), fields(collection = self.collection))]
    pub async fn get_stats_at(&self, now: DateTime<Utc>) -> ApiStats {
        let store = match self.connector.connect().await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Usage store unavailable, returning empty stats");
                return ApiStats::default();
            }
        };

        let total_calls = match store.list_records(self.collection, &ListQuery::new(1, 1)).await {
            Ok(page) => page.total_items,
            Err(e) if e.is_not_found() => {
                debug!("Usage collection does not exist yet");
                return ApiStats::default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to count usage events");
                return ApiStats::default();
            }
        };

        let mut tally = Tally::new(now, self.timezone);
        let scan = store
            .for_each_page(self.collection, self.page_size, None, &mut |page: Vec<Record>| tally.add(&page))
            .await;
        if let Err(e) = scan {
            warn!(error = %e, "Failed to scan usage events, reporting totals only");
            return ApiStats {
                total_calls,
                ..Default::default()
            };
        }

        ApiStats {
            total_calls,
            calls_today: tally.today,
            calls_this_month: tally.month,
            last_call_time: tally.last.map(|t| t.timestamp_millis()),
        }
    }
}
