//! Reverse-chronological listing scans.
//!
//! News sites list items newest first across pages. [`scan`] walks pages
//! until it sees an item older than the [`Window`], collecting matches on
//! the way. List-page dates are only a hint: crawlers re-check every
//! collected item against [`Window::accepts`] using the item's own
//! timestamp before turning it into a row.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta};

use crate::error::{CrawlError, Result};
use crate::types::FetchRequest;

/// Period a crawl collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// One calendar day in Taipei.
    Day(NaiveDate),
    /// Everything published at or after this instant.
    Since(DateTime<FixedOffset>),
}

/// Position of a listed item relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Newer,
    Match,
    Older,
}

/// Publication time as known at listing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Instant(DateTime<FixedOffset>),
    Day(NaiveDate),
    Unknown,
}

impl Window {
    /// Lookback window ending at `now`, or the requested day.
    ///
    /// # Errors
    ///
    /// Returns `LookbackOutOfRange` when the lookback start is not a
    /// representable instant.
    pub fn for_request(request: &FetchRequest, now: DateTime<FixedOffset>) -> Result<Self> {
        let Some(hours) = request.lookback_hours else {
            return Ok(Window::Day(request.date));
        };
        TimeDelta::try_hours(i64::from(hours))
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .map(Window::Since)
            .ok_or(CrawlError::LookbackOutOfRange(hours))
    }

    /// Calendar date used to complete year-less list dates.
    pub fn reference_date(&self) -> NaiveDate {
        match self {
            Window::Day(date) => *date,
            Window::Since(cutoff) => cutoff.date_naive(),
        }
    }

    /// Where a listed item falls. Unknown stamps count as candidates.
    pub fn place(&self, stamp: &Stamp) -> Placement {
        match (self, stamp) {
            (_, Stamp::Unknown) => Placement::Match,
            (Window::Day(target), Stamp::Instant(at)) => by_ordering(at.date_naive().cmp(target)),
            (Window::Day(target), Stamp::Day(day)) => by_ordering(day.cmp(target)),
            (Window::Since(cutoff), Stamp::Instant(at)) => {
                if at >= cutoff {
                    Placement::Match
                } else {
                    Placement::Older
                }
            }
            (Window::Since(cutoff), Stamp::Day(day)) => {
                if *day >= cutoff.date_naive() {
                    Placement::Match
                } else {
                    Placement::Older
                }
            }
        }
    }

    /// Final check on an item's own timestamp.
    pub fn accepts(&self, published: &DateTime<FixedOffset>) -> bool {
        self.place(&Stamp::Instant(*published)) == Placement::Match
    }

    pub fn describe(&self) -> String {
        match self {
            Window::Day(date) => date.to_string(),
            Window::Since(cutoff) => format!("since {}", cutoff.format("%Y-%m-%d %H:%M")),
        }
    }
}

fn by_ordering(ordering: Ordering) -> Placement {
    match ordering {
        Ordering::Greater => Placement::Newer,
        Ordering::Equal => Placement::Match,
        Ordering::Less => Placement::Older,
    }
}

/// One item on a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct Listed<T> {
    pub stamp: Stamp,
    pub item: T,
}

impl<T> Listed<T> {
    pub fn new(stamp: Stamp, item: T) -> Self {
        Self { stamp, item }
    }
}

/// A paginated, newest-first listing.
#[async_trait]
pub trait Listing: Send {
    type Item: Send;

    /// Items of page `index` (0 = newest). `None` once the listing ends.
    async fn page(&mut self, index: u32) -> Result<Option<Vec<Listed<Self::Item>>>>;
}

/// Walk `listing` until an item older than `window` appears.
///
/// - older item seen: the matches so far (possibly none, a quiet day)
/// - listing ends first: matches, or `NotFound` when there are none
/// - `max_pages` walked: matches (truncated, logged), or `NotFound`
pub async fn scan<L: Listing>(
    source: &str,
    listing: &mut L,
    window: &Window,
    max_pages: u32,
    delay: Duration,
) -> Result<Vec<L::Item>> {
    let mut matched = Vec::new();

    for index in 0..max_pages {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let Some(items) = listing.page(index).await? else {
            tracing::debug!(source, page = index + 1, matched = matched.len(), "Listing exhausted");
            if matched.is_empty() {
                return Err(CrawlError::ListingExhausted {
                    source_name: source.to_string(),
                    date: window.describe(),
                    pages: index,
                });
            }
            return Ok(matched);
        };

        let total = items.len();
        let mut crossed = false;
        for listed in items {
            match window.place(&listed.stamp) {
                Placement::Match => matched.push(listed.item),
                Placement::Older => crossed = true,
                Placement::Newer => {}
            }
        }

        tracing::debug!(
            source,
            page = index + 1,
            items = total,
            matched = matched.len(),
            crossed,
            "Scanned listing page"
        );

        if crossed {
            return Ok(matched);
        }
    }

    if matched.is_empty() {
        return Err(CrawlError::ScanDepthExceeded {
            source_name: source.to_string(),
            date: window.describe(),
            pages: max_pages,
        });
    }

    tracing::warn!(
        source,
        pages = max_pages,
        matched = matched.len(),
        "Scan depth reached before an older item; result may be incomplete"
    );
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    /// Pages of day-of-month stamps.
    struct FakeListing {
        pages: Vec<Vec<u32>>,
        requested: Vec<u32>,
    }

    impl FakeListing {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                requested: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Listing for FakeListing {
        type Item = u32;

        async fn page(&mut self, index: u32) -> Result<Option<Vec<Listed<u32>>>> {
            self.requested.push(index);
            Ok(self.pages.get(index as usize).map(|page| {
                page.iter()
                    .map(|d| Listed::new(Stamp::Day(day(*d)), *d))
                    .collect()
            }))
        }
    }

    async fn run(pages: Vec<Vec<u32>>, target: u32, depth: u32) -> (Result<Vec<u32>>, Vec<u32>) {
        let mut listing = FakeListing::new(pages);
        let result = scan("fake", &mut listing, &Window::Day(day(target)), depth, Duration::ZERO).await;
        (result, listing.requested)
    }

    #[tokio::test]
    async fn test_collects_across_pages_until_older() {
        let (result, requested) = run(vec![vec![17, 16], vec![15, 14], vec![13]], 15, 10).await;
        assert_eq!(result.unwrap(), vec![15]);
        // page 2 already holds an older item, so page 3 is never requested
        assert_eq!(requested, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_quiet_day_is_empty_success() {
        let (result, _) = run(vec![vec![17, 16], vec![14, 13]], 15, 10).await;
        assert_eq!(result.unwrap(), Vec::<u32>::new());
    }

    #[tokio::test]
    async fn test_target_beyond_depth_is_not_found() {
        let (result, requested) = run(vec![vec![20], vec![19], vec![18], vec![17]], 1, 3).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(err, CrawlError::ScanDepthExceeded { pages: 3, .. }));
        assert_eq!(requested, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_depth_reached_after_matches_keeps_matches() {
        let (result, _) = run(vec![vec![15], vec![15], vec![15]], 15, 2).await;
        assert_eq!(result.unwrap(), vec![15, 15]);
    }

    #[tokio::test]
    async fn test_exhausted_listing_without_match_is_not_found() {
        let (result, _) = run(vec![vec![20, 19]], 5, 10).await;
        assert!(matches!(result.unwrap_err(), CrawlError::ListingExhausted { pages: 1, .. }));
    }

    #[test]
    fn test_since_window_placement() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let cutoff = day(15).and_hms_opt(12, 0, 0).unwrap().and_local_timezone(tz).single().unwrap();
        let window = Window::Since(cutoff);

        let later = cutoff + TimeDelta::minutes(5);
        let earlier = cutoff - TimeDelta::minutes(5);
        assert_eq!(window.place(&Stamp::Instant(later)), Placement::Match);
        assert_eq!(window.place(&Stamp::Instant(earlier)), Placement::Older);
        assert_eq!(window.place(&Stamp::Day(day(15))), Placement::Match);
        assert_eq!(window.place(&Stamp::Day(day(14))), Placement::Older);
        assert!(window.accepts(&later));
        assert!(!window.accepts(&earlier));
    }

    #[test]
    fn test_window_for_request() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = day(16).and_hms_opt(9, 0, 0).unwrap().and_local_timezone(tz).single().unwrap();
        let request = FetchRequest::new("ptt", day(15));

        assert_eq!(Window::for_request(&request, now).unwrap(), Window::Day(day(15)));
        assert_eq!(
            Window::for_request(&request.clone().with_lookback_hours(6), now).unwrap(),
            Window::Since(now - TimeDelta::hours(6))
        );
    }

    #[test]
    fn test_lookback_beyond_calendar_range_is_not_found() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = day(16).and_hms_opt(9, 0, 0).unwrap().and_local_timezone(tz).single().unwrap();
        let request = FetchRequest::new("ptt", day(15)).with_lookback_hours(u32::MAX);

        let err = Window::for_request(&request, now).unwrap_err();
        assert!(matches!(err, CrawlError::LookbackOutOfRange(u32::MAX)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_stamp_is_candidate() {
        assert_eq!(Window::Day(day(1)).place(&Stamp::Unknown), Placement::Match);
    }
}
