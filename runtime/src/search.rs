//! Event listing: search, filters and pagination.

use crate::error::Result;
use crate::repository::Repository;
use chrono::{DateTime, Utc};
use rsvp_core::query::{Filter, Sort, TextSearch};
use rsvp_core::types::Event;
use serde::Serialize;

/// Page size used when none (or an invalid one) is given.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Text search over the event fields people actually type into a search box.
pub const EVENT_TEXT_SEARCH: TextSearch = TextSearch::over(Event::SEARCH_FIELDS);

/// Criteria for listing events. Every criterion is optional and they combine
/// with AND.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSearch {
    /// 1-based page number
    pub page: u64,
    /// Page size
    pub limit: u64,
    /// Free-text term matched against name, description and organizer
    pub search: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    /// Inclusive lower bound on the event date
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event date
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for EventSearch {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
            category: None,
            location: None,
            start_date: None,
            end_date: None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl EventSearch {
    /// Filter for the criteria (pagination excluded).
    #[must_use]
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(term) = non_blank(self.search.as_deref()) {
            filter = EVENT_TEXT_SEARCH.apply(filter, term);
        }
        if let Some(category) = non_blank(self.category.as_deref()) {
            filter = filter.eq("category", category);
        }
        if let Some(location) = non_blank(self.location.as_deref()) {
            filter = filter.contains("location", location);
        }
        if let Some(start) = self.start_date {
            filter = filter.gte("date", start);
        }
        if let Some(end) = self.end_date {
            filter = filter.lte("date", end);
        }
        filter
    }

    const fn page(&self) -> u64 {
        if self.page == 0 { 1 } else { self.page }
    }

    const fn page_size(&self) -> u64 {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit
        }
    }

    /// Count and fetch one page, sorted by date ascending.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    #[tracing::instrument(skip(events))]
    pub async fn run(&self, events: &Repository<Event>) -> Result<EventPage> {
        let page = self.page();
        let limit = self.page_size();

        let query = events
            .find(self.filter())
            .sort(Sort::ascending("date"))
            .skip((page - 1).saturating_mul(limit))
            .limit(limit);

        let total_events = query.count().await?;
        let events = query.all().await?;
        let total_pages = total_events.div_ceil(limit);

        Ok(EventPage {
            events,
            current_page: page,
            total_pages,
            total_events,
            has_more: page < total_pages,
        })
    }
}

/// One page of events plus pagination totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events on this page
    pub events: Vec<Event>,
    /// Requested page
    pub current_page: u64,
    /// `ceil(total_events / limit)`
    pub total_pages: u64,
    /// Events matching the criteria
    pub total_events: u64,
    /// Whether a later page exists
    pub has_more: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::BackendSelector;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn repository() -> Repository<Event> {
        Repository::new(Arc::new(BackendSelector::fallback_only(Arc::new(
            MemoryStore::new(),
        ))))
    }

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, 10, 0, 0).unwrap()
    }

    async fn seed(events: &Repository<Event>) {
        let created = at(1, 1);
        let fixtures = [
            ("Rust Conference", "Systems Guild", "Portland, OR", at(3, 10), "Ownership deep dive", "Technology"),
            ("Cloud Summit", "Rust Belt Devs", "portland, me", at(3, 20), "Serverless", "Technology"),
            ("Rust Cooking Class", "Chef Club", "Portland, OR", at(3, 15), "Cast iron care", "Food"),
            ("Startup Pitch Night", "Founders", "Portland, OR", at(3, 12), "Learn about rust-proof ideas", "Business"),
            ("Rust Workshop", "Systems Guild", "Denver, CO", at(3, 11), "Hands-on", "Technology"),
            ("Late Rust Meetup", "Systems Guild", "Portland, OR", at(5, 1), "Async", "Technology"),
        ];
        for (name, organizer, location, date, description, category) in fixtures {
            events
                .create(Event::new(name, organizer, location, date, description, category, 20, created))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn combined_criteria_are_conjunctive() {
        let events = repository();
        seed(&events).await;

        let search = EventSearch {
            search: Some("rust".into()),
            category: Some("Technology".into()),
            location: Some("PORTLAND".into()),
            start_date: Some(at(3, 1)),
            end_date: Some(at(3, 31)),
            ..EventSearch::default()
        };
        let page = search.run(&events).await.unwrap();

        let names: Vec<_> = page.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Rust Conference", "Cloud Summit"]);
        assert_eq!(page.total_events, 2);
    }

    #[tokio::test]
    async fn pagination_totals() {
        let events = repository();
        seed(&events).await;

        let search = EventSearch {
            page: 2,
            limit: 4,
            ..EventSearch::default()
        };
        let page = search.run(&events).await.unwrap();

        assert_eq!(page.total_events, 6);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.current_page, 2);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn results_are_sorted_by_date() {
        let events = repository();
        seed(&events).await;

        let page = EventSearch::default().run(&events).await.unwrap();
        let dates: Vec<_> = page.events.iter().map(|e| e.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert!(page.has_more || page.total_events <= DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn blank_criteria_are_ignored() {
        let events = repository();
        seed(&events).await;

        let search = EventSearch {
            search: Some("  ".into()),
            category: Some(String::new()),
            ..EventSearch::default()
        };
        assert!(search.filter().is_empty());
        assert_eq!(search.run(&events).await.unwrap().total_events, 6);
    }

    #[tokio::test]
    async fn empty_store_has_zero_pages() {
        let page = EventSearch::default().run(&repository()).await.unwrap();
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_more);
    }
}
