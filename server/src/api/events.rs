//! Event browsing endpoints:
//! - GET /api/events - List events with search, filters and pagination
//! - GET /api/events/:id - Get event details
//!
//! Both are public.

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDate, Utc};
use rsvp_core::types::{Event, EventId};
use rsvp_core::validation::FieldError;
use rsvp_runtime::{EventPage, EventSearch};
use rsvp_web::AppError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing events.
///
/// Kept as raw strings: invalid paging values fall back to defaults instead
/// of rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    /// 1-based page number (default 1)
    pub page: Option<String>,
    /// Page size (default 10)
    pub limit: Option<String>,
    /// Free-text search over name, description and organizer
    pub search: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Location substring, case-insensitive
    pub location: Option<String>,
    /// Earliest date, RFC 3339 or `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// Latest date, RFC 3339 or `YYYY-MM-DD`
    pub end_date: Option<String>,
}

/// Single event response.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// The event
    pub event: Event,
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Parse an RFC 3339 timestamp or a bare date (start of day, UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

impl ListEventsQuery {
    /// Convert into search criteria.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming every date that does not parse.
    pub fn into_search(self) -> Result<EventSearch, AppError> {
        let defaults = EventSearch::default();
        let mut errors = Vec::new();
        let mut date = |field: &str, raw: Option<String>| {
            let raw = raw.filter(|s| !s.trim().is_empty())?;
            let parsed = parse_date(&raw);
            if parsed.is_none() {
                errors.push(FieldError::new(field, format!("Invalid date: {raw}")));
            }
            parsed
        };
        let start_date = date("startDate", self.start_date);
        let end_date = date("endDate", self.end_date);

        if !errors.is_empty() {
            return Err(AppError::validation(errors));
        }

        Ok(EventSearch {
            page: positive(self.page.as_deref()).unwrap_or(defaults.page),
            limit: positive(self.limit.as_deref()).unwrap_or(defaults.limit),
            search: self.search,
            category: self.category,
            location: self.location,
            start_date,
            end_date,
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List events.
///
/// # Example
///
/// ```bash
/// curl 'http://localhost:5000/api/events?search=rust&category=Technology&startDate=2026-01-01&page=2'
/// ```
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<EventPage>, AppError> {
    let search = query.into_search()?;
    let page = search.run(&state.registry.events).await?;
    Ok(Json(page))
}

/// Get event details by ID.
///
/// Unknown and malformed ids are both 404.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventResponse>, AppError> {
    let id: EventId = id.parse().map_err(|_| AppError::not_found("Event"))?;
    let event = state
        .registry
        .events
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("Event"))?;
    Ok(Json(EventResponse { event }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paging_defaults() {
        let search = ListEventsQuery {
            page: Some("0".to_string()),
            limit: Some("ten".to_string()),
            ..ListEventsQuery::default()
        }
        .into_search()
        .unwrap();
        assert_eq!(search.page, 1);
        assert_eq!(search.limit, 10);

        let search = ListEventsQuery {
            page: Some("3".to_string()),
            limit: Some("25".to_string()),
            ..ListEventsQuery::default()
        }
        .into_search()
        .unwrap();
        assert_eq!((search.page, search.limit), (3, 25));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(
            parse_date("2026-03-01"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("2026-03-01T18:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 16, 30, 0).unwrap())
        );
        assert_eq!(parse_date("next tuesday"), None);
    }

    #[test]
    fn test_invalid_dates_are_rejected() {
        let err = ListEventsQuery {
            start_date: Some("soon".to_string()),
            end_date: Some("later".to_string()),
            ..ListEventsQuery::default()
        }
        .into_search()
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_blank_dates_are_ignored() {
        let search = ListEventsQuery {
            start_date: Some(String::new()),
            ..ListEventsQuery::default()
        }
        .into_search()
        .unwrap();
        assert_eq!(search.start_date, None);
    }
}
