//! Visitor analytics: the consent-gated event the landing page records and the
//! summary the dashboard shows.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{AnalyticsEvent, NewAnalyticsEvent};

pub const TOP_N: usize = 5;
pub const RECENT_N: usize = 10;
pub const CONSENT_EVENT: &str = "cookie_accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    Accepted,
    Declined,
}

/// What the cookie banner posts once the visitor has chosen.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentReport {
    pub consent: Consent,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    pub referrer: Option<String>,
    pub timezone: Option<String>,
    pub platform: Option<String>,
    pub page_url: Option<String>,
}

impl ConsentReport {
    /// The event to record, if the visitor allowed tracking.
    pub fn into_event(self) -> Option<NewAnalyticsEvent> {
        if self.consent == Consent::Declined {
            return None;
        }

        Some(NewAnalyticsEvent {
            event_type: CONSENT_EVENT.to_owned(),
            user_agent: self.user_agent,
            language: self.language,
            screen_resolution: self.screen_resolution,
            referrer: self.referrer.filter(|r| !r.is_empty()).or(Some("direct".to_owned())),
            timezone: self.timezone,
            platform: self.platform,
            page_url: self.page_url,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsSummary {
    pub total_users: usize,
    pub total_page_views: usize,
    pub top_pages: Vec<Tally>,
    pub demographics: Vec<Tally>,
    pub referrers: Vec<Tally>,
    pub recent_events: Vec<AnalyticsEvent>,
}

/// Counts keys keeping first-seen order, then ranks them by count. Ties stay
/// in first-seen order.
fn top(keys: impl Iterator<Item = String>, n: usize) -> Vec<Tally> {
    let mut order: Vec<Tally> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for key in keys {
        match index.get(&key) {
            Some(&i) => order[i].count += 1,
            None => {
                index.insert(key.clone(), order.len());
                order.push(Tally { key, count: 1 });
            }
        }
    }
    order.sort_by(|a, b| b.count.cmp(&a.count));
    order.truncate(n);
    order
}

/// `events` must be ordered most recent first.
pub fn summarize(events: &[AnalyticsEvent]) -> AnalyticsSummary {
    let total_users = events
        .iter()
        .map(|e| e.user_agent.as_deref())
        .collect::<HashSet<_>>()
        .len();

    let top_pages = top(
        events
            .iter()
            .filter_map(|e| e.page_url.clone())
            .filter(|p| !p.is_empty()),
        TOP_N,
    );

    let demographics = top(
        events.iter().map(|e| {
            format!(
                "{} - {}",
                e.language.as_deref().unwrap_or("Unknown"),
                e.timezone.as_deref().unwrap_or("Unknown")
            )
        }),
        TOP_N,
    );

    let referrers = top(
        events
            .iter()
            .filter_map(|e| e.referrer.clone())
            .filter(|r| !r.is_empty() && r != "direct"),
        TOP_N,
    );

    AnalyticsSummary {
        total_users,
        total_page_views: events.len(),
        top_pages,
        demographics,
        referrers,
        recent_events: events.iter().take(RECENT_N).cloned().collect(),
    }
}
