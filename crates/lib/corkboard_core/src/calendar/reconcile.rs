//! Event reconciliation.
//!
//! Diffs one fetch of external events against a board's calendar-owned
//! items, keyed by external event id. Pure and synchronous.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::models::calendar::{
    DEFAULT_EVENT_CATEGORY, ExternalEvent, ExternalEventRef, ItemDraft, ItemUpdate, SyncPlan,
    SyncedItem,
};

const DATE_FORMAT: &str = "%b %-d";
const TIME_FORMAT: &str = "%-I:%M %p";

/// Display name for an event.
///
/// All-day events show the provider's calendar date, e.g. `Team Offsite (Jan 22)`.
/// Timed events show date and times in `tz`, e.g. `Standup (Jan 22, 2:00 PM - 3:00 PM)`.
pub fn format_event_name(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    tz: &Tz,
) -> String {
    if is_all_day {
        return format!("{title} ({})", start.date_naive().format(DATE_FORMAT));
    }

    let start = start.with_timezone(tz);
    let end = end.with_timezone(tz);
    format!(
        "{title} ({}, {} - {})",
        start.format(DATE_FORMAT),
        start.format(TIME_FORMAT),
        end.format(TIME_FORMAT)
    )
}

fn draft_for(board_id: Uuid, event: &ExternalEvent, tz: &Tz) -> ItemDraft {
    ItemDraft {
        board_id,
        name: format_event_name(&event.title, event.start, event.end, event.is_all_day, tz),
        details: event.location.clone().filter(|l| !l.is_empty()),
        category: DEFAULT_EVENT_CATEGORY.to_string(),
        is_checked: false,
        external: ExternalEventRef::from_event(event),
    }
}

fn differs(item: &SyncedItem, draft: &ItemDraft) -> bool {
    item.name != draft.name
        || item.external.start != draft.external.start
        || item.external.end != draft.external.end
        || item.external.description != draft.external.description
        || item.external.link != draft.external.link
}

/// Compute the create/update/delete sets for one sync pass.
///
/// Creates and updates follow the order of `events`. An id repeated within
/// `events` is reconciled once, at its first occurrence. Deletes are every
/// existing item whose id was not fetched, ordered by start time.
pub fn reconcile(
    board_id: Uuid,
    events: &[ExternalEvent],
    existing: Vec<SyncedItem>,
    tz: &Tz,
) -> SyncPlan {
    let mut working: HashMap<String, SyncedItem> = existing
        .into_iter()
        .map(|item| (item.external.event_id.clone(), item))
        .collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(events.len());
    let mut plan = SyncPlan::default();

    for event in events {
        if !seen.insert(event.id.as_str()) {
            continue;
        }

        let draft = draft_for(board_id, event, tz);
        match working.remove(&event.id) {
            Some(item) if differs(&item, &draft) => plan.to_update.push(ItemUpdate {
                existing: item,
                draft,
            }),
            Some(_) => {}
            None => plan.to_create.push(draft),
        }
    }

    plan.to_delete = working.into_values().collect();
    plan.to_delete
        .sort_by(|a, b| (a.external.start, a.id).cmp(&(b.external.start, b.id)));
    plan
}
