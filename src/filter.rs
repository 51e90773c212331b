//! Event filter chain.
//!
//! Filters scope which events derived indexes and summaries see. Each
//! filter names a target (a zone, a provider, or a single event) and an
//! action (include or exclude). Resolution policy: **the last matching
//! filter wins**; an event no filter matches is included.

use crate::event_type::provider_of;
use crate::store::EventMeta;

/// What a matched filter does with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Keep the event.
    Include,
    /// Drop the event.
    Exclude,
}

/// What a filter matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTarget {
    /// All events attributed to the named zone.
    Zone(String),
    /// All events whose type name starts with `provider#`.
    Provider(String),
    /// A single event type, addressed as provider plus short name.
    Event {
        /// Provider portion of the type name.
        provider: String,
        /// Name portion after the `#`.
        name: String,
    },
}

/// One entry in the filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    action: FilterAction,
    target: FilterTarget,
}

impl Filter {
    /// A filter that keeps matching events.
    pub fn include(target: FilterTarget) -> Self {
        Filter { action: FilterAction::Include, target }
    }

    /// A filter that drops matching events.
    pub fn exclude(target: FilterTarget) -> Self {
        Filter { action: FilterAction::Exclude, target }
    }

    /// The filter's action.
    pub fn action(&self) -> FilterAction {
        self.action
    }

    /// The filter's target.
    pub fn target(&self) -> &FilterTarget {
        &self.target
    }

    fn matches(&self, event: &EventMeta<'_>) -> bool {
        match &self.target {
            FilterTarget::Zone(zone) => event.zone_name == zone,
            FilterTarget::Provider(provider) => provider_of(event.type_name) == provider,
            FilterTarget::Event { provider, name } => {
                provider_of(event.type_name) == provider && short_name_of(event.type_name) == name
            }
        }
    }
}

/// The name portion of an event name, after the `#`.
fn short_name_of(name: &str) -> &str {
    match name.find('#') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// An ordered filter chain evaluated per candidate event.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// An empty chain, which accepts everything.
    pub fn new() -> Self {
        FilterChain { filters: Vec::new() }
    }

    /// Append a filter to the end of the chain.
    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Remove all filters.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluate the chain against an event. The last matching filter
    /// decides; if nothing matches the event is accepted.
    pub fn accepts(&self, event: &EventMeta<'_>) -> bool {
        let mut verdict = FilterAction::Include;
        for filter in &self.filters {
            if filter.matches(event) {
                verdict = filter.action;
            }
        }
        verdict == FilterAction::Include
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventClass, NIL_ARGS};

    fn meta<'a>(type_name: &'a str, zone_name: &'a str) -> EventMeta<'a> {
        EventMeta {
            id: 1,
            type_id: 16,
            type_name,
            class: EventClass::Instance,
            type_flags: 0,
            zone: 0,
            zone_name,
            time: 0,
            argument_data_id: NIL_ARGS,
        }
    }

    #[test]
    fn test_empty_chain_accepts_everything() {
        let chain = FilterChain::new();
        assert!(chain.accepts(&meta("gc#collect", "default")));
    }

    #[test]
    fn test_exclude_provider() {
        let mut chain = FilterChain::new();
        chain.push(Filter::exclude(FilterTarget::Provider("gc".into())));
        assert!(!chain.accepts(&meta("gc#collect", "default")));
        assert!(chain.accepts(&meta("app#frame", "default")));
    }

    #[test]
    fn test_last_matching_filter_wins() {
        let mut chain = FilterChain::new();
        chain.push(Filter::exclude(FilterTarget::Provider("gc".into())));
        chain.push(Filter::include(FilterTarget::Event {
            provider: "gc".into(),
            name: "collect".into(),
        }));
        // Both filters match gc#collect; the later include prevails.
        assert!(chain.accepts(&meta("gc#collect", "default")));
        assert!(!chain.accepts(&meta("gc#sweep", "default")));
    }

    #[test]
    fn test_zone_filter() {
        let mut chain = FilterChain::new();
        chain.push(Filter::exclude(FilterTarget::Zone("worker".into())));
        assert!(!chain.accepts(&meta("app#frame", "worker")));
        assert!(chain.accepts(&meta("app#frame", "default")));
    }

    #[test]
    fn test_unmatched_event_defaults_to_include() {
        let mut chain = FilterChain::new();
        chain.push(Filter::include(FilterTarget::Provider("app".into())));
        assert!(chain.accepts(&meta("other#thing", "default")));
    }
}
