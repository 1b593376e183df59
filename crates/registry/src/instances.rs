//! Instance registry: tracked component instances keyed by caller-visible id.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::component::ComponentHandle;

/// Tracks registry-owned instances and hands out unique string ids.
pub struct InstanceRegistry {
    default_prefix: String,
    instances: BTreeMap<String, ComponentHandle>,
    /// Sequence number for the next synthesized id.
    next_default: u32,
    /// Last collision suffix issued per candidate id.
    generations: HashMap<String, u32>,
}

impl InstanceRegistry {
    pub fn new(default_prefix: impl Into<String>) -> Self {
        Self {
            default_prefix: default_prefix.into(),
            instances: BTreeMap::new(),
            next_default: 1,
            generations: HashMap::new(),
        }
    }

    /// Picks an id that no live instance uses.
    ///
    /// Without a requested id a `<prefix>NNN` id is synthesized from a
    /// monotonic sequence. A taken candidate gets a numeric suffix appended,
    /// continuing from the last suffix handed out for that candidate.
    pub fn resolve_id(&mut self, requested: Option<&str>) -> String {
        let candidate = match requested {
            Some(id) => id.to_string(),
            None => {
                let id = format!("{}{:03}", self.default_prefix, self.next_default);
                self.next_default += 1;
                id
            }
        };

        if !self.instances.contains_key(&candidate) {
            return candidate;
        }

        let generation = self.generations.entry(candidate.clone()).or_insert(0);
        loop {
            *generation += 1;
            let next = format!("{}{}", candidate, generation);
            if !self.instances.contains_key(&next) {
                debug!(
                    "an object with id '{}' already exists, new id is '{}'",
                    candidate, next
                );
                return next;
            }
        }
    }

    /// Stores `handle` under a resolved id and returns that id.
    pub fn insert(&mut self, requested: Option<&str>, handle: ComponentHandle) -> String {
        let id = self.resolve_id(requested);
        self.instances.insert(id.clone(), handle);
        id
    }

    pub fn get(&self, id: &str) -> Option<ComponentHandle> {
        let found = self.instances.get(id).cloned();
        if found.is_none() {
            warn!("an object with id '{}' does not exist", id);
        }
        found
    }

    /// Reverse lookup by identity; the first id in iteration order wins.
    pub fn id_of(&self, handle: &ComponentHandle) -> Option<&str> {
        let found = self
            .instances
            .iter()
            .find(|(_, tracked)| ComponentHandle::ptr_eq(tracked, handle))
            .map(|(id, _)| id.as_str());
        if found.is_none() {
            warn!(
                "the requested object of type '{}' was not found",
                handle.kind()
            );
        }
        found
    }

    /// Ids of all tracked instances accepted by `filter`, in sorted order.
    pub fn ids(&self, filter: Option<&str>) -> Vec<String> {
        let filter = IdFilter::parse(filter);
        self.instances
            .keys()
            .filter(|id| filter.matches(id))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentHandle)> {
        self.instances.iter().map(|(id, handle)| (id.as_str(), handle))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Releases every tracked instance in id order and restarts id synthesis.
    pub fn clear(&mut self) -> usize {
        let released = self.instances.len();
        while let Some((id, handle)) = self.instances.pop_first() {
            debug!("release '{}' [ {} ]", id, handle.kind());
            drop(handle);
        }
        self.next_default = 1;
        self.generations.clear();
        released
    }
}

/// Comma-separated id filter. A token ending in `*` matches by prefix, any
/// other token matches exactly; tokens combine by union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    All,
    Tokens(Vec<IdToken>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdToken {
    Exact(String),
    Prefix(String),
}

impl IdFilter {
    pub fn parse(filter: Option<&str>) -> Self {
        match filter {
            None => IdFilter::All,
            Some(f) if f.is_empty() || f.starts_with('*') => IdFilter::All,
            Some(f) => IdFilter::Tokens(
                f.split(',')
                    .map(|token| match token.strip_suffix('*') {
                        Some(prefix) => IdToken::Prefix(prefix.to_string()),
                        None => IdToken::Exact(token.to_string()),
                    })
                    .collect(),
            ),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            IdFilter::All => true,
            IdFilter::Tokens(tokens) => tokens.iter().any(|token| match token {
                IdToken::Exact(exact) => id == exact,
                IdToken::Prefix(prefix) => id.starts_with(prefix.as_str()),
            }),
        }
    }
}

/// The two privileged component kinds that exist at most once per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingletonKind {
    EventHub,
    Clock,
}

/// Registry-held references to the live event hub and execution clock.
#[derive(Default)]
pub struct SingletonSlots {
    event_hub: Option<ComponentHandle>,
    clock: Option<ComponentHandle>,
}

impl SingletonSlots {
    pub fn get(&self, kind: SingletonKind) -> Option<ComponentHandle> {
        self.slot(kind).clone()
    }

    pub fn set(&mut self, kind: SingletonKind, handle: ComponentHandle) {
        *self.slot_mut(kind) = Some(handle);
    }

    /// Drops the event hub, then the clock.
    pub fn clear(&mut self) {
        self.event_hub.take();
        self.clock.take();
    }

    fn slot(&self, kind: SingletonKind) -> &Option<ComponentHandle> {
        match kind {
            SingletonKind::EventHub => &self.event_hub,
            SingletonKind::Clock => &self.clock,
        }
    }

    fn slot_mut(&mut self, kind: SingletonKind) -> &mut Option<ComponentHandle> {
        match kind {
            SingletonKind::EventHub => &mut self.event_hub,
            SingletonKind::Clock => &mut self.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use proptest::prelude::*;
    use std::sync::Arc;

    struct Dummy;

    impl Component for Dummy {
        fn kind(&self) -> &str {
            "Dummy"
        }
    }

    fn handle() -> ComponentHandle {
        ComponentHandle::new(Arc::new(Dummy))
    }

    #[test]
    fn test_synthesized_ids_are_sequential() {
        let mut registry = InstanceRegistry::new("obj");
        assert_eq!(registry.insert(None, handle()), "obj001");
        assert_eq!(registry.insert(None, handle()), "obj002");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_requested_id_collision_appends_suffix() {
        let mut registry = InstanceRegistry::new("obj");
        registry.insert(None, handle());

        assert_eq!(registry.insert(Some("obj001"), handle()), "obj0011");
        assert_eq!(registry.insert(Some("obj001"), handle()), "obj0012");
        // a suffix already taken by an explicit id is skipped
        registry.insert(Some("cam"), handle());
        registry.insert(Some("cam1"), handle());
        assert_eq!(registry.insert(Some("cam"), handle()), "cam2");
    }

    #[test]
    fn test_synthesized_id_skips_explicitly_taken() {
        let mut registry = InstanceRegistry::new("obj");
        registry.insert(Some("obj001"), handle());
        assert_eq!(registry.insert(None, handle()), "obj0011");
        assert_eq!(registry.insert(None, handle()), "obj002");
    }

    #[test]
    fn test_lookup_both_directions() {
        let mut registry = InstanceRegistry::new("obj");
        let first = handle();
        let untracked = handle();
        let id = registry.insert(Some("source"), first.clone());

        assert!(ComponentHandle::ptr_eq(&registry.get(&id).unwrap(), &first));
        assert_eq!(registry.id_of(&first), Some("source"));
        assert_eq!(registry.id_of(&untracked), None);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_clear_releases_and_restarts_ids() {
        let mut registry = InstanceRegistry::new("obj");
        let tracked = handle();
        registry.insert(None, tracked.clone());
        registry.insert(None, handle());
        assert_eq!(tracked.handle_count(), 2);

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert_eq!(tracked.handle_count(), 1);
        assert_eq!(registry.insert(None, handle()), "obj001");
    }

    #[test]
    fn test_filter_union_of_prefix_and_exact() {
        let mut registry = InstanceRegistry::new("obj");
        for id in ["Foo", "Foo1", "FooBar", "Bar", "Bar2", "Baz"] {
            registry.insert(Some(id), handle());
        }

        assert_eq!(
            registry.ids(Some("Foo*,Bar")),
            vec!["Bar", "Foo", "Foo1", "FooBar"]
        );
        assert_eq!(registry.ids(Some("Baz")), vec!["Baz"]);
        assert_eq!(registry.ids(Some("Nope")), Vec::<String>::new());
        assert_eq!(registry.ids(None).len(), 6);
        assert_eq!(registry.ids(Some("")).len(), 6);
        assert_eq!(registry.ids(Some("*")).len(), 6);
    }

    #[test]
    fn test_singleton_slots() {
        let mut slots = SingletonSlots::default();
        assert!(slots.get(SingletonKind::EventHub).is_none());

        let hub = handle();
        slots.set(SingletonKind::EventHub, hub.clone());
        assert!(ComponentHandle::ptr_eq(&slots.get(SingletonKind::EventHub).unwrap(), &hub));
        assert!(slots.get(SingletonKind::Clock).is_none());

        slots.clear();
        assert!(slots.get(SingletonKind::EventHub).is_none());
        assert_eq!(hub.handle_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_resolved_ids_are_unique(requests in prop::collection::vec(
            prop::option::of(prop::sample::select(vec!["a", "a1", "obj001", "b"])),
            1..40,
        )) {
            let mut registry = InstanceRegistry::new("obj");
            for requested in &requests {
                let before = registry.len();
                let id = registry.insert(*requested, handle());
                prop_assert_eq!(registry.len(), before + 1);
                if let Some(requested) = requested {
                    prop_assert!(id.starts_with(requested));
                }
            }
        }

        #[test]
        fn prop_exact_filter_matches_only_itself(id in "[a-z]{1,8}", other in "[a-z]{1,8}") {
            let filter = IdFilter::parse(Some(id.as_str()));
            prop_assert!(filter.matches(&id));
            prop_assert_eq!(filter.matches(&other), id == other);
        }
    }
}
