//! Zone ladder
//!
//! Ordered, immutable zone definitions with O(1) rank and label lookup.

use std::collections::HashMap;

use crate::config::schema::ZoneDefinition;

/// Immutable zone ladder for one session.
#[derive(Debug, Clone)]
pub struct ZoneLadder {
    zones: Vec<ZoneDefinition>,
    index: HashMap<String, usize>,
}

impl ZoneLadder {
    /// Builds a ladder from validated zone definitions.
    ///
    /// Duplicate ids are rejected by the config validator; if any slip
    /// through, the first definition wins.
    #[must_use]
    pub fn new(zones: Vec<ZoneDefinition>) -> Self {
        let mut index = HashMap::with_capacity(zones.len());
        for (idx, zone) in zones.iter().enumerate() {
            index.entry(zone.id.clone()).or_insert(idx);
        }
        Self { zones, index }
    }

    /// Returns the rank of `zone_id`, if the ladder knows it.
    #[must_use]
    pub fn rank(&self, zone_id: &str) -> Option<i64> {
        self.get(zone_id).map(|z| z.rank)
    }

    /// Returns the human-readable name of `zone_id`.
    #[must_use]
    pub fn label(&self, zone_id: &str) -> Option<&str> {
        self.get(zone_id).map(|z| z.name.as_str())
    }

    /// Returns the full definition of `zone_id`.
    #[must_use]
    pub fn get(&self, zone_id: &str) -> Option<&ZoneDefinition> {
        self.index.get(zone_id).map(|&idx| &self.zones[idx])
    }

    /// Returns `true` if `zone_id` is on the ladder.
    #[must_use]
    pub fn contains(&self, zone_id: &str) -> bool {
        self.index.contains_key(zone_id)
    }

    /// Iterates zones from lowest to highest rank.
    pub fn iter(&self) -> impl Iterator<Item = &ZoneDefinition> {
        self.zones.iter()
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns `true` if the ladder has no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
