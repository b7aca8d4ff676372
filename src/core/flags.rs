use std::collections::{BTreeMap, BTreeSet};

// Copy-on-write flag set. Every `with_*` method consumes the value and hands
// back an updated one; callers hold the current flags by value and replace
// them wholesale. An unchanged update returns the input untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationFlags {
    survivor_mode: bool,
    refill_mode: bool,
    active_contingencies: BTreeSet<String>,
    custom: BTreeMap<String, String>,
}

impl SimulationFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn survivor_mode(&self) -> bool {
        self.survivor_mode
    }

    pub fn refill_mode(&self) -> bool {
        self.refill_mode
    }

    pub fn active_contingencies(&self) -> &BTreeSet<String> {
        &self.active_contingencies
    }

    pub fn is_contingency_active(&self, category: &str) -> bool {
        self.active_contingencies.contains(category)
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }

    pub fn with_survivor_mode(self, on: bool) -> Self {
        if self.survivor_mode == on {
            return self;
        }
        Self {
            survivor_mode: on,
            ..self
        }
    }

    pub fn with_refill_mode(self, on: bool) -> Self {
        if self.refill_mode == on {
            return self;
        }
        Self {
            refill_mode: on,
            ..self
        }
    }

    pub fn with_contingency(mut self, category: &str, active: bool) -> Self {
        if active == self.active_contingencies.contains(category) {
            return self;
        }
        if active {
            self.active_contingencies.insert(category.to_string());
        } else {
            self.active_contingencies.remove(category);
        }
        self
    }

    pub fn with_custom(mut self, key: &str, value: &str) -> Self {
        if self.custom.get(key).is_some_and(|v| v == value) {
            return self;
        }
        self.custom.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_updates_are_identity() {
        let flags = SimulationFlags::new();
        assert_eq!(flags.clone(), flags.clone().with_survivor_mode(false));
        assert_eq!(flags.clone(), flags.clone().with_refill_mode(false));
        assert_eq!(flags.clone(), flags.clone().with_contingency("health", false));
    }

    #[test]
    fn contingencies_toggle_independently() {
        let flags = SimulationFlags::new()
            .with_contingency("health", true)
            .with_contingency("travel", true)
            .with_contingency("health", false);
        assert!(!flags.is_contingency_active("health"));
        assert!(flags.is_contingency_active("travel"));
        assert_eq!(flags.active_contingencies().len(), 1);
    }

    #[test]
    fn custom_flags_round_trip() {
        let flags = SimulationFlags::new().with_custom("scenario", "baseline");
        assert_eq!(flags.custom("scenario"), Some("baseline"));
        assert_eq!(flags.custom("missing"), None);

        let updated = flags.clone().with_custom("scenario", "baseline");
        assert_eq!(flags, updated);
    }

    #[test]
    fn survivor_mode_round_trips() {
        let flags = SimulationFlags::new().with_survivor_mode(true);
        assert!(flags.survivor_mode());
        assert!(!flags.with_survivor_mode(false).survivor_mode());
    }
}
