/// The namespace of ids the store generates itself.
///
/// Generated ids are `prefix + n` with `n` counting up from 1. The counter
/// never falls behind a suffix observed in the store, so reloading a snapshot
/// and then generating more ids cannot collide.
#[derive(Debug, Clone)]
pub(crate) struct IdSpace {
    prefix: String,
    counter: u64,
}

impl IdSpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        IdSpace {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn generate(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, self.counter)
    }

    pub fn is_generated(&self, id: &str) -> bool {
        id.starts_with(&self.prefix)
    }

    /// Advances the counter past the suffix of a generated id.
    pub fn observe(&mut self, id: &str) {
        if let Some(n) = self.suffix(id) {
            self.counter = self.counter.max(n);
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn suffix(&self, id: &str) -> Option<u64> {
        id.strip_prefix(self.prefix.as_str())?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_counts_from_one() {
        let mut ids = IdSpace::new("__");
        assert_eq!(ids.generate(), "__1");
        assert_eq!(ids.generate(), "__2");
        assert_eq!(ids.counter(), 2);
    }

    #[test]
    fn observe_only_advances() {
        let mut ids = IdSpace::new("__");
        ids.observe("__7");
        ids.observe("__3");
        ids.observe("a");
        ids.observe("__x");
        assert_eq!(ids.counter(), 7);
        assert_eq!(ids.generate(), "__8");
    }

    #[test]
    fn generated_namespace() {
        let ids = IdSpace::new("gen-");
        assert!(ids.is_generated("gen-4"));
        assert!(!ids.is_generated("root"));
    }
}
