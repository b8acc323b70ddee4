//! Connection id minting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Mints unique identifiers for connections whose peer did not supply one.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh id.
    fn next_id(&self) -> String;
}

/// UUID v7 ids (time-ordered, so registry dumps sort by arrival).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... Deterministic ids for tests and tooling.
#[derive(Debug)]
pub struct SequenceGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Start a sequence at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequenceGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidGenerator;
        let set: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(set.len(), 1000);
    }

    #[test]
    fn uuid_ids_parse_as_v7() {
        let id = UuidGenerator.next_id();
        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn sequence_counts_from_one() {
        let ids = SequenceGenerator::new("conn");
        assert_eq!(ids.next_id(), "conn-1");
        assert_eq!(ids.next_id(), "conn-2");
    }

    #[test]
    fn generators_are_object_safe() {
        let ids: Box<dyn IdGenerator> = Box::new(SequenceGenerator::new("x"));
        assert_eq!(ids.next_id(), "x-1");
    }
}
