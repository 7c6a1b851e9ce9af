//! ID generation utilities.

use std::sync::{LazyLock, Mutex};

use ulid::{Generator, Ulid};

/// Process-wide monotonic source, so IDs issued within the same millisecond
/// still sort in issue order.
static MONOTONIC: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// IDs sort lexicographically in the order they were generated by this
    /// process. The delivery queue relies on this to replay tasks for one
    /// inbox in the order they were enqueued.
    #[must_use]
    pub fn generate(&self) -> String {
        let ulid = MONOTONIC
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok())
            .unwrap_or_else(Ulid::new);
        ulid.to_string().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_eq!(id2.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_is_monotonic() {
        let id_gen = IdGenerator::new();
        let ids: Vec<String> = (0..64).map(|_| id_gen.generate()).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
