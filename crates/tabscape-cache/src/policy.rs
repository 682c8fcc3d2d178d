/// Decides whether a periodic tick should refresh the cache
///
/// Receives the number of stored items and the number of reads served since
/// the last completed refresh.
pub trait RefreshPolicy: Send + Sync {
    fn is_due(&self, items: usize, hits: u64) -> bool;
}

impl<F> RefreshPolicy for F
where
    F: Fn(usize, u64) -> bool + Send + Sync,
{
    fn is_due(&self, items: usize, hits: u64) -> bool {
        self(items, hits)
    }
}

/// Popularity-driven refresh: due once a non-empty cache has served more
/// than `threshold` reads.
///
/// An empty cache is never due here. Empty caches refresh on construction
/// or when somebody actually asks for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitThreshold {
    pub threshold: u64,
}

impl HitThreshold {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl RefreshPolicy for HitThreshold {
    fn is_due(&self, items: usize, hits: u64) -> bool {
        items > 0 && hits > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_never_due() {
        let policy = HitThreshold::new(0);
        assert!(!policy.is_due(0, 0));
        assert!(!policy.is_due(0, 1_000));
    }

    #[test]
    fn test_due_only_above_threshold() {
        let policy = HitThreshold::new(10);
        assert!(!policy.is_due(5, 9));
        assert!(!policy.is_due(5, 10));
        assert!(policy.is_due(5, 11));
    }

    #[test]
    fn test_closure_policy() {
        let always = |_items: usize, _hits: u64| true;
        assert!(always.is_due(0, 0));
    }
}
