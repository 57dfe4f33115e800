use pbkv_common::messages::CounterOp;

/// Counter data type: the last value seen from the server plus a local delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    value: i64,
    pending: i64,
}

impl Counter {
    pub fn new() -> Self {
        Counter::default()
    }

    /// Counter whose server value is already known.
    pub fn with_value(value: i64) -> Self {
        Counter { value, pending: 0 }
    }

    pub fn increment(&mut self, by: i64) {
        self.pending = self.pending.wrapping_add(by);
    }

    pub fn decrement(&mut self, by: i64) {
        self.pending = self.pending.wrapping_sub(by);
    }

    /// Value as of the last fetch or commit; pending deltas are not included.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Delta staged since the last commit.
    pub fn pending(&self) -> i64 {
        self.pending
    }

    pub(crate) fn pack(&self) -> CounterOp {
        CounterOp {
            increment: Some(self.pending),
        }
    }

    /// Adopts the server's post-commit value and drops the staged delta.
    pub(crate) fn replace(&mut self, value: i64) {
        self.value = value;
        self.pending = 0;
    }

    /// Applies the staged delta locally, for commits that return no body.
    pub(crate) fn fold_pending(&mut self) {
        self.value = self.value.wrapping_add(self.pending);
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accumulate_until_folded() {
        let mut counter = Counter::with_value(1);
        counter.increment(5);
        counter.decrement(2);
        assert_eq!(counter.value(), 1);
        assert_eq!(counter.pack().increment, Some(3));
        counter.fold_pending();
        assert_eq!(counter.value(), 4);
        assert_eq!(counter.pending(), 0);
    }

    #[test]
    fn replace_discards_pending() {
        let mut counter = Counter::new();
        counter.increment(10);
        counter.replace(42);
        assert_eq!(counter, Counter::with_value(42));
    }
}
