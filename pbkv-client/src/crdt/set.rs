use pbkv_common::messages::SetOp;

/// Set data type.
///
/// `values` is an optimistic local view in insertion order; `adds` and
/// `removes` are what the next commit will send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    values: Vec<String>,
    adds: Vec<String>,
    removes: Vec<String>,
}

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    /// Set holding members already known to the server.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Set::new();
        for value in values {
            let value = value.into();
            if !set.values.contains(&value) {
                set.values.push(value);
            }
        }
        set
    }

    pub(crate) fn from_wire(values: &[Vec<u8>]) -> Self {
        Set::from_values(values.iter().map(|v| String::from_utf8_lossy(v).into_owned()))
    }

    /// Stages an add. Members stay distinct in the local view.
    pub fn add(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.removes.retain(|r| r != &value);
        if !self.values.contains(&value) {
            self.values.push(value.clone());
        }
        if !self.adds.contains(&value) {
            self.adds.push(value);
        }
    }

    /// Stages a removal and drops the first matching member from the local
    /// view. Returns whether a member was dropped.
    pub fn remove(&mut self, value: &str) -> bool {
        self.adds.retain(|a| a != value);
        if !self.removes.iter().any(|r| r == value) {
            self.removes.push(value.to_string());
        }
        match self.values.iter().position(|v| v == value) {
            Some(idx) => {
                self.values.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn pending_adds(&self) -> &[String] {
        &self.adds
    }

    pub fn pending_removes(&self) -> &[String] {
        &self.removes
    }

    pub(crate) fn pack(&self) -> SetOp {
        SetOp {
            adds: self.adds.iter().map(|v| v.as_bytes().to_vec()).collect(),
            removes: self.removes.iter().map(|v| v.as_bytes().to_vec()).collect(),
        }
    }

    /// Replaces the local view with the server's member list.
    pub(crate) fn replace(&mut self, values: &[Vec<u8>]) {
        *self = Set::from_wire(values);
    }

    /// The local view already reflects staged changes; only the queue empties.
    pub(crate) fn fold_pending(&mut self) {
        self.adds.clear();
        self.removes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_stay_distinct() {
        let mut set = Set::from_values(["a", "b"]);
        set.add("a");
        set.add("c");
        set.add("c");
        assert_eq!(set.values(), ["a", "b", "c"]);
        assert_eq!(set.pending_adds(), ["a", "c"]);
    }

    #[test]
    fn remove_drops_first_occurrence_and_is_staged() {
        let mut set = Set::from_values(["x", "y"]);
        assert!(set.remove("x"));
        assert!(!set.remove("missing"));
        assert_eq!(set.values(), ["y"]);
        let op = set.pack();
        assert!(op.adds.is_empty());
        assert_eq!(op.removes, vec![b"x".to_vec(), b"missing".to_vec()]);
    }

    #[test]
    fn add_then_remove_cancels_the_add() {
        let mut set = Set::new();
        set.add("z");
        set.remove("z");
        assert!(set.is_empty());
        assert!(set.pending_adds().is_empty());
        assert_eq!(set.pending_removes(), ["z"]);
    }

    #[test]
    fn replace_takes_server_view() {
        let mut set = Set::from_values(["a"]);
        set.add("b");
        set.replace(&[b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(set.values(), ["b", "c"]);
        assert!(set.pending_adds().is_empty());
    }
}
