use std::collections::BTreeMap;

use pbkv_common::messages::{FlagOp, MapEntry, MapField, MapFieldType, MapOp, MapUpdate};

use super::counter::Counter;
use super::set::Set;

/// Map data type: named fields of five kinds, nested to any depth.
///
/// Fields can be edited directly through the public maps. Use
/// [`Map::remove`] to delete a field so the removal reaches the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Map {
    pub flags: BTreeMap<String, bool>,
    pub registers: BTreeMap<String, String>,
    pub counters: BTreeMap<String, Counter>,
    pub sets: BTreeMap<String, Set>,
    pub maps: BTreeMap<String, Map>,
    removed: Vec<MapField>,
}

impl Map {
    pub fn new() -> Self {
        Map::default()
    }

    /// Deletes a field locally and stages its removal for the next commit.
    pub fn remove(&mut self, kind: MapFieldType, name: &str) {
        match kind {
            MapFieldType::Flag => {
                self.flags.remove(name);
            }
            MapFieldType::Register => {
                self.registers.remove(name);
            }
            MapFieldType::Counter => {
                self.counters.remove(name);
            }
            MapFieldType::Set => {
                self.sets.remove(name);
            }
            MapFieldType::Map => {
                self.maps.remove(name);
            }
        }
        let field = MapField::new(name, kind);
        if !self.removed.contains(&field) {
            self.removed.push(field);
        }
    }

    /// Removals staged since the last commit.
    pub fn removed(&self) -> &[MapField] {
        &self.removed
    }

    /// Number of fields across all kinds.
    pub fn len(&self) -> usize {
        self.flags.len() + self.registers.len() + self.counters.len() + self.sets.len() + self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One update per present field, recursing into nested maps, plus the
    /// staged removals.
    pub(crate) fn pack(&self) -> MapOp {
        let mut updates = Vec::with_capacity(self.len());
        for (name, enabled) in &self.flags {
            let op = if *enabled { FlagOp::Enable } else { FlagOp::Disable };
            updates.push(MapUpdate {
                field: Some(MapField::new(name, MapFieldType::Flag)),
                flag_op: Some(op as i32),
                ..Default::default()
            });
        }
        for (name, value) in &self.registers {
            updates.push(MapUpdate {
                field: Some(MapField::new(name, MapFieldType::Register)),
                register_op: Some(value.as_bytes().to_vec()),
                ..Default::default()
            });
        }
        for (name, counter) in &self.counters {
            updates.push(MapUpdate {
                field: Some(MapField::new(name, MapFieldType::Counter)),
                counter_op: Some(counter.pack()),
                ..Default::default()
            });
        }
        for (name, set) in &self.sets {
            updates.push(MapUpdate {
                field: Some(MapField::new(name, MapFieldType::Set)),
                set_op: Some(set.pack()),
                ..Default::default()
            });
        }
        for (name, map) in &self.maps {
            updates.push(MapUpdate {
                field: Some(MapField::new(name, MapFieldType::Map)),
                map_op: Some(map.pack()),
                ..Default::default()
            });
        }
        MapOp {
            removes: self.removed.clone(),
            updates,
        }
    }

    /// Replaces every field with the server's entries, recursing into nested
    /// maps. Entries without a field or with an unknown kind are skipped.
    pub(crate) fn unpack(&mut self, entries: &[MapEntry]) {
        *self = Map::from_entries(entries);
    }

    pub(crate) fn from_entries(entries: &[MapEntry]) -> Self {
        let mut map = Map::new();
        for entry in entries {
            let Some(field) = entry.field.as_ref() else {
                continue;
            };
            let Some(kind) = field.kind() else {
                continue;
            };
            let name = String::from_utf8_lossy(&field.name).into_owned();
            match kind {
                MapFieldType::Flag => {
                    map.flags.insert(name, entry.flag_value.unwrap_or(false));
                }
                MapFieldType::Register => {
                    let value = entry.register_value.as_deref().unwrap_or_default();
                    map.registers
                        .insert(name, String::from_utf8_lossy(value).into_owned());
                }
                MapFieldType::Counter => {
                    map.counters
                        .insert(name, Counter::with_value(entry.counter_value.unwrap_or(0)));
                }
                MapFieldType::Set => {
                    map.sets.insert(name, Set::from_wire(&entry.set_value));
                }
                MapFieldType::Map => {
                    map.maps.insert(name, Map::from_entries(&entry.map_value));
                }
            }
        }
        map
    }

    /// Applies staged changes locally, for commits that return no body.
    pub(crate) fn fold_pending(&mut self) {
        self.removed.clear();
        for counter in self.counters.values_mut() {
            counter.fold_pending();
        }
        for set in self.sets.values_mut() {
            set.fold_pending();
        }
        for map in self.maps.values_mut() {
            map.fold_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(op: &'a MapOp, name: &str) -> &'a MapUpdate {
        op.updates
            .iter()
            .find(|u| u.field.as_ref().map(|f| f.name.as_slice()) == Some(name.as_bytes()))
            .unwrap()
    }

    #[test]
    fn pack_emits_every_kind() {
        let mut map = Map::new();
        map.flags.insert("f".into(), false);
        map.registers.insert("r".into(), "v".into());
        map.counters.insert("c".into(), Counter::new());
        map.counters.get_mut("c").unwrap().increment(4);
        map.sets.insert("s".into(), Set::new());
        map.sets.get_mut("s").unwrap().add("m");
        map.maps.insert("m".into(), Map::new());

        let op = map.pack();
        assert_eq!(op.updates.len(), 5);
        assert_eq!(find(&op, "f").flag_op, Some(FlagOp::Disable as i32));
        assert_eq!(find(&op, "r").register_op.as_deref(), Some(&b"v"[..]));
        assert_eq!(find(&op, "c").counter_op.as_ref().unwrap().increment, Some(4));
        assert_eq!(find(&op, "s").set_op.as_ref().unwrap().adds, vec![b"m".to_vec()]);
        assert!(find(&op, "m").map_op.as_ref().unwrap().updates.is_empty());
    }

    #[test]
    fn remove_is_immediate_and_staged_once() {
        let mut map = Map::new();
        map.registers.insert("r".into(), "v".into());
        map.remove(MapFieldType::Register, "r");
        map.remove(MapFieldType::Register, "r");
        assert!(map.registers.is_empty());
        assert_eq!(map.removed(), [MapField::new("r", MapFieldType::Register)]);
        assert_eq!(map.pack().removes.len(), 1);
    }

    #[test]
    fn unpack_skips_malformed_entries() {
        let entries = vec![
            MapEntry::default(),
            MapEntry {
                field: Some(MapField {
                    name: b"odd".to_vec(),
                    r#type: 77,
                }),
                ..Default::default()
            },
            MapEntry {
                field: Some(MapField::new("ok", MapFieldType::Flag)),
                flag_value: Some(true),
                ..Default::default()
            },
        ];
        let map = Map::from_entries(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map.flags.get("ok"), Some(&true));
    }

    #[test]
    fn fold_clears_nested_pending() {
        let mut inner = Map::new();
        inner.counters.insert("c".into(), Counter::with_value(1));
        inner.counters.get_mut("c").unwrap().increment(2);
        inner.remove(MapFieldType::Flag, "gone");
        let mut outer = Map::new();
        outer.maps.insert("inner".into(), inner);

        outer.fold_pending();
        let inner = &outer.maps["inner"];
        assert_eq!(inner.counters["c"].value(), 3);
        assert!(inner.removed().is_empty());
    }
}
