//! # Server-Side Data Types
//!
//! Purpose: Apply data-type operations to stored values and render them back
//! into wire form.
//!
//! ## Design Principles
//! 1. **Commutative Ops**: Counter increments add; set adds and removes are
//!    idempotent per member; map updates recurse field by field.
//! 2. **Insertion Order**: Set members and map fields keep the order in which
//!    they first appeared, which keeps responses deterministic.
//! 3. **Removes First**: Within one map operation, removals apply before
//!    updates.

use pbkv_common::messages::{
    DataType, DtOp, DtValue, FlagOp, MapEntry, MapField, MapFieldType, MapOp, MapUpdate, SetOp,
};

/// Stored value of one data-type key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtState {
    Counter(i64),
    Set(Vec<Vec<u8>>),
    Map(MapState),
}

/// Fields of a stored map, in first-write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapState {
    fields: Vec<(Vec<u8>, FieldState)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    Counter(i64),
    Set(Vec<Vec<u8>>),
    Register(Vec<u8>),
    Flag(bool),
    Map(MapState),
}

impl FieldState {
    fn kind(&self) -> MapFieldType {
        match self {
            FieldState::Counter(_) => MapFieldType::Counter,
            FieldState::Set(_) => MapFieldType::Set,
            FieldState::Register(_) => MapFieldType::Register,
            FieldState::Flag(_) => MapFieldType::Flag,
            FieldState::Map(_) => MapFieldType::Map,
        }
    }

    fn empty(kind: MapFieldType) -> Self {
        match kind {
            MapFieldType::Counter => FieldState::Counter(0),
            MapFieldType::Set => FieldState::Set(Vec::new()),
            MapFieldType::Register => FieldState::Register(Vec::new()),
            MapFieldType::Flag => FieldState::Flag(false),
            MapFieldType::Map => FieldState::Map(MapState::default()),
        }
    }
}

impl DtState {
    /// Empty value of a data type.
    pub fn empty(kind: DataType) -> Self {
        match kind {
            DataType::Counter => DtState::Counter(0),
            DataType::Set => DtState::Set(Vec::new()),
            DataType::Map => DtState::Map(MapState::default()),
        }
    }

    pub fn kind(&self) -> DataType {
        match self {
            DtState::Counter(_) => DataType::Counter,
            DtState::Set(_) => DataType::Set,
            DtState::Map(_) => DataType::Map,
        }
    }

    /// Data type an operation targets, if it carries exactly one.
    pub fn op_kind(op: &DtOp) -> Option<DataType> {
        match (&op.counter_op, &op.set_op, &op.map_op) {
            (Some(_), None, None) => Some(DataType::Counter),
            (None, Some(_), None) => Some(DataType::Set),
            (None, None, Some(_)) => Some(DataType::Map),
            _ => None,
        }
    }

    /// Applies an operation whose kind matches this value.
    pub fn apply(&mut self, op: &DtOp) -> Result<(), String> {
        match (self, &op.counter_op, &op.set_op, &op.map_op) {
            (DtState::Counter(value), Some(counter), None, None) => {
                *value = value.wrapping_add(counter.increment.unwrap_or(1));
                Ok(())
            }
            (DtState::Set(members), None, Some(set), None) => {
                apply_set(members, set);
                Ok(())
            }
            (DtState::Map(map), None, None, Some(map_op)) => map.apply(map_op),
            (state, ..) => Err(format!(
                "operation does not match stored {:?}",
                state.kind()
            )),
        }
    }

    pub fn to_value(&self) -> DtValue {
        match self {
            DtState::Counter(value) => DtValue {
                counter_value: Some(*value),
                ..Default::default()
            },
            DtState::Set(members) => DtValue {
                set_value: members.clone(),
                ..Default::default()
            },
            DtState::Map(map) => DtValue {
                map_value: map.entries(),
                ..Default::default()
            },
        }
    }
}

fn apply_set(members: &mut Vec<Vec<u8>>, op: &SetOp) {
    members.retain(|m| !op.removes.contains(m));
    for add in &op.adds {
        if !members.contains(add) {
            members.push(add.clone());
        }
    }
}

impl MapState {
    fn apply(&mut self, op: &MapOp) -> Result<(), String> {
        for field in &op.removes {
            let kind = field_kind(field)?;
            self.fields
                .retain(|(name, state)| !(name == &field.name && state.kind() == kind));
        }
        for update in &op.updates {
            self.update(update)?;
        }
        Ok(())
    }

    fn update(&mut self, update: &MapUpdate) -> Result<(), String> {
        let field = update
            .field
            .as_ref()
            .ok_or_else(|| "map update without a field".to_string())?;
        let kind = field_kind(field)?;
        let slot = match self
            .fields
            .iter()
            .position(|(name, state)| name == &field.name && state.kind() == kind)
        {
            Some(idx) => &mut self.fields[idx].1,
            None => {
                self.fields
                    .push((field.name.clone(), FieldState::empty(kind)));
                let last = self.fields.len() - 1;
                &mut self.fields[last].1
            }
        };

        match slot {
            FieldState::Counter(value) => {
                let delta = update
                    .counter_op
                    .as_ref()
                    .and_then(|op| op.increment)
                    .unwrap_or(0);
                *value = value.wrapping_add(delta);
            }
            FieldState::Set(members) => {
                if let Some(op) = &update.set_op {
                    apply_set(members, op);
                }
            }
            FieldState::Register(value) => {
                if let Some(op) = &update.register_op {
                    *value = op.clone();
                }
            }
            FieldState::Flag(enabled) => {
                if let Some(op) = update.flag_op {
                    *enabled = FlagOp::try_from(op).ok() == Some(FlagOp::Enable);
                }
            }
            FieldState::Map(nested) => {
                if let Some(op) = &update.map_op {
                    nested.apply(op)?;
                }
            }
        }
        Ok(())
    }

    fn entries(&self) -> Vec<MapEntry> {
        self.fields
            .iter()
            .map(|(name, state)| {
                let mut entry = MapEntry {
                    field: Some(MapField {
                        name: name.clone(),
                        r#type: state.kind() as i32,
                    }),
                    ..Default::default()
                };
                match state {
                    FieldState::Counter(value) => entry.counter_value = Some(*value),
                    FieldState::Set(members) => entry.set_value = members.clone(),
                    FieldState::Register(value) => entry.register_value = Some(value.clone()),
                    FieldState::Flag(enabled) => entry.flag_value = Some(*enabled),
                    FieldState::Map(nested) => entry.map_value = nested.entries(),
                }
                entry
            })
            .collect()
    }
}

fn field_kind(field: &MapField) -> Result<MapFieldType, String> {
    field
        .kind()
        .ok_or_else(|| format!("unknown map field type {}", field.r#type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbkv_common::messages::CounterOp;

    fn field(name: &str, kind: MapFieldType) -> Option<MapField> {
        Some(MapField::new(name, kind))
    }

    #[test]
    fn counter_adds_increments() {
        let mut state = DtState::empty(DataType::Counter);
        for delta in [1, 5, -3] {
            state
                .apply(&DtOp {
                    counter_op: Some(CounterOp {
                        increment: Some(delta),
                    }),
                    ..Default::default()
                })
                .unwrap();
        }
        assert_eq!(state, DtState::Counter(3));
    }

    #[test]
    fn set_keeps_first_insertion_order() {
        let mut state = DtState::Set(vec![b"b".to_vec()]);
        let op = DtOp {
            set_op: Some(SetOp {
                adds: vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
                removes: vec![b"missing".to_vec()],
            }),
            ..Default::default()
        };
        state.apply(&op).unwrap();
        state.apply(&op).unwrap();
        assert_eq!(
            state.to_value().set_value,
            vec![b"b".to_vec(), b"a".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn map_removes_apply_before_updates() {
        let mut state = DtState::empty(DataType::Map);
        let set_register = |value: &[u8]| MapUpdate {
            field: field("r", MapFieldType::Register),
            register_op: Some(value.to_vec()),
            ..Default::default()
        };
        state
            .apply(&DtOp {
                map_op: Some(MapOp {
                    removes: vec![],
                    updates: vec![set_register(b"one")],
                }),
                ..Default::default()
            })
            .unwrap();
        state
            .apply(&DtOp {
                map_op: Some(MapOp {
                    removes: vec![MapField::new("r", MapFieldType::Register)],
                    updates: vec![set_register(b"two")],
                }),
                ..Default::default()
            })
            .unwrap();
        let entries = state.to_value().map_value;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].register_value.as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn mismatched_op_is_rejected() {
        let mut state = DtState::empty(DataType::Set);
        let op = DtOp {
            counter_op: Some(CounterOp { increment: Some(1) }),
            ..Default::default()
        };
        assert!(state.apply(&op).is_err());
        assert_eq!(DtState::op_kind(&op), Some(DataType::Counter));
    }
}
