use contquery_error::{DbError, Result};

use crate::functions::aggregate::TransitionValue;

/// Handle to a transition value stored in an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle(usize);

/// Storage for the transition values of every live group.
///
/// Slots released when a group is emitted get reused by the next group, so
/// a sorted aggregate only holds states for the groups currently open.
#[derive(Debug, Default)]
pub struct TransitionArena {
    slots: Vec<Option<TransitionValue>>,
    free: Vec<usize>,
}

impl TransitionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: TransitionValue) -> StateHandle {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(value);
                StateHandle(idx)
            }
            None => {
                self.slots.push(Some(value));
                StateHandle(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, handle: StateHandle) -> Result<&TransitionValue> {
        self.slots
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| released(handle))
    }

    pub fn get_mut(&mut self, handle: StateHandle) -> Result<&mut TransitionValue> {
        self.slots
            .get_mut(handle.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| released(handle))
    }

    /// Remove a value, freeing its slot.
    pub fn take(&mut self, handle: StateHandle) -> Result<TransitionValue> {
        let value = self
            .slots
            .get_mut(handle.0)
            .and_then(|slot| slot.take())
            .ok_or_else(|| released(handle))?;
        self.free.push(handle.0);
        Ok(value)
    }

    /// Number of values currently held.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

fn released(handle: StateHandle) -> DbError {
    DbError::new("Transition state already released").with_field("slot", handle.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;

    #[test]
    fn slots_are_reused() {
        let mut arena = TransitionArena::new();
        let a = arena.alloc(TransitionValue::Datum(ScalarValue::Int64(1)));
        let b = arena.alloc(TransitionValue::null());
        assert_eq!(2, arena.live());

        let v = arena.take(a).unwrap();
        assert_eq!(&ScalarValue::Int64(1), v.as_datum().unwrap());
        assert!(arena.get(a).is_err());

        let c = arena.alloc(TransitionValue::null());
        assert_eq!(a, c);
        assert_ne!(b, c);
        assert_eq!(2, arena.live());
    }
}
