use std::fmt;

use super::{AggregateId, AggregateKind, FunctionId, ReturnType, StateType};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};

/// Resolved, immutable description of an aggregate.
///
/// Descriptors are produced by the resolver once per compile and shared by
/// every call site referencing the same aggregate.
#[derive(Debug, Clone)]
pub struct AggregateDescriptor {
    pub id: AggregateId,
    pub name: String,
    pub kind: AggregateKind,
    /// Declared argument types, direct arguments first.
    pub arg_types: Vec<DataType>,
    pub num_direct_args: usize,
    pub transition_fn: FunctionId,
    pub finalize_fn: Option<FunctionId>,
    pub combine_fn: Option<FunctionId>,
    pub serialize_fn: Option<FunctionId>,
    pub deserialize_fn: Option<FunctionId>,
    pub state_type: StateType,
    pub return_type: ReturnType,
    /// Transition function is strict.
    pub strict: bool,
    /// Finalize function is strict.
    pub finalize_strict: bool,
    pub initial_value: Option<ScalarValue>,
    pub behavior: &'static dyn AggregateBehavior,
}

impl AggregateDescriptor {
    pub fn is_combinable(&self) -> bool {
        self.combine_fn.is_some()
    }

    /// If partial states have to go through serialize/deserialize to leave
    /// the aggregate operator.
    pub fn needs_serialization(&self) -> bool {
        self.state_type.is_internal()
    }

    pub fn is_ordered_set(&self) -> bool {
        matches!(
            self.kind,
            AggregateKind::OrderedSet | AggregateKind::Hypothetical
        )
    }

    /// Result type given the types of the arguments at a call site.
    pub fn result_type(&self, args: &[DataType]) -> DataType {
        self.return_type.resolve(args)
    }

    /// Type of the partial state as stored in a column.
    pub fn state_storage_type(&self) -> DataType {
        self.state_type.storage_type()
    }

    /// Create the starting transition value for a new group.
    ///
    /// Returns the value and whether the aggregate is still waiting for its
    /// first input.
    pub fn new_transition_value(&self) -> (TransitionValue, bool) {
        if let Some(init) = &self.initial_value {
            return (TransitionValue::Datum(init.clone()), false);
        }
        match self.behavior.initial_state() {
            Some(state) => (state, false),
            None => (TransitionValue::null(), true),
        }
    }
}

impl fmt::Display for AggregateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.arg_types.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Functions used to split an aggregate into partial and combine phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineInfo {
    pub combine_fn: FunctionId,
    pub serialize_fn: Option<FunctionId>,
    pub deserialize_fn: Option<FunctionId>,
    pub state_type: StateType,
}
