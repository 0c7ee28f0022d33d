use std::fmt;
use std::sync::Arc;

use super::{PhysicalExpr, PhysicalSortExpr};
use crate::arrays::datatype::DataType;
use crate::arrays::field::{AggregateStateRef, Field};
use crate::catalog::descriptor::AggregateDescriptor;

/// Position of an aggregate in a split plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateRole {
    /// Unsplit, computes final values directly.
    Single,
    /// Produces partial states over incoming rows.
    Worker,
    /// Merges partial states produced by a worker.
    Combiner,
}

/// How an aggregate's inputs and outputs relate to partial states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateSplit {
    pub role: AggregateRole,
    /// Input is a partial state merged with the combine function.
    pub combine_input: bool,
    /// Input states went through the serialize function.
    pub deserialize_input: bool,
    /// Emit the transition state instead of the final value.
    pub skip_finalize: bool,
    /// Serialize emitted states.
    pub serialize_output: bool,
}

impl AggregateSplit {
    pub const SINGLE: AggregateSplit = AggregateSplit {
        role: AggregateRole::Single,
        combine_input: false,
        deserialize_input: false,
        skip_finalize: false,
        serialize_output: false,
    };

    /// Merge stored states of an aggregate, emitting the merged state.
    pub fn combining(descriptor: &AggregateDescriptor, deserialize_input: bool) -> Self {
        AggregateSplit {
            role: AggregateRole::Single,
            combine_input: true,
            deserialize_input,
            skip_finalize: true,
            serialize_output: descriptor.needs_serialization(),
        }
    }
}

/// An aggregate call bound for execution.
#[derive(Debug, Clone)]
pub struct PhysicalAggregate {
    pub descriptor: Arc<AggregateDescriptor>,
    /// Name of the output column.
    pub name: String,
    /// Aggregated arguments, evaluated per row.
    pub args: Vec<PhysicalExpr>,
    /// Ordered-set direct arguments, evaluated once per group.
    pub direct_args: Vec<PhysicalExpr>,
    pub distinct: bool,
    pub order_by: Vec<PhysicalSortExpr>,
    pub filter: Option<PhysicalExpr>,
    pub split: AggregateSplit,
    /// For a combiner, the arguments of the worker aggregate producing its
    /// input states.
    pub worker_args: Vec<PhysicalExpr>,
    /// Types of direct then aggregated arguments at the call site.
    pub input_types: Vec<DataType>,
}

impl PhysicalAggregate {
    /// If inputs need to be buffered and sorted before being fed to the
    /// transition function.
    pub fn needs_sort_buffer(&self) -> bool {
        !self.split.combine_input && (self.distinct || !self.order_by.is_empty())
    }

    pub fn output_field(&self) -> Field {
        if self.split.skip_finalize {
            let datatype = if self.split.serialize_output {
                DataType::Binary
            } else {
                self.descriptor.state_storage_type()
            };
            Field::new(self.name.clone(), datatype).with_state_of(AggregateStateRef {
                aggregate: self.descriptor.id,
                serialized: self.split.serialize_output,
            })
        } else {
            Field::new(
                self.name.clone(),
                self.descriptor.result_type(&self.input_types),
            )
        }
    }
}

impl fmt::Display for PhysicalAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.split.combine_input {
            write!(f, "combine[{}](", self.descriptor.name)?;
        } else {
            write!(f, "{}(", self.descriptor.name)?;
        }
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        let args = self.direct_args.iter().chain(&self.args);
        for (idx, arg) in args.enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (idx, key) in self.order_by.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}")?;
            }
        }
        write!(f, ")")?;
        if let Some(filter) = &self.filter {
            write!(f, " FILTER ({filter})")?;
        }
        Ok(())
    }
}
