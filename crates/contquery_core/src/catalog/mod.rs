//! Versioned registry of aggregate functions and their combine descriptors.
//!
//! Aggregates are registered with the functions they're built from
//! (transition and finalize). Combine descriptors are registered separately,
//! keyed by the (finalize, transition) pair, so two aggregates built from the
//! same functions share a single combine descriptor.
pub mod descriptor;
pub mod resolver;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use contquery_error::{DbError, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::AggregateBehavior;
use crate::functions::aggregate::builtin::builtin_aggregates;
use crate::functions::documentation::Documentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateId(pub u32);

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agg#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Normal,
    /// `percentile_cont(0.5) WITHIN GROUP (ORDER BY x)`
    OrderedSet,
    /// `rank(3) WITHIN GROUP (ORDER BY x)`
    Hypothetical,
}

/// Type of an aggregate's transition state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateType {
    /// State is a regular value of this type.
    Value(DataType),
    /// Opaque state, only transportable through serialize/deserialize.
    Internal,
}

impl StateType {
    pub const fn is_internal(&self) -> bool {
        matches!(self, StateType::Internal)
    }

    /// Type of the column holding this state in a materialized relation.
    pub fn storage_type(&self) -> DataType {
        match self {
            Self::Value(datatype) => datatype.clone(),
            Self::Internal => DataType::Binary,
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(datatype) => write!(f, "{datatype}"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// How an aggregate's result type is derived from its argument types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Fixed(DataType),
    /// Same type as the argument at this position.
    SameAsArg(usize),
    /// A list of the argument at this position.
    ListOfArg(usize),
}

impl ReturnType {
    pub fn resolve(&self, args: &[DataType]) -> DataType {
        match self {
            Self::Fixed(datatype) => datatype.clone(),
            Self::SameAsArg(idx) => args.get(*idx).cloned().unwrap_or(DataType::Any),
            Self::ListOfArg(idx) => DataType::list(args.get(*idx).cloned().unwrap_or(DataType::Any)),
        }
    }
}

/// A function referenced by an aggregate definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    /// Strict functions are never called with null inputs.
    pub strict: bool,
}

impl FunctionDef {
    pub fn strict(name: impl Into<String>) -> Self {
        FunctionDef {
            name: name.into(),
            strict: true,
        }
    }

    pub fn non_strict(name: impl Into<String>) -> Self {
        FunctionDef {
            name: name.into(),
            strict: false,
        }
    }
}

/// Everything needed to register a new aggregate.
#[derive(Debug, Clone)]
pub struct AggregateDefinition {
    pub name: String,
    /// Argument types, including direct arguments for ordered-set aggregates.
    pub arg_types: Vec<DataType>,
    pub kind: AggregateKind,
    /// Leading arguments evaluated once per group and passed to finalize.
    pub num_direct_args: usize,
    pub transition: FunctionDef,
    pub finalize: Option<FunctionDef>,
    pub state_type: StateType,
    pub return_type: ReturnType,
    pub initial_value: Option<ScalarValue>,
    pub behavior: &'static dyn AggregateBehavior,
    pub doc: Option<&'static Documentation>,
}

impl AggregateDefinition {
    /// Start a definition for a normal aggregate whose result is the raw
    /// state.
    pub fn new(
        name: impl Into<String>,
        arg_types: Vec<DataType>,
        transition: FunctionDef,
        state_type: StateType,
        behavior: &'static dyn AggregateBehavior,
    ) -> Self {
        let return_type = match &state_type {
            StateType::Value(datatype) => ReturnType::Fixed(datatype.clone()),
            StateType::Internal => ReturnType::Fixed(DataType::Binary),
        };
        AggregateDefinition {
            name: name.into(),
            arg_types,
            kind: AggregateKind::Normal,
            num_direct_args: 0,
            transition,
            finalize: None,
            state_type,
            return_type,
            initial_value: None,
            behavior,
            doc: None,
        }
    }

    pub fn with_finalize(mut self, finalize: FunctionDef, return_type: ReturnType) -> Self {
        self.finalize = Some(finalize);
        self.return_type = return_type;
        self
    }

    pub fn with_return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_initial_value(mut self, value: impl Into<ScalarValue>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub fn with_kind(mut self, kind: AggregateKind, num_direct_args: usize) -> Self {
        self.kind = kind;
        self.num_direct_args = num_direct_args;
        self
    }

    pub fn with_doc(mut self, doc: &'static Documentation) -> Self {
        self.doc = Some(doc);
        self
    }
}

/// Combine descriptor for an existing aggregate.
#[derive(Debug, Clone)]
pub struct CombinerDefinition {
    pub combine: FunctionDef,
    pub serialize: Option<FunctionDef>,
    pub deserialize: Option<FunctionDef>,
    /// Type the combine function takes and returns.
    pub state_type: StateType,
}

impl CombinerDefinition {
    pub fn new(combine: FunctionDef, state_type: StateType) -> Self {
        CombinerDefinition {
            combine,
            serialize: None,
            deserialize: None,
            state_type,
        }
    }

    pub fn with_serialization(mut self, serialize: FunctionDef, deserialize: FunctionDef) -> Self {
        self.serialize = Some(serialize);
        self.deserialize = Some(deserialize);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub id: FunctionId,
    pub name: String,
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct AggregateEntry {
    pub id: AggregateId,
    pub name: String,
    pub arg_types: Vec<DataType>,
    pub kind: AggregateKind,
    pub num_direct_args: usize,
    pub transition_fn: FunctionId,
    pub finalize_fn: Option<FunctionId>,
    pub state_type: StateType,
    pub return_type: ReturnType,
    pub initial_value: Option<ScalarValue>,
    pub behavior: &'static dyn AggregateBehavior,
    pub doc: Option<&'static Documentation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineEntry {
    pub combine_fn: FunctionId,
    pub serialize_fn: Option<FunctionId>,
    pub deserialize_fn: Option<FunctionId>,
}

/// Key of the combine table.
type CombineKey = (Option<FunctionId>, FunctionId);

#[derive(Debug)]
pub struct AggregateCatalog {
    /// Bumped on every registration.
    version: u64,
    functions: Vec<FunctionEntry>,
    function_names: HashMap<String, FunctionId>,
    aggregates: Vec<AggregateEntry>,
    by_name: HashMap<String, Vec<AggregateId>>,
    combiners: HashMap<CombineKey, CombineEntry>,
    /// Number of aggregate lookups served.
    lookups: AtomicU64,
}

impl Clone for AggregateCatalog {
    fn clone(&self) -> Self {
        AggregateCatalog {
            version: self.version,
            functions: self.functions.clone(),
            function_names: self.function_names.clone(),
            aggregates: self.aggregates.clone(),
            by_name: self.by_name.clone(),
            combiners: self.combiners.clone(),
            lookups: AtomicU64::new(self.lookups.load(Ordering::Relaxed)),
        }
    }
}

impl Default for AggregateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        AggregateCatalog {
            version: 0,
            functions: Vec::new(),
            function_names: HashMap::new(),
            aggregates: Vec::new(),
            by_name: HashMap::new(),
            combiners: HashMap::new(),
            lookups: AtomicU64::new(0),
        }
    }

    /// Create a catalog containing every builtin aggregate.
    pub fn with_builtins() -> Result<Self> {
        let mut catalog = Self::new();
        for (def, combiner) in builtin_aggregates() {
            let id = catalog.define_aggregate(def)?;
            if let Some(combiner) = combiner {
                catalog.define_combiner(id, combiner)?;
            }
        }
        debug!(
            aggregates = catalog.aggregates.len(),
            combiners = catalog.combiners.len(),
            "loaded builtin aggregates"
        );
        Ok(catalog)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of aggregate lookups served by this catalog.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn define_aggregate(&mut self, def: AggregateDefinition) -> Result<AggregateId> {
        if def.num_direct_args > def.arg_types.len() {
            return Err(DbError::new("Aggregate has more direct arguments than arguments")
                .with_field("aggregate", def.name));
        }
        if def.kind == AggregateKind::Normal && def.num_direct_args != 0 {
            return Err(DbError::new("Only ordered-set aggregates accept direct arguments")
                .with_field("aggregate", def.name));
        }
        if self.overloads(&def.name).iter().any(|id| {
            self.aggregates[id.0 as usize].arg_types == def.arg_types
        }) {
            return Err(DbError::new(format!(
                "Aggregate '{}' already exists with the same argument types",
                def.name
            )));
        }

        // A strict transition without an initial value adopts the first input
        // as its state, so the input must already be of the state type.
        if def.transition.strict && def.initial_value.is_none() {
            let aggregated = &def.arg_types[def.num_direct_args..];
            let compatible = match &def.state_type {
                StateType::Value(state) => {
                    aggregated.len() == 1 && aggregated[0].is_coercible_to(state)
                }
                StateType::Internal => false,
            };
            if !compatible {
                return Err(DbError::new(
                    "Strict transition function without an initial value requires a single argument of the state type",
                )
                .with_field("aggregate", def.name));
            }
        }

        let transition_fn = self.intern_function(&def.transition)?;
        let finalize_fn = match &def.finalize {
            Some(finalize) => Some(self.intern_function(finalize)?),
            None => None,
        };

        let id = AggregateId(self.aggregates.len() as u32);
        self.by_name.entry(def.name.clone()).or_default().push(id);
        self.aggregates.push(AggregateEntry {
            id,
            name: def.name,
            arg_types: def.arg_types,
            kind: def.kind,
            num_direct_args: def.num_direct_args,
            transition_fn,
            finalize_fn,
            state_type: def.state_type,
            return_type: def.return_type,
            initial_value: def.initial_value,
            behavior: def.behavior,
            doc: def.doc,
        });
        self.version += 1;

        Ok(id)
    }

    pub fn define_combiner(&mut self, aggregate: AggregateId, def: CombinerDefinition) -> Result<()> {
        let entry = self
            .aggregates
            .get(aggregate.0 as usize)
            .ok_or_else(|| DbError::new(format!("Missing aggregate {aggregate}")))?;

        let key = (entry.finalize_fn, entry.transition_fn);
        if self.combiners.contains_key(&key) {
            return Err(DbError::new(format!(
                "Combine function already defined for aggregate '{}'",
                entry.name
            )));
        }
        if def.state_type != entry.state_type {
            return Err(DbError::new(format!(
                "Combine function for '{}' must take and return {}, got {}",
                entry.name, entry.state_type, def.state_type
            )));
        }
        if entry.state_type.is_internal() && (def.serialize.is_none() || def.deserialize.is_none())
        {
            return Err(DbError::new(format!(
                "Aggregate '{}' has internal state and requires serialize and deserialize functions",
                entry.name
            )));
        }

        let combine_fn = self.intern_function(&def.combine)?;
        let serialize_fn = match &def.serialize {
            Some(f) => Some(self.intern_function(f)?),
            None => None,
        };
        let deserialize_fn = match &def.deserialize {
            Some(f) => Some(self.intern_function(f)?),
            None => None,
        };

        self.combiners.insert(
            key,
            CombineEntry {
                combine_fn,
                serialize_fn,
                deserialize_fn,
            },
        );
        self.version += 1;

        Ok(())
    }

    pub fn aggregate(&self, id: AggregateId) -> Option<&AggregateEntry> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.aggregates.get(id.0 as usize)
    }

    /// All aggregates registered under a name.
    pub fn overloads(&self, name: &str) -> &[AggregateId] {
        self.by_name.get(name).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    pub fn aggregate_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionEntry> {
        self.functions.get(id.0 as usize)
    }

    pub fn combiner_for(&self, entry: &AggregateEntry) -> Option<&CombineEntry> {
        self.combiners.get(&(entry.finalize_fn, entry.transition_fn))
    }

    fn intern_function(&mut self, def: &FunctionDef) -> Result<FunctionId> {
        if let Some(id) = self.function_names.get(&def.name) {
            let existing = &self.functions[id.0 as usize];
            if existing.strict != def.strict {
                return Err(DbError::new(format!(
                    "Function '{}' already registered with different strictness",
                    def.name
                )));
            }
            return Ok(*id);
        }

        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionEntry {
            id,
            name: def.name.clone(),
            strict: def.strict,
        });
        self.function_names.insert(def.name.clone(), id);
        Ok(id)
    }
}
