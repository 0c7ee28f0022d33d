use std::collections::BTreeSet;

use crate::arrays::field::{Field, Schema};
use crate::explain::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::aggregate::PhysicalAggregate;
use crate::expr::{PhysicalExpr, PhysicalSortExpr};

#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    Scan(ScanNode),
    Filter(FilterNode),
    Sort(SortNode),
    Aggregate(AggregateNode),
    Project(ProjectNode),
    DistinctOn(DistinctOnNode),
    Limit(LimitNode),
}

#[derive(Debug, Clone)]
pub struct ScanNode {
    pub table: String,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct FilterNode {
    pub predicate: PhysicalExpr,
    pub input: Box<PhysicalPlan>,
}

#[derive(Debug, Clone)]
pub struct SortNode {
    pub keys: Vec<PhysicalSortExpr>,
    pub input: Box<PhysicalPlan>,
}

#[derive(Debug, Clone)]
pub struct ProjectNode {
    pub exprs: Vec<PhysicalExpr>,
    pub names: Vec<String>,
    pub input: Box<PhysicalPlan>,
}

/// Keep the first row for each distinct key.
#[derive(Debug, Clone)]
pub struct DistinctOnNode {
    pub on: Vec<PhysicalExpr>,
    pub input: Box<PhysicalPlan>,
}

#[derive(Debug, Clone)]
pub struct LimitNode {
    pub limit: Option<usize>,
    pub offset: usize,
    pub input: Box<PhysicalPlan>,
}

/// One grouping set, as indices into the node's group expressions.
pub type GroupingSet = BTreeSet<usize>;

/// A grouping set computed within a sorted phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSet {
    /// Index into the node's grouping sets.
    pub set_idx: usize,
    /// Number of leading sort columns making up this set.
    pub prefix_len: usize,
}

/// Grouping sets sharing one input sort order, each a prefix of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingPhase {
    /// Group expression indices in sort order.
    pub sort_order: Vec<usize>,
    /// Sets ordered from most to least specific.
    pub sets: Vec<PhaseSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateStrategy {
    /// Input arrives sorted by the first phase's sort order, later phases
    /// re-sort a buffered copy of the input.
    Sorted { phases: Vec<GroupingPhase> },
    /// Groups are kept in hash tables, one per grouping set.
    Hashed,
}

#[derive(Debug, Clone)]
pub struct AggregateNode {
    pub group_exprs: Vec<PhysicalExpr>,
    pub group_names: Vec<String>,
    pub grouping_sets: Vec<GroupingSet>,
    pub aggregates: Vec<PhysicalAggregate>,
    pub strategy: AggregateStrategy,
    pub input: Box<PhysicalPlan>,
}

impl AggregateNode {
    /// Output layout is every group column followed by every aggregate.
    pub fn schema(&self) -> Schema {
        let groups = self
            .group_exprs
            .iter()
            .zip(&self.group_names)
            .map(|(expr, name)| Field::new(name.clone(), expr.datatype()));
        let aggs = self.aggregates.iter().map(|agg| agg.output_field());
        Schema::new(groups.chain(aggs))
    }
}

impl PhysicalPlan {
    pub fn schema(&self) -> Schema {
        match self {
            Self::Scan(scan) => scan.schema.clone(),
            Self::Filter(n) => n.input.schema(),
            Self::Sort(n) => n.input.schema(),
            Self::DistinctOn(n) => n.input.schema(),
            Self::Limit(n) => n.input.schema(),
            Self::Aggregate(n) => n.schema(),
            Self::Project(n) => {
                let input = n.input.schema();
                let fields = n.exprs.iter().zip(&n.names).map(|(expr, name)| match expr {
                    // State markers flow through plain column references.
                    PhysicalExpr::Column(col) => match input.fields.get(col.idx) {
                        Some(field) => Field {
                            name: name.clone(),
                            ..field.clone()
                        },
                        None => Field::new(name.clone(), col.datatype.clone()),
                    },
                    other => Field::new(name.clone(), other.datatype()),
                });
                Schema::new(fields)
            }
        }
    }

    pub fn children(&self) -> Vec<&PhysicalPlan> {
        match self {
            Self::Scan(_) => Vec::new(),
            Self::Filter(n) => vec![n.input.as_ref()],
            Self::Sort(n) => vec![n.input.as_ref()],
            Self::Aggregate(n) => vec![n.input.as_ref()],
            Self::Project(n) => vec![n.input.as_ref()],
            Self::DistinctOn(n) => vec![n.input.as_ref()],
            Self::Limit(n) => vec![n.input.as_ref()],
        }
    }

    /// Next node down the left spine.
    pub fn input_mut(&mut self) -> Option<&mut PhysicalPlan> {
        match self {
            Self::Scan(_) => None,
            Self::Filter(n) => Some(n.input.as_mut()),
            Self::Sort(n) => Some(n.input.as_mut()),
            Self::Aggregate(n) => Some(n.input.as_mut()),
            Self::Project(n) => Some(n.input.as_mut()),
            Self::DistinctOn(n) => Some(n.input.as_mut()),
            Self::Limit(n) => Some(n.input.as_mut()),
        }
    }

    /// Find the first aggregate node walking down the left spine.
    pub fn find_aggregate(&self) -> Option<&AggregateNode> {
        match self {
            Self::Aggregate(agg) => Some(agg),
            Self::Scan(_) => None,
            Self::Filter(n) => n.input.find_aggregate(),
            Self::Sort(n) => n.input.find_aggregate(),
            Self::Project(n) => n.input.find_aggregate(),
            Self::DistinctOn(n) => n.input.find_aggregate(),
            Self::Limit(n) => n.input.find_aggregate(),
        }
    }

    pub fn find_aggregate_mut(&mut self) -> Option<&mut AggregateNode> {
        match self {
            Self::Aggregate(agg) => Some(agg),
            other => other.input_mut().and_then(|c| c.find_aggregate_mut()),
        }
    }

    /// The projection at the top of the plan, skipping modifiers.
    pub fn find_project(&self) -> Option<&ProjectNode> {
        match self {
            Self::Project(project) => Some(project),
            Self::Sort(n) => n.input.find_project(),
            Self::DistinctOn(n) => n.input.find_project(),
            Self::Limit(n) => n.input.find_project(),
            Self::Filter(n) => n.input.find_project(),
            _ => None,
        }
    }
}

impl Explainable for PhysicalPlan {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        match self {
            Self::Scan(n) => EntryBuilder::new("Scan", conf)
                .with_value("table", &n.table)
                .with_value_if_verbose("schema", &n.schema)
                .build(),
            Self::Filter(n) => EntryBuilder::new("Filter", conf)
                .with_value("predicate", &n.predicate)
                .build(),
            Self::Sort(n) => EntryBuilder::new("Sort", conf)
                .with_values("keys", &n.keys)
                .build(),
            Self::Project(n) => EntryBuilder::new("Project", conf)
                .with_values("projections", &n.exprs)
                .with_values("names", &n.names)
                .build(),
            Self::DistinctOn(n) => EntryBuilder::new("DistinctOn", conf)
                .with_values("on", &n.on)
                .build(),
            Self::Limit(n) => {
                let mut ent = EntryBuilder::new("Limit", conf).with_value("offset", n.offset);
                if let Some(limit) = n.limit {
                    ent = ent.with_value("limit", limit);
                }
                ent.build()
            }
            Self::Aggregate(n) => {
                let strategy = match &n.strategy {
                    AggregateStrategy::Sorted { phases } => format!("sorted ({} phases)", phases.len()),
                    AggregateStrategy::Hashed => "hashed".to_string(),
                };
                let sets = n.grouping_sets.iter().map(|set| {
                    let cols: Vec<_> = set.iter().map(|idx| n.group_names[*idx].clone()).collect();
                    format!("({})", cols.join(", "))
                });
                let roles = n
                    .aggregates
                    .iter()
                    .map(|agg| format!("{:?}", agg.split.role));
                EntryBuilder::new("Aggregate", conf)
                    .with_value("strategy", strategy)
                    .with_values("groups", &n.group_exprs)
                    .with_values("grouping_sets", sets)
                    .with_values("aggregates", &n.aggregates)
                    .with_values("roles", roles)
                    .build()
            }
        }
    }
}
