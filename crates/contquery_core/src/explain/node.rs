use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ExplainConfig, ExplainEntry, Explainable};
use crate::planner::plan::PhysicalPlan;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    pub fn walk_physical(config: ExplainConfig, plan: &PhysicalPlan) -> Self {
        let entry = plan.explain_entry(config);
        let children = plan
            .children()
            .into_iter()
            .map(|child| Self::walk_physical(config, child))
            .collect();

        ExplainNode { entry, children }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.entry.name, indent = indent * 2)?;
        if !self.entry.items.is_empty() {
            write!(f, " (")?;
            for (idx, (key, value)) in self.entry.items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key} = {value}")?;
            }
            write!(f, ")")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
