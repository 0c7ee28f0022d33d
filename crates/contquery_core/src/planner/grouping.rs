use contquery_error::{DbError, Result};
use contquery_parser::ast::{Expr, GroupByExpr};

use super::plan::{GroupingPhase, GroupingSet, PhaseSet};

/// Upper bound on the number of grouping sets a GROUP BY may expand to.
const MAX_GROUPING_SETS: usize = 4096;

/// Expand GROUP BY items into grouping sets over `exprs`, the flattened and
/// deduplicated group expressions.
///
/// Items are combined with a cross product, so `GROUP BY a, ROLLUP (b, c)`
/// produces `(a, b, c), (a, b), (a)`. An empty GROUP BY produces a single
/// empty set.
pub fn expand_grouping_sets(group_by: &[GroupByExpr], exprs: &[&Expr]) -> Result<Vec<GroupingSet>> {
    let index_of = |expr: &Expr| -> Result<usize> {
        exprs
            .iter()
            .position(|e| *e == expr)
            .ok_or_else(|| DbError::new(format!("Missing group expression {expr}")))
    };

    let mut sets: Vec<GroupingSet> = vec![GroupingSet::new()];

    for item in group_by {
        let item_sets: Vec<GroupingSet> = match item {
            GroupByExpr::Expr(expr) => vec![GroupingSet::from([index_of(expr)?])],
            GroupByExpr::Rollup(items) => {
                let indices = items.iter().map(index_of).collect::<Result<Vec<_>>>()?;
                (0..=indices.len())
                    .rev()
                    .map(|n| indices[..n].iter().copied().collect())
                    .collect()
            }
            GroupByExpr::Cube(items) => {
                let indices = items.iter().map(index_of).collect::<Result<Vec<_>>>()?;
                if indices.len() > 12 {
                    return Err(DbError::new("CUBE supports at most 12 expressions"));
                }
                // Largest subsets first.
                let mut subsets: Vec<GroupingSet> = (0..(1_u32 << indices.len()))
                    .rev()
                    .map(|mask| {
                        indices
                            .iter()
                            .enumerate()
                            .filter(|(bit, _)| mask & (1 << bit) != 0)
                            .map(|(_, idx)| *idx)
                            .collect()
                    })
                    .collect();
                subsets.sort_by_key(|s| std::cmp::Reverse(s.len()));
                subsets
            }
            GroupByExpr::GroupingSets(lists) => lists
                .iter()
                .map(|list| list.iter().map(index_of).collect::<Result<GroupingSet>>())
                .collect::<Result<Vec<_>>>()?,
        };

        let mut product = Vec::with_capacity(sets.len() * item_sets.len());
        for existing in &sets {
            for set in &item_sets {
                product.push(existing.union(set).copied().collect());
            }
        }
        if product.len() > MAX_GROUPING_SETS {
            return Err(DbError::new("Too many grouping sets").with_field("count", product.len()));
        }
        sets = product;
    }

    Ok(sets)
}

/// Split grouping sets into phases that can each be computed from a single
/// sorted pass over the input.
///
/// Sets are assigned greedily, largest first, to the first phase whose
/// smallest set contains them. Within a phase every set is a prefix of the
/// phase's sort order.
pub fn plan_phases(sets: &[GroupingSet]) -> Vec<GroupingPhase> {
    let mut order: Vec<usize> = (0..sets.len()).collect();
    order.sort_by_key(|idx| std::cmp::Reverse(sets[*idx].len()));

    // Chains of set indices, most specific first.
    let mut chains: Vec<Vec<usize>> = Vec::new();
    for set_idx in order {
        let set = &sets[set_idx];
        let chain = chains.iter_mut().find(|chain| match chain.last() {
            Some(last) => set.is_subset(&sets[*last]),
            None => false,
        });
        match chain {
            Some(chain) => chain.push(set_idx),
            None => chains.push(vec![set_idx]),
        }
    }

    chains
        .into_iter()
        .map(|chain| {
            // Sort columns go from least to most specific set.
            let mut sort_order: Vec<usize> = Vec::new();
            for set_idx in chain.iter().rev() {
                for col in &sets[*set_idx] {
                    if !sort_order.contains(col) {
                        sort_order.push(*col);
                    }
                }
            }
            let sets = chain
                .iter()
                .map(|set_idx| PhaseSet {
                    set_idx: *set_idx,
                    prefix_len: sets[*set_idx].len(),
                })
                .collect();
            GroupingPhase { sort_order, sets }
        })
        .collect()
}
