use std::sync::Arc;

use contquery_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::trace;

use super::descriptor::{AggregateDescriptor, CombineInfo};
use super::{AggregateCatalog, AggregateId};
use crate::arrays::datatype::DataType;

/// Resolves aggregates against a catalog snapshot, caching descriptors for
/// the lifetime of a compile.
#[derive(Debug)]
pub struct CombineInfoResolver {
    catalog: Arc<AggregateCatalog>,
    cache: Mutex<ResolverCache>,
}

#[derive(Debug, Default)]
struct ResolverCache {
    by_id: HashMap<AggregateId, Arc<AggregateDescriptor>>,
    by_signature: HashMap<(String, Vec<DataType>), AggregateId>,
}

impl CombineInfoResolver {
    pub fn new(catalog: Arc<AggregateCatalog>) -> Self {
        CombineInfoResolver {
            catalog,
            cache: Mutex::new(ResolverCache::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<AggregateCatalog> {
        &self.catalog
    }

    /// Resolve an aggregate by id.
    pub fn resolve(&self, id: AggregateId) -> Result<Arc<AggregateDescriptor>> {
        if let Some(desc) = self.cache.lock().by_id.get(&id) {
            return Ok(desc.clone());
        }

        let entry = self.catalog.aggregate(id).ok_or_else(|| {
            DbError::new(format!("Unknown aggregate {id}")).with_kind(ErrorKind::UnknownAggregate)
        })?;

        let transition = self
            .catalog
            .function(entry.transition_fn)
            .ok_or_else(|| DbError::new("Missing transition function"))?;
        let finalize_strict = match entry.finalize_fn {
            Some(f) => {
                self.catalog
                    .function(f)
                    .ok_or_else(|| DbError::new("Missing finalize function"))?
                    .strict
            }
            None => false,
        };
        let combiner = self.catalog.combiner_for(entry);

        let desc = Arc::new(AggregateDescriptor {
            id,
            name: entry.name.clone(),
            kind: entry.kind,
            arg_types: entry.arg_types.clone(),
            num_direct_args: entry.num_direct_args,
            transition_fn: entry.transition_fn,
            finalize_fn: entry.finalize_fn,
            combine_fn: combiner.map(|c| c.combine_fn),
            serialize_fn: combiner.and_then(|c| c.serialize_fn),
            deserialize_fn: combiner.and_then(|c| c.deserialize_fn),
            state_type: entry.state_type.clone(),
            return_type: entry.return_type.clone(),
            strict: transition.strict,
            finalize_strict,
            initial_value: entry.initial_value.clone(),
            behavior: entry.behavior,
        });

        trace!(%id, name = %desc.name, "resolved aggregate");
        self.cache.lock().by_id.insert(id, desc.clone());

        Ok(desc)
    }

    /// Resolve an aggregate by name for the given argument types.
    ///
    /// Exact signature matches are preferred, otherwise the first overload
    /// the arguments implicitly coerce to is used.
    pub fn resolve_by_name(&self, name: &str, args: &[DataType]) -> Result<Arc<AggregateDescriptor>> {
        let key = (name.to_string(), args.to_vec());
        let cached = self.cache.lock().by_signature.get(&key).copied();
        if let Some(id) = cached {
            return self.resolve(id);
        }

        let overloads = self.catalog.overloads(name);
        if overloads.is_empty() {
            return Err(self.unknown_aggregate_error(name));
        }

        let mut exact = None;
        let mut coercible = None;
        for id in overloads {
            let entry = match self.catalog.aggregate(*id) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.arg_types.len() != args.len() {
                continue;
            }
            if entry.arg_types.iter().zip(args).all(|(param, arg)| param == arg) {
                exact = Some(*id);
                break;
            }
            if coercible.is_none()
                && entry
                    .arg_types
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| arg.is_coercible_to(param))
            {
                coercible = Some(*id);
            }
        }

        let id = match exact.or(coercible) {
            Some(id) => id,
            None => {
                let types: Vec<_> = args.iter().map(|t| t.to_string()).collect();
                return Err(DbError::new(format!(
                    "No overload of aggregate '{name}' accepts ({})",
                    types.join(", ")
                ))
                .with_kind(ErrorKind::UnknownAggregate));
            }
        };

        self.cache.lock().by_signature.insert(key, id);
        self.resolve(id)
    }

    pub fn is_aggregate_name(&self, name: &str) -> bool {
        !self.catalog.overloads(name).is_empty()
    }

    /// Combine information for an aggregate, None if it isn't combinable.
    pub fn combine_info(&self, id: AggregateId) -> Result<Option<CombineInfo>> {
        let desc = self.resolve(id)?;
        Ok(desc.combine_fn.map(|combine_fn| CombineInfo {
            combine_fn,
            serialize_fn: desc.serialize_fn,
            deserialize_fn: desc.deserialize_fn,
            state_type: desc.state_type.clone(),
        }))
    }

    /// Resolve an aggregate that's about to be placed in a combining plan.
    pub fn require_combinable(&self, id: AggregateId) -> Result<Arc<AggregateDescriptor>> {
        let desc = self.resolve(id)?;
        if !desc.is_combinable() {
            return Err(DbError::new(format!(
                "Aggregate '{}' does not support combining partial states and can't be used in a continuous view",
                desc.name
            ))
            .with_kind(ErrorKind::AggregateNotCombinable));
        }
        Ok(desc)
    }

    fn unknown_aggregate_error(&self, name: &str) -> DbError {
        let suggestion = self
            .catalog
            .aggregate_names()
            .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
            .filter(|(score, _)| *score > 0.85)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, candidate)| candidate.to_string());

        let mut msg = format!("Unknown aggregate '{name}'");
        if let Some(suggestion) = suggestion {
            msg.push_str(&format!(", did you mean '{suggestion}'?"));
        }
        DbError::new(msg).with_kind(ErrorKind::UnknownAggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> CombineInfoResolver {
        CombineInfoResolver::new(Arc::new(AggregateCatalog::with_builtins().unwrap()))
    }

    #[test]
    fn resolve_cached_by_id() {
        let resolver = resolver();
        let id = resolver.resolve_by_name("count", &[]).unwrap().id;
        let before = resolver.catalog().lookup_count();

        let a = resolver.resolve(id).unwrap();
        let b = resolver.resolve(id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(before, resolver.catalog().lookup_count());
    }

    #[test]
    fn overload_resolution() {
        let resolver = resolver();
        // (name, args, expected state type)
        let tests = [
            ("sum", vec![DataType::Int64], DataType::Int64),
            ("sum", vec![DataType::Float64], DataType::Float64),
            ("max", vec![DataType::Utf8], DataType::Utf8),
            ("count", vec![DataType::Timestamp], DataType::Int64),
        ];

        for (name, args, expected) in tests {
            let desc = resolver.resolve_by_name(name, &args).unwrap();
            assert_eq!(expected, desc.state_storage_type(), "{name}({args:?})");
        }
    }

    #[test]
    fn unknown_aggregate_suggests() {
        let resolver = resolver();
        let err = resolver.resolve_by_name("cuont", &[]).unwrap_err();
        assert_eq!(ErrorKind::UnknownAggregate, err.kind());
        assert!(err.get_msg().contains("did you mean 'count'"), "{}", err.get_msg());

        let err = resolver.resolve_by_name("sum", &[DataType::Utf8]).unwrap_err();
        assert_eq!(ErrorKind::UnknownAggregate, err.kind());
    }

    #[test]
    fn combinability() {
        let resolver = resolver();

        let count = resolver.resolve_by_name("count", &[]).unwrap();
        let info = resolver.combine_info(count.id).unwrap().unwrap();
        assert!(info.serialize_fn.is_none());

        let hll = resolver.resolve_by_name("hll_count_distinct", &[DataType::Any]).unwrap();
        let info = resolver.combine_info(hll.id).unwrap().unwrap();
        assert!(info.serialize_fn.is_some());
        assert!(info.deserialize_fn.is_some());

        let disc = resolver
            .resolve_by_name("percentile_disc", &[DataType::Float64, DataType::Int64])
            .unwrap();
        assert!(resolver.combine_info(disc.id).unwrap().is_none());
        let err = resolver.require_combinable(disc.id).unwrap_err();
        assert_eq!(ErrorKind::AggregateNotCombinable, err.kind());
    }
}
