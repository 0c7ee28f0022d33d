/// Function categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Aggregate(AggregateCategory),
    Numeric,
    DateTime,
    String,
    /// Readers for sketches built by approximate aggregates.
    Sketch,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateCategory {
    General,
    /// Ordered-set and hypothetical-set aggregates.
    OrderedSet,
    Approximate,
    /// Variants safe for partial aggregation over streams.
    Streaming,
}

impl Category {
    pub const GENERAL_PURPOSE_AGGREGATE: Self = Category::Aggregate(AggregateCategory::General);
    pub const ORDERED_SET_AGGREGATE: Self = Category::Aggregate(AggregateCategory::OrderedSet);
    pub const APPROXIMATE_AGGREGATE: Self = Category::Aggregate(AggregateCategory::Approximate);
    pub const STREAMING_AGGREGATE: Self = Category::Aggregate(AggregateCategory::Streaming);

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregate(AggregateCategory::General) => "general_purpose_aggregate",
            Self::Aggregate(AggregateCategory::OrderedSet) => "ordered_set_aggregate",
            Self::Aggregate(AggregateCategory::Approximate) => "approximate_aggregate",
            Self::Aggregate(AggregateCategory::Streaming) => "streaming_aggregate",
            Self::Numeric => "numeric",
            Self::DateTime => "datetime",
            Self::String => "string",
            Self::Sketch => "sketch",
            Self::General => "general",
        }
    }
}

/// Documentation for a single function variant.
#[derive(Debug, Clone, Copy)]
pub struct Documentation {
    /// Category this function belongs in.
    pub category: Category,
    /// Description of the function.
    pub description: &'static str,
    /// Argument names for this variant.
    pub arguments: &'static [&'static str],
    /// An optional example for the function.
    pub example: Option<Example>,
}

/// A simple example.
#[derive(Debug, Clone, Copy)]
pub struct Example {
    /// Example usage of the function, just the call itself.
    pub example: &'static str,
    /// The output for the above example.
    pub output: &'static str,
}
