//! Aggregation specs
//!
//! The same [`Agg`] tree that is compiled into the request drives the
//! construction of aggregation results from the response.

use super::{Expr, FieldRef, Params};
use indexmap::IndexMap;

/// Result shape of an aggregation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggShape {
    /// `{value}` metrics
    SingleValue,
    /// `{count, min, max, avg, sum, ...}`
    Stats,
    /// `{values: {...}}`
    Percentiles,
    TopHits,
    /// `{buckets: [...]}` or keyed `{buckets: {...}}`
    MultiBucket,
    /// `{doc_count, <sub aggs>}`
    SingleBucket,
}

#[derive(Debug, Clone)]
pub enum AggKind {
    Avg,
    Min,
    Max,
    Sum,
    ValueCount,
    Cardinality,
    Stats,
    ExtendedStats,
    Percentiles,
    PercentileRanks,
    TopHits,
    Terms,
    SignificantTerms,
    Histogram,
    DateHistogram,
    Range,
    DateRange,
    Filters,
    Filter(Box<Expr>),
    Global,
    Nested,
    ReverseNested,
}

impl AggKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Avg => "avg",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Sum => "sum",
            AggKind::ValueCount => "value_count",
            AggKind::Cardinality => "cardinality",
            AggKind::Stats => "stats",
            AggKind::ExtendedStats => "extended_stats",
            AggKind::Percentiles => "percentiles",
            AggKind::PercentileRanks => "percentile_ranks",
            AggKind::TopHits => "top_hits",
            AggKind::Terms => "terms",
            AggKind::SignificantTerms => "significant_terms",
            AggKind::Histogram => "histogram",
            AggKind::DateHistogram => "date_histogram",
            AggKind::Range => "range",
            AggKind::DateRange => "date_range",
            AggKind::Filters => "filters",
            AggKind::Filter(_) => "filter",
            AggKind::Global => "global",
            AggKind::Nested => "nested",
            AggKind::ReverseNested => "reverse_nested",
        }
    }

    pub fn shape(&self) -> AggShape {
        match self {
            AggKind::Avg
            | AggKind::Min
            | AggKind::Max
            | AggKind::Sum
            | AggKind::ValueCount
            | AggKind::Cardinality => AggShape::SingleValue,
            AggKind::Stats | AggKind::ExtendedStats => AggShape::Stats,
            AggKind::Percentiles | AggKind::PercentileRanks => AggShape::Percentiles,
            AggKind::TopHits => AggShape::TopHits,
            AggKind::Terms
            | AggKind::SignificantTerms
            | AggKind::Histogram
            | AggKind::DateHistogram
            | AggKind::Range
            | AggKind::DateRange
            | AggKind::Filters => AggShape::MultiBucket,
            AggKind::Filter(_) | AggKind::Global | AggKind::Nested | AggKind::ReverseNested => {
                AggShape::SingleBucket
            }
        }
    }

    pub fn is_bucket(&self) -> bool {
        matches!(self.shape(), AggShape::MultiBucket | AggShape::SingleBucket)
    }
}

/// An aggregation with its parameters and named sub-aggregations
#[derive(Debug, Clone)]
pub struct Agg {
    pub kind: AggKind,
    pub params: Params,
    pub aggs: IndexMap<String, Agg>,
}

impl Agg {
    pub fn new(kind: AggKind) -> Self {
        Self {
            kind,
            params: Params::new(),
            aggs: IndexMap::new(),
        }
    }

    fn on_field(kind: AggKind, field: impl Into<FieldRef>) -> Self {
        Self::new(kind).param("field", Expr::Field(field.into()))
    }

    pub fn avg(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Avg, field)
    }

    pub fn min(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Min, field)
    }

    pub fn max(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Max, field)
    }

    pub fn sum(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Sum, field)
    }

    pub fn value_count(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::ValueCount, field)
    }

    pub fn cardinality(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Cardinality, field)
    }

    pub fn stats(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Stats, field)
    }

    pub fn extended_stats(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::ExtendedStats, field)
    }

    pub fn percentiles(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Percentiles, field)
    }

    pub fn top_hits() -> Self {
        Self::new(AggKind::TopHits)
    }

    pub fn terms(field: impl Into<FieldRef>) -> Self {
        Self::on_field(AggKind::Terms, field)
    }

    pub fn histogram(field: impl Into<FieldRef>, interval: f64) -> Self {
        Self::on_field(AggKind::Histogram, field).param("interval", interval)
    }

    pub fn date_histogram(field: impl Into<FieldRef>, interval: &str) -> Self {
        Self::on_field(AggKind::DateHistogram, field).param("interval", interval)
    }

    pub fn range(field: impl Into<FieldRef>, ranges: Vec<Expr>) -> Self {
        Self::on_field(AggKind::Range, field).param("ranges", Expr::List(ranges))
    }

    pub fn filters(filters: Params) -> Self {
        Self::new(AggKind::Filters).param("filters", Expr::Params(filters))
    }

    pub fn filter(filter: Expr) -> Self {
        Self::new(AggKind::Filter(Box::new(filter)))
    }

    pub fn global() -> Self {
        Self::new(AggKind::Global)
    }

    pub fn nested(path: impl Into<FieldRef>) -> Self {
        Self::new(AggKind::Nested).param("path", Expr::Field(path.into()))
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Attach a named sub-aggregation
    pub fn agg(mut self, name: impl Into<String>, agg: Agg) -> Self {
        self.aggs.insert(name.into(), agg);
        self
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        let mut children: Vec<&Expr> = self.params.values().collect();
        if let AggKind::Filter(filter) = &self.kind {
            children.push(filter);
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        assert_eq!(AggKind::Avg.shape(), AggShape::SingleValue);
        assert_eq!(AggKind::ExtendedStats.shape(), AggShape::Stats);
        assert_eq!(AggKind::Terms.shape(), AggShape::MultiBucket);
        assert_eq!(AggKind::Global.shape(), AggShape::SingleBucket);
        assert!(AggKind::Filters.is_bucket());
        assert!(!AggKind::TopHits.is_bucket());
    }

    #[test]
    fn test_nested_aggs_keep_order() {
        let agg = Agg::terms("category")
            .agg("z_price", Agg::avg("price"))
            .agg("a_rating", Agg::max("rating"));
        let names: Vec<&str> = agg.aggs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z_price", "a_rating"]);
    }
}
