//! Expression tree
//!
//! Application code builds queries, filters, sorts, aggregations and
//! search directives as [`Expr`] values. Nodes are plain immutable data;
//! the shape they compile to depends on the capability record and is
//! decided by the compiler, not at construction time.

mod agg;
mod function;

pub use agg::{Agg, AggKind, AggShape};
pub use function::{DecayKind, Function, FunctionKind};

use crate::error::DslError;
use crate::schema::{BoundField, Schema};
use crate::Result;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Ordered node parameters
pub type Params = IndexMap<String, Expr>;

/// Build [`Params`] from key/value pairs
pub fn params<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Params
where
    K: Into<String>,
    V: Into<Expr>,
{
    items
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Reference to a field, either by plain name or bound to a schema
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    Name(String),
    Bound(BoundField),
}

impl FieldRef {
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Name(name) => name,
            FieldRef::Bound(field) => field.name(),
        }
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldRef::Name(_) => None,
            FieldRef::Bound(field) => Some(field.schema()),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::Name(name.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        FieldRef::Name(name)
    }
}

impl From<BoundField> for FieldRef {
    fn from(field: BoundField) -> Self {
        FieldRef::Bound(field)
    }
}

impl From<&BoundField> for FieldRef {
    fn from(field: &BoundField) -> Self {
        FieldRef::Bound(field.clone())
    }
}

/// Document type given either as a schema or as a bare type name
#[derive(Debug, Clone)]
pub enum DocTypeRef {
    Schema(Arc<Schema>),
    Name(String),
}

impl DocTypeRef {
    pub fn doc_type(&self) -> Option<&str> {
        match self {
            DocTypeRef::Schema(schema) => schema.doc_type(),
            DocTypeRef::Name(name) => Some(name),
        }
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        match self {
            DocTypeRef::Schema(schema) => Some(schema),
            DocTypeRef::Name(_) => None,
        }
    }
}

impl From<&Arc<Schema>> for DocTypeRef {
    fn from(schema: &Arc<Schema>) -> Self {
        DocTypeRef::Schema(Arc::clone(schema))
    }
}

impl From<Arc<Schema>> for DocTypeRef {
    fn from(schema: Arc<Schema>) -> Self {
        DocTypeRef::Schema(schema)
    }
}

impl From<&str> for DocTypeRef {
    fn from(name: &str) -> Self {
        DocTypeRef::Name(name.to_string())
    }
}

/// Queries addressing a single field with a single query value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldQueryKind {
    Term,
    Match,
    MatchPhrase,
    MatchPhrasePrefix,
    Prefix,
    Wildcard,
    Regexp,
    Fuzzy,
}

impl FieldQueryKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldQueryKind::Term => "term",
            FieldQueryKind::Match => "match",
            FieldQueryKind::MatchPhrase => "match_phrase",
            FieldQueryKind::MatchPhrasePrefix => "match_phrase_prefix",
            FieldQueryKind::Prefix => "prefix",
            FieldQueryKind::Wildcard => "wildcard",
            FieldQueryKind::Regexp => "regexp",
            FieldQueryKind::Fuzzy => "fuzzy",
        }
    }

    /// Key holding the query value in the expanded object form
    pub fn query_key(self) -> &'static str {
        match self {
            FieldQueryKind::Match
            | FieldQueryKind::MatchPhrase
            | FieldQueryKind::MatchPhrasePrefix => "query",
            FieldQueryKind::Term
            | FieldQueryKind::Prefix
            | FieldQueryKind::Wildcard
            | FieldQueryKind::Regexp
            | FieldQueryKind::Fuzzy => "value",
        }
    }
}

/// Legacy boolean combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

impl BoolOperator {
    pub fn name(self) -> &'static str {
        match self {
            BoolOperator::And => "and",
            BoolOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    pub must: Vec<Expr>,
    pub filter: Vec<Expr>,
    pub should: Vec<Expr>,
    pub must_not: Vec<Expr>,
    pub params: Params,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, expr: Expr) -> Self {
        self.must.push(expr);
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter.push(expr);
        self
    }

    pub fn should(mut self, expr: Expr) -> Self {
        self.should.push(expr);
        self
    }

    pub fn must_not(mut self, expr: Expr) -> Self {
        self.must_not.push(expr);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub expr: Box<Expr>,
    pub order: Option<String>,
    pub params: Params,
}

impl Sort {
    pub fn new(field: impl Into<FieldRef>) -> Self {
        Self {
            expr: Box::new(Expr::Field(field.into())),
            order: None,
            params: Params::new(),
        }
    }

    pub fn asc(field: impl Into<FieldRef>) -> Self {
        Self::new(field).order("asc")
    }

    pub fn desc(field: impl Into<FieldRef>) -> Self {
        Self::new(field).order("desc")
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order = Some(order.to_string());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum SourceFields {
    Enabled(bool),
    Fields(Vec<Expr>),
}

/// `_source` selection
#[derive(Debug, Clone)]
pub struct Source {
    pub fields: SourceFields,
    pub include: Vec<Expr>,
    pub exclude: Vec<Expr>,
}

impl Source {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            fields: SourceFields::Enabled(enabled),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn fields(fields: Vec<Expr>) -> Self {
        Self {
            fields: SourceFields::Fields(fields),
            ..Self::enabled(true)
        }
    }

    pub fn filtered(include: Vec<Expr>, exclude: Vec<Expr>) -> Self {
        Self {
            include,
            exclude,
            ..Self::enabled(true)
        }
    }
}

#[derive(Debug, Clone)]
pub enum HighlightFields {
    /// `{"fields": {name: options}}`
    Map(Vec<(FieldRef, Params)>),
    /// `{"fields": [{name: options}, ...]}`; bare fields get empty options
    List(Vec<Expr>),
}

#[derive(Debug, Clone, Default)]
pub struct Highlight {
    pub fields: Option<HighlightFields>,
    pub params: Params,
}

#[derive(Debug, Clone)]
pub struct Rescore {
    /// Query rescorer parameters (`rescore_query`, `query_weight` ...)
    pub rescorer: Params,
    pub window_size: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Field(FieldRef),
    Params(Params),
    List(Vec<Expr>),
    /// `field^weight`
    Boost {
        expr: Box<Expr>,
        weight: f64,
    },
    MatchAll(Params),
    FieldQuery {
        kind: FieldQueryKind,
        field: FieldRef,
        query: Box<Expr>,
        params: Params,
    },
    MultiMatch {
        query: Box<Expr>,
        fields: Vec<Expr>,
        params: Params,
    },
    Range {
        field: FieldRef,
        bounds: Params,
        /// Query-level options placed next to the field (`_name`, `_cache`)
        params: Params,
    },
    Terms {
        field: FieldRef,
        terms: Vec<Expr>,
        params: Params,
    },
    Exists {
        field: FieldRef,
        params: Params,
    },
    Missing {
        field: FieldRef,
        params: Params,
    },
    Ids {
        values: Vec<Value>,
        doc_type: Option<DocTypeRef>,
        params: Params,
    },
    ParentId {
        child_type: Option<DocTypeRef>,
        parent_id: Value,
    },
    HasParent {
        query: Box<Expr>,
        parent_type: Option<DocTypeRef>,
        params: Params,
    },
    HasChild {
        query: Box<Expr>,
        child_type: Option<DocTypeRef>,
        params: Params,
    },
    Bool(BoolQuery),
    BoolOp {
        op: BoolOperator,
        exprs: Vec<Expr>,
        params: Params,
    },
    Not {
        expr: Box<Expr>,
        params: Params,
    },
    /// Legacy `filtered` query
    Filtered {
        query: Option<Box<Expr>>,
        filter: Box<Expr>,
    },
    FunctionScore {
        query: Option<Box<Expr>>,
        functions: Vec<Function>,
        params: Params,
    },
    /// Query wrapped for use in a filter context (`fquery`)
    FilterQuery {
        query: Box<Expr>,
        params: Params,
    },
    /// Any other query compiled as `{name: params}` (nested, dis_max ...)
    Named {
        name: String,
        params: Params,
    },
    Sort(Sort),
    Agg(Box<Agg>),
    Source(Source),
    Highlight(Highlight),
    HighlightedField {
        field: FieldRef,
        params: Params,
    },
    Rescore(Rescore),
    Script(Params),
    Function(Box<Function>),
}

impl Expr {
    pub fn field(field: impl Into<FieldRef>) -> Self {
        Expr::Field(field.into())
    }

    pub fn match_all() -> Self {
        Expr::MatchAll(Params::new())
    }

    pub fn field_query(
        kind: FieldQueryKind,
        field: impl Into<FieldRef>,
        query: impl Into<Expr>,
    ) -> Self {
        Expr::FieldQuery {
            kind,
            field: field.into(),
            query: Box::new(query.into()),
            params: Params::new(),
        }
    }

    pub fn term(field: impl Into<FieldRef>, value: impl Into<Expr>) -> Self {
        Self::field_query(FieldQueryKind::Term, field, value)
    }

    pub fn match_query(field: impl Into<FieldRef>, query: impl Into<Expr>) -> Self {
        Self::field_query(FieldQueryKind::Match, field, query)
    }

    pub fn multi_match(query: impl Into<Expr>, fields: Vec<Expr>) -> Self {
        Expr::MultiMatch {
            query: Box::new(query.into()),
            fields,
            params: Params::new(),
        }
    }

    pub fn terms(field: impl Into<FieldRef>, terms: Vec<Expr>) -> Self {
        Expr::Terms {
            field: field.into(),
            terms,
            params: Params::new(),
        }
    }

    /// Range query; at least one of `gt`, `gte`, `lt`, `lte`, `from`, `to`
    /// is required.
    pub fn range(field: impl Into<FieldRef>, bounds: Params) -> Result<Self> {
        const BOUND_KEYS: [&str; 6] = ["gt", "gte", "lt", "lte", "from", "to"];
        let field = field.into();
        if !bounds.keys().any(|k| BOUND_KEYS.contains(&k.as_str())) {
            return Err(DslError::InvalidExpression(format!(
                "range on '{}' requires at least one bound",
                field.name()
            )));
        }
        Ok(Expr::Range {
            field,
            bounds,
            params: Params::new(),
        })
    }

    pub fn exists(field: impl Into<FieldRef>) -> Self {
        Expr::Exists {
            field: field.into(),
            params: Params::new(),
        }
    }

    pub fn missing(field: impl Into<FieldRef>) -> Self {
        Expr::Missing {
            field: field.into(),
            params: Params::new(),
        }
    }

    pub fn ids(values: Vec<Value>, doc_type: Option<DocTypeRef>) -> Self {
        Expr::Ids {
            values,
            doc_type,
            params: Params::new(),
        }
    }

    pub fn parent_id(child_type: Option<DocTypeRef>, parent_id: impl Into<Value>) -> Self {
        Expr::ParentId {
            child_type,
            parent_id: parent_id.into(),
        }
    }

    pub fn has_parent(query: Expr, parent_type: Option<DocTypeRef>) -> Self {
        Expr::HasParent {
            query: Box::new(query),
            parent_type,
            params: Params::new(),
        }
    }

    pub fn has_child(query: Expr, child_type: Option<DocTypeRef>) -> Self {
        Expr::HasChild {
            query: Box::new(query),
            child_type,
            params: Params::new(),
        }
    }

    /// `bool.must`; a single expression is returned unchanged
    pub fn must(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            return exprs.remove(0);
        }
        Expr::Bool(BoolQuery {
            must: exprs,
            ..BoolQuery::default()
        })
    }

    /// `bool.should`; a single expression is returned unchanged
    pub fn should(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            return exprs.remove(0);
        }
        Expr::Bool(BoolQuery {
            should: exprs,
            ..BoolQuery::default()
        })
    }

    pub fn must_not(exprs: Vec<Expr>) -> Self {
        Expr::Bool(BoolQuery {
            must_not: exprs,
            ..BoolQuery::default()
        })
    }

    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::BoolOp {
            op: BoolOperator::And,
            exprs,
            params: Params::new(),
        }
    }

    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::BoolOp {
            op: BoolOperator::Or,
            exprs,
            params: Params::new(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not {
            expr: Box::new(expr),
            params: Params::new(),
        }
    }

    pub fn function_score(query: Option<Expr>, functions: Vec<Function>) -> Self {
        Expr::FunctionScore {
            query: query.map(Box::new),
            functions,
            params: Params::new(),
        }
    }

    pub fn named(name: impl Into<String>, params: Params) -> Self {
        Expr::Named {
            name: name.into(),
            params,
        }
    }

    pub fn script(params: Params) -> Self {
        Expr::Script(params)
    }

    pub fn boost(self, weight: f64) -> Self {
        Expr::Boost {
            expr: Box::new(self),
            weight,
        }
    }

    /// Add a parameter to nodes that carry a parameter set; other nodes
    /// are returned unchanged.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        if let Some(params) = self.params_mut() {
            params.insert(key.into(), value.into());
        }
        self
    }

    fn params_mut(&mut self) -> Option<&mut Params> {
        match self {
            Expr::Params(params)
            | Expr::MatchAll(params)
            | Expr::FieldQuery { params, .. }
            | Expr::MultiMatch { params, .. }
            | Expr::Range { params, .. }
            | Expr::Terms { params, .. }
            | Expr::Exists { params, .. }
            | Expr::Missing { params, .. }
            | Expr::Ids { params, .. }
            | Expr::HasParent { params, .. }
            | Expr::HasChild { params, .. }
            | Expr::BoolOp { params, .. }
            | Expr::Not { params, .. }
            | Expr::FunctionScore { params, .. }
            | Expr::FilterQuery { params, .. }
            | Expr::Named { params, .. }
            | Expr::HighlightedField { params, .. }
            | Expr::Script(params) => Some(params),
            Expr::Bool(bool_query) => Some(&mut bool_query.params),
            Expr::Sort(sort) => Some(&mut sort.params),
            Expr::Agg(agg) => Some(&mut agg.params),
            Expr::Highlight(highlight) => Some(&mut highlight.params),
            Expr::Rescore(rescore) => Some(&mut rescore.rescorer),
            Expr::Literal(_)
            | Expr::Field(_)
            | Expr::List(_)
            | Expr::Boost { .. }
            | Expr::ParentId { .. }
            | Expr::Filtered { .. }
            | Expr::Source(_)
            | Expr::Function(_) => None,
        }
    }

    /// Typed schemas referenced by this tree, in first-seen order.
    ///
    /// `has_parent`/`has_child` subtrees are skipped: their fields belong
    /// to the related type, not to the searched one.
    pub fn collect_schemas(&self) -> Vec<Arc<Schema>> {
        let mut found = Vec::new();
        self.collect_schemas_into(&mut found);
        found
    }

    pub(crate) fn collect_schemas_into(&self, found: &mut Vec<Arc<Schema>>) {
        let mut push_field = |field: &FieldRef, found: &mut Vec<Arc<Schema>>| {
            if let Some(schema) = field.schema() {
                push_schema(found, schema);
            }
        };

        match self {
            Expr::Literal(_) | Expr::ParentId { .. } | Expr::HasParent { .. } | Expr::HasChild { .. } => {}
            Expr::Field(field) => push_field(field, found),
            Expr::Params(params) | Expr::MatchAll(params) | Expr::Named { params, .. } | Expr::Script(params) => {
                collect_params(params, found)
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_schemas_into(found)),
            Expr::Boost { expr, .. } => expr.collect_schemas_into(found),
            Expr::FieldQuery {
                field,
                query,
                params,
                ..
            } => {
                push_field(field, found);
                query.collect_schemas_into(found);
                collect_params(params, found);
            }
            Expr::MultiMatch {
                query,
                fields,
                params,
            } => {
                query.collect_schemas_into(found);
                fields.iter().for_each(|e| e.collect_schemas_into(found));
                collect_params(params, found);
            }
            Expr::Range {
                field,
                bounds,
                params,
            } => {
                push_field(field, found);
                collect_params(bounds, found);
                collect_params(params, found);
            }
            Expr::Terms {
                field,
                terms,
                params,
            } => {
                push_field(field, found);
                terms.iter().for_each(|e| e.collect_schemas_into(found));
                collect_params(params, found);
            }
            Expr::Exists { field, params }
            | Expr::Missing { field, params }
            | Expr::HighlightedField { field, params } => {
                push_field(field, found);
                collect_params(params, found);
            }
            Expr::Ids {
                doc_type, params, ..
            } => {
                if let Some(schema) = doc_type.as_ref().and_then(DocTypeRef::schema) {
                    push_schema(found, schema);
                }
                collect_params(params, found);
            }
            Expr::Bool(b) => {
                for e in b.must.iter().chain(&b.filter).chain(&b.should).chain(&b.must_not) {
                    e.collect_schemas_into(found);
                }
                collect_params(&b.params, found);
            }
            Expr::BoolOp { exprs, params, .. } => {
                exprs.iter().for_each(|e| e.collect_schemas_into(found));
                collect_params(params, found);
            }
            Expr::Not { expr, params } | Expr::FilterQuery { query: expr, params } => {
                expr.collect_schemas_into(found);
                collect_params(params, found);
            }
            Expr::Filtered { query, filter } => {
                if let Some(query) = query {
                    query.collect_schemas_into(found);
                }
                filter.collect_schemas_into(found);
            }
            Expr::FunctionScore {
                query,
                functions,
                params,
            } => {
                if let Some(query) = query {
                    query.collect_schemas_into(found);
                }
                for function in functions {
                    collect_function(function, found);
                }
                collect_params(params, found);
            }
            Expr::Sort(sort) => {
                sort.expr.collect_schemas_into(found);
                collect_params(&sort.params, found);
            }
            Expr::Agg(agg) => collect_agg(agg, found),
            Expr::Source(source) => {
                if let SourceFields::Fields(fields) = &source.fields {
                    fields.iter().for_each(|e| e.collect_schemas_into(found));
                }
                for e in source.include.iter().chain(&source.exclude) {
                    e.collect_schemas_into(found);
                }
            }
            Expr::Highlight(highlight) => {
                match &highlight.fields {
                    Some(HighlightFields::Map(fields)) => {
                        for (field, options) in fields {
                            push_field(field, found);
                            collect_params(options, found);
                        }
                    }
                    Some(HighlightFields::List(fields)) => {
                        fields.iter().for_each(|e| e.collect_schemas_into(found))
                    }
                    None => {}
                }
                collect_params(&highlight.params, found);
            }
            Expr::Rescore(rescore) => collect_params(&rescore.rescorer, found),
            Expr::Function(function) => collect_function(function, found),
        }
    }
}

fn push_schema(found: &mut Vec<Arc<Schema>>, schema: &Arc<Schema>) {
    let Some(doc_type) = schema.doc_type() else {
        return;
    };
    if !found.iter().any(|s| s.doc_type() == Some(doc_type)) {
        found.push(Arc::clone(schema));
    }
}

fn collect_params(params: &Params, found: &mut Vec<Arc<Schema>>) {
    params.values().for_each(|e| e.collect_schemas_into(found));
}

fn collect_function(function: &Function, found: &mut Vec<Arc<Schema>>) {
    if let FunctionKind::Decay { field, .. } = &function.kind {
        if let Some(schema) = field.schema() {
            push_schema(found, schema);
        }
    }
    function
        .children()
        .into_iter()
        .for_each(|e| e.collect_schemas_into(found));
}

pub(crate) fn collect_agg(agg: &Agg, found: &mut Vec<Arc<Schema>>) {
    agg.children()
        .into_iter()
        .for_each(|e| e.collect_schemas_into(found));
    for sub in agg.aggs.values() {
        collect_agg(sub, found);
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<BoundField> for Expr {
    fn from(field: BoundField) -> Self {
        Expr::Field(FieldRef::Bound(field))
    }
}

impl From<&BoundField> for Expr {
    fn from(field: &BoundField) -> Self {
        Expr::Field(FieldRef::Bound(field.clone()))
    }
}

impl From<Params> for Expr {
    fn from(params: Params) -> Self {
        Expr::Params(params)
    }
}

impl From<Vec<Expr>> for Expr {
    fn from(items: Vec<Expr>) -> Self {
        Expr::List(items)
    }
}

impl From<Agg> for Expr {
    fn from(agg: Agg) -> Self {
        Expr::Agg(Box::new(agg))
    }
}

impl From<Sort> for Expr {
    fn from(sort: Sort) -> Self {
        Expr::Sort(sort)
    }
}

impl From<Function> for Expr {
    fn from(function: Function) -> Self {
        Expr::Function(Box::new(function))
    }
}

impl From<BoolQuery> for Expr {
    fn from(bool_query: BoolQuery) -> Self {
        Expr::Bool(bool_query)
    }
}
