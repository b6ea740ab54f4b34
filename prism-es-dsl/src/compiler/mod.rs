//! Expression compiler
//!
//! [`Compiler`] holds the capability record of the target version and
//! hands out endpoint compilers. [`ExprCompiler`] is the recursive
//! visitor turning an [`Expr`] tree into protocol JSON; every node kind is
//! matched exhaustively, and the shape chosen for version-dependent kinds
//! is decided here.

pub mod doc_types;

use crate::capability::{EsVersion, Features};
use crate::config::{DslConfig, ValidationMode, DEFAULT_DOC_TYPE};
use crate::error::DslError;
use crate::expr::{
    Agg, AggKind, BoolOperator, BoolQuery, DocTypeRef, Expr, FieldRef, Function, FunctionKind,
    HighlightFields, Params, Rescore, Sort, Source, SourceFields,
};
use crate::schema::Schema;
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Entry point: capability record plus compile options
#[derive(Debug, Clone)]
pub struct Compiler {
    features: Features,
    default_doc_type: String,
    validation: ValidationMode,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Features::default())
    }
}

impl Compiler {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            default_doc_type: DEFAULT_DOC_TYPE.to_string(),
            validation: ValidationMode::Off,
        }
    }

    pub fn for_version(version: &EsVersion) -> Self {
        Self::new(Features::for_version(version))
    }

    pub fn from_config(config: &DslConfig) -> Result<Self> {
        let version = config.es_version()?;
        Ok(Self::for_version(&version)
            .with_default_doc_type(config.default_doc_type.clone())
            .with_validation(config.validation))
    }

    /// Shared physical type used by document-type emulation
    pub fn with_default_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.default_doc_type = doc_type.into();
        self
    }

    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn default_doc_type(&self) -> &str {
        &self.default_doc_type
    }

    pub fn validation(&self) -> ValidationMode {
        self.validation
    }

    /// Visitor for an expression tree with the given document classes
    pub fn expression_compiler<'a>(&'a self, doc_classes: &'a [Arc<Schema>]) -> ExprCompiler<'a> {
        ExprCompiler {
            features: &self.features,
            doc_classes,
        }
    }

    /// Compile a standalone expression. Document classes are collected
    /// from the tree once before visiting it.
    pub fn compile_expression(&self, expr: &Expr) -> Result<Value> {
        let doc_classes = expr.collect_schemas();
        self.expression_compiler(&doc_classes).compile(expr)
    }

    pub(crate) fn is_emulated(&self, schema: &Schema) -> bool {
        doc_types::is_emulated(&self.features, schema)
    }
}

/// Recursive visitor over [`Expr`]
#[derive(Debug, Clone, Copy)]
pub struct ExprCompiler<'a> {
    features: &'a Features,
    doc_classes: &'a [Arc<Schema>],
}

impl<'a> ExprCompiler<'a> {
    pub fn new(features: &'a Features, doc_classes: &'a [Arc<Schema>]) -> Self {
        Self {
            features,
            doc_classes,
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(field) => Ok(Value::from(field.name())),
            Expr::Params(params) => self.compile_params(params).map(Value::Object),
            Expr::List(items) => self.compile_list(items),
            Expr::Boost { expr, weight } => {
                let target = match self.compile(expr)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(Value::from(format!("{}^{}", target, Value::from(*weight))))
            }
            Expr::MatchAll(params) => Ok(single("match_all", self.compile_params(params)?)),
            Expr::FieldQuery {
                kind,
                field,
                query,
                params,
            } => {
                let query = self.compile(query)?;
                let value = if params.is_empty() {
                    query
                } else {
                    let mut body = Map::new();
                    body.insert(kind.query_key().to_string(), query);
                    body.extend(self.compile_params(params)?);
                    Value::Object(body)
                };
                Ok(single(kind.name(), single(field.name(), value)))
            }
            Expr::MultiMatch {
                query,
                fields,
                params,
            } => {
                let mut body = Map::new();
                body.insert("query".to_string(), self.compile(query)?);
                body.insert("fields".to_string(), self.compile_list(fields)?);
                body.extend(self.compile_params(params)?);
                Ok(single("multi_match", body))
            }
            Expr::Range {
                field,
                bounds,
                params,
            } => {
                let mut body = self.compile_params(params)?;
                body.insert(
                    field.name().to_string(),
                    Value::Object(self.compile_params(bounds)?),
                );
                Ok(single("range", body))
            }
            Expr::Terms {
                field,
                terms,
                params,
            } => {
                let mut body = Map::new();
                body.insert(field.name().to_string(), self.compile_list(terms)?);
                body.extend(self.compile_params(params)?);
                Ok(single("terms", body))
            }
            Expr::Exists { field, params } => Ok(single("exists", self.field_body(field, params)?)),
            Expr::Missing { field, params } => {
                if self.features.supports_missing_query {
                    return Ok(single("missing", self.field_body(field, params)?));
                }
                self.compile(&Expr::must_not(vec![Expr::Exists {
                    field: field.clone(),
                    params: params.clone(),
                }]))
            }
            Expr::Ids {
                values,
                doc_type,
                params,
            } => self.compile_ids(values, doc_type.as_ref(), params),
            Expr::ParentId {
                child_type,
                parent_id,
            } => self.compile_parent_id(child_type.as_ref(), parent_id),
            Expr::HasParent {
                query,
                parent_type,
                params,
            } => {
                let parent_type = self.related_type(parent_type.as_ref(), query, "parent")?;
                let mut body = Map::new();
                body.insert("query".to_string(), self.compile(query)?);
                body.extend(self.compile_params(params)?);
                body.insert("parent_type".to_string(), Value::from(parent_type));
                Ok(single("has_parent", body))
            }
            Expr::HasChild {
                query,
                child_type,
                params,
            } => {
                let child_type = self.related_type(child_type.as_ref(), query, "child")?;
                let mut body = Map::new();
                body.insert("query".to_string(), self.compile(query)?);
                body.extend(self.compile_params(params)?);
                body.insert("type".to_string(), Value::from(child_type));
                Ok(single("has_child", body))
            }
            Expr::Bool(bool_query) => self.compile_bool(bool_query),
            Expr::BoolOp { op, exprs, params } => self.compile_bool_op(*op, exprs, params),
            Expr::Not { expr, params } => {
                if !self.features.supports_old_boolean_queries {
                    return self.compile(&Expr::must_not(vec![(**expr).clone()]));
                }
                let inner = self.compile(expr)?;
                if params.is_empty() {
                    return Ok(single("not", inner));
                }
                let mut body = Map::new();
                body.insert("filter".to_string(), inner);
                body.extend(self.compile_params(params)?);
                Ok(single("not", body))
            }
            Expr::Filtered { query, filter } => self.compile_filtered(query.as_deref(), filter),
            Expr::FunctionScore {
                query,
                functions,
                params,
            } => {
                let mut body = Map::new();
                if let Some(query) = query {
                    body.insert("query".to_string(), self.compile(query)?);
                }
                let functions = functions
                    .iter()
                    .map(|f| self.compile_function(f))
                    .collect::<Result<Vec<_>>>()?;
                body.insert("functions".to_string(), Value::Array(functions));
                body.extend(self.compile_params(params)?);
                Ok(single("function_score", body))
            }
            Expr::FilterQuery { query, params } => {
                let mut body = Map::new();
                body.insert("query".to_string(), self.compile(query)?);
                if params.is_empty() {
                    return Ok(Value::Object(body));
                }
                body.extend(self.compile_params(params)?);
                Ok(single("fquery", body))
            }
            Expr::Named { name, params } => Ok(single(name, self.compile_params(params)?)),
            Expr::Sort(sort) => self.compile_sort(sort),
            Expr::Agg(agg) => self.compile_agg(agg),
            Expr::Source(source) => self.compile_source(source),
            Expr::Highlight(highlight) => {
                let mut body = self.compile_params(&highlight.params)?;
                match &highlight.fields {
                    Some(HighlightFields::Map(fields)) => {
                        let mut compiled = Map::new();
                        for (field, options) in fields {
                            compiled.insert(
                                field.name().to_string(),
                                Value::Object(self.compile_params(options)?),
                            );
                        }
                        body.insert("fields".to_string(), Value::Object(compiled));
                    }
                    Some(HighlightFields::List(fields)) => {
                        let compiled = fields
                            .iter()
                            .map(|f| match f {
                                Expr::HighlightedField { .. } | Expr::Params(_) => self.compile(f),
                                other => Ok(single(&self.field_name(other)?, Map::new())),
                            })
                            .collect::<Result<Vec<_>>>()?;
                        body.insert("fields".to_string(), Value::Array(compiled));
                    }
                    None => {}
                }
                Ok(Value::Object(body))
            }
            Expr::HighlightedField { field, params } => {
                Ok(single(field.name(), self.compile_params(params)?))
            }
            Expr::Rescore(rescore) => self.compile_rescore(rescore),
            Expr::Script(params) => self.compile_params(params).map(Value::Object),
            Expr::Function(function) => self.compile_function(function),
        }
    }

    pub fn compile_params(&self, params: &Params) -> Result<Map<String, Value>> {
        let mut compiled = Map::new();
        for (key, value) in params {
            compiled.insert(key.clone(), self.compile(value)?);
        }
        Ok(compiled)
    }

    pub fn compile_list(&self, items: &[Expr]) -> Result<Value> {
        items
            .iter()
            .map(|e| self.compile(e))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn field_name(&self, expr: &Expr) -> Result<String> {
        match self.compile(expr)? {
            Value::String(name) => Ok(name),
            other => Err(DslError::InvalidExpression(format!(
                "expected a field name, got {}",
                other
            ))),
        }
    }

    fn field_body(&self, field: &FieldRef, params: &Params) -> Result<Map<String, Value>> {
        let mut body = Map::new();
        body.insert("field".to_string(), Value::from(field.name()));
        body.extend(self.compile_params(params)?);
        Ok(body)
    }

    fn compile_bool(&self, bool_query: &BoolQuery) -> Result<Value> {
        let mut body = Map::new();
        let clauses = [
            ("must", &bool_query.must),
            ("filter", &bool_query.filter),
            ("should", &bool_query.should),
            ("must_not", &bool_query.must_not),
        ];
        for (key, exprs) in clauses {
            if !exprs.is_empty() {
                body.insert(key.to_string(), self.compile_list(exprs)?);
            }
        }
        body.extend(self.compile_params(&bool_query.params)?);
        Ok(single("bool", body))
    }

    fn compile_bool_op(&self, op: BoolOperator, exprs: &[Expr], params: &Params) -> Result<Value> {
        if !self.features.supports_old_boolean_queries {
            let mut rewritten = match op {
                BoolOperator::And => Expr::must(exprs.to_vec()),
                BoolOperator::Or => Expr::should(exprs.to_vec()),
            };
            if let Expr::Bool(bool_query) = &mut rewritten {
                bool_query.params.extend(params.clone());
            }
            return self.compile(&rewritten);
        }

        let compiled = self.compile_list(exprs)?;
        if params.is_empty() {
            return Ok(single(op.name(), compiled));
        }
        let mut body = Map::new();
        body.insert("filters".to_string(), compiled);
        body.extend(self.compile_params(params)?);
        Ok(single(op.name(), body))
    }

    fn compile_filtered(&self, query: Option<&Expr>, filter: &Expr) -> Result<Value> {
        if !self.features.supports_bool_filter {
            let mut body = Map::new();
            if let Some(query) = query {
                body.insert("query".to_string(), self.compile(query)?);
            }
            body.insert("filter".to_string(), self.compile(filter)?);
            return Ok(single("filtered", body));
        }

        // A plain conjunction of filters becomes the filter clause list
        let filters = match filter {
            Expr::Bool(b)
                if b.filter.is_empty()
                    && b.should.is_empty()
                    && b.must_not.is_empty()
                    && b.params.is_empty() =>
            {
                b.must.clone()
            }
            other => vec![other.clone()],
        };
        let bool_query = BoolQuery {
            must: query.into_iter().cloned().collect(),
            filter: filters,
            ..BoolQuery::default()
        };
        self.compile_bool(&bool_query)
    }

    fn compile_ids(
        &self,
        values: &[Value],
        doc_type: Option<&DocTypeRef>,
        params: &Params,
    ) -> Result<Value> {
        let mut body = self.compile_params(params)?;
        let ids = values
            .iter()
            .map(|value| {
                crate::document::value_to_string(value).ok_or_else(|| {
                    DslError::Compilation(format!("Document id must be a string or a number: {}", value))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let emulated_ids = |schema: &Schema| -> Vec<Value> {
            let doc_type = schema.doc_type().unwrap_or_default();
            ids.iter()
                .map(|id| Value::from(doc_types::doc_type_and_id(doc_type, id)))
                .collect()
        };

        let typed = doc_type
            .and_then(DocTypeRef::schema)
            .filter(|s| doc_types::is_emulated(self.features, s));
        if let Some(schema) = typed {
            body.insert("values".to_string(), Value::Array(emulated_ids(schema.as_ref())));
        } else if self
            .doc_classes
            .iter()
            .any(|s| doc_types::is_emulated(self.features, s))
        {
            // Without an explicit type every emulated class is a candidate
            let ids: Vec<Value> = self
                .doc_classes
                .iter()
                .filter(|s| doc_types::is_emulated(self.features, s))
                .flat_map(|s| emulated_ids(s.as_ref()))
                .collect();
            body.insert("values".to_string(), Value::Array(ids));
        } else {
            body.insert("values".to_string(), Value::Array(values.to_vec()));
            if let Some(name) = doc_type.and_then(DocTypeRef::doc_type) {
                body.insert("type".to_string(), Value::from(name));
            }
        }
        Ok(single("ids", body))
    }

    fn compile_parent_id(&self, child_type: Option<&DocTypeRef>, parent_id: &Value) -> Result<Value> {
        if !self.features.supports_parent_id_query {
            return Err(DslError::Compilation(
                "Elasticsearch before 5.x does not have support for parent_id query".to_string(),
            ));
        }
        let child_name = child_type.and_then(DocTypeRef::doc_type).ok_or_else(|| {
            DslError::Compilation("Cannot detect child type, specify 'child_type' argument".to_string())
        })?;

        let parent_id = match child_type.and_then(DocTypeRef::schema) {
            Some(schema) if doc_types::is_emulated(self.features, schema) => {
                let id = crate::document::value_to_string(parent_id).unwrap_or_default();
                Value::from(doc_types::emulated_parent_id(schema, &id))
            }
            _ => parent_id.clone(),
        };

        let mut body = Map::new();
        body.insert("type".to_string(), Value::from(child_name));
        body.insert("id".to_string(), parent_id);
        Ok(single("parent_id", body))
    }

    /// Type of the other side of a parent/child query: explicit, else the
    /// single document class referenced by the inner query
    fn related_type(&self, explicit: Option<&DocTypeRef>, query: &Expr, role: &str) -> Result<String> {
        if let Some(name) = explicit.and_then(DocTypeRef::doc_type) {
            return Ok(name.to_string());
        }
        let candidates = query.collect_schemas();
        match candidates.as_slice() {
            [schema] => Ok(schema.doc_type().unwrap_or_default().to_string()),
            [] => Err(DslError::Compilation(format!(
                "Cannot detect {} type, specify '{}' argument",
                role,
                if role == "parent" { "parent_type" } else { "type" }
            ))),
            _ => Err(DslError::Compilation(format!(
                "Too many candidates for {} type, should be only one",
                role
            ))),
        }
    }

    fn compile_sort(&self, sort: &Sort) -> Result<Value> {
        let target = self.field_name(&sort.expr)?;
        if !sort.params.is_empty() {
            let mut body = Map::new();
            if let Some(order) = &sort.order {
                body.insert("order".to_string(), Value::from(order.as_str()));
            }
            body.extend(self.compile_params(&sort.params)?);
            return Ok(single(&target, body));
        }
        match &sort.order {
            Some(order) => Ok(single(&target, Value::from(order.as_str()))),
            None => Ok(Value::from(target)),
        }
    }

    pub fn compile_agg(&self, agg: &Agg) -> Result<Value> {
        let name = agg.kind.name();
        let mut body = Map::new();
        let agg_body = match &agg.kind {
            AggKind::Filter(filter) => self.compile(filter)?,
            _ => Value::Object(self.compile_params(&agg.params)?),
        };
        body.insert(name.to_string(), agg_body);

        if agg.kind.is_bucket() && !agg.aggs.is_empty() {
            let mut sub = Map::new();
            for (sub_name, sub_agg) in &agg.aggs {
                sub.insert(sub_name.clone(), self.compile_agg(sub_agg)?);
            }
            body.insert("aggregations".to_string(), Value::Object(sub));
        }
        Ok(Value::Object(body))
    }

    fn compile_source(&self, source: &Source) -> Result<Value> {
        if !source.include.is_empty() || !source.exclude.is_empty() {
            let mut body = Map::new();
            if !source.include.is_empty() {
                body.insert("include".to_string(), self.compile_list(&source.include)?);
            }
            if !source.exclude.is_empty() {
                body.insert("exclude".to_string(), self.compile_list(&source.exclude)?);
            }
            return Ok(Value::Object(body));
        }
        match &source.fields {
            SourceFields::Enabled(enabled) => Ok(Value::Bool(*enabled)),
            SourceFields::Fields(fields) => self.compile_list(fields),
        }
    }

    fn compile_rescore(&self, rescore: &Rescore) -> Result<Value> {
        let mut body = Map::new();
        body.insert(
            "query".to_string(),
            Value::Object(self.compile_params(&rescore.rescorer)?),
        );
        if let Some(window_size) = rescore.window_size {
            body.insert("window_size".to_string(), Value::from(window_size));
        }
        Ok(Value::Object(body))
    }

    fn compile_function(&self, function: &Function) -> Result<Value> {
        let mut body = Map::new();
        match &function.kind {
            FunctionKind::Weight => {
                body.insert(
                    "weight".to_string(),
                    function.weight.map(Value::from).unwrap_or(Value::Null),
                );
            }
            FunctionKind::FieldValueFactor(params)
            | FunctionKind::ScriptScore(params)
            | FunctionKind::RandomScore(params) => {
                body.insert(
                    function.kind.name().to_string(),
                    Value::Object(self.compile_params(params)?),
                );
            }
            FunctionKind::Decay {
                field,
                decay_params,
                params,
                ..
            } => {
                let mut decay = Map::new();
                decay.insert(
                    field.name().to_string(),
                    Value::Object(self.compile_params(decay_params)?),
                );
                decay.extend(self.compile_params(params)?);
                body.insert(function.kind.name().to_string(), Value::Object(decay));
            }
        }
        if let Some(filter) = &function.filter {
            body.insert("filter".to_string(), self.compile(filter)?);
        }
        if !matches!(function.kind, FunctionKind::Weight) {
            if let Some(weight) = function.weight {
                body.insert("weight".to_string(), Value::from(weight));
            }
        }
        Ok(Value::Object(body))
    }
}

/// `{key: value}`
pub(crate) fn single(key: &str, value: impl Into<Value>) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{params, DecayKind, Highlight};
    use crate::schema::Field;
    use crate::types::FieldType;
    use serde_json::json;

    fn compile(features: Features, expr: &Expr) -> Result<Value> {
        Compiler::new(features).compile_expression(expr)
    }

    #[test]
    fn test_field_query_short_and_expanded() {
        let expr = Expr::term("status", "active");
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"term": {"status": "active"}})
        );

        let expr = Expr::match_query("title", "rust").param("operator", "and");
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"match": {"title": {"query": "rust", "operator": "and"}}})
        );
    }

    #[test]
    fn test_boost_expression() {
        let expr = Expr::multi_match("rust", vec![Expr::field("title").boost(2.0), Expr::field("body")]);
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"multi_match": {"query": "rust", "fields": ["title^2.0", "body"]}})
        );
    }

    #[test]
    fn test_range_and_terms() {
        let expr = Expr::range("price", params([("gte", 10), ("lt", 20)]))
            .unwrap()
            .param("_name", "price_range");
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"range": {"_name": "price_range", "price": {"gte": 10, "lt": 20}}})
        );

        let expr = Expr::terms("tag", vec!["a".into(), "b".into()]).param("boost", 1.5);
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"terms": {"tag": ["a", "b"], "boost": 1.5}})
        );
    }

    #[test]
    fn test_missing_by_version() {
        let expr = Expr::missing("email");
        assert_eq!(
            compile(Features::es_2(), &expr).unwrap(),
            json!({"missing": {"field": "email"}})
        );
        assert_eq!(
            compile(Features::es_5(), &expr).unwrap(),
            json!({"bool": {"must_not": [{"exists": {"field": "email"}}]}})
        );
    }

    #[test]
    fn test_legacy_boolean_operators() {
        let a = Expr::term("a", 1);
        let b = Expr::term("b", 2);
        let expr = Expr::and(vec![a.clone(), b.clone()]);
        assert_eq!(
            compile(Features::es_1(), &expr).unwrap(),
            json!({"and": [{"term": {"a": 1}}, {"term": {"b": 2}}]})
        );

        let expr = Expr::or(vec![a.clone(), b.clone()]).param("_cache", true);
        assert_eq!(
            compile(Features::es_1(), &expr).unwrap(),
            json!({"or": {"filters": [{"term": {"a": 1}}, {"term": {"b": 2}}], "_cache": true}})
        );

        let expr = Expr::not(a.clone());
        assert_eq!(
            compile(Features::es_1(), &expr).unwrap(),
            json!({"not": {"term": {"a": 1}}})
        );
        assert_eq!(
            compile(Features::es_2(), &expr).unwrap(),
            json!({"bool": {"must_not": [{"term": {"a": 1}}]}})
        );
    }

    #[test]
    fn test_and_matches_bool_must() {
        let a = Expr::term("a", 1);
        let b = Expr::match_query("b", "x");
        for features in [Features::es_2(), Features::es_5(), Features::es_6()] {
            assert_eq!(
                compile(features.clone(), &Expr::and(vec![a.clone(), b.clone()])).unwrap(),
                compile(features, &Expr::must(vec![a.clone(), b.clone()])).unwrap()
            );
        }
    }

    #[test]
    fn test_filtered_by_version() {
        let expr = Expr::Filtered {
            query: Some(Box::new(Expr::match_all())),
            filter: Box::new(Expr::must(vec![Expr::term("a", 1), Expr::term("b", 2)])),
        };
        assert_eq!(
            compile(Features::es_1(), &expr).unwrap(),
            json!({"filtered": {
                "query": {"match_all": {}},
                "filter": {"bool": {"must": [{"term": {"a": 1}}, {"term": {"b": 2}}]}}
            }})
        );
        assert_eq!(
            compile(Features::es_5(), &expr).unwrap(),
            json!({"bool": {
                "must": [{"match_all": {}}],
                "filter": [{"term": {"a": 1}}, {"term": {"b": 2}}]
            }})
        );
    }

    #[test]
    fn test_parent_id_unsupported() {
        let expr = Expr::parent_id(Some("answer".into()), "1");
        let err = compile(Features::es_2(), &expr).unwrap_err();
        assert!(matches!(err, DslError::Compilation(_)));
        assert_eq!(
            compile(Features::es_5(), &expr).unwrap(),
            json!({"parent_id": {"type": "answer", "id": "1"}})
        );
    }

    #[test]
    fn test_parent_id_requires_child_type() {
        let expr = Expr::parent_id(None, "1");
        let err = compile(Features::es_5(), &expr).unwrap_err();
        assert!(err.to_string().contains("child_type"));
    }

    #[test]
    fn test_has_parent_type_inference() {
        let question = Schema::builder("question")
            .field(Field::new("title", FieldType::Text))
            .build();
        let title = question.field("title").unwrap();
        let expr = Expr::has_parent(Expr::match_query(&title, "rust"), None);
        assert_eq!(
            compile(Features::es_5(), &expr).unwrap(),
            json!({"has_parent": {
                "query": {"match": {"title": "rust"}},
                "parent_type": "question"
            }})
        );

        let err = compile(
            Features::es_5(),
            &Expr::has_parent(Expr::match_all(), None),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot detect parent type"));
    }

    #[test]
    fn test_has_child_ambiguous() {
        let answer = Schema::builder("answer")
            .field(Field::new("body", FieldType::Text))
            .build();
        let comment = Schema::builder("comment")
            .field(Field::new("body", FieldType::Text))
            .build();
        let query = Expr::must(vec![
            Expr::match_query(answer.field("body").unwrap(), "x"),
            Expr::match_query(comment.field("body").unwrap(), "y"),
        ]);
        let err = compile(Features::es_5(), &Expr::has_child(query, None)).unwrap_err();
        assert!(err.to_string().contains("Too many candidates for child type"));
    }

    #[test]
    fn test_ids_plain_and_emulated() {
        let expr = Expr::ids(vec![json!("1"), json!(2)], Some("post".into()));
        assert_eq!(
            compile(Features::es_5(), &expr).unwrap(),
            json!({"ids": {"values": ["1", 2], "type": "post"}})
        );

        let question = Schema::builder("question").join_parent(None).build();
        let expr = Expr::ids(vec![json!("1"), json!(2)], Some((&question).into()));
        assert_eq!(
            compile(Features::es_6(), &expr).unwrap(),
            json!({"ids": {"values": ["question:1", "question:2"]}})
        );
    }

    #[test]
    fn test_ids_reject_non_scalar_values() {
        let question = Schema::builder("question").join_parent(None).build();
        for features in [Features::es_5(), Features::es_6()] {
            let expr = Expr::ids(vec![json!("1"), json!({"id": 2})], Some((&question).into()));
            let err = compile(features, &expr).unwrap_err();
            assert!(matches!(err, DslError::Compilation(_)));
        }
        let expr = Expr::ids(vec![json!(null)], None);
        assert!(compile(Features::es_6(), &expr).is_err());
    }

    #[test]
    fn test_sort_shapes() {
        let compiler = Compiler::default();
        assert_eq!(
            compiler.compile_expression(&Sort::new("rank").into()).unwrap(),
            json!("rank")
        );
        assert_eq!(
            compiler.compile_expression(&Sort::desc("rank").into()).unwrap(),
            json!({"rank": "desc"})
        );
        assert_eq!(
            compiler
                .compile_expression(&Sort::asc("rank").param("missing", "_last").into())
                .unwrap(),
            json!({"rank": {"order": "asc", "missing": "_last"}})
        );
    }

    #[test]
    fn test_aggregations() {
        let agg = Agg::terms("category")
            .param("size", 5)
            .agg("avg_price", Agg::avg("price"))
            .agg("recent", Agg::filter(Expr::term("new", true)));
        assert_eq!(
            Compiler::default().compile_expression(&agg.into()).unwrap(),
            json!({
                "terms": {"field": "category", "size": 5},
                "aggregations": {
                    "avg_price": {"avg": {"field": "price"}},
                    "recent": {"filter": {"term": {"new": true}}}
                }
            })
        );
    }

    #[test]
    fn test_function_score() {
        let expr = Expr::function_score(
            Some(Expr::match_all()),
            vec![
                Function::weight(2.0).filter(Expr::term("featured", true)),
                Function::field_value_factor("popularity").param("modifier", "log1p"),
                Function::decay(DecayKind::Gauss, "published", params([("scale", "7d")]))
                    .param("multi_value_mode", "avg"),
            ],
        )
        .param("score_mode", "sum");
        assert_eq!(
            Compiler::default().compile_expression(&expr).unwrap(),
            json!({"function_score": {
                "query": {"match_all": {}},
                "functions": [
                    {"weight": 2.0, "filter": {"term": {"featured": true}}},
                    {"field_value_factor": {"field": "popularity", "modifier": "log1p"}},
                    {"gauss": {"published": {"scale": "7d"}, "multi_value_mode": "avg"}}
                ],
                "score_mode": "sum"
            }})
        );
    }

    #[test]
    fn test_source_and_highlight() {
        let compiler = Compiler::default();
        let source = Source::filtered(vec!["title".into()], vec!["body".into()]);
        assert_eq!(
            compiler.compile_expression(&Expr::Source(source)).unwrap(),
            json!({"include": ["title"], "exclude": ["body"]})
        );
        assert_eq!(
            compiler
                .compile_expression(&Expr::Source(Source::enabled(false)))
                .unwrap(),
            json!(false)
        );

        let highlight = Highlight {
            fields: Some(HighlightFields::List(vec![
                Expr::field("title"),
                Expr::HighlightedField {
                    field: "body".into(),
                    params: params([("fragment_size", 100)]),
                },
            ])),
            params: params([("pre_tags", Expr::List(vec!["<b>".into()]))]),
        };
        assert_eq!(
            compiler.compile_expression(&Expr::Highlight(highlight)).unwrap(),
            json!({
                "pre_tags": ["<b>"],
                "fields": [{"title": {}}, {"body": {"fragment_size": 100}}]
            })
        );
    }

    #[test]
    fn test_rescore_and_named() {
        let compiler = Compiler::default();
        let rescore = Rescore {
            rescorer: params([("rescore_query", Expr::match_query("title", "rust"))]),
            window_size: Some(50),
        };
        assert_eq!(
            compiler.compile_expression(&Expr::Rescore(rescore)).unwrap(),
            json!({"query": {"rescore_query": {"match": {"title": "rust"}}}, "window_size": 50})
        );

        let nested = Expr::named(
            "nested",
            params([("path", Expr::field("comments")), ("query", Expr::match_all())]),
        );
        assert_eq!(
            compiler.compile_expression(&nested).unwrap(),
            json!({"nested": {"path": "comments", "query": {"match_all": {}}}})
        );
    }
}
