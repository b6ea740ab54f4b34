//! Scoring functions for `function_score` queries

use super::{Expr, FieldRef, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayKind {
    Gauss,
    Exp,
    Linear,
}

impl DecayKind {
    pub fn name(self) -> &'static str {
        match self {
            DecayKind::Gauss => "gauss",
            DecayKind::Exp => "exp",
            DecayKind::Linear => "linear",
        }
    }
}

#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// Bare `weight` function
    Weight,
    FieldValueFactor(Params),
    ScriptScore(Params),
    RandomScore(Params),
    Decay {
        kind: DecayKind,
        field: FieldRef,
        /// origin, scale, offset, decay
        decay_params: Params,
        /// multi_value_mode and friends, next to the field
        params: Params,
    },
}

impl FunctionKind {
    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Weight => "weight",
            FunctionKind::FieldValueFactor(_) => "field_value_factor",
            FunctionKind::ScriptScore(_) => "script_score",
            FunctionKind::RandomScore(_) => "random_score",
            FunctionKind::Decay { kind, .. } => kind.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub kind: FunctionKind,
    pub filter: Option<Box<Expr>>,
    pub weight: Option<f64>,
}

impl Function {
    fn new(kind: FunctionKind) -> Self {
        Self {
            kind,
            filter: None,
            weight: None,
        }
    }

    pub fn weight(weight: f64) -> Self {
        Self {
            weight: Some(weight),
            ..Self::new(FunctionKind::Weight)
        }
    }

    pub fn field_value_factor(field: impl Into<FieldRef>) -> Self {
        let mut params = Params::new();
        params.insert("field".to_string(), Expr::Field(field.into()));
        Self::new(FunctionKind::FieldValueFactor(params))
    }

    pub fn script_score(script: Expr) -> Self {
        let mut params = Params::new();
        params.insert("script".to_string(), script);
        Self::new(FunctionKind::ScriptScore(params))
    }

    pub fn random_score(params: Params) -> Self {
        Self::new(FunctionKind::RandomScore(params))
    }

    pub fn decay(kind: DecayKind, field: impl Into<FieldRef>, decay_params: Params) -> Self {
        Self::new(FunctionKind::Decay {
            kind,
            field: field.into(),
            decay_params,
            params: Params::new(),
        })
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add a parameter to the function body
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        match &mut self.kind {
            FunctionKind::FieldValueFactor(params)
            | FunctionKind::ScriptScore(params)
            | FunctionKind::RandomScore(params)
            | FunctionKind::Decay { params, .. } => {
                params.insert(key.into(), value.into());
            }
            FunctionKind::Weight => {}
        }
        self
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        let mut children: Vec<&Expr> = match &self.kind {
            FunctionKind::Weight => Vec::new(),
            FunctionKind::FieldValueFactor(p)
            | FunctionKind::ScriptScore(p)
            | FunctionKind::RandomScore(p) => p.values().collect(),
            FunctionKind::Decay {
                decay_params,
                params,
                ..
            } => decay_params.values().chain(params.values()).collect(),
        };
        if let Some(filter) = &self.filter {
            children.push(filter);
        }
        children
    }
}
