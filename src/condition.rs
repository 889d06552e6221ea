//! Declarative condition evaluation.
//!
//! Conditions are small boolean expressions over entity attribute paths and
//! the world tick, used to decide whether a run has reached a terminal state
//! without hard-coding faction logic.
//!
//! Grammar (flat, no parentheses, left to right):
//!
//! ```text
//! Expr    := AndGroup ("AND" AndGroup)*
//! AndGroup := OrTerm ("OR" OrTerm)*
//! OrTerm  := Value CompOp Value
//! CompOp  := ">=" | "<=" | ">" | "<" | "==" | "!="
//! ```
//!
//! Every `AND` group must hold; within a group the first satisfied `OR`
//! term short-circuits. A trailing `for N ticks` suffix is parsed into a
//! sustain hint, but the evaluator is stateless across calls: tracking
//! consecutive passes is the orchestration layer's responsibility.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::entity::EntityId;
use crate::error::{EvaluationError, LoomResult};
use crate::storage::EntityStore;
use crate::world::WorldState;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl Comparator {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A numeric literal.
    Number(f64),
    /// A `true`/`false` literal.
    Bool(bool),
    /// The world tick.
    Tick,
    /// A dotted entity attribute path.
    Path(String),
}

impl Operand {
    fn parse(token: &str) -> Self {
        if token == "tick" {
            return Self::Tick;
        }
        if token == "true" {
            return Self::Bool(true);
        }
        if token == "false" {
            return Self::Bool(false);
        }
        if let Ok(n) = token.parse::<f64>() {
            return Self::Number(n);
        }
        Self::Path(token.to_string())
    }
}

/// A single `Value CompOp Value` term.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Left operand.
    pub lhs: Operand,
    /// Operator.
    pub op: Comparator,
    /// Right operand.
    pub rhs: Operand,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Comparison(Comparison),
    /// An unparsable term, kept verbatim. Evaluates to false.
    Malformed(String),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCondition {
    groups: Vec<Vec<Term>>,
    /// The `for N ticks` sustain hint, when present.
    pub sustained_ticks: Option<u64>,
}

impl ParsedCondition {
    /// Returns true if any term failed to parse.
    #[must_use]
    pub fn has_malformed_terms(&self) -> bool {
        self.groups
            .iter()
            .flatten()
            .any(|t| matches!(t, Term::Malformed(_)))
    }
}

/// Parses a condition expression.
///
/// Term-level problems do *not* fail the parse; they are kept as malformed
/// terms that evaluate to false, so one bad token cannot stall evaluation.
///
/// # Errors
///
/// [`EvaluationError::EmptyExpression`] for a blank expression and
/// [`EvaluationError::MalformedSustainSuffix`] for a broken `for N ticks`
/// tail.
pub fn parse(expression: &str) -> Result<ParsedCondition, EvaluationError> {
    let mut tokens: Vec<&str> = expression.split_whitespace().collect();

    let mut sustained_ticks = None;
    if tokens.last() == Some(&"ticks") {
        if tokens.len() < 3 || tokens[tokens.len() - 3] != "for" {
            return Err(EvaluationError::MalformedSustainSuffix {
                reason: "expected 'for N ticks'".to_string(),
            });
        }
        let n = tokens[tokens.len() - 2].parse::<u64>().map_err(|_| {
            EvaluationError::MalformedSustainSuffix {
                reason: format!("'{}' is not a tick count", tokens[tokens.len() - 2]),
            }
        })?;
        sustained_ticks = Some(n);
        tokens.truncate(tokens.len() - 3);
    }

    if tokens.is_empty() {
        return Err(EvaluationError::EmptyExpression);
    }

    let groups = tokens
        .split(|t| *t == "AND")
        .map(|group| {
            group
                .split(|t| *t == "OR")
                .map(parse_term)
                .collect::<Vec<Term>>()
        })
        .collect();

    Ok(ParsedCondition {
        groups,
        sustained_ticks,
    })
}

fn parse_term(tokens: &[&str]) -> Term {
    let [lhs, op, rhs] = tokens else {
        return Term::Malformed(tokens.join(" "));
    };
    let Some(op) = Comparator::from_token(op) else {
        return Term::Malformed(tokens.join(" "));
    };
    Term::Comparison(Comparison {
        lhs: Operand::parse(lhs),
        op,
        rhs: Operand::parse(rhs),
    })
}

/// The outcome of evaluating a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Whether the condition holds right now.
    pub result: bool,

    /// The parsed `for N ticks` hint, surfaced for the caller to track.
    pub sustained_ticks: Option<u64>,

    /// Diagnostics: resolved identifier values (null when unresolved),
    /// per-group outcomes, and unparsable terms.
    pub trace: BTreeMap<String, Value>,
}

/// Evaluates a condition expression against the store and world state.
///
/// Stateless across calls: a sustain hint is parsed and surfaced, never
/// tracked here.
///
/// # Errors
///
/// Parse-level failures (see [`parse`]) and storage failures. Term-level
/// problems degrade to false terms recorded in the trace.
pub fn evaluate(
    expression: &str,
    store: &dyn EntityStore,
    world: &WorldState,
) -> LoomResult<Evaluation> {
    let parsed = parse(expression)?;
    let mut trace = BTreeMap::new();

    let mut result = true;
    for (index, group) in parsed.groups.iter().enumerate() {
        let mut group_holds = false;
        for term in group {
            if eval_term(term, store, world, &mut trace)? {
                group_holds = true;
                break; // first satisfied OR term short-circuits
            }
        }
        trace.insert(format!("group[{index}]"), Value::Bool(group_holds));
        if !group_holds {
            result = false;
        }
    }

    debug!(expression, result, "condition evaluated");
    Ok(Evaluation {
        result,
        sustained_ticks: parsed.sustained_ticks,
        trace,
    })
}

fn eval_term(
    term: &Term,
    store: &dyn EntityStore,
    world: &WorldState,
    trace: &mut BTreeMap<String, Value>,
) -> LoomResult<bool> {
    let comparison = match term {
        Term::Malformed(raw) => {
            trace.insert(format!("malformed[{raw}]"), Value::String("unparsable".to_string()));
            return Ok(false);
        }
        Term::Comparison(c) => c,
    };

    let lhs = resolve_operand(&comparison.lhs, store, world, trace)?;
    let rhs = resolve_operand(&comparison.rhs, store, world, trace)?;

    // Comparisons against an unresolved identifier always fail.
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(false);
    };

    Ok(compare(&lhs, comparison.op, &rhs))
}

fn resolve_operand(
    operand: &Operand,
    store: &dyn EntityStore,
    world: &WorldState,
    trace: &mut BTreeMap<String, Value>,
) -> LoomResult<Option<Value>> {
    match operand {
        Operand::Number(n) => Ok(serde_json::Number::from_f64(*n).map(Value::Number)),
        Operand::Bool(b) => Ok(Some(Value::Bool(*b))),
        Operand::Tick => Ok(Some(Value::from(world.tick))),
        Operand::Path(path) => {
            let resolved = resolve_path(path, store)?;
            trace.insert(path.clone(), resolved.clone().unwrap_or(Value::Null));
            Ok(resolved)
        }
    }
}

/// Resolves a dotted path by trying every prefix (longest first) as a
/// candidate entity id, with the remaining suffix as an attribute path. A
/// full-path match with no suffix resolves to the entity's own id, so
/// conditions can compare reference attributes against entity tokens.
fn resolve_path(path: &str, store: &dyn EntityStore) -> LoomResult<Option<Value>> {
    let segments: Vec<&str> = path.split('.').collect();

    for split in (1..=segments.len()).rev() {
        let Ok(candidate) = EntityId::new(segments[..split].join(".")) else {
            continue;
        };
        let Some(entity) = store.get(&candidate)? else {
            continue;
        };
        let suffix = &segments[split..];
        if suffix.is_empty() {
            return Ok(Some(Value::String(entity.id.as_str().to_string())));
        }
        if let Some(value) = entity.attrs.lookup(suffix) {
            return Ok(Some(value));
        }
        if let [field] = suffix {
            let top_level = match *field {
                "name" => Some(Value::String(entity.name.clone())),
                "type" | "kind" => Some(Value::String(entity.kind.as_str().to_string())),
                "id" => Some(Value::String(entity.id.as_str().to_string())),
                _ => None,
            };
            if top_level.is_some() {
                return Ok(top_level);
            }
        }
    }
    Ok(None)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(lhs: &Value, op: Comparator, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return match op {
            Comparator::Ge => a >= b,
            Comparator::Le => a <= b,
            Comparator::Gt => a > b,
            Comparator::Lt => a < b,
            Comparator::Eq => (a - b).abs() < f64::EPSILON,
            Comparator::Ne => (a - b).abs() >= f64::EPSILON,
        };
    }

    // Equality falls back to string comparison when either side is
    // non-numeric; ordering has no meaning there.
    match op {
        Comparator::Eq => canonical_string(lhs) == canonical_string(rhs),
        Comparator::Ne => canonical_string(lhs) != canonical_string(rhs),
        _ => false,
    }
}
