//! Criteria matching: selects the first conditional row whose criteria all
//! hold for a context.
//!
//! Nothing in here logs. The matcher runs inside the config-driven level
//! filter, where emitting an event would re-enter the subscriber.

use std::borrow::Cow;

use crate::context::Context;
use crate::model::{ConditionalRow, ConfigValue, Criterion, Operator};
use crate::store::ConfigMap;

/// Delimiter for hierarchical property values.
pub const PATH_DELIMITER: char = '.';

/// Bound on nested segment evaluation; deeper (or cyclic) segments do not match.
const MAX_SEGMENT_DEPTH: usize = 8;

/// Evaluates rows against a context, resolving segments from a merged view.
pub struct CriteriaMatcher<'a> {
    configs: &'a ConfigMap,
    project_env_id: Option<i64>,
    depth: usize,
}

impl<'a> CriteriaMatcher<'a> {
    pub fn new(configs: &'a ConfigMap, project_env_id: Option<i64>) -> Self {
        Self {
            configs,
            project_env_id,
            depth: 0,
        }
    }

    /// Returns the first row, in stored order, that applies to the active
    /// environment and whose criteria all hold. Later rows are not evaluated.
    pub fn first_match<'r>(
        &self,
        rows: &'r [ConditionalRow],
        context: &Context,
    ) -> Option<&'r ConditionalRow> {
        rows.iter()
            .filter(|row| self.applies_to_env(row))
            .find(|row| self.matches(row, context))
    }

    /// A row matches iff every criterion holds. No criteria means always.
    pub fn matches(&self, row: &ConditionalRow, context: &Context) -> bool {
        row.criteria
            .iter()
            .all(|criterion| self.evaluate(criterion, context))
    }

    pub fn evaluate(&self, criterion: &Criterion, context: &Context) -> bool {
        let literals = criterion
            .value_to_match
            .as_ref()
            .map(ConfigValue::literals)
            .unwrap_or_default();

        match criterion.operator {
            Operator::NotSet => false,
            Operator::AlwaysTrue => true,
            Operator::LookupKeyIn => context
                .lookup_key
                .as_deref()
                .is_some_and(|key| contains(&literals, key)),
            Operator::LookupKeyNotIn => !context
                .lookup_key
                .as_deref()
                .is_some_and(|key| contains(&literals, key)),
            Operator::InSeg => self.in_any_segment(&literals, context),
            Operator::NotInSeg => !self.in_any_segment(&literals, context),
            Operator::PropIsOneOf => property(context, criterion)
                .is_some_and(|value| contains(&literals, &value)),
            Operator::PropIsNotOneOf => !property(context, criterion)
                .is_some_and(|value| contains(&literals, &value)),
            Operator::PropEndsWithOneOf => property(context, criterion)
                .is_some_and(|value| ends_with_any(&literals, &value)),
            Operator::PropDoesNotEndWithOneOf => !property(context, criterion)
                .is_some_and(|value| ends_with_any(&literals, &value)),
            Operator::HierarchicalMatch => property(context, criterion)
                .is_some_and(|value| literals.iter().any(|l| is_path_ancestor(l, &value))),
        }
    }

    fn applies_to_env(&self, row: &ConditionalRow) -> bool {
        match row.project_env_id {
            None => true,
            Some(env) => self.project_env_id == Some(env),
        }
    }

    fn in_any_segment(&self, segment_keys: &[Cow<'_, str>], context: &Context) -> bool {
        segment_keys
            .iter()
            .any(|key| self.in_segment(key, context))
    }

    /// A context is in a segment when the segment's first matching row
    /// yields `true`.
    fn in_segment(&self, segment_key: &str, context: &Context) -> bool {
        if self.depth >= MAX_SEGMENT_DEPTH {
            return false;
        }
        let Some(segment) = self.configs.get(segment_key) else {
            return false;
        };
        let nested = CriteriaMatcher {
            configs: self.configs,
            project_env_id: self.project_env_id,
            depth: self.depth + 1,
        };
        nested
            .first_match(&segment.rows, context)
            .and_then(|row| row.value.as_bool())
            .unwrap_or(false)
    }
}

fn property(context: &Context, criterion: &Criterion) -> Option<String> {
    context
        .property(&criterion.property_name)
        .map(ToString::to_string)
}

fn contains(literals: &[Cow<'_, str>], value: &str) -> bool {
    literals.iter().any(|l| l == value)
}

fn ends_with_any(literals: &[Cow<'_, str>], value: &str) -> bool {
    literals.iter().any(|suffix| value.ends_with(suffix.as_ref()))
}

/// True when every segment of `ancestor` leads `path`, so `a.b` covers
/// `a.b` and `a.b.c` but not `a.bc`.
pub fn is_path_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return false;
    }
    let mut path_segments = path.split(PATH_DELIMITER);
    ancestor
        .split(PATH_DELIMITER)
        .all(|segment| path_segments.next() == Some(segment))
}
