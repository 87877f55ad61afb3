//! Typed lookup over a [`ParameterTree`].
//!
//! Absent parameters fall back to the caller's default; present parameters
//! of the wrong type are an error rather than silently defaulted.

use crate::error::{ParamResult, ParseError};
use crate::tree::{ParamLeaf, ParameterTree};
use lib_types::ami::AmiValue;

/// Read-only accessor used by model configuration.
#[derive(Clone, Debug, Default)]
pub struct ParameterView {
    tree: ParameterTree,
}

impl ParameterView {
    pub fn new(tree: ParameterTree) -> Self {
        Self { tree }
    }

    /// Parse parameter text and wrap the resulting tree.
    pub fn parse(text: &str) -> ParamResult<Self> {
        ParameterTree::parse(text).map(Self::new)
    }

    pub fn tree(&self) -> &ParameterTree {
        &self.tree
    }

    pub fn root_name(&self) -> &str {
        self.tree.root_name()
    }

    /// Raw value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&AmiValue> {
        self.tree.leaf(path).map(|leaf| &leaf.value)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tree.leaf(path).is_some()
    }

    pub fn f64_or(&self, path: &str, default: f64) -> ParamResult<f64> {
        self.optional(path, "a number", AmiValue::as_f64)
            .map(|v| v.unwrap_or(default))
    }

    pub fn i64_or(&self, path: &str, default: i64) -> ParamResult<i64> {
        self.optional(path, "an integer", AmiValue::as_i64)
            .map(|v| v.unwrap_or(default))
    }

    pub fn bool_or(&self, path: &str, default: bool) -> ParamResult<bool> {
        self.optional(path, "a boolean", AmiValue::as_bool)
            .map(|v| v.unwrap_or(default))
    }

    pub fn str_or(&self, path: &str, default: &str) -> ParamResult<String> {
        self.optional(path, "a string", |v| v.as_str().map(str::to_string))
            .map(|v| v.unwrap_or_else(|| default.to_string()))
    }

    /// Numeric list; a scalar is read as a one-element list.
    pub fn f64_list(&self, path: &str) -> ParamResult<Option<Vec<f64>>> {
        self.optional(path, "a list of numbers", AmiValue::as_f64_list)
    }

    /// Number that must be present.
    pub fn require_f64(&self, path: &str) -> ParamResult<f64> {
        self.f64_opt(path)?
            .ok_or_else(|| ParseError::Missing(path.to_string()))
    }

    pub fn f64_opt(&self, path: &str) -> ParamResult<Option<f64>> {
        self.optional(path, "a number", AmiValue::as_f64)
    }

    /// Declared `Range` bounds of a leaf, if it has them.
    pub fn bounds(&self, path: &str) -> Option<(f64, f64)> {
        self.get(path).and_then(AmiValue::bounds)
    }

    /// Every leaf with its dotted path.
    pub fn leaves(&self) -> Vec<(String, &ParamLeaf)> {
        self.tree.leaves()
    }

    fn optional<T>(
        &self,
        path: &str,
        expected: &'static str,
        extract: impl Fn(&AmiValue) -> Option<T>,
    ) -> ParamResult<Option<T>> {
        match self.get(path) {
            None => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| ParseError::WrongType {
                path: path.to_string(),
                expected,
                actual: value.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_lookup() {
        let view = ParameterView::parse(
            "(rx (dfe (mode \"Adaptive\") (ntaps 4) (step_size 0.005)) (cdr (phase 0.5)))",
        )
        .unwrap();

        assert_eq!(view.root_name(), "rx");
        assert_eq!(view.str_or("dfe.mode", "Off").unwrap(), "Adaptive");
        assert_eq!(view.i64_or("dfe.ntaps", 0).unwrap(), 4);
        assert!((view.f64_or("dfe.step_size", 0.01).unwrap() - 0.005).abs() < 1e-15);
        assert!((view.f64_or("dfe.vout", 1.0).unwrap() - 1.0).abs() < 1e-15);
        assert!(view.contains("cdr.phase"));
        assert!(!view.contains("cdr.lock_after"));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let view = ParameterView::parse("(rx (dfe (ntaps \"many\")))").unwrap();
        let err = view.i64_or("dfe.ntaps", 0).unwrap_err();
        assert!(matches!(err, ParseError::WrongType { .. }));
    }

    #[test]
    fn test_missing_required() {
        let view = ParameterView::parse("(rx)").unwrap();
        assert_eq!(
            view.require_f64("ctle.peak_freq").unwrap_err(),
            ParseError::Missing("ctle.peak_freq".to_string())
        );
        assert_eq!(view.f64_list("dfe.taps").unwrap(), None);
    }

    #[test]
    fn test_scalar_reads_as_list() {
        let view = ParameterView::parse("(rx (dfe (tap_max 0.3)))").unwrap();
        assert_eq!(view.f64_list("dfe.tap_max").unwrap(), Some(vec![0.3]));
    }
}
