//! Typed parameter tree built from an AMI parameter string.
//!
//! A node is either a branch (named group of nodes) or a leaf holding one
//! resolved [`AmiValue`]. Leaves may be written as plain `(name value)`
//! pairs, the form hosts pass to `AMI_Init`, or in declaration form as
//! found in `.ami` files:
//!
//! ```text
//! (tx_tap_nm1 (Usage In) (Type Integer) (Range 0 0 10) (Default 0))
//! ```
//!
//! For declarations, `Value` wins over `Default`, which wins over the
//! typical value of a `Range`, which wins over the head of a `List`.

use crate::error::{ParamResult, ParseError};
use crate::sexpr::{self, SExpr};
use lib_types::ami::{AmiValue, Usage, ValueType};
use tracing::debug;

/// Keywords that mark a list node as a leaf declaration.
const DECLARATION_KEYWORDS: &[&str] = &[
    "usage",
    "type",
    "value",
    "default",
    "range",
    "list",
    "format",
    "description",
    "list_tip",
    "labels",
];

/// One resolved leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamLeaf {
    pub name: String,
    pub value: AmiValue,
    pub usage: Option<Usage>,
    pub kind: Option<ValueType>,
}

/// Node of the parameter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamNode {
    Leaf(ParamLeaf),
    Branch { name: String, children: Vec<ParamNode> },
}

impl ParamNode {
    pub fn name(&self) -> &str {
        match self {
            ParamNode::Leaf(leaf) => &leaf.name,
            ParamNode::Branch { name, .. } => name,
        }
    }

    fn matches(&self, segment: &str) -> bool {
        self.name().eq_ignore_ascii_case(segment)
    }
}

/// A complete parameter tree with its root name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterTree {
    root: String,
    children: Vec<ParamNode>,
}

impl ParameterTree {
    /// Create an empty tree.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            children: Vec::new(),
        }
    }

    /// Read a tree from AMI parameter text. Blank text yields an empty tree.
    pub fn parse(text: &str) -> ParamResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let expr = sexpr::parse(text)?;
        let items = expr
            .as_list()
            .ok_or_else(|| ParseError::invalid_node("<root>", "root must be a list"))?;

        let root = match items.first() {
            Some(SExpr::Atom(name)) | Some(SExpr::Str(name)) => name.clone(),
            Some(_) => return Err(ParseError::invalid_node("<root>", "root must be named")),
            None => return Ok(Self::default()),
        };

        let children = items[1..]
            .iter()
            .map(|item| build_node(item, &root))
            .collect::<ParamResult<Vec<_>>>()?;

        debug!(root = %root, nodes = children.len(), "Parsed parameter tree");
        Ok(Self { root, children })
    }

    /// Name of the root node (usually the model name).
    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Top-level nodes.
    pub fn children(&self) -> &[ParamNode] {
        &self.children
    }

    /// Resolve a dotted path (`dfe.tap_max`) to a leaf.
    pub fn leaf(&self, path: &str) -> Option<&ParamLeaf> {
        let mut nodes = self.children.as_slice();
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let node = nodes.iter().find(|n| n.matches(segment))?;
            match node {
                ParamNode::Leaf(leaf) if segments.peek().is_none() => return Some(leaf),
                ParamNode::Leaf(_) => return None,
                ParamNode::Branch { children, .. } => nodes = children,
            }
        }
        None
    }

    /// Whether a branch exists at the given dotted path.
    pub fn has_branch(&self, path: &str) -> bool {
        let mut nodes = self.children.as_slice();
        for segment in path.split('.') {
            match nodes.iter().find(|n| n.matches(segment)) {
                Some(ParamNode::Branch { children, .. }) => nodes = children,
                _ => return false,
            }
        }
        true
    }

    /// Insert or replace a leaf, creating intermediate branches.
    pub fn set(&mut self, path: &str, value: AmiValue) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut nodes = &mut self.children;
        for segment in parents {
            let pos = match nodes.iter().position(|n| n.matches(segment)) {
                Some(pos) if matches!(nodes[pos], ParamNode::Branch { .. }) => pos,
                Some(pos) => {
                    nodes[pos] = ParamNode::Branch {
                        name: segment.to_string(),
                        children: Vec::new(),
                    };
                    pos
                }
                None => {
                    nodes.push(ParamNode::Branch {
                        name: segment.to_string(),
                        children: Vec::new(),
                    });
                    nodes.len() - 1
                }
            };
            nodes = match &mut nodes[pos] {
                ParamNode::Branch { children, .. } => children,
                ParamNode::Leaf(_) => return,
            };
        }

        let leaf = ParamNode::Leaf(ParamLeaf {
            name: last.to_string(),
            value,
            usage: None,
            kind: None,
        });
        match nodes.iter().position(|n| n.matches(last)) {
            Some(pos) => nodes[pos] = leaf,
            None => nodes.push(leaf),
        }
    }

    /// Every leaf with its dotted path, in document order.
    pub fn leaves(&self) -> Vec<(String, &ParamLeaf)> {
        let mut out = Vec::new();
        collect_leaves(&self.children, "", &mut out);
        out
    }

    /// Serialize in AMI parameter-string form: `(root (name value) ...)`.
    pub fn to_ami_string(&self) -> String {
        let mut out = String::new();
        out.push('(');
        out.push_str(&self.root);
        for child in &self.children {
            out.push(' ');
            write_node(child, &mut out);
        }
        out.push(')');
        out
    }
}

fn collect_leaves<'a>(nodes: &'a [ParamNode], prefix: &str, out: &mut Vec<(String, &'a ParamLeaf)>) {
    for node in nodes {
        let path = if prefix.is_empty() {
            node.name().to_string()
        } else {
            format!("{prefix}.{}", node.name())
        };
        match node {
            ParamNode::Leaf(leaf) => out.push((path, leaf)),
            ParamNode::Branch { children, .. } => collect_leaves(children, &path, out),
        }
    }
}

fn write_node(node: &ParamNode, out: &mut String) {
    match node {
        ParamNode::Leaf(leaf) => {
            out.push('(');
            out.push_str(&leaf.name);
            out.push(' ');
            out.push_str(&leaf.value.to_string());
            out.push(')');
        }
        ParamNode::Branch { name, children } => {
            out.push('(');
            out.push_str(name);
            for child in children {
                out.push(' ');
                write_node(child, out);
            }
            out.push(')');
        }
    }
}

/// Convert one `(name ...)` expression into a node.
fn build_node(expr: &SExpr, parent: &str) -> ParamResult<ParamNode> {
    let items = expr
        .as_list()
        .ok_or_else(|| ParseError::invalid_node(parent, "expected a (name ...) list"))?;
    let name = expr
        .head()
        .ok_or_else(|| ParseError::invalid_node(parent, "node has no name"))?
        .to_string();
    let rest = &items[1..];

    if rest.is_empty() {
        return Ok(ParamNode::Branch {
            name,
            children: Vec::new(),
        });
    }

    let lists = rest.iter().filter(|e| e.as_list().is_some()).count();

    if lists == 0 {
        let value = scalar_or_list(rest, None);
        return Ok(ParamNode::Leaf(ParamLeaf {
            name,
            value,
            usage: None,
            kind: None,
        }));
    }

    if lists != rest.len() {
        return Err(ParseError::invalid_node(name, "mixes values and sub-nodes"));
    }

    let is_declaration = rest.iter().any(|e| {
        e.head()
            .map_or(false, |h| DECLARATION_KEYWORDS.contains(&h.to_ascii_lowercase().as_str()))
    });

    if is_declaration {
        return build_declaration(name, rest).map(ParamNode::Leaf);
    }

    let children = rest
        .iter()
        .map(|item| build_node(item, &name))
        .collect::<ParamResult<Vec<_>>>()?;
    Ok(ParamNode::Branch { name, children })
}

/// Resolve a declaration-form leaf.
fn build_declaration(name: String, fields: &[SExpr]) -> ParamResult<ParamLeaf> {
    let mut usage = None;
    let mut kind = None;
    let mut value: Option<AmiValue> = None;
    let mut default: Option<AmiValue> = None;
    let mut range: Option<(f64, f64, f64)> = None;
    let mut list: Option<AmiValue> = None;

    for field in fields {
        let Some(items) = field.as_list() else { continue };
        let Some(keyword) = field.head().map(|h| h.to_ascii_lowercase()) else {
            continue;
        };
        let mut args = &items[1..];

        // `(Format Range 0 -1 1)` is the same as `(Range 0 -1 1)`.
        let keyword = if keyword == "format" {
            let inner = args.first().and_then(|a| a.as_atom()).map(|a| a.to_ascii_lowercase());
            args = args.get(1..).unwrap_or(&[]);
            inner.unwrap_or_default()
        } else {
            keyword
        };

        match keyword.as_str() {
            "usage" => {
                usage = args.first().and_then(|a| a.as_atom()).and_then(Usage::parse);
            }
            "type" => {
                kind = args.first().and_then(|a| a.as_atom()).and_then(ValueType::parse);
            }
            "value" => value = Some(scalar_or_list(args, None)),
            "default" => default = Some(scalar_or_list(args, None)),
            "range" => {
                let nums: Vec<f64> = args.iter().filter_map(|a| a.as_number()).collect();
                if nums.len() != 3 {
                    return Err(ParseError::invalid_node(name, "Range needs typ, min and max"));
                }
                range = Some((nums[0], nums[1], nums[2]));
            }
            "list" => {
                if args.is_empty() {
                    return Err(ParseError::invalid_node(name, "List is empty"));
                }
                list = Some(AmiValue::List(args.iter().map(atom_value).collect()));
            }
            _ => {}
        }
    }

    let selected = value.or(default);
    let resolved = match (selected, range, list) {
        (Some(v), Some((_, min, max)), _) => match v.as_f64() {
            Some(typ) => AmiValue::Range { default: typ, min, max },
            None => v,
        },
        (Some(v), None, _) => v,
        (None, Some((typ, min, max)), _) => AmiValue::Range { default: typ, min, max },
        (None, None, Some(l)) => l,
        (None, None, None) => {
            return Err(ParseError::invalid_node(name, "declaration carries no value"));
        }
    };

    Ok(ParamLeaf {
        value: coerce(resolved, kind),
        name,
        usage,
        kind,
    })
}

/// One bare value becomes a scalar; several become a list.
fn scalar_or_list(items: &[SExpr], kind: Option<ValueType>) -> AmiValue {
    let value = match items {
        [single] => atom_value(single),
        many => AmiValue::List(many.iter().map(atom_value).collect()),
    };
    coerce(value, kind)
}

fn atom_value(expr: &SExpr) -> AmiValue {
    match expr {
        SExpr::Integer(i) => AmiValue::Integer(*i),
        SExpr::Number(f) => AmiValue::Float(*f),
        SExpr::Str(s) => AmiValue::String(s.clone()),
        SExpr::Atom(s) if s.eq_ignore_ascii_case("true") => AmiValue::Boolean(true),
        SExpr::Atom(s) if s.eq_ignore_ascii_case("false") => AmiValue::Boolean(false),
        SExpr::Atom(s) => AmiValue::String(s.clone()),
        SExpr::List(items) => AmiValue::List(items.iter().map(atom_value).collect()),
    }
}

/// Apply the declared type to a literal (an integer literal declared Float is a Float).
fn coerce(value: AmiValue, kind: Option<ValueType>) -> AmiValue {
    match (kind, value) {
        (Some(ValueType::Float), AmiValue::Integer(i)) => AmiValue::Float(i as f64),
        (Some(ValueType::Integer), AmiValue::Float(f)) if f.fract() == 0.0 => {
            AmiValue::Integer(f as i64)
        }
        (Some(kind), AmiValue::List(items)) => {
            AmiValue::List(items.into_iter().map(|v| coerce(v, Some(kind))).collect())
        }
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
(example_rx
    (ctle
        (mode (Usage In) (Type String) (List "On" "Off") (Default "On"))
        (peak_freq (Usage In) (Type Float) (Range 5.0e9 1.0e9 2.0e10))
        (boost_db (Usage In) (Type Float) (Value 6))
    )
    (dfe (mode Adaptive) (ntaps 3) (taps 0.1 0.05 0.0))
    (tx_tap_units 27)
)
"#;

    #[test]
    fn test_parse_declarations_and_pairs() {
        let tree = ParameterTree::parse(SAMPLE).unwrap();
        assert_eq!(tree.root_name(), "example_rx");

        let mode = tree.leaf("ctle.mode").unwrap();
        assert_eq!(mode.value, AmiValue::String("On".to_string()));
        assert_eq!(mode.usage, Some(Usage::In));

        let peak = tree.leaf("ctle.peak_freq").unwrap();
        assert_eq!(peak.value.bounds(), Some((1.0e9, 2.0e10)));
        assert_eq!(peak.value.as_f64(), Some(5.0e9));

        assert_eq!(tree.leaf("ctle.boost_db").unwrap().value, AmiValue::Float(6.0));
        assert_eq!(
            tree.leaf("dfe.taps").unwrap().value.as_f64_list(),
            Some(vec![0.1, 0.05, 0.0])
        );
        assert_eq!(tree.leaf("TX_TAP_UNITS").unwrap().value, AmiValue::Integer(27));
        assert!(tree.leaf("dfe").is_none());
        assert!(tree.has_branch("dfe"));
        assert!(tree.leaf("dfe.missing").is_none());
    }

    #[test]
    fn test_blank_text_is_empty_tree() {
        let tree = ParameterTree::parse("   ").unwrap();
        assert_eq!(tree.root_name(), "");
        assert!(tree.children().is_empty());
    }

    #[test]
    fn test_set_and_serialize() {
        let mut tree = ParameterTree::new("example_tx");
        tree.set("tx_taps", AmiValue::List(vec![AmiValue::Float(-0.1), AmiValue::Float(0.9)]));
        tree.set("dfe.locked", AmiValue::Boolean(true));
        tree.set("dfe.locked", AmiValue::Boolean(false));

        let text = tree.to_ami_string();
        assert_eq!(text, "(example_tx (tx_taps -0.1 0.9) (dfe (locked False)))");

        let reread = ParameterTree::parse(&text).unwrap();
        assert_eq!(reread.leaf("dfe.locked").unwrap().value, AmiValue::Boolean(false));
    }

    #[test]
    fn test_declaration_without_value_fails() {
        let err = ParameterTree::parse("(m (x (Usage In) (Type Float)))").unwrap_err();
        assert!(matches!(err, ParseError::InvalidNode { .. }));
    }

    #[test]
    fn test_mixed_node_fails() {
        assert!(ParameterTree::parse("(m (x 1 (y 2)))").is_err());
    }
}
