//! # lib-params
//!
//! AMI parameter strings for the equalization model.
//!
//! - [`sexpr`] turns the text into an S-expression tree
//! - [`tree`] gives the nodes meaning (leaves, branches, declarations)
//! - [`view`] offers typed, defaulted lookup by dotted path
//!
//! The same tree type is used to build the output parameter string, so
//! anything the model reports can be read back by this crate.

pub mod error;
pub mod sexpr;
pub mod tree;
pub mod view;

pub use error::{ParamResult, ParseError};
pub use tree::{ParamLeaf, ParamNode, ParameterTree};
pub use view::ParameterView;
