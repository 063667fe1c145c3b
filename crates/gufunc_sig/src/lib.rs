//! Parsing of gufunc dimension signatures such as `(n,m),(m)->(n)`.
//!
//! A signature lists one parenthesised group of core dimension names per
//! input operand, an arrow, and exactly one output group. An empty group
//! marks a scalar operand.

mod errors;
mod grammar;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use errors::SignatureParseError;
pub use grammar::parse_signature;

/// Ordered core dimension names of one operand. Empty means scalar.
pub type CoreDims = Vec<String>;

/// Parsed dimension signature. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionSignature {
    inputs: Vec<CoreDims>,
    output: CoreDims,
}

impl DimensionSignature {
    pub fn new(inputs: Vec<CoreDims>, output: CoreDims) -> Self {
        Self { inputs, output }
    }

    pub fn inputs(&self) -> &[CoreDims] {
        &self.inputs
    }

    pub fn output(&self) -> &CoreDims {
        &self.output
    }

    /// Number of input operands.
    pub fn nin(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output operands, which is always one.
    pub fn nout(&self) -> usize {
        1
    }

    pub fn input_ranks(&self) -> Vec<usize> {
        self.inputs.iter().map(Vec::len).collect()
    }

    pub fn output_rank(&self) -> usize {
        self.output.len()
    }

    /// Core rank of every operand, inputs first.
    pub fn expected_ndims(&self) -> Vec<usize> {
        let mut ndims = self.input_ranks();
        ndims.push(self.output_rank());
        ndims
    }

    /// Core dimensions of operand `index`, counting the output last.
    pub fn operand(&self, index: usize) -> Option<&CoreDims> {
        if index < self.inputs.len() {
            self.inputs.get(index)
        } else if index == self.inputs.len() {
            Some(&self.output)
        } else {
            None
        }
    }

    /// Output dimension names that no input binds.
    pub fn unbound_output_dims(&self) -> Vec<&str> {
        self.output
            .iter()
            .filter(|name| !self.inputs.iter().any(|dims| dims.contains(name)))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for DimensionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = |dims: &CoreDims| format!("({})", dims.join(","));
        let inputs = self.inputs.iter().map(group).collect::<Vec<_>>().join(",");
        write!(f, "{}->{}", inputs, group(&self.output))
    }
}

impl std::str::FromStr for DimensionSignature {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_signature(s)
    }
}
