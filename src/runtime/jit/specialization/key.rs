use ahash::AHasher;
use std::hash::{Hash, Hasher};

use gufunc_types::ScalarType;

/// Hashable element-wise type tuple, the registry's cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementwiseKey(Vec<ScalarType>);

impl ElementwiseKey {
    pub fn new(types: Vec<ScalarType>) -> Self {
        Self(types)
    }

    pub fn types(&self) -> &[ScalarType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leading `len` types, for queries that omit the output operand.
    pub fn prefix(&self, len: usize) -> ElementwiseKey {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    pub fn fingerprint(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.0.hash(&mut hasher);
        hasher.finish()
    }

    /// Loop description in type codes, e.g. `"dd->d"`.
    pub fn loop_code(&self, nin: usize) -> String {
        let split = nin.min(self.0.len());
        let code = |types: &[ScalarType]| types.iter().map(|ty| ty.char_code()).collect::<String>();
        format!("{}->{}", code(&self.0[..split]), code(&self.0[split..]))
    }
}

impl From<&[ScalarType]> for ElementwiseKey {
    fn from(types: &[ScalarType]) -> Self {
        Self(types.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_code_splits_inputs_and_outputs() {
        let key = ElementwiseKey::new(vec![
            ScalarType::Float64,
            ScalarType::Int32,
            ScalarType::Float64,
        ]);
        assert_eq!(key.loop_code(2), "di->d");
        assert_eq!(key.prefix(2).types(), &[ScalarType::Float64, ScalarType::Int32]);
    }

    #[test]
    fn fingerprint_is_stable_within_process() {
        let a = ElementwiseKey::new(vec![ScalarType::Float32]);
        let b = ElementwiseKey::new(vec![ScalarType::Float32]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
