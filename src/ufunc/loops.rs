use gufunc_types::{ScalarType, Type};

use crate::errors::{GufuncError, Result};
use crate::runtime::jit::specialization::elementwise_types;

/// Input and output element types of one inner loop.
pub trait LoopSpec {
    fn inputs(&self) -> &[ScalarType];
    fn outputs(&self) -> &[ScalarType];

    /// Inputs followed by outputs.
    fn operand_types(&self) -> Vec<ScalarType> {
        let mut types = self.inputs().to_vec();
        types.extend_from_slice(self.outputs());
        types
    }
}

fn exact_match<L: LoopSpec>(candidate: &L, inputs: &[ScalarType], outputs: &[ScalarType]) -> bool {
    candidate.inputs() == inputs
        && (outputs.is_empty() || candidate.outputs().get(..outputs.len()) == Some(outputs))
}

fn compatible_match<L: LoopSpec>(
    candidate: &L,
    inputs: &[ScalarType],
    outputs: &[ScalarType],
) -> bool {
    candidate.inputs().len() == inputs.len()
        && inputs
            .iter()
            .zip(candidate.inputs())
            .all(|(given, accepted)| given.can_cast_safe(*accepted))
        && outputs.len() <= candidate.outputs().len()
        && outputs
            .iter()
            .zip(candidate.outputs())
            .all(|(given, produced)| produced.can_cast_same_kind(*given))
}

/// Select the loop used for `ewise` (inputs, then any explicit outputs).
///
/// An exact match wins; otherwise the first loop in registration order
/// whose inputs accept the given inputs under safe casting and whose
/// outputs can be stored into the given outputs under same-kind casting.
pub fn find_matching_loop<'a, L: LoopSpec>(
    loops: &'a [L],
    nin: usize,
    ewise: &[ScalarType],
) -> Option<&'a L> {
    if ewise.len() < nin {
        return None;
    }
    let (inputs, outputs) = ewise.split_at(nin);
    loops
        .iter()
        .find(|candidate| exact_match(*candidate, inputs, outputs))
        .or_else(|| {
            loops
                .iter()
                .find(|candidate| compatible_match(*candidate, inputs, outputs))
        })
}

/// Element-wise types for a call with argument types `argtys`: the inputs'
/// element types followed by those of any explicit outputs.
pub fn resolve_elementwise_types(nin: usize, argtys: &[Type]) -> Result<Vec<ScalarType>> {
    if argtys.len() != nin && argtys.len() != nin + 1 {
        return Err(GufuncError::Typing(format!(
            "expected {nin} inputs and an optional output, got {} arguments",
            argtys.len()
        )));
    }
    elementwise_types(argtys)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sig(Vec<ScalarType>, Vec<ScalarType>);

    impl LoopSpec for Sig {
        fn inputs(&self) -> &[ScalarType] {
            &self.0
        }
        fn outputs(&self) -> &[ScalarType] {
            &self.1
        }
    }

    use ScalarType::{Float32, Float64, Int32, Int64};

    fn loops() -> Vec<Sig> {
        vec![
            Sig(vec![Float32, Float32], vec![Float32]),
            Sig(vec![Float64, Float64], vec![Float64]),
        ]
    }

    #[test]
    fn exact_match_preferred() {
        let loops = loops();
        let found = find_matching_loop(&loops, 2, &[Float64, Float64, Float64]).unwrap();
        assert_eq!(found.inputs(), &[Float64, Float64]);
    }

    #[test]
    fn integers_widen_to_double_loop() {
        let loops = loops();
        let found = find_matching_loop(&loops, 2, &[Int32, Int32]).unwrap();
        assert_eq!(found.operand_types(), vec![Float64, Float64, Float64]);
    }

    #[test]
    fn unsafe_input_cast_is_rejected() {
        let loops = vec![Sig(vec![Float32, Float32], vec![Float32])];
        assert!(find_matching_loop(&loops, 2, &[Int64, Float32]).is_none());
    }

    #[test]
    fn typing_rejects_wrong_argument_count() {
        let argtys = [Type::scalar(Float64)];
        assert!(resolve_elementwise_types(2, &argtys).is_err());
        let argtys = [Type::array(Float64, 1), Type::scalar(Int32)];
        assert_eq!(resolve_elementwise_types(2, &argtys).unwrap(), vec![Float64, Int32]);
    }

    #[test]
    fn output_must_accept_loop_result() {
        let loops = vec![Sig(vec![Float64], vec![Float64])];
        assert!(find_matching_loop(&loops, 1, &[Float32, Float32]).is_some());
        assert!(find_matching_loop(&loops, 1, &[Float32, Int32]).is_none());
    }
}
