use gufunc_types::{ScalarType, Typed};

use crate::errors::{GufuncError, Result};

/// Strip array wrapping from each operand, yielding its element-wise type.
///
/// Accepts declared types as well as raw values; raw values are typed first.
pub fn elementwise_types<T: Typed>(args: &[T]) -> Result<Vec<ScalarType>> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| {
            let ty = arg.host_type();
            ty.element_type()
                .ok_or(GufuncError::UnsupportedOperand { position, ty })
        })
        .collect()
}
