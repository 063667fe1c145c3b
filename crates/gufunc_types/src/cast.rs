use thiserror::Error;

use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot cast value from {from} to {to}")]
pub struct CastError {
    pub from: Type,
    pub to: Type,
}

/// Convert `value`, declared as `from`, into the representation of `to`.
///
/// Arrays whose dtype already matches are passed through as aliases, so
/// writes by the callee stay visible to the caller. A dtype change yields a
/// converted copy.
pub fn cast_value(value: &Value, from: &Type, to: &Type) -> Result<Value, CastError> {
    let error = || CastError {
        from: *from,
        to: *to,
    };
    match (value, to) {
        (_, Type::Any | Type::Object) => Ok(value.clone()),
        (Value::Scalar(scalar), Type::Scalar { dtype }) => Ok(Value::Scalar(scalar.cast(*dtype))),
        (Value::Array(array), Type::Array(target)) => {
            if array.ndim() != target.ndim {
                return Err(error());
            }
            if array.dtype() == target.dtype {
                Ok(Value::Array(array.clone()))
            } else {
                Ok(Value::Array(array.astype(target.dtype)))
            }
        }
        (Value::Array(array), Type::Scalar { dtype }) if array.size() == 1 && array.ndim() == 0 => {
            array
                .get(&[])
                .map(|scalar| Value::Scalar(scalar.cast(*dtype)))
                .ok_or_else(error)
        }
        _ => Err(error()),
    }
}
