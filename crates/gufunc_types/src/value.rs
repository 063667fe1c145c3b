use crate::array::Array;
use crate::scalar::Scalar;

/// A runtime operand: a scalar or an array handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Array(Array),
}

impl Value {
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(scalar) => Some(*scalar),
            Value::Array(_) => None,
        }
    }

    /// Shape of the value; scalars are zero-dimensional.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Scalar(_) => Vec::new(),
            Value::Array(array) => array.shape(),
        }
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

/// Generic boxed host value used by the object calling convention.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Object {
    #[default]
    None,
    Value(Value),
}

impl Object {
    /// Box a value for the object calling convention.
    pub fn boxed(value: &Value) -> Object {
        Object::Value(value.clone())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Object::None)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Object::Value(value) => Some(value),
            Object::None => None,
        }
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Object::Value(value)
    }
}
