use std::fmt;

use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::scalar::{Scalar, ScalarType};
use crate::value::{Object, Value};

/// Memory layout of an array type. `A` accepts any layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    C,
    F,
    A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayType {
    pub dtype: ScalarType,
    pub ndim: usize,
    pub layout: Layout,
}

impl ArrayType {
    pub fn new(dtype: ScalarType, ndim: usize, layout: Layout) -> Self {
        Self { dtype, ndim, layout }
    }

    /// Any-layout array, the form compiled kernels are specialized on.
    pub fn any_layout(dtype: ScalarType, ndim: usize) -> Self {
        Self::new(dtype, ndim, Layout::A)
    }
}

/// Static description of an operand or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Type {
    None,
    Any,
    Object,
    Scalar { dtype: ScalarType },
    Array(ArrayType),
}

impl Type {
    pub fn scalar(dtype: ScalarType) -> Self {
        Type::Scalar { dtype }
    }

    pub fn array(dtype: ScalarType, ndim: usize) -> Self {
        Type::Array(ArrayType::any_layout(dtype, ndim))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Strip array wrapping. Scalars map to themselves.
    pub fn element_type(&self) -> Option<ScalarType> {
        match self {
            Type::Array(array) => Some(array.dtype),
            Type::Scalar { dtype } => Some(*dtype),
            Type::None | Type::Any | Type::Object => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::None => f.write_str("none"),
            Type::Any => f.write_str("any"),
            Type::Object => f.write_str("pyobject"),
            Type::Scalar { dtype } => write!(f, "{dtype}"),
            Type::Array(array) => write!(
                f,
                "array({}, {}d, {:?})",
                array.dtype, array.ndim, array.layout
            ),
        }
    }
}

impl From<ScalarType> for Type {
    fn from(dtype: ScalarType) -> Self {
        Type::scalar(dtype)
    }
}

impl From<ArrayType> for Type {
    fn from(array: ArrayType) -> Self {
        Type::Array(array)
    }
}

/// Anything whose host type can be determined: declared types and raw values.
pub trait Typed {
    fn host_type(&self) -> Type;
}

impl Typed for Type {
    fn host_type(&self) -> Type {
        *self
    }
}

impl Typed for Scalar {
    fn host_type(&self) -> Type {
        Type::scalar(self.scalar_type())
    }
}

impl Typed for Array {
    fn host_type(&self) -> Type {
        Type::Array(ArrayType::new(self.dtype(), self.ndim(), Layout::C))
    }
}

impl Typed for Value {
    fn host_type(&self) -> Type {
        match self {
            Value::Scalar(scalar) => scalar.host_type(),
            Value::Array(array) => array.host_type(),
        }
    }
}

impl Typed for Object {
    fn host_type(&self) -> Type {
        Type::Object
    }
}

impl<T: Typed + ?Sized> Typed for &T {
    fn host_type(&self) -> Type {
        (**self).host_type()
    }
}

/// Infer the host type of a raw value.
pub fn type_of(value: &impl Typed) -> Type {
    value.host_type()
}

/// Element type of an array type, or the type itself for scalars.
pub fn element_type(ty: &Type) -> Option<ScalarType> {
    ty.element_type()
}
