use std::fmt;

use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

/// Element type of an array or the type of a scalar operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

/// Coarse numeric kind, ordered from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScalarKind {
    Bool,
    Unsigned,
    Signed,
    Float,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        ScalarType::Bool,
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::Float32,
        ScalarType::Float64,
    ];

    pub fn kind(self) -> ScalarKind {
        match self {
            ScalarType::Bool => ScalarKind::Bool,
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 | ScalarType::UInt64 => {
                ScalarKind::Unsigned
            }
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64 => {
                ScalarKind::Signed
            }
            ScalarType::Float32 | ScalarType::Float64 => ScalarKind::Float,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ScalarType::Bool | ScalarType::Int8 | ScalarType::UInt8 => 8,
            ScalarType::Int16 | ScalarType::UInt16 => 16,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 32,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
        }
    }

    /// One-letter type code, as used in loop descriptions like `"dd->d"`.
    pub fn char_code(self) -> char {
        match self {
            ScalarType::Bool => '?',
            ScalarType::Int8 => 'b',
            ScalarType::Int16 => 'h',
            ScalarType::Int32 => 'i',
            ScalarType::Int64 => 'l',
            ScalarType::UInt8 => 'B',
            ScalarType::UInt16 => 'H',
            ScalarType::UInt32 => 'I',
            ScalarType::UInt64 => 'L',
            ScalarType::Float32 => 'f',
            ScalarType::Float64 => 'd',
        }
    }

    /// Whether every value of `self` is representable in `to`.
    pub fn can_cast_safe(self, to: ScalarType) -> bool {
        if self == to {
            return true;
        }
        match (self.kind(), to.kind()) {
            (ScalarKind::Bool, _) => true,
            (_, ScalarKind::Bool) => false,
            (ScalarKind::Unsigned, ScalarKind::Unsigned)
            | (ScalarKind::Signed, ScalarKind::Signed)
            | (ScalarKind::Float, ScalarKind::Float) => to.bits() >= self.bits(),
            (ScalarKind::Unsigned, ScalarKind::Signed) => to.bits() > self.bits(),
            (ScalarKind::Unsigned | ScalarKind::Signed, ScalarKind::Float) => {
                to == ScalarType::Float64 || self.bits() <= 16
            }
            _ => false,
        }
    }

    /// Safe casts plus any cast that does not move to a narrower kind.
    pub fn can_cast_same_kind(self, to: ScalarType) -> bool {
        self.can_cast_safe(to) || self.kind() <= to.kind()
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single tagged scalar value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

macro_rules! convert_numeric {
    ($value:expr, $to:expr) => {{
        let value = $value;
        match $to {
            ScalarType::Bool => Scalar::Bool(AsPrimitive::<f64>::as_(value) != 0.0),
            ScalarType::Int8 => Scalar::Int8(value.as_()),
            ScalarType::Int16 => Scalar::Int16(value.as_()),
            ScalarType::Int32 => Scalar::Int32(value.as_()),
            ScalarType::Int64 => Scalar::Int64(value.as_()),
            ScalarType::UInt8 => Scalar::UInt8(value.as_()),
            ScalarType::UInt16 => Scalar::UInt16(value.as_()),
            ScalarType::UInt32 => Scalar::UInt32(value.as_()),
            ScalarType::UInt64 => Scalar::UInt64(value.as_()),
            ScalarType::Float32 => Scalar::Float32(value.as_()),
            ScalarType::Float64 => Scalar::Float64(value.as_()),
        }
    }};
}

impl Scalar {
    pub fn zero(ty: ScalarType) -> Self {
        Scalar::UInt8(0).cast(ty)
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::Int8(_) => ScalarType::Int8,
            Scalar::Int16(_) => ScalarType::Int16,
            Scalar::Int32(_) => ScalarType::Int32,
            Scalar::Int64(_) => ScalarType::Int64,
            Scalar::UInt8(_) => ScalarType::UInt8,
            Scalar::UInt16(_) => ScalarType::UInt16,
            Scalar::UInt32(_) => ScalarType::UInt32,
            Scalar::UInt64(_) => ScalarType::UInt64,
            Scalar::Float32(_) => ScalarType::Float32,
            Scalar::Float64(_) => ScalarType::Float64,
        }
    }

    /// Convert with primitive `as` semantics (wrapping, truncating).
    pub fn cast(self, to: ScalarType) -> Scalar {
        match self {
            Scalar::Bool(b) => convert_numeric!(u8::from(b), to),
            Scalar::Int8(v) => convert_numeric!(v, to),
            Scalar::Int16(v) => convert_numeric!(v, to),
            Scalar::Int32(v) => convert_numeric!(v, to),
            Scalar::Int64(v) => convert_numeric!(v, to),
            Scalar::UInt8(v) => convert_numeric!(v, to),
            Scalar::UInt16(v) => convert_numeric!(v, to),
            Scalar::UInt32(v) => convert_numeric!(v, to),
            Scalar::UInt64(v) => convert_numeric!(v, to),
            Scalar::Float32(v) => convert_numeric!(v, to),
            Scalar::Float64(v) => convert_numeric!(v, to),
        }
    }

    pub fn to_f64(self) -> f64 {
        match self.cast(ScalarType::Float64) {
            Scalar::Float64(v) => v,
            _ => unreachable!("cast to float64 always yields Float64"),
        }
    }

    pub fn to_i64(self) -> i64 {
        match self.cast(ScalarType::Int64) {
            Scalar::Int64(v) => v,
            _ => unreachable!("cast to int64 always yields Int64"),
        }
    }

    /// Build a scalar of type `ty` from an `f64`.
    pub fn from_f64(ty: ScalarType, value: f64) -> Self {
        Scalar::Float64(value).cast(ty)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int8(v) => write!(f, "{v}"),
            Scalar::Int16(v) => write!(f, "{v}"),
            Scalar::Int32(v) => write!(f, "{v}"),
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::UInt8(v) => write!(f, "{v}"),
            Scalar::UInt16(v) => write!(f, "{v}"),
            Scalar::UInt32(v) => write!(f, "{v}"),
            Scalar::UInt64(v) => write!(f, "{v}"),
            Scalar::Float32(v) => write!(f, "{v}"),
            Scalar::Float64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! scalar_from {
    ($($prim:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$prim> for Scalar {
                fn from(value: $prim) -> Self {
                    Scalar::$variant(value)
                }
            }
        )*
    };
}

scalar_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_casting_follows_numeric_lattice() {
        assert!(ScalarType::Int32.can_cast_safe(ScalarType::Float64));
        assert!(ScalarType::Int64.can_cast_safe(ScalarType::Float64));
        assert!(!ScalarType::Int32.can_cast_safe(ScalarType::Float32));
        assert!(ScalarType::Int16.can_cast_safe(ScalarType::Float32));
        assert!(ScalarType::UInt8.can_cast_safe(ScalarType::Int16));
        assert!(!ScalarType::UInt8.can_cast_safe(ScalarType::Int8));
        assert!(!ScalarType::Int8.can_cast_safe(ScalarType::UInt64));
        assert!(!ScalarType::Float64.can_cast_safe(ScalarType::Float32));
        assert!(ScalarType::Bool.can_cast_safe(ScalarType::UInt8));
        assert!(!ScalarType::UInt8.can_cast_safe(ScalarType::Bool));
    }

    #[test]
    fn same_kind_allows_narrowing_within_kind() {
        assert!(ScalarType::Float64.can_cast_same_kind(ScalarType::Float32));
        assert!(ScalarType::UInt64.can_cast_same_kind(ScalarType::Int8));
        assert!(!ScalarType::Int64.can_cast_same_kind(ScalarType::UInt8));
        assert!(!ScalarType::Float32.can_cast_same_kind(ScalarType::Int64));
    }

    #[test]
    fn cast_uses_primitive_conversion() {
        assert_eq!(Scalar::Float64(2.75).cast(ScalarType::Int32), Scalar::Int32(2));
        assert_eq!(Scalar::Int32(-1).cast(ScalarType::UInt8), Scalar::UInt8(255));
        assert_eq!(Scalar::Bool(true).cast(ScalarType::Float32), Scalar::Float32(1.0));
        assert_eq!(Scalar::Int64(0).cast(ScalarType::Bool), Scalar::Bool(false));
        assert_eq!(Scalar::zero(ScalarType::Float64), Scalar::Float64(0.0));
    }

    #[test]
    fn char_codes_are_distinct() {
        let mut codes: Vec<char> = ScalarType::ALL.iter().map(|ty| ty.char_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ScalarType::ALL.len());
    }
}
