use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::scalar::{Scalar, ScalarType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("shape {shape:?} holds {expected} elements but {found} were supplied")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("index {index:?} is out of bounds for shape {shape:?}")]
    OutOfBounds { index: Vec<usize>, shape: Vec<usize> },
    #[error("sub-array of shape {found:?} does not fit core shape {expected:?}")]
    CoreShape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

#[derive(Debug)]
struct ArrayData {
    dtype: ScalarType,
    shape: Vec<usize>,
    data: Vec<Scalar>,
}

/// Row-major n-d array handle.
///
/// Cloning an `Array` aliases the buffer; use [`Array::deep_copy`] for an
/// independent copy. Every stored element has the array's dtype.
#[derive(Clone)]
pub struct Array {
    inner: Arc<RwLock<ArrayData>>,
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn flat_offset(shape: &[usize], index: &[usize]) -> Option<usize> {
    if index.len() != shape.len() {
        return None;
    }
    let mut offset = 0;
    for (&dim, &i) in shape.iter().zip(index) {
        if i >= dim {
            return None;
        }
        offset = offset * dim + i;
    }
    Some(offset)
}

impl Array {
    pub fn zeros(dtype: ScalarType, shape: &[usize]) -> Self {
        let data = vec![Scalar::zero(dtype); element_count(shape)];
        Self::wrap(dtype, shape.to_vec(), data)
    }

    /// Build an array from scalars, casting each to `dtype`.
    pub fn from_scalars(
        dtype: ScalarType,
        shape: &[usize],
        values: Vec<Scalar>,
    ) -> Result<Self, ShapeError> {
        let expected = element_count(shape);
        if values.len() != expected {
            return Err(ShapeError::ElementCount {
                shape: shape.to_vec(),
                expected,
                found: values.len(),
            });
        }
        let data = values.into_iter().map(|value| value.cast(dtype)).collect();
        Ok(Self::wrap(dtype, shape.to_vec(), data))
    }

    pub fn from_f64(dtype: ScalarType, shape: &[usize], values: &[f64]) -> Result<Self, ShapeError> {
        let scalars = values.iter().map(|&v| Scalar::Float64(v)).collect();
        Self::from_scalars(dtype, shape, scalars)
    }

    pub fn from_i64(dtype: ScalarType, shape: &[usize], values: &[i64]) -> Result<Self, ShapeError> {
        let scalars = values.iter().map(|&v| Scalar::Int64(v)).collect();
        Self::from_scalars(dtype, shape, scalars)
    }

    fn wrap(dtype: ScalarType, shape: Vec<usize>, data: Vec<Scalar>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ArrayData { dtype, shape, data })),
        }
    }

    pub fn dtype(&self) -> ScalarType {
        self.inner.read().dtype
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.read().shape.clone()
    }

    pub fn ndim(&self) -> usize {
        self.inner.read().shape.len()
    }

    pub fn size(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Whether both handles alias the same buffer.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn get(&self, index: &[usize]) -> Option<Scalar> {
        let data = self.inner.read();
        flat_offset(&data.shape, index).map(|offset| data.data[offset])
    }

    /// Store `value` at `index`, casting it to the array's dtype.
    pub fn set(&self, index: &[usize], value: Scalar) -> Result<(), ShapeError> {
        let mut data = self.inner.write();
        let offset = flat_offset(&data.shape, index).ok_or_else(|| ShapeError::OutOfBounds {
            index: index.to_vec(),
            shape: data.shape.clone(),
        })?;
        let dtype = data.dtype;
        data.data[offset] = value.cast(dtype);
        Ok(())
    }

    pub fn get_flat(&self, offset: usize) -> Option<Scalar> {
        self.inner.read().data.get(offset).copied()
    }

    pub fn set_flat(&self, offset: usize, value: Scalar) -> Result<(), ShapeError> {
        let mut data = self.inner.write();
        let dtype = data.dtype;
        let shape = data.shape.clone();
        let slot = data
            .data
            .get_mut(offset)
            .ok_or_else(|| ShapeError::OutOfBounds {
                index: vec![offset],
                shape,
            })?;
        *slot = value.cast(dtype);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<Scalar> {
        self.inner.read().data.clone()
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.inner.read().data.iter().map(|v| v.to_f64()).collect()
    }

    pub fn fill(&self, value: Scalar) {
        let mut data = self.inner.write();
        let value = value.cast(data.dtype);
        data.data.iter_mut().for_each(|slot| *slot = value);
    }

    pub fn deep_copy(&self) -> Array {
        let data = self.inner.read();
        Self::wrap(data.dtype, data.shape.clone(), data.data.clone())
    }

    /// Copy of this array converted to `dtype`.
    pub fn astype(&self, dtype: ScalarType) -> Array {
        let data = self.inner.read();
        let converted = data.data.iter().map(|v| v.cast(dtype)).collect();
        Self::wrap(dtype, data.shape.clone(), converted)
    }

    /// Copy out the trailing sub-array addressed by the leading `prefix`.
    pub fn subarray(&self, prefix: &[usize]) -> Result<Array, ShapeError> {
        let data = self.inner.read();
        let (start, core) = Self::core_range(&data.shape, prefix)?;
        let len = element_count(&core);
        Ok(Self::wrap(
            data.dtype,
            core,
            data.data[start..start + len].to_vec(),
        ))
    }

    /// Write `source` into the trailing sub-array addressed by `prefix`.
    pub fn assign_subarray(&self, prefix: &[usize], source: &Array) -> Result<(), ShapeError> {
        if self.ptr_eq(source) {
            return Ok(());
        }
        let values = source.to_vec();
        let source_shape = source.shape();
        let mut data = self.inner.write();
        let (start, core) = Self::core_range(&data.shape, prefix)?;
        // a length-1 carrier may stand in for a scalar core
        if element_count(&core) != values.len() {
            return Err(ShapeError::CoreShape {
                expected: core,
                found: source_shape,
            });
        }
        let dtype = data.dtype;
        for (slot, value) in data.data[start..start + values.len()].iter_mut().zip(values) {
            *slot = value.cast(dtype);
        }
        Ok(())
    }

    fn core_range(shape: &[usize], prefix: &[usize]) -> Result<(usize, Vec<usize>), ShapeError> {
        let out_of_bounds = || ShapeError::OutOfBounds {
            index: prefix.to_vec(),
            shape: shape.to_vec(),
        };
        if prefix.len() > shape.len() {
            return Err(out_of_bounds());
        }
        let (outer, core) = shape.split_at(prefix.len());
        let outer_offset = flat_offset(outer, prefix).ok_or_else(out_of_bounds)?;
        Ok((outer_offset * element_count(core), core.to_vec()))
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.read();
        f.debug_struct("Array")
            .field("dtype", &data.dtype)
            .field("shape", &data.shape)
            .field("data", &data.data)
            .finish()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.inner.read(), other.inner.read());
        a.dtype == b.dtype && a.shape == b.shape && a.data == b.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_alias_the_buffer() {
        let a = Array::zeros(ScalarType::Float64, &[2, 2]);
        let alias = a.clone();
        alias.set(&[1, 0], Scalar::Float64(4.0)).unwrap();
        assert_eq!(a.get(&[1, 0]), Some(Scalar::Float64(4.0)));
        assert!(a.ptr_eq(&alias));
        assert!(!a.ptr_eq(&a.deep_copy()));
    }

    #[test]
    fn set_casts_to_dtype() {
        let a = Array::zeros(ScalarType::Int32, &[3]);
        a.set(&[2], Scalar::Float64(7.9)).unwrap();
        assert_eq!(a.get(&[2]), Some(Scalar::Int32(7)));
        assert!(a.set(&[3], Scalar::Int32(1)).is_err());
    }

    #[test]
    fn subarray_round_trip() {
        let a = Array::from_f64(ScalarType::Float64, &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let row = a.subarray(&[1]).unwrap();
        assert_eq!(row.shape(), vec![3]);
        assert_eq!(row.to_f64_vec(), vec![4.0, 5.0, 6.0]);

        row.set(&[0], Scalar::Float64(40.0)).unwrap();
        a.assign_subarray(&[1], &row).unwrap();
        assert_eq!(a.get(&[1, 0]), Some(Scalar::Float64(40.0)));
    }

    #[test]
    fn from_scalars_checks_element_count() {
        let err = Array::from_f64(ScalarType::Float32, &[2, 2], &[1.0]).unwrap_err();
        assert!(matches!(err, ShapeError::ElementCount { expected: 4, found: 1, .. }));
    }
}
