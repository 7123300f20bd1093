use std::collections::HashMap;
use std::fmt;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::TensorInfo;

// Storage - arena of reference-counted buffers
//
// Every tensor's elements live in one flat buffer keyed by a DataId. The
// storage owns a refcount per buffer:
//
//   - allocate / write    create a buffer with refcount 1
//   - retain              a new handle aliases the buffer (reshape, identity)
//   - release             drop one reference; the buffer is freed at 0
//   - dispose(force)      free now regardless of outstanding references
//
// Complex buffers own no bytes themselves. They hold one reference on each
// of two F32 child buffers (real, imag); freeing the parent releases both
// children, which survive only if something else still references them.
//
// There is no garbage collection: callers release what they create.

/// Opaque key of a buffer in [`Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u64);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flat, homogeneously typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    F32(Vec<f32>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
    /// One byte sequence per element; strings have no fixed width.
    String(Vec<Vec<u8>>),
}

impl Values {
    /// Zero-filled values of the given real dtype.
    pub fn zeros(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype {
            DType::F32 => Values::F32(vec![0.0; len]),
            DType::I32 => Values::I32(vec![0; len]),
            DType::Bool => Values::Bool(vec![false; len]),
            DType::String => Values::String(vec![Vec::new(); len]),
            DType::Complex64 => {
                return Err(Error::msg(
                    "complex buffers are built from real and imaginary parts",
                ))
            }
        })
    }

    pub fn dtype(&self) -> DType {
        match self {
            Values::F32(_) => DType::F32,
            Values::I32(_) => DType::I32,
            Values::Bool(_) => DType::Bool,
            Values::String(_) => DType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::F32(v) => v.len(),
            Values::I32(v) => v.len(),
            Values::Bool(v) => v.len(),
            Values::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate heap size in bytes.
    pub fn num_bytes(&self) -> usize {
        match self {
            Values::F32(v) => v.len() * 4,
            Values::I32(v) => v.len() * 4,
            Values::Bool(v) => v.len(),
            Values::String(v) => v.iter().map(|s| s.len()).sum(),
        }
    }

    /// Read any numeric values as f32 (bool -> 0/1).
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match self {
            Values::F32(v) => Ok(v.clone()),
            Values::I32(v) => Ok(v.iter().map(|&x| x as f32).collect()),
            Values::Bool(v) => Ok(v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect()),
            Values::String(_) => Err(Error::UnsupportedDType {
                op: "to_f32",
                dtype: DType::String,
            }),
        }
    }

    /// Read any numeric values as i32 (floats truncate toward zero).
    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        match self {
            Values::F32(v) => Ok(v.iter().map(|&x| x as i32).collect()),
            Values::I32(v) => Ok(v.clone()),
            Values::Bool(v) => Ok(v.iter().map(|&x| x as i32).collect()),
            Values::String(_) => Err(Error::UnsupportedDType {
                op: "to_i32",
                dtype: DType::String,
            }),
        }
    }

    /// Read any numeric values as bool (`v != 0`).
    pub fn to_bool_vec(&self) -> Result<Vec<bool>> {
        match self {
            Values::F32(v) => Ok(v.iter().map(|&x| x != 0.0).collect()),
            Values::I32(v) => Ok(v.iter().map(|&x| x != 0).collect()),
            Values::Bool(v) => Ok(v.clone()),
            Values::String(_) => Err(Error::UnsupportedDType {
                op: "to_bool",
                dtype: DType::String,
            }),
        }
    }

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            Values::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        match self {
            Values::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool_slice(&self) -> Option<&[bool]> {
        match self {
            Values::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_slice(&self) -> Option<&[Vec<u8>]> {
        match self {
            Values::String(v) => Some(v),
            _ => None,
        }
    }
}

/// What a DataId points at.
#[derive(Debug, Clone)]
pub enum Buffer {
    Real(Values),
    /// Parent of two F32 buffers of the same shape.
    Complex { real: TensorInfo, imag: TensorInfo },
}

#[derive(Debug)]
struct Entry {
    buffer: Buffer,
    dtype: DType,
    ref_count: usize,
}

/// Buffer arena with explicit reference counting.
#[derive(Debug, Default)]
pub struct Storage {
    entries: HashMap<DataId, Entry>,
    next_id: u64,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, buffer: Buffer, dtype: DType) -> DataId {
        let id = DataId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                buffer,
                dtype,
                ref_count: 1,
            },
        );
        id
    }

    /// Allocate a zero-filled buffer of `len` elements with refcount 1.
    pub fn allocate(&mut self, dtype: DType, len: usize) -> Result<DataId> {
        let values = Values::zeros(dtype, len)?;
        Ok(self.write(values))
    }

    /// Take ownership of `values` as a new buffer with refcount 1.
    pub fn write(&mut self, values: Values) -> DataId {
        let dtype = values.dtype();
        let len = values.len();
        let id = self.insert(Buffer::Real(values), dtype);
        tracing::trace!(data_id = %id, %dtype, len, "buffer_allocated");
        id
    }

    /// Create a complex buffer owning one reference on each child.
    ///
    /// The caller's references on `real` and `imag` are transferred to the
    /// new parent.
    pub fn write_complex(&mut self, real: TensorInfo, imag: TensorInfo) -> Result<DataId> {
        if real.shape != imag.shape {
            return Err(Error::ShapeMismatch {
                expected: real.shape.clone(),
                got: imag.shape.clone(),
            });
        }
        for part in [&real, &imag] {
            if self.dtype(part.id)? != DType::F32 {
                return Err(Error::DTypeMismatch {
                    expected: DType::F32,
                    got: part.dtype,
                });
            }
        }
        let id = self.insert(Buffer::Complex { real, imag }, DType::Complex64);
        tracing::trace!(data_id = %id, "complex_buffer_allocated");
        Ok(id)
    }

    fn entry(&self, id: DataId) -> Result<&Entry> {
        self.entries.get(&id).ok_or(Error::UnknownDataId(id))
    }

    pub fn contains(&self, id: DataId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn dtype(&self, id: DataId) -> Result<DType> {
        Ok(self.entry(id)?.dtype)
    }

    pub fn ref_count(&self, id: DataId) -> Result<usize> {
        Ok(self.entry(id)?.ref_count)
    }

    /// Borrow the buffer behind `id` without copying.
    pub fn read(&self, id: DataId) -> Result<&Buffer> {
        Ok(&self.entry(id)?.buffer)
    }

    /// Borrow the values of a real buffer.
    pub fn values(&self, id: DataId) -> Result<&Values> {
        match self.read(id)? {
            Buffer::Real(v) => Ok(v),
            Buffer::Complex { .. } => Err(Error::UnsupportedDType {
                op: "read real values",
                dtype: DType::Complex64,
            }),
        }
    }

    /// The (real, imag) children of a complex buffer.
    pub fn complex_parts(&self, id: DataId) -> Result<(&TensorInfo, &TensorInfo)> {
        match self.read(id)? {
            Buffer::Complex { real, imag } => Ok((real, imag)),
            Buffer::Real(v) => Err(Error::DTypeMismatch {
                expected: DType::Complex64,
                got: v.dtype(),
            }),
        }
    }

    /// Add a reference to an existing buffer.
    pub fn retain(&mut self, id: DataId) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(Error::UnknownDataId(id))?;
        entry.ref_count += 1;
        Ok(())
    }

    /// Drop one reference. Returns true if the buffer was freed.
    pub fn release(&mut self, id: DataId) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(Error::UnknownDataId(id))?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(false);
        }
        self.free(id)?;
        Ok(true)
    }

    /// Free a buffer. With `force` it is freed even if other handles still
    /// reference it; otherwise this is [`Storage::release`].
    pub fn dispose(&mut self, id: DataId, force: bool) -> Result<bool> {
        if !force {
            return self.release(id);
        }
        let count = self.ref_count(id)?;
        if count > 1 {
            tracing::warn!(data_id = %id, ref_count = count, "forced_dispose_of_shared_buffer");
        }
        self.free(id)?;
        Ok(true)
    }

    fn free(&mut self, id: DataId) -> Result<()> {
        let entry = self.entries.remove(&id).ok_or(Error::UnknownDataId(id))?;
        tracing::trace!(data_id = %id, dtype = %entry.dtype, "buffer_freed");
        if let Buffer::Complex { real, imag } = entry.buffer {
            self.release(real.id)?;
            self.release(imag.id)?;
        }
        Ok(())
    }

    /// Number of live buffers, complex parents and children included.
    pub fn num_data_ids(&self) -> usize {
        self.entries.len()
    }

    /// Approximate bytes held by real buffers.
    pub fn num_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|e| match &e.buffer {
                Buffer::Real(v) => v.num_bytes(),
                Buffer::Complex { .. } => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn info(id: DataId, n: usize) -> TensorInfo {
        TensorInfo::new(id, Shape::from(n), DType::F32)
    }

    #[test]
    fn test_allocate_is_zeroed() {
        let mut s = Storage::new();
        let id = s.allocate(DType::I32, 3).unwrap();
        assert_eq!(s.values(id).unwrap(), &Values::I32(vec![0, 0, 0]));
        assert_eq!(s.ref_count(id).unwrap(), 1);
    }

    #[test]
    fn test_retain_release() {
        let mut s = Storage::new();
        let id = s.write(Values::F32(vec![1.0, 2.0]));
        s.retain(id).unwrap();
        assert!(!s.release(id).unwrap());
        assert_eq!(s.num_data_ids(), 1);
        assert!(s.release(id).unwrap());
        assert_eq!(s.num_data_ids(), 0);
        assert!(matches!(s.release(id), Err(Error::UnknownDataId(_))));
    }

    #[test]
    fn test_complex_release_frees_children() {
        let mut s = Storage::new();
        let re = s.write(Values::F32(vec![1.0]));
        let im = s.write(Values::F32(vec![2.0]));
        let c = s.write_complex(info(re, 1), info(im, 1)).unwrap();
        assert_eq!(s.num_data_ids(), 3);
        s.release(c).unwrap();
        assert_eq!(s.num_data_ids(), 0);
    }

    #[test]
    fn test_complex_child_shared_elsewhere_survives() {
        let mut s = Storage::new();
        let re = s.write(Values::F32(vec![1.0]));
        let im = s.write(Values::F32(vec![2.0]));
        s.retain(re).unwrap();
        let c = s.write_complex(info(re, 1), info(im, 1)).unwrap();
        s.release(c).unwrap();
        assert!(s.contains(re));
        assert!(!s.contains(im));
        s.release(re).unwrap();
        assert_eq!(s.num_data_ids(), 0);
    }

    #[test]
    fn test_forced_dispose() {
        let mut s = Storage::new();
        let id = s.write(Values::Bool(vec![true]));
        s.retain(id).unwrap();
        assert!(s.dispose(id, true).unwrap());
        assert!(!s.contains(id));
    }

    #[test]
    fn test_string_values_are_individual() {
        let mut s = Storage::new();
        let id = s.write(Values::String(vec![b"ab".to_vec(), b"".to_vec(), b"xyz".to_vec()]));
        assert_eq!(s.values(id).unwrap().len(), 3);
        assert_eq!(s.num_bytes(), 5);
    }
}
