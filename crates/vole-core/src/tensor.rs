use crate::dtype::DType;
use crate::shape::Shape;
use crate::storage::DataId;

/// A tensor handle: which buffer, read as what shape and dtype.
///
/// Handles are plain values. Cloning one does not add a reference to the
/// buffer; operators that hand out an aliasing handle (reshape, identity)
/// retain the buffer themselves, and every handle an operator returns must
/// eventually be disposed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    pub id: DataId,
    pub shape: Shape,
    pub dtype: DType,
}

impl TensorInfo {
    pub fn new(id: DataId, shape: Shape, dtype: DType) -> Self {
        Self { id, shape, dtype }
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Same buffer read with a different shape.
    pub fn with_shape(&self, shape: Shape) -> Self {
        Self {
            id: self.id,
            shape,
            dtype: self.dtype,
        }
    }
}
