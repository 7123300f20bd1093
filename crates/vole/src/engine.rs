// Engine - operator dispatch over a buffer arena
//
// The engine owns three things:
//
//   storage   every live buffer, keyed by DataId and reference counted
//   kernels   OpKind -> kernel function, filled by registry::register_kernels
//   config    EngineConfig (matmul tile size, batch parallelism, NaN checks)
//
// `execute` validates the input count, looks up the kernel for the op's
// kind and runs it. A kernel reads its inputs out of storage, calls into
// vole-cpu and writes fresh output buffers. Every handle `execute` returns
// holds one reference the caller must eventually `dispose`.
//
// Kernels receive `&mut Engine`, so composite ops (softmax, the fused ops)
// are written as sequences of `execute` calls on other ops.

use std::collections::HashMap;
use std::time::Instant;

use vole_core::{Buffer, DType, Error, Result, Shape, Storage, TensorInfo, Values};

use crate::config::EngineConfig;
use crate::op::{Op, OpKind};
use crate::registry;

/// Signature every kernel implements.
pub type KernelFn = fn(&mut Engine, &Op, &[TensorInfo]) -> Result<Vec<TensorInfo>>;

/// CPU compute engine.
pub struct Engine {
    storage: Storage,
    kernels: HashMap<OpKind, KernelFn>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("num_data_ids", &self.storage.num_data_ids())
            .field("num_kernels", &self.kernels.len())
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            storage: Storage::new(),
            kernels: registry::register_kernels(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn has_kernel(&self, kind: OpKind) -> bool {
        self.kernels.contains_key(&kind)
    }

    // Execution

    /// Run `op` on `inputs` and return its outputs.
    pub fn execute(&mut self, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
        let kind = op.kind();
        let (min, max) = op.arity();
        if inputs.len() < min || max.is_some_and(|m| inputs.len() > m) {
            let expected = match max {
                Some(m) if m == min => min.to_string(),
                Some(m) => format!("{min} to {m}"),
                None => format!("at least {min}"),
            };
            return Err(Error::Arity {
                op: kind.name(),
                expected,
                got: inputs.len(),
            });
        }
        for t in inputs {
            if !self.storage.contains(t.id) {
                return Err(Error::UnknownDataId(t.id));
            }
        }
        let kernel = *self
            .kernels
            .get(&kind)
            .ok_or_else(|| Error::UnknownOp(kind.name().to_string()))?;

        let _span = tracing::debug_span!("execute", op = %kind).entered();
        let start = Instant::now();
        let outputs = kernel(self, op, inputs)?;
        tracing::debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "executed"
        );

        if self.config.check_numerics {
            if let Some(index) = self.first_nan_output(&outputs)? {
                self.dispose_all(&outputs)?;
                return Err(Error::msg(format!("{kind}: output {index} contains NaN")));
            }
        }
        Ok(outputs)
    }

    /// Run an op that produces exactly one output.
    pub(crate) fn execute_one(&mut self, op: &Op, inputs: &[TensorInfo]) -> Result<TensorInfo> {
        let mut outputs = self.execute(op, inputs)?;
        if outputs.len() != 1 {
            self.dispose_all(&outputs)?;
            return Err(Error::msg(format!(
                "{op}: expected a single output, got {}",
                outputs.len()
            )));
        }
        Ok(outputs.remove(0))
    }

    fn first_nan_output(&self, outputs: &[TensorInfo]) -> Result<Option<usize>> {
        for (i, t) in outputs.iter().enumerate() {
            let has_nan = match self.storage.read(t.id)? {
                Buffer::Real(Values::F32(v)) => v.iter().any(|x| x.is_nan()),
                Buffer::Real(_) => false,
                Buffer::Complex { real, imag } => {
                    let nan = |id| -> Result<bool> {
                        Ok(self
                            .storage
                            .values(id)?
                            .as_f32_slice()
                            .is_some_and(|v| v.iter().any(|x| x.is_nan())))
                    };
                    nan(real.id)? || nan(imag.id)?
                }
            };
            if has_nan {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    // Tensor creation

    pub fn tensor_f32(&mut self, data: Vec<f32>, shape: impl Into<Shape>) -> Result<TensorInfo> {
        self.write(Values::F32(data), shape.into())
    }

    pub fn tensor_i32(&mut self, data: Vec<i32>, shape: impl Into<Shape>) -> Result<TensorInfo> {
        self.write(Values::I32(data), shape.into())
    }

    pub fn tensor_bool(&mut self, data: Vec<bool>, shape: impl Into<Shape>) -> Result<TensorInfo> {
        self.write(Values::Bool(data), shape.into())
    }

    /// String tensor; each element is an arbitrary byte sequence.
    pub fn tensor_strings<S: AsRef<[u8]>>(
        &mut self,
        data: &[S],
        shape: impl Into<Shape>,
    ) -> Result<TensorInfo> {
        let values = data.iter().map(|s| s.as_ref().to_vec()).collect();
        self.write(Values::String(values), shape.into())
    }

    /// Complex tensor from a real and an imaginary tensor of the same shape.
    ///
    /// The inputs stay owned by the caller; the result holds its own
    /// references on them.
    pub fn complex(&mut self, real: &TensorInfo, imag: &TensorInfo) -> Result<TensorInfo> {
        if real.shape != imag.shape {
            return Err(Error::ShapeMismatch {
                expected: real.shape.clone(),
                got: imag.shape.clone(),
            });
        }
        self.storage.retain(real.id)?;
        self.storage.retain(imag.id)?;
        self.complex_from_parts(real.clone(), imag.clone())
    }

    // Reading

    pub fn read_f32(&self, t: &TensorInfo) -> Result<Vec<f32>> {
        self.values(t)?.to_f32_vec()
    }

    pub fn read_i32(&self, t: &TensorInfo) -> Result<Vec<i32>> {
        self.values(t)?.to_i32_vec()
    }

    pub fn read_bool(&self, t: &TensorInfo) -> Result<Vec<bool>> {
        self.values(t)?.to_bool_vec()
    }

    pub fn read_strings(&self, t: &TensorInfo) -> Result<Vec<Vec<u8>>> {
        match self.values(t)? {
            Values::String(v) => Ok(v.clone()),
            other => Err(Error::DTypeMismatch {
                expected: DType::String,
                got: other.dtype(),
            }),
        }
    }

    /// `(real, imag)` planes of a complex tensor. A real tensor reads with
    /// a zero imaginary part.
    pub fn read_complex(&self, t: &TensorInfo) -> Result<(Vec<f32>, Vec<f32>)> {
        match self.storage.read(t.id)? {
            Buffer::Complex { real, imag } => Ok((self.read_f32(real)?, self.read_f32(imag)?)),
            Buffer::Real(v) => {
                let re = v.to_f32_vec()?;
                let im = vec![0.0; re.len()];
                Ok((re, im))
            }
        }
    }

    // Lifetime

    /// Add a reference to the buffer behind `t`.
    pub fn retain(&mut self, t: &TensorInfo) -> Result<()> {
        self.storage.retain(t.id)
    }

    /// Drop the caller's reference to `t`. Returns true if the buffer was
    /// freed.
    pub fn dispose(&mut self, t: &TensorInfo) -> Result<bool> {
        self.storage.dispose(t.id, false)
    }

    /// Free `t` now, even if other handles still alias it.
    pub fn force_dispose(&mut self, t: &TensorInfo) -> Result<bool> {
        self.storage.dispose(t.id, true)
    }

    pub(crate) fn dispose_all(&mut self, tensors: &[TensorInfo]) -> Result<()> {
        for t in tensors {
            self.storage.dispose(t.id, false)?;
        }
        Ok(())
    }

    /// Number of live buffers, complex parents and children included.
    pub fn num_data_ids(&self) -> usize {
        self.storage.num_data_ids()
    }

    pub fn num_bytes(&self) -> usize {
        self.storage.num_bytes()
    }

    pub fn ref_count(&self, t: &TensorInfo) -> Result<usize> {
        self.storage.ref_count(t.id)
    }

    // Kernel helpers

    /// Borrow the values of a real tensor.
    pub(crate) fn values(&self, t: &TensorInfo) -> Result<&Values> {
        self.storage.values(t.id)
    }

    /// Write `values` as a new tensor of `shape`.
    pub(crate) fn write(&mut self, values: Values, shape: Shape) -> Result<TensorInfo> {
        if values.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: values.len(),
                shape,
            });
        }
        let dtype = values.dtype();
        let id = self.storage.write(values);
        Ok(TensorInfo::new(id, shape, dtype))
    }

    pub(crate) fn write_f32(&mut self, data: Vec<f32>, shape: Shape) -> Result<TensorInfo> {
        self.write(Values::F32(data), shape)
    }

    pub(crate) fn write_i32(&mut self, data: Vec<i32>, shape: Shape) -> Result<TensorInfo> {
        self.write(Values::I32(data), shape)
    }

    /// Write real and imaginary planes as a new complex tensor.
    pub(crate) fn write_complex(&mut self, re: Vec<f32>, im: Vec<f32>, shape: Shape) -> Result<TensorInfo> {
        let real = self.write_f32(re, shape.clone())?;
        let imag = match self.write_f32(im, shape) {
            Ok(t) => t,
            Err(e) => {
                self.storage.release(real.id)?;
                return Err(e);
            }
        };
        self.complex_from_parts(real, imag)
    }

    /// Wrap two F32 handles in a complex parent that takes over their
    /// references.
    pub(crate) fn complex_from_parts(&mut self, real: TensorInfo, imag: TensorInfo) -> Result<TensorInfo> {
        let shape = real.shape.clone();
        let id = self.storage.write_complex(real, imag)?;
        Ok(TensorInfo::new(id, shape, DType::Complex64))
    }

    /// The real and imaginary children of a complex tensor, not retained.
    pub(crate) fn parts(&self, t: &TensorInfo) -> Result<(TensorInfo, TensorInfo)> {
        let (re, im) = self.storage.complex_parts(t.id)?;
        Ok((re.clone(), im.clone()))
    }

    /// A new handle on the same data read as `shape`.
    ///
    /// Real buffers are retained and shared. Complex tensors get a new
    /// parent over aliases of both children, since children carry their
    /// own shape.
    pub(crate) fn alias(&mut self, t: &TensorInfo, shape: Shape) -> Result<TensorInfo> {
        if shape.elem_count() != t.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: t.elem_count(),
                shape,
            });
        }
        if t.dtype == DType::Complex64 {
            let (re, im) = self.parts(t)?;
            self.storage.retain(re.id)?;
            self.storage.retain(im.id)?;
            return self.complex_from_parts(re.with_shape(shape.clone()), im.with_shape(shape));
        }
        self.storage.retain(t.id)?;
        Ok(t.with_shape(shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_cpu::BinaryOp;

    #[test]
    fn test_create_and_read() {
        let mut engine = Engine::default();
        let t = engine.tensor_f32(vec![1.0, 2.0, 3.0, 4.0], (2, 2)).unwrap();
        assert_eq!(t.dims(), &[2, 2]);
        assert_eq!(engine.read_f32(&t).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(engine.read_i32(&t).unwrap(), vec![1, 2, 3, 4]);
        assert!(matches!(
            engine.tensor_f32(vec![1.0], (2, 2)),
            Err(Error::ElementCountMismatch { expected: 4, got: 1, .. })
        ));
    }

    #[test]
    fn test_complex_holds_its_own_references() {
        let mut engine = Engine::default();
        let re = engine.tensor_f32(vec![1.0, 2.0], 2).unwrap();
        let im = engine.tensor_f32(vec![3.0, 4.0], 2).unwrap();
        let c = engine.complex(&re, &im).unwrap();
        engine.dispose(&re).unwrap();
        engine.dispose(&im).unwrap();
        assert_eq!(engine.num_data_ids(), 3);
        assert_eq!(
            engine.read_complex(&c).unwrap(),
            (vec![1.0, 2.0], vec![3.0, 4.0])
        );
        engine.dispose(&c).unwrap();
        assert_eq!(engine.num_data_ids(), 0);
    }

    #[test]
    fn test_alias_shares_buffer() {
        let mut engine = Engine::default();
        let t = engine.tensor_i32(vec![1, 2, 3, 4, 5, 6], (2, 3)).unwrap();
        let a = engine.alias(&t, Shape::from((3, 2))).unwrap();
        assert_eq!(a.id, t.id);
        assert_eq!(engine.ref_count(&t).unwrap(), 2);
        engine.dispose(&t).unwrap();
        assert_eq!(engine.read_i32(&a).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        engine.dispose(&a).unwrap();
        assert_eq!(engine.num_data_ids(), 0);
    }

    #[test]
    fn test_arity_checked_before_kernel() {
        let mut engine = Engine::default();
        let t = engine.tensor_f32(vec![1.0], 1).unwrap();
        let err = engine.execute(&Op::Binary(BinaryOp::Add), &[t]).unwrap_err();
        assert!(matches!(err, Error::Arity { op: "Add", got: 1, .. }));
    }

    #[test]
    fn test_check_numerics_rejects_nan() {
        let mut engine = Engine::new(EngineConfig::default().with_check_numerics(true));
        let a = engine.tensor_f32(vec![0.0, 1.0], 2).unwrap();
        let b = engine.tensor_f32(vec![0.0, 1.0], 2).unwrap();
        let err = engine.execute(&Op::Binary(BinaryOp::RealDiv), &[a.clone(), b.clone()]);
        assert!(err.is_err());
        engine.dispose(&a).unwrap();
        engine.dispose(&b).unwrap();
        assert_eq!(engine.num_data_ids(), 0);
    }

    #[test]
    fn test_every_kind_has_a_kernel() {
        let engine = Engine::default();
        for &kind in OpKind::ALL {
            assert!(engine.has_kernel(kind), "missing kernel for {kind}");
        }
    }
}
