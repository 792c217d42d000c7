use half::{bf16, f16};

use crate::dtype::{DType, WithDType};
use crate::layout::Layout;

/// Host-memory element buffer behind a [`Value`](crate::Value).
///
/// One variant per [`DType`]. Storage is never mutated after construction;
/// views share it through an `Arc` and differ only in their [`Layout`].
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl CpuStorage {
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F16(v) => v.len(),
            CpuStorage::BF16(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build storage of `dtype` from f64 elements.
    pub fn from_f64_iter(data: impl Iterator<Item = f64>, dtype: DType) -> Self {
        match dtype {
            DType::F16 => CpuStorage::F16(data.map(f16::from_f64).collect()),
            DType::BF16 => CpuStorage::BF16(data.map(bf16::from_f64).collect()),
            DType::F32 => CpuStorage::F32(data.map(|v| v as f32).collect()),
            DType::F64 => CpuStorage::F64(data.collect()),
        }
    }

    /// Element at a flat storage index, widened to f64.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            CpuStorage::F16(v) => v.get(index).map(|x| x.to_f64()),
            CpuStorage::BF16(v) => v.get(index).map(|x| x.to_f64()),
            CpuStorage::F32(v) => v.get(index).map(|x| *x as f64),
            CpuStorage::F64(v) => v.get(index).copied(),
        }
    }

    /// Gather the elements addressed by `layout`, in logical order.
    pub fn gather_f64(&self, layout: &Layout) -> Vec<f64> {
        fn gather<T: WithDType>(data: &[T], layout: &Layout) -> Vec<f64> {
            layout.strided_indices().map(|i| WithDType::to_f64(data[i])).collect()
        }
        match self {
            CpuStorage::F16(v) => gather(v, layout),
            CpuStorage::BF16(v) => gather(v, layout),
            CpuStorage::F32(v) => gather(v, layout),
            CpuStorage::F64(v) => gather(v, layout),
        }
    }

    /// Apply `f` to every element addressed by `layout`; the result is
    /// contiguous and keeps this storage's dtype.
    pub fn map_f64(&self, layout: &Layout, f: impl Fn(f64) -> f64) -> Self {
        fn map<T: WithDType>(data: &[T], layout: &Layout, f: impl Fn(f64) -> f64) -> Vec<T> {
            layout
                .strided_indices()
                .map(|i| T::from_f64(f(WithDType::to_f64(data[i]))))
                .collect()
        }
        match self {
            CpuStorage::F16(v) => CpuStorage::F16(map(v, layout, f)),
            CpuStorage::BF16(v) => CpuStorage::BF16(map(v, layout, f)),
            CpuStorage::F32(v) => CpuStorage::F32(map(v, layout, f)),
            CpuStorage::F64(v) => CpuStorage::F64(map(v, layout, f)),
        }
    }
}
