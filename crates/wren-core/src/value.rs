use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;
use crate::storage::CpuStorage;

// Value: a concrete, immutable tensor
//
// A Value is what evaluation produces and what expression nodes capture as
// leaf operands. It is an Arc around an inner struct, so cloning is a
// refcount bump.
//
// IDENTITY vs CONTENT
//
//   ValueId identifies one storage buffer. Expression nodes compare leaf
//   operands with `same_view`: same buffer and same Layout. That keeps node
//   construction O(1) and makes `sign(&v) == sign(&v)` hold for the same
//   `v`, and for two equal views of it.
//
//   `PartialEq` on Value compares content (shape, dtype, element bits). This
//   is what `assert_eq!(evaluate(&e)?, evaluate(&e)?)` checks.
//
// VIEWS
//
//   `submatrix` and `batch_item` return new Values sharing the same storage
//   (and ValueId) through a narrowed Layout. No data is copied.

/// Identity of one storage buffer. Shared by clones and views of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u64);

impl ValueId {
    fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ValueId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}", self.0)
    }
}

struct ValueInner {
    id: ValueId,
    storage: Arc<CpuStorage>,
    layout: Layout,
}

/// A matrix (`[rows, cols]`) or batch of matrices (`[batch, rows, cols]`).
#[derive(Clone)]
pub struct Value {
    inner: Arc<ValueInner>,
}

impl Value {
    /// Wrap storage and a layout over it.
    pub fn from_storage(storage: CpuStorage, layout: Layout) -> Result<Self> {
        let needed = layout
            .strided_indices()
            .max()
            .map_or(0, |last| last + 1);
        if storage.len() < needed {
            return Err(Error::ElementCountMismatch {
                shape: layout.shape().clone(),
                expected: needed,
                got: storage.len(),
            });
        }
        Ok(Self::wrap(ValueId::new(), Arc::new(storage), layout))
    }

    fn wrap(id: ValueId, storage: Arc<CpuStorage>, layout: Layout) -> Self {
        Value {
            inner: Arc::new(ValueInner {
                id,
                storage,
                layout,
            }),
        }
    }

    /// Create a contiguous value from row-major elements.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        Self::check_count(&shape, data.len())?;
        let storage = CpuStorage::from_f64_iter(data.into_iter().map(WithDType::to_f64), T::DTYPE);
        Self::from_storage(storage, Layout::contiguous(shape))
    }

    /// Deterministic fill: element `k` (row-major) is `start + k * step`.
    ///
    /// `Value::sequence((4, 5), -3.3, 0.1, DType::F32)` walks from -3.3 up to
    /// about -1.4; a `(7, 4, 5)` shape continues the walk across batch items.
    pub fn sequence(shape: impl Into<Shape>, start: f64, step: f64, dtype: DType) -> Result<Self> {
        let shape = shape.into();
        let data = (0..shape.elem_count()).map(|k| start + k as f64 * step);
        let storage = CpuStorage::from_f64_iter(data, dtype);
        Self::from_storage(storage, Layout::contiguous(shape))
    }

    fn check_count(shape: &Shape, got: usize) -> Result<()> {
        if shape.elem_count() != got {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got,
            });
        }
        Ok(())
    }

    pub fn id(&self) -> ValueId {
        self.inner.id
    }

    /// Same storage buffer seen through the same layout.
    pub fn same_view(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
            && self.inner.layout == other.inner.layout
    }

    pub(crate) fn hash_view<H: std::hash::Hasher>(&self, state: &mut H) {
        use std::hash::Hash;
        self.inner.id.hash(state);
        self.inner.layout.hash(state);
    }

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.storage.dtype()
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.inner.storage
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Element at a full multi-dimensional index.
    pub fn get(&self, index: &[usize]) -> Result<f64> {
        let dims = self.dims();
        if index.len() != dims.len() {
            return Err(Error::RankMismatch {
                expected: dims.len(),
                got: index.len(),
            });
        }
        for (dim, (&i, &size)) in index.iter().zip(dims.iter()).enumerate() {
            if i >= size {
                return Err(Error::NarrowOutOfBounds {
                    dim,
                    start: i,
                    len: 1,
                    dim_size: size,
                });
            }
        }
        let flat = self.inner.layout.flat_index(index);
        self.inner
            .storage
            .get_f64(flat)
            .ok_or_else(|| Error::msg(format!("storage index {flat} out of range")))
    }

    /// Element `(row, col)` of a matrix.
    pub fn at(&self, row: usize, col: usize) -> Result<f64> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        self.get(&[row, col])
    }

    /// All elements in row-major logical order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.inner.storage.gather_f64(&self.inner.layout)
    }

    /// Batch item `index` of a `[batch, rows, cols]` value, as a matrix view.
    pub fn batch_item(&self, index: usize) -> Result<Value> {
        if !self.shape().is_batch() {
            return Err(Error::RankMismatch {
                expected: 3,
                got: self.rank(),
            });
        }
        let layout = self.inner.layout.select(0, index)?;
        Ok(Self::wrap(
            self.inner.id,
            Arc::clone(&self.inner.storage),
            layout,
        ))
    }

    /// View of rows `rows` and columns `cols` (half-open ranges). On a batch
    /// value the same region is taken from every item.
    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Value> {
        let layout = sub_region(&self.inner.layout, &rows, &cols)?;
        Ok(Self::wrap(
            self.inner.id,
            Arc::clone(&self.inner.storage),
            layout,
        ))
    }

    /// Contiguous copy; returns `self` when already contiguous.
    pub fn to_contiguous(&self) -> Value {
        if self.is_contiguous() {
            return self.clone();
        }
        let storage = self.inner.storage.map_f64(&self.inner.layout, |v| v);
        Self::wrap(
            ValueId::new(),
            Arc::new(storage),
            Layout::contiguous(self.shape().clone()),
        )
    }
}

/// Narrow the last two axes of a matrix or batch layout.
pub(crate) fn sub_region(layout: &Layout, rows: &Range<usize>, cols: &Range<usize>) -> Result<Layout> {
    let rank = layout.rank();
    if rank != 2 && rank != 3 {
        return Err(Error::RankMismatch {
            expected: 2,
            got: rank,
        });
    }
    if rows.start > rows.end || cols.start > cols.end {
        return Err(Error::msg(format!(
            "empty or reversed sub-region: rows {:?}, cols {:?}",
            rows, cols
        )));
    }
    layout
        .narrow(rank - 2, rows.start, rows.end - rows.start)?
        .narrow(rank - 1, cols.start, cols.end - cols.start)
}

impl PartialEq for Value {
    /// Content equality: same shape, same dtype, bit-identical elements.
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.shape() == other.shape()
            && self.dtype() == other.dtype()
            && self
                .to_f64_vec()
                .iter()
                .zip(other.to_f64_vec().iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Value({}, shape={}, dtype={})",
            self.inner.id,
            self.shape(),
            self.dtype()
        )
    }
}
