// Evaluation plans: registration, memoized execution and result handles
//
// LIFECYCLE
//
//   1. Register: `eval_register(&expr, device)` puts `expr` in the device's
//      plan. If an equal node is already pending or computed, its slot is
//      reused and nothing new is queued.
//   2. Eval: `eval(device)` drains the pending queue. Each pending node is
//      evaluated together with its dependency chain, operands first.
//   3. Fetch: `handle.data()` returns the cached value. A handle whose node
//      was never run through `eval` evaluates its own chain on the spot, so
//      the order of `eval_register`, `eval` and `data` never changes results.
//
// MEMO TABLE
//
//   Maps `Expr` (structural equality, fingerprint hash) to a slot, an
//   `Arc<OnceCell<Value>>`. The `Mutex` around it is held only to look up or
//   insert slots. Computation happens outside the lock, inside
//   `OnceCell::get_or_try_init`, so a node is computed by exactly one thread
//   and concurrent readers of the same slot wait for that result.
//
// PROCESS-WIDE PLANS
//
//   One plan per device tag that has a backend, created on first access and
//   kept for the rest of the process. `reset(device)` clears its table (e.g.
//   between independent sessions) and bumps its epoch. A handle from an older
//   epoch can still return a value it already holds, but will not compute
//   one: that is `Error::StaleHandle`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::{Lazy, OnceCell};

use crate::backend::Backend;
use crate::config::RuntimeConfig;
use crate::cpu::CpuBackend;
use crate::device::DeviceTag;
use crate::error::{Error, Result};
use crate::expr::{Expr, Operand};
use crate::op::OpKind;
use crate::value::Value;

type Slot = Arc<OnceCell<Value>>;

static PLANS: Lazy<HashMap<DeviceTag, Arc<EvalPlan>>> = Lazy::new(|| {
    DeviceTag::ALL
        .iter()
        .filter_map(|&device| {
            backend_for(device)
                .ok()
                .map(|backend| (device, Arc::new(EvalPlan::new(backend))))
        })
        .collect()
});

/// Snapshot of a plan's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanStats {
    /// Registrations that created a new slot.
    pub registered: u64,
    /// Registrations that landed on an existing slot.
    pub reused: u64,
    /// Kernel executions.
    pub computed: u64,
    /// Nodes waiting for the next `eval`.
    pub pending: usize,
    /// Slots currently in the memo table (pending, computed or intermediate).
    pub cached: usize,
}

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    reused: AtomicU64,
    computed: AtomicU64,
}

#[derive(Default)]
struct PlanState {
    slots: HashMap<Expr, Slot>,
    pending: Vec<Expr>,
}

/// Per-device set of pending and computed nodes with memoized results.
pub struct EvalPlan {
    backend: Arc<dyn Backend>,
    state: Mutex<PlanState>,
    epoch: AtomicU64,
    counters: Counters,
}

impl EvalPlan {
    /// A standalone plan over `backend`, independent of the process-wide ones.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        EvalPlan {
            backend,
            state: Mutex::new(PlanState::default()),
            epoch: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The process-wide plan for `device`.
    pub fn for_device(device: DeviceTag) -> Result<Arc<EvalPlan>> {
        PLANS
            .get(&device)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice {
                device: device.to_string(),
            })
    }

    pub fn device(&self) -> DeviceTag {
        self.backend.device()
    }

    // The table is only ever updated by whole-entry inserts and clears, so a
    // panic elsewhere cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, PlanState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Queue `expr` unless an equal node is already pending or computed.
    pub fn register(self: &Arc<Self>, expr: &Expr) -> EvalHandle {
        let mut state = self.lock();
        let epoch = self.epoch();
        let slot = match state.slots.get(expr) {
            Some(slot) => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                Arc::clone(slot)
            }
            None => {
                let slot: Slot = Arc::new(OnceCell::new());
                state.slots.insert(expr.clone(), Arc::clone(&slot));
                state.pending.push(expr.clone());
                self.counters.registered.fetch_add(1, Ordering::Relaxed);
                slot
            }
        };
        EvalHandle {
            plan: Arc::clone(self),
            expr: expr.clone(),
            slot,
            epoch,
        }
    }

    /// Evaluate every pending node. Computed nodes are skipped, so calling
    /// this again with nothing new registered does no work.
    ///
    /// On error, the failing node and every node after it stay queued, so a
    /// later `eval` retries them. A `reset` in between drops them instead.
    pub fn eval(&self) -> Result<()> {
        let (pending, epoch) = {
            let mut state = self.lock();
            (std::mem::take(&mut state.pending), self.epoch())
        };
        for (i, expr) in pending.iter().enumerate() {
            if let Err(e) = self.materialize(expr) {
                let mut state = self.lock();
                if self.epoch() == epoch {
                    let queued_since = std::mem::take(&mut state.pending);
                    state.pending = pending[i..]
                        .iter()
                        .cloned()
                        .chain(queued_since)
                        .collect();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drop every slot and pending node. Handles from before the reset
    /// become stale.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.slots.clear();
        state.pending.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether an equal node has a computed value in this plan.
    pub fn is_computed(&self, expr: &Expr) -> bool {
        self.lock()
            .slots
            .get(expr)
            .is_some_and(|slot| slot.get().is_some())
    }

    pub fn stats(&self) -> PlanStats {
        let state = self.lock();
        PlanStats {
            registered: self.counters.registered.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            computed: self.counters.computed.load(Ordering::Relaxed),
            pending: state.pending.len(),
            cached: state.slots.len(),
        }
    }

    fn slot_for(&self, expr: &Expr) -> Slot {
        let mut state = self.lock();
        Arc::clone(
            state
                .slots
                .entry(expr.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Compute `root` and everything it depends on, reusing cached slots.
    fn materialize(&self, root: &Expr) -> Result<Value> {
        let root_slot = self.slot_for(root);
        if let Some(value) = root_slot.get() {
            return Ok(value.clone());
        }

        let mut done: HashMap<Expr, Value> = HashMap::new();
        for node in build_topo(root) {
            let slot = self.slot_for(&node);
            let value = slot
                .get_or_try_init(|| {
                    let inputs = node
                        .operands()
                        .iter()
                        .map(|operand| match operand {
                            Operand::Value(v) => Ok(v.clone()),
                            Operand::Node(child) => done.get(child).cloned().ok_or_else(|| {
                                Error::msg(format!("operand {:?} not evaluated before its user", child))
                            }),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let out = self.execute(node.op(), &inputs)?;
                    self.counters.computed.fetch_add(1, Ordering::Relaxed);
                    Ok::<_, Error>(out)
                })?
                .clone();
            done.insert(node, value);
        }
        done.remove(root)
            .ok_or_else(|| Error::msg(format!("{:?} missing from its own evaluation order", root)))
    }

    fn execute(&self, op: &OpKind, inputs: &[Value]) -> Result<Value> {
        match op {
            OpKind::Unary(op) => self.backend.unary_op(*op, &inputs[0]),
            OpKind::Binary(op) => self.backend.binary_op(*op, &inputs[0], &inputs[1]),
            OpKind::SubMatrix { rows, cols } => {
                self.backend
                    .sub_matrix(&inputs[0], rows.clone(), cols.clone())
            }
        }
    }
}

impl fmt::Debug for EvalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalPlan")
            .field("device", &self.device())
            .field("epoch", &self.epoch())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Nodes reachable from `root`, operands before users, each equal node once.
fn build_topo(root: &Expr) -> Vec<Expr> {
    fn visit(node: &Expr, visited: &mut HashSet<Expr>, order: &mut Vec<Expr>) {
        if visited.contains(node) {
            return;
        }
        visited.insert(node.clone());
        for operand in node.operands() {
            if let Operand::Node(child) = operand {
                visit(child, visited, order);
            }
        }
        order.push(node.clone());
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(root, &mut visited, &mut order);
    order
}

/// Caller-held reference to a registered node's eventual value.
#[derive(Clone)]
pub struct EvalHandle {
    plan: Arc<EvalPlan>,
    expr: Expr,
    slot: Slot,
    epoch: u64,
}

impl EvalHandle {
    /// The computed value, evaluating the node's chain now if needed.
    pub fn data(&self) -> Result<Value> {
        if let Some(value) = self.slot.get() {
            return Ok(value.clone());
        }
        if self.plan.epoch() != self.epoch {
            return Err(Error::StaleHandle {
                device: self.plan.device(),
            });
        }
        let value = self.plan.materialize(&self.expr)?;
        Ok(self.slot.get_or_init(|| value).clone())
    }

    /// Whether the value is already available without computing.
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn device(&self) -> DeviceTag {
        self.plan.device()
    }

    /// Both handles resolve through the same memo slot.
    pub fn shares_slot(&self, other: &EvalHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for EvalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EvalHandle({:?} on {}, ready={})",
            self.expr,
            self.device(),
            self.is_ready()
        )
    }
}

/// The backend servicing `device`, if this build has one.
pub fn backend_for(device: DeviceTag) -> Result<Arc<dyn Backend>> {
    match device {
        DeviceTag::Cpu => Ok(Arc::new(CpuBackend)),
        other => Err(Error::UnknownDevice {
            device: other.to_string(),
        }),
    }
}

/// Register `expr` with the process-wide plan of `device`.
///
/// With `WREN_EAGER` set, the node is computed before the handle is returned.
pub fn eval_register(expr: &Expr, device: DeviceTag) -> Result<EvalHandle> {
    let handle = EvalPlan::for_device(device)?.register(expr);
    if RuntimeConfig::global()?.eager {
        handle.data()?;
    }
    Ok(handle)
}

/// Run every pending node of the process-wide plan of `device`.
pub fn eval(device: DeviceTag) -> Result<()> {
    EvalPlan::for_device(device)?.eval()
}

/// Clear the process-wide plan of `device`.
pub fn reset(device: DeviceTag) -> Result<()> {
    EvalPlan::for_device(device)?.reset();
    Ok(())
}

/// One-off evaluation on a fresh plan of the default device.
///
/// Nothing is shared with other calls: two `evaluate`s over expressions with
/// a common sub-expression compute it twice. Register both on one plan to
/// share it.
pub fn evaluate(expr: &Expr) -> Result<Value> {
    let device = RuntimeConfig::global()?.default_device;
    let plan = Arc::new(EvalPlan::new(backend_for(device)?));
    let handle = plan.register(expr);
    plan.eval()?;
    handle.data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BinaryOp, UnaryOp};
    use crate::dtype::DType;

    fn cpu_plan() -> Arc<EvalPlan> {
        Arc::new(EvalPlan::new(Arc::new(CpuBackend)))
    }

    fn unary(op: UnaryOp, x: impl Into<Operand>) -> Expr {
        Expr::new(OpKind::Unary(op), vec![x.into()]).unwrap()
    }

    fn binary(op: BinaryOp, a: impl Into<Operand>, b: impl Into<Operand>) -> Expr {
        Expr::new(OpKind::Binary(op), vec![a.into(), b.into()]).unwrap()
    }

    fn input() -> Value {
        Value::sequence((4, 5), -1.0, 0.1, DType::F64).unwrap()
    }

    #[test]
    fn test_equal_nodes_share_one_slot() {
        let plan = cpu_plan();
        let x = input();
        let h1 = plan.register(&unary(UnaryOp::Sign, &x));
        let h2 = plan.register(&unary(UnaryOp::Sign, &x));
        assert!(h1.shares_slot(&h2));
        plan.eval().unwrap();
        assert_eq!(h1.data().unwrap(), h2.data().unwrap());
        let stats = plan.stats();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.computed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_eval_is_idempotent() {
        let plan = cpu_plan();
        let h = plan.register(&unary(UnaryOp::Tanh, input()));
        plan.eval().unwrap();
        plan.eval().unwrap();
        let first = h.data().unwrap();
        assert_eq!(h.data().unwrap(), first);
        assert_eq!(plan.stats().computed, 1);
    }

    #[test]
    fn test_data_without_eval() {
        let plan = cpu_plan();
        let x = input();
        let h = plan.register(&unary(UnaryOp::Neg, &x));
        assert!(!h.is_ready());
        let v = h.data().unwrap();
        assert!(h.is_ready());
        assert_eq!(v.at(0, 0).unwrap(), 1.0);
        // The queued entry is already computed; eval has nothing left to do.
        plan.eval().unwrap();
        assert_eq!(plan.stats().computed, 1);
    }

    #[test]
    fn test_shared_subexpression_computed_once() {
        let plan = cpu_plan();
        let x = input();
        let s = unary(UnaryOp::Sigmoid, &x);
        let a = binary(BinaryOp::Add, &s, &s);
        let b = binary(BinaryOp::Mul, unary(UnaryOp::Sigmoid, &x), &x);
        let ha = plan.register(&a);
        let hb = plan.register(&b);
        plan.eval().unwrap();
        // sigmoid once, add once, mul once
        assert_eq!(plan.stats().computed, 3);
        assert!(plan.is_computed(&s));
        let sig = plan.register(&s).data().unwrap();
        let expected: Vec<f64> = sig.to_f64_vec().iter().map(|v| v + v).collect();
        assert_eq!(ha.data().unwrap().to_f64_vec(), expected);
        assert_eq!(hb.data().unwrap().dims(), &[4, 5]);
    }

    #[test]
    fn test_reset_makes_uncomputed_handles_stale() {
        let plan = cpu_plan();
        let x = input();
        let ready = plan.register(&unary(UnaryOp::Abs, &x));
        ready.data().unwrap();
        let waiting = plan.register(&unary(UnaryOp::Sign, &x));
        plan.reset();
        assert_eq!(plan.stats().cached, 0);
        assert!(ready.data().is_ok());
        assert!(matches!(
            waiting.data(),
            Err(Error::StaleHandle {
                device: DeviceTag::Cpu
            })
        ));
        // Re-registering after the reset works normally.
        assert!(plan.register(&unary(UnaryOp::Sign, &x)).data().is_ok());
    }

    #[test]
    fn test_unknown_device() {
        let err = EvalPlan::for_device(DeviceTag::Cuda).unwrap_err();
        assert!(err.is_configuration());
        assert!(eval(DeviceTag::Cuda).is_err());
        assert!(backend_for(DeviceTag::Cuda).is_err());
    }

    #[test]
    fn test_process_plan_is_stable() {
        let a = EvalPlan::for_device(DeviceTag::Cpu).unwrap();
        let b = EvalPlan::for_device(DeviceTag::Cpu).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_evaluate_uses_fresh_plan() {
        let e = unary(UnaryOp::Sign, input());
        let a = evaluate(&e).unwrap();
        let b = evaluate(&e).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_data_computes_once() {
        let plan = cpu_plan();
        let x = Value::sequence((64, 64), -2.0, 0.001, DType::F32).unwrap();
        let e = unary(UnaryOp::Tanh, &x);
        let results: Vec<Value> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let plan = Arc::clone(&plan);
                    let e = e.clone();
                    scope.spawn(move || plan.register(&e).data().unwrap())
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        let stats = plan.stats();
        assert_eq!(stats.computed, 1);
        assert_eq!(stats.registered + stats.reused, 8);
    }
}
