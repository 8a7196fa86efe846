//! In-process simulation kernel.
//!
//! Holds the signal store and the callback registrations of the triggers, and
//! advances simulated time. There is no HDL evaluation: signals only change when a
//! `Driver` writes them. Writes are buffered and committed at the end of an
//! evaluation step, so every task reacting to the same edge sees the same values.

use intmap::IntMap;
use log::{debug, trace, warn};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::executor::{self, Task};
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{SimCallback, SimDuration, SimIf, SIM_IF};
use crate::trigger::{self, EdgeKind};
use crate::{TbError, TbResult};

/// Evaluation steps allowed at one instant before the run is considered to oscillate.
pub const DELTA_LIMIT: usize = 10_000;
pub const PRECISION: i8 = -12;

thread_local! {
    static KERNEL: RefCell<Option<KernelState>> = RefCell::new(None);
}

static NEXT_SIM_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Phase {
    Eval,
    ReadOnly,
}

struct Slot {
    name: String,
    kind: ObjectKind,
    value: u64,
    driven: bool,
}

struct KernelState {
    id: usize,
    time: u64,
    phase: Phase,
    objects: Vec<Slot>,
    names: HashMap<String, usize>,
    // buffered writes, one entry per signal, committed at the end of the step
    pending: Vec<(usize, u64)>,
    next_cb: usize,
    cb_kinds: IntMap<SimCallback>,
    // signal handle -> callback handle
    watched: IntMap<usize>,
    // absolute time -> callback handle
    timers: BTreeMap<u64, usize>,
    read_write: Option<usize>,
    read_only: Option<usize>,
    fault: Option<TbError>,
}

impl KernelState {
    fn new(id: usize) -> Self {
        Self {
            id,
            time: 0,
            phase: Phase::Eval,
            objects: Vec::new(),
            names: HashMap::new(),
            pending: Vec::new(),
            next_cb: 0,
            cb_kinds: IntMap::new(),
            watched: IntMap::new(),
            timers: BTreeMap::new(),
            read_write: None,
            read_only: None,
            fault: None,
        }
    }

    fn add_object(&mut self, name: &str, kind: ObjectKind) -> TbResult<SimObject> {
        if self.names.contains_key(name) {
            return Err(TbError::DuplicateSignal(name.to_string()));
        }
        let handle = self.objects.len();
        self.objects.push(Slot {
            name: name.to_string(),
            kind,
            value: 0,
            driven: false,
        });
        self.names.insert(name.to_string(), handle);
        Ok(SimObject { handle, kind })
    }

    fn slot(&self, handle: usize) -> TbResult<&Slot> {
        self.objects
            .get(handle)
            .ok_or_else(|| TbError::UnknownSignal(format!("#{}", handle)))
    }

    fn slot_mut(&mut self, handle: usize) -> TbResult<&mut Slot> {
        self.objects
            .get_mut(handle)
            .ok_or_else(|| TbError::UnknownSignal(format!("#{}", handle)))
    }

    fn new_cb(&mut self, cb: SimCallback) -> usize {
        let handle = self.next_cb;
        self.next_cb += 1;
        self.cb_kinds.insert(handle as u64, cb);
        handle
    }

    fn commit(&mut self) -> Vec<(usize, EdgeKind)> {
        let mut edges = Vec::new();
        for (handle, value) in std::mem::take(&mut self.pending) {
            let Some(slot) = self.objects.get_mut(handle) else {
                continue;
            };
            let old = slot.value;
            if old == value {
                continue;
            }
            slot.value = value;
            if self.watched.contains_key(handle as u64) {
                edges.push((handle, classify_edge(old, value)));
            }
        }
        edges
    }

    fn take_due_phase(&mut self, cb: SimCallback) -> bool {
        let slot = match cb {
            SimCallback::ReadOnly => &mut self.read_only,
            _ => &mut self.read_write,
        };
        match slot.take() {
            Some(handle) => {
                self.cb_kinds.remove(handle as u64);
                true
            }
            None => false,
        }
    }

    fn pop_timer(&mut self) -> Option<u64> {
        let (time, handle) = self.timers.pop_first()?;
        self.cb_kinds.remove(handle as u64);
        Some(time)
    }
}

fn classify_edge(old: u64, new: u64) -> EdgeKind {
    match (old, new) {
        (0, _) => EdgeKind::Rising,
        (_, 0) => EdgeKind::Falling,
        _ => EdgeKind::Any,
    }
}

fn with_state<R>(f: impl FnOnce(&mut KernelState) -> TbResult<R>) -> TbResult<R> {
    KERNEL
        .try_with(|k| match k.borrow_mut().as_mut() {
            Some(state) => f(state),
            None => Err(TbError::NoSimulator),
        })
        .unwrap_or(Err(TbError::NoSimulator))
}

pub struct Kernel;

impl SimIf for Kernel {
    fn set_value(&self, obj: &SimObject, value: u64) -> TbResult<()> {
        with_state(|s| {
            let phase = s.phase;
            let slot = s.slot(obj.handle)?;
            let ObjectKind::Int(width) = slot.kind else {
                return Err(TbError::UnknownSignal(slot.name.clone()));
            };
            if phase == Phase::ReadOnly {
                return Err(TbError::ReadOnlyPhase(slot.name.clone()));
            }
            if width < 64 && value >> width != 0 {
                return Err(TbError::ValueOverflow {
                    name: slot.name.clone(),
                    value,
                    width,
                });
            }
            match s.pending.iter_mut().find(|(h, _)| *h == obj.handle) {
                Some(entry) => entry.1 = value,
                None => s.pending.push((obj.handle, value)),
            }
            Ok(())
        })
    }

    fn get_value(&self, obj: &SimObject) -> TbResult<u64> {
        with_state(|s| Ok(s.slot(obj.handle)?.value))
    }

    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject> {
        with_state(|s| {
            let handle = *s
                .names
                .get(name)
                .ok_or_else(|| TbError::UnknownSignal(name.to_string()))?;
            Ok(SimObject {
                handle,
                kind: s.slot(handle)?.kind,
            })
        })
    }

    fn get_full_name(&self, obj: &SimObject) -> TbResult<String> {
        with_state(|s| Ok(s.slot(obj.handle)?.name.clone()))
    }

    fn get_sim_time_steps(&self) -> u64 {
        with_state(|s| Ok(s.time)).unwrap_or(0)
    }

    fn get_sim_precision(&self) -> i8 {
        PRECISION
    }

    fn claim_driver(&self, obj: &SimObject) -> TbResult<()> {
        with_state(|s| {
            let slot = s.slot_mut(obj.handle)?;
            if slot.kind == ObjectKind::Hier {
                return Err(TbError::UnknownSignal(slot.name.clone()));
            }
            if slot.driven {
                return Err(TbError::MultipleDrivers(slot.name.clone()));
            }
            slot.driven = true;
            Ok(())
        })
    }

    fn release_driver(&self, obj: &SimObject) {
        // nothing to release once the simulator is gone
        let _ = with_state(|s| {
            s.slot_mut(obj.handle)?.driven = false;
            Ok(())
        });
    }

    fn register_callback(&self, cb: SimCallback) -> TbResult<usize> {
        with_state(|s| match cb {
            SimCallback::Time(delay) => {
                let abs_time = s.time + delay;
                if let Some(handle) = s.timers.get(&abs_time) {
                    return Ok(*handle);
                }
                let handle = s.new_cb(SimCallback::Time(abs_time));
                s.timers.insert(abs_time, handle);
                Ok(handle)
            }
            SimCallback::Edge(sig_hdl) => {
                let slot = s.slot(sig_hdl)?;
                if slot.kind == ObjectKind::Hier {
                    return Err(TbError::UnknownSignal(slot.name.clone()));
                }
                if let Some(handle) = s.watched.get(sig_hdl as u64) {
                    return Ok(*handle);
                }
                let handle = s.new_cb(cb);
                s.watched.insert(sig_hdl as u64, handle);
                Ok(handle)
            }
            SimCallback::ReadWrite => match s.read_write {
                Some(handle) => Ok(handle),
                None => {
                    let handle = s.new_cb(cb);
                    s.read_write = Some(handle);
                    Ok(handle)
                }
            },
            SimCallback::ReadOnly => match s.read_only {
                Some(handle) => Ok(handle),
                None => {
                    let handle = s.new_cb(cb);
                    s.read_only = Some(handle);
                    Ok(handle)
                }
            },
        })
    }

    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()> {
        with_state(|s| {
            match s.cb_kinds.remove(cb_hdl as u64) {
                Some(SimCallback::Time(t)) => {
                    s.timers.remove(&t);
                }
                Some(SimCallback::Edge(sig_hdl)) => {
                    s.watched.remove(sig_hdl as u64);
                }
                Some(SimCallback::ReadWrite) => s.read_write = None,
                Some(SimCallback::ReadOnly) => s.read_only = None,
                None => {}
            }
            Ok(())
        })
    }

    fn abort(&self, err: TbError) {
        let _ = with_state(|s| {
            if s.fault.is_none() {
                s.fault = Some(err);
            }
            Ok(())
        });
    }
}

/// Owns the simulation state of the current thread. Dropping it tears down all tasks.
pub struct Simulator {
    id: usize,
}

impl Simulator {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let id = NEXT_SIM_ID.fetch_add(1, Ordering::Relaxed);
        if with_state(|_| Ok(())).is_ok() {
            warn!("replacing the simulator that was active on this thread");
            tear_down();
        }
        KERNEL.with(|k| k.borrow_mut().replace(KernelState::new(id)));
        Simulator { id }
    }

    pub fn add_scope(&mut self, name: &str) -> TbResult<SimObject> {
        with_state(|s| s.add_object(name, ObjectKind::Hier))
    }

    pub fn add_signal(&mut self, name: &str, width: u32) -> TbResult<SimObject> {
        if width == 0 || width > 64 {
            return Err(TbError::InvalidWidth(width));
        }
        with_state(|s| s.add_object(name, ObjectKind::Int(width)))
    }

    pub fn time_steps(&self) -> u64 {
        SIM_IF.get_sim_time_steps()
    }

    /// Runs `fut` as the main task until it completes, or fails once `limit` of simulated time
    /// passes without completion. Tasks forked earlier keep running alongside.
    pub fn run<T, F>(&mut self, fut: F, limit: SimDuration) -> TbResult<T>
    where
        T: Send + 'static,
        F: Future<Output = TbResult<T>> + Send + 'static,
    {
        let deadline = self.time_steps() + SIM_IF.get_sim_steps(limit)?;
        let mut main = Task::spawn(fut, "main");
        let result = self.run_until_done(&mut main, deadline, limit);
        if result.is_err() {
            main.cancel();
        }
        result
    }

    fn run_until_done<T>(
        &mut self,
        main: &mut executor::JoinHandle<TbResult<T>>,
        deadline: u64,
        limit: SimDuration,
    ) -> TbResult<T> {
        // evaluation steps spent at the current instant, timer wake-ups included
        let mut deltas = 0;
        loop {
            settle(&mut deltas)?;
            if let Some(result) = main.try_result() {
                return result.and_then(|r| r);
            }
            let next = with_state(|s| {
                let due = s.timers.first_key_value().map(|(&t, _)| t);
                Ok(match due {
                    Some(t) if t > deadline => {
                        s.time = deadline;
                        None
                    }
                    Some(_) => s.pop_timer(),
                    None => return Err(TbError::Stalled { at_ps: s.time }),
                })
            })?;
            let Some(time) = next else {
                debug!("{} time budget of {} used up", SIM_IF.time_str(), limit);
                return Err(TbError::SimTimeExceeded { limit });
            };
            let advanced = with_state(|s| {
                let advanced = time > s.time;
                s.time = time;
                Ok(advanced)
            })?;
            match advanced {
                true => deltas = 0,
                false => count_delta(&mut deltas)?,
            }
            trace!("{} advancing", SIM_IF.time_str());
            trigger::react(SimCallback::Time(time), None);
        }
    }
}

fn take_fault() -> TbResult<()> {
    match with_state(|s| Ok(s.fault.take()))? {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn count_delta(deltas: &mut usize) -> TbResult<()> {
    *deltas += 1;
    if *deltas > DELTA_LIMIT {
        return Err(TbError::DeltaOverflow {
            limit: DELTA_LIMIT,
            at_ps: SIM_IF.get_sim_time_steps(),
        });
    }
    Ok(())
}

/// Evaluates the current instant until no more writes or wake-ups are pending,
/// then runs the read-only phase.
fn settle(deltas: &mut usize) -> TbResult<()> {
    loop {
        executor::run_once();
        take_fault()?;
        let (edges, read_write) =
            with_state(|s| Ok((s.commit(), s.take_due_phase(SimCallback::ReadWrite))))?;
        if edges.is_empty() && !read_write && !executor::has_ready_tasks() {
            break;
        }
        // wake every waiter of this commit before any of them runs
        for (sig_hdl, edge) in edges {
            trigger::wake(SimCallback::Edge(sig_hdl), Some(edge));
        }
        if read_write {
            trigger::wake(SimCallback::ReadWrite, None);
        }
        executor::run_once();
        take_fault()?;
        count_delta(deltas)?;
    }
    if with_state(|s| Ok(s.take_due_phase(SimCallback::ReadOnly)))? {
        with_state(|s| {
            s.phase = Phase::ReadOnly;
            Ok(())
        })?;
        trigger::react(SimCallback::ReadOnly, None);
        with_state(|s| {
            s.phase = Phase::Eval;
            Ok(())
        })?;
    }
    take_fault()
}

fn tear_down() {
    let state = KERNEL.try_with(|k| k.borrow_mut().take()).ok().flatten();
    drop(state);
    // tasks dropped from here on find no kernel and release nothing
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if with_state(|s| Ok(s.id == self.id)).unwrap_or(false) {
            tear_down();
        }
    }
}
