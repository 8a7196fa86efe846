use intmap::IntMap;
use log::error;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::executor;
use crate::signal::SimObject;
use crate::sim_if::{SimCallback, SimDuration, SimIf, SIM_IF};
use crate::TbResult;

thread_local! {
    static TRIGGERS: RefCell<TriggerMaps> = RefCell::new(TriggerMaps::default());
}

struct TriggerMaps {
    // key is signal handle as u64
    edge_map: IntMap<CallbackHandles>,
    // key is absolute callback time
    timer_map: IntMap<CallbackHandles>,
    read_only: CallbackHandles,
    read_write: CallbackHandles,
}

impl Default for TriggerMaps {
    fn default() -> Self {
        Self {
            edge_map: IntMap::new(),
            timer_map: IntMap::new(),
            read_only: CallbackHandles::default(),
            read_write: CallbackHandles::default(),
        }
    }
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

impl CallbackHandles {
    fn new(handle: usize, shared: TrigShared) -> Self {
        let mut callbacks = VecDeque::new();
        callbacks.push_back(shared);
        Self {
            handle: Some(handle),
            callbacks,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) fn cancel_all_triggers() {
    // the kernel drops its own callback registrations on teardown; wakers are dropped
    // outside the borrow since that can release whole tasks
    let old = TRIGGERS.try_with(|t| t.replace(TriggerMaps::default()));
    drop(old);
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    // set right before waking, so a stale wake of the same task doesn't complete this trigger
    fired: Arc<AtomicBool>,
    // If trigger is an edge, react needs to know if it is waiting for a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

#[derive(Clone, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(SimDuration),
    ReadWrite,
    ReadOnly,
}

#[derive(Clone, Debug)]
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

impl Trigger {
    fn from_kind(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }
    pub fn timer(time: SimDuration) -> Self {
        Trigger::from_kind(TrigKind::Timer(time))
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::from_kind(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    /// Resumes after the current evaluation step's writes have been applied.
    pub fn read_write() -> Self {
        Trigger::from_kind(TrigKind::ReadWrite)
    }
    /// Resumes once the current instant has settled; writes are rejected from there.
    pub fn read_only() -> Self {
        Trigger::from_kind(TrigKind::ReadOnly)
    }

    fn register(&self, shared: TrigShared) -> TbResult<()> {
        match self.kind {
            TrigKind::ReadWrite => register_phase(shared, SimCallback::ReadWrite),
            TrigKind::ReadOnly => register_phase(shared, SimCallback::ReadOnly),
            TrigKind::Timer(time) => register_timer(shared, SIM_IF.get_sim_steps(time)?),
            TrigKind::Edge(sig_hdl, edge_kind) => register_edge(
                TrigShared {
                    edge_kind,
                    ..shared
                },
                sig_hdl,
            ),
        }
    }
}

fn register_phase(shared: TrigShared, cb: SimCallback) -> TbResult<()> {
    let registered = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        let slot = match cb {
            SimCallback::ReadOnly => &mut t.read_only,
            _ => &mut t.read_write,
        };
        slot.callbacks.push_back(shared);
        slot.handle.is_some()
    });
    if !registered {
        let cb_hdl = SIM_IF.register_callback(cb)?;
        TRIGGERS.with(|t| {
            let mut t = t.borrow_mut();
            match cb {
                SimCallback::ReadOnly => t.read_only.handle.replace(cb_hdl),
                _ => t.read_write.handle.replace(cb_hdl),
            };
        });
    }
    Ok(())
}

fn register_timer(shared: TrigShared, steps: u64) -> TbResult<()> {
    // Add current time to key since the simulator reports back absolute time, not delta
    let abs_time = steps + SIM_IF.get_sim_time_steps();
    let pending = TRIGGERS.with(|t| match t.borrow_mut().timer_map.get_mut(abs_time) {
        Some(callbacks) => {
            callbacks.callbacks.push_back(shared);
            None
        }
        None => Some(shared),
    });
    if let Some(shared) = pending {
        let handle = SIM_IF.register_callback(SimCallback::Time(steps))?;
        TRIGGERS.with(|t| {
            t.borrow_mut()
                .timer_map
                .insert(abs_time, CallbackHandles::new(handle, shared))
        });
    }
    Ok(())
}

fn register_edge(shared: TrigShared, sig_hdl: usize) -> TbResult<()> {
    let pending = TRIGGERS.with(|t| match t.borrow_mut().edge_map.get_mut(sig_hdl as u64) {
        Some(callbacks) => {
            callbacks.callbacks.push_back(shared);
            None
        }
        None => Some(shared),
    });
    if let Some(shared) = pending {
        let handle = SIM_IF.register_callback(SimCallback::Edge(sig_hdl))?;
        TRIGGERS.with(|t| {
            t.borrow_mut()
                .edge_map
                .insert(sig_hdl as u64, CallbackHandles::new(handle, shared))
        });
    }
    Ok(())
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(fired) = &self.fired {
            return match fired.load(Ordering::Acquire) {
                true => Poll::Ready(()),
                // woken on behalf of some other trigger of the same task
                false => Poll::Pending,
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        if let Err(e) = self.register(shared) {
            error!("{} could not register trigger {:?}: {}", SIM_IF.time_str(), self.kind, e);
            SIM_IF.abort(e);
        }
        self.fired = Some(fired);
        Poll::Pending
    }
}

#[inline]
pub fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    if wake(cb, edge) > 0 {
        executor::run_once();
    }
}

/// Like `react`, but leaves the woken tasks in the ready queue.
pub(crate) fn wake(cb: SimCallback, edge: Option<EdgeKind>) -> usize {
    let vec_wake = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        match cb {
            SimCallback::ReadWrite => {
                t.read_write.handle = None; // remove handle, since CB is now done
                std::mem::take(&mut t.read_write.callbacks)
            }
            SimCallback::ReadOnly => {
                t.read_only.handle = None;
                std::mem::take(&mut t.read_only.callbacks)
            }
            SimCallback::Time(time) => t
                .timer_map
                .remove(time)
                .map(|c| c.callbacks)
                .unwrap_or_default(),
            SimCallback::Edge(sig_hdl) => {
                let Some(mut callbacks) = t.edge_map.remove(sig_hdl as u64) else {
                    return VecDeque::new();
                };
                let edge = edge.unwrap_or(EdgeKind::Any);
                let (wake, resched): (VecDeque<_>, VecDeque<_>) = callbacks
                    .callbacks
                    .drain(..)
                    .partition(|trig| trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge);
                if resched.is_empty() {
                    // if no callbacks are remaining, cancel
                    if let Some(handle) = callbacks.handle {
                        let _ = SIM_IF.cancel_callback(handle);
                    }
                } else {
                    callbacks.callbacks = resched;
                    t.edge_map.insert(sig_hdl as u64, callbacks);
                }
                wake
            }
        }
    });

    let woken = vec_wake.len();
    for shared in vec_wake {
        shared.fire();
    }
    woken
}
