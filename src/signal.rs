use crate::sim_if::{SimIf, SIM_IF};
use crate::trigger::Trigger;
use crate::TbResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Int(u32),
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> String {
        SIM_IF
            .get_full_name(self)
            .unwrap_or_else(|e| panic!("Couldn't get name of object {}: {}", self.handle, e))
    }

    pub fn size(&self) -> u32 {
        match self.kind {
            ObjectKind::Int(size) => size,
            ObjectKind::Hier => 0,
        }
    }

    pub fn get_child(&self, name: &str) -> TbResult<Self> {
        let mut child_name = SIM_IF.get_full_name(self)?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        SIM_IF.get_object_by_name(full_name)
    }

    /// Like `get_child`, but panics when the child does not exist. Meant for test code.
    pub fn c(&self, name: &str) -> Self {
        self.get_child(name)
            .unwrap_or_else(|_| panic!("Could not get object with name {}.{}", self.name(), name))
    }

    pub fn value(&self) -> TbResult<u64> {
        SIM_IF.get_value(self)
    }

    pub fn is_high(&self) -> TbResult<bool> {
        Ok(self.value()? != 0)
    }

    pub fn u64(&self) -> u64 {
        self.value()
            .unwrap_or_else(|e| panic!("Could not read {}: {}", self.name(), e))
    }

    pub fn driver(&self) -> TbResult<Driver> {
        SIM_IF.claim_driver(self)?;
        Ok(Driver { obj: *self })
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}

/// Write handle to a signal. There is at most one per signal; dropping it releases the signal.
#[derive(Debug)]
pub struct Driver {
    obj: SimObject,
}

impl Driver {
    pub fn signal(&self) -> SimObject {
        self.obj
    }

    /// Schedules `value`; other tasks see it from the next evaluation step on.
    pub fn set(&self, value: u64) -> TbResult<()> {
        SIM_IF.set_value(&self.obj, value)
    }

    pub fn set_bool(&self, level: bool) -> TbResult<()> {
        self.set(u64::from(level))
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        SIM_IF.release_driver(&self.obj);
    }
}
