use log::{debug, warn};

use crate::bus::bind;
use crate::config::BusConfig;
use crate::executor::{JoinHandle, Task};
use crate::shared::Shared;
use crate::signal::{Driver, SimObject};
use crate::sim_if::{SimIf, SIM_IF};
use crate::{TbError, TbResult};

pub type ResponseFn = Box<dyn Fn(u64) -> u64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Responding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub responses: u64,
    pub ignored_in_reset: u64,
}

/// Passive responder answering read requests half a clock after they appear.
///
/// On a rising edge of the read strobe it waits for the next falling clock edge, drives
/// response-valid together with the response data, and withdraws response-valid one
/// falling edge later. Requests seen while reset is asserted are ignored.
pub struct BusMonitor {
    clk: SimObject,
    rst_n: SimObject,
    read_strobe: SimObject,
    address: SimObject,
    response_valid: Driver,
    rdata: Driver,
    data_mask: u64,
    response: ResponseFn,
    stats: Shared<MonitorStats>,
}

impl BusMonitor {
    pub fn new(dut: SimObject, cfg: &BusConfig) -> TbResult<Self> {
        let names = cfg.names();
        let data_mask = cfg.data_mask();
        Ok(Self {
            clk: bind(dut, &names.clk, 1)?,
            rst_n: bind(dut, &names.rst_n, 1)?,
            read_strobe: bind(dut, &names.read_strobe, 1)?,
            address: bind(dut, &names.address, cfg.address_width())?,
            response_valid: bind(dut, &names.response_valid, 1)?.driver()?,
            rdata: bind(dut, &names.rdata, cfg.data_width())?.driver()?,
            data_mask,
            response: Box::new(move |addr| addr.wrapping_add(1) & data_mask),
            stats: Shared::default(),
        })
    }

    /// Replaces the address-plus-one reply with `f(address)`, masked to the data width.
    pub fn with_response(mut self, f: impl Fn(u64) -> u64 + Send + Sync + 'static) -> Self {
        self.response = Box::new(f);
        self
    }

    pub(crate) fn with_stats(mut self, stats: Shared<MonitorStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Shared<MonitorStats> {
        self.stats.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        Task::spawn(
            async move {
                if let Err(e) = self.run().await {
                    warn!("{} bus monitor stopped: {}", SIM_IF.time_str(), e);
                    SIM_IF.abort(e);
                }
            },
            "bus_monitor",
        )
    }

    #[allow(unreachable_code)]
    pub async fn run(self) -> TbResult<()> {
        self.response_valid.set(0)?;
        self.rdata.set(0)?;
        let mut state = MonitorState::Idle;
        loop {
            state = self.step(state).await?;
        }
        Ok(())
    }

    async fn step(&self, state: MonitorState) -> TbResult<MonitorState> {
        match state {
            MonitorState::Idle => {
                self.read_strobe.rising_edge().await;
                if !self.rst_n.is_high()? {
                    self.stats.with_mut(|s| s.ignored_in_reset += 1);
                    return Ok(MonitorState::Idle);
                }
                // reply away from the rising edge the master samples on
                self.clk.falling_edge().await;
                if !self.read_strobe.is_high()? {
                    return Err(TbError::ProtocolRaceFault(format!(
                        "read request withdrawn before the response at {}",
                        SIM_IF.time_str()
                    )));
                }
                if self.response_valid.signal().is_high()? {
                    return Err(TbError::ProtocolRaceFault(format!(
                        "new read request while still responding at {}",
                        SIM_IF.time_str()
                    )));
                }
                let address = self.address.value()?;
                let data = (self.response)(address) & self.data_mask;
                self.response_valid.set(1)?;
                self.rdata.set(data)?;
                self.stats.with_mut(|s| s.responses += 1);
                debug!("{} responding to {:#x} with {:#x}", SIM_IF.time_str(), address, data);
                Ok(MonitorState::Responding)
            }
            MonitorState::Responding => {
                self.clk.falling_edge().await;
                self.response_valid.set(0)?;
                Ok(MonitorState::Idle)
            }
        }
    }
}
