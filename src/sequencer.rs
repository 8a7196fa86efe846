use log::info;

use crate::bus::bind;
use crate::config::{BusConfig, HarnessConfig};
use crate::executor::{JoinHandle, Task};
use crate::monitor::{BusMonitor, MonitorStats};
use crate::shared::Shared;
use crate::signal::{Driver, SimObject};
use crate::sim_if::{SimDuration, SimIf, TimeUnit, SIM_IF};
use crate::trigger::Trigger;
use crate::utils;
use crate::TbResult;

/// Free-running clock, low for the first half of each period.
#[allow(unreachable_code)]
pub async fn clock(clk: Driver, period_ns: u64) -> TbResult<()> {
    let half_period = SimDuration::new(period_ns * 1000 / 2, TimeUnit::Ps);
    loop {
        clk.set(0)?;
        Trigger::timer(half_period).await;
        clk.set(1)?;
        Trigger::timer(half_period).await;
    }
    Ok(())
}

pub struct Sequencer {
    dut: SimObject,
    cfg: BusConfig,
    clk: SimObject,
    clk_drv: Option<Driver>,
    rst_n: Driver,
    wready: Driver,
    rready: Driver,
    monitor: Option<BusMonitor>,
    stats: Shared<MonitorStats>,
    running: Vec<JoinHandle<()>>,
}

impl Sequencer {
    pub fn new(dut: SimObject, cfg: &BusConfig) -> TbResult<Self> {
        let names = cfg.names();
        let clk = bind(dut, &names.clk, 1)?;
        Ok(Self {
            dut,
            cfg: cfg.clone(),
            clk,
            clk_drv: Some(clk.driver()?),
            rst_n: bind(dut, &names.rst_n, 1)?.driver()?,
            wready: bind(dut, &names.wready, 1)?.driver()?,
            rready: bind(dut, &names.rready, 1)?.driver()?,
            monitor: None,
            stats: Shared::default(),
            running: Vec::new(),
        })
    }

    /// Uses `monitor` instead of the default address-plus-one responder. Must be called
    /// before `initialize`.
    pub fn with_monitor(mut self, monitor: BusMonitor) -> Self {
        self.stats = monitor.stats();
        self.monitor = Some(monitor);
        self
    }

    pub fn monitor_stats(&self) -> Shared<MonitorStats> {
        self.stats.clone()
    }

    /// Starts clock and monitor, holds reset for `reset_cycles` rising edges, releases it and
    /// returns one rising edge later. Blocks for as long as the clock does not tick.
    pub async fn initialize(&mut self, harness: &HarnessConfig) -> TbResult<()> {
        harness.validate()?;
        self.wready.set(1)?;
        self.rready.set(1)?;
        let first = self.clk_drv.is_some();
        if let Some(clk) = self.clk_drv.take() {
            let period = harness.clock_period_ns;
            let clock_task = async move {
                if let Err(e) = clock(clk, period).await {
                    SIM_IF.abort(e);
                }
            };
            self.running.push(Task::spawn(clock_task, "clock"));
        }
        self.rst_n.set(0)?;
        let monitor = match self.monitor.take() {
            Some(monitor) => Some(monitor),
            None if first => {
                Some(BusMonitor::new(self.dut, &self.cfg)?.with_stats(self.stats.clone()))
            }
            None => None,
        };
        if let Some(monitor) = monitor {
            self.running.push(monitor.spawn());
        }
        self.reset_release(harness.reset_cycles).await?;
        info!(
            "{} bus initialized after {} reset cycles",
            SIM_IF.time_str(),
            harness.reset_cycles
        );
        Ok(())
    }

    pub async fn reset(&self, cycles: u32) -> TbResult<()> {
        self.clk.rising_edge().await;
        self.rst_n.set(0)?;
        self.reset_release(cycles).await
    }

    async fn reset_release(&self, cycles: u32) -> TbResult<()> {
        utils::clock_cycles(self.clk, cycles).await;
        self.rst_n.set(1)?;
        self.clk.rising_edge().await;
        Ok(())
    }

    pub fn shutdown(self) {
        for task in self.running {
            task.cancel();
        }
    }
}
