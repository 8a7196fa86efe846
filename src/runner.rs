use futures::future::BoxFuture;
use log::{error, info};
use num_format::{Locale, ToFormattedString};
use prettytable::{Cell, Row, Table};
use std::time;

use crate::bus;
use crate::config::{BusConfig, HarnessConfig};
use crate::junit;
use crate::kernel::Simulator;
use crate::signal::SimObject;
use crate::sim_if::{SimIf, TimeUnit, SIM_IF};
use crate::TbResult;

pub type TestFn = fn(SimObject, HarnessConfig) -> BoxFuture<'static, TbResult<()>>;

#[derive(Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub generator: TestFn,
}

impl TestCase {
    pub fn new(name: &'static str, generator: TestFn) -> Self {
        Self { name, generator }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub name: String,
    pub result: TbResult<()>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(
            ["TEST", "RESULT", "SIM TIME (ns)", "REAL TIME (s)", "SIM SPEED (ns/s)"]
                .iter()
                .map(|t| Cell::new(t))
                .collect(),
        ));
        for o in &self.outcomes {
            let result = match &o.result {
                Ok(()) => "passed".to_string(),
                Err(e) => format!("failed: {}", e),
            };
            let speed = match o.time_secs > 0.0 {
                true => format!("{:.3}", o.sim_time_ns / o.time_secs),
                false => "-".to_string(),
            };
            table.add_row(Row::new(vec![
                Cell::new(&o.name),
                Cell::new(&result),
                Cell::new(&(o.sim_time_ns as u64).to_formatted_string(&Locale::en)),
                Cell::new(&format!("{:.3}", o.time_secs)),
                Cell::new(&speed),
            ]));
        }
        table
    }
}

/// Runs every test in its own simulator with the bus of `bus` declared, each bounded by
/// `harness.sim_time_limit`. A test still blocked when the budget runs out fails with
/// `SimTimeExceeded`. Logs a summary and writes a JUnit report if a path is configured.
pub fn run_tests(bus: &BusConfig, harness: &HarnessConfig, tests: &[TestCase]) -> TbResult<TestReport> {
    harness.validate()?;
    let sim_start = time::Instant::now();
    let mut outcomes = Vec::with_capacity(tests.len());
    for test in tests {
        outcomes.push(run_test(bus, harness, test));
    }
    let report = TestReport { outcomes };

    info!("{} test(s), {} failed\n{}", report.outcomes.len(), report.failed(), report.table());
    info!(
        "Real time: {:.3} s",
        sim_start.elapsed().as_secs_f64()
    );
    if let Some(path) = &harness.junit_path {
        junit::create_junit_xml(&report, env!("CARGO_PKG_NAME"), path)?;
    }
    Ok(report)
}

fn run_test(bus: &BusConfig, harness: &HarnessConfig, test: &TestCase) -> TestOutcome {
    info!("running test {}", test.name);
    let time_start = time::Instant::now();
    let mut sim = Simulator::new();
    let result = bus::declare_port(&mut sim, bus).and_then(|dut| {
        let fut = (test.generator)(dut, harness.clone());
        sim.run(fut, harness.sim_time_limit)
    });
    let sim_time_ns = SIM_IF.get_sim_time(TimeUnit::Ns);
    if let Err(e) = &result {
        error!("{} test {} failed: {}", SIM_IF.time_str(), test.name, e);
    }
    TestOutcome {
        name: test.name.to_string(),
        result,
        time_secs: time_start.elapsed().as_secs_f64(),
        sim_time_ns,
    }
}
