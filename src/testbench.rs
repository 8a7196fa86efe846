use std::collections::VecDeque;

use crate::bus::bind;
use crate::config::BusConfig;
use crate::executor::{JoinHandle, Task};
use crate::prelude::*;
use crate::shared::Shared;

/*
 * SCOREBOARD
 */
#[derive(Clone)]
pub struct Scoreboard<T: PartialEq>(Shared<ScoreboardInner<T>>);

impl<T: PartialEq + std::fmt::Debug> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Shared::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
        }))
    }
    pub fn add_exp(&self, data: T) {
        self.0.with_mut(|s| {
            s.exp_q.push_back(data);
            s.expected += 1;
            s.compare();
        });
    }
    pub fn add_recv(&self, data: T) {
        self.0.with_mut(|s| {
            s.recv_q.push_back(data);
            s.received += 1;
            s.compare();
        });
    }
    pub fn result(&self) -> TbResult<String> {
        match self.passed() {
            true => Ok(self.result_str()),
            false => Err(TbError::ScoreboardMismatch(self.result_str())),
        }
    }
    pub fn passed(&self) -> bool {
        let inner = self.0.get();
        inner.expected > 0
            && inner.received == inner.expected
            && inner.matched == inner.received
            && inner.errors == 0
            && inner.exp_q.is_empty()
            && inner.recv_q.is_empty()
    }
    pub fn result_str(&self) -> String {
        let inner = self.0.get();
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            inner.expected,
            inner.received,
            inner.matched,
            inner.errors,
            inner.exp_q.len(),
            inner.recv_q.len()
        )
    }
}

pub struct ScoreboardInner<T>
where
    T: PartialEq,
{
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
}

impl<T: PartialEq + std::fmt::Debug> ScoreboardInner<T> {
    fn compare(&mut self) {
        while let (Some(exp), Some(recv)) = (self.exp_q.front(), self.recv_q.front()) {
            if exp == recv {
                self.matched += 1;
            } else {
                log::warn!("scoreboard: expected {:?}, received {:?}", exp, recv);
                self.errors += 1;
            }
            self.exp_q.pop_front();
            self.recv_q.pop_front();
        }
    }
}

/*
 * PROBE
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub time_ps: u64,
    pub rst_n: bool,
    pub write_strobe: bool,
    pub read_strobe: bool,
    pub ack: bool,
    pub response_valid: bool,
}

/// Records the handshake signals on every rising clock edge, for checking timing afterwards.
#[derive(Clone)]
pub struct BusProbe {
    clk: SimObject,
    rst_n: SimObject,
    write_strobe: SimObject,
    read_strobe: SimObject,
    ack: SimObject,
    response_valid: SimObject,
    samples: Shared<Vec<Sample>>,
}

impl BusProbe {
    pub fn new(dut: SimObject, cfg: &BusConfig) -> TbResult<Self> {
        let names = cfg.names();
        Ok(Self {
            clk: bind(dut, &names.clk, 1)?,
            rst_n: bind(dut, &names.rst_n, 1)?,
            write_strobe: bind(dut, &names.write_strobe, 1)?,
            read_strobe: bind(dut, &names.read_strobe, 1)?,
            ack: bind(dut, &names.ack, 1)?,
            response_valid: bind(dut, &names.response_valid, 1)?,
            samples: Shared::default(),
        })
    }

    pub fn spawn(&self) -> JoinHandle<TbResult<()>> {
        Task::spawn(self.clone().run(), "bus_probe")
    }

    #[allow(unreachable_code)]
    async fn run(self) -> TbResult<()> {
        loop {
            self.clk.rising_edge().await;
            let sample = Sample {
                time_ps: SIM_IF.get_sim_time_steps(),
                rst_n: self.rst_n.is_high()?,
                write_strobe: self.write_strobe.is_high()?,
                read_strobe: self.read_strobe.is_high()?,
                ack: self.ack.is_high()?,
                response_valid: self.response_valid.is_high()?,
            };
            self.samples.with_mut(|s| s.push(sample));
        }
        Ok(())
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.snapshot()
    }

    /// Lengths, in rising edges, of each stretch where `level` held.
    pub fn high_runs(&self, level: impl Fn(&Sample) -> bool) -> Vec<usize> {
        let mut runs = Vec::new();
        let mut current = 0;
        for sample in self.samples.get().iter() {
            if level(sample) {
                current += 1;
            } else if current > 0 {
                runs.push(current);
                current = 0;
            }
        }
        if current > 0 {
            runs.push(current);
        }
        runs
    }
}
