use num_format::{Locale, ToFormattedString};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::kernel::Kernel;
use crate::signal::SimObject;
use crate::{TbError, TbResult};

pub static SIM_IF: Kernel = Kernel;

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    // relative delay on registration, absolute time when reported back
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TimeUnit {
    Ps,
    Ns,
    Us,
    Ms,
    Sec,
}

impl TimeUnit {
    fn scale(self) -> i8 {
        match self {
            TimeUnit::Ps => -12,
            TimeUnit::Ns => -9,
            TimeUnit::Us => -6,
            TimeUnit::Ms => -3,
            TimeUnit::Sec => 0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TbError;

    fn from_str(s: &str) -> TbResult<Self> {
        match s {
            "ps" => Ok(TimeUnit::Ps),
            "ns" => Ok(TimeUnit::Ns),
            "us" => Ok(TimeUnit::Us),
            "ms" => Ok(TimeUnit::Ms),
            "s" | "sec" => Ok(TimeUnit::Sec),
            _ => Err(TbError::InvalidTimeUnit(s.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::Sec => "sec",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct SimDuration {
    pub value: u64,
    pub unit: TimeUnit,
}

impl SimDuration {
    pub const fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }
    pub const fn ns(value: u64) -> Self {
        Self::new(value, TimeUnit::Ns)
    }
    pub const fn us(value: u64) -> Self {
        Self::new(value, TimeUnit::Us)
    }
    pub const fn ms(value: u64) -> Self {
        Self::new(value, TimeUnit::Ms)
    }

    /// Converts to simulator steps of the given precision (power of ten, e.g. -12 for ps).
    pub fn to_steps(self, precision: i8) -> TbResult<u64> {
        let exp = self.unit.scale() - precision;
        if exp < 0 {
            // unit finer than the simulator resolves
            let div = 10_u64.pow(u32::from(exp.unsigned_abs()));
            if self.value % div != 0 {
                return Err(TbError::InvalidDuration(self.to_string()));
            }
            return Ok(self.value / div);
        }
        10_u64
            .checked_pow(exp as u32)
            .and_then(|mul| self.value.checked_mul(mul))
            .ok_or_else(|| TbError::InvalidDuration(self.to_string()))
    }
}

impl FromStr for SimDuration {
    type Err = TbError;

    fn from_str(s: &str) -> TbResult<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| TbError::InvalidDuration(s.to_string()))?;
        let (value, unit) = s.split_at(split);
        let value = value
            .parse::<u64>()
            .map_err(|_| TbError::InvalidDuration(s.to_string()))?;
        Ok(Self::new(value, unit.trim().parse()?))
    }
}

impl TryFrom<String> for SimDuration {
    type Error = TbError;

    fn try_from(s: String) -> TbResult<Self> {
        s.parse()
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: u64) -> TbResult<()>;
    fn get_value(&self, obj: &SimObject) -> TbResult<u64>;
    fn get_object_by_name(&self, name: &str) -> TbResult<SimObject>;
    fn get_full_name(&self, obj: &SimObject) -> TbResult<String>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn claim_driver(&self, obj: &SimObject) -> TbResult<()>;
    fn release_driver(&self, obj: &SimObject);
    fn register_callback(&self, cb: SimCallback) -> TbResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()>;
    /// Stops the current run with `err` at the end of the current evaluation step.
    fn abort(&self, err: TbError);

    fn get_sim_time(&self, unit: TimeUnit) -> f64 {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        ldexp10(t, self.get_sim_precision() - unit.scale())
    }
    fn get_sim_steps(&self, time: SimDuration) -> TbResult<u64> {
        time.to_steps(self.get_sim_precision())
    }
    fn time_str(&self) -> String {
        let t = self.get_sim_time(TimeUnit::Ns);
        let int = t.floor() as u64;
        let mut frac_str = format!("{:.3}", t % 1.0);
        frac_str.remove(0);
        format!("{}{}ns", int.to_formatted_string(&Locale::en), frac_str)
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
