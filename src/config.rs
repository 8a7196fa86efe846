use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sim_if::SimDuration;
use crate::{TbError, TbResult};

pub const CONFIG_ENV: &str = "WBTB_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalNames {
    pub clk: String,
    pub rst_n: String,
    pub address: String,
    pub wdata: String,
    pub wready: String,
    pub rready: String,
    pub write_strobe: String,
    pub read_strobe: String,
    pub ack: String,
    pub response_valid: String,
    pub rdata: String,
}

impl Default for SignalNames {
    fn default() -> Self {
        Self {
            clk: "clk".into(),
            rst_n: "rst_n".into(),
            address: "address".into(),
            wdata: "wdata".into(),
            wready: "wready".into(),
            rready: "rready".into(),
            write_strobe: "wvalid".into(),
            read_strobe: "rvalid".into(),
            ack: "ack".into(),
            response_valid: "rrvalid".into(),
            rdata: "rdata".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BusSection")]
pub struct BusConfig {
    address_width: u32,
    data_width: u32,
    write_ack_required: bool,
    names: SignalNames,
}

impl BusConfig {
    pub fn new(address_width: u32, data_width: u32, write_ack_required: bool) -> TbResult<Self> {
        for width in [address_width, data_width] {
            if width == 0 || width > 64 {
                return Err(TbError::InvalidWidth(width));
            }
        }
        Ok(Self {
            address_width,
            data_width,
            write_ack_required,
            names: SignalNames::default(),
        })
    }

    pub fn with_signal_names(mut self, names: SignalNames) -> Self {
        self.names = names;
        self
    }

    pub fn address_width(&self) -> u32 {
        self.address_width
    }
    pub fn data_width(&self) -> u32 {
        self.data_width
    }
    pub fn write_ack_required(&self) -> bool {
        self.write_ack_required
    }
    pub fn names(&self) -> &SignalNames {
        &self.names
    }

    pub fn address_mask(&self) -> u64 {
        mask(self.address_width)
    }
    pub fn data_mask(&self) -> u64 {
        mask(self.data_width)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BusSection {
    address_width: u32,
    data_width: u32,
    #[serde(default)]
    write_ack_required: bool,
    #[serde(default)]
    signals: SignalNames,
}

impl TryFrom<BusSection> for BusConfig {
    type Error = TbError;

    fn try_from(section: BusSection) -> TbResult<Self> {
        Ok(BusConfig::new(section.address_width, section.data_width, section.write_ack_required)?
            .with_signal_names(section.signals))
    }
}

pub(crate) fn mask(width: u32) -> u64 {
    match width {
        64.. => u64::MAX,
        w => (1 << w) - 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub clock_period_ns: u64,
    pub reset_cycles: u32,
    pub sim_time_limit: SimDuration,
    pub junit_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clock_period_ns: 100,
            reset_cycles: 1,
            sim_time_limit: SimDuration::ms(20),
            junit_path: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> TbResult<()> {
        if self.clock_period_ns == 0 {
            return Err(TbError::InvalidConfig("clock_period_ns must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Contents of a testbench TOML file: a `[bus]` table and an optional `[harness]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TbConfig {
    pub bus: BusConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

impl TbConfig {
    pub fn from_toml_str(content: &str) -> TbResult<Self> {
        let cfg = toml::from_str::<TbConfig>(content)
            .map_err(|e| TbError::InvalidConfig(e.to_string()))?;
        cfg.harness.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> TbResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| TbError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Loads the file named by `WBTB_CONFIG`, `None` when the variable is unset.
    pub fn from_env() -> TbResult<Option<Self>> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)).map(Some),
            None => Ok(None),
        }
    }
}
