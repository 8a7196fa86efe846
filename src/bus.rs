use crate::config::{mask, BusConfig};
use crate::kernel::Simulator;
use crate::signal::SimObject;
use crate::{TbError, TbResult};

pub const PORT_SCOPE: &str = "dut";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub address: u64,
    pub data: Option<u64>,
}

impl TransactionRequest {
    pub fn read(address: u64) -> Self {
        Self {
            kind: TransactionKind::Read,
            address,
            data: None,
        }
    }

    pub fn write(address: u64, data: u64) -> Self {
        Self {
            kind: TransactionKind::Write,
            address,
            data: Some(data),
        }
    }

    /// Rejects values wider than the bus before anything is driven.
    pub fn validate(&self, cfg: &BusConfig) -> TbResult<()> {
        check_width("address", self.address, cfg.address_width())?;
        if let Some(data) = self.data {
            check_width("data", data, cfg.data_width())?;
        }
        Ok(())
    }
}

fn check_width(field: &'static str, value: u64, width: u32) -> TbResult<()> {
    if value & !mask(width) != 0 {
        return Err(TbError::ConfigurationMismatch {
            field,
            value,
            width,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionResult {
    pub data: Option<u64>,
    /// Rising edges the transaction waited for, including the initial sampling edge.
    pub cycles: u32,
}

pub fn declare_port(sim: &mut Simulator, cfg: &BusConfig) -> TbResult<SimObject> {
    let root = sim.add_scope(PORT_SCOPE)?;
    let names = cfg.names();
    let signals = [
        (&names.clk, 1),
        (&names.rst_n, 1),
        (&names.address, cfg.address_width()),
        (&names.wdata, cfg.data_width()),
        (&names.wready, 1),
        (&names.rready, 1),
        (&names.write_strobe, 1),
        (&names.read_strobe, 1),
        (&names.ack, 1),
        (&names.response_valid, 1),
        (&names.rdata, cfg.data_width()),
    ];
    for (name, width) in signals {
        sim.add_signal(&format!("{}.{}", PORT_SCOPE, name), width)?;
    }
    Ok(root)
}

pub(crate) fn bind(dut: SimObject, name: &str, width: u32) -> TbResult<SimObject> {
    let obj = dut.get_child(name)?;
    if obj.size() != width {
        return Err(TbError::PortWidthMismatch {
            name: name.to_string(),
            expected: width,
            actual: obj.size(),
        });
    }
    Ok(obj)
}
