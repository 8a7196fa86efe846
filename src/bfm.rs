use log::debug;

use crate::bus::{bind, TransactionKind, TransactionRequest, TransactionResult};
use crate::config::BusConfig;
use crate::signal::{Driver, SimObject};
use crate::sim_if::{SimIf, SIM_IF};
use crate::{TbError, TbResult};

/// Bus master issuing single-beat reads and writes.
///
/// Every transaction starts on the rising clock edge following the call and samples the
/// handshake signals on rising edges only. There is no built-in timeout: a device that
/// never acknowledges blocks the transaction, wrap it in `utils::with_timeout` to bound it.
/// Transactions take `&mut self`, so one BFM never has two of them in flight.
pub struct Bfm {
    cfg: BusConfig,
    clk: SimObject,
    address: Driver,
    wdata: Driver,
    write_strobe: Driver,
    read_strobe: Driver,
    ack: SimObject,
    response_valid: SimObject,
    rdata: SimObject,
}

impl Bfm {
    pub fn new(dut: SimObject, cfg: BusConfig) -> TbResult<Self> {
        let names = cfg.names();
        let bfm = Self {
            clk: bind(dut, &names.clk, 1)?,
            address: bind(dut, &names.address, cfg.address_width())?.driver()?,
            wdata: bind(dut, &names.wdata, cfg.data_width())?.driver()?,
            write_strobe: bind(dut, &names.write_strobe, 1)?.driver()?,
            read_strobe: bind(dut, &names.read_strobe, 1)?.driver()?,
            ack: bind(dut, &names.ack, 1)?,
            response_valid: bind(dut, &names.response_valid, 1)?,
            rdata: bind(dut, &names.rdata, cfg.data_width())?,
            cfg,
        };
        Ok(bfm)
    }

    pub fn config(&self) -> &BusConfig {
        &self.cfg
    }

    pub async fn write(&mut self, address: u64, data: u64) -> TbResult<()> {
        self.execute(TransactionRequest::write(address, data))
            .await
            .map(|_| ())
    }

    pub async fn read(&mut self, address: u64) -> TbResult<u64> {
        let result = self.execute(TransactionRequest::read(address)).await?;
        Ok(result.data.unwrap_or_default())
    }

    pub async fn execute(&mut self, req: TransactionRequest) -> TbResult<TransactionResult> {
        req.validate(&self.cfg)?;
        let result = match req.kind {
            TransactionKind::Write => {
                let cycles = self.write_cycle(req.address, req.data.unwrap_or_default()).await?;
                TransactionResult { data: None, cycles }
            }
            TransactionKind::Read => {
                let (data, cycles) = self.read_cycle(req.address).await?;
                TransactionResult {
                    data: Some(data),
                    cycles,
                }
            }
        };
        debug!(
            "{} {:?} addr={:#x} data={:#x} done after {} cycles",
            SIM_IF.time_str(),
            req.kind,
            req.address,
            result.data.or(req.data).unwrap_or_default(),
            result.cycles
        );
        Ok(result)
    }

    async fn write_cycle(&mut self, address: u64, data: u64) -> TbResult<u32> {
        self.clk.rising_edge().await;
        self.address.set(address)?;
        self.wdata.set(data)?;
        self.write_strobe.set(1)?;
        let mut cycles = 1;
        loop {
            self.clk.rising_edge().await;
            cycles += 1;
            if !self.cfg.write_ack_required() || self.ack.is_high()? {
                break;
            }
        }
        self.write_strobe.set(0)?;
        Ok(cycles)
    }

    async fn read_cycle(&mut self, address: u64) -> TbResult<(u64, u32)> {
        self.clk.rising_edge().await;
        if self.response_valid.is_high()? {
            return Err(TbError::ProtocolRaceFault(format!(
                "response valid at {} with no read outstanding",
                SIM_IF.time_str()
            )));
        }
        self.address.set(address)?;
        self.read_strobe.set(1)?;
        let mut cycles = 1;
        let data = loop {
            self.clk.rising_edge().await;
            cycles += 1;
            // first asserted cycle wins, nothing is sampled after it
            if self.response_valid.is_high()? {
                break self.rdata.value()?;
            }
        };
        self.read_strobe.set(0)?;
        Ok((data, cycles))
    }
}
