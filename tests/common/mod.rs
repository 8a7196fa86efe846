#![allow(dead_code)]

use wbtb::prelude::*;

pub const LIMIT: SimDuration = SimDuration::ms(20);
pub const PERIOD_PS: u64 = 100_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fresh simulator with the bus port of `(address_width, data_width, write_ack_required)`.
pub fn bench(address_width: u32, data_width: u32, ack: bool) -> (Simulator, SimObject, BusConfig) {
    init_logging();
    let mut sim = Simulator::new();
    let cfg = BusConfig::new(address_width, data_width, ack).unwrap();
    let dut = declare_port(&mut sim, &cfg).unwrap();
    (sim, dut, cfg)
}

/// Device stand-in that acknowledges a write strobe for one cycle, one cycle after seeing it.
#[allow(unreachable_code)]
pub async fn ack_responder(dut: SimObject) -> TbResult<()> {
    let clk = dut.c("clk");
    let strobe = dut.c("wvalid");
    let ack = dut.c("ack");
    let ack_drv = ack.driver()?;
    loop {
        clk.rising_edge().await;
        ack_drv.set_bool(strobe.is_high()? && !ack.is_high()?)?;
    }
    Ok(())
}
