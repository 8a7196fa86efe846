mod common;

use common::*;
use wbtb::prelude::*;
use wbtb::testbench::{BusProbe, Scoreboard};

#[test]
fn write_without_ack_spans_two_rising_edges() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (elapsed, seen) = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;

                let start = SIM_IF.get_sim_time_steps();
                bfm.write(0x10, 0xABCD).await?;
                let elapsed = SIM_IF.get_sim_time_steps() - start;
                utils::clock_cycles(dut.c("clk"), 2).await;
                Ok::<_, TbError>((elapsed, probe))
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(elapsed, 2 * PERIOD_PS);
    assert_eq!(seen.high_runs(|s| s.write_strobe), vec![1]);
    assert!(seen.samples().iter().all(|s| !s.read_strobe && !s.response_valid));
    assert_eq!(dut.c("address").u64(), 0x10);
    assert_eq!(dut.c("wdata").u64(), 0xABCD);
}

#[test]
fn read_returns_address_plus_one() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (result, seen, stats) = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;

                bfm.write(0x10, 0xABCD).await?;
                let result = bfm.execute(TransactionRequest::read(0x10)).await?;
                utils::clock_cycles(dut.c("clk"), 3).await;
                Ok::<_, TbError>((result, probe, seq.monitor_stats().snapshot()))
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(
        result,
        TransactionResult {
            data: Some(0x11),
            cycles: 2
        }
    );
    assert_eq!(seen.high_runs(|s| s.response_valid), vec![1]);
    assert_eq!(seen.high_runs(|s| s.read_strobe), vec![1]);
    assert_eq!(stats.responses, 1);
    assert_eq!(stats.ignored_in_reset, 0);
}

#[test]
fn write_read_pairs_hit_the_scoreboard() {
    let (mut sim, dut, cfg) = bench(12, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (sb, seen) = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let sb = Scoreboard::new();
                for _ in 0..50 {
                    let addr = utils::rand_int(1 << 12);
                    bfm.write(addr, utils::rand_int(1 << 16)).await?;
                    sb.add_exp((addr + 1) & 0xFFFF);
                    sb.add_recv(bfm.read(addr).await?);
                }
                utils::clock_cycles(dut.c("clk"), 2).await;
                Ok::<_, TbError>((sb, probe))
            },
            LIMIT,
        )
        .unwrap();
    assert!(sb.passed(), "{}", sb.result_str());
    // one response-valid pulse per read, each exactly one period long
    assert_eq!(seen.high_runs(|s| s.response_valid), vec![1; 50]);
    assert_eq!(seen.high_runs(|s| s.write_strobe), vec![1; 50]);
    // the bus never carries a write and a read request at the same time
    assert!(seen.samples().iter().all(|s| !(s.write_strobe && s.read_strobe)));
}

#[test]
fn acked_write_holds_strobe_until_ack() {
    let (mut sim, dut, cfg) = bench(16, 16, true);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (result, seen) = sim
        .run(
            async move {
                probe.spawn();
                Task::spawn(ack_responder(dut), "ack_responder");
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let result = bfm.execute(TransactionRequest::write(0x20, 0x1234)).await?;
                utils::clock_cycles(dut.c("clk"), 2).await;
                Ok::<_, TbError>((result, probe))
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(result, TransactionResult { data: None, cycles: 3 });
    assert_eq!(seen.high_runs(|s| s.write_strobe), vec![2]);
    assert_eq!(seen.high_runs(|s| s.ack), vec![1]);
    // ack is seen on the last edge the strobe is still high
    let samples = seen.samples();
    let acked = samples.iter().find(|s| s.ack).unwrap();
    assert!(acked.write_strobe);
}

#[test]
fn missing_ack_reports_device_unresponsive() {
    let (mut sim, dut, cfg) = bench(16, 16, true);
    let (result, strobe_after) = sim
        .run(
            async move {
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let start = SIM_IF.get_sim_time_steps();
                let result =
                    utils::with_timeout("write", SimDuration::ms(10), bfm.write(0x10, 0xABCD)).await;
                assert_eq!(SIM_IF.get_sim_time_steps() - start, 10_000_000_000);
                Ok::<_, TbError>((result, dut.c("wvalid").u64()))
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(
        result,
        Err(TbError::DeviceUnresponsive {
            operation: "write",
            waited: SimDuration::ms(10)
        })
    );
    // the abandoned write leaves its strobe on the bus
    assert_eq!(strobe_after, 1);
}

#[test]
fn reset_holds_for_configured_cycles() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let harness = HarnessConfig {
        reset_cycles: 3,
        ..HarnessConfig::default()
    };
    let seen = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&harness).await?;
                utils::clock_cycles(dut.c("clk"), 2).await;
                assert_eq!(dut.c("wready").u64(), 1);
                assert_eq!(dut.c("rready").u64(), 1);
                Ok::<_, TbError>(probe)
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(seen.high_runs(|s| !s.rst_n), vec![3]);
    let samples = seen.samples();
    // clock starts low, first rising edge after half a period
    assert_eq!(samples[0].time_ps, PERIOD_PS / 2);
    assert!(samples[3].rst_n);
}

#[test]
fn read_during_reset_is_ignored() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let (result, stats) = sim
        .run(
            async move {
                let mut seq = Sequencer::new(dut, &cfg)?;
                let stats = seq.monitor_stats();
                let mut bfm = Bfm::new(dut, cfg)?;
                let harness = HarnessConfig {
                    reset_cycles: 20,
                    ..HarnessConfig::default()
                };
                let (init, read) = futures::join!(
                    seq.initialize(&harness),
                    utils::with_timeout("read", SimDuration::us(1), bfm.read(0x10))
                );
                init?;
                Ok::<_, TbError>((read, stats.snapshot()))
            },
            LIMIT,
        )
        .unwrap();
    assert!(matches!(result, Err(TbError::DeviceUnresponsive { .. })));
    assert_eq!(stats.responses, 0);
    assert_eq!(stats.ignored_in_reset, 1);
}

#[test]
fn oversized_values_are_rejected_before_driving() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (results, seen) = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let start = SIM_IF.get_sim_time_steps();
                let results = vec![
                    bfm.write(0x1_0000, 0).await,
                    bfm.write(0x10, 0x1_0000).await,
                    bfm.read(0x2_0000).await.map(|_| ()),
                ];
                assert_eq!(SIM_IF.get_sim_time_steps(), start);
                utils::clock_cycles(dut.c("clk"), 2).await;
                Ok::<_, TbError>((results, probe))
            },
            LIMIT,
        )
        .unwrap();
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(TbError::ConfigurationMismatch { width: 16, .. }))));
    assert!(seen.samples().iter().all(|s| !s.write_strobe && !s.read_strobe));
}

#[test]
fn custom_response_function() {
    let (mut sim, dut, cfg) = bench(8, 8, false);
    let (data, stats) = sim
        .run(
            async move {
                let monitor = BusMonitor::new(dut, &cfg)?.with_response(|addr| addr * 2 + 0x100);
                let mut seq = Sequencer::new(dut, &cfg)?.with_monitor(monitor);
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let data = vec![bfm.read(0x10).await?, bfm.read(0xFF).await?];
                Ok::<_, TbError>((data, seq.monitor_stats().snapshot()))
            },
            LIMIT,
        )
        .unwrap();
    // replies are cut to the 8-bit data width
    assert_eq!(data, vec![0x20, 0xFE]);
    assert_eq!(stats.responses, 2);
}

#[test]
fn reset_can_be_reasserted_mid_run() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let probe = BusProbe::new(dut, &cfg).unwrap();
    let (before, after, seen) = sim
        .run(
            async move {
                probe.spawn();
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                let before = bfm.read(0x41).await?;
                seq.reset(2).await?;
                let after = bfm.read(0x42).await?;
                seq.shutdown();
                Ok::<_, TbError>((before, after, probe))
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!((before, after), (0x42, 0x43));
    assert_eq!(seen.high_runs(|s| !s.rst_n), vec![1, 2]);
}

#[test]
fn read_with_response_already_valid_is_a_race() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let result = sim.run(
        async move {
            let clk = dut.c("clk").driver()?;
            Task::spawn(wbtb::sequencer::clock(clk, 100), "clock");
            let stuck = dut.c("rrvalid").driver()?;
            stuck.set(1)?;
            let mut bfm = Bfm::new(dut, cfg)?;
            bfm.read(0x10).await?;
            Ok::<_, TbError>(())
        },
        LIMIT,
    );
    assert!(matches!(result, Err(TbError::ProtocolRaceFault(_))));
}

#[test]
fn withdrawn_read_request_aborts_the_run() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let result = sim.run(
        async move {
            let mut seq = Sequencer::new(dut, &cfg)?;
            seq.initialize(&HarnessConfig::default()).await?;
            let strobe = dut.c("rvalid").driver()?;
            strobe.set(1)?;
            Trigger::timer(SimDuration::ns(20)).await;
            strobe.set(0)?;
            utils::clock_cycles(dut.c("clk"), 5).await;
            Ok::<_, TbError>(())
        },
        LIMIT,
    );
    assert!(matches!(result, Err(TbError::ProtocolRaceFault(_))));
}

#[test]
fn second_master_is_rejected() {
    let (_sim, dut, cfg) = bench(16, 16, false);
    let first = Bfm::new(dut, cfg.clone()).unwrap();
    assert!(matches!(
        Bfm::new(dut, cfg.clone()),
        Err(TbError::MultipleDrivers(_))
    ));
    drop(first);
    assert!(Bfm::new(dut, cfg).is_ok());
}

#[test]
fn port_width_must_match_configuration() {
    let (_sim, dut, _cfg) = bench(16, 16, false);
    let narrow = BusConfig::new(8, 16, false).unwrap();
    assert!(matches!(
        Bfm::new(dut, narrow),
        Err(TbError::PortWidthMismatch { expected: 8, actual: 16, .. })
    ));
}

#[test]
fn held_response_is_captured_on_its_first_cycle() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let data = sim
        .run(
            async move {
                Task::spawn(wbtb::sequencer::clock(dut.c("clk").driver()?, 100), "clock");
                let clk = dut.c("clk");
                let strobe = dut.c("rvalid");
                let valid = dut.c("rrvalid").driver()?;
                let rdata = dut.c("rdata").driver()?;
                // slow device: response valid for two periods, data changing in the second
                Task::spawn(
                    async move {
                        strobe.rising_edge().await;
                        clk.falling_edge().await;
                        valid.set(1)?;
                        rdata.set(0xAA)?;
                        clk.falling_edge().await;
                        rdata.set(0xBB)?;
                        clk.falling_edge().await;
                        valid.set(0)?;
                        Ok::<_, TbError>(())
                    },
                    "slow_device",
                );
                let mut bfm = Bfm::new(dut, cfg)?;
                let data = bfm.read(0x10).await?;
                utils::clock_cycles(clk, 3).await;
                assert_eq!(dut.c("rdata").u64(), 0xBB);
                Ok::<_, TbError>(data)
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(data, 0xAA);
}

#[test]
fn renamed_port_wires() {
    init_logging();
    let names = SignalNames {
        clk: "wb_clk".into(),
        rst_n: "wb_rst_n".into(),
        address: "wb_adr".into(),
        read_strobe: "wb_rd".into(),
        response_valid: "wb_rack".into(),
        rdata: "wb_dat_i".into(),
        ..SignalNames::default()
    };
    let mut sim = Simulator::new();
    let cfg = BusConfig::new(8, 8, false).unwrap().with_signal_names(names);
    let dut = declare_port(&mut sim, &cfg).unwrap();
    assert!(dut.get_child("rvalid").is_err());
    let data = sim
        .run(
            async move {
                let mut seq = Sequencer::new(dut, &cfg)?;
                seq.initialize(&HarnessConfig::default()).await?;
                let mut bfm = Bfm::new(dut, cfg)?;
                bfm.write(0x30, 0x01).await?;
                bfm.read(0x30).await
            },
            LIMIT,
        )
        .unwrap();
    assert_eq!(data, 0x31);
    assert_eq!(dut.c("wb_adr").u64(), 0x30);
}

#[test]
fn zero_clock_period_is_rejected() {
    let (mut sim, dut, cfg) = bench(16, 16, false);
    let harness = HarnessConfig {
        clock_period_ns: 0,
        ..HarnessConfig::default()
    };
    let result = sim.run(
        async move {
            let mut seq = Sequencer::new(dut, &cfg)?;
            seq.initialize(&harness).await
        },
        LIMIT,
    );
    assert!(matches!(result, Err(TbError::InvalidConfig(_))));
}
