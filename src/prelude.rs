pub use crate::bfm::Bfm;
pub use crate::bus::{declare_port, TransactionKind, TransactionRequest, TransactionResult};
pub use crate::config::{BusConfig, HarnessConfig, SignalNames, TbConfig};
pub use crate::executor::{JoinHandle, Task};
pub use crate::kernel::Simulator;
pub use crate::monitor::{BusMonitor, MonitorState, MonitorStats};
pub use crate::runner::{run_tests, TestCase, TestReport};
pub use crate::sequencer::Sequencer;
pub use crate::shared::Shared;
pub use crate::signal::{Driver, SimObject};
pub use crate::sim_if::{SimDuration, SimIf, TimeUnit, SIM_IF};
pub use crate::trigger::Trigger;
pub use crate::utils;
pub use crate::{TbError, TbResult};
pub use futures::future::FutureExt;
