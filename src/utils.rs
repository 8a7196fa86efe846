use futures::future::{self, Either};
use futures::pin_mut;
use log::warn;
use rand::Rng;
use std::future::Future;

use crate::signal::SimObject;
use crate::sim_if::{SimDuration, SimIf, SIM_IF};
use crate::trigger::Trigger;
use crate::{TbError, TbResult};

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
}

/// Races `fut` against a timer of `bound`. On expiry the transaction is dropped where it
/// stands (values it already drove stay on the bus) and `DeviceUnresponsive` is returned.
pub async fn with_timeout<T>(
    operation: &'static str,
    bound: SimDuration,
    fut: impl Future<Output = TbResult<T>>,
) -> TbResult<T> {
    let timer = Trigger::timer(bound);
    pin_mut!(fut);
    match future::select(fut, timer).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => {
            warn!("{} {} timed out after {}", SIM_IF.time_str(), operation, bound);
            Err(TbError::DeviceUnresponsive {
                operation,
                waited: bound,
            })
        }
    }
}

/// Uniform in `0..ceil`. Panics if `ceil` is 0.
#[inline]
pub fn rand_int(ceil: u64) -> u64 {
    rand::thread_rng().gen_range(0..ceil)
}
