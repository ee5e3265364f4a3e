//! MLFQS formulas.
//!
//! Pure functions: the thread module supplies the inputs and stores the
//! results on its own tick schedule.

use crate::fixed::Fixed;
use crate::thread::PRI_MAX;

/// `PRI_MAX - recent_cpu / 4 - nice * 2`, rounded to the nearest integer.
///
/// Not clamped; the caller keeps the result inside `[PRI_MIN, PRI_MAX]`.
pub fn priority(recent_cpu: Fixed, nice: i32) -> i32 {
    let cpu_share = recent_cpu.div_int(4);
    let nice_share = Fixed::from_int(nice).mul_int(2);
    Fixed::from_int(PRI_MAX)
        .sub(cpu_share)
        .sub(nice_share)
        .to_int_round()
}

/// `59/60 * load_avg + 1/60 * ready_threads`
pub fn load_avg(load_avg: Fixed, ready_threads: i32) -> Fixed {
    let decayed = Fixed::new(59, 60).mul(load_avg);
    let arrivals = Fixed::from_int(ready_threads).div_int(60);
    decayed.add(arrivals)
}

/// `(2 * load_avg) / (2 * load_avg + 1) * recent_cpu + nice`
pub fn recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i32) -> Fixed {
    let twice_load = load_avg.mul_int(2);
    let coefficient = twice_load.div(twice_load.add_int(1));
    coefficient.mul(recent_cpu).add_int(nice)
}
