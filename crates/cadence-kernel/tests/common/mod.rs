#![allow(dead_code)]

use cadence_kernel::{BootOptions, Kernel, SchedMode};
use std::sync::{Arc, Mutex};

pub fn boot(mode: SchedMode) -> Kernel {
    let _ = env_logger::builder().is_test(true).try_init();
    Kernel::boot(BootOptions {
        mode,
        power_off: false,
    })
}

/// Event log shared between kernel threads.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}
