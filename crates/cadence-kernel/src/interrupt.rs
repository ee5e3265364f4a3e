//! Interrupt level and external interrupt delivery for the emulated CPU.
//!
//! Interrupts are delivered synchronously on the running kernel thread via
//! [`Kernel::interrupt`]. While a handler runs the kernel is in interrupt
//! context: blocking primitives are fatal and yielding is deferred until the
//! handler returns.

use crate::{kassert, Kernel};
use core::fmt;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

impl fmt::Display for IntrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrLevel::On => write!(f, "on"),
            IntrLevel::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct InterruptState {
    pub(crate) level: IntrLevel,
    /// Inside an external interrupt handler.
    pub(crate) in_external: bool,
    pub(crate) yield_on_return: bool,
}

impl InterruptState {
    pub(crate) const fn new() -> Self {
        Self {
            level: IntrLevel::On,
            in_external: false,
            yield_on_return: false,
        }
    }

    pub(crate) fn set_level(&mut self, level: IntrLevel) -> IntrLevel {
        core::mem::replace(&mut self.level, level)
    }
}

impl Kernel {
    pub fn intr_get_level(&self) -> IntrLevel {
        self.lock_state().intr.level
    }

    /// Sets the interrupt level and returns the previous one.
    pub fn intr_set_level(&self, level: IntrLevel) -> IntrLevel {
        match level {
            IntrLevel::On => self.intr_enable(),
            IntrLevel::Off => self.intr_disable(),
        }
    }

    pub fn intr_enable(&self) -> IntrLevel {
        let mut st = self.lock_state();
        kassert!(
            !st.intr.in_external,
            "interrupts cannot be enabled inside an interrupt handler"
        );
        st.intr.set_level(IntrLevel::On)
    }

    pub fn intr_disable(&self) -> IntrLevel {
        self.lock_state().intr.set_level(IntrLevel::Off)
    }

    /// True while an external interrupt handler is running.
    pub fn in_interrupt_context(&self) -> bool {
        self.lock_state().intr.in_external
    }

    /// Asks for the interrupted thread to yield once the current handler
    /// returns.
    pub fn intr_yield_on_return(&self) {
        let mut st = self.lock_state();
        kassert!(
            st.intr.in_external,
            "intr_yield_on_return outside an interrupt handler"
        );
        st.intr.yield_on_return = true;
    }

    /// Delivers one external interrupt to the running thread.
    ///
    /// Interrupts must be enabled. `handler` runs in interrupt context with
    /// interrupts off; when it returns the previous level is restored and,
    /// if the handler asked for it, the interrupted thread yields.
    pub fn interrupt<F>(&self, name: &str, handler: F)
    where
        F: FnOnce(&Kernel),
    {
        {
            let mut st = self.lock_state();
            kassert!(!st.intr.in_external, "nested external interrupt `{}'", name);
            kassert!(
                st.intr.level == IntrLevel::On,
                "interrupt `{}' delivered with interrupts disabled",
                name
            );
            trace!("interrupt `{}' on {:?}", name, st.threads.current_thread);
            st.intr.in_external = true;
            st.intr.yield_on_return = false;
            st.intr.set_level(IntrLevel::Off);
        }

        handler(self);

        let mut st = self.lock_state();
        st.intr.in_external = false;
        st.intr.set_level(IntrLevel::On);
        if core::mem::take(&mut st.intr.yield_on_return) {
            let st = self.yield_current_thread(st);
            drop(st);
        }
    }
}
