use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use mlua::{prelude::*, VmState};

// -------------------------------------------------------------------------------------------------

// Limits script execution time and aborts execution when a script runs too long. This way e.g.
// never ending loops are stopped automatically with a timeout error instead of stalling the
// transport.
//
// Checks every few instructions if the timeout duration has been reached and then aborts the
// script by firing an error. Call `reset` before invoking a new script.
#[derive(Debug, Clone)]
pub(crate) struct LuaTimeoutHook {
    timeout: Duration,
    start: Rc<Cell<Instant>>,
    timed_out: Rc<Cell<bool>>,
}

impl LuaTimeoutHook {
    // number of VM instructions between two timeout checks.
    const INSTRUCTION_INTERVAL: u32 = 1000;

    pub(crate) fn new(lua: &Lua, timeout: Duration) -> Self {
        let start = Rc::new(Cell::new(Instant::now()));
        let timed_out = Rc::new(Cell::new(false));
        lua.set_hook(
            LuaHookTriggers::new().every_nth_instruction(Self::INSTRUCTION_INTERVAL),
            {
                let start = Rc::clone(&start);
                let timed_out = Rc::clone(&timed_out);
                move |_lua, _debug| {
                    if start.get().elapsed() > timeout {
                        timed_out.set(true);
                        Err(LuaError::RuntimeError(format!(
                            "Script timeout. Execution took longer than {} ms to complete. \
                             Please check for never ending loops in your script.",
                            timeout.as_millis()
                        )))
                    } else {
                        Ok(VmState::Continue)
                    }
                }
            },
        );
        Self {
            timeout,
            start,
            timed_out,
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    // restart the timer when running a new script
    pub(crate) fn reset(&self) {
        self.start.set(Instant::now());
        self.timed_out.set(false);
    }

    // true when the last run got aborted by the hook
    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out.get()
    }
}
