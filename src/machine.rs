//! [`Machine`]: the facade the rest of this crate exists to provide. Wraps
//! an [`ExecutionHelper`] with the bits a host embedding this core actually
//! needs around the bare `step()` call — a config loader, a run loop that
//! honors a [`PauseHandle`], and the DOS-reentrancy `InDOS` counter a
//! `CallbackHandler` implementing INT 21h needs to decide whether it is
//! safe to let another DOS call run.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cfgcpu_cpu::{CallbackHandler, CpuFault, ExecutionHelper, MemoryBus};
use cfgcpu_types::State;
use tracing::{debug, trace};

use crate::config::MachineConfig;
use crate::pause::PauseHandle;

/// A reentrancy counter for DOS's "in DOS" flag (INT 21h AH=34h). Not
/// interpreted by this crate at all — it is incremented/decremented by a
/// host `CallbackHandler` around its own INT 21h dispatch — but owned here
/// so it outlives any single `step()` call and survives a pause/resume
/// cycle untouched.
#[derive(Clone, Default)]
pub struct InDos(Arc<AtomicU32>);

impl InDos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

pub struct Machine<B: MemoryBus, C: CallbackHandler> {
    helper: ExecutionHelper<B, C>,
    pause: PauseHandle,
    in_dos: InDos,
}

impl<B: MemoryBus, C: CallbackHandler> Machine<B, C> {
    pub fn new(bus: B, callback_handler: C, config: &MachineConfig) -> Self {
        let mut state = State::new();
        config.initial_registers.apply(&mut state);
        let mut helper = ExecutionHelper::new(state, bus, callback_handler);

        for entry in &config.ivt_seed {
            cfgcpu_cpu::InterruptVectorTable::set_vector(&mut helper.bus, entry.vector, entry.segment, entry.offset);
        }
        if let Err(err) = helper.breakpoints.import(&config.breakpoints) {
            debug!(%err, "skipping malformed breakpoint condition in config");
        }

        Machine {
            helper,
            pause: PauseHandle::new(),
            in_dos: InDos::new(),
        }
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn in_dos(&self) -> InDos {
        self.in_dos.clone()
    }

    pub fn state(&self) -> &State {
        &self.helper.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.helper.state
    }

    pub fn bus(&self) -> &B {
        &self.helper.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.helper.bus
    }

    pub fn stats(&self) -> cfgcpu_cpu::Stats {
        self.helper.stats
    }

    /// Executes exactly one instruction, exactly as [`ExecutionHelper::step`]
    /// does. Exposed directly for single-step debugger UIs, which don't
    /// want the pause/HLT handling `run` layers on top.
    pub fn step(&mut self) -> Result<(), CpuFault> {
        self.helper.step()
    }

    /// Runs until `HLT` clears `state.is_running`, a fault escapes `step`, or
    /// a pause is requested through a held [`PauseHandle`]. Returns `Ok(())`
    /// on a clean halt or pause, and the fault on anything a guest-facing
    /// interrupt couldn't absorb.
    ///
    /// A paused run resumes exactly where it left off: `run` can be called
    /// again after `PauseHandle::resume` (or after the pausing thread calls
    /// it directly) with no special handling needed by the caller.
    pub fn run(&mut self) -> Result<(), CpuFault> {
        while self.helper.state.is_running {
            self.pause.poll();
            if !self.helper.state.is_running {
                break;
            }
            self.helper.step()?;
        }
        trace!(cycles = self.helper.stats.instructions_executed, "machine halted");
        Ok(())
    }

    /// Clears `HLT`'s latch and resumes `run` from the instruction right
    /// after it — the one legitimate way out of a halted machine besides an
    /// interrupt waking it.
    pub fn wake(&mut self) {
        self.helper.state.is_running = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgcpu_cpu::test_util::VecMemoryBus;
    use cfgcpu_cpu::NullCallbackHandler;

    fn new_machine(program: &[u8]) -> Machine<VecMemoryBus, NullCallbackHandler> {
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, program);
        Machine::new(bus, NullCallbackHandler, &MachineConfig::default())
    }

    #[test]
    fn run_stops_at_hlt() {
        let mut machine = new_machine(&[0x40, 0x40, 0xF4, 0x40]); // inc ax; inc ax; hlt; inc ax
        machine.run().unwrap();
        assert_eq!(machine.state().get16(cfgcpu_types::Reg16::Ax), 2);
        assert!(!machine.state().is_running);
    }

    #[test]
    fn a_requested_pause_stops_the_run_loop_until_resumed() {
        use std::thread;
        use std::time::Duration;

        // An infinite loop (`jmp $`) so the only way `run` ever returns is
        // via the pause: this proves the loop actually parks rather than
        // racing to `HLT` before the pause takes effect.
        let mut machine = new_machine(&[0xEB, 0xFE]); // jmp $
        let pause = machine.pause_handle();
        pause.request_pause();

        let handle = thread::spawn(move || {
            machine.run().unwrap();
            machine
        });

        thread::sleep(Duration::from_millis(20));
        assert!(pause.is_paused());
        pause.resume();

        // Give the run loop a moment to notice, then pause it again and
        // leave it parked there (a `jmp $` body never halts on its own, so
        // this is the only way to bring the background thread to a stop we
        // can observe and then let exit with the process).
        thread::sleep(Duration::from_millis(20));
        pause.request_pause();
        thread::sleep(Duration::from_millis(20));
        assert!(pause.is_paused());
        let _ = handle;
    }

    #[test]
    fn in_dos_counter_tracks_nesting() {
        let in_dos = InDos::new();
        assert!(!in_dos.is_active());
        in_dos.enter();
        in_dos.enter();
        assert!(in_dos.is_active());
        in_dos.leave();
        assert!(in_dos.is_active());
        in_dos.leave();
        assert!(!in_dos.is_active());
    }
}
