//! Execution tracing hooks.
//!
//! The machine is generic over a [`VmTracer`]; the default [`NoopTracer`]
//! compiles away. [`StderrTracer`] logs each executed opcode and call
//! boundary, [`RecordingTracer`] collects events for tests.

use crate::{bytecode::Opcode, module::FnRef};

/// One observed execution event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    CallEnter { function: FnRef },
    CallExit { function: FnRef },
    Opcode { function: FnRef, ip: usize, opcode: Opcode },
}

/// Observer of machine execution. All hooks default to no-ops.
pub trait VmTracer {
    fn on_call_enter(&mut self, _function: FnRef) {}
    fn on_call_exit(&mut self, _function: FnRef) {}
    fn on_opcode(&mut self, _function: FnRef, _ip: usize, _opcode: Opcode) {}
}

/// Tracer that observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Tracer that logs to stderr, one line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_call_enter(&mut self, function: FnRef) {
        eprintln!("call  -> {}:{}", function.module.0, function.function);
    }

    fn on_call_exit(&mut self, function: FnRef) {
        eprintln!("call  <- {}:{}", function.module.0, function.function);
    }

    fn on_opcode(&mut self, function: FnRef, ip: usize, opcode: Opcode) {
        eprintln!("exec  {}:{} {ip:4}  {opcode}", function.module.0, function.function);
    }
}

/// Tracer that records every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl VmTracer for RecordingTracer {
    fn on_call_enter(&mut self, function: FnRef) {
        self.events.push(TraceEvent::CallEnter { function });
    }

    fn on_call_exit(&mut self, function: FnRef) {
        self.events.push(TraceEvent::CallExit { function });
    }

    fn on_opcode(&mut self, function: FnRef, ip: usize, opcode: Opcode) {
        self.events.push(TraceEvent::Opcode { function, ip, opcode });
    }
}

impl RecordingTracer {
    /// Number of executed opcodes.
    #[must_use]
    pub fn opcode_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, TraceEvent::Opcode { .. }))
            .count()
    }
}
