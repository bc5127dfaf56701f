//! The bytecode interpreter.
//!
//! Single-threaded, cooperative: `call` pushes a frame and runs the
//! dispatch loop to completion or error. Reaching the end of a function's
//! code pops the frame; when the frame stack empties, the remaining stack
//! bytes are the return value.

use super::op::Opcode;
use crate::{
    error::{ErrorKind, ScriptResult},
    heap::Heap,
    module::{FnRef, ModuleManager},
    stack::Stack,
    trace::{NoopTracer, VmTracer},
    typeinfo::TypeInfo,
    value::{ClosureV, ListV, StringV, Value},
};

/// Callback invoked for each `Invoke` opcode; receives the invoked value
/// and is responsible for releasing it.
pub type InvokeCallback<'cb> = dyn FnMut(Value, &mut Heap) + 'cb;

/// The virtual machine: stack, frames and a dispatch loop over bytecode.
pub struct Machine<'m, Tr: VmTracer = NoopTracer> {
    manager: &'m ModuleManager,
    heap: &'m mut Heap,
    stack: Stack,
    tracer: Tr,
}

impl<'m> Machine<'m, NoopTracer> {
    pub fn new(manager: &'m ModuleManager, heap: &'m mut Heap) -> Self {
        Self::with_tracer(manager, heap, NoopTracer)
    }
}

impl<'m, Tr: VmTracer> Machine<'m, Tr> {
    pub fn with_tracer(manager: &'m ModuleManager, heap: &'m mut Heap, tracer: Tr) -> Self {
        Self {
            manager,
            heap,
            stack: Stack::new(),
            tracer,
        }
    }

    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    /// Consumes the machine, releasing the heap borrow and returning the
    /// tracer with its recorded state.
    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Calls a function; on return the stack holds exactly the return
    /// value's bytes.
    pub fn call(&mut self, function: FnRef, cb: &mut InvokeCallback) -> ScriptResult<()> {
        self.stack.push_frame(function);
        self.tracer.on_call_enter(function);
        self.run(cb)
    }

    /// Pulls the completed call's return value off the stack.
    pub fn take_result(&mut self, ti: &TypeInfo) -> ScriptResult<Value> {
        self.stack.pull(ti)
    }

    fn run(&mut self, cb: &mut InvokeCallback) -> ScriptResult<()> {
        let mut fn_ref = self.stack.frame().function;
        let mut ip = self.stack.frame().instruction;
        let mut base = self.stack.frame().base;

        loop {
            let code = self.manager.function(fn_ref).code();
            if ip >= code.len() {
                // end of code: return from this frame
                self.tracer.on_call_exit(fn_ref);
                if self.stack.n_frames() == 1 {
                    self.stack.pop_frame();
                    return Ok(());
                }
                self.stack.pop_frame();
                let frame = self.stack.frame();
                fn_ref = frame.function;
                ip = frame.instruction;
                base = frame.base;
                continue;
            }
            let byte = code.bytes()[ip];
            let opcode = Opcode::from_repr(byte).ok_or(ErrorKind::BadInstruction { code: byte })?;
            self.tracer.on_opcode(fn_ref, ip, opcode);
            ip += 1;
            let mut args = [0u8; 2];
            for slot in args.iter_mut().take(opcode.arg_bytes()) {
                *slot = *code
                    .bytes()
                    .get(ip)
                    .ok_or(ErrorKind::BadInstruction { code: byte })?;
                ip += 1;
            }

            match opcode {
                Opcode::Noop => {}

                Opcode::LogicalOr | Opcode::LogicalAnd => {
                    let lhs = self.pull_bool()?;
                    let rhs = self.pull_bool()?;
                    let result = match opcode {
                        Opcode::LogicalOr => lhs || rhs,
                        _ => lhs && rhs,
                    };
                    self.stack.push(&Value::Bool(result), self.heap)?;
                }
                Opcode::LogicalNot => {
                    let operand = self.pull_bool()?;
                    self.stack.push(&Value::Bool(!operand), self.heap)?;
                }

                Opcode::Equal8
                | Opcode::NotEqual8
                | Opcode::LessEqual8
                | Opcode::GreaterEqual8
                | Opcode::LessThan8
                | Opcode::GreaterThan8 => {
                    let lhs = self.pull_byte()?;
                    let rhs = self.pull_byte()?;
                    self.stack.push(&Value::Bool(compare(opcode, &lhs, &rhs)), self.heap)?;
                }
                Opcode::Equal32
                | Opcode::NotEqual32
                | Opcode::LessEqual32
                | Opcode::GreaterEqual32
                | Opcode::LessThan32
                | Opcode::GreaterThan32 => {
                    let lhs = self.pull_i32()?;
                    let rhs = self.pull_i32()?;
                    let op8 = Opcode::from_repr(opcode as u8 - 1).unwrap();
                    self.stack.push(&Value::Bool(compare(op8, &lhs, &rhs)), self.heap)?;
                }
                Opcode::Equal64
                | Opcode::NotEqual64
                | Opcode::LessEqual64
                | Opcode::GreaterEqual64
                | Opcode::LessThan64
                | Opcode::GreaterThan64 => {
                    let lhs = self.pull_i64()?;
                    let rhs = self.pull_i64()?;
                    let op8 = Opcode::from_repr(opcode as u8 - 2).unwrap();
                    self.stack.push(&Value::Bool(compare(op8, &lhs, &rhs)), self.heap)?;
                }

                Opcode::EqualString
                | Opcode::NotEqualString
                | Opcode::LessEqualString
                | Opcode::GreaterEqualString
                | Opcode::LessThanString
                | Opcode::GreaterThanString => {
                    let lhs = self.pull_string()?;
                    let rhs = self.pull_string()?;
                    let lhs_bytes = string_data(&lhs, self.heap);
                    let rhs_bytes = string_data(&rhs, self.heap);
                    let result = match opcode {
                        Opcode::EqualString => lhs_bytes == rhs_bytes,
                        Opcode::NotEqualString => lhs_bytes != rhs_bytes,
                        Opcode::LessEqualString => lhs_bytes <= rhs_bytes,
                        Opcode::GreaterEqualString => lhs_bytes >= rhs_bytes,
                        Opcode::LessThanString => lhs_bytes < rhs_bytes,
                        _ => lhs_bytes > rhs_bytes,
                    };
                    self.heap.decref(lhs.slot);
                    self.heap.decref(rhs.slot);
                    self.stack.push(&Value::Bool(result), self.heap)?;
                }

                Opcode::BitwiseNot8 => {
                    let operand = self.pull_byte()?;
                    self.stack.push(&Value::Byte(!operand), self.heap)?;
                }
                Opcode::BitwiseNot32 => {
                    let operand = self.pull_i32()?;
                    self.stack.push(&Value::Int32(!operand), self.heap)?;
                }
                Opcode::BitwiseNot64 => {
                    let operand = self.pull_i64()?;
                    self.stack.push(&Value::Int64(!operand), self.heap)?;
                }
                Opcode::Neg8 => {
                    let operand = self.pull_byte()?;
                    self.stack.push(&Value::Byte(operand.wrapping_neg()), self.heap)?;
                }
                Opcode::Neg32 => {
                    let operand = self.pull_i32()?;
                    self.stack.push(&Value::Int32(operand.wrapping_neg()), self.heap)?;
                }
                Opcode::Neg64 => {
                    let operand = self.pull_i64()?;
                    self.stack.push(&Value::Int64(operand.wrapping_neg()), self.heap)?;
                }

                Opcode::BitwiseOr8
                | Opcode::BitwiseAnd8
                | Opcode::BitwiseXor8
                | Opcode::ShiftLeft8
                | Opcode::ShiftRight8
                | Opcode::Add8
                | Opcode::Sub8
                | Opcode::Mul8
                | Opcode::Div8
                | Opcode::Mod8
                | Opcode::Exp8 => {
                    let lhs = self.pull_byte()?;
                    let rhs = self.pull_byte()?;
                    self.stack.push(&Value::Byte(binary_u8(opcode, lhs, rhs)), self.heap)?;
                }
                Opcode::BitwiseOr32
                | Opcode::BitwiseAnd32
                | Opcode::BitwiseXor32
                | Opcode::ShiftLeft32
                | Opcode::ShiftRight32
                | Opcode::Add32
                | Opcode::Sub32
                | Opcode::Mul32
                | Opcode::Div32
                | Opcode::Mod32
                | Opcode::Exp32 => {
                    let lhs = self.pull_i32()?;
                    let rhs = self.pull_i32()?;
                    self.stack.push(&Value::Int32(binary_i32(opcode, lhs, rhs)), self.heap)?;
                }
                Opcode::BitwiseOr64
                | Opcode::BitwiseAnd64
                | Opcode::BitwiseXor64
                | Opcode::ShiftLeft64
                | Opcode::ShiftRight64
                | Opcode::Add64
                | Opcode::Sub64
                | Opcode::Mul64
                | Opcode::Div64
                | Opcode::Mod64
                | Opcode::Exp64 => {
                    let lhs = self.pull_i64()?;
                    let rhs = self.pull_i64()?;
                    self.stack.push(&Value::Int64(binary_i64(opcode, lhs, rhs)), self.heap)?;
                }

                Opcode::Subscript32 => {
                    let list = self.pull_list(TypeInfo::Int32)?;
                    let index = self.pull_i32()?;
                    let len = list.length as usize;
                    let mut idx = i64::from(index);
                    if idx < 0 {
                        idx += len as i64;
                    }
                    if idx < 0 || idx as usize >= len {
                        self.heap.decref(list.slot);
                        return Err(ErrorKind::IndexOutOfBounds { index, len }.into());
                    }
                    let offset = idx as usize * 4;
                    let data = self.heap.data(list.slot);
                    let elem = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
                    self.heap.decref(list.slot);
                    self.stack.push(&Value::Int32(elem), self.heap)?;
                }

                Opcode::Execute => {
                    let closure = self.pull_closure()?;
                    let callee = self.manager.function(closure.function);
                    if !closure.slot.is_null() {
                        // spread captured values, last first, so that
                        // non-local 0 ends up on top (nearest the base)
                        let nonlocals = callee.nonlocals().to_vec();
                        let mut offsets = Vec::with_capacity(nonlocals.len());
                        let mut offset = 0usize;
                        for ti in &nonlocals {
                            offsets.push(offset);
                            offset += ti.size();
                        }
                        for (ti, ofs) in nonlocals.iter().zip(&offsets).rev() {
                            let data = self.heap.data(closure.slot);
                            let value = Value::read(ti, &data[*ofs..*ofs + ti.size()]);
                            self.stack.push(&value, self.heap)?;
                        }
                    }
                    self.heap.decref(closure.slot);
                    self.enter_function(closure.function, ip, &mut fn_ref, &mut base);
                    ip = 0;
                }

                Opcode::LoadStatic => {
                    let module = self.manager.get(fn_ref.module);
                    let value = module.value(u32::from(args[0])).make_copy(self.heap);
                    self.stack.push(&value, self.heap)?;
                    value.decref(self.heap);
                }
                Opcode::LoadModule => {
                    let module = self.manager.get(fn_ref.module).imported_module(u32::from(args[0]));
                    self.stack.push(&Value::Module(module), self.heap)?;
                }
                Opcode::LoadFunction => {
                    let target = FnRef {
                        module: fn_ref.module,
                        function: u32::from(args[0]),
                    };
                    self.stack.push(&Value::plain_closure(target), self.heap)?;
                }

                Opcode::Call0 => {
                    let target = FnRef {
                        module: fn_ref.module,
                        function: u32::from(args[0]),
                    };
                    self.enter_function(target, ip, &mut fn_ref, &mut base);
                    ip = 0;
                }
                Opcode::Call1 => {
                    let builtin = self.manager.get(fn_ref.module).imported_module(0);
                    let target = FnRef {
                        module: builtin,
                        function: u32::from(args[0]),
                    };
                    self.enter_function(target, ip, &mut fn_ref, &mut base);
                    ip = 0;
                }
                Opcode::Call => {
                    let module = self.manager.get(fn_ref.module).imported_module(u32::from(args[0]));
                    let target = FnRef {
                        module,
                        function: u32::from(args[1]),
                    };
                    self.enter_function(target, ip, &mut fn_ref, &mut base);
                    ip = 0;
                }

                Opcode::MakeClosure => {
                    let target = FnRef {
                        module: fn_ref.module,
                        function: u32::from(args[0]),
                    };
                    let callee = self.manager.function(target);
                    let nonlocals = callee.nonlocals().to_vec();
                    let total: usize = nonlocals.iter().map(TypeInfo::size).sum();
                    let slot = self.heap.allocate_zeroed(total);
                    // the last-emitted capture is on top: fill slots from
                    // the highest non-local back to non-local 0
                    let mut offset = total;
                    for ti in nonlocals.iter().rev() {
                        offset -= ti.size();
                        let value = self.stack.pull(ti)?;
                        let mut tmp = vec![0u8; ti.size()];
                        value.write(&mut tmp, self.heap);
                        self.heap.data_mut(slot)[offset..offset + ti.size()].copy_from_slice(&tmp);
                        // the write above took an extra count; hand the
                        // pulled copy's count to the slot
                        value.decref(self.heap);
                    }
                    let closure = Value::Closure(ClosureV {
                        function: target,
                        slot,
                    });
                    self.stack.push(&closure, self.heap)?;
                    self.heap.decref(slot);
                }

                Opcode::SetBase => {
                    let level = usize::from(args[0]);
                    base = self.stack.frame_at(self.stack.n_frames() - 1 - level).base;
                }

                Opcode::IncRef => {
                    let id = self.stack.read_slot_id(usize::from(args[0]));
                    self.heap.incref(id);
                }
                Opcode::DecRef => {
                    let pos = usize::from(args[0]);
                    let id = self.stack.read_slot_id(pos);
                    if self.heap.decref(id) {
                        self.stack.clear_slot_id(pos);
                    }
                }

                Opcode::Jump => {
                    ip += usize::from(args[0]);
                }
                Opcode::JumpIfNot => {
                    let cond = self.pull_bool()?;
                    if !cond {
                        ip += usize::from(args[0]);
                    }
                }

                Opcode::Invoke => {
                    let ti = self.manager.get(fn_ref.module).get_type(u32::from(args[0])).clone();
                    let value = self.stack.pull(&ti)?;
                    cb(value, self.heap);
                }

                Opcode::MakeList => {
                    let count = usize::from(args[0]);
                    let elem_size = usize::from(args[1]);
                    let total = count * elem_size;
                    let elem_type = if count > 0 {
                        self.stack.types().last().cloned().unwrap_or_default()
                    } else {
                        TypeInfo::unknown()
                    };
                    let mut data = vec![0u8; total];
                    if total > 0 {
                        // elements sit contiguously on top, first element first
                        data.copy_from_slice(self.stack.top_bytes(total));
                        self.stack.drop_bytes(0, total);
                    }
                    let slot = self.heap.allocate(data);
                    let list = Value::List(ListV {
                        elem_type,
                        length: count as u64,
                        slot,
                    });
                    self.stack.push(&list, self.heap)?;
                    self.heap.decref(slot);
                }

                Opcode::CopyArgument => {
                    let pos = self.stack.to_rel(base) + usize::from(args[0]);
                    self.stack.copy(pos, usize::from(args[1]))?;
                }
                Opcode::CopyVariable => {
                    let pos = self.stack.to_rel(base) - usize::from(args[0]) - usize::from(args[1]);
                    self.stack.copy(pos, usize::from(args[1]))?;
                }
                Opcode::Drop => {
                    self.stack.drop_bytes(usize::from(args[0]), usize::from(args[1]));
                }
            }
        }
    }

    /// Enters `target`: saves the return address in the current frame and
    /// pushes a fresh frame.
    fn enter_function(&mut self, target: FnRef, return_ip: usize, fn_ref: &mut FnRef, base: &mut usize) {
        self.stack.frame_mut().instruction = return_ip;
        self.stack.push_frame(target);
        self.tracer.on_call_enter(target);
        *fn_ref = target;
        *base = self.stack.frame().base;
    }

    fn pull_bool(&mut self) -> ScriptResult<bool> {
        match self.stack.pull(&TypeInfo::Bool)? {
            Value::Bool(v) => Ok(v),
            _ => unreachable!("type stack guarantees a Bool"),
        }
    }

    fn pull_byte(&mut self) -> ScriptResult<u8> {
        match self.stack.pull(&TypeInfo::Byte)? {
            Value::Byte(v) => Ok(v),
            _ => unreachable!("type stack guarantees a Byte"),
        }
    }

    fn pull_i32(&mut self) -> ScriptResult<i32> {
        match self.stack.pull(&TypeInfo::Int32)? {
            Value::Int32(v) => Ok(v),
            _ => unreachable!("type stack guarantees an Int32"),
        }
    }

    fn pull_i64(&mut self) -> ScriptResult<i64> {
        match self.stack.pull(&TypeInfo::Int64)? {
            Value::Int64(v) => Ok(v),
            _ => unreachable!("type stack guarantees an Int64"),
        }
    }

    fn pull_string(&mut self) -> ScriptResult<StringV> {
        match self.stack.pull(&TypeInfo::String)? {
            Value::String(v) => Ok(v),
            _ => unreachable!("type stack guarantees a String"),
        }
    }

    fn pull_list(&mut self, elem: TypeInfo) -> ScriptResult<ListV> {
        match self.stack.pull(&TypeInfo::list_of(elem))? {
            Value::List(v) => Ok(v),
            _ => unreachable!("type stack guarantees a List"),
        }
    }

    fn pull_closure(&mut self) -> ScriptResult<ClosureV> {
        match self.stack.pull(&TypeInfo::function(crate::typeinfo::Signature::default()))? {
            Value::Closure(v) => Ok(v),
            _ => unreachable!("type stack guarantees a Closure"),
        }
    }
}

fn string_data(s: &StringV, heap: &Heap) -> Vec<u8> {
    if s.slot.is_null() {
        Vec::new()
    } else {
        heap.data(s.slot)[..s.size as usize].to_vec()
    }
}

fn compare<T: PartialOrd + PartialEq>(op8: Opcode, lhs: &T, rhs: &T) -> bool {
    match op8 {
        Opcode::Equal8 => lhs == rhs,
        Opcode::NotEqual8 => lhs != rhs,
        Opcode::LessEqual8 => lhs <= rhs,
        Opcode::GreaterEqual8 => lhs >= rhs,
        Opcode::LessThan8 => lhs < rhs,
        _ => lhs > rhs,
    }
}

fn binary_u8(opcode: Opcode, lhs: u8, rhs: u8) -> u8 {
    match opcode {
        Opcode::BitwiseOr8 => lhs | rhs,
        Opcode::BitwiseAnd8 => lhs & rhs,
        Opcode::BitwiseXor8 => lhs ^ rhs,
        Opcode::ShiftLeft8 => lhs.wrapping_shl(u32::from(rhs)),
        Opcode::ShiftRight8 => lhs.wrapping_shr(u32::from(rhs)),
        Opcode::Add8 => lhs.wrapping_add(rhs),
        Opcode::Sub8 => lhs.wrapping_sub(rhs),
        Opcode::Mul8 => lhs.wrapping_mul(rhs),
        Opcode::Div8 => lhs / rhs,
        Opcode::Mod8 => lhs % rhs,
        _ => f64::from(lhs).powf(f64::from(rhs)) as u8,
    }
}

fn binary_i32(opcode: Opcode, lhs: i32, rhs: i32) -> i32 {
    match opcode {
        Opcode::BitwiseOr32 => lhs | rhs,
        Opcode::BitwiseAnd32 => lhs & rhs,
        Opcode::BitwiseXor32 => lhs ^ rhs,
        Opcode::ShiftLeft32 => lhs.wrapping_shl(rhs as u32),
        Opcode::ShiftRight32 => lhs.wrapping_shr(rhs as u32),
        Opcode::Add32 => lhs.wrapping_add(rhs),
        Opcode::Sub32 => lhs.wrapping_sub(rhs),
        Opcode::Mul32 => lhs.wrapping_mul(rhs),
        Opcode::Div32 => lhs.wrapping_div(rhs),
        Opcode::Mod32 => lhs.wrapping_rem(rhs),
        _ => f64::from(lhs).powf(f64::from(rhs)) as i32,
    }
}

fn binary_i64(opcode: Opcode, lhs: i64, rhs: i64) -> i64 {
    match opcode {
        Opcode::BitwiseOr64 => lhs | rhs,
        Opcode::BitwiseAnd64 => lhs & rhs,
        Opcode::BitwiseXor64 => lhs ^ rhs,
        Opcode::ShiftLeft64 => lhs.wrapping_shl(rhs as u32),
        Opcode::ShiftRight64 => lhs.wrapping_shr(rhs as u32),
        Opcode::Add64 => lhs.wrapping_add(rhs),
        Opcode::Sub64 => lhs.wrapping_sub(rhs),
        Opcode::Mul64 => lhs.wrapping_mul(rhs),
        Opcode::Div64 => lhs.wrapping_div(rhs),
        Opcode::Mod64 => lhs.wrapping_rem(rhs),
        _ => (lhs as f64).powf(rhs as f64) as i64,
    }
}
