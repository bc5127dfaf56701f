//! The interpreter façade: parse, compile, execute.
//!
//! [`Interpreter`] owns the module registry and the heap, glues the
//! pipeline together and exposes `eval`. [`Script`] wraps a parsed source
//! for caching: it serialises with postcard and can be evaluated later.

use crate::{
    ast::Ast,
    builtin,
    bytecode::{self, Machine},
    error::ScriptResult,
    fold,
    heap::{Heap, HeapStats},
    module::{FnRef, Function, ModuleId, ModuleManager},
    object::Object,
    parse::{parse, SourceText},
    resolve,
    symtab::{Symbol, SymbolKind, TableId},
    trace::VmTracer,
    typecheck,
};

/// A parsed source, ready to evaluate or to serialise for caching.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Script {
    name: String,
    source: String,
    ast: Ast,
}

impl Script {
    /// Parses a source text.
    pub fn parse(name: &str, source: &str) -> ScriptResult<Self> {
        let text = SourceText::new(name, source);
        let ast = parse(&text)?;
        Ok(Self {
            name: name.to_owned(),
            source: source.to_owned(),
            ast,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Serialises the parsed script to bytes.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a script serialised with [`Script::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// High-level interpreter: builtin module + main module + heap.
pub struct Interpreter {
    manager: ModuleManager,
    heap: Heap,
    main: ModuleId,
    const_fold: bool,
    eval_count: usize,
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        let mut manager = ModuleManager::new();
        let mut heap = Heap::new();
        let builtin_id = builtin::build(&mut manager, &mut heap);
        let main = manager.add_module("main");
        manager.get_mut(main).add_imported_module(builtin_id);
        Self {
            manager,
            heap,
            main,
            const_fold: false,
            eval_count: 0,
        }
    }

    /// Enables or disables the constant folder.
    pub fn set_const_folding(&mut self, enabled: bool) {
        self.const_fold = enabled;
    }

    /// Parses, compiles and runs one source, returning its value.
    pub fn eval(&mut self, source: &str) -> ScriptResult<Object> {
        self.eval_with(source, |_| {})
    }

    /// Like [`Interpreter::eval`]; additionally hands every invoked
    /// statement value to `on_invoke`.
    pub fn eval_with(&mut self, source: &str, on_invoke: impl FnMut(Object)) -> ScriptResult<Object> {
        let script = Script::parse("<input>", source)?;
        self.eval_script(&script, on_invoke)
    }

    /// Evaluates a previously parsed script.
    pub fn eval_script(&mut self, script: &Script, mut on_invoke: impl FnMut(Object)) -> ScriptResult<Object> {
        let text = SourceText::new(script.name(), script.source());
        let mut ast = script.ast().clone();
        let fn_idx = self.compile_ast(self.main, &mut ast, &text)?;

        let mut machine = Machine::new(&self.manager, &mut self.heap);
        let mut callback = |value: crate::value::Value, heap: &mut Heap| {
            on_invoke(Object::from_value(&value, heap));
            value.decref(heap);
        };
        machine.call(
            FnRef {
                module: self.main,
                function: fn_idx,
            },
            &mut callback,
        )?;
        let return_type = self
            .manager
            .get(self.main)
            .function(fn_idx)
            .signature()
            .return_type
            .clone();
        let value = machine.take_result(&return_type)?;
        drop(machine);
        let object = Object::from_value(&value, &self.heap);
        value.decref(&mut self.heap);
        Ok(object)
    }

    /// Runs eval under a tracer, returning the tracer alongside the value.
    pub fn eval_traced<Tr: VmTracer>(&mut self, source: &str, tracer: Tr) -> ScriptResult<(Object, Tr)> {
        let script = Script::parse("<input>", source)?;
        let text = SourceText::new(script.name(), script.source());
        let mut ast = script.ast().clone();
        let fn_idx = self.compile_ast(self.main, &mut ast, &text)?;

        let mut machine = Machine::with_tracer(&self.manager, &mut self.heap, tracer);
        let mut callback = |value: crate::value::Value, heap: &mut Heap| {
            value.decref(heap);
        };
        machine.call(
            FnRef {
                module: self.main,
                function: fn_idx,
            },
            &mut callback,
        )?;
        let return_type = self
            .manager
            .get(self.main)
            .function(fn_idx)
            .signature()
            .return_type
            .clone();
        let value = machine.take_result(&return_type)?;
        let tracer = machine.into_tracer();
        let object = Object::from_value(&value, &self.heap);
        value.decref(&mut self.heap);
        Ok((object, tracer))
    }

    /// Compiles a module from source and registers it for imports.
    ///
    /// Top-level function definitions are promoted to the module root so
    /// importing code can call them by name.
    pub fn build_module(&mut self, name: &str, source: &str) -> ScriptResult<ModuleId> {
        let text = SourceText::new(name, source);
        let mut ast = parse(&text)?;
        let builtin_id = self.manager.get(self.main).imported_module(0);
        let module_id = self.manager.add_module(name);
        self.manager.get_mut(module_id).add_imported_module(builtin_id);
        let fn_idx = self.compile_ast(module_id, &mut ast, &text)?;

        // promote converted function definitions into the root table
        let main_table = self.manager.get(module_id).function(fn_idx).symtab();
        let promoted: Vec<(String, u32)> = self
            .manager
            .get(module_id)
            .symtabs()
            .table(main_table)
            .symbols()
            .iter()
            .filter(|sym| sym.kind() == SymbolKind::Function && sym.index() != crate::symtab::NO_INDEX)
            .map(|sym| (sym.name().to_owned(), sym.index()))
            .collect();
        for (sym_name, function) in promoted {
            let root = self.manager.get(module_id).symtabs().table(TableId::ROOT);
            if root.find_by_name(&sym_name).is_none() {
                self.manager
                    .get_mut(module_id)
                    .symtabs_mut()
                    .add_symbol(TableId::ROOT, Symbol::new(sym_name, SymbolKind::Function, function));
            }
        }
        Ok(module_id)
    }

    /// Attaches a built module to the main module's import list.
    pub fn add_imported_module(&mut self, module: ModuleId) {
        self.manager.get_mut(self.main).add_imported_module(module);
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Disassembly listing of every function compiled into the main module.
    #[must_use]
    pub fn disassemble_main(&self) -> String {
        let module = self.manager.get(self.main);
        let mut out = String::new();
        for idx in 0..module.num_functions() {
            let function = module.function(idx as u32);
            let name = module
                .symtabs()
                .table(function.symtab())
                .name()
                .to_owned();
            out.push_str(&format!("fn {idx} {name} {}\n", function.signature()));
            out.push_str(&function.code().disassemble());
        }
        out
    }

    #[must_use]
    pub fn main_module(&self) -> ModuleId {
        self.main
    }

    /// Runs the semantic pipeline and the emitter over a parsed body,
    /// returning the entry function's index.
    fn compile_ast(&mut self, module_id: ModuleId, ast: &mut Ast, text: &SourceText) -> ScriptResult<u32> {
        self.eval_count += 1;
        let fn_name = format!("<input:{}>", self.eval_count);
        let table = self
            .manager
            .get_mut(module_id)
            .symtabs_mut()
            .add_child(TableId::ROOT, fn_name);
        let function = Function::new(module_id, table);
        let fn_idx = self.manager.get_mut(module_id).add_function(function);
        self.manager.get_mut(module_id).symtabs_mut().table_mut(table).set_function(fn_idx);

        resolve::resolve_symbols(&mut self.manager, module_id, fn_idx, &mut ast.body, text)?;
        resolve::resolve_nonlocals(&mut self.manager, module_id, fn_idx, &mut ast.body)?;
        typecheck::resolve_types(&mut self.manager, module_id, fn_idx, &mut ast.body, text)?;
        if self.const_fold {
            fold::fold_block(&mut self.manager, module_id, fn_idx, &mut ast.body)?;
        }
        bytecode::compile(&mut self.manager, module_id, &mut self.heap, fn_idx, &ast.body)?;
        Ok(fn_idx)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
