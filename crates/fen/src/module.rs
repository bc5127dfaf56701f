//! Modules (translation units) and functions.
//!
//! A module owns its functions, interned static values, registered types
//! and symbol-table arena, plus a list of imported modules by id. Functions
//! reference their module by id and their scope by table id; closures
//! reference functions by `FnRef` rather than pointers so values can be
//! serialised to stack bytes.

use indexmap::IndexMap;

use crate::{
    ast,
    bytecode::Code,
    heap::Heap,
    symtab::{Index, SymbolTables, TableId},
    typeinfo::{Signature, TypeInfo},
    value::Value,
};

/// Position of a module inside the [`ModuleManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Reference to a function: owning module + function index.
///
/// Serialised to the stack as two little-endian u32s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnRef {
    pub module: ModuleId,
    pub function: Index,
}

impl FnRef {
    #[must_use]
    pub fn to_stack_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.module.0.to_le_bytes());
        buf[4..].copy_from_slice(&self.function.to_le_bytes());
        buf
    }

    #[must_use]
    pub fn from_stack_bytes(bytes: [u8; 8]) -> Self {
        Self {
            module: ModuleId(u32::from_le_bytes(bytes[..4].try_into().unwrap())),
            function: u32::from_le_bytes(bytes[4..].try_into().unwrap()),
        }
    }
}

/// A function: signature, bytecode, local-value types and owning scope.
///
/// Calling convention (stack grows down, offsets measured from the frame
/// base): parameters sit below the base in declaration order after the
/// non-locals (first parameter nearest the base), non-locals sit directly
/// below the base (first non-local nearest), locals grow upward from the
/// base as definitions execute.
#[derive(Debug)]
pub struct Function {
    module: ModuleId,
    symtab: TableId,
    signature: Signature,
    /// Types of local values, in definition order.
    values: Vec<TypeInfo>,
    code: Code,
    /// Body awaiting compilation: set for generic specialisations cloned by
    /// the TypeResolver, consumed by the compiler.
    pending_body: Option<ast::Block>,
    /// Resolved body snapshot kept on generic functions so each
    /// specialisation can re-infer a fresh clone.
    ast_body: Option<ast::Block>,
}

impl Function {
    #[must_use]
    pub fn new(module: ModuleId, symtab: TableId) -> Self {
        Self {
            module,
            symtab,
            signature: Signature::default(),
            values: Vec::new(),
            code: Code::new(),
            pending_body: None,
            ast_body: None,
        }
    }

    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    #[must_use]
    pub fn symtab(&self) -> TableId {
        self.symtab
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn signature_mut(&mut self) -> &mut Signature {
        &mut self.signature
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = signature;
    }

    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut Code {
        &mut self.code
    }

    /// Registers a local value slot, returning its index.
    pub fn add_value(&mut self, ti: TypeInfo) -> Index {
        self.values.push(ti);
        (self.values.len() - 1) as Index
    }

    #[must_use]
    pub fn value(&self, idx: Index) -> &TypeInfo {
        &self.values[idx as usize]
    }

    pub fn set_value(&mut self, idx: Index, ti: TypeInfo) {
        self.values[idx as usize] = ti;
    }

    #[must_use]
    pub fn values(&self) -> &[TypeInfo] {
        &self.values
    }

    pub fn set_values(&mut self, values: Vec<TypeInfo>) {
        self.values = values;
    }

    /// Byte size of all local values.
    #[must_use]
    pub fn raw_size_of_values(&self) -> usize {
        self.values.iter().map(TypeInfo::size).sum()
    }

    /// Byte offset of local value `idx` above the frame base.
    #[must_use]
    pub fn value_offset(&self, idx: Index) -> usize {
        self.values[..idx as usize].iter().map(TypeInfo::size).sum()
    }

    #[must_use]
    pub fn parameter(&self, idx: Index) -> &TypeInfo {
        &self.signature.params[idx as usize]
    }

    #[must_use]
    pub fn raw_size_of_parameters(&self) -> usize {
        self.signature.raw_size_of_params()
    }

    #[must_use]
    pub fn parameter_offset(&self, idx: Index) -> usize {
        self.signature.parameter_offset(idx as usize)
    }

    #[must_use]
    pub fn nonlocals(&self) -> &[TypeInfo] {
        &self.signature.nonlocals
    }

    #[must_use]
    pub fn raw_size_of_nonlocals(&self) -> usize {
        self.signature.raw_size_of_nonlocals()
    }

    #[must_use]
    pub fn nonlocal_offset_and_type(&self, idx: Index) -> (usize, &TypeInfo) {
        self.signature.nonlocal_offset_and_type(idx as usize)
    }

    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.signature.is_generic()
    }

    pub fn set_pending_body(&mut self, body: ast::Block) {
        self.pending_body = Some(body);
    }

    pub fn take_pending_body(&mut self) -> Option<ast::Block> {
        self.pending_body.take()
    }

    #[must_use]
    pub fn has_pending_body(&self) -> bool {
        self.pending_body.is_some()
    }

    pub fn set_ast_body(&mut self, body: ast::Block) {
        self.ast_body = Some(body);
    }

    #[must_use]
    pub fn ast_body(&self) -> Option<&ast::Block> {
        self.ast_body.as_ref()
    }
}

/// A translation unit: imports, functions, interned statics, types and the
/// symbol-table arena.
#[derive(Debug)]
pub struct Module {
    name: String,
    id: ModuleId,
    imports: Vec<ModuleId>,
    functions: Vec<Function>,
    values: Vec<Value>,
    types: Vec<TypeInfo>,
    symtabs: SymbolTables,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>, id: ModuleId) -> Self {
        Self {
            name: name.into(),
            id,
            imports: Vec::new(),
            functions: Vec::new(),
            values: Vec::new(),
            types: Vec::new(),
            symtabs: SymbolTables::new("<module>"),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    // --- imports ---

    pub fn add_imported_module(&mut self, module: ModuleId) {
        self.imports.push(module);
    }

    #[must_use]
    pub fn imported_module(&self, idx: Index) -> ModuleId {
        self.imports[idx as usize]
    }

    #[must_use]
    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    /// Position of `module` in the import list.
    #[must_use]
    pub fn imported_module_index(&self, module: ModuleId) -> Option<Index> {
        self.imports.iter().position(|id| *id == module).map(|pos| pos as Index)
    }

    // --- functions ---

    pub fn add_function(&mut self, function: Function) -> Index {
        self.functions.push(function);
        (self.functions.len() - 1) as Index
    }

    #[must_use]
    pub fn function(&self, idx: Index) -> &Function {
        &self.functions[idx as usize]
    }

    pub fn function_mut(&mut self, idx: Index) -> &mut Function {
        &mut self.functions[idx as usize]
    }

    #[must_use]
    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    // --- static values ---

    /// Interns a static value: an existing equal value is reused (releasing
    /// `value`'s slots), otherwise the value is appended.
    pub fn add_value(&mut self, value: Value, heap: &mut Heap) -> Index {
        if let Some(pos) = self.values.iter().position(|v| v.content_eq(&value, heap)) {
            value.decref(heap);
            return pos as Index;
        }
        self.values.push(value);
        (self.values.len() - 1) as Index
    }

    #[must_use]
    pub fn value(&self, idx: Index) -> &Value {
        &self.values[idx as usize]
    }

    #[must_use]
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    // --- types ---

    pub fn add_type(&mut self, ti: TypeInfo) -> Index {
        self.types.push(ti);
        (self.types.len() - 1) as Index
    }

    #[must_use]
    pub fn get_type(&self, idx: Index) -> &TypeInfo {
        &self.types[idx as usize]
    }

    // --- symbol tables ---

    #[must_use]
    pub fn symtabs(&self) -> &SymbolTables {
        &self.symtabs
    }

    pub fn symtabs_mut(&mut self) -> &mut SymbolTables {
        &mut self.symtabs
    }
}

/// Registry of all modules known to one interpreter.
///
/// Module 0 is always the builtin module.
#[derive(Debug)]
pub struct ModuleManager {
    modules: Vec<Module>,
    by_name: IndexMap<String, ModuleId, ahash::RandomState>,
}

impl ModuleManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            by_name: IndexMap::default(),
        }
    }

    /// Reserves the next module id and registers an empty module for it.
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module::new(name, id));
        self.by_name.insert(name.to_owned(), id);
        id
    }

    #[must_use]
    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    /// Convenience accessor for a function through a [`FnRef`].
    #[must_use]
    pub fn function(&self, fn_ref: FnRef) -> &Function {
        self.get(fn_ref.module).function(fn_ref.function)
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_values_are_interned() {
        let mut heap = Heap::new();
        let mut module = Module::new("m", ModuleId(1));
        let a = module.add_value(Value::Int32(42), &mut heap);
        let b = module.add_value(Value::Int32(42), &mut heap);
        let c = module.add_value(Value::Int32(43), &mut heap);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let s1 = Value::string("ab", &mut heap);
        let s2 = Value::string("ab", &mut heap);
        let i1 = module.add_value(s1, &mut heap);
        let i2 = module.add_value(s2, &mut heap);
        assert_eq!(i1, i2);
        assert_eq!(module.num_values(), 3);
    }

    #[test]
    fn fn_ref_stack_bytes_roundtrip() {
        let fn_ref = FnRef {
            module: ModuleId(2),
            function: 7,
        };
        assert_eq!(FnRef::from_stack_bytes(fn_ref.to_stack_bytes()), fn_ref);
    }
}
