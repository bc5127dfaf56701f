//! Hierarchical symbol tables.
//!
//! Each module owns an arena of tables; scopes reference each other by
//! `TableId` and symbols by `SymbolRef` (module, table, index) instead of
//! raw pointers. Symbol indices are stable — symbols are only appended.

pub type Index = u32;

/// Sentinel for "index not assigned yet".
pub const NO_INDEX: Index = u32::MAX;

use crate::module::ModuleId;

/// What a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Unresolved,

    // module level
    /// Imported module (index = position in the import list).
    Module,
    /// Function of the module (index = function index).
    Function,
    /// Static value, or local value when the table belongs to a function
    /// scope (index = value index).
    Value,
    /// Named type (index = type index in module).
    TypeName,
    /// Type class declaration (reserved; classes are outside the VM core).
    Class,
    /// Class instance declaration (reserved).
    Instance,
    /// Class method declaration (reserved).
    Method,

    // function scope
    /// Function parameter (index = parameter position).
    Parameter,
    /// Captured value from an enclosing scope (index = position among the
    /// scope's non-locals, assigned by the NonlocalResolver).
    Nonlocal,
    /// Intrinsic instruction; index is the opcode byte.
    Instruction,
    /// Type variable of a generic function (index = variable id).
    TypeVar,
}

/// Location of a symbol: owning module, table within that module's arena,
/// position within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRef {
    pub module: ModuleId,
    pub table: TableId,
    pub index: Index,
}

/// Identifier of a table inside a module's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableId(pub u32);

impl TableId {
    /// The module's root table.
    pub const ROOT: Self = Self(0);
}

/// A named entry in a scope.
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    index: Index,
    /// Scope distance for non-locals and recursion sentinels
    /// (1 = parent, 2 = parent of parent, ...).
    depth: u32,
    /// Referenced symbol (non-local target, recursion target).
    reference: Option<SymbolRef>,
    /// Next candidate in an overload chain (builtin `add_8 -> add_32 -> ...`).
    next: Option<SymbolRef>,
    callable: bool,
}

impl Symbol {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SymbolKind, index: Index) -> Self {
        Self {
            name: name.into(),
            kind,
            index,
            depth: 0,
            reference: None,
            next: None,
            callable: false,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_ref(mut self, reference: SymbolRef) -> Self {
        self.reference = Some(reference);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    #[must_use]
    pub fn index(&self) -> Index {
        self.index
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn reference(&self) -> Option<SymbolRef> {
        self.reference
    }

    #[must_use]
    pub fn next(&self) -> Option<SymbolRef> {
        self.next
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.callable
    }

    pub fn set_kind(&mut self, kind: SymbolKind) {
        self.kind = kind;
    }

    pub fn set_index(&mut self, index: Index) {
        self.index = index;
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    pub fn set_ref(&mut self, reference: Option<SymbolRef>) {
        self.reference = reference;
    }

    pub fn set_next(&mut self, next: SymbolRef) {
        self.next = Some(next);
    }

    pub fn set_callable(&mut self, callable: bool) {
        self.callable = callable;
    }
}

/// One scope: a name, parent link, symbols in insertion order, child scopes.
#[derive(Debug)]
pub struct SymbolTable {
    name: String,
    parent: Option<TableId>,
    symbols: Vec<Symbol>,
    children: Vec<TableId>,
    /// Function owning this scope, when it is a function scope.
    function: Option<Index>,
}

impl SymbolTable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }

    #[must_use]
    pub fn function(&self) -> Option<Index> {
        self.function
    }

    pub fn set_function(&mut self, function: Index) {
        self.function = Some(function);
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut [Symbol] {
        &mut self.symbols
    }

    #[must_use]
    pub fn get(&self, index: Index) -> &Symbol {
        &self.symbols[index as usize]
    }

    pub fn get_mut(&mut self, index: Index) -> &mut Symbol {
        &mut self.symbols[index as usize]
    }

    /// Index of the first symbol with `name`, if any.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Index> {
        self.symbols
            .iter()
            .position(|sym| sym.name == name)
            .map(|pos| pos as Index)
    }

    /// Number of `Nonlocal` symbols in this table.
    #[must_use]
    pub fn count_nonlocals(&self) -> usize {
        self.symbols
            .iter()
            .filter(|sym| sym.kind == SymbolKind::Nonlocal)
            .count()
    }

    /// Renumbers `Nonlocal` symbols so their index matches their position
    /// among non-locals.
    pub fn update_nonlocal_indices(&mut self) {
        let mut idx: Index = 0;
        for sym in &mut self.symbols {
            if sym.kind == SymbolKind::Nonlocal {
                sym.index = idx;
                idx += 1;
            }
        }
    }
}

/// Arena of symbol tables for one module. Table 0 is the module root.
#[derive(Debug)]
pub struct SymbolTables {
    tables: Vec<SymbolTable>,
}

impl SymbolTables {
    /// Creates the arena with a root table.
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            tables: vec![SymbolTable {
                name: root_name.into(),
                parent: None,
                symbols: Vec::new(),
                children: Vec::new(),
                function: None,
            }],
        }
    }

    /// Adds a child scope under `parent`.
    pub fn add_child(&mut self, parent: TableId, name: impl Into<String>) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(SymbolTable {
            name: name.into(),
            parent: Some(parent),
            symbols: Vec::new(),
            children: Vec::new(),
            function: None,
        });
        self.tables[parent.0 as usize].children.push(id);
        id
    }

    #[must_use]
    pub fn table(&self, id: TableId) -> &SymbolTable {
        &self.tables[id.0 as usize]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut SymbolTable {
        &mut self.tables[id.0 as usize]
    }

    /// Appends a symbol, returning its index within the table.
    pub fn add_symbol(&mut self, table: TableId, symbol: Symbol) -> Index {
        let symbols = &mut self.table_mut(table).symbols;
        symbols.push(symbol);
        (symbols.len() - 1) as Index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_children() {
        let mut tables = SymbolTables::new("<module>");
        let child = tables.add_child(TableId::ROOT, "f");
        tables.add_symbol(TableId::ROOT, Symbol::new("x", SymbolKind::Value, 0));
        tables.add_symbol(child, Symbol::new("y", SymbolKind::Parameter, 0));

        assert_eq!(tables.table(TableId::ROOT).find_by_name("x"), Some(0));
        assert_eq!(tables.table(child).find_by_name("x"), None);
        assert_eq!(tables.table(child).parent(), Some(TableId::ROOT));
    }

    #[test]
    fn nonlocal_renumbering() {
        let mut tables = SymbolTables::new("<module>");
        tables.add_symbol(TableId::ROOT, Symbol::new("a", SymbolKind::Parameter, 0));
        tables.add_symbol(TableId::ROOT, Symbol::new("n1", SymbolKind::Nonlocal, NO_INDEX));
        tables.add_symbol(TableId::ROOT, Symbol::new("n2", SymbolKind::Nonlocal, NO_INDEX));
        let table = tables.table_mut(TableId::ROOT);
        table.update_nonlocal_indices();
        assert_eq!(table.get(1).index(), 0);
        assert_eq!(table.get(2).index(), 1);
        assert_eq!(table.count_nonlocals(), 2);
    }
}
