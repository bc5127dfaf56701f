//! Name resolution passes: the symbol resolver and the non-local resolver.
//!
//! The symbol resolver attaches a symbol to every identifier, materialising
//! `Nonlocal` symbols for captures and registering function literals.
//! Bodies of nested functions are postponed until the enclosing block has
//! been fully processed, so sibling names defined later in the block are
//! visible inside them.
//!
//! The non-local resolver flattens multi-hop captures into single hops,
//! unwraps captures of capture-free functions into direct function
//! references, renumbers non-local indices and converts definitions of
//! capture-free function literals into plain `Function` symbols.

use crate::{
    ast::{Block, Expression, FunctionExpr, Statement},
    error::{ErrorKind, ScriptResult},
    module::{Function, ModuleId, ModuleManager},
    parse::{SourceInfo, SourceText},
    symtab::{Index, Symbol, SymbolKind, SymbolRef, TableId, NO_INDEX},
};

/// Runs the symbol resolver over a function body.
pub fn resolve_symbols(
    manager: &mut ModuleManager,
    module_id: ModuleId,
    fn_idx: Index,
    block: &mut Block,
    source: &SourceText,
) -> ScriptResult<()> {
    let mut resolver = SymbolResolver {
        manager,
        module_id,
        source,
    };
    resolver.process_block(fn_idx, block)
}

struct SymbolResolver<'a> {
    manager: &'a mut ModuleManager,
    module_id: ModuleId,
    source: &'a SourceText,
}

impl SymbolResolver<'_> {
    fn process_block(&mut self, fn_idx: Index, block: &mut Block) -> ScriptResult<()> {
        let symtab = self.manager.get(self.module_id).function(fn_idx).symtab();
        block.symtab = Some(symtab);
        // first pass: resolve names, register nested functions shallowly
        for stmt in &mut block.statements {
            self.resolve_statement(fn_idx, stmt)?;
        }
        // second pass: descend into the postponed nested bodies, so all
        // siblings registered above are visible inside them
        for stmt in &mut block.statements {
            match stmt {
                Statement::Definition(def) => self.descend(&mut def.expression)?,
                Statement::Invocation(inv) => self.descend(&mut inv.expression)?,
                Statement::Return(ret) => self.descend(&mut ret.expression)?,
            }
        }
        Ok(())
    }

    fn resolve_statement(&mut self, fn_idx: Index, stmt: &mut Statement) -> ScriptResult<()> {
        match stmt {
            Statement::Definition(def) => {
                let name = def.variable.identifier.name.clone();
                let symtab = self.current_symtab(fn_idx);
                if self.tables().table(symtab).find_by_name(&name).is_some() {
                    return Err(ErrorKind::MultipleDeclaration { name }.into());
                }
                let idx = self
                    .tables_mut()
                    .add_symbol(symtab, Symbol::new(name.clone(), SymbolKind::Value, NO_INDEX));
                let sym_ref = SymbolRef {
                    module: self.module_id,
                    table: symtab,
                    index: idx,
                };
                def.variable.identifier.symbol = Some(sym_ref);
                self.resolve_expression(fn_idx, &mut def.expression, Some((name, sym_ref)))
            }
            Statement::Invocation(inv) => self.resolve_expression(fn_idx, &mut inv.expression, None),
            Statement::Return(ret) => self.resolve_expression(fn_idx, &mut ret.expression, None),
        }
    }

    fn resolve_expression(
        &mut self,
        fn_idx: Index,
        expr: &mut Expression,
        definition: Option<(String, SymbolRef)>,
    ) -> ScriptResult<()> {
        match expr {
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Char(_)
            | Expression::StringLit(_)
            | Expression::Literal(_) => Ok(()),
            Expression::Tuple(tuple) => {
                for item in &mut tuple.items {
                    self.resolve_expression(fn_idx, item, None)?;
                }
                Ok(())
            }
            Expression::List(list) => {
                for item in &mut list.items {
                    self.resolve_expression(fn_idx, item, None)?;
                }
                Ok(())
            }
            Expression::Reference(reference) => {
                let si = reference.source_info;
                reference.identifier.symbol = Some(self.resolve_symbol(fn_idx, &reference.identifier.name, si)?);
                Ok(())
            }
            Expression::Call(call) => {
                self.resolve_expression(fn_idx, &mut call.callable, None)?;
                for arg in &mut call.args {
                    self.resolve_expression(fn_idx, arg, None)?;
                }
                Ok(())
            }
            Expression::OpCall(opcall) => {
                let si = opcall.source_info;
                let name = opcall
                    .op
                    .builtin_fn_name()
                    .ok_or_else(|| ErrorKind::UnsupportedOperands {
                        op: opcall.op.to_cstr().to_owned(),
                    })?;
                let mut identifier = crate::ast::Identifier::new(name);
                identifier.symbol = Some(self.resolve_symbol(fn_idx, name, si)?);
                opcall.identifier = Some(identifier);
                for arg in &mut opcall.args {
                    self.resolve_expression(fn_idx, arg, None)?;
                }
                Ok(())
            }
            Expression::Condition(cond) => {
                self.resolve_expression(fn_idx, &mut cond.cond, None)?;
                self.resolve_expression(fn_idx, &mut cond.then_expr, None)?;
                self.resolve_expression(fn_idx, &mut cond.else_expr, None)
            }
            Expression::Function(func) => self.register_function(fn_idx, func, definition),
        }
    }

    /// Registers a function literal: names the scope, enters parameters,
    /// creates the `Function` — the body itself is postponed.
    fn register_function(
        &mut self,
        fn_idx: Index,
        func: &mut FunctionExpr,
        definition: Option<(String, SymbolRef)>,
    ) -> ScriptResult<()> {
        let mut name = if func.type_ast.params.is_empty() {
            "<block>".to_owned()
        } else {
            "<lambda>".to_owned()
        };
        if let Some((def_name, def_ref)) = &definition {
            name = def_name.clone();
            self.symbol_mut(*def_ref).set_callable(true);
        }
        let parent_symtab = self.current_symtab(fn_idx);
        let child = self.tables_mut().add_child(parent_symtab, name);
        for (i, param) in func.type_ast.params.iter_mut().enumerate() {
            if let Some(ident) = &mut param.identifier {
                let idx = self
                    .tables_mut()
                    .add_symbol(child, Symbol::new(ident.name.clone(), SymbolKind::Parameter, i as Index));
                ident.symbol = Some(SymbolRef {
                    module: self.module_id,
                    table: child,
                    index: idx,
                });
            }
        }
        let function = Function::new(self.module_id, child);
        let new_idx = self.manager.get_mut(self.module_id).add_function(function);
        self.tables_mut().table_mut(child).set_function(new_idx);
        func.index = Some(new_idx);
        func.body.symtab = Some(child);
        Ok(())
    }

    /// Second pass: find function literals and process their bodies.
    fn descend(&mut self, expr: &mut Expression) -> ScriptResult<()> {
        match expr {
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Char(_)
            | Expression::StringLit(_)
            | Expression::Literal(_)
            | Expression::Reference(_) => Ok(()),
            Expression::Tuple(tuple) => {
                for item in &mut tuple.items {
                    self.descend(item)?;
                }
                Ok(())
            }
            Expression::List(list) => {
                for item in &mut list.items {
                    self.descend(item)?;
                }
                Ok(())
            }
            Expression::Call(call) => {
                self.descend(&mut call.callable)?;
                for arg in &mut call.args {
                    self.descend(arg)?;
                }
                Ok(())
            }
            Expression::OpCall(opcall) => {
                for arg in &mut opcall.args {
                    self.descend(arg)?;
                }
                Ok(())
            }
            Expression::Condition(cond) => {
                self.descend(&mut cond.cond)?;
                self.descend(&mut cond.then_expr)?;
                self.descend(&mut cond.else_expr)
            }
            Expression::Function(func) => {
                let nested_idx = func.index.expect("function literal registered in first pass");
                self.process_block(nested_idx, &mut func.body)
            }
        }
    }

    /// Name lookup: intrinsics fast path, scope chain upward with recursion
    /// sentinel and non-local materialisation, then the module root, then
    /// imported modules in order. First hit wins.
    fn resolve_symbol(&mut self, fn_idx: Index, name: &str, si: SourceInfo) -> ScriptResult<SymbolRef> {
        // intrinsics live in the builtin module; skip the scope walk
        if name.len() > 3 && name.starts_with("__") {
            let builtin = self.manager.get(self.module_id).imported_module(0);
            if let Some(idx) = self
                .manager
                .get(builtin)
                .symtabs()
                .table(TableId::ROOT)
                .find_by_name(name)
            {
                return Ok(SymbolRef {
                    module: builtin,
                    table: TableId::ROOT,
                    index: idx,
                });
            }
        }

        // scope chain, from the current function upward
        let current = self.current_symtab(fn_idx);
        let mut table = current;
        let mut depth: u32 = 0;
        loop {
            let t = self.tables().table(table);
            if t.name() == name && t.parent().is_some() {
                // self-reference: recursion sentinel pointing at the
                // defining symbol in the parent scope
                let parent = t.parent().unwrap();
                if let Some(pidx) = self.tables().table(parent).find_by_name(name) {
                    let target = SymbolRef {
                        module: self.module_id,
                        table: parent,
                        index: pidx,
                    };
                    let idx = self.tables_mut().add_symbol(
                        current,
                        Symbol::new(name, SymbolKind::Function, NO_INDEX)
                            .with_depth(depth + 1)
                            .with_ref(target),
                    );
                    return Ok(SymbolRef {
                        module: self.module_id,
                        table: current,
                        index: idx,
                    });
                }
            }
            if let Some(idx) = t.find_by_name(name) {
                let target = SymbolRef {
                    module: self.module_id,
                    table,
                    index: idx,
                };
                // module-level hits are statics/functions, not captures
                if depth > 0 && t.function().is_some() {
                    let nl_idx = self.tables_mut().add_symbol(
                        current,
                        Symbol::new(name, SymbolKind::Nonlocal, NO_INDEX)
                            .with_depth(depth)
                            .with_ref(target),
                    );
                    return Ok(SymbolRef {
                        module: self.module_id,
                        table: current,
                        index: nl_idx,
                    });
                }
                return Ok(target);
            }
            match t.parent() {
                Some(parent) => {
                    table = parent;
                    depth += 1;
                }
                None => break,
            }
        }

        // imported modules, in import order
        let imports = self.manager.get(self.module_id).imports().to_vec();
        for import in imports {
            if let Some(idx) = self
                .manager
                .get(import)
                .symtabs()
                .table(TableId::ROOT)
                .find_by_name(name)
            {
                return Ok(SymbolRef {
                    module: import,
                    table: TableId::ROOT,
                    index: idx,
                });
            }
        }

        Err(crate::error::ScriptError::new(ErrorKind::UndefinedName { name: name.to_owned() })
            .at(self.source.location(si)))
    }

    fn current_symtab(&self, fn_idx: Index) -> TableId {
        self.manager.get(self.module_id).function(fn_idx).symtab()
    }

    fn tables(&self) -> &crate::symtab::SymbolTables {
        self.manager.get(self.module_id).symtabs()
    }

    fn tables_mut(&mut self) -> &mut crate::symtab::SymbolTables {
        self.manager.get_mut(self.module_id).symtabs_mut()
    }

    fn symbol_mut(&mut self, sym_ref: SymbolRef) -> &mut Symbol {
        self.manager
            .get_mut(sym_ref.module)
            .symtabs_mut()
            .table_mut(sym_ref.table)
            .get_mut(sym_ref.index)
    }
}

// --- non-local resolver ---

/// Runs the non-local resolver over a function body.
pub fn resolve_nonlocals(
    manager: &mut ModuleManager,
    module_id: ModuleId,
    fn_idx: Index,
    block: &mut Block,
) -> ScriptResult<()> {
    let mut resolver = NonlocalResolver { manager, module_id };
    resolver.process_block(fn_idx, block)
}

struct NonlocalResolver<'a> {
    manager: &'a mut ModuleManager,
    module_id: ModuleId,
}

impl NonlocalResolver<'_> {
    fn process_block(&mut self, fn_idx: Index, block: &mut Block) -> ScriptResult<()> {
        for stmt in &mut block.statements {
            match stmt {
                Statement::Definition(def) => {
                    let def_sym = def.variable.identifier.symbol;
                    self.visit(fn_idx, &mut def.expression, def_sym)?;
                }
                Statement::Invocation(inv) => self.visit(fn_idx, &mut inv.expression, None)?,
                Statement::Return(ret) => self.visit(fn_idx, &mut ret.expression, None)?,
            }
        }
        let symtab = self.manager.get(self.module_id).function(fn_idx).symtab();
        self.manager
            .get_mut(self.module_id)
            .symtabs_mut()
            .table_mut(symtab)
            .update_nonlocal_indices();
        Ok(())
    }

    fn visit(&mut self, fn_idx: Index, expr: &mut Expression, def_sym: Option<SymbolRef>) -> ScriptResult<()> {
        match expr {
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Char(_)
            | Expression::StringLit(_)
            | Expression::Literal(_)
            | Expression::Reference(_) => Ok(()),
            Expression::Tuple(tuple) => {
                for item in &mut tuple.items {
                    self.visit(fn_idx, item, None)?;
                }
                Ok(())
            }
            Expression::List(list) => {
                for item in &mut list.items {
                    self.visit(fn_idx, item, None)?;
                }
                Ok(())
            }
            Expression::Call(call) => {
                self.visit(fn_idx, &mut call.callable, None)?;
                for arg in &mut call.args {
                    self.visit(fn_idx, arg, None)?;
                }
                Ok(())
            }
            Expression::OpCall(opcall) => {
                for arg in &mut opcall.args {
                    self.visit(fn_idx, arg, None)?;
                }
                Ok(())
            }
            Expression::Condition(cond) => {
                self.visit(fn_idx, &mut cond.cond, None)?;
                self.visit(fn_idx, &mut cond.then_expr, None)?;
                self.visit(fn_idx, &mut cond.else_expr, None)
            }
            Expression::Function(func) => self.visit_function(fn_idx, func, def_sym),
        }
    }

    fn visit_function(
        &mut self,
        fn_idx: Index,
        func: &mut FunctionExpr,
        def_sym: Option<SymbolRef>,
    ) -> ScriptResult<()> {
        let child_idx = func.index.expect("function literal registered");
        // resolve the nested body first so grandchild captures have already
        // been flattened into the child
        self.process_block(child_idx, &mut func.body)?;

        let child_table = self.manager.get(self.module_id).function(child_idx).symtab();
        let parent_table = self.manager.get(self.module_id).function(fn_idx).symtab();
        let num_symbols = self
            .manager
            .get(self.module_id)
            .symtabs()
            .table(child_table)
            .symbols()
            .len();

        for i in 0..num_symbols {
            let (kind, depth, reference) = {
                let sym = self.manager.get(self.module_id).symtabs().table(child_table).get(i as Index);
                (sym.kind(), sym.depth(), sym.reference())
            };
            match kind {
                SymbolKind::Nonlocal => {
                    let target_ref = reference.expect("non-local has a target");
                    let target = self.symbol_clone(target_ref);
                    if target.kind() == SymbolKind::Function {
                        // the captured name is itself a capture-free
                        // function: no value to close over, reference it
                        // directly
                        let sym = self.child_symbol_mut(child_table, i as Index);
                        sym.set_kind(SymbolKind::Function);
                        sym.set_index(target.index());
                        sym.set_depth(0);
                        sym.set_ref(target.reference());
                    } else if depth > 1 {
                        // not the direct parent: add an intermediate hop
                        let nl_idx = self.manager.get_mut(self.module_id).symtabs_mut().add_symbol(
                            parent_table,
                            Symbol::new(target.name(), SymbolKind::Nonlocal, NO_INDEX)
                                .with_depth(depth - 1)
                                .with_ref(target_ref),
                        );
                        let hop = SymbolRef {
                            module: self.module_id,
                            table: parent_table,
                            index: nl_idx,
                        };
                        let sym = self.child_symbol_mut(child_table, i as Index);
                        sym.set_depth(1);
                        sym.set_ref(Some(hop));
                    }
                }
                SymbolKind::Function => {
                    // unwrap a recursion sentinel once its target has
                    // become a plain function
                    if let Some(target_ref) = reference {
                        let target = self.symbol_clone(target_ref);
                        if target.kind() == SymbolKind::Function {
                            self.child_symbol_mut(child_table, i as Index).set_index(target.index());
                        }
                    }
                }
                _ => {}
            }
        }

        let tables = self.manager.get_mut(self.module_id).symtabs_mut();
        tables.table_mut(child_table).update_nonlocal_indices();
        let captures = tables.table(child_table).count_nonlocals();
        tables.table_mut(parent_table).update_nonlocal_indices();

        if let Some(def_ref) = def_sym {
            if captures == 0 {
                let sym = self.symbol_mut(def_ref);
                sym.set_kind(SymbolKind::Function);
                sym.set_index(child_idx);
            }
        }
        Ok(())
    }

    fn symbol_clone(&self, sym_ref: SymbolRef) -> Symbol {
        self.manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .get(sym_ref.index)
            .clone()
    }

    fn symbol_mut(&mut self, sym_ref: SymbolRef) -> &mut Symbol {
        self.manager
            .get_mut(sym_ref.module)
            .symtabs_mut()
            .table_mut(sym_ref.table)
            .get_mut(sym_ref.index)
    }

    fn child_symbol_mut(&mut self, table: TableId, index: Index) -> &mut Symbol {
        self.manager
            .get_mut(self.module_id)
            .symtabs_mut()
            .table_mut(table)
            .get_mut(index)
    }
}
