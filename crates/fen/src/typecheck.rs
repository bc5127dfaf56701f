//! Type inference and checking.
//!
//! A post-order walk that infers the type of every expression, verifies
//! consistency, resolves overloaded calls through the symbol `next` chain
//! and instantiates specialisations of generic functions.
//!
//! Parameterless function results collapse to their return type, level by
//! level, mirroring the `Execute` unwrapping the compiler emits on return —
//! the static and dynamic views of a value stay in agreement.

use crate::{
    ast::{Block, CallExpr, ConstValue, Expression, FunctionExpr, Identifier, OpCallExpr, Statement, TypeAst},
    builtin,
    error::{ErrorKind, ScriptError, ScriptResult},
    module::{Function, ModuleId, ModuleManager},
    parse::{SourceInfo, SourceText},
    symtab::{Index, Symbol, SymbolKind, SymbolRef, TableId, NO_INDEX},
    typeinfo::{Signature, TypeInfo},
};

/// Runs the type resolver over a function body.
pub fn resolve_types(
    manager: &mut ModuleManager,
    module_id: ModuleId,
    fn_idx: Index,
    block: &mut Block,
    source: &SourceText,
) -> ScriptResult<()> {
    let mut resolver = TypeResolver {
        manager,
        module_id,
        source,
    };
    resolver.process_block(fn_idx, block)
}

struct TypeResolver<'a> {
    manager: &'a mut ModuleManager,
    module_id: ModuleId,
    source: &'a SourceText,
}

impl TypeResolver<'_> {
    fn process_block(&mut self, fn_idx: Index, block: &mut Block) -> ScriptResult<()> {
        let mut return_type = TypeInfo::Void;
        for stmt in &mut block.statements {
            match stmt {
                Statement::Definition(def) => {
                    let sym_ref = def.variable.identifier.symbol.expect("resolved definition");
                    let kind = self.symbol(sym_ref).kind();
                    if kind == SymbolKind::Value {
                        // allocate the local slot up front so recursive
                        // references can see a partial type
                        let value_idx = self.function_mut(fn_idx).add_value(TypeInfo::unknown());
                        self.symbol_mut(sym_ref).set_index(value_idx);
                        let ty = self.resolve_expr(fn_idx, &mut def.expression, Some(sym_ref))?;
                        let ty = self.check_definition_type(def.variable.type_ann.as_ref(), ty)?;
                        self.function_mut(fn_idx).set_value(value_idx, ty);
                    } else {
                        // definition converted to a plain function symbol
                        let ty = self.resolve_expr(fn_idx, &mut def.expression, Some(sym_ref))?;
                        self.check_definition_type(def.variable.type_ann.as_ref(), ty)?;
                    }
                }
                Statement::Invocation(inv) => {
                    let ty = self.resolve_expr(fn_idx, &mut inv.expression, None)?;
                    let type_idx = self.manager.get_mut(self.module_id).add_type(ty);
                    inv.type_index = Some(type_idx);
                }
                Statement::Return(ret) => {
                    return_type = self.resolve_expr(fn_idx, &mut ret.expression, None)?;
                }
            }
        }
        self.resolve_return_type(fn_idx, return_type)?;

        // a parameterless function result is evaluated on return: collapse
        // the declared type accordingly and record the unwrap count for the
        // emitter's Execute instructions
        let declared = self.function(fn_idx).signature().return_type.clone();
        let (collapsed, execs) = collapse_nullary(declared);
        if execs > 0 {
            self.function_mut(fn_idx).signature_mut().return_type = collapsed;
        }
        for stmt in &mut block.statements {
            if let Statement::Return(ret) = stmt {
                ret.unwrap_execs = execs;
            }
        }
        Ok(())
    }

    /// Fills an unresolved declared return type, or verifies it.
    fn resolve_return_type(&mut self, fn_idx: Index, inferred: TypeInfo) -> ScriptResult<()> {
        let declared = self.function(fn_idx).signature().return_type.clone();
        if declared.is_unknown() {
            if inferred.is_unknown() {
                return Err(ErrorKind::MissingExplicitType.into());
            }
            self.function_mut(fn_idx).signature_mut().return_type = inferred;
            return Ok(());
        }
        if declared != inferred {
            return Err(ErrorKind::UnexpectedReturnType {
                expected: declared,
                got: inferred,
            }
            .into());
        }
        Ok(())
    }

    /// Checks an annotated definition and returns the effective type: the
    /// declared type when inference produced an unknown (intrinsics), the
    /// inferred type otherwise.
    fn check_definition_type(&mut self, ann: Option<&TypeAst>, inferred: TypeInfo) -> ScriptResult<TypeInfo> {
        let Some(ann) = ann else { return Ok(inferred) };
        let declared = self.resolve_type_ast(ann)?;
        if let (TypeInfo::Function(decl_sig), TypeInfo::Function(got_sig)) = (&declared, &inferred) {
            if decl_sig.params.len() != got_sig.params.len() {
                return Err(ErrorKind::DefinitionTypeMismatch {
                    expected: declared.clone(),
                    got: inferred.clone(),
                }
                .into());
            }
            for (i, (decl, got)) in decl_sig.params.iter().zip(&got_sig.params).enumerate() {
                if decl != got {
                    return Err(ErrorKind::DefinitionParamTypeMismatch {
                        index: i,
                        expected: decl.clone(),
                        got: got.clone(),
                    }
                    .into());
                }
            }
            if decl_sig.return_type != got_sig.return_type {
                return Err(ErrorKind::DefinitionTypeMismatch {
                    expected: declared.clone(),
                    got: inferred.clone(),
                }
                .into());
            }
            return Ok(inferred);
        }
        if declared != inferred {
            return Err(ErrorKind::DefinitionTypeMismatch {
                expected: declared,
                got: inferred,
            }
            .into());
        }
        if inferred.is_unknown() {
            return Ok(declared);
        }
        Ok(inferred)
    }

    fn resolve_expr(
        &mut self,
        fn_idx: Index,
        expr: &mut Expression,
        definition: Option<SymbolRef>,
    ) -> ScriptResult<TypeInfo> {
        match expr {
            Expression::Integer(_) => Ok(TypeInfo::Int32),
            Expression::Float(_) => Ok(TypeInfo::Float32),
            Expression::Char(_) => Ok(TypeInfo::Char),
            Expression::StringLit(_) => Ok(TypeInfo::String),
            Expression::Literal(lit) => Ok(const_type(&lit.value)),
            Expression::Tuple(tuple) => {
                let mut subtypes = Vec::with_capacity(tuple.items.len());
                for item in &mut tuple.items {
                    subtypes.push(self.resolve_expr(fn_idx, item, None)?);
                }
                Ok(TypeInfo::tuple_of(subtypes))
            }
            Expression::List(list) => {
                let mut elem_type = TypeInfo::unknown();
                for item in &mut list.items {
                    let si = item.source_info();
                    let ty = self.resolve_expr(fn_idx, item, None)?;
                    if elem_type.is_unknown() {
                        elem_type = ty;
                    } else if elem_type != ty {
                        return Err(ScriptError::new(ErrorKind::ListElemTypeMismatch {
                            expected: elem_type,
                            got: ty,
                        })
                        .at(self.source.location(si)));
                    }
                }
                list.elem_size = Some(elem_type.size());
                Ok(TypeInfo::list_of(elem_type))
            }
            Expression::Reference(reference) => {
                let base = self.reference_base_type(fn_idx, &reference.identifier)?;
                Ok(collapse_nullary(base).0)
            }
            Expression::Call(call) => self.resolve_call_expr(fn_idx, call),
            Expression::OpCall(opcall) => self.resolve_opcall_expr(fn_idx, opcall),
            Expression::Condition(cond) => {
                let cond_si = cond.cond.source_info();
                let cond_ty = self.resolve_expr(fn_idx, &mut cond.cond, None)?;
                if cond_ty != TypeInfo::Bool {
                    return Err(ScriptError::new(ErrorKind::ConditionNotBool).at(self.source.location(cond_si)));
                }
                let then_ty = self.resolve_expr(fn_idx, &mut cond.then_expr, None)?;
                let else_ty = self.resolve_expr(fn_idx, &mut cond.else_expr, None)?;
                if then_ty != else_ty {
                    return Err(ErrorKind::BranchTypeMismatch {
                        then_type: then_ty,
                        else_type: else_ty,
                    }
                    .into());
                }
                Ok(then_ty)
            }
            Expression::Function(func) => self.resolve_function_literal(fn_idx, func, definition),
        }
    }

    // --- references ---

    /// The type a reference denotes, before nullary collapse. Updates the
    /// symbol's callable flag.
    fn reference_base_type(&mut self, fn_idx: Index, identifier: &Identifier) -> ScriptResult<TypeInfo> {
        let sym_ref = identifier.symbol.expect("resolved reference");
        let sym = self.symbol(sym_ref).clone();
        let ty = match sym.kind() {
            SymbolKind::Module => TypeInfo::Module,
            SymbolKind::Parameter => self.function(fn_idx).parameter(sym.index()).clone(),
            SymbolKind::Nonlocal => self.nonlocal_target_type(sym_ref)?,
            SymbolKind::Value => {
                if self.is_module_level(sym_ref) {
                    self.manager.get(sym_ref.module).value(sym.index()).type_info()
                } else if sym.index() == NO_INDEX {
                    TypeInfo::unknown()
                } else {
                    self.function(fn_idx).value(sym.index()).clone()
                }
            }
            SymbolKind::Function => match self.resolve_function_target(sym_ref)? {
                FunctionTarget::Function(fn_ref_module, idx) => {
                    TypeInfo::function(self.manager.get(fn_ref_module).function(idx).signature().clone())
                }
                FunctionTarget::ValueSlot(value_idx) => self.function(fn_idx).value(value_idx).clone(),
            },
            SymbolKind::Instruction => {
                return Err(ErrorKind::IntrinsicsFunction {
                    message: format!("intrinsic {} referenced outside a call", identifier.name),
                }
                .into());
            }
            other => {
                return Err(ErrorKind::NotImplemented {
                    what: format!("reference to {other:?} symbol"),
                }
                .into());
            }
        };
        self.symbol_mut(sym_ref).set_callable(ty.is_callable());
        Ok(ty)
    }

    /// Type of a non-local's target, following intermediate hops.
    fn nonlocal_target_type(&mut self, sym_ref: SymbolRef) -> ScriptResult<TypeInfo> {
        let target_ref = self
            .symbol(sym_ref)
            .reference()
            .expect("non-local has a target");
        let target = self.symbol(target_ref).clone();
        let owner_fn = self
            .manager
            .get(target_ref.module)
            .symtabs()
            .table(target_ref.table)
            .function();
        if target.index() == NO_INDEX {
            // target defined later in its block; its type is not known yet
            return Ok(TypeInfo::unknown());
        }
        match (target.kind(), owner_fn) {
            (SymbolKind::Parameter, Some(owner)) => {
                Ok(self.manager.get(target_ref.module).function(owner).parameter(target.index()).clone())
            }
            (SymbolKind::Value, Some(owner)) => {
                Ok(self.manager.get(target_ref.module).function(owner).value(target.index()).clone())
            }
            (SymbolKind::Nonlocal, _) => self.nonlocal_target_type(target_ref),
            _ => Err(ErrorKind::NotImplemented {
                what: "non-local reference target".to_owned(),
            }
            .into()),
        }
    }

    /// Resolves a Function symbol to its function, following recursion
    /// sentinels. A sentinel whose defining symbol is still a local value
    /// resolves to that value slot's (partial) type instead.
    fn resolve_function_target(&self, sym_ref: SymbolRef) -> ScriptResult<FunctionTarget> {
        let mut current = sym_ref;
        loop {
            let sym = self.symbol(current);
            match sym.kind() {
                SymbolKind::Function => {
                    if sym.index() != NO_INDEX {
                        return Ok(FunctionTarget::Function(current.module, sym.index()));
                    }
                    match sym.reference() {
                        Some(next) => current = next,
                        None => {
                            return Err(ErrorKind::NotImplemented {
                                what: "unresolved function reference".to_owned(),
                            }
                            .into());
                        }
                    }
                }
                SymbolKind::Value => return Ok(FunctionTarget::ValueSlot(sym.index())),
                _ => {
                    return Err(ErrorKind::NotImplemented {
                        what: "function reference target".to_owned(),
                    }
                    .into());
                }
            }
        }
    }

    // --- calls ---

    fn resolve_call_expr(&mut self, fn_idx: Index, call: &mut CallExpr) -> ScriptResult<TypeInfo> {
        let mut arg_types = Vec::with_capacity(call.args.len());
        for arg in &mut call.args {
            let si = arg.source_info();
            let ty = self.resolve_expr(fn_idx, arg, None)?;
            arg_types.push((ty, si));
        }
        if let Expression::Reference(reference) = &mut call.callable {
            let mut identifier = std::mem::replace(&mut reference.identifier, Identifier::new(""));
            let result = self.resolve_named_call(fn_idx, &mut identifier, &arg_types, call.source_info);
            reference.identifier = identifier;
            let (ty, execs) = result?;
            call.wrapped_execs = execs;
            Ok(ty)
        } else {
            let base = self.resolve_expr(fn_idx, &mut call.callable, None)?;
            let (ty, execs) = self.consume_params(base, &arg_types)?;
            call.wrapped_execs = execs;
            Ok(ty)
        }
    }

    fn resolve_opcall_expr(&mut self, fn_idx: Index, opcall: &mut OpCallExpr) -> ScriptResult<TypeInfo> {
        let mut arg_types = Vec::with_capacity(opcall.args.len());
        for arg in &mut opcall.args {
            let si = arg.source_info();
            let ty = self.resolve_expr(fn_idx, arg, None)?;
            arg_types.push((ty, si));
        }
        let mut identifier = opcall.identifier.take().expect("op call rewritten by symbol resolver");
        let result = self.resolve_named_call(fn_idx, &mut identifier, &arg_types, opcall.source_info);
        opcall.identifier = Some(identifier);
        Ok(result?.0)
    }

    /// Call through a named symbol: overload resolution for functions,
    /// value-call otherwise.
    fn resolve_named_call(
        &mut self,
        fn_idx: Index,
        identifier: &mut Identifier,
        arg_types: &[(TypeInfo, SourceInfo)],
        si: SourceInfo,
    ) -> ScriptResult<(TypeInfo, usize)> {
        let sym_ref = identifier.symbol.expect("resolved callable");
        let kind = self.symbol(sym_ref).kind();
        match kind {
            SymbolKind::Instruction => {
                // intrinsics bypass type checking entirely
                Ok((TypeInfo::unknown(), 0))
            }
            SymbolKind::Function => {
                if let FunctionTarget::ValueSlot(value_idx) = self.resolve_function_target(sym_ref)? {
                    // recursion through a still-partial definition
                    let base = self.function(fn_idx).value(value_idx).clone();
                    self.symbol_mut(sym_ref).set_callable(base.is_callable());
                    return self.consume_params(base, arg_types);
                }
                self.resolve_overloaded_call(fn_idx, identifier, arg_types, si)
            }
            _ => {
                let base = self.reference_base_type(fn_idx, identifier)?;
                self.consume_params(base, arg_types)
            }
        }
    }

    /// Walks the overload chain off the symbol, specialising generic
    /// candidates and picking the first structural match.
    fn resolve_overloaded_call(
        &mut self,
        fn_idx: Index,
        identifier: &mut Identifier,
        arg_types: &[(TypeInfo, SourceInfo)],
        si: SourceInfo,
    ) -> ScriptResult<(TypeInfo, usize)> {
        let first = identifier.symbol.expect("resolved callable");
        let mut candidate = Some(first);
        while let Some(cand_ref) = candidate {
            let sym = self.symbol(cand_ref).clone();
            let FunctionTarget::Function(cand_module, cand_idx) = self.resolve_function_target(cand_ref)? else {
                candidate = sym.next();
                continue;
            };
            let signature = self.manager.get(cand_module).function(cand_idx).signature().clone();
            if self.manager.get(cand_module).function(cand_idx).is_generic() {
                if cand_module != self.module_id {
                    candidate = sym.next();
                    continue;
                }
                let spec_sig = self.specialize(identifier, cand_idx, arg_types)?;
                return self.consume_params(TypeInfo::function(spec_sig), arg_types);
            }
            if match_params(&signature, arg_types) {
                identifier.symbol = Some(cand_ref);
                self.symbol_mut(cand_ref).set_callable(true);
                return self.consume_params(TypeInfo::function(signature), arg_types);
            }
            candidate = sym.next();
        }

        // no candidate matched: format the chain for the error message
        let mut candidates = String::new();
        let mut walk = Some(first);
        while let Some(cand_ref) = walk {
            let sym = self.symbol(cand_ref).clone();
            if let Ok(FunctionTarget::Function(cand_module, cand_idx)) = self.resolve_function_target(cand_ref) {
                let signature = self.manager.get(cand_module).function(cand_idx).signature();
                candidates.push_str(&format!("   {signature}\n"));
            }
            walk = sym.next();
        }
        let mut args = String::from("| ");
        for (ty, _) in arg_types {
            args.push_str(&format!("{ty} "));
        }
        args.push('|');
        Err(ScriptError::new(ErrorKind::FunctionNotFound {
            name: identifier.name.clone(),
            args,
            candidates,
        })
        .at(self.source.location(si)))
    }

    /// Instantiates a generic function for the given argument types: the
    /// signature's generic parameters are substituted, the cloned body is
    /// re-inferred (back-filling the return type) and the specialisation is
    /// registered in the module, with a fresh symbol the call site is
    /// repointed to.
    fn specialize(
        &mut self,
        identifier: &mut Identifier,
        generic_idx: Index,
        arg_types: &[(TypeInfo, SourceInfo)],
    ) -> ScriptResult<Signature> {
        let generic = self.manager.get(self.module_id).function(generic_idx);
        let mut signature = generic.signature().clone();
        let symtab = generic.symtab();
        let mut body = generic
            .ast_body()
            .ok_or_else(|| ErrorKind::NotImplemented {
                what: "generic function without a body snapshot".to_owned(),
            })?
            .clone();

        for (i, (arg_ty, _)) in arg_types.iter().enumerate().take(signature.params.len()) {
            if !signature.params[i].is_unknown() || arg_ty.is_unknown() {
                continue;
            }
            let var = signature.params[i].generic_var();
            if var == 0 {
                signature.params[i] = arg_ty.clone();
            } else {
                for j in 0..signature.params.len() {
                    signature.params[j].replace_var(var, arg_ty);
                }
                signature.return_type.replace_var(var, arg_ty);
            }
        }
        // an undeclared return type is re-inferred from the body; a
        // declared one is kept and checked against it
        let mut specialized = Function::new(self.module_id, symtab);
        specialized.set_signature(signature);
        let spec_idx = self.manager.get_mut(self.module_id).add_function(specialized);
        self.process_block(spec_idx, &mut body)?;
        self.manager
            .get_mut(self.module_id)
            .function_mut(spec_idx)
            .set_pending_body(body);

        let sym_idx = self.manager.get_mut(self.module_id).symtabs_mut().add_symbol(
            TableId::ROOT,
            Symbol::new(identifier.name.clone(), SymbolKind::Function, spec_idx),
        );
        identifier.symbol = Some(SymbolRef {
            module: self.module_id,
            table: TableId::ROOT,
            index: sym_idx,
        });
        Ok(self.manager.get(self.module_id).function(spec_idx).signature().clone())
    }

    /// Non-callable check, parameter consumption and nullary collapse.
    fn consume_params(
        &mut self,
        base: TypeInfo,
        arg_types: &[(TypeInfo, SourceInfo)],
    ) -> ScriptResult<(TypeInfo, usize)> {
        if !base.is_callable() {
            if let Some((_, si)) = arg_types.first() {
                return Err(ScriptError::new(ErrorKind::UnexpectedArgument { index: 1 })
                    .at(self.source.location(*si)));
            }
            return Ok((base, 0));
        }
        let mut sig = base.signature().clone();
        for (i, (arg_ty, si)) in arg_types.iter().enumerate() {
            let index = i + 1;
            // no params left: collapse a returned function and keep consuming
            while sig.params.is_empty() {
                if let TypeInfo::Function(inner) = &sig.return_type {
                    sig = (**inner).clone();
                } else {
                    return Err(ScriptError::new(ErrorKind::UnexpectedArgument { index })
                        .at(self.source.location(*si)));
                }
            }
            if sig.params[0] != *arg_ty {
                return Err(ScriptError::new(ErrorKind::UnexpectedArgumentType {
                    index,
                    expected: sig.params[0].clone(),
                    got: arg_ty.clone(),
                })
                .at(self.source.location(*si)));
            }
            sig.params.remove(0);
        }
        if sig.params.is_empty() {
            // post-call collapse layers; the call itself is not counted
            let (ty, execs) = collapse_nullary(sig.return_type);
            Ok((ty, execs))
        } else {
            Ok((TypeInfo::function(sig), 0))
        }
    }

    // --- function literals ---

    fn resolve_function_literal(
        &mut self,
        fn_idx: Index,
        func: &mut FunctionExpr,
        definition: Option<SymbolRef>,
    ) -> ScriptResult<TypeInfo> {
        let child_idx = func.index.expect("registered function literal");

        // signature from the declared parameter/result types
        let mut params = Vec::with_capacity(func.type_ast.params.len());
        for param in &func.type_ast.params {
            match &param.type_ast {
                Some(ty) => params.push(self.resolve_type_ast(ty)?),
                None => params.push(TypeInfo::unknown()),
            }
        }
        let return_type = match &func.type_ast.result {
            Some(ty) => self.resolve_type_ast(ty)?,
            None => TypeInfo::unknown(),
        };
        {
            let signature = self.function_mut(child_idx).signature_mut();
            signature.params = params.into_iter().collect();
            signature.return_type = return_type;
        }

        // non-local capture types, in capture order
        let nonlocals = self.collect_nonlocal_types(child_idx)?;
        self.function_mut(child_idx).signature_mut().nonlocals = nonlocals;

        // keep a body snapshot on generic functions for specialisation
        if self.function(child_idx).is_generic() {
            let body = func.body.clone();
            self.function_mut(child_idx).set_ast_body(body);
        }

        // partial type for recursive references through the definition
        if let Some(def_ref) = definition {
            let partial = TypeInfo::function(self.function(child_idx).signature().clone());
            let def_sym = self.symbol(def_ref).clone();
            if def_sym.kind() == SymbolKind::Value && def_sym.index() != NO_INDEX {
                self.function_mut(fn_idx).set_value(def_sym.index(), partial);
            }
        }

        // generic bodies are inferred per specialisation
        if !self.function(child_idx).is_generic() {
            self.process_block(child_idx, &mut func.body)?;
        }
        Ok(TypeInfo::function(self.function(child_idx).signature().clone()))
    }

    fn collect_nonlocal_types(&mut self, child_idx: Index) -> ScriptResult<Vec<TypeInfo>> {
        let child_table = self.function(child_idx).symtab();
        let num_symbols = self
            .manager
            .get(self.module_id)
            .symtabs()
            .table(child_table)
            .symbols()
            .len();
        let mut nonlocals = Vec::new();
        for i in 0..num_symbols {
            let sym_ref = SymbolRef {
                module: self.module_id,
                table: child_table,
                index: i as Index,
            };
            if self.symbol(sym_ref).kind() == SymbolKind::Nonlocal {
                nonlocals.push(self.nonlocal_target_type(sym_ref)?);
            }
        }
        Ok(nonlocals)
    }

    fn resolve_type_ast(&mut self, ty: &TypeAst) -> ScriptResult<TypeInfo> {
        match ty {
            TypeAst::Name(name) => builtin::type_by_name(&name.name),
            TypeAst::List(list) => Ok(TypeInfo::list_of(self.resolve_type_ast(&list.elem)?)),
            TypeAst::Function(func) => {
                let mut signature = Signature::default();
                for param in &func.params {
                    match &param.type_ast {
                        Some(ty) => signature.add_parameter(self.resolve_type_ast(ty)?),
                        None => signature.add_parameter(TypeInfo::unknown()),
                    }
                }
                signature.return_type = match &func.result {
                    Some(result) => self.resolve_type_ast(result)?,
                    None => TypeInfo::unknown(),
                };
                Ok(TypeInfo::function(signature))
            }
        }
    }

    // --- plumbing ---

    fn function(&self, idx: Index) -> &Function {
        self.manager.get(self.module_id).function(idx)
    }

    fn function_mut(&mut self, idx: Index) -> &mut Function {
        self.manager.get_mut(self.module_id).function_mut(idx)
    }

    fn symbol(&self, sym_ref: SymbolRef) -> &Symbol {
        self.manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .get(sym_ref.index)
    }

    fn symbol_mut(&mut self, sym_ref: SymbolRef) -> &mut Symbol {
        self.manager
            .get_mut(sym_ref.module)
            .symtabs_mut()
            .table_mut(sym_ref.table)
            .get_mut(sym_ref.index)
    }

    /// True when the symbol lives in a module root table (a static).
    fn is_module_level(&self, sym_ref: SymbolRef) -> bool {
        self.manager
            .get(sym_ref.module)
            .symtabs()
            .table(sym_ref.table)
            .function()
            .is_none()
    }
}

enum FunctionTarget {
    /// A concrete function in a module.
    Function(ModuleId, Index),
    /// A recursion sentinel whose definition is still a local value slot.
    ValueSlot(Index),
}

/// Unwraps parameterless function layers, counting them.
fn collapse_nullary(mut ty: TypeInfo) -> (TypeInfo, usize) {
    let mut execs = 0;
    loop {
        match &ty {
            TypeInfo::Function(sig) if sig.params.is_empty() => {
                let inner = sig.return_type.clone();
                ty = inner;
                execs += 1;
            }
            _ => return (ty, execs),
        }
    }
}

/// Structural check of a candidate signature against argument types.
fn match_params(signature: &Signature, arg_types: &[(TypeInfo, SourceInfo)]) -> bool {
    let mut sig = signature.clone();
    for (arg_ty, _) in arg_types {
        while sig.params.is_empty() {
            if let TypeInfo::Function(inner) = &sig.return_type {
                sig = (**inner).clone();
            } else {
                return false;
            }
        }
        if sig.params[0] != *arg_ty {
            return false;
        }
        sig.params.remove(0);
    }
    true
}

fn const_type(value: &ConstValue) -> TypeInfo {
    match value {
        ConstValue::Bool(_) => TypeInfo::Bool,
        ConstValue::Byte(_) => TypeInfo::Byte,
        ConstValue::Char(_) => TypeInfo::Char,
        ConstValue::Int32(_) => TypeInfo::Int32,
        ConstValue::Int64(_) => TypeInfo::Int64,
        ConstValue::Float32(_) => TypeInfo::Float32,
        ConstValue::Float64(_) => TypeInfo::Float64,
        ConstValue::Str(_) => TypeInfo::String,
    }
}
