use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    FreeVariable,
    /// Self-reference to the function currently being compiled; resolves
    /// to `OpCurrentClosure` so recursion works before the enclosing
    /// binding is written.
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// A lexical scope mapping names to storage slots.
///
/// Scopes nest through `outer`; resolving a name that lives in an enclosing
/// function records it in `free_symbols` and re-mints it as a
/// `FreeVariable` symbol whose index is its position in that list. The
/// list order is the capture order `OpClosure` relies on.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    pub free_symbols: Vec<Symbol>,
    pub num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Hands the enclosing scope back when the compiler leaves a function.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|boxed| *boxed)
    }

    /// Binds `name` to the next dense slot of this scope, overwriting any
    /// prior binding for the name (including a `Function` self-reference).
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };

        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;

        symbol
    }

    /// Binds a built-in at its externally assigned registry index.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };

        self.store.insert(name.to_string(), symbol.clone());

        symbol
    }

    /// Installs the self-reference for a named function literal. Visible
    /// while compiling the body, until a `define` for the same name
    /// shadows it.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };

        self.store.insert(name.to_string(), symbol.clone());

        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::FreeVariable,
            index: self.free_symbols.len(),
        };

        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());

        symbol
    }

    /// Looks `name` up here, then outward. An outer hit that is neither
    /// global nor a built-in becomes a free variable of this scope; the
    /// recursion makes the capture transitive through every intermediate
    /// function.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }
}
