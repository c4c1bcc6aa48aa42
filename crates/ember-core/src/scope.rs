//! Lexical scopes and variable storage
//!
//! Each variable lives in its own explicit stack slot: loaded before use,
//! stored on assignment. Scopes form a stack, outermost first, and lookups
//! scan it from the innermost end so an inner binding hides an outer one.

use std::collections::HashMap;

use cranelift_codegen::ir::{self, StackSlot, StackSlotData, StackSlotKind};

use crate::types::DataType;

/// Storage location and fixed type of one variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: StackSlot,
    pub ty: DataType,
}

/// Stack of lexical scopes for one function
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Binding>>,
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new innermost scope
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope, dropping its bindings
    pub fn pop(&mut self) -> Option<HashMap<String, Binding>> {
        self.scopes.pop()
    }

    /// Number of open scopes
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Find the innermost binding of `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Return the binding of `name`, creating storage in the innermost scope if needed
    ///
    /// With `force_local` only the innermost scope is consulted, so an outer
    /// variable of the same name is shadowed rather than reused. An existing
    /// binding is returned unchanged; its type is never altered.
    pub fn allocate(
        &mut self,
        func: &mut ir::Function,
        name: &str,
        ty: DataType,
        force_local: bool,
    ) -> Binding {
        let existing = if force_local {
            self.scopes.last().and_then(|scope| scope.get(name).copied())
        } else {
            self.find(name)
        };
        if let Some(binding) = existing {
            return binding;
        }

        let binding = Binding {
            slot: func.create_sized_stack_slot(slot_data(ty)),
            ty,
        };
        if self.scopes.is_empty() {
            self.push();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
        binding
    }
}

fn slot_data(ty: DataType) -> StackSlotData {
    // (size, log2 alignment)
    let (size, align_shift) = if ty.size() == 8 { (8, 3) } else { (4, 2) };
    StackSlotData::new(StackSlotKind::ExplicitSlot, size, align_shift)
}
