//! One function under construction
//!
//! A [`Function`] receives statements one at a time and appends the matching
//! Cranelift IR to its current block. Variables are stack slots, so every
//! read is a load from a slot some earlier store has written; there is no
//! SSA bookkeeping to get wrong across loop back-edges.
//!
//! ```text
//! begin ──► Open ──(assign / loop / return)*──► finish ──► Closed
//! ```

use cranelift_codegen::cursor::{Cursor, FuncCursor};
use cranelift_codegen::ir::{self, AbiParam, Block, InstBuilder, Signature, UserFuncName};
use cranelift_codegen::isa::CallConv;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::loops::LoopFrame;
use crate::scope::{Binding, ScopeStack};
use crate::types::{Argument, CastOp, DataType, Operation};
use crate::value::{OperationValue, Scalar};

/// Lifecycle of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Accepting statements
    Open,
    /// Finished; code has been handed to the JIT
    Closed,
}

/// What a return statement ended up returning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// The named variable, cast to the return type
    Variable,
    /// The zero of the return type, because the name was unbound
    Default,
}

/// In-progress (or finished) compilation unit for one function
pub struct Function {
    name: String,
    arguments: Vec<Argument>,
    return_type: DataType,
    pub(crate) scopes: ScopeStack,
    pub(crate) loops: Vec<LoopFrame>,
    pub(crate) ir: ir::Function,
    /// Block receiving new instructions
    block: Block,
    /// Whether `block` already ends in a terminator
    block_terminated: bool,
    state: BuildState,
    address: Option<*const u8>,
}

impl Function {
    /// Start a function: signature, entry block, outermost scope, and one slot per argument
    ///
    /// Each incoming parameter is stored into its own slot, after which
    /// arguments behave exactly like locally declared variables.
    #[must_use]
    pub fn begin(
        name: impl Into<String>,
        arguments: Vec<Argument>,
        return_type: DataType,
        call_conv: CallConv,
    ) -> Self {
        let mut signature = Signature::new(call_conv);
        signature
            .params
            .extend(arguments.iter().map(|arg| AbiParam::new(arg.ty.clif_type())));
        signature.returns.push(AbiParam::new(return_type.clif_type()));

        let mut ir = ir::Function::with_name_signature(UserFuncName::default(), signature);
        let entry = ir.dfg.make_block();
        ir.layout.append_block(entry);
        let params: Vec<ir::Value> = arguments
            .iter()
            .map(|arg| ir.dfg.append_block_param(entry, arg.ty.clif_type()))
            .collect();

        let mut function = Self {
            name: name.into(),
            arguments,
            return_type,
            scopes: ScopeStack::new(),
            loops: Vec::new(),
            ir,
            block: entry,
            block_terminated: false,
            state: BuildState::Open,
            address: None,
        };

        function.scopes.push();
        for (index, param) in params.into_iter().enumerate() {
            let arg = &function.arguments[index];
            let binding = function
                .scopes
                .allocate(&mut function.ir, &arg.name, arg.ty, false);
            function.cursor().ins().stack_store(param, binding.slot, 0);
        }
        function
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    #[must_use]
    pub fn return_type(&self) -> DataType {
        self.return_type
    }

    #[must_use]
    pub fn state(&self) -> BuildState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == BuildState::Open
    }

    /// Type of the innermost visible binding of `variable`
    #[must_use]
    pub fn lookup(&self, variable: &str) -> Option<DataType> {
        self.scopes.find(variable).map(|binding| binding.ty)
    }

    /// Number of open lexical scopes
    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Number of loops begun and not yet ended
    #[must_use]
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// Number of instructions emitted so far
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.ir
            .layout
            .blocks()
            .map(|block| self.ir.layout.block_insts(block).count())
            .sum()
    }

    /// The IR built so far
    #[must_use]
    pub fn ir(&self) -> &ir::Function {
        &self.ir
    }

    /// Native entry point, once the JIT has finalized this function
    #[must_use]
    pub fn address(&self) -> Option<*const u8> {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: *const u8) {
        self.address = Some(address);
    }

    /// Human-readable prototype, e.g. `Int32 f(Int32 a, Int32 b)`
    #[must_use]
    pub fn prototype(&self) -> String {
        let arguments: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
        format!("{} {}({})", self.return_type, self.name, arguments.join(", "))
    }

    /// `target = source`
    ///
    /// Self-assignment is dropped without emitting anything. An unbound target
    /// takes the source's type; a bound one keeps its own and the source is
    /// cast to it.
    pub fn assign_value(&mut self, target: &str, source: &OperationValue) -> EngineResult<()> {
        self.ensure_open()?;
        if source.variable_name() == Some(target) {
            return Ok(());
        }

        let source_type = self.operand_type(source)?;
        let binding = self
            .scopes
            .allocate(&mut self.ir, target, source_type, false);
        let (value, ty) = self.load_operand(source)?;
        let value = self.emit_cast(value, ty, binding.ty);
        self.store(binding, value);
        Ok(())
    }

    /// `target = left op right`
    ///
    /// An unbound target takes the promoted type of the operands. Both operands
    /// are cast to the target's type and the operation is chosen by that type's
    /// kind, so `Int32 / Float32` into a fresh target is a floating division.
    pub fn assign_operation(
        &mut self,
        target: &str,
        left: &OperationValue,
        op: Operation,
        right: &OperationValue,
    ) -> EngineResult<()> {
        self.ensure_open()?;
        let left_type = self.operand_type(left)?;
        let right_type = self.operand_type(right)?;
        let binding = self.scopes.allocate(
            &mut self.ir,
            target,
            DataType::promote(left_type, right_type),
            false,
        );

        let (lhs, lhs_type) = self.load_operand(left)?;
        let lhs = self.emit_cast(lhs, lhs_type, binding.ty);
        let (rhs, rhs_type) = self.load_operand(right)?;
        let rhs = self.emit_cast(rhs, rhs_type, binding.ty);

        let mut pos = self.cursor();
        let result = if binding.ty.is_integer() {
            match op {
                Operation::Add => pos.ins().iadd(lhs, rhs),
                Operation::Sub => pos.ins().isub(lhs, rhs),
                Operation::Mul => pos.ins().imul(lhs, rhs),
                Operation::Div => pos.ins().sdiv(lhs, rhs),
            }
        } else {
            match op {
                Operation::Add => pos.ins().fadd(lhs, rhs),
                Operation::Sub => pos.ins().fsub(lhs, rhs),
                Operation::Mul => pos.ins().fmul(lhs, rhs),
                Operation::Div => pos.ins().fdiv(lhs, rhs),
            }
        };
        self.store(binding, result);
        Ok(())
    }

    /// `return variable`
    ///
    /// An unbound name returns the zero of the return type instead of failing.
    pub fn return_value(&mut self, variable: &str) -> EngineResult<ReturnKind> {
        self.ensure_open()?;
        let (value, kind) = match self.scopes.find(variable) {
            Some(binding) => {
                let loaded = self.load(binding);
                let value = self.emit_cast(loaded, binding.ty, self.return_type);
                (value, ReturnKind::Variable)
            }
            None => (
                self.emit_constant(Scalar::zero(self.return_type)),
                ReturnKind::Default,
            ),
        };
        self.cursor().ins().return_(&[value]);
        self.block_terminated = true;
        Ok(kind)
    }

    /// Close the function and hand back the IR to submit
    ///
    /// Loops still open are ended and a trailing block without a terminator
    /// returns the zero of the return type. Fails if already closed, so code is
    /// never submitted twice.
    pub(crate) fn close(&mut self) -> EngineResult<ir::Function> {
        self.ensure_open()?;
        while !self.loops.is_empty() {
            warn!(function = %self.name, "closing unterminated loop at finish");
            self.loop_end()?;
        }
        if !self.block_terminated {
            warn!(function = %self.name, "no return at end of function, returning zero");
            let zero = self.emit_constant(Scalar::zero(self.return_type));
            self.cursor().ins().return_(&[zero]);
            self.block_terminated = true;
        }
        self.state = BuildState::Closed;
        Ok(self.ir.clone())
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        match self.state {
            BuildState::Open => Ok(()),
            BuildState::Closed => Err(EngineError::FunctionClosed(self.name.clone())),
        }
    }

    /// Cursor at the end of the current block
    ///
    /// If the current block is already terminated, emission moves to a fresh
    /// block with no predecessors, which keeps the IR well formed.
    pub(crate) fn cursor(&mut self) -> FuncCursor<'_> {
        if self.block_terminated {
            let block = self.new_block();
            self.switch_to(block);
        }
        FuncCursor::new(&mut self.ir).at_bottom(self.block)
    }

    pub(crate) fn new_block(&mut self) -> Block {
        let block = self.ir.dfg.make_block();
        self.ir.layout.append_block(block);
        block
    }

    pub(crate) fn switch_to(&mut self, block: Block) {
        self.block = block;
        self.block_terminated = false;
    }

    pub(crate) fn load(&mut self, binding: Binding) -> ir::Value {
        self.cursor()
            .ins()
            .stack_load(binding.ty.clif_type(), binding.slot, 0)
    }

    pub(crate) fn store(&mut self, binding: Binding, value: ir::Value) {
        self.cursor().ins().stack_store(value, binding.slot, 0);
    }

    fn unbound(&self, variable: &str) -> EngineError {
        EngineError::UnboundVariable {
            function: self.name.clone(),
            variable: variable.to_string(),
        }
    }

    fn operand_type(&self, operand: &OperationValue) -> EngineResult<DataType> {
        match operand {
            OperationValue::Constant(value) => Ok(value.data_type()),
            OperationValue::Variable(name) => self.lookup(name).ok_or_else(|| self.unbound(name)),
        }
    }

    fn load_operand(&mut self, operand: &OperationValue) -> EngineResult<(ir::Value, DataType)> {
        match operand {
            OperationValue::Constant(value) => Ok((self.emit_constant(*value), value.data_type())),
            OperationValue::Variable(name) => {
                let binding = self.scopes.find(name).ok_or_else(|| self.unbound(name))?;
                Ok((self.load(binding), binding.ty))
            }
        }
    }

    pub(crate) fn emit_constant(&mut self, value: Scalar) -> ir::Value {
        let mut pos = self.cursor();
        match value {
            Scalar::Int32(v) => pos.ins().iconst(DataType::Int32.clif_type(), imm32(v)),
            Scalar::Int64(v) => pos.ins().iconst(DataType::Int64.clif_type(), v),
            Scalar::Float32(v) => pos.ins().f32const(v),
            Scalar::Float64(v) => pos.ins().f64const(v),
        }
    }

    fn emit_cast(&mut self, value: ir::Value, from: DataType, to: DataType) -> ir::Value {
        let target = to.clif_type();
        let op = CastOp::select(from, to);
        if op == CastOp::Identity {
            return value;
        }
        let mut pos = self.cursor();
        match op {
            CastOp::Identity => value,
            CastOp::Truncate => pos.ins().ireduce(target, value),
            CastOp::SignExtend => pos.ins().sextend(target, value),
            CastOp::SignedToFloat => pos.ins().fcvt_from_sint(target, value),
            CastOp::FloatDemote => pos.ins().fdemote(target, value),
            CastOp::FloatPromote => pos.ins().fpromote(target, value),
            CastOp::FloatToSigned => pos.ins().fcvt_to_sint_sat(target, value),
        }
    }
}

/// 32-bit immediates are carried zero-extended in the 64-bit field
pub(crate) fn imm32(value: i32) -> i64 {
    i64::from(u32::from_ne_bytes(value.to_ne_bytes()))
}
