//! Counted loops
//!
//! `for index in lower..upper step step` lowers to three blocks:
//!
//! ```text
//! current:  index = lower; jump test
//! test:     brif index < upper, body, exit
//! body:     ...statements...; index += step; jump test
//! exit:     statements after the loop
//! ```
//!
//! The index is always `Int32` and lives in a scope of its own, so it
//! shadows an outer variable of the same name until the loop ends.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{Block, InstBuilder};

use crate::error::{EngineError, EngineResult};
use crate::function::Function;
use crate::scope::Binding;
use crate::types::DataType;
use crate::value::Scalar;

/// An open loop: where its index lives and where control goes next
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopFrame {
    index: Binding,
    step: i32,
    test: Block,
    exit: Block,
}

impl Function {
    /// Open a counted loop; following statements form its body
    pub fn loop_begin(
        &mut self,
        index: &str,
        lower: i32,
        upper: i32,
        step: i32,
    ) -> EngineResult<()> {
        self.ensure_open()?;
        let test = self.new_block();
        let body = self.new_block();
        let exit = self.new_block();

        self.scopes.push();
        let binding = self.scopes.allocate(&mut self.ir, index, DataType::Int32, true);
        let start = self.emit_constant(Scalar::Int32(lower));
        self.store(binding, start);
        self.cursor().ins().jump(test, &[]);

        self.switch_to(test);
        let current = self.load(binding);
        let bound = self.emit_constant(Scalar::Int32(upper));
        let keep_going = self
            .cursor()
            .ins()
            .icmp(IntCC::SignedLessThan, current, bound);
        self.cursor().ins().brif(keep_going, body, &[], exit, &[]);

        self.switch_to(body);
        self.loops.push(LoopFrame {
            index: binding,
            step,
            test,
            exit,
        });
        Ok(())
    }

    /// Close the innermost loop; following statements run after it
    pub fn loop_end(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        let frame = self
            .loops
            .pop()
            .ok_or_else(|| EngineError::NoOpenLoop(self.name().to_string()))?;

        let current = self.load(frame.index);
        let step = self.emit_constant(Scalar::Int32(frame.step));
        let next = self.cursor().ins().iadd(current, step);
        self.store(frame.index, next);
        self.cursor().ins().jump(frame.test, &[]);

        self.scopes.pop();
        self.switch_to(frame.exit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cranelift_codegen::isa::CallConv;

    use super::*;
    use crate::types::Argument;
    use crate::value::OperationValue;

    fn open() -> Function {
        Function::begin(
            "sum",
            vec![Argument::new(DataType::Int32, "n")],
            DataType::Int32,
            CallConv::SystemV,
        )
    }

    #[test]
    fn loop_opens_and_closes_a_scope() {
        let mut f = open();
        f.loop_begin("i", 0, 10, 1).unwrap();
        assert_eq!(f.scope_depth(), 2);
        assert_eq!(f.loop_depth(), 1);
        assert_eq!(f.lookup("i"), Some(DataType::Int32));

        f.loop_end().unwrap();
        assert_eq!(f.scope_depth(), 1);
        assert_eq!(f.loop_depth(), 0);
        assert_eq!(f.lookup("i"), None);
    }

    #[test]
    fn index_shadows_outer_variable() {
        let mut f = open();
        f.assign_value("i", &Scalar::Float64(100.0).into()).unwrap();
        f.loop_begin("i", 0, 3, 1).unwrap();
        assert_eq!(f.lookup("i"), Some(DataType::Int32));
        f.loop_end().unwrap();
        assert_eq!(f.lookup("i"), Some(DataType::Float64));
    }

    #[test]
    fn body_writes_reach_outer_variables() {
        let mut f = open();
        f.assign_value("acc", &Scalar::Int32(0).into()).unwrap();
        f.loop_begin("i", 0, 4, 1).unwrap();
        f.assign_operation(
            "acc",
            &OperationValue::variable("acc"),
            crate::types::Operation::Add,
            &OperationValue::variable("i"),
        )
        .unwrap();
        f.loop_end().unwrap();
        // Assigning to `acc` inside the body did not create a loop-local copy
        assert_eq!(f.ir().sized_stack_slots.len(), 3);
    }

    #[test]
    fn nested_loops_each_get_blocks() {
        let mut f = open();
        let blocks = f.ir().layout.blocks().count();
        f.loop_begin("i", 0, 2, 1).unwrap();
        f.loop_begin("j", 0, 2, 1).unwrap();
        assert_eq!(f.loop_depth(), 2);
        f.loop_end().unwrap();
        f.loop_end().unwrap();
        assert_eq!(f.ir().layout.blocks().count(), blocks + 6);
    }

    #[test]
    fn end_without_begin_is_an_error() {
        let mut f = open();
        assert!(matches!(f.loop_end(), Err(EngineError::NoOpenLoop(name)) if name == "sum"));
    }

    #[test]
    fn close_ends_dangling_loops() {
        let mut f = open();
        f.loop_begin("i", 0, 2, 1).unwrap();
        let ir = f.close().unwrap();
        assert_eq!(f.loop_depth(), 0);
        assert!(ir.to_string().contains("brif"));
    }
}
