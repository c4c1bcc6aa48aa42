//! Built-in demonstration symbols

use cranelift_codegen::ir::{AbiParam, InstBuilder, UserFuncName};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module};

use super::unit::{CompiledFunction, JitUnit};
use crate::error::{EngineError, EngineResult};
use crate::types::DataType;

/// Name of the `Int32 debug_add(Int32, Int32)` demo symbol
pub const DEBUG_ADD: &str = "debug_add";

impl JitUnit {
    /// Compile `debug_add` into the symbol table
    ///
    /// Lets a caller check the call path end to end before building anything.
    pub fn inject_demo(&mut self) -> EngineResult<()> {
        if self.contains(DEBUG_ADD) {
            return Ok(());
        }
        let int = DataType::Int32.clif_type();
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(int));
        sig.params.push(AbiParam::new(int));
        sig.returns.push(AbiParam::new(int));

        let id = self
            .module
            .declare_function(DEBUG_ADD, Linkage::Export, &sig)
            .map_err(|e| EngineError::Cranelift(e.to_string()))?;

        self.ctx.func.signature = sig;
        self.ctx.func.name = UserFuncName::user(0, id.as_u32());

        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let a = builder.block_params(entry)[0];
            let b = builder.block_params(entry)[1];
            let sum = builder.ins().iadd(a, b);
            builder.ins().return_(&[sum]);

            builder.finalize();
        }

        let ptr = self.define_current(id)?;
        self.compiled.insert(
            DEBUG_ADD.to_string(),
            CompiledFunction {
                id,
                ptr,
                params: vec![DataType::Int32, DataType::Int32],
                ret: DataType::Int32,
            },
        );
        Ok(())
    }
}
