//! Calling compiled code through packed byte buffers

use cranelift_codegen::ir::{AbiParam, InstBuilder, UserFuncName};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::Module;
use tracing::trace;

use super::mem_flags;
use super::unit::{CompiledFunction, JitUnit};
use crate::error::{EngineError, EngineResult};
use crate::wire::packed_size;

/// Signature of every trampoline
type Trampoline = extern "C" fn(*const u8, *mut u8);

impl JitUnit {
    /// Call `name` with packed arguments, writing the packed result
    ///
    /// `args` must be exactly the packed size of the parameter list and
    /// `result` exactly the size of the return type.
    pub fn invoke(&mut self, name: &str, args: &[u8], result: &mut [u8]) -> EngineResult<()> {
        let compiled = self
            .compiled
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotCompiled(name.to_string()))?;

        let expected = packed_size(&compiled.params);
        if args.len() != expected {
            return Err(EngineError::BufferSize {
                expected,
                got: args.len(),
            });
        }
        if result.len() != compiled.ret.size() {
            return Err(EngineError::BufferSize {
                expected: compiled.ret.size(),
                got: result.len(),
            });
        }

        let trampoline = match self.trampolines.get(name) {
            Some(&ptr) => ptr,
            None => {
                let ptr = self.build_trampoline(&compiled)?;
                self.trampolines.insert(name.to_string(), ptr);
                ptr
            }
        };

        trace!(function = name, "invoking through trampoline");
        // SAFETY: the trampoline was compiled with exactly this signature and
        // both buffers were checked against the sizes it reads and writes.
        let entry = unsafe { std::mem::transmute::<*const u8, Trampoline>(trampoline) };
        entry(args.as_ptr(), result.as_mut_ptr());
        Ok(())
    }

    /// Compile `fn(args, result)` that unpacks, calls `target`, and stores the result
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn build_trampoline(&mut self, target: &CompiledFunction) -> EngineResult<*const u8> {
        let ptr_type = self.module.target_config().pointer_type();
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(ptr_type));
        sig.params.push(AbiParam::new(ptr_type));

        let id = self
            .module
            .declare_anonymous_function(&sig)
            .map_err(|e| EngineError::Cranelift(e.to_string()))?;

        self.ctx.func.signature = sig;
        self.ctx.func.name = UserFuncName::user(0, id.as_u32());
        let callee = self
            .module
            .declare_func_in_func(target.id, &mut self.ctx.func);

        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let args_ptr = builder.block_params(entry)[0];
            let result_ptr = builder.block_params(entry)[1];

            let mut offset = 0;
            let mut call_args = Vec::with_capacity(target.params.len());
            for ty in &target.params {
                let value = builder
                    .ins()
                    .load(ty.clif_type(), mem_flags::unaligned(), args_ptr, offset);
                call_args.push(value);
                offset += ty.size() as i32;
            }

            let call = builder.ins().call(callee, &call_args);
            let returned = builder.inst_results(call)[0];
            builder
                .ins()
                .store(mem_flags::unaligned(), returned, result_ptr, 0);
            builder.ins().return_(&[]);

            builder.finalize();
        }

        self.define_current(id)
    }
}
