//! The JIT module and its symbol table

use std::collections::HashMap;
use std::mem::ManuallyDrop;

use cranelift_codegen::ir::{self, UserFuncName};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use tracing::debug;

use crate::config::{EngineConfig, Teardown};
use crate::error::{EngineError, EngineResult};
use crate::types::DataType;

/// A finalized function in the symbol table
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub id: FuncId,
    /// Entry point in JIT code memory
    pub ptr: *const u8,
    pub params: Vec<DataType>,
    pub ret: DataType,
}

// SAFETY: `ptr` is an immutable address into finalized code memory
unsafe impl Send for CompiledFunction {}
unsafe impl Sync for CompiledFunction {}

/// Owner of all JIT code memory
///
/// Dropping the unit clears every cached entry point first and then, under
/// [`Teardown::Release`], frees the code memory. Under [`Teardown::Leak`]
/// the module is never dropped, so pointers already handed out stay callable
/// for the life of the process.
pub struct JitUnit {
    /// Symbol table, by name
    pub(super) compiled: HashMap<String, CompiledFunction>,

    /// Packed-buffer trampolines, by target name
    pub(super) trampolines: HashMap<String, *const u8>,

    /// Compilation context (reused between compilations)
    pub(super) ctx: Context,

    /// Function builder context (reused between compilations)
    pub(super) builder_ctx: FunctionBuilderContext,

    pub(super) module: ManuallyDrop<JITModule>,

    teardown: Teardown,
}

impl JitUnit {
    /// Configure Cranelift for the host machine and create an empty module
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let init = |e: &dyn std::fmt::Display| EngineError::EngineInit(e.to_string());

        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", config.opt_level.as_setting())
            .map_err(|e| init(&e))?;
        flag_builder.set("is_pic", "false").map_err(|e| init(&e))?;

        let isa_builder = cranelift_native::builder()
            .map_err(|msg| EngineError::EngineInit(format!("host machine is not supported: {msg}")))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| init(&e))?;

        let jit_builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        debug!(opt_level = config.opt_level.as_setting(), "JIT module created");

        Ok(Self {
            compiled: HashMap::new(),
            trampolines: HashMap::new(),
            ctx: Context::new(),
            builder_ctx: FunctionBuilderContext::new(),
            module: ManuallyDrop::new(JITModule::new(jit_builder)),
            teardown: config.teardown,
        })
    }

    /// Calling convention of the host, used for every compiled signature
    #[must_use]
    pub fn call_conv(&self) -> CallConv {
        self.module.isa().default_call_conv()
    }

    /// Whether `name` is in the symbol table
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    /// Look up a finalized function by name
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&CompiledFunction> {
        self.compiled.get(name)
    }

    /// Entry address of `name`, if finalized
    #[must_use]
    pub fn address(&self, name: &str) -> Option<*const u8> {
        self.compiled.get(name).map(|f| f.ptr)
    }

    /// Run the IR verifier against the host ISA
    pub fn verify(&self, func: &ir::Function) -> EngineResult<()> {
        cranelift_codegen::verify_function(func, self.module.isa())
            .map_err(|errors| EngineError::Cranelift(errors.to_string()))
    }

    /// Compile `func` under `name` and return its entry point
    ///
    /// The signature is taken from `func`; `params` and `ret` are the engine
    /// types it was built from and are kept for packed-buffer calls.
    pub fn submit(
        &mut self,
        name: &str,
        func: ir::Function,
        params: Vec<DataType>,
        ret: DataType,
    ) -> EngineResult<*const u8> {
        if self.contains(name) {
            return Err(EngineError::DuplicateFunction(name.to_string()));
        }
        let id = self
            .module
            .declare_function(name, Linkage::Export, &func.signature)
            .map_err(|e| EngineError::Cranelift(e.to_string()))?;

        self.ctx.func = func;
        self.ctx.func.name = UserFuncName::user(0, id.as_u32());
        let ptr = self.define_current(id)?;

        self.compiled.insert(
            name.to_string(),
            CompiledFunction {
                id,
                ptr,
                params,
                ret,
            },
        );
        debug!(function = name, "finalized at {ptr:p}");
        Ok(ptr)
    }

    /// Define whatever is in `self.ctx.func` as `id`, finalize, and return its address
    ///
    /// The context is cleared even when definition fails.
    pub(super) fn define_current(&mut self, id: FuncId) -> EngineResult<*const u8> {
        let defined = self.module.define_function(id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        defined.map_err(|e| EngineError::Cranelift(e.to_string()))?;

        self.module
            .finalize_definitions()
            .map_err(|e| EngineError::Cranelift(e.to_string()))?;

        Ok(self.module.get_finalized_function(id))
    }
}

impl Drop for JitUnit {
    fn drop(&mut self) {
        self.trampolines.clear();
        self.compiled.clear();
        match self.teardown {
            Teardown::Release => {
                // SAFETY: the unit is going away, and every pointer it cached has
                // been cleared. Callers holding raw addresses opted into this.
                let module = unsafe { ManuallyDrop::take(&mut self.module) };
                unsafe { module.free_memory() };
            }
            Teardown::Leak => debug!("leaving JIT code memory mapped"),
        }
    }
}
