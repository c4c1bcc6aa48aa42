//! Function registry and driver
//!
//! The [`Engine`] owns every function ever begun, keyed by name, together
//! with the JIT unit their code is compiled into. Statement operations name
//! their function explicitly, so several functions may be under
//! construction at once.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::function::{Function, ReturnKind};
use crate::jit::{JitUnit, DEBUG_ADD};
use crate::types::{Argument, DataType, Operation};
use crate::value::{OperationValue, Scalar};
use crate::wire::{pack_scalars, unpack_scalar};

/// Registry of functions plus the JIT that compiles them
pub struct Engine {
    functions: HashMap<String, Function>,
    config: EngineConfig,
    // Declared last so it drops after the functions holding its addresses
    jit: JitUnit,
}

impl Engine {
    /// Construct the JIT for the host and register demo symbols if configured
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut jit = JitUnit::new(&config)?;
        if config.demo_symbols {
            jit.inject_demo()?;
            debug!("registered {DEBUG_ADD}");
        }
        info!("execution engine ready");
        Ok(Self {
            functions: HashMap::new(),
            config,
            jit,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The function registered under `name`, if any
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Names of all registered functions, in no particular order
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    fn function_mut(&mut self, name: &str) -> EngineResult<&mut Function> {
        self.functions
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))
    }

    /// Register a new function and open it for statements
    ///
    /// Fails if the name is already registered or already a JIT symbol, or
    /// if two arguments share a name.
    pub fn begin_function(
        &mut self,
        name: &str,
        arguments: Vec<Argument>,
        return_type: DataType,
    ) -> EngineResult<()> {
        if self.functions.contains_key(name) || self.jit.contains(name) {
            return Err(EngineError::DuplicateFunction(name.to_string()));
        }
        for (i, arg) in arguments.iter().enumerate() {
            if arguments[..i].iter().any(|earlier| earlier.name == arg.name) {
                return Err(EngineError::DuplicateArgument {
                    function: name.to_string(),
                    argument: arg.name.clone(),
                });
            }
        }

        let function = Function::begin(name, arguments, return_type, self.jit.call_conv());
        debug!("create function {}", function.prototype());
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    /// Close `name` and compile it
    ///
    /// Verification failures are logged and compilation is still attempted.
    /// A second finish fails with [`EngineError::FunctionClosed`].
    pub fn finish_function(&mut self, name: &str) -> EngineResult<()> {
        let verify = self.config.verify;
        let function = self
            .functions
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        let ir = function.close()?;
        debug!("code of {name} is\n{}", ir.display());

        if verify {
            if let Err(e) = self.jit.verify(&ir) {
                error!(function = name, "verification failed: {e}");
            }
        }

        let params = function.arguments().iter().map(|arg| arg.ty).collect();
        let address = self.jit.submit(name, ir, params, function.return_type())?;
        function.set_address(address);
        info!("function {name} has been added to engine");
        Ok(())
    }

    pub fn loop_begin(
        &mut self,
        name: &str,
        index: &str,
        lower: i32,
        upper: i32,
        step: i32,
    ) -> EngineResult<()> {
        debug!(function = name, "for {index} in {lower}..{upper} step {step}");
        self.function_mut(name)?.loop_begin(index, lower, upper, step)
    }

    pub fn loop_end(&mut self, name: &str) -> EngineResult<()> {
        debug!(function = name, "end loop");
        self.function_mut(name)?.loop_end()
    }

    /// `target = source` in function `name`
    pub fn assign_value(
        &mut self,
        name: &str,
        target: &str,
        source: &OperationValue,
    ) -> EngineResult<()> {
        debug!(function = name, "{target} = {source}");
        self.function_mut(name)?.assign_value(target, source)
    }

    /// `target = left op right` in function `name`
    pub fn assign_operation(
        &mut self,
        name: &str,
        target: &str,
        left: &OperationValue,
        op: Operation,
        right: &OperationValue,
    ) -> EngineResult<()> {
        debug!(function = name, "{target} = {left} {op} {right}");
        self.function_mut(name)?
            .assign_operation(target, left, op, right)
    }

    /// `return variable` in function `name`
    pub fn return_statement(&mut self, name: &str, variable: &str) -> EngineResult<ReturnKind> {
        debug!(function = name, "return {variable}");
        let kind = self.function_mut(name)?.return_value(variable)?;
        if kind == ReturnKind::Default {
            warn!(function = name, "{variable} is unbound, returning zero");
        }
        Ok(kind)
    }

    /// Native entry address of `name`
    ///
    /// Finished functions resolve through the registry; anything else falls
    /// back to the JIT symbol table. A miss on both is logged and yields `None`.
    #[must_use]
    pub fn resolve_address(&self, name: &str) -> Option<*const u8> {
        if let Some(address) = self.functions.get(name).and_then(Function::address) {
            return Some(address);
        }
        let address = self.jit.address(name);
        if address.is_none() {
            error!("could not find function {name}");
        }
        address
    }

    /// Parameter and return types of compiled code registered as `name`
    #[must_use]
    pub fn signature(&self, name: &str) -> Option<(&[DataType], DataType)> {
        self.jit
            .symbol(name)
            .map(|compiled| (compiled.params.as_slice(), compiled.ret))
    }

    /// Call `name` with packed arguments, writing the packed result
    pub fn invoke(&mut self, name: &str, args: &[u8], result: &mut [u8]) -> EngineResult<()> {
        if !self.functions.contains_key(name) && !self.jit.contains(name) {
            return Err(EngineError::UnknownFunction(name.to_string()));
        }
        self.jit.invoke(name, args, result)
    }

    /// Call `name` with typed arguments
    ///
    /// Each argument is converted to its parameter's type first, with the
    /// same rules an assignment uses.
    pub fn call(&mut self, name: &str, args: &[Scalar]) -> EngineResult<Scalar> {
        let compiled = match self.jit.symbol(name) {
            Some(compiled) => compiled,
            None if self.functions.contains_key(name) => {
                return Err(EngineError::NotCompiled(name.to_string()))
            }
            None => return Err(EngineError::UnknownFunction(name.to_string())),
        };
        if args.len() != compiled.params.len() {
            return Err(EngineError::ArgumentMismatch {
                expected: compiled.params.len(),
                got: args.len(),
            });
        }

        let ret = compiled.ret;
        let converted: Vec<Scalar> = args
            .iter()
            .zip(&compiled.params)
            .map(|(arg, ty)| arg.cast(*ty))
            .collect();
        let packed = pack_scalars(&converted);
        let mut result = vec![0u8; ret.size()];
        self.jit.invoke(name, &packed, &mut result)?;
        unpack_scalar(ret, &result)
    }
}
