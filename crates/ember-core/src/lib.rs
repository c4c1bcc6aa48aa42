//! Ember Core - statement-at-a-time JIT compilation
//!
//! A host feeds this crate one statement at a time (begin a function,
//! assign, loop, return, finish) and gets back native function pointers:
//! - Types: the four scalar types and the promotion/cast lattice
//! - Scope: lexical scopes over stack-slot storage
//! - Function: per-function IR construction
//! - Loops: counted `for` loops
//! - JIT: Cranelift compilation and packed-buffer invocation
//! - Engine: the registry that ties them together

use std::sync::{Once, OnceLock};

use tracing_subscriber::{reload, EnvFilter, Registry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types shared by every engine operation
pub mod error;

/// Data types, arithmetic operations and the cast lattice
pub mod types;

/// Typed constants and statement operands
pub mod value;

/// Byte-buffer formats of the export surface
pub mod wire;

/// Lexical scopes and variable storage
pub mod scope;

/// Function builder
pub mod function;

/// Counted loop code generation
pub mod loops;

/// JIT compilation module (Cranelift-based)
/// JIT requires unsafe code for executable memory and function pointers
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod jit;

/// Function registry and driver
pub mod engine;

/// Engine configuration
pub mod config;

/// Convenience re-export of the engine
pub use engine::Engine;

/// Convenience re-export of configuration types
pub use config::{ConfigError, EngineConfig, OptLevel, Teardown};

/// Convenience re-export of error types
pub use error::{EngineError, EngineResult};

/// Convenience re-export of function builder types
pub use function::{BuildState, Function, ReturnKind};

/// Convenience re-export of the type model
pub use types::{Argument, CastOp, DataType, Operation};

/// Convenience re-export of operand types
pub use value::{OperationValue, Scalar};

static TRACING_INIT: Once = Once::new();
static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install a `fmt` subscriber filtered by `filter`
///
/// `RUST_LOG`, when set, takes precedence over `filter`. Only the first call
/// has any effect, and nothing is installed if the process already has a
/// global subscriber.
pub fn init_tracing(filter: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*};

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
        let (filter_layer, handle) = reload::Layer::new(env_filter);
        let installed = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init();
        if installed.is_ok() {
            let _ = FILTER_HANDLE.set(handle);
        }
    });
}

/// Replace the active filter installed by [`init_tracing`]
///
/// Returns `false` if no subscriber of ours is installed or the directive
/// does not parse.
pub fn set_log_filter(filter: &str) -> bool {
    let Some(handle) = FILTER_HANDLE.get() else {
        return false;
    };
    match EnvFilter::try_new(filter) {
        Ok(new_filter) => handle.reload(new_filter).is_ok(),
        Err(_) => false,
    }
}
