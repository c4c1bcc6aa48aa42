//! Native code generation
//!
//! Finished functions are compiled by Cranelift into executable memory owned
//! by a [`JitUnit`]. The unit also keeps the global symbol table, so names
//! compiled outside the statement builder (such as `debug_add`) resolve the
//! same way as built ones.
//!
//! ```text
//! ir::Function → verify → define → finalize → entry pointer
//! ```
//!
//! # Calling compiled code
//!
//! Entry points use the host's C calling convention with one native
//! parameter per argument. For callers that only have packed bytes, each
//! function gets a lazily built trampoline of type
//! `extern "C" fn(args: *const u8, result: *mut u8)` that unpacks the
//! arguments, makes the call, and writes the result back.

mod demo;
mod invoke;
mod unit;

pub use demo::DEBUG_ADD;
pub use unit::{CompiledFunction, JitUnit};

/// Memory flags for compiled loads and stores
pub(crate) mod mem_flags {
    use cranelift_codegen::ir::MemFlags;

    /// Packed caller buffers carry no alignment guarantee
    pub fn unaligned() -> MemFlags {
        let mut flags = MemFlags::new();
        flags.set_notrap();
        flags
    }
}
