//! C export surface of the Ember engine
//!
//! Every function here decodes raw host buffers and forwards to the single
//! process-wide [`Engine`]. Errors never cross the boundary: they are
//! logged and the call becomes a no-op (or returns a null pointer).
//!
//! String parameters are NUL-terminated. Operand and value buffers use the
//! layouts in [`ember_core::wire`].

use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU8, Ordering};

use ember_core::wire::{self, OPERAND_CONSTANT, OPERAND_PAYLOAD_OFFSET, OPERAND_VARIABLE};
use ember_core::{
    DataType, Engine, EngineConfig, EngineError, EngineResult, Operation, Teardown,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Environment variable naming a TOML config file read by [`init_lib`]
pub const CONFIG_ENV: &str = "EMBER_CONFIG";

pub const LOG_DEBUG: u8 = 1;
pub const LOG_MESSAGE: u8 = 2;
pub const LOG_WARNING: u8 = 3;
pub const LOG_ERROR: u8 = 4;

/// The engine, made shareable across host threads
struct SharedEngine(Engine);

// SAFETY: the engine holds raw code pointers and is only touched while the
// mutex below is held, so it is never used from two threads at once.
unsafe impl Send for SharedEngine {}

static ENGINE: Mutex<Option<SharedEngine>> = parking_lot::const_mutex(None);

/// Level requested through [`set_log_level`]; 0 means never set
static LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

fn level_filter(level: u8) -> Option<&'static str> {
    match level {
        LOG_DEBUG => Some("debug"),
        LOG_MESSAGE => Some("info"),
        LOG_WARNING => Some("warn"),
        LOG_ERROR => Some("error"),
        _ => None,
    }
}

/// Create the engine; later calls do nothing
///
/// Configuration comes from the file named by `EMBER_CONFIG`, if set. Code
/// memory is always kept for the life of the process, since the host may
/// hold function pointers past any point we could free them.
#[no_mangle]
pub extern "C" fn init_lib() {
    let mut guard = ENGINE.lock();
    if guard.is_some() {
        return;
    }

    let loaded = std::env::var_os(CONFIG_ENV).map(EngineConfig::from_path);
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => EngineConfig::default(),
    };
    config.teardown = Teardown::Leak;

    let filter = level_filter(LOG_LEVEL.load(Ordering::Relaxed)).unwrap_or(&config.log_filter);
    ember_core::init_tracing(filter);
    if let Some(Err(e)) = loaded {
        warn!("ignoring {CONFIG_ENV}: {e}");
    }

    match Engine::new(config) {
        Ok(engine) => {
            *guard = Some(SharedEngine(engine));
            info!("ember {} initialized", ember_core::VERSION);
        }
        Err(e) => error!("init_lib: {e}"),
    }
}

/// Set the log threshold: 1=debug, 2=message, 3=warning, 4=error
#[no_mangle]
pub extern "C" fn set_log_level(level: u8) {
    let Some(filter) = level_filter(level) else {
        warn!("set_log_level: unknown level {level}");
        return;
    };
    LOG_LEVEL.store(level, Ordering::Relaxed);
    ember_core::set_log_filter(filter);
}

/// Run `f` against the engine, logging any error under `operation`
fn with_engine<T>(operation: &str, f: impl FnOnce(&mut Engine) -> EngineResult<T>) -> Option<T> {
    let mut guard = ENGINE.lock();
    let Some(shared) = guard.as_mut() else {
        error!("{operation}: library is not initialized, call init_lib first");
        return None;
    };
    match f(&mut shared.0) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{operation}: {e}");
            None
        }
    }
}

/// Borrow a NUL-terminated UTF-8 string
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const u8) -> EngineResult<&'a str> {
    if ptr.is_null() {
        return Err(EngineError::InvalidOperand("null string pointer".to_string()));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract
    let raw = unsafe { CStr::from_ptr(ptr.cast()) };
    raw.to_str()
        .map_err(|e| EngineError::InvalidOperand(format!("string is not UTF-8: {e}")))
}

/// Borrow exactly the bytes of one operand buffer
///
/// # Safety
/// `ptr` must be null or point to an operand buffer in the wire layout.
unsafe fn operand_bytes<'a>(ptr: *const u8) -> EngineResult<&'a [u8]> {
    if ptr.is_null() {
        return Err(EngineError::InvalidOperand("null operand pointer".to_string()));
    }
    // SAFETY: every operand buffer has a tag byte, and the tag fixes how far
    // the rest of the buffer extends
    unsafe {
        let len = match *ptr {
            OPERAND_CONSTANT => OPERAND_PAYLOAD_OFFSET + DataType::try_from(*ptr.add(1))?.size(),
            OPERAND_VARIABLE => {
                let name = CStr::from_ptr(ptr.add(OPERAND_PAYLOAD_OFFSET).cast());
                OPERAND_PAYLOAD_OFFSET + name.to_bytes_with_nul().len()
            }
            _ => 1,
        };
        Ok(std::slice::from_raw_parts(ptr, len))
    }
}

/// Borrow `len` bytes, treating a zero length as empty whatever the pointer
///
/// # Safety
/// If `len` is non-zero, `ptr` must be valid for `len` bytes.
unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> EngineResult<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(EngineError::BufferSize { expected: len, got: 0 });
    }
    // SAFETY: non-null and valid for `len` bytes per the caller contract
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Register and open a function
///
/// `args_name` is a comma-separated list; empty segments are skipped.
///
/// # Safety
/// `function_name` and `args_name` must be NUL-terminated strings, and
/// `args_type` must hold `args_number` bytes.
#[no_mangle]
pub unsafe extern "C" fn function_begin(
    function_name: *const u8,
    args_number: u8,
    args_type: *const u8,
    args_name: *const u8,
    return_type: u8,
) {
    with_engine("function_begin", |engine| {
        // SAFETY: forwarded caller contract
        let (name, type_tags, names) = unsafe {
            (
                c_str(function_name)?,
                bytes(args_type, usize::from(args_number))?,
                if args_name.is_null() { "" } else { c_str(args_name)? },
            )
        };
        let arguments = wire::decode_arguments(name, type_tags, names)?;
        engine.begin_function(name, arguments, DataType::try_from(return_type)?)
    });
}

/// Finish a function and compile it
///
/// # Safety
/// `function_name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn function_finish(function_name: *const u8) {
    with_engine("function_finish", |engine| {
        // SAFETY: forwarded caller contract
        let name = unsafe { c_str(function_name)? };
        engine.finish_function(name)
    });
}

/// Open `for index in l..r step s`
///
/// # Safety
/// Both names must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn loop_begin(
    function_name: *const u8,
    loop_index_name: *const u8,
    l: i32,
    r: i32,
    s: i32,
) {
    with_engine("loop_begin", |engine| {
        // SAFETY: forwarded caller contract
        let (name, index) = unsafe { (c_str(function_name)?, c_str(loop_index_name)?) };
        engine.loop_begin(name, index, l, r, s)
    });
}

/// Close the innermost loop
///
/// # Safety
/// `function_name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn loop_finish(function_name: *const u8) {
    with_engine("loop_finish", |engine| {
        // SAFETY: forwarded caller contract
        let name = unsafe { c_str(function_name)? };
        engine.loop_end(name)
    });
}

/// `target = source`
///
/// # Safety
/// Names must be NUL-terminated strings and `source_buffer` an operand buffer.
#[no_mangle]
pub unsafe extern "C" fn assignment_statement_value(
    function_name: *const u8,
    target_variable_name: *const u8,
    source_buffer: *const u8,
) {
    with_engine("assignment_statement_value", |engine| {
        // SAFETY: forwarded caller contract
        let (name, target, source) = unsafe {
            (
                c_str(function_name)?,
                c_str(target_variable_name)?,
                operand_bytes(source_buffer)?,
            )
        };
        let source = wire::decode_operand(source)?;
        engine.assign_value(name, target, &source)
    });
}

/// `target = left op right`
///
/// # Safety
/// Names must be NUL-terminated strings and both buffers operand buffers.
#[no_mangle]
pub unsafe extern "C" fn assignment_statement_operation(
    function_name: *const u8,
    target_variable_name: *const u8,
    left_buffer: *const u8,
    operation_type: u8,
    right_buffer: *const u8,
) {
    with_engine("assignment_statement_operation", |engine| {
        // SAFETY: forwarded caller contract
        let (name, target, left, right) = unsafe {
            (
                c_str(function_name)?,
                c_str(target_variable_name)?,
                operand_bytes(left_buffer)?,
                operand_bytes(right_buffer)?,
            )
        };
        let left = wire::decode_operand(left)?;
        let right = wire::decode_operand(right)?;
        let op = Operation::try_from(operation_type)?;
        engine.assign_operation(name, target, &left, op, &right)
    });
}

/// `return variable`
///
/// # Safety
/// Both names must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn return_statement(
    function_name: *const u8,
    return_variable_name: *const u8,
) {
    with_engine("return_statement", |engine| {
        // SAFETY: forwarded caller contract
        let (name, variable) = unsafe { (c_str(function_name)?, c_str(return_variable_name)?) };
        engine.return_statement(name, variable).map(|_| ())
    });
}

/// Native entry point of a finished function or JIT symbol, or null
///
/// # Safety
/// `function_name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn get_func_ptr(function_name: *const u8) -> *const c_void {
    with_engine("get_func_ptr", |engine| {
        // SAFETY: forwarded caller contract
        let name = unsafe { c_str(function_name)? };
        Ok(engine.resolve_address(name))
    })
    .flatten()
    .map_or(std::ptr::null(), |ptr| ptr.cast())
}

/// Call a compiled function with packed arguments, writing the packed result
///
/// # Safety
/// `argument_buffer` must hold the packed arguments of the function and
/// `result_buffer` must have room for its return value.
#[no_mangle]
pub unsafe extern "C" fn run(
    function_name: *const u8,
    argument_buffer: *const u8,
    result_buffer: *mut u8,
) {
    with_engine("run", |engine| {
        // SAFETY: forwarded caller contract
        let name = unsafe { c_str(function_name)? };
        let (args_len, result_len) = match engine.signature(name) {
            Some((params, ret)) => (wire::packed_size(params), ret.size()),
            None if engine.function(name).is_some() => {
                return Err(EngineError::NotCompiled(name.to_string()))
            }
            None => return Err(EngineError::UnknownFunction(name.to_string())),
        };
        if result_buffer.is_null() {
            return Err(EngineError::BufferSize {
                expected: result_len,
                got: 0,
            });
        }
        // SAFETY: sizes come from the compiled signature
        let (args, result) = unsafe {
            (
                bytes(argument_buffer, args_len)?,
                std::slice::from_raw_parts_mut(result_buffer, result_len),
            )
        };
        engine.invoke(name, args, result)
    });
}
