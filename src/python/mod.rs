//! Embedded CPython host for the isolated runtime.
//!
//! Scripts run in the interpreter linked into the runtime binary. Values are
//! converted into [`crate::runtime::value::ScriptValue`] while the GIL is
//! held, so nothing outside this module touches Python objects.

pub mod convert;
pub mod figures;
pub mod host;

pub use figures::PyplotRegistry;
pub use host::PythonHost;
