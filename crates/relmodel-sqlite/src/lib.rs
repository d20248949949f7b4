//! SQLite local store for relmodel.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! `SqliteStore` implements `LocalStore` on top of libsqlite3: every
//! `SelectStatement` the relation engine issues is rendered with
//! `to_parameterized_sql`, prepared, bound and stepped on one serialized
//! connection. Executed statements are kept in a history so callers can count
//! round trips per table.
//!
//! # Type Mapping
//!
//! | Value | SQLite |
//! |-------|--------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt`, `Timestamp` | INTEGER |
//! | `Double` | REAL |
//! | `Decimal`, `Text` | TEXT |
//! | `Json`, `Array`, `Record` | TEXT (JSON) |
//!
//! INTEGER columns read back as `BigInt`, REAL as `Double`, TEXT and BLOB as `Text`.

pub mod store;
pub mod types;

pub use store::SqliteStore;

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> String {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string.
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_string_lossy()
        .into_owned()
}
