#![warn(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![warn(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Counts and sizes stay far below u32/usize limits
    clippy::cast_precision_loss,      // Fill ratios are display values
    clippy::cast_sign_loss,           // Retention day counts are checked non-negative first
    clippy::missing_errors_doc,       // Error enums document themselves
    clippy::module_name_repetitions,  // e.g. RetentionError in retention module
    clippy::must_use_candidate,
    clippy::doc_markdown
)]

pub mod app;
pub mod auth;
pub mod buffer;
pub mod domain;
pub mod protection;
pub mod reliability;
pub mod retention;
pub mod storage;

pub use app::{App, Config};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
