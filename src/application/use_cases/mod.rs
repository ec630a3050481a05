//! Use case implementations.

mod mark_read_use_case;

pub use mark_read_use_case::MarkReadUseCase;
