//! Общий словарь ошибок kinbus: числовые коды статуса и расширение
//! `ErrorExt`, которое реализуют ошибки всех крейтов рабочего пространства.

pub mod ext;
pub mod status_code;

// Publicly re-export all error types and functions from the submodules to
// simplify access from external code.
pub use ext::*;
pub use status_code::*;
