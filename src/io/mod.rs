//! Input/output helpers.
//!
//! - whole-file atomic writes (`atomic`)
//! - raw series CSV storage (`raw`)
//! - weights loading + path policy (`weights`)
//! - severity result table CSV (`table`)

pub mod atomic;
pub mod raw;
pub mod table;
pub mod weights;

pub use atomic::*;
pub use raw::*;
pub use table::*;
pub use weights::*;
