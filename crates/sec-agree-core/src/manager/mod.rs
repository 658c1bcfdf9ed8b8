//! Security-agreement manager
//!
//! [`SecAgreeManager`] is constructed explicitly and handed to whoever needs
//! it; there is no process-wide instance.

mod arena;
pub mod sec_agree_manager;

pub use sec_agree_manager::SecAgreeManager;
