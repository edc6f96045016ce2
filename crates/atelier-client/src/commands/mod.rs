//! Data-access commands.
//!
//! Each sub-module groups the operations of one view.  Every function takes the
//! [`SharedState`](crate::state::SharedState) and returns
//! [`Result`](crate::error::Result).

pub mod files;
pub mod messaging;
pub mod profile;
pub mod wallet;
