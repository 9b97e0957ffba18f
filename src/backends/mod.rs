// SPDX-License-Identifier: MPL-2.0

//! Hardware access layer
//!
//! - [`camera`]: the callback-driven camera abstraction, executor and
//!   exclusivity bookkeeping
//! - [`virtual_camera`]: a software camera rig implementing that abstraction

pub mod camera;
pub mod virtual_camera;
