// SPDX-License-Identifier: MPL-2.0

//! Camera orchestration pipelines
//!
//! - [`preview`]: one state machine per on-screen surface, keeping the
//!   surface bound to the right camera across lifecycle events
//! - [`photo`]: fan-out still capture across every back-facing camera
//!
//! Both run all hardware interaction on the shared camera executor and
//! report back through futures or watch channels, so callers never block.

pub mod photo;
pub mod preview;
