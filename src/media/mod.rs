// SPDX-License-Identifier: MPL-2.0

//! JPEG encoding of generated stills

pub mod jpeg;

pub use jpeg::encode_rgb;
