//! # render-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio rendering with live output-device hot-swap.
//!
//! `render-audio` owns a renderer bound to one output device and can be
//! redirected to a different device at any time - including from platform
//! notification callbacks arriving on arbitrary threads - without glitching
//! or deadlocking the realtime render path. Device switches triggered by
//! default-device changes and session disconnects are handled automatically.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use render_audio::{DeviceId, RenderEngine};
//!
//! // Bind the OS default communications output and start rendering.
//! // The engine follows the default as it changes at runtime.
//! let engine = RenderEngine::builder()
//!     .on_event(|e| tracing::info!(?e, "engine event"))
//!     .start()?;
//!
//! // Hot-swap to a specific device; the call returns immediately and the
//! // render loop applies the switch on its own thread.
//! engine.set_device(DeviceId::new("USB Headset"));
//!
//! engine.stop()?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Render Thread**: a dedicated high-priority loop that owns all device
//!   I/O and blocks only in a three-signal wait (shutdown > switch >
//!   data-ready)
//! - **Staging Buffer**: a bounded PCM byte ring between payload and device,
//!   silence-padded on demand so the device never underruns
//! - **Notification Callbacks**: platform threads only write the single-slot
//!   switch request and raise a signal - never touch the device
//!
//! Device handles are exclusively owned by the render thread, so the
//! rebind path needs no locks and a switch can never race a buffer fill.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample and byte units
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod config;
mod device;
mod engine;
mod error;
mod event;
mod notify;
mod session;
mod signal;
mod staging;
pub mod thread_priority;

pub use config::{EngineConfig, StreamFormat};
pub use device::DeviceId;
pub use engine::{RenderEngine, RenderEngineBuilder, RenderStats};
pub use error::RenderAudioError;
pub use event::{event_callback, EngineEvent, EventCallback};

// Re-export the mock backend for integration testing without hardware
#[cfg(feature = "backend-mock")]
pub use backend::mock::{MockBackend, MockHandle};
