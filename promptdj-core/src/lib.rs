//! # promptdj-core
//!
//! Everything between the engine and a front end: configuration, MIDI input,
//! the default prompt bank and the controller that turns input into engine
//! commands.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use promptdj_core::config::Config;
//! use promptdj_core::controller::DjController;
//! use promptdj_core::prompts::default_prompts;
//! use promptdj_audio::{render_link, EngineHandle, NullOutput};
//!
//! let config = Config::load();
//! let (link, renderer) = render_link();
//! let _output = NullOutput::spawn(renderer)?;
//! // Any `promptdj_net::Connector`; the binary uses a `TcpConnector` on
//! // `config.address()`.
//! let connector = make_connector(config.address());
//! let mut engine = EngineHandle::spawn(config.engine_config(), connector, link)?;
//!
//! let dj = DjController::new(default_prompts(0));
//! dj.publish(&engine);
//! engine.play();
//! // Poll engine.drain_events() and MIDI from the front end's loop.
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`midi`]: midir input, CC / pitch-bend parsing and scaling
//! - [`prompts`]: the default sixteen-prompt bank
//! - [`controller`]: `DjController`: prompt edits, MIDI bindings and learn mode

pub mod config;
pub mod controller;
pub mod midi;
pub mod prompts;
