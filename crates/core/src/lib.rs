//! Core library for the audio-reactive visualiser.
//!
//! Audio flows through the crate in one direction. [`SpectrumAnalyser`]
//! turns sample blocks into a dB spectrum, [`FeatureExtractor`] reduces that
//! spectrum to normalized [`Features`] once per frame, and [`RenderDriver`]
//! hands the same snapshot to every enabled [`Layer`] in the
//! [`LayerRegistry`]. Layer parameters are described by [`Control`]s and
//! persisted through a [`StateStore`].

pub mod analyser;
pub mod config;
pub mod controls;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod features;
pub mod layers;
pub mod scene;
pub mod state;

pub use analyser::{SpectrumAnalyser, SpectrumFrame};
pub use config::{AppConfig, AudioConfig, ExtractorConfig};
pub use controls::{Control, ParamMap, ParamValue};
pub use driver::{FrameReport, RenderDriver};
pub use error::{Result, VizError};
pub use extractor::FeatureExtractor;
pub use features::{Bands, Features};
pub use layers::{Layer, LayerCore, LayerPhase, LayerRegistry, PulseRing, SpectrumBars};
pub use scene::{Camera, DrawStats, Node, NodeId, NodeKind, RenderContext, Scene, Surface, Transform};
pub use state::{JsonFileStore, MemoryStore, StateStore};
