//! Pluggable visual effects and their lifecycle.
//!
//! Each effect implements the resource hooks of [`Layer`]; the provided
//! lifecycle methods wrap those hooks in a small state machine so every
//! effect gets the same guarantees:
//!
//! ```text
//! Unconfigured -> Configured -> Initialized <-> (enabled / disabled) -> Disposed
//!                                   \-> Failed (resource acquisition failed)
//! ```
//!
//! The lifecycle is driven from outside, normally by the render driver.

mod bars;
mod pulse;
mod registry;

pub use bars::SpectrumBars;
pub use pulse::PulseRing;
pub use registry::LayerRegistry;

use serde::{Deserialize, Serialize};

use crate::{controls, Control, Features, ParamMap, ParamValue, RenderContext, Result, VizError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerPhase {
    Unconfigured,
    Configured,
    Initialized,
    Failed,
    Disposed,
}

/// Identity, controls, parameters and lifecycle flags shared by every layer.
#[derive(Debug, Clone)]
pub struct LayerCore {
    id: String,
    label: String,
    controls: Vec<Control>,
    params: ParamMap,
    phase: LayerPhase,
    enabled: bool,
}

impl LayerCore {
    pub fn new(id: &str, label: &str, controls: Vec<Control>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            controls,
            params: ParamMap::new(),
            phase: LayerPhase::Unconfigured,
            enabled: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn phase(&self) -> LayerPhase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Numeric parameter, falling back to `fallback` if absent.
    pub fn number(&self, key: &str, fallback: f64) -> f64 {
        self.params.number(key).unwrap_or(fallback)
    }

    pub fn flag(&self, key: &str, fallback: bool) -> bool {
        self.params.flag(key).unwrap_or(fallback)
    }

    pub fn choice<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.params.choice(key).unwrap_or(fallback)
    }

    pub fn resource_error(&self, resource: &str) -> VizError {
        VizError::ResourceUnavailable {
            layer: self.id.clone(),
            resource: resource.to_string(),
        }
    }
}

/// A visual effect driven by audio features.
///
/// Implementors provide the resource hooks; the lifecycle methods
/// (`configure`, `initialize`, `update`, `set_enabled`, `dispose`) are
/// provided and should not be overridden.
pub trait Layer {
    fn core(&self) -> &LayerCore;
    fn core_mut(&mut self) -> &mut LayerCore;

    /// Creates the layer's scene resources. Called at most once per
    /// successful initialization.
    fn allocate(&mut self, ctx: &mut RenderContext) -> Result<()>;

    /// Recomputes internal state from `features` and applies it to the
    /// layer's own scene resources.
    fn render(&mut self, ctx: &mut RenderContext, features: &Features);

    /// Shows or hides the layer's resources without dropping them.
    fn show(&mut self, ctx: &mut RenderContext, visible: bool);

    /// Releases every resource obtained in `allocate` or `render`.
    fn release(&mut self, ctx: &mut RenderContext);

    /// Number of scene resources currently held.
    fn resource_count(&self) -> usize;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn label(&self) -> &str {
        self.core().label()
    }

    fn controls(&self) -> &[Control] {
        self.core().controls()
    }

    fn params(&self) -> &ParamMap {
        self.core().params()
    }

    fn phase(&self) -> LayerPhase {
        self.core().phase()
    }

    fn is_enabled(&self) -> bool {
        self.core().is_enabled()
    }

    /// Resets parameters to control defaults overlaid with `persisted`.
    fn configure(&mut self, persisted: &ParamMap) -> &ParamMap {
        let core = self.core_mut();
        core.params = controls::merge(&core.controls, persisted);
        if core.phase == LayerPhase::Unconfigured {
            core.phase = LayerPhase::Configured;
        }
        &core.params
    }

    /// Validates and stores a single parameter.
    fn set_param(&mut self, key: &str, value: ParamValue) -> Result<()> {
        let core = self.core_mut();
        let Some(control) = core.controls.iter().find(|c| c.key() == key) else {
            return Err(VizError::UnknownParam {
                layer: core.id.clone(),
                key: key.to_string(),
            });
        };
        let accepted = control.accept(&value).map_err(|reason| VizError::InvalidParam {
            layer: core.id.clone(),
            key: key.to_string(),
            reason,
        })?;
        core.params.insert(key, accepted);
        Ok(())
    }

    /// Allocates resources on first call; later calls are no-ops.
    fn initialize(&mut self, ctx: &mut RenderContext) -> Result<()> {
        match self.phase() {
            LayerPhase::Initialized => return Ok(()),
            LayerPhase::Disposed => return Err(VizError::LayerDisposed(self.id().to_string())),
            LayerPhase::Failed => {
                return Err(self.core().resource_error("resources after an earlier failure"))
            }
            LayerPhase::Unconfigured => {
                self.configure(&ParamMap::new());
            }
            LayerPhase::Configured => {}
        }

        match self.allocate(ctx) {
            Ok(()) => {
                let core = self.core_mut();
                core.phase = LayerPhase::Initialized;
                core.enabled = true;
                tracing::debug!(layer = %core.id, "layer initialized");
                Ok(())
            }
            Err(err) => {
                self.release(ctx);
                let core = self.core_mut();
                core.phase = LayerPhase::Failed;
                core.enabled = false;
                Err(err)
            }
        }
    }

    /// Runs one frame of the effect. Does nothing unless the layer is
    /// initialized and enabled.
    fn update(&mut self, ctx: &mut RenderContext, features: &Features) {
        if self.phase() == LayerPhase::Initialized && self.is_enabled() {
            self.render(ctx, features);
        }
    }

    /// Toggles visibility while keeping all state for a fast re-enable.
    fn set_enabled(&mut self, ctx: &mut RenderContext, enabled: bool) {
        if self.phase() != LayerPhase::Initialized || self.is_enabled() == enabled {
            return;
        }
        self.show(ctx, enabled);
        self.core_mut().enabled = enabled;
        tracing::debug!(layer = %self.id(), enabled, "layer visibility changed");
    }

    /// Releases all resources. Terminal: the layer can not be initialized
    /// again.
    fn dispose(&mut self, ctx: &mut RenderContext) {
        if self.phase() == LayerPhase::Disposed {
            return;
        }
        self.release(ctx);
        let core = self.core_mut();
        core.phase = LayerPhase::Disposed;
        core.enabled = false;
    }
}
