use super::{Layer, LayerCore};
use crate::{
    extractor::{clamp01, smoothing_coeff},
    Control, Features, Node, NodeId, NodeKind, RenderContext, Result,
};

const BANDS: &[&str] = &["low", "mid", "high", "energy"];
const RING_SEGMENTS: u32 = 96;
/// Frequency that maps to the top of the colour ramp.
const BRIGHT_HZ: f32 = 4_000.0;

/// Ring that swells on onsets (or continuously with a band level) and
/// relaxes back to its base radius.
#[derive(Debug)]
pub struct PulseRing {
    core: LayerCore,
    ring: Option<NodeId>,
    envelope: f32,
    was_onset: bool,
}

impl PulseRing {
    pub const ID: &'static str = "pulse";

    pub fn new() -> Self {
        Self {
            core: LayerCore::new(
                Self::ID,
                "Onset pulse",
                vec![
                    Control::slider("radius", "Base radius", 0.1, 2.0, 0.05, 0.6),
                    Control::slider("decay", "Decay (ms)", 50.0, 2_000.0, 10.0, 300.0),
                    Control::toggle("onset_only", "Pulse on onsets only", true),
                    Control::select("band", "Driving band", BANDS, "low"),
                ],
            ),
            ring: None,
            envelope: 0.0,
            was_onset: false,
        }
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }
}

impl Default for PulseRing {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for PulseRing {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn allocate(&mut self, ctx: &mut RenderContext) -> Result<()> {
        if !ctx.surface.available {
            return Err(self.core.resource_error("an output surface"));
        }
        let node = Node::new(
            self.core.id(),
            NodeKind::Ring {
                segments: RING_SEGMENTS,
            },
        );
        self.ring = Some(ctx.scene.add(node));
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext, features: &Features) {
        let radius = self.core.number("radius", 0.6) as f32;
        let decay_ms = self.core.number("decay", 300.0) as f32;
        let onset_only = self.core.flag("onset_only", true);
        let band = self.core.choice("band", "low");

        let drive = match band {
            "energy" => features.energy,
            name => features.bands.get(name).unwrap_or(0.0),
        };

        self.envelope *= smoothing_coeff(features.dt, decay_ms);
        if onset_only {
            if features.onset && !self.was_onset {
                self.envelope = 1.0;
            }
        } else {
            self.envelope = self.envelope.max(drive);
        }
        self.envelope = clamp01(self.envelope);
        self.was_onset = features.onset;

        let Some(node) = self.ring.and_then(|id| ctx.scene.get_mut(id)) else {
            return;
        };
        let scale = radius * (1.0 + self.envelope * (0.5 + drive));
        node.transform.scale = [scale, scale, 1.0];
        let brightness = clamp01(features.centroid_hz / BRIGHT_HZ);
        node.color = [1.0, brightness, 1.0 - brightness, 0.3 + 0.7 * self.envelope];
    }

    fn show(&mut self, ctx: &mut RenderContext, visible: bool) {
        if let Some(id) = self.ring {
            ctx.scene.set_visible(id, visible);
        }
    }

    fn release(&mut self, ctx: &mut RenderContext) {
        if let Some(id) = self.ring.take() {
            ctx.scene.remove(id);
        }
        self.envelope = 0.0;
        self.was_onset = false;
    }

    fn resource_count(&self) -> usize {
        usize::from(self.ring.is_some())
    }
}
