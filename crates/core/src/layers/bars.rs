use super::{Layer, LayerCore};
use crate::{Control, Features, Node, NodeId, NodeKind, RenderContext, Result};

const SOURCES: &[&str] = &["bins", "binsLog", "binsLogRaw"];

/// Row of vertical bars following one of the log-frequency bin arrays.
#[derive(Debug)]
pub struct SpectrumBars {
    core: LayerCore,
    group: Option<NodeId>,
    bars: Vec<NodeId>,
    levels: Vec<f32>,
}

impl SpectrumBars {
    pub const ID: &'static str = "bars";

    pub fn new() -> Self {
        Self {
            core: LayerCore::new(
                Self::ID,
                "Spectrum bars",
                vec![
                    Control::slider("count", "Bar count", 8.0, 128.0, 1.0, 64.0),
                    Control::slider("height", "Height", 0.1, 4.0, 0.1, 1.5),
                    Control::toggle("mirror", "Mirror vertically", false),
                    Control::select("source", "Source", SOURCES, "bins"),
                ],
            ),
            group: None,
            bars: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Latest bar heights before scaling, one per bar.
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    fn wanted_count(&self) -> usize {
        self.core.number("count", 64.0).max(1.0) as usize
    }

    fn rebuild(&mut self, ctx: &mut RenderContext, count: usize) {
        for id in self.bars.drain(..) {
            ctx.scene.remove(id);
        }
        for _ in 0..count {
            let mut node = Node::new(self.core.id(), NodeKind::Quad);
            node.transform.scale[1] = 0.0;
            self.bars.push(ctx.scene.add(node));
        }
        self.levels.clear();
        self.levels.resize(count, 0.0);
    }
}

impl Default for SpectrumBars {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for SpectrumBars {
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
        self.group = Some(ctx.scene.add(Node::new(self.core.id(), NodeKind::Group)));
        let count = self.wanted_count();
        self.rebuild(ctx, count);
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext, features: &Features) {
        let count = self.wanted_count();
        if count != self.bars.len() {
            self.rebuild(ctx, count);
        }

        let source = self.core.choice("source", "bins");
        let height = self.core.number("height", 1.5) as f32;
        let mirror = self.core.flag("mirror", false);
        resample_levels(features.bins_named(source), &mut self.levels);

        let width = 2.0 * ctx.aspect();
        let slot = width / count as f32;
        for (index, (id, level)) in self.bars.iter().zip(&self.levels).enumerate() {
            let Some(node) = ctx.scene.get_mut(*id) else {
                continue;
            };
            let bar_height = level * height;
            let x = -width * 0.5 + slot * (index as f32 + 0.5);
            let y = if mirror { 0.0 } else { -1.0 + bar_height * 0.5 };
            node.transform.position = [x, y, 0.0];
            node.transform.scale = [slot * 0.8, bar_height, 1.0];

            let hue = index as f32 / count as f32;
            node.color = [hue, 1.0 - hue, 0.5 + 0.5 * level, 1.0];
        }
    }

    fn show(&mut self, ctx: &mut RenderContext, visible: bool) {
        for id in self.group.iter().chain(&self.bars) {
            ctx.scene.set_visible(*id, visible);
        }
    }

    fn release(&mut self, ctx: &mut RenderContext) {
        for id in self.bars.drain(..).chain(self.group.take()) {
            ctx.scene.remove(id);
        }
        self.levels.clear();
    }

    fn resource_count(&self) -> usize {
        self.bars.len() + usize::from(self.group.is_some())
    }
}

/// Averages `values` into `out.len()` equal slices. When there are more
/// bars than values, neighbouring bars share a value.
fn resample_levels(values: &[f32], out: &mut [f32]) {
    let count = out.len();
    if values.is_empty() {
        out.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for (index, level) in out.iter_mut().enumerate() {
        let start = index * values.len() / count;
        let end = ((index + 1) * values.len() / count).max(start + 1);
        let slice = &values[start..end.min(values.len())];
        *level = slice.iter().sum::<f32>() / slice.len() as f32;
    }
}
