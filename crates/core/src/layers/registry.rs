use std::collections::HashMap;

use super::{Layer, PulseRing, SpectrumBars};

/// Catalog of layers keyed by id, kept in registration order.
///
/// The registry owns its layers for their whole lifetime but does not drive
/// their lifecycle; see [`RenderDriver`](crate::RenderDriver).
#[derive(Default)]
pub struct LayerRegistry {
    layers: Vec<Box<dyn Layer>>,
    index: HashMap<String, usize>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in effect.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SpectrumBars::new()));
        registry.register(Box::new(PulseRing::new()));
        registry
    }

    /// Adds a layer. A layer with an id that is already registered replaces
    /// the earlier one in place, and the earlier one is handed back so the
    /// caller can dispose it against the context holding its resources.
    pub fn register(&mut self, layer: Box<dyn Layer>) -> Option<Box<dyn Layer>> {
        let id = layer.id().to_string();
        match self.index.get(&id) {
            Some(&position) => Some(std::mem::replace(&mut self.layers[position], layer)),
            None => {
                self.index.insert(id, self.layers.len());
                self.layers.push(layer);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&(dyn Layer + 'static)> {
        self.index.get(id).map(|&i| self.layers[i].as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn Layer + 'static)> {
        let position = *self.index.get(id)?;
        Some(self.layers[position].as_mut())
    }

    /// Every layer in registration order.
    pub fn all(&self) -> impl Iterator<Item = &(dyn Layer + 'static)> + '_ {
        self.layers.iter().map(|layer| layer.as_ref())
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Layer>> + '_ {
        self.layers.iter_mut()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.id()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("layers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{testing::CountingLayer, LayerPhase};

    #[test]
    fn registers_and_looks_up() {
        let mut registry = LayerRegistry::new();
        assert!(registry.get("counting").is_none());

        registry.register(Box::new(CountingLayer::new("counting")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("counting").map(|l| l.label()), Some("Counting"));
        assert!(registry.get_mut("counting").is_some());
    }

    #[test]
    fn last_registration_wins_and_keeps_position() {
        let mut registry = LayerRegistry::new();
        assert!(registry.register(Box::new(CountingLayer::new("a"))).is_none());
        registry.register(Box::new(CountingLayer::new("b")));
        registry.register(Box::new(SpectrumBars::new()));

        let mut replacement = CountingLayer::new("a");
        replacement.configure(&crate::ParamMap::new());
        let replaced = registry.register(Box::new(replacement));
        assert_eq!(replaced.map(|l| l.phase()), Some(LayerPhase::Unconfigured));

        assert_eq!(registry.ids(), vec!["a", "b", "bars"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("a").map(|l| l.phase()), Some(LayerPhase::Configured));
        assert_eq!(registry.get("b").map(|l| l.phase()), Some(LayerPhase::Unconfigured));
    }

    #[test]
    fn builtin_registry_lists_effects() {
        let registry = LayerRegistry::with_builtin();
        assert_eq!(registry.ids(), vec![SpectrumBars::ID, PulseRing::ID]);
        assert!(registry.all().all(|layer| !layer.controls().is_empty()));
        assert!(registry.contains("pulse"));
    }
}
