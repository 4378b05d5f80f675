use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    layers::{Layer, LayerPhase, LayerRegistry},
    ExtractorConfig, FeatureExtractor, Features, ParamValue, RenderContext, Result, StateStore,
    VizError,
};

/// What happened during one call to [`RenderDriver::frame`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub t: f32,
    pub onset: bool,
    pub enabled_layers: Vec<String>,
    /// Layers whose initialization failed during this frame.
    pub failed_layers: Vec<String>,
    pub visible_nodes: usize,
}

/// Owns the per-frame sequence: extract features once, then walk every
/// registered layer through its lifecycle and update the enabled ones.
pub struct RenderDriver {
    extractor: FeatureExtractor,
    registry: LayerRegistry,
    store: Box<dyn StateStore>,
    context: RenderContext,
    active: BTreeSet<String>,
}

impl RenderDriver {
    /// Builds a driver and configures every registered layer from `store`.
    pub fn new(
        config: ExtractorConfig,
        mut registry: LayerRegistry,
        store: Box<dyn StateStore>,
        context: RenderContext,
    ) -> Result<Self> {
        let extractor = FeatureExtractor::new(config)?;
        for layer in registry.all_mut() {
            let persisted = store.load(layer.id());
            layer.configure(&persisted);
        }
        Ok(Self {
            extractor,
            registry,
            store,
            context,
            active: BTreeSet::new(),
        })
    }

    /// Registers a layer after construction, configuring it from the store.
    /// A layer already registered under the same id is disposed first, so
    /// its scene nodes leave the context with it.
    pub fn add_layer(&mut self, mut layer: Box<dyn Layer>) {
        let persisted = self.store.load(layer.id());
        layer.configure(&persisted);
        if let Some(mut replaced) = self.registry.register(layer) {
            replaced.dispose(&mut self.context);
            tracing::info!(layer = %replaced.id(), "replaced layer disposed");
        }
    }

    /// Replaces the set of layer ids that should be visible. Unknown ids are
    /// kept so a layer registered later picks them up.
    pub fn set_active<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active = ids.into_iter().map(Into::into).collect();
        for id in &self.active {
            if !self.registry.contains(id) {
                tracing::warn!(layer = %id, "activated layer is not registered");
            }
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    /// Runs one frame using the extractor's own clock.
    pub fn frame(&mut self, spectrum_db: &[f32], loudness_db: f32, sample_rate: f32) -> FrameReport {
        self.extractor.extract(spectrum_db, loudness_db, sample_rate);
        self.drive_layers()
    }

    /// Runs one frame stamped with `t_ms`.
    pub fn frame_at(
        &mut self,
        t_ms: f32,
        spectrum_db: &[f32],
        loudness_db: f32,
        sample_rate: f32,
    ) -> FrameReport {
        self.extractor
            .extract_at(t_ms, spectrum_db, loudness_db, sample_rate);
        self.drive_layers()
    }

    fn drive_layers(&mut self) -> FrameReport {
        let features = self.extractor.features();
        let mut report = FrameReport {
            t: features.t,
            onset: features.onset,
            ..Default::default()
        };

        for layer in self.registry.all_mut() {
            let wanted = self.active.contains(layer.id());

            match layer.phase() {
                LayerPhase::Disposed | LayerPhase::Failed => continue,
                LayerPhase::Unconfigured | LayerPhase::Configured if !wanted => continue,
                LayerPhase::Unconfigured | LayerPhase::Configured => {
                    if let Err(err) = layer.initialize(&mut self.context) {
                        tracing::warn!(layer = %layer.id(), error = %err, "disabling layer after failed initialization");
                        report.failed_layers.push(layer.id().to_string());
                        continue;
                    }
                }
                LayerPhase::Initialized => {}
            }

            layer.set_enabled(&mut self.context, wanted);
            if layer.is_enabled() {
                layer.update(&mut self.context, features);
                report.enabled_layers.push(layer.id().to_string());
            }
        }

        report.visible_nodes = self.context.draw().visible_nodes;
        report
    }

    /// Validates and applies a parameter edit, then persists the layer's
    /// full parameter map.
    pub fn set_param(&mut self, layer_id: &str, key: &str, value: ParamValue) -> Result<()> {
        let layer = self
            .registry
            .get_mut(layer_id)
            .ok_or_else(|| VizError::UnknownLayer(layer_id.to_string()))?;
        layer.set_param(key, value)?;
        self.store.save(layer_id, layer.params());
        Ok(())
    }

    /// Discards everything the extractor learned, e.g. after switching the
    /// audio source.
    pub fn reset_extractor(&mut self) {
        tracing::info!("extractor state reset");
        self.extractor.reset();
    }

    /// Disposes every layer and waits for pending state writes. The driver
    /// keeps extracting features but no layer will render again.
    pub fn shutdown(&mut self) {
        for layer in self.registry.all_mut() {
            layer.dispose(&mut self.context);
        }
        self.store.flush();
        tracing::info!("all layers disposed");
    }

    pub fn features(&self) -> &Features {
        self.extractor.features()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Mutable access for the host, e.g. to resize or replace the surface.
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }
}

impl std::fmt::Debug for RenderDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDriver")
            .field("extractor", &self.extractor)
            .field("registry", &self.registry)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layers::testing::CountingLayer, JsonFileStore, MemoryStore, ParamMap, PulseRing,
        SpectrumBars,
    };

    fn driver_with(store: impl StateStore + 'static, context: RenderContext) -> RenderDriver {
        let mut registry = LayerRegistry::with_builtin();
        registry.register(Box::new(CountingLayer::new("counting")));
        RenderDriver::new(
            ExtractorConfig {
                log_bins: 16,
                ..Default::default()
            },
            registry,
            Box::new(store),
            context,
        )
        .unwrap()
    }

    fn spectrum() -> Vec<f32> {
        vec![-50.0; 256]
    }

    #[test]
    fn configures_layers_from_store() {
        let mut store = MemoryStore::new();
        store.insert_raw("bars", r#"{ "count": 12, "unknown": 1 }"#);
        store.insert_raw("pulse", "corrupt");
        let driver = driver_with(store, RenderContext::default());

        let bars = driver.registry().get("bars").unwrap();
        assert_eq!(bars.phase(), LayerPhase::Configured);
        assert_eq!(bars.params().number("count"), Some(12.0));
        assert!(bars.params().get("unknown").is_none());

        let pulse = driver.registry().get("pulse").unwrap();
        assert_eq!(pulse.params().number("radius"), Some(0.6));
    }

    #[test]
    fn initializes_lazily_on_first_activation() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);
        assert!(driver.context().scene.is_empty());

        driver.set_active(["pulse"]);
        let report = driver.frame_at(16.0, &spectrum(), -30.0, 44_100.0);
        assert_eq!(report.enabled_layers, vec!["pulse".to_string()]);
        assert_eq!(driver.registry().get("pulse").unwrap().phase(), LayerPhase::Initialized);
        assert_eq!(driver.registry().get("bars").unwrap().phase(), LayerPhase::Configured);
        assert_eq!(driver.context().scene.len(), 1);
    }

    #[test]
    fn toggling_keeps_resources_and_never_reallocates() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        driver.set_active(["counting"]);
        driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);
        let allocated = driver.context().scene.len();

        driver.set_active(Vec::<String>::new());
        let report = driver.frame_at(16.0, &spectrum(), -30.0, 44_100.0);
        assert!(report.enabled_layers.is_empty());
        assert_eq!(report.visible_nodes, 0);
        assert_eq!(driver.context().scene.len(), allocated);

        driver.set_active(["counting"]);
        let report = driver.frame_at(32.0, &spectrum(), -30.0, 44_100.0);
        assert_eq!(report.visible_nodes, allocated);
        assert_eq!(driver.context().scene.len(), allocated);
    }

    #[test]
    fn failed_layer_is_isolated() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::new(0, 0, 1.0));
        driver.set_active(["bars", "pulse"]);
        let report = driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);
        assert_eq!(report.failed_layers, vec!["bars".to_string(), "pulse".to_string()]);
        assert!(report.enabled_layers.is_empty());
        assert_eq!(driver.features().bins_log.len(), 16);

        // Once the host supplies a surface, new layers still come up, while
        // the failed ones stay down.
        *driver.context_mut() = RenderContext::default();
        driver.set_active(["bars", "pulse", "counting"]);
        let report = driver.frame_at(16.0, &spectrum(), -30.0, 44_100.0);
        assert!(report.failed_layers.is_empty());
        assert_eq!(report.enabled_layers, vec!["counting".to_string()]);
    }

    #[test]
    fn set_param_persists_full_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.json");

        let mut driver = driver_with(JsonFileStore::open(&path), RenderContext::default());
        driver
            .set_param("bars", "mirror", ParamValue::Bool(true))
            .unwrap();

        assert!(matches!(
            driver.set_param("nope", "mirror", ParamValue::Bool(true)),
            Err(VizError::UnknownLayer(_))
        ));
        assert!(matches!(
            driver.set_param("bars", "speed", ParamValue::Number(1.0)),
            Err(VizError::UnknownParam { .. })
        ));

        driver.shutdown();
        let stored = JsonFileStore::open(&path).load("bars");
        assert_eq!(stored.flag("mirror"), Some(true));
        assert_eq!(stored.len(), 4);

        let reopened = driver_with(JsonFileStore::open(&path), RenderContext::default());
        let bars = reopened.registry().get("bars").unwrap();
        assert_eq!(bars.params().flag("mirror"), Some(true));
    }

    #[test]
    fn persisted_edits_reach_a_fresh_driver() {
        let mut store = MemoryStore::new();
        let mut params = ParamMap::new();
        params.insert("decay", ParamValue::Number(800.0));
        store.save(PulseRing::ID, &params);

        let driver = driver_with(store, RenderContext::default());
        let pulse = driver.registry().get(PulseRing::ID).unwrap();
        assert_eq!(pulse.params().number("decay"), Some(800.0));
        assert_eq!(
            driver.registry().get(SpectrumBars::ID).unwrap().params().number("count"),
            Some(64.0)
        );
    }

    #[test]
    fn shutdown_disposes_everything() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        driver.set_active(["bars", "pulse", "counting"]);
        driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);
        assert!(!driver.context().scene.is_empty());

        driver.shutdown();
        assert!(driver.context().scene.is_empty());
        assert!(driver.registry().all().all(|l| l.phase() == LayerPhase::Disposed));

        let report = driver.frame_at(16.0, &spectrum(), -30.0, 44_100.0);
        assert!(report.enabled_layers.is_empty());
        assert!(driver.context().scene.is_empty());
    }

    #[test]
    fn replacing_an_initialized_layer_releases_its_nodes() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        driver.set_active(["bars"]);
        driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);
        assert_eq!(driver.context().scene.owned_by("bars"), 65);

        driver.add_layer(Box::new(SpectrumBars::new()));
        assert_eq!(driver.context().scene.owned_by("bars"), 0);
        assert_eq!(driver.registry().get("bars").unwrap().phase(), LayerPhase::Configured);
        assert_eq!(driver.registry().ids(), vec!["bars", "pulse", "counting"]);

        let report = driver.frame_at(16.0, &spectrum(), -30.0, 44_100.0);
        assert_eq!(report.enabled_layers, vec!["bars".to_string()]);
        assert_eq!(driver.context().scene.owned_by("bars"), 65);
        assert_eq!(report.visible_nodes, 65);

        driver.shutdown();
        assert!(driver.context().scene.is_empty());
    }

    #[test]
    fn replacing_an_idle_layer_keeps_scene_untouched() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        driver.set_active(["pulse"]);
        driver.frame_at(0.0, &spectrum(), -30.0, 44_100.0);

        driver.add_layer(Box::new(CountingLayer::new("counting")));
        assert_eq!(driver.context().scene.len(), 1);
        assert_eq!(driver.context().scene.owned_by("pulse"), 1);
    }

    #[test]
    fn reset_extractor_is_explicit() {
        let mut driver = driver_with(MemoryStore::new(), RenderContext::default());
        for i in 0..20 {
            driver.frame_at(i as f32 * 16.0, &spectrum(), -20.0, 44_100.0);
        }
        assert!(driver.features().energy > 0.0);
        driver.reset_extractor();
        assert_eq!(driver.features().energy, 0.0);
    }
}
