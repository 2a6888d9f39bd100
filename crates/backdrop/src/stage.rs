//! The hero stage: every enabled effect mounted over the page background,
//! bottom layer first.

use std::time::Instant;

use anyhow::{Context, Result};
use effectconfig::{BackdropConfig, LayerKind, Rgb};
use tracing::{info, warn};

use crate::gpu::{CompositeLayer, GpuDevice, LayerSurface};
use crate::laser_flow::{LaserFlowPanel, LaserFlowResources};
use crate::lifecycle::{Effect, EffectHost, FrameOutcome, HostEnvironment, HostOptions};
use crate::particle_field::{ParticleFieldResources, ParticleFieldScene};
use crate::schedule::FrameToken;

/// One mounted effect as the stage sees it.
pub trait StageLayer {
    fn kind(&self) -> LayerKind;

    fn on_animation_frame(&mut self, token: FrameToken) -> FrameOutcome;

    /// Texture and fade opacity to composite, if the layer has a surface.
    fn composite_source(&self, now: Instant) -> Option<CompositeLayer<'_>>;

    fn reconfigure(&mut self, config: &BackdropConfig) -> Result<()>;

    fn unmount(&mut self);

    fn is_mounted(&self) -> bool;
}

/// Effects that draw into a [`LayerSurface`] the stage can composite.
pub trait LayerEffect: Effect<Device = GpuDevice> {
    const KIND: LayerKind;

    fn layer(resources: &Self::Resources) -> &LayerSurface;

    fn section(config: &BackdropConfig) -> Self::Config;
}

impl LayerEffect for LaserFlowPanel {
    const KIND: LayerKind = LayerKind::LaserFlow;

    fn layer(resources: &LaserFlowResources) -> &LayerSurface {
        resources.layer()
    }

    fn section(config: &BackdropConfig) -> Self::Config {
        config.laser_flow.clone()
    }
}

impl LayerEffect for ParticleFieldScene {
    const KIND: LayerKind = LayerKind::ParticleField;

    fn layer(resources: &ParticleFieldResources) -> &LayerSurface {
        resources.layer()
    }

    fn section(config: &BackdropConfig) -> Self::Config {
        config.particle_field.clone()
    }
}

impl<E: LayerEffect> StageLayer for EffectHost<E> {
    fn kind(&self) -> LayerKind {
        E::KIND
    }

    fn on_animation_frame(&mut self, token: FrameToken) -> FrameOutcome {
        EffectHost::on_animation_frame(self, token)
    }

    fn composite_source(&self, now: Instant) -> Option<CompositeLayer<'_>> {
        let view = E::layer(self.resources()?).view()?;
        Some(CompositeLayer {
            view,
            opacity: self.opacity(now),
        })
    }

    fn reconfigure(&mut self, config: &BackdropConfig) -> Result<()> {
        EffectHost::reconfigure(self, E::section(config))
    }

    fn unmount(&mut self) {
        EffectHost::unmount(self);
    }

    fn is_mounted(&self) -> bool {
        EffectHost::is_mounted(self)
    }
}

/// Builds a mounted layer for a kind.
pub trait LayerFactory {
    fn create(
        &mut self,
        kind: LayerKind,
        config: &BackdropConfig,
        env: &HostEnvironment,
    ) -> Result<Box<dyn StageLayer>>;
}

/// Creates GPU-backed effect hosts.
pub struct GpuLayerFactory {
    gpu: GpuDevice,
    options: HostOptions,
}

impl GpuLayerFactory {
    pub fn new(gpu: GpuDevice, options: HostOptions) -> Self {
        Self { gpu, options }
    }

    fn mount<E>(&self, effect: E, env: &HostEnvironment) -> Result<Box<dyn StageLayer>>
    where
        E: LayerEffect + 'static,
    {
        let mut host = EffectHost::new(effect, self.gpu.clone(), env.clone(), self.options);
        host.mount()
            .with_context(|| format!("failed to mount {}", E::KIND))?;
        Ok(Box::new(host))
    }
}

impl LayerFactory for GpuLayerFactory {
    fn create(
        &mut self,
        kind: LayerKind,
        config: &BackdropConfig,
        env: &HostEnvironment,
    ) -> Result<Box<dyn StageLayer>> {
        match kind {
            LayerKind::LaserFlow => self.mount(LaserFlowPanel::new(config.laser_flow.clone()), env),
            LayerKind::ParticleField => {
                self.mount(ParticleFieldScene::new(config.particle_field.clone()), env)
            }
        }
    }
}

/// What one scheduler pump did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub drawn: usize,
    pub hidden: usize,
    pub failed: usize,
}

impl PumpReport {
    pub fn frames(&self) -> usize {
        self.drawn + self.hidden + self.failed
    }

    pub fn drew_anything(&self) -> bool {
        self.drawn > 0
    }
}

pub struct Stage {
    env: HostEnvironment,
    factory: Box<dyn LayerFactory>,
    layers: Vec<Box<dyn StageLayer>>,
    background: Rgb,
}

impl Stage {
    /// Mounts every active layer in stacking order.
    pub fn new(
        env: HostEnvironment,
        factory: Box<dyn LayerFactory>,
        config: &BackdropConfig,
    ) -> Result<Self> {
        let mut stage = Self {
            env,
            factory,
            layers: Vec::new(),
            background: config.stage.background,
        };
        for kind in config.active_layers() {
            let layer = stage.factory.create(kind, config, &stage.env)?;
            stage.layers.push(layer);
        }
        info!(layers = ?stage.layer_kinds(), "stage mounted");
        Ok(stage)
    }

    /// Hands every due frame token to the layers. A token only ever matches
    /// the layer that requested it.
    pub fn pump(&mut self) -> PumpReport {
        let due = self.env.scheduler.borrow_mut().take_due();
        let mut report = PumpReport::default();
        for token in due {
            for layer in &mut self.layers {
                match layer.on_animation_frame(token) {
                    FrameOutcome::Stale => {}
                    FrameOutcome::Drawn => report.drawn += 1,
                    FrameOutcome::Hidden => report.hidden += 1,
                    FrameOutcome::Failed => report.failed += 1,
                }
            }
        }
        report
    }

    /// Layers to blend, bottom first.
    pub fn composite_layers(&self, now: Instant) -> Vec<CompositeLayer<'_>> {
        self.layers
            .iter()
            .filter_map(|layer| layer.composite_source(now))
            .collect()
    }

    /// Applies a new configuration: surviving layers reconfigure, removed ones
    /// unmount, new ones mount in their stacking position.
    pub fn reconfigure(&mut self, config: &BackdropConfig) -> Result<()> {
        self.background = config.stage.background;
        let wanted: Vec<LayerKind> = config.active_layers().collect();

        let mut previous = std::mem::take(&mut self.layers);
        for layer in previous.iter_mut() {
            if !wanted.contains(&layer.kind()) {
                info!(layer = %layer.kind(), "layer disabled");
                layer.unmount();
            }
        }
        previous.retain(|layer| wanted.contains(&layer.kind()));

        let mut first_error = None;
        for kind in wanted {
            let existing = previous
                .iter()
                .position(|layer| layer.kind() == kind)
                .map(|index| previous.swap_remove(index));
            let result = match existing {
                Some(mut layer) => match layer.reconfigure(config) {
                    Ok(()) => Ok(layer),
                    Err(err) => {
                        layer.unmount();
                        Err(err)
                    }
                },
                None => {
                    info!(layer = %kind, "layer enabled");
                    self.factory.create(kind, config, &self.env)
                }
            };
            match result {
                Ok(layer) => self.layers.push(layer),
                Err(err) => {
                    warn!(layer = %kind, "layer dropped after reconfigure: {err:?}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancels and disposes every layer, top first.
    pub fn unmount_all(&mut self) {
        for layer in self.layers.iter_mut().rev() {
            layer.unmount();
        }
        self.layers.clear();
    }

    pub fn layer_kinds(&self) -> Vec<LayerKind> {
        self.layers.iter().map(|layer| layer.kind()).collect()
    }

    pub fn background(&self) -> Rgb {
        self.background
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    pub fn has_pending_frames(&self) -> bool {
        self.env.scheduler.borrow().has_pending()
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.unmount_all();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::events::{EventHub, HostEvent};
    use crate::schedule::FrameScheduler;
    use crate::types::Container;

    type Log = Rc<RefCell<Vec<String>>>;

    struct MockLayer {
        kind: LayerKind,
        env: HostEnvironment,
        pending: Option<FrameToken>,
        visible: bool,
        log: Log,
        fail_reconfigure: bool,
    }

    impl MockLayer {
        fn record(&self, what: &str) {
            self.log.borrow_mut().push(format!("{}:{what}", self.kind));
        }
    }

    impl StageLayer for MockLayer {
        fn kind(&self) -> LayerKind {
            self.kind
        }

        fn on_animation_frame(&mut self, token: FrameToken) -> FrameOutcome {
            if self.pending != Some(token) {
                return FrameOutcome::Stale;
            }
            self.pending = Some(self.env.scheduler.borrow_mut().request());
            if self.visible {
                self.record("draw");
                FrameOutcome::Drawn
            } else {
                FrameOutcome::Hidden
            }
        }

        fn composite_source(&self, _now: Instant) -> Option<CompositeLayer<'_>> {
            None
        }

        fn reconfigure(&mut self, _config: &BackdropConfig) -> Result<()> {
            if self.fail_reconfigure {
                anyhow::bail!("rebuild failed");
            }
            self.record("reconfigure");
            Ok(())
        }

        fn unmount(&mut self) {
            if let Some(token) = self.pending.take() {
                self.env.scheduler.borrow_mut().cancel(token);
                self.record("unmount");
            }
        }

        fn is_mounted(&self) -> bool {
            self.pending.is_some()
        }
    }

    struct MockFactory {
        log: Log,
        hidden: Vec<LayerKind>,
        fail_reconfigure: bool,
    }

    impl LayerFactory for MockFactory {
        fn create(
            &mut self,
            kind: LayerKind,
            _config: &BackdropConfig,
            env: &HostEnvironment,
        ) -> Result<Box<dyn StageLayer>> {
            self.log.borrow_mut().push(format!("{kind}:mount"));
            Ok(Box::new(MockLayer {
                kind,
                env: env.clone(),
                pending: Some(env.scheduler.borrow_mut().request()),
                visible: !self.hidden.contains(&kind),
                log: self.log.clone(),
                fail_reconfigure: self.fail_reconfigure,
            }))
        }
    }

    fn env() -> HostEnvironment {
        HostEnvironment {
            scheduler: FrameScheduler::shared(),
            hub: EventHub::new(),
            container: Container::new(800.0, 600.0, 1.0),
        }
    }

    fn stage_with(config: &BackdropConfig, hidden: Vec<LayerKind>) -> (Stage, Log) {
        let log: Log = Rc::default();
        let factory = MockFactory {
            log: log.clone(),
            hidden,
            fail_reconfigure: false,
        };
        let stage = Stage::new(env(), Box::new(factory), config).unwrap();
        (stage, log)
    }

    #[test]
    fn mounts_particles_below_laser() {
        let (stage, log) = stage_with(&BackdropConfig::default(), Vec::new());
        assert_eq!(
            stage.layer_kinds(),
            vec![LayerKind::ParticleField, LayerKind::LaserFlow]
        );
        assert_eq!(
            *log.borrow(),
            vec!["particle_field:mount", "laser_flow:mount"]
        );
        assert_eq!(stage.environment().scheduler.borrow().pending_count(), 2);
    }

    #[test]
    fn pump_dispatches_each_token_to_its_owner() {
        let (mut stage, log) = stage_with(&BackdropConfig::default(), Vec::new());
        let report = stage.pump();
        assert_eq!(
            report,
            PumpReport {
                drawn: 2,
                hidden: 0,
                failed: 0
            }
        );
        assert_eq!(log.borrow().len(), 4);
        assert!(stage.has_pending_frames());
        assert_eq!(stage.pump().frames(), 2);
    }

    #[test]
    fn hidden_layers_keep_their_loop() {
        let (mut stage, _log) = stage_with(
            &BackdropConfig::default(),
            vec![LayerKind::ParticleField, LayerKind::LaserFlow],
        );
        for _ in 0..3 {
            let report = stage.pump();
            assert_eq!(report.hidden, 2);
            assert!(!report.drew_anything());
        }
        assert_eq!(stage.environment().scheduler.borrow().pending_count(), 2);
    }

    #[test]
    fn disabling_a_layer_unmounts_only_that_layer() {
        let mut config = BackdropConfig::default();
        let (mut stage, log) = stage_with(&config, Vec::new());
        config.particle_field.enabled = false;
        stage.reconfigure(&config).unwrap();
        assert_eq!(stage.layer_kinds(), vec![LayerKind::LaserFlow]);
        assert!(log.borrow().contains(&"particle_field:unmount".to_string()));
        assert!(log.borrow().contains(&"laser_flow:reconfigure".to_string()));
        assert_eq!(stage.environment().scheduler.borrow().pending_count(), 1);

        config.particle_field.enabled = true;
        stage.reconfigure(&config).unwrap();
        assert_eq!(
            stage.layer_kinds(),
            vec![LayerKind::ParticleField, LayerKind::LaserFlow]
        );
    }

    #[test]
    fn failed_reconfigure_drops_the_layer_and_reports() {
        let log: Log = Rc::default();
        let factory = MockFactory {
            log,
            hidden: Vec::new(),
            fail_reconfigure: true,
        };
        let config = BackdropConfig::default();
        let mut stage = Stage::new(env(), Box::new(factory), &config).unwrap();
        assert!(stage.reconfigure(&config).is_err());
        assert!(stage.layer_kinds().is_empty());
    }

    #[test]
    fn unmount_all_cancels_every_frame() {
        let (mut stage, log) = stage_with(&BackdropConfig::default(), Vec::new());
        stage.pump();
        stage.env.hub.publish(HostEvent::Resized);
        stage.unmount_all();
        assert_eq!(stage.environment().scheduler.borrow().pending_count(), 0);
        assert_eq!(stage.pump().frames(), 0);
        let log = log.borrow();
        assert_eq!(
            &log[log.len() - 2..],
            &["laser_flow:unmount", "particle_field:unmount"]
        );
    }

    #[test]
    fn background_follows_configuration() {
        let mut config = BackdropConfig::default();
        let (mut stage, _log) = stage_with(&config, Vec::new());
        assert_eq!(stage.background(), Rgb::from_hex(0x020617));
        config.stage.background = Rgb::from_hex(0x000000);
        stage.reconfigure(&config).unwrap();
        assert_eq!(stage.background(), Rgb::from_hex(0x000000));
    }
}
