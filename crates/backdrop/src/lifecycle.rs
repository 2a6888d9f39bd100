//! Mount / frame / unmount lifecycle shared by every background effect.
//!
//! An [`Effect`] describes what to build and how to animate it; an
//! [`EffectHost`] owns everything around it: the container measurement, the
//! pixel-ratio cap, the event subscription, the frame token and the fade-in.
//! Unmounting always cancels the pending frame before resources are disposed.

use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::events::{EventHub, HostEvent, Inbox, PointerEvent, Subscription};
use crate::runtime::{BoxedTimeSource, ClockPolicy, TimeSample};
use crate::schedule::{FrameToken, SharedScheduler};
use crate::timeline::{fade_opacity, FadeCurve, FadeEnvelope};
use crate::types::{Container, ContainerMetrics, PixelRatioPolicy, SurfaceSize};

/// Pointer movement as seen from an effect's container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub event: PointerEvent,
    pub container: ContainerMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub time: TimeSample,
    pub visible: bool,
}

impl FrameInput {
    pub fn elapsed(&self) -> f32 {
        self.time.seconds
    }
}

/// How an effect absorbed a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigure {
    /// Applied to existing resources.
    InPlace,
    /// Resources must be torn down and built again.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The token was cancelled, superseded or belongs to another host.
    Stale,
    Drawn,
    /// Not visible: nothing was drawn but the next frame is scheduled.
    Hidden,
    /// Drawing failed; the error was logged and the next frame is scheduled.
    Failed,
}

pub trait Effect {
    /// Handle to whatever the effect draws with.
    type Device;
    /// Everything allocated by `initialize` and released by `dispose`.
    type Resources;
    type Config;

    fn label(&self) -> &'static str;

    fn pixel_ratio(&self) -> PixelRatioPolicy;

    /// Duration of the opacity transition after the first mount.
    fn fade_in(&self) -> Duration {
        Duration::ZERO
    }

    fn initialize(&mut self, device: &Self::Device, surface: SurfaceSize)
        -> Result<Self::Resources>;

    fn pointer_moved(&mut self, sample: &PointerSample);

    fn resize(
        &mut self,
        device: &Self::Device,
        resources: &mut Self::Resources,
        surface: SurfaceSize,
    );

    fn tick(&mut self, frame: &FrameInput);

    fn render(&mut self, device: &Self::Device, resources: &mut Self::Resources) -> Result<()>;

    fn reconfigure(&mut self, config: Self::Config) -> Reconfigure;

    fn dispose(&mut self, device: &Self::Device, resources: Self::Resources);

    /// When false the whole frame body is skipped while hidden, not just the
    /// draw call.
    fn updates_while_hidden(&self) -> bool {
        true
    }
}

/// Shared pieces of the page every host mounts into.
#[derive(Clone)]
pub struct HostEnvironment {
    pub scheduler: SharedScheduler,
    pub hub: Rc<EventHub>,
    pub container: Rc<Container>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostOptions {
    pub clock: ClockPolicy,
    pub fade_curve: FadeCurve,
}

struct Mounted<R> {
    resources: R,
    subscription: Subscription,
    inbox: Inbox,
    pending: Option<FrameToken>,
    clock: BoxedTimeSource,
    visible: bool,
    surface: SurfaceSize,
}

pub struct EffectHost<E: Effect> {
    effect: E,
    device: E::Device,
    env: HostEnvironment,
    options: HostOptions,
    fade: Option<FadeEnvelope>,
    fade_started: bool,
    mounted: Option<Mounted<E::Resources>>,
}

impl<E: Effect> EffectHost<E> {
    pub fn new(effect: E, device: E::Device, env: HostEnvironment, options: HostOptions) -> Self {
        Self {
            effect,
            device,
            env,
            options,
            fade: None,
            fade_started: false,
            mounted: None,
        }
    }

    /// Measures the container, builds resources and schedules the first frame.
    pub fn mount(&mut self) -> Result<()> {
        if self.mounted.is_some() {
            debug!(effect = self.effect.label(), "mount ignored; already mounted");
            return Ok(());
        }

        let metrics = self.env.container.measure();
        let surface = SurfaceSize::measure(&metrics, self.effect.pixel_ratio());
        let (subscription, inbox) = self.env.hub.subscribe();
        let resources = self.effect.initialize(&self.device, surface)?;

        let mut clock = self.options.clock.time_source();
        clock.reset();

        if !self.fade_started {
            self.fade_started = true;
            self.fade = FadeEnvelope::new(
                self.effect.fade_in(),
                self.options.fade_curve,
                Instant::now(),
            );
        }

        let token = self.env.scheduler.borrow_mut().request();
        info!(
            effect = self.effect.label(),
            width = surface.logical_width,
            height = surface.logical_height,
            pixel_ratio = surface.pixel_ratio,
            "effect mounted"
        );
        self.mounted = Some(Mounted {
            resources,
            subscription,
            inbox,
            pending: Some(token),
            clock,
            visible: true,
            surface,
        });
        Ok(())
    }

    /// Runs one frame body if `token` is the one this host is waiting for.
    pub fn on_animation_frame(&mut self, token: FrameToken) -> FrameOutcome {
        let Some(state) = self.mounted.as_mut() else {
            return FrameOutcome::Stale;
        };
        if state.pending != Some(token) {
            return FrameOutcome::Stale;
        }
        state.pending = None;

        let mut resized = false;
        for event in state.inbox.drain() {
            match event {
                HostEvent::PointerMoved(event) => {
                    let sample = PointerSample {
                        event,
                        container: self.env.container.measure(),
                    };
                    self.effect.pointer_moved(&sample);
                }
                HostEvent::Resized => resized = true,
                HostEvent::VisibilityChanged(visible) => state.visible = visible,
            }
        }

        if resized {
            let surface =
                SurfaceSize::measure(&self.env.container.measure(), self.effect.pixel_ratio());
            debug!(
                effect = self.effect.label(),
                width = surface.logical_width,
                height = surface.logical_height,
                pixel_ratio = surface.pixel_ratio,
                "effect resized"
            );
            self.effect
                .resize(&self.device, &mut state.resources, surface);
            state.surface = surface;
        }

        let frame = FrameInput {
            time: state.clock.sample(),
            visible: state.visible,
        };

        if state.visible || self.effect.updates_while_hidden() {
            self.effect.tick(&frame);
        }

        let outcome = if !state.visible {
            FrameOutcome::Hidden
        } else {
            match self.effect.render(&self.device, &mut state.resources) {
                Ok(()) => FrameOutcome::Drawn,
                Err(err) => {
                    warn!(effect = self.effect.label(), "frame failed: {err:?}");
                    FrameOutcome::Failed
                }
            }
        };

        state.pending = Some(self.env.scheduler.borrow_mut().request());
        tracing::trace!(effect = self.effect.label(), ?outcome, "frame finished");
        outcome
    }

    /// Cancels the pending frame, drops the subscription, then disposes.
    /// Safe to call repeatedly.
    pub fn unmount(&mut self) {
        let Some(mut state) = self.mounted.take() else {
            return;
        };
        if let Some(token) = state.pending.take() {
            self.env.scheduler.borrow_mut().cancel(token);
        }
        state.subscription.release();
        drop(state.inbox);
        self.effect.dispose(&self.device, state.resources);
        info!(effect = self.effect.label(), "effect unmounted");
    }

    /// Hands a new configuration to the effect, rebuilding when it asks for it.
    pub fn reconfigure(&mut self, config: E::Config) -> Result<()> {
        match self.effect.reconfigure(config) {
            Reconfigure::InPlace => {
                if let Some(state) = self.mounted.as_mut() {
                    let surface = SurfaceSize::measure(
                        &self.env.container.measure(),
                        self.effect.pixel_ratio(),
                    );
                    if surface != state.surface {
                        self.effect
                            .resize(&self.device, &mut state.resources, surface);
                        state.surface = surface;
                    }
                }
                debug!(effect = self.effect.label(), "configuration applied in place");
                Ok(())
            }
            Reconfigure::Rebuild => {
                if self.mounted.is_none() {
                    return Ok(());
                }
                info!(effect = self.effect.label(), "rebuilding after configuration change");
                self.unmount();
                self.mount()
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn pending_token(&self) -> Option<FrameToken> {
        self.mounted.as_ref().and_then(|state| state.pending)
    }

    pub fn is_visible(&self) -> bool {
        self.mounted.as_ref().is_some_and(|state| state.visible)
    }

    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.mounted.as_ref().map(|state| state.surface)
    }

    /// Layer opacity from the fade-in, sampled from wall-clock time.
    pub fn opacity(&self, now: Instant) -> f32 {
        fade_opacity(self.fade.as_ref(), now)
    }

    pub fn effect(&self) -> &E {
        &self.effect
    }

    pub fn resources(&self) -> Option<&E::Resources> {
        self.mounted.as_ref().map(|state| &state.resources)
    }

    pub fn label(&self) -> &'static str {
        self.effect.label()
    }
}

impl<E: Effect> Drop for EffectHost<E> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::schedule::FrameScheduler;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Initialize(u32, [f32; 2]),
        Pointer([f64; 2]),
        Resize([f32; 2], f32),
        Tick(bool),
        Render(u32),
        Dispose(u32),
    }

    #[derive(Clone, Copy)]
    struct MockConfig {
        rebuild: bool,
        ratio_cap: f64,
    }

    struct RecordingEffect {
        log: Rc<RefCell<Vec<Call>>>,
        next_id: u32,
        ratio_cap: f64,
        hidden_updates: bool,
        fail_init: bool,
        fail_render: bool,
    }

    impl RecordingEffect {
        fn new(log: Rc<RefCell<Vec<Call>>>) -> Self {
            Self {
                log,
                next_id: 0,
                ratio_cap: 2.0,
                hidden_updates: true,
                fail_init: false,
                fail_render: false,
            }
        }
    }

    impl Effect for RecordingEffect {
        type Device = ();
        type Resources = u32;
        type Config = MockConfig;

        fn label(&self) -> &'static str {
            "recording"
        }

        fn pixel_ratio(&self) -> PixelRatioPolicy {
            PixelRatioPolicy::capped(self.ratio_cap)
        }

        fn fade_in(&self) -> Duration {
            Duration::from_millis(800)
        }

        fn initialize(&mut self, _device: &(), surface: SurfaceSize) -> Result<u32> {
            if self.fail_init {
                anyhow::bail!("no context");
            }
            self.next_id += 1;
            self.log
                .borrow_mut()
                .push(Call::Initialize(self.next_id, surface.resolution()));
            Ok(self.next_id)
        }

        fn pointer_moved(&mut self, sample: &PointerSample) {
            self.log
                .borrow_mut()
                .push(Call::Pointer([sample.event.client_x, sample.event.client_y]));
        }

        fn resize(&mut self, _device: &(), _resources: &mut u32, surface: SurfaceSize) {
            self.log
                .borrow_mut()
                .push(Call::Resize(surface.resolution(), surface.aspect()));
        }

        fn tick(&mut self, frame: &FrameInput) {
            self.log.borrow_mut().push(Call::Tick(frame.visible));
        }

        fn render(&mut self, _device: &(), resources: &mut u32) -> Result<()> {
            if self.fail_render {
                anyhow::bail!("device lost");
            }
            self.log.borrow_mut().push(Call::Render(*resources));
            Ok(())
        }

        fn reconfigure(&mut self, config: MockConfig) -> Reconfigure {
            self.ratio_cap = config.ratio_cap;
            if config.rebuild {
                Reconfigure::Rebuild
            } else {
                Reconfigure::InPlace
            }
        }

        fn dispose(&mut self, _device: &(), resources: u32) {
            self.log.borrow_mut().push(Call::Dispose(resources));
        }

        fn updates_while_hidden(&self) -> bool {
            self.hidden_updates
        }
    }

    struct Harness {
        env: HostEnvironment,
        log: Rc<RefCell<Vec<Call>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                env: HostEnvironment {
                    scheduler: FrameScheduler::shared(),
                    hub: EventHub::new(),
                    container: Container::new(800.0, 600.0, 1.0),
                },
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn host(&self) -> EffectHost<RecordingEffect> {
            self.host_with(RecordingEffect::new(self.log.clone()))
        }

        fn host_with(&self, effect: RecordingEffect) -> EffectHost<RecordingEffect> {
            EffectHost::new(
                effect,
                (),
                self.env.clone(),
                HostOptions {
                    clock: ClockPolicy::Frozen { time: 1.0 },
                    fade_curve: FadeCurve::Linear,
                },
            )
        }

        fn pump(&self, host: &mut EffectHost<RecordingEffect>) -> Vec<FrameOutcome> {
            let due = self.env.scheduler.borrow_mut().take_due();
            due.into_iter()
                .map(|token| host.on_animation_frame(token))
                .collect()
        }

        fn calls(&self) -> Vec<Call> {
            self.log.borrow().clone()
        }

        fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
            self.log.borrow().iter().filter(|call| matcher(call)).count()
        }
    }

    #[test]
    fn mount_subscribes_and_schedules_first_frame() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        assert!(host.is_mounted());
        assert_eq!(harness.env.hub.subscriber_count(), 1);
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 1);
        assert_eq!(harness.calls(), vec![Call::Initialize(1, [800.0, 600.0])]);

        assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Drawn]);
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 1);
        assert_eq!(harness.count(|call| matches!(call, Call::Render(1))), 1);
    }

    #[test]
    fn mounting_twice_keeps_one_set_of_resources() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        host.mount().unwrap();
        assert_eq!(harness.count(|call| matches!(call, Call::Initialize(..))), 1);
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 1);
    }

    #[test]
    fn foreign_and_stale_tokens_are_ignored() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        let foreign = harness.env.scheduler.borrow_mut().request();
        assert_eq!(host.on_animation_frame(foreign), FrameOutcome::Stale);
        let first = host.pending_token().unwrap();
        assert_eq!(host.on_animation_frame(first), FrameOutcome::Drawn);
        assert_eq!(host.on_animation_frame(first), FrameOutcome::Stale);
    }

    #[test]
    fn unmount_cancels_pending_frame_before_dispose() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        harness.pump(&mut host);
        let queued = host.pending_token().unwrap();

        host.unmount();
        assert!(!harness.env.scheduler.borrow().is_pending(queued));
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 0);
        assert_eq!(harness.env.hub.subscriber_count(), 0);
        assert_eq!(host.on_animation_frame(queued), FrameOutcome::Stale);

        let renders = harness.count(|call| matches!(call, Call::Render(_)));
        assert_eq!(renders, 1);
        assert_eq!(harness.calls().last(), Some(&Call::Dispose(1)));
    }

    #[test]
    fn unmount_before_first_frame_releases_everything() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        host.unmount();
        host.unmount();
        assert!(harness.pump(&mut host).is_empty());
        assert_eq!(
            harness.calls(),
            vec![Call::Initialize(1, [800.0, 600.0]), Call::Dispose(1)]
        );
    }

    #[test]
    fn repeated_mount_cycles_leave_nothing_behind() {
        let harness = Harness::new();
        let mut host = harness.host();
        for _ in 0..5 {
            host.mount().unwrap();
            harness.pump(&mut host);
            host.unmount();
        }
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 0);
        assert_eq!(harness.env.hub.subscriber_count(), 0);
        let inits = harness.count(|call| matches!(call, Call::Initialize(..)));
        let disposals = harness.count(|call| matches!(call, Call::Dispose(_)));
        assert_eq!(inits, 5);
        assert_eq!(disposals, 5);
    }

    #[test]
    fn dropping_the_host_unmounts() {
        let harness = Harness::new();
        {
            let mut host = harness.host();
            host.mount().unwrap();
        }
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 0);
        assert_eq!(harness.env.hub.subscriber_count(), 0);
        assert_eq!(harness.calls().last(), Some(&Call::Dispose(1)));
    }

    #[test]
    fn failed_initialize_leaves_no_subscription_or_frame() {
        let harness = Harness::new();
        let mut effect = RecordingEffect::new(harness.log.clone());
        effect.fail_init = true;
        let mut host = harness.host_with(effect);
        assert!(host.mount().is_err());
        assert!(!host.is_mounted());
        assert_eq!(harness.env.hub.subscriber_count(), 0);
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 0);
    }

    #[test]
    fn hidden_frames_reschedule_without_drawing() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        harness.env.hub.publish(HostEvent::VisibilityChanged(false));

        for _ in 0..3 {
            assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Hidden]);
            assert_eq!(harness.env.scheduler.borrow().pending_count(), 1);
        }
        assert_eq!(harness.count(|call| matches!(call, Call::Render(_))), 0);
        assert_eq!(harness.count(|call| *call == Call::Tick(false)), 3);

        harness.env.hub.publish(HostEvent::VisibilityChanged(true));
        assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Drawn]);
        assert_eq!(harness.count(|call| matches!(call, Call::Initialize(..))), 1);
    }

    #[test]
    fn effects_can_skip_their_whole_body_while_hidden() {
        let harness = Harness::new();
        let mut effect = RecordingEffect::new(harness.log.clone());
        effect.hidden_updates = false;
        let mut host = harness.host_with(effect);
        host.mount().unwrap();
        harness.env.hub.publish(HostEvent::VisibilityChanged(false));
        assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Hidden]);
        assert_eq!(harness.count(|call| matches!(call, Call::Tick(_))), 0);
        assert!(host.pending_token().is_some());
    }

    #[test]
    fn events_are_consumed_at_the_next_frame() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        harness.env.hub.publish(HostEvent::PointerMoved(PointerEvent {
            client_x: 10.0,
            client_y: 20.0,
            viewport_width: 800.0,
            viewport_height: 600.0,
        }));
        assert_eq!(harness.count(|call| matches!(call, Call::Pointer(_))), 0);

        harness.pump(&mut host);
        let calls = harness.calls();
        assert_eq!(
            &calls[1..],
            &[Call::Pointer([10.0, 20.0]), Call::Tick(true), Call::Render(1)]
        );
    }

    #[test]
    fn resize_reads_the_container_and_is_repeatable() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        harness.pump(&mut host);

        for _ in 0..2 {
            harness.env.container.set_size(400.0, 300.0);
            harness.env.hub.publish(HostEvent::Resized);
            harness.pump(&mut host);
        }
        let resizes: Vec<Call> = harness
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Resize(..)))
            .collect();
        let expected = Call::Resize([400.0, 300.0], 400.0 / 300.0);
        assert_eq!(resizes, vec![expected.clone(), expected]);
        assert_eq!(host.surface_size().unwrap().resolution(), [400.0, 300.0]);
    }

    #[test]
    fn pixel_ratio_is_capped_at_mount() {
        let harness = Harness::new();
        harness.env.container.set_device_pixel_ratio(3.0);
        let mut host = harness.host();
        host.mount().unwrap();
        let surface = host.surface_size().unwrap();
        assert_eq!(surface.pixel_ratio, 2.0);
        assert_eq!(surface.physical(), (1600, 1200));
    }

    #[test]
    fn in_place_reconfigure_keeps_resources() {
        let harness = Harness::new();
        harness.env.container.set_device_pixel_ratio(3.0);
        let mut host = harness.host();
        host.mount().unwrap();
        let token = host.pending_token();
        host.reconfigure(MockConfig {
            rebuild: false,
            ratio_cap: 1.0,
        })
        .unwrap();
        assert_eq!(host.pending_token(), token);
        assert_eq!(harness.count(|call| matches!(call, Call::Initialize(..))), 1);
        assert_eq!(harness.count(|call| matches!(call, Call::Resize(..))), 1);
        assert_eq!(host.surface_size().unwrap().pixel_ratio, 1.0);
    }

    #[test]
    fn rebuild_reconfigure_disposes_and_reinitializes() {
        let harness = Harness::new();
        let mut host = harness.host();
        host.mount().unwrap();
        let old = host.pending_token().unwrap();
        host.reconfigure(MockConfig {
            rebuild: true,
            ratio_cap: 2.0,
        })
        .unwrap();

        assert_eq!(host.on_animation_frame(old), FrameOutcome::Stale);
        assert_eq!(harness.env.scheduler.borrow().pending_count(), 1);
        assert_eq!(harness.env.hub.subscriber_count(), 1);
        assert_eq!(
            harness.calls(),
            vec![
                Call::Initialize(1, [800.0, 600.0]),
                Call::Dispose(1),
                Call::Initialize(2, [800.0, 600.0]),
            ]
        );
        assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Drawn]);
        assert_eq!(harness.calls().last(), Some(&Call::Render(2)));
    }

    #[test]
    fn render_failures_keep_the_loop_alive() {
        let harness = Harness::new();
        let mut effect = RecordingEffect::new(harness.log.clone());
        effect.fail_render = true;
        let mut host = harness.host_with(effect);
        host.mount().unwrap();
        assert_eq!(harness.pump(&mut host), vec![FrameOutcome::Failed]);
        assert!(host.pending_token().is_some());
    }

    #[test]
    fn fade_starts_on_first_mount_only() {
        let harness = Harness::new();
        let mut host = harness.host();
        let before = Instant::now();
        host.mount().unwrap();
        assert!(host.opacity(before) < 0.05);
        assert_eq!(host.opacity(before + Duration::from_secs(2)), 1.0);

        host.reconfigure(MockConfig {
            rebuild: true,
            ratio_cap: 2.0,
        })
        .unwrap();
        assert_eq!(host.opacity(before + Duration::from_secs(2)), 1.0);
    }
}
