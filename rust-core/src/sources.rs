//! Platform sensor sources and the per-tick sampling layer.
//!
//! The platform delivers sensor data asynchronously; the engine only ever
//! reads the latest known value at tick time and never waits. Sources are
//! traits so a host can plug in its own location service, AR session and
//! accelerometer.
//!
//! The location service needs a permission grant and a start-up period
//! before it yields fixes. [`LocationLink`] drives that as an explicit state
//! machine polled once per tick:
//!
//! ```text
//! Uninitialized -> AwaitingPermission -> AwaitingServiceStart -> Running
//!        \________________\______________________\_____________-> Failed
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pipeline::TickInput;
use crate::types::{CameraPose, LinkPhase, MotionSample, PositionFix};

/// Location permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Undetermined,
    Granted,
    Denied,
}

/// Location service status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Initializing,
    Running,
    Failed,
}

/// Why the location link gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFailure {
    PermissionDenied,
    PermissionTimeout,
    DisabledByUser,
    ServiceTimeout,
    ServiceFailed,
}

/// Platform location service.
pub trait PositionSource {
    fn permission(&self) -> PermissionState;
    fn request_permission(&mut self);
    fn is_enabled_by_user(&self) -> bool;
    fn start(&mut self);
    fn stop(&mut self);
    fn status(&self) -> ServiceStatus;
    /// Most recent fix, however stale.
    fn last_fix(&self) -> Option<PositionFix>;
}

/// AR subsystem camera tracking. `None` means "not tracking".
pub trait CameraPoseSource {
    fn current_pose(&self) -> Option<CameraPose>;
}

/// Accelerometer stream.
pub trait MotionSource {
    fn is_supported(&self) -> bool {
        true
    }
    fn latest_sample(&self) -> Option<MotionSample>;
}

/// Timeouts for bringing up the location link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long to wait for the user to answer the permission prompt.
    pub permission_timeout_ms: u64,
    /// How long the service may stay initializing after `start()`.
    pub service_start_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            permission_timeout_ms: 30_000,
            service_start_timeout_ms: 20_000,
        }
    }
}

// ============================================================================
// LOCATION LINK
// ============================================================================

/// Polled state machine in front of a [`PositionSource`].
pub struct LocationLink<P: PositionSource> {
    source: P,
    config: LinkConfig,
    phase: LinkPhase,
    phase_entered_ms: u64,
    failure: Option<LinkFailure>,
    last_delivered_ms: Option<u64>,
}

impl<P: PositionSource> LocationLink<P> {
    pub fn new(source: P, config: LinkConfig) -> Self {
        Self {
            source,
            config,
            phase: LinkPhase::Uninitialized,
            phase_entered_ms: 0,
            failure: None,
            last_delivered_ms: None,
        }
    }

    /// Advance the state machine by one tick.
    ///
    /// Returns a fix only while `Running`, and only when it is newer than the
    /// last one handed out.
    pub fn poll(&mut self, now_ms: u64) -> Option<PositionFix> {
        match self.phase {
            LinkPhase::Uninitialized => {
                if self.source.permission() == PermissionState::Granted {
                    self.start_service(now_ms);
                } else {
                    self.source.request_permission();
                    self.enter(LinkPhase::AwaitingPermission, now_ms);
                }
                None
            }
            LinkPhase::AwaitingPermission => {
                match self.source.permission() {
                    PermissionState::Granted => self.start_service(now_ms),
                    PermissionState::Denied => self.fail(LinkFailure::PermissionDenied, now_ms),
                    PermissionState::Undetermined => {
                        if self.elapsed(now_ms) > self.config.permission_timeout_ms {
                            self.fail(LinkFailure::PermissionTimeout, now_ms);
                        }
                    }
                }
                None
            }
            LinkPhase::AwaitingServiceStart => {
                match self.source.status() {
                    ServiceStatus::Running => {
                        self.enter(LinkPhase::Running, now_ms);
                        return self.take_fresh_fix();
                    }
                    ServiceStatus::Failed => self.fail(LinkFailure::ServiceFailed, now_ms),
                    ServiceStatus::Initializing | ServiceStatus::Stopped => {
                        if self.elapsed(now_ms) > self.config.service_start_timeout_ms {
                            self.source.stop();
                            self.fail(LinkFailure::ServiceTimeout, now_ms);
                        }
                    }
                }
                None
            }
            LinkPhase::Running => {
                if self.source.permission() == PermissionState::Denied {
                    self.source.stop();
                    self.fail(LinkFailure::PermissionDenied, now_ms);
                    return None;
                }
                match self.source.status() {
                    ServiceStatus::Running => self.take_fresh_fix(),
                    ServiceStatus::Failed => {
                        self.fail(LinkFailure::ServiceFailed, now_ms);
                        None
                    }
                    ServiceStatus::Initializing | ServiceStatus::Stopped => {
                        // Service dropped out; give it the start-up window again.
                        self.enter(LinkPhase::AwaitingServiceStart, now_ms);
                        None
                    }
                }
            }
            LinkPhase::Failed => None,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn failure(&self) -> Option<LinkFailure> {
        self.failure
    }

    /// Leave `Failed` and try the whole bring-up again on the next poll.
    pub fn retry(&mut self) {
        self.failure = None;
        self.phase = LinkPhase::Uninitialized;
    }

    /// Stop sampling. The link restarts from scratch if polled again.
    pub fn shutdown(&mut self) {
        if matches!(self.phase, LinkPhase::Running | LinkPhase::AwaitingServiceStart) {
            self.source.stop();
        }
        self.phase = LinkPhase::Uninitialized;
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }

    fn start_service(&mut self, now_ms: u64) {
        if !self.source.is_enabled_by_user() {
            self.fail(LinkFailure::DisabledByUser, now_ms);
            return;
        }
        self.source.start();
        self.enter(LinkPhase::AwaitingServiceStart, now_ms);
    }

    fn take_fresh_fix(&mut self) -> Option<PositionFix> {
        let fix = self.source.last_fix()?;
        if self.last_delivered_ms == Some(fix.timestamp_ms) {
            return None;
        }
        self.last_delivered_ms = Some(fix.timestamp_ms);
        Some(fix)
    }

    fn enter(&mut self, phase: LinkPhase, now_ms: u64) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "location link transition");
        }
        self.phase = phase;
        self.phase_entered_ms = now_ms;
    }

    fn fail(&mut self, reason: LinkFailure, now_ms: u64) {
        warn!(?reason, "location link failed, continuing without GPS");
        self.failure = Some(reason);
        self.enter(LinkPhase::Failed, now_ms);
    }

    fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.phase_entered_ms)
    }
}

// ============================================================================
// SHARED LATEST-VALUE CELLS
// ============================================================================

/// Latest-value cell written by platform callbacks, read by the tick loop.
///
/// Writers replace the whole value under a lock, so the reader always sees a
/// complete sample. Clones share the cell.
#[derive(Debug)]
pub struct SampleSlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for SampleSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SampleSlot<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Copy> SampleSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, value: T) {
        *self.inner.lock() = Some(value);
    }

    pub fn latest(&self) -> Option<T> {
        *self.inner.lock()
    }

    /// Mark the source as having nothing to offer (e.g. AR tracking lost).
    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

impl CameraPoseSource for SampleSlot<CameraPose> {
    fn current_pose(&self) -> Option<CameraPose> {
        self.latest()
    }
}

impl MotionSource for SampleSlot<MotionSample> {
    fn latest_sample(&self) -> Option<MotionSample> {
        self.latest()
    }
}

#[derive(Debug, Clone, Copy)]
struct LocationState {
    permission: PermissionState,
    enabled: bool,
    status: ServiceStatus,
    fix: Option<PositionFix>,
    permission_requests: u32,
}

/// [`PositionSource`] backed by shared state the platform layer updates.
///
/// `start()`/`stop()` only record intent (`Initializing`/`Stopped`); the
/// platform reports `Running` via [`SharedLocation::set_status`] once fixes flow.
#[derive(Debug, Clone)]
pub struct SharedLocation {
    inner: Arc<Mutex<LocationState>>,
}

impl Default for SharedLocation {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LocationState {
                permission: PermissionState::Undetermined,
                enabled: true,
                status: ServiceStatus::Stopped,
                fix: None,
                permission_requests: 0,
            })),
        }
    }
}

impl SharedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.inner.lock().permission = permission;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
    }

    pub fn set_status(&self, status: ServiceStatus) {
        self.inner.lock().status = status;
    }

    pub fn publish_fix(&self, fix: PositionFix) {
        self.inner.lock().fix = Some(fix);
    }

    /// Number of times the link asked for permission.
    pub fn permission_requests(&self) -> u32 {
        self.inner.lock().permission_requests
    }
}

impl PositionSource for SharedLocation {
    fn permission(&self) -> PermissionState {
        self.inner.lock().permission
    }

    fn request_permission(&mut self) {
        self.inner.lock().permission_requests += 1;
    }

    fn is_enabled_by_user(&self) -> bool {
        self.inner.lock().enabled
    }

    fn start(&mut self) {
        let mut state = self.inner.lock();
        if state.status == ServiceStatus::Stopped {
            state.status = ServiceStatus::Initializing;
        }
    }

    fn stop(&mut self) {
        self.inner.lock().status = ServiceStatus::Stopped;
    }

    fn status(&self) -> ServiceStatus {
        self.inner.lock().status
    }

    fn last_fix(&self) -> Option<PositionFix> {
        self.inner.lock().fix
    }
}

// ============================================================================
// SENSOR HUB
// ============================================================================

/// Samples all three sources once per tick into a [`TickInput`].
pub struct SensorHub<P: PositionSource, C: CameraPoseSource, M: MotionSource> {
    location: LocationLink<P>,
    camera: C,
    motion: M,
    last_motion_ms: Option<u64>,
}

impl<P: PositionSource, C: CameraPoseSource, M: MotionSource> SensorHub<P, C, M> {
    pub fn new(location: LocationLink<P>, camera: C, motion: M) -> Self {
        Self {
            location,
            camera,
            motion,
            last_motion_ms: None,
        }
    }

    pub fn sample(&mut self, now_ms: u64) -> TickInput {
        let position = self.location.poll(now_ms);
        let motion_supported = self.motion.is_supported();
        TickInput {
            now_ms,
            position,
            pose: self.camera.current_pose(),
            motion: if motion_supported {
                self.fresh_motion()
            } else {
                None
            },
            gps_link: self.location.phase(),
            motion_supported,
        }
    }

    pub fn location(&self) -> &LocationLink<P> {
        &self.location
    }

    pub fn location_mut(&mut self) -> &mut LocationLink<P> {
        &mut self.location
    }

    /// Stop the location service.
    pub fn shutdown(&mut self) {
        self.location.shutdown();
    }

    // The slot keeps its last value between callbacks; each sample is
    // handed to the detector once.
    fn fresh_motion(&mut self) -> Option<MotionSample> {
        let sample = self.motion.latest_sample()?;
        if self.last_motion_ms == Some(sample.timestamp_ms) {
            return None;
        }
        self.last_motion_ms = Some(sample.timestamp_ms);
        Some(sample)
    }
}
