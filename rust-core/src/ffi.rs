//! C FFI Bindings for the host application glue
//!
//! This module exposes the walk engine to the mobile shell via C ABI. The
//! shell samples its GPS, AR and accelerometer APIs once per frame and hands
//! the values over as a [`WalkTickInput`].
//!
//! Memory Safety:
//! - All returned strings must be freed with `walk_free_string()`
//! - The engine instance must be freed with `walk_engine_destroy()`
//! - NULL checks are performed on all inputs
//!
//! Thread Safety:
//! - The engine is NOT thread-safe. Tick it from the render thread only.

use std::collections::VecDeque;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

use tracing::warn;

use crate::config::EngineConfig;
use crate::persistence::PersistenceStore;
use crate::pipeline::{TickInput, WalkEngine};
use crate::types::{
    ArHealth, CameraPose, LinkPhase, MilestoneEvent, MilestoneKind, MotionHealth, MotionSample,
    PositionFix,
};

/// Record file used when the host passes no path.
const DEFAULT_RECORD_PATH: &str = "walk_record.json";

/// Milestones kept for polling before the oldest is dropped.
const MILESTONE_QUEUE_CAPACITY: usize = 64;

// ============================================================================
// OPAQUE HANDLE TYPES
// ============================================================================

/// Opaque handle to the walk engine.
pub struct WalkEngineHandle {
    engine: WalkEngine,
    pending_milestones: VecDeque<MilestoneEvent>,
    dropped_milestones: u64,
}

impl WalkEngineHandle {
    fn queue_milestones(&mut self, events: &[MilestoneEvent]) {
        for event in events {
            if self.pending_milestones.len() >= MILESTONE_QUEUE_CAPACITY {
                self.pending_milestones.pop_front();
                self.dropped_milestones += 1;
                warn!(dropped = self.dropped_milestones, "milestone queue full, dropping oldest");
            }
            self.pending_milestones.push_back(*event);
        }
    }
}

/// Result status codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer provided.
    NullPointer = 1,
    /// Invalid parameter value.
    InvalidParameter = 2,
    /// The record could not be written. In-memory state is intact.
    PersistenceFailed = 3,
}

/// Sensor values sampled by the host for one tick.
///
/// Each `has_*` flag is 0 when the matching source had nothing this tick.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkTickInput {
    /// Tick time in milliseconds.
    pub now_ms: u64,

    pub has_position: i32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub horizontal_accuracy_m: f64,
    pub position_timestamp_ms: u64,

    pub has_pose: i32,
    /// Camera position in AR world space (meters).
    pub pose_x: f32,
    pub pose_y: f32,
    pub pose_z: f32,

    pub has_motion: i32,
    /// Accelerometer magnitude, gravity removed.
    pub accel_magnitude: f32,

    /// Location link phase (0=Uninitialized, 1=AwaitingPermission,
    /// 2=AwaitingServiceStart, 3=Running, 4=Failed).
    pub gps_phase: i32,
    /// 0 when the device has no accelerometer.
    pub motion_supported: i32,
}

/// Output from a single tick.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkTickOutput {
    pub fused_distance_m: f64,
    pub gps_distance_m: f64,
    pub ar_distance_m: f64,
    pub step_distance_m: f64,
    pub total_steps: u64,
    /// Step detected this tick (0 or 1).
    pub step_detected: i32,
    /// Milestones fired this tick; poll them with `walk_poll_milestone()`.
    pub milestone_count: i32,
    /// 1 if all counters were reset for a new day this tick.
    pub day_rolled_over: i32,
    /// 1 if a save was attempted and failed this tick.
    pub save_failed: i32,
    pub dropped_samples: u32,
    /// 0=Tracking, 1=NotTracking, 2=Lost.
    pub ar_health: i32,
    /// 0=WarmingUp, 1=Active, 2=Unsupported.
    pub motion_health: i32,
}

/// A milestone handed to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkMilestone {
    /// 0=Distance, 1=Steps.
    pub kind: i32,
    pub rung: u64,
    pub timestamp_ms: u64,
}

// ============================================================================
// ENGINE LIFECYCLE
// ============================================================================

/// Create a new walk engine and load today's record.
///
/// # Safety
/// - `config_path` and `record_path` must each be NULL or a valid
///   null-terminated C string.
/// - The returned pointer must be freed with `walk_engine_destroy()`.
///
/// # Parameters
/// - `config_path`: JSON engine config. NULL uses the defaults.
/// - `record_path`: JSON record file. NULL uses `walk_record.json`.
///
/// # Returns
/// - Pointer to the engine on success.
/// - NULL if the config cannot be read or is invalid.
#[no_mangle]
pub unsafe extern "C" fn walk_engine_create(
    config_path: *const c_char,
    record_path: *const c_char,
) -> *mut WalkEngineHandle {
    let config = match c_path(config_path) {
        Some(path) => match EngineConfig::from_json(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "rejecting engine config");
                return ptr::null_mut();
            }
        },
        None => EngineConfig::default(),
    };

    let record_path = c_path(record_path).unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_PATH));
    let store = PersistenceStore::json_file(record_path);

    match WalkEngine::new(config, store) {
        Ok(engine) => Box::into_raw(Box::new(WalkEngineHandle {
            engine,
            pending_milestones: VecDeque::with_capacity(MILESTONE_QUEUE_CAPACITY),
            dropped_milestones: 0,
        })),
        Err(e) => {
            warn!(error = %e, "failed to create walk engine");
            ptr::null_mut()
        }
    }
}

/// Save and destroy a walk engine instance.
///
/// # Safety
/// - `engine` must be a valid pointer from `walk_engine_create()`.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn walk_engine_destroy(engine: *mut WalkEngineHandle) {
    if engine.is_null() {
        return;
    }
    let mut handle = Box::from_raw(engine);
    if let Err(e) = handle.engine.shutdown() {
        warn!(error = %e, "final save failed");
    }
}

/// Zero all counters and milestone ladders, then save.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn walk_engine_reset(engine: *mut WalkEngineHandle) -> WalkStatus {
    if engine.is_null() {
        return WalkStatus::NullPointer;
    }

    let handle = &mut *engine;
    handle.pending_milestones.clear();
    match handle.engine.reset_all() {
        Ok(()) => WalkStatus::Ok,
        Err(_) => WalkStatus::PersistenceFailed,
    }
}

/// Persist the current totals now.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn walk_engine_save(engine: *mut WalkEngineHandle) -> WalkStatus {
    if engine.is_null() {
        return WalkStatus::NullPointer;
    }

    match (*engine).engine.save() {
        Ok(()) => WalkStatus::Ok,
        Err(e) => {
            warn!(error = %e, "explicit save failed");
            WalkStatus::PersistenceFailed
        }
    }
}

// ============================================================================
// TICK PROCESSING
// ============================================================================

/// Run one engine tick.
///
/// # Safety
/// - `engine` must be a valid pointer.
/// - `input` must point to a valid `WalkTickInput`.
/// - `output` must be a valid pointer to receive results.
#[no_mangle]
pub unsafe extern "C" fn walk_engine_tick(
    engine: *mut WalkEngineHandle,
    input: *const WalkTickInput,
    output: *mut WalkTickOutput,
) -> WalkStatus {
    if engine.is_null() || input.is_null() || output.is_null() {
        return WalkStatus::NullPointer;
    }

    let handle = &mut *engine;
    let raw = &*input;
    let output = &mut *output;

    let Some(gps_link) = link_phase_from_code(raw.gps_phase) else {
        return WalkStatus::InvalidParameter;
    };

    let tick_input = TickInput {
        now_ms: raw.now_ms,
        position: (raw.has_position != 0).then(|| {
            PositionFix::new(
                raw.latitude_deg,
                raw.longitude_deg,
                raw.horizontal_accuracy_m,
                raw.position_timestamp_ms,
            )
        }),
        pose: (raw.has_pose != 0)
            .then(|| CameraPose::new([raw.pose_x, raw.pose_y, raw.pose_z], raw.now_ms)),
        motion: (raw.has_motion != 0).then(|| MotionSample::new(raw.accel_magnitude, raw.now_ms)),
        gps_link,
        motion_supported: raw.motion_supported != 0,
    };

    let report = handle.engine.tick(&tick_input);
    handle.queue_milestones(&report.milestones);

    let distance = handle.engine.distance_state();
    let health = handle.engine.health();
    *output = WalkTickOutput {
        fused_distance_m: distance.fused_total_m,
        gps_distance_m: distance.gps_total_m,
        ar_distance_m: distance.ar_total_m,
        step_distance_m: handle.engine.step_distance_m(),
        total_steps: handle.engine.total_steps(),
        step_detected: i32::from(report.step.is_some()),
        milestone_count: report.milestones.len() as i32,
        day_rolled_over: i32::from(report.day_rolled_over),
        save_failed: i32::from(report.save_failed),
        dropped_samples: report.dropped_samples,
        ar_health: match health.ar {
            ArHealth::Tracking => 0,
            ArHealth::NotTracking => 1,
            ArHealth::Lost => 2,
        },
        motion_health: match health.motion {
            MotionHealth::WarmingUp => 0,
            MotionHealth::Active => 1,
            MotionHealth::Unsupported => 2,
        },
    };

    WalkStatus::Ok
}

/// Pop the oldest pending milestone.
///
/// # Safety
/// - `engine` must be a valid pointer.
/// - `out` must be a valid pointer to receive the milestone.
///
/// # Returns
/// - 1 if a milestone was written to `out`.
/// - 0 if none are pending.
/// - -1 on NULL input.
#[no_mangle]
pub unsafe extern "C" fn walk_poll_milestone(
    engine: *mut WalkEngineHandle,
    out: *mut WalkMilestone,
) -> i32 {
    if engine.is_null() || out.is_null() {
        return -1;
    }

    match (*engine).pending_milestones.pop_front() {
        Some(event) => {
            *out = WalkMilestone {
                kind: match event.kind {
                    MilestoneKind::Distance => 0,
                    MilestoneKind::Steps => 1,
                },
                rung: event.rung,
                timestamp_ms: event.timestamp_ms,
            };
            1
        }
        None => 0,
    }
}

// ============================================================================
// STATUS QUERIES
// ============================================================================

/// Get the fused distance in meters. Negative on NULL input.
#[no_mangle]
pub unsafe extern "C" fn walk_get_fused_distance_m(engine: *const WalkEngineHandle) -> f64 {
    if engine.is_null() {
        return -1.0;
    }
    (*engine).engine.fused_distance_m()
}

/// Get the total number of steps detected today.
#[no_mangle]
pub unsafe extern "C" fn walk_get_step_count(engine: *const WalkEngineHandle) -> i64 {
    if engine.is_null() {
        return -1;
    }
    i64::try_from((*engine).engine.total_steps()).unwrap_or(i64::MAX)
}

/// Get the distance implied by the step count.
#[no_mangle]
pub unsafe extern "C" fn walk_get_step_distance_m(engine: *const WalkEngineHandle) -> f64 {
    if engine.is_null() {
        return -1.0;
    }
    (*engine).engine.step_distance_m()
}

/// Get the engine snapshot as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer.
///
/// # Returns
/// - JSON string (MUST be freed with `walk_free_string()`).
/// - NULL on error.
#[no_mangle]
pub unsafe extern "C" fn walk_snapshot_json(engine: *const WalkEngineHandle) -> *mut c_char {
    if engine.is_null() {
        return ptr::null_mut();
    }

    let snapshot = (*engine).engine.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => match CString::new(json) {
            Ok(cstring) => cstring.into_raw(),
            Err(_) => ptr::null_mut(),
        },
        Err(e) => {
            warn!(error = %e, "failed to encode snapshot");
            ptr::null_mut()
        }
    }
}

/// Free a string returned by `walk_snapshot_json()`.
///
/// # Safety
/// - `ptr` must be a string returned by this library.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn walk_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Get the library version string.
///
/// # Returns
/// - Static string, do NOT free.
#[no_mangle]
pub extern "C" fn walk_version() -> *const c_char {
    static VERSION: &[u8] = concat!("trace-walk/", env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// HELPERS
// ============================================================================

unsafe fn c_path(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) if !s.is_empty() => Some(PathBuf::from(s)),
        Ok(_) => None,
        Err(_) => {
            warn!("ignoring non UTF-8 path");
            None
        }
    }
}

fn link_phase_from_code(code: i32) -> Option<LinkPhase> {
    match code {
        0 => Some(LinkPhase::Uninitialized),
        1 => Some(LinkPhase::AwaitingPermission),
        2 => Some(LinkPhase::AwaitingServiceStart),
        3 => Some(LinkPhase::Running),
        4 => Some(LinkPhase::Failed),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
