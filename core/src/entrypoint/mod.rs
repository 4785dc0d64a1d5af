//! C entry points for the layer shim and the overlay.
//!
//! A profiler handle is an `Arc<DeviceProfiler>` turned into a raw pointer. Every function taking
//! one requires a handle returned by [`vkpProfilerCreate`] that has not been fully released.

use std::ffi::c_void;
use std::sync::Arc;
use std::{ptr, slice};

use tracing::{error, warn};

use crate::config::Config;
use crate::dispatch::{DeviceDispatch, DriverError, DriverResult, PipelineStage};
use crate::handle::{CommandBufferHandle, QueryPoolHandle, QueueHandle, SemaphoreHandle};
use crate::profiler::DeviceProfiler;
use crate::submission::{SubmitAux, SubmitInfo};
use crate::{logging, time, Timestamp};

mod hooks;

const SUCCESS: i32 = 0;
const NOT_READY: i32 = 1;

/// Driver calls provided by the layer shim, each receiving `user_data` first.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct VkpDispatchTable {
    pub user_data: *mut c_void,
    pub create_query_pool: unsafe extern "C" fn(*mut c_void, u32, *mut QueryPoolHandle) -> i32,
    pub destroy_query_pool: unsafe extern "C" fn(*mut c_void, QueryPoolHandle),
    pub cmd_reset_query_pool:
        unsafe extern "C" fn(*mut c_void, CommandBufferHandle, QueryPoolHandle, u32, u32),
    /// Stage 0 is top of pipe, 1 is bottom of pipe.
    pub cmd_write_timestamp:
        unsafe extern "C" fn(*mut c_void, CommandBufferHandle, u32, QueryPoolHandle, u32),
    /// Returns 0 if all results were written, 1 if some are not available yet.
    pub get_query_pool_results:
        unsafe extern "C" fn(*mut c_void, QueryPoolHandle, u32, u32, *mut u64) -> i32,
    pub create_timeline_semaphore:
        unsafe extern "C" fn(*mut c_void, u64, *mut SemaphoreHandle) -> i32,
    pub destroy_semaphore: unsafe extern "C" fn(*mut c_void, SemaphoreHandle),
    pub get_semaphore_counter_value:
        unsafe extern "C" fn(*mut c_void, SemaphoreHandle, *mut u64) -> i32,
    pub timestamp_period: f32,
    pub timestamp_valid_bits: u32,
}

struct ForeignDispatch(VkpDispatchTable);

// The shim promises that its callbacks and `user_data` may be used from any thread.
unsafe impl Send for ForeignDispatch {}
unsafe impl Sync for ForeignDispatch {}

fn check(result: i32) -> DriverResult<()> {
    match result {
        SUCCESS => Ok(()),
        err => Err(DriverError(err)),
    }
}

impl DeviceDispatch for ForeignDispatch {
    fn create_query_pool(&self, query_count: u32) -> DriverResult<QueryPoolHandle> {
        let mut pool = QueryPoolHandle::NULL;
        check(unsafe { (self.0.create_query_pool)(self.0.user_data, query_count, &mut pool) })?;
        Ok(pool)
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        unsafe { (self.0.destroy_query_pool)(self.0.user_data, pool) }
    }

    fn cmd_reset_query_pool(
        &self,
        command_buffer: CommandBufferHandle,
        pool: QueryPoolHandle,
        first_query: u32,
        query_count: u32,
    ) {
        unsafe {
            (self.0.cmd_reset_query_pool)(
                self.0.user_data,
                command_buffer,
                pool,
                first_query,
                query_count,
            )
        }
    }

    fn cmd_write_timestamp(
        &self,
        command_buffer: CommandBufferHandle,
        stage: PipelineStage,
        pool: QueryPoolHandle,
        query: u32,
    ) {
        let stage = match stage {
            PipelineStage::TopOfPipe => 0,
            PipelineStage::BottomOfPipe => 1,
        };
        unsafe {
            (self.0.cmd_write_timestamp)(self.0.user_data, command_buffer, stage, pool, query)
        }
    }

    fn get_query_pool_results(
        &self,
        pool: QueryPoolHandle,
        first_query: u32,
        results: &mut [u64],
    ) -> DriverResult<bool> {
        let result = unsafe {
            (self.0.get_query_pool_results)(
                self.0.user_data,
                pool,
                first_query,
                results.len() as u32,
                results.as_mut_ptr(),
            )
        };
        match result {
            NOT_READY => Ok(false),
            result => check(result).map(|()| true),
        }
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> DriverResult<SemaphoreHandle> {
        let mut semaphore = SemaphoreHandle::NULL;
        check(unsafe {
            (self.0.create_timeline_semaphore)(self.0.user_data, initial_value, &mut semaphore)
        })?;
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { (self.0.destroy_semaphore)(self.0.user_data, semaphore) }
    }

    fn get_semaphore_counter_value(&self, semaphore: SemaphoreHandle) -> DriverResult<u64> {
        let mut value = 0;
        check(unsafe {
            (self.0.get_semaphore_counter_value)(self.0.user_data, semaphore, &mut value)
        })?;
        Ok(value)
    }

    fn timestamp_period(&self) -> f32 {
        self.0.timestamp_period
    }

    fn timestamp_valid_bits(&self, _queue: QueueHandle) -> u32 {
        self.0.timestamp_valid_bits
    }
}

/// Summary of a finished frame for the overlay. All zero before the first frame finishes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VkpFrameSummary {
    pub frame_index: u64,
    pub cpu_time_ns: u64,
    pub gpu_time_ns: u64,
    pub command_buffer_time_ns: u64,
    pub drawcall_count: u32,
    pub unmeasured_count: u32,
    pub submit_count: u32,
    pub command_buffer_count: u32,
    pub render_pass_count: u32,
    pub pipeline_barrier_count: u32,
    pub smoothed_frame_time_ns: f64,
    pub frame_rate: f64,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct VkpSubmitInfo {
    pub command_buffer_count: u32,
    pub command_buffers: *const CommandBufferHandle,
}

#[no_mangle]
pub unsafe extern "C" fn vkpTimestampNow() -> Timestamp {
    time::timestamp_now()
}

/// Creates a profiler configured from the environment. Returns null on failure.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreate(
    dispatch: *const VkpDispatchTable,
) -> *const DeviceProfiler {
    logging::init();
    let config = Config::from_env().unwrap_or_else(|err| {
        warn!("Ignoring profiler environment: {err}");
        Config::default()
    });
    match DeviceProfiler::new(Arc::new(ForeignDispatch(*dispatch)), config) {
        Ok(profiler) => Arc::into_raw(Arc::new(profiler)),
        Err(err) => {
            error!("Failed to create profiler: {err}");
            ptr::null()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerAddRef(profiler: *const DeviceProfiler) {
    Arc::increment_strong_count(profiler);
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerRelease(profiler: *const DeviceProfiler) {
    Arc::decrement_strong_count(profiler);
}

/// Returns whether profiling was paused before.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerSetPaused(
    profiler: *const DeviceProfiler,
    paused: bool,
) -> bool {
    (*profiler).set_paused(paused)
}

/// Fills `out` with the signal to append to the submission. Returns false if there is none.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPreSubmit(
    profiler: *const DeviceProfiler,
    queue: QueueHandle,
    out: *mut SubmitAux,
) -> bool {
    match (*profiler).pre_submit_command_buffers(queue) {
        Ok(Some(aux)) => {
            *out = aux;
            true
        }
        Ok(None) => false,
        Err(err) => {
            warn!("Submission to {queue} goes unmeasured: {err}");
            false
        }
    }
}

/// `aux` is the signal filled in by [`vkpProfilerPreSubmit`], or null if there was none.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPostSubmit(
    profiler: *const DeviceProfiler,
    queue: QueueHandle,
    submit_count: u32,
    submits: *const VkpSubmitInfo,
    aux: *const SubmitAux,
    result: i32,
) {
    let submits: Vec<_> = raw_slice(submits, submit_count)
        .iter()
        .map(|submit| SubmitInfo {
            command_buffers: raw_slice(submit.command_buffers, submit.command_buffer_count),
        })
        .collect();
    // Errors have been logged already.
    let aux = aux.as_ref().copied();
    let _ = (*profiler).post_submit_command_buffers(queue, &submits, aux, check(result));
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPresent(profiler: *const DeviceProfiler, queue: QueueHandle) {
    let _ = (*profiler).present(queue);
}

/// Retires completed work. Returns false if the device was lost or another driver call failed.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPoll(profiler: *const DeviceProfiler) -> bool {
    (*profiler).poll().is_ok()
}

/// Returns false, leaving `out` zeroed, if no frame has finished yet.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerGetLatestFrame(
    profiler: *const DeviceProfiler,
    out: *mut VkpFrameSummary,
) -> bool {
    let profiler = &*profiler;
    let frame = profiler.latest_frame();
    if frame.is_empty() {
        *out = VkpFrameSummary::default();
        return false;
    }
    *out = VkpFrameSummary {
        frame_index: frame.index.0,
        cpu_time_ns: frame.cpu_time_ns,
        gpu_time_ns: frame.gpu_time_ns(),
        command_buffer_time_ns: frame.command_buffer_time_ns(),
        drawcall_count: frame.drawcall_count,
        unmeasured_count: frame.unmeasured_count,
        submit_count: frame.submit_count,
        command_buffer_count: frame.command_buffer_count,
        render_pass_count: frame.render_pass_count,
        pipeline_barrier_count: frame.stats.pipeline_barrier_count,
        smoothed_frame_time_ns: profiler.smoothed_frame_time_ns().unwrap_or(0.),
        frame_rate: profiler.frame_rate().unwrap_or(0.),
    };
    true
}

unsafe fn raw_slice<'a, T>(data: *const T, len: u32) -> &'a [T] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    use crate::command_buffer::tests::record_draw;
    use crate::command_buffer::CommandBufferLevel;
    use crate::handle::CommandPoolHandle;
    use crate::mock::MockDevice;

    static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);
    static LIVE_POOLS: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn create_query_pool(
        _: *mut c_void,
        _: u32,
        out: *mut QueryPoolHandle,
    ) -> i32 {
        LIVE_POOLS.fetch_add(1, Ordering::SeqCst);
        *out = QueryPoolHandle(NEXT_HANDLE.fetch_add(1, Ordering::SeqCst));
        SUCCESS
    }
    unsafe extern "C" fn destroy_query_pool(_: *mut c_void, _: QueryPoolHandle) {
        LIVE_POOLS.fetch_sub(1, Ordering::SeqCst);
    }
    unsafe extern "C" fn cmd_reset_query_pool(
        _: *mut c_void,
        _: CommandBufferHandle,
        _: QueryPoolHandle,
        _: u32,
        _: u32,
    ) {
    }
    unsafe extern "C" fn cmd_write_timestamp(
        _: *mut c_void,
        _: CommandBufferHandle,
        _: u32,
        _: QueryPoolHandle,
        _: u32,
    ) {
    }
    unsafe extern "C" fn get_query_pool_results(
        _: *mut c_void,
        _: QueryPoolHandle,
        _: u32,
        _: u32,
        _: *mut u64,
    ) -> i32 {
        NOT_READY
    }
    unsafe extern "C" fn create_timeline_semaphore(
        _: *mut c_void,
        _: u64,
        out: *mut SemaphoreHandle,
    ) -> i32 {
        *out = SemaphoreHandle(NEXT_HANDLE.fetch_add(1, Ordering::SeqCst));
        SUCCESS
    }
    unsafe extern "C" fn destroy_semaphore(_: *mut c_void, _: SemaphoreHandle) {}
    unsafe extern "C" fn get_semaphore_counter_value(
        _: *mut c_void,
        _: SemaphoreHandle,
        _: *mut u64,
    ) -> i32 {
        DriverError::DEVICE_LOST.0
    }

    fn table() -> VkpDispatchTable {
        VkpDispatchTable {
            user_data: ptr::null_mut(),
            create_query_pool,
            destroy_query_pool,
            cmd_reset_query_pool,
            cmd_write_timestamp,
            get_query_pool_results,
            create_timeline_semaphore,
            destroy_semaphore,
            get_semaphore_counter_value,
            timestamp_period: 1.0,
            timestamp_valid_bits: 64,
        }
    }

    #[test]
    fn foreign_dispatch_lifecycle() {
        unsafe {
            let table = table();
            let profiler = vkpProfilerCreate(&table);
            assert!(!profiler.is_null());
            assert_eq!(LIVE_POOLS.load(Ordering::SeqCst), 1);

            vkpProfilerAddRef(profiler);
            vkpProfilerRelease(profiler);
            let mut aux = SubmitAux {
                signal_semaphore: SemaphoreHandle::NULL,
                signal_value: 0,
            };
            assert!(vkpProfilerPreSubmit(profiler, QueueHandle(1), &mut aux));
            assert_eq!(aux.signal_value, 1);
            vkpProfilerPostSubmit(profiler, QueueHandle(1), 0, ptr::null(), &aux, SUCCESS);
            // Nothing is pending, so the lost device goes unnoticed.
            assert!(vkpProfilerPoll(profiler));

            vkpProfilerRelease(profiler);
            assert_eq!(LIVE_POOLS.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn latest_frame_summary() {
        let device = Arc::new(MockDevice::new());
        let profiler = DeviceProfiler::new(device.clone(), Config::default()).unwrap();
        let pool = CommandPoolHandle(1);
        let command_buffer = CommandBufferHandle(2);
        profiler.create_command_pool(pool).unwrap();
        profiler
            .allocate_command_buffers(pool, CommandBufferLevel::Primary, &[command_buffer])
            .unwrap();
        let profiler = Arc::into_raw(Arc::new(profiler));

        unsafe {
            let mut summary = VkpFrameSummary::default();
            assert!(!vkpProfilerGetLatestFrame(profiler, &mut summary));
            assert_eq!(summary, VkpFrameSummary::default());

            {
                let tracker = (*profiler).command_buffer(command_buffer).unwrap();
                let mut tracker = tracker.lock();
                tracker.begin();
                record_draw(&mut tracker, 3);
                tracker.end().unwrap();
            }

            let mut aux = SubmitAux {
                signal_semaphore: SemaphoreHandle::NULL,
                signal_value: 0,
            };
            assert!(vkpProfilerPreSubmit(profiler, QueueHandle(1), &mut aux));
            let submit = VkpSubmitInfo {
                command_buffer_count: 1,
                command_buffers: &command_buffer,
            };
            vkpProfilerPostSubmit(profiler, QueueHandle(1), 1, &submit, &aux, SUCCESS);
            device.execute(command_buffer);
            device.signal(aux.signal_semaphore, aux.signal_value);
            vkpProfilerPresent(profiler, QueueHandle(1));

            assert!(vkpProfilerGetLatestFrame(profiler, &mut summary));
            assert_eq!(summary.frame_index, 0);
            assert_eq!(summary.drawcall_count, 1);
            assert_eq!(summary.submit_count, 1);
            assert_eq!(summary.gpu_time_ns, 10);
            assert_eq!(summary.command_buffer_time_ns, 30);

            assert!(!vkpProfilerSetPaused(profiler, true));
            assert!(vkpProfilerSetPaused(profiler, false));
            assert!(vkpTimestampNow() > 0);
            vkpProfilerRelease(profiler);
        }
    }

    #[test]
    fn failed_semaphore_creation_leaves_submission_unmeasured() {
        let device = Arc::new(MockDevice::new());
        let profiler = DeviceProfiler::new(device.clone(), Config::default()).unwrap();
        let pool = CommandPoolHandle(1);
        let command_buffer = CommandBufferHandle(2);
        profiler.create_command_pool(pool).unwrap();
        profiler
            .allocate_command_buffers(pool, CommandBufferLevel::Primary, &[command_buffer])
            .unwrap();
        {
            let tracker = profiler.command_buffer(command_buffer).unwrap();
            let mut tracker = tracker.lock();
            tracker.begin();
            record_draw(&mut tracker, 3);
            tracker.end().unwrap();
        }
        device.fail_semaphore_creation(true);
        let profiler = Arc::into_raw(Arc::new(profiler));

        unsafe {
            let mut aux = SubmitAux {
                signal_semaphore: SemaphoreHandle(77),
                signal_value: 77,
            };
            assert!(!vkpProfilerPreSubmit(profiler, QueueHandle(1), &mut aux));
            assert_eq!(aux.signal_value, 77);
            let submit = VkpSubmitInfo {
                command_buffer_count: 1,
                command_buffers: &command_buffer,
            };
            vkpProfilerPostSubmit(profiler, QueueHandle(1), 1, &submit, ptr::null(), SUCCESS);
            assert_eq!((*profiler).pending_submissions(), 0);
            assert_eq!(device.live_semaphores(), 0);

            // The queue gets its semaphore once the driver recovers.
            device.fail_semaphore_creation(false);
            assert!(vkpProfilerPreSubmit(profiler, QueueHandle(1), &mut aux));
            assert_eq!(aux.signal_value, 1);
            vkpProfilerRelease(profiler);
        }
    }
}
