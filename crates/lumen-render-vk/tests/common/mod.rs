// SPDX-License-Identifier: CEPL-1.0
//! In-memory doubles for the GPU, the render targets and the window.
//!
//! The mock GPU completes submitted work in order, and only when the host
//! waits on a fence (or the device). Waiting on a fence nothing will ever
//! signal is reported as a timeout instead of hanging the test.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use ash::vk::{self, Handle};
use lumen_render::{RenderSize, WindowEvents};
use lumen_render_vk::backend::{PresentDevice, RenderTargets};
use lumen_render_vk::device::QueueFamilies;
use lumen_render_vk::surface::SwapchainSupportDetails;
use lumen_render_vk::swapchain::{ChainParams, AUTOMATIC_EXTENT};
use lumen_render_vk::{ChainStatus, EngineError, EngineResult};

pub const SHARED: QueueFamilies = QueueFamilies {
    graphics: 0,
    present: 0,
};

/// Scripted result for one acquire or present call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Optimal,
    Suboptimal,
    OutOfDate,
    Fail(vk::Result),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Acquire,
    Submit,
    Present,
    WaitIdle,
    CreateSwapchain,
    DestroySwapchain,
    DestroyFence,
    FreeCommandBuffers,
}

/// Semaphores one frame's acquire, submit and present touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SemaphoreTrace {
    pub acquire_signal: u64,
    pub submit_wait: u64,
    pub submit_signal: u64,
    pub present_wait: u64,
}

#[derive(Default)]
pub struct GpuState {
    next_handle: u64,
    pub support: SwapchainSupportDetails,

    pub swapchains: HashMap<u64, u32>,
    pub views: HashSet<u64>,
    pub semaphores: HashSet<u64>,
    /// Live fences and whether they are signalled.
    pub fences: HashMap<u64, bool>,
    pub command_buffers: HashSet<u64>,

    /// Fences of submitted, not yet completed work, oldest first.
    pub pending: VecDeque<u64>,
    pub max_in_flight: usize,

    pub built: Vec<ChainParams>,
    pub calls: Vec<Call>,
    pub fence_waits: Vec<u64>,
    /// One entry per acquire, filled in as the frame progresses.
    pub traces: Vec<SemaphoreTrace>,
    pub next_image: u32,

    pub acquire_script: VecDeque<Outcome>,
    pub present_script: VecDeque<Outcome>,

    /// Number of successful creations before the next one fails.
    pub fail_fence_after: Option<usize>,
    pub fail_semaphore_after: Option<usize>,
    pub fail_view_after: Option<usize>,
    pub fail_swapchain: bool,
}

impl GpuState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn complete_oldest(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(f) => {
                if let Some(s) = self.fences.get_mut(&f) {
                    *s = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    pub fn live_objects(&self) -> usize {
        self.swapchains.len()
            + self.views.len()
            + self.semaphores.len()
            + self.fences.len()
            + self.command_buffers.len()
    }
}

fn tick(budget: &mut Option<usize>) -> bool {
    match budget {
        Some(0) => true,
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

fn scripted(script: &mut VecDeque<Outcome>) -> EngineResult<ChainStatus> {
    match script.pop_front().unwrap_or(Outcome::Optimal) {
        Outcome::Optimal => Ok(ChainStatus::Optimal),
        Outcome::Suboptimal => Ok(ChainStatus::Suboptimal),
        Outcome::OutOfDate => Err(EngineError::OutOfDate),
        Outcome::Fail(result) => Err(EngineError::Vulkan {
            op: "scripted",
            result,
        }),
    }
}

pub fn support(min_images: u32, max_images: u32, max_extent: vk::Extent2D) -> SwapchainSupportDetails {
    SwapchainSupportDetails {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: AUTOMATIC_EXTENT,
                height: AUTOMATIC_EXTENT,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: max_extent,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

#[derive(Clone, Default)]
pub struct MockGpu(pub Rc<RefCell<GpuState>>);

impl MockGpu {
    pub fn new() -> Self {
        let gpu = Self::default();
        gpu.0.borrow_mut().support = support(2, 3, vk::Extent2D { width: 4096, height: 4096 });
        gpu
    }

    pub fn state(&self) -> std::cell::Ref<'_, GpuState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, GpuState> {
        self.0.borrow_mut()
    }

    pub fn script_acquire(&self, outcomes: &[Outcome]) {
        self.0.borrow_mut().acquire_script.extend(outcomes);
    }

    pub fn script_present(&self, outcomes: &[Outcome]) {
        self.0.borrow_mut().present_script.extend(outcomes);
    }
}

impl PresentDevice for MockGpu {
    fn surface_support(&self) -> EngineResult<SwapchainSupportDetails> {
        Ok(self.0.borrow().support.clone())
    }

    fn create_swapchain(&self, params: &ChainParams) -> EngineResult<vk::SwapchainKHR> {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::CreateSwapchain);
        if s.fail_swapchain {
            return Err(EngineError::Vulkan {
                op: "create_swapchain",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }
        let h = s.handle();
        s.swapchains.insert(h, params.image_count);
        s.built.push(params.clone());
        Ok(vk::SwapchainKHR::from_raw(h))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> EngineResult<Vec<vk::Image>> {
        let mut s = self.0.borrow_mut();
        let count = s.swapchains[&swapchain.as_raw()];
        Ok((0..count).map(|_| vk::Image::from_raw(s.handle())).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::DestroySwapchain);
        assert!(s.swapchains.remove(&swapchain.as_raw()).is_some(), "double destroy");
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> EngineResult<vk::ImageView> {
        let mut s = self.0.borrow_mut();
        if tick(&mut s.fail_view_after) {
            return Err(EngineError::Vulkan {
                op: "create_image_view",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        let h = s.handle();
        s.views.insert(h);
        Ok(vk::ImageView::from_raw(h))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        assert!(self.0.borrow_mut().views.remove(&view.as_raw()));
    }

    fn create_semaphore(&self) -> EngineResult<vk::Semaphore> {
        let mut s = self.0.borrow_mut();
        if tick(&mut s.fail_semaphore_after) {
            return Err(EngineError::Vulkan {
                op: "create_semaphore",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            });
        }
        let h = s.handle();
        s.semaphores.insert(h);
        Ok(vk::Semaphore::from_raw(h))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        assert!(self.0.borrow_mut().semaphores.remove(&semaphore.as_raw()));
    }

    fn create_fence(&self, signaled: bool) -> EngineResult<vk::Fence> {
        let mut s = self.0.borrow_mut();
        if tick(&mut s.fail_fence_after) {
            return Err(EngineError::Vulkan {
                op: "create_fence",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            });
        }
        let h = s.handle();
        s.fences.insert(h, signaled);
        Ok(vk::Fence::from_raw(h))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::DestroyFence);
        assert!(s.fences.remove(&fence.as_raw()).is_some());
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        let f = fence.as_raw();
        s.fence_waits.push(f);
        while !s.fences[&f] {
            if !s.complete_oldest() {
                return Err(EngineError::Vulkan {
                    op: "wait_for_fences",
                    result: vk::Result::TIMEOUT,
                });
            }
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        let f = fence.as_raw();
        assert!(!s.pending.contains(&f), "reset of a fence still in use");
        s.fences.insert(f, false);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> EngineResult<Vec<vk::CommandBuffer>> {
        let mut s = self.0.borrow_mut();
        Ok((0..count)
            .map(|_| {
                let h = s.handle();
                s.command_buffers.insert(h);
                vk::CommandBuffer::from_raw(h)
            })
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::FreeCommandBuffers);
        for b in buffers {
            assert!(s.command_buffers.remove(&b.as_raw()));
        }
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        assert!(self.0.borrow().command_buffers.contains(&cmd.as_raw()));
        Ok(())
    }

    fn end_commands(&self, _cmd: vk::CommandBuffer) -> EngineResult<()> {
        Ok(())
    }

    fn submit(
        &self,
        _cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::Submit);
        if let Some(t) = s.traces.last_mut() {
            t.submit_wait = wait.as_raw();
            t.submit_signal = signal.as_raw();
        }
        let f = fence.as_raw();
        assert!(!s.fences[&f], "submitted with a signalled fence");
        s.pending.push_back(f);
        s.max_in_flight = s.max_in_flight.max(s.pending.len());
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> EngineResult<(u32, ChainStatus)> {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::Acquire);
        s.traces.push(SemaphoreTrace {
            acquire_signal: signal.as_raw(),
            ..Default::default()
        });
        let status = scripted(&mut s.acquire_script)?;
        let count = s.swapchains[&swapchain.as_raw()];
        let index = s.next_image % count;
        s.next_image = s.next_image.wrapping_add(1);
        Ok((index, status))
    }

    fn present(
        &self,
        _swapchain: vk::SwapchainKHR,
        _image_index: u32,
        wait: vk::Semaphore,
    ) -> EngineResult<ChainStatus> {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::Present);
        if let Some(t) = s.traces.last_mut() {
            t.present_wait = wait.as_raw();
        }
        scripted(&mut s.present_script)
    }

    fn wait_idle(&self) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(Call::WaitIdle);
        while s.complete_oldest() {}
        Ok(())
    }
}

#[derive(Default)]
pub struct TargetState {
    pub framebuffers: usize,
    pub rebuilds: Vec<(vk::Format, vk::Extent2D, usize)>,
    pub releases: usize,
    pub recorded: Vec<(usize, vk::Extent2D)>,
    pub fail_rebuild: bool,
}

#[derive(Clone, Default)]
pub struct MockTargets(pub Rc<RefCell<TargetState>>);

impl MockTargets {
    pub fn state(&self) -> std::cell::Ref<'_, TargetState> {
        self.0.borrow()
    }
}

impl RenderTargets for MockTargets {
    fn rebuild(&mut self, format: vk::Format, extent: vk::Extent2D, views: &[vk::ImageView]) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        if s.fail_rebuild {
            return Err(EngineError::Vulkan {
                op: "create_framebuffer",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        assert_eq!(s.framebuffers, 0, "rebuild without release");
        s.framebuffers = views.len();
        s.rebuilds.push((format, extent, views.len()));
        Ok(())
    }

    fn release(&mut self) {
        let mut s = self.0.borrow_mut();
        s.framebuffers = 0;
        s.releases += 1;
    }

    fn framebuffer_count(&self) -> usize {
        self.0.borrow().framebuffers
    }

    fn record(&self, _cmd: vk::CommandBuffer, image_index: usize, extent: vk::Extent2D) -> EngineResult<()> {
        let mut s = self.0.borrow_mut();
        assert!(image_index < s.framebuffers);
        s.recorded.push((image_index, extent));
        Ok(())
    }
}

/// Scripted window. `frames` bounds how many loop iterations `pump_events`
/// allows before reporting a close; `restore` is the size reported after the
/// next blocking wait.
#[derive(Default)]
pub struct MockWindow {
    pub running: bool,
    pub resized: bool,
    pub size: RenderSize,
    pub frames: Option<usize>,
    pub restore: VecDeque<RenderSize>,
    pub close_on_wait: bool,
    pub pumps: usize,
    pub waits: usize,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            running: true,
            size: RenderSize::new(width, height),
            ..Default::default()
        }
    }

    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = RenderSize::new(width, height);
        self.resized = true;
    }
}

impl WindowEvents for MockWindow {
    fn pump_events(&mut self) {
        self.pumps += 1;
        if let Some(n) = self.frames.as_mut() {
            if *n == 0 {
                self.running = false;
            } else {
                *n -= 1;
            }
        }
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if self.close_on_wait {
            self.running = false;
            return;
        }
        if let Some(size) = self.restore.pop_front() {
            self.resize(size.width, size.height);
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn resized(&self) -> bool {
        self.resized
    }

    fn clear_resized(&mut self) {
        self.resized = false;
    }

    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }
}
