// SPDX-License-Identifier: CEPL-1.0
//! The two seams the presentation engine drives.
//!
//! `PresentDevice` is the GPU: surface queries, chain and view creation,
//! sync primitives, command buffers, queue submission and presentation.
//! `RenderTargets` is the pipeline/render-target collaborator: it owns one
//! framebuffer per chain image and knows how to record the draw.
//!
//! The ash implementations live in [`crate::vulkan`]; tests substitute
//! in-memory doubles so the loop can be exercised without a GPU.

use ash::vk;

use crate::error::{ChainStatus, EngineResult};
use crate::surface::SwapchainSupportDetails;
use crate::swapchain::ChainParams;

/// Fence waits never time out; a hung GPU is not recoverable here.
pub const FENCE_TIMEOUT: u64 = u64::MAX;

pub trait PresentDevice {
    /// Fresh capabilities/formats/present modes for the bound surface.
    fn surface_support(&self) -> EngineResult<SwapchainSupportDetails>;

    fn create_swapchain(&self, params: &ChainParams) -> EngineResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> EngineResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn create_image_view(&self, image: vk::Image, format: vk::Format)
        -> EngineResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_semaphore(&self) -> EngineResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> EngineResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Host-side wait, bounded by [`FENCE_TIMEOUT`].
    fn wait_for_fence(&self, fence: vk::Fence) -> EngineResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> EngineResult<()>;

    fn allocate_command_buffers(&self, count: u32) -> EngineResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    /// Reset `cmd` and open it for one-time recording.
    fn begin_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()>;
    fn end_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()>;
    /// Submit `cmd` on the graphics queue. Execution waits on `wait` at the
    /// colour-attachment-output stage and signals `signal` plus `fence`.
    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> EngineResult<()>;

    /// Out-of-date is reported as `Err(EngineError::OutOfDate)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> EngineResult<(u32, ChainStatus)>;
    /// Present on the presentation queue once `wait` is signalled.
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> EngineResult<ChainStatus>;

    fn wait_idle(&self) -> EngineResult<()>;
}

pub trait RenderTargets {
    /// (Re)create one framebuffer per view. Called after every chain build.
    fn rebuild(
        &mut self,
        format: vk::Format,
        extent: vk::Extent2D,
        views: &[vk::ImageView],
    ) -> EngineResult<()>;
    /// Destroy the framebuffers. Must tolerate being called twice.
    fn release(&mut self);
    fn framebuffer_count(&self) -> usize;
    /// Record the frame's draw into an already-begun command buffer.
    fn record(
        &self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        extent: vk::Extent2D,
    ) -> EngineResult<()>;
}
