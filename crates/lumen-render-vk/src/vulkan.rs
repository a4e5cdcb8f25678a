// SPDX-License-Identifier: CEPL-1.0
//! The ash-backed [`PresentDevice`].

use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::debug;

use crate::backend::{PresentDevice, FENCE_TIMEOUT};
use crate::bootstrap::{LogicalDevice, VulkanContext};
use crate::error::{ChainStatus, EngineError, EngineResult, VkResultExt};
use crate::pipeline::FixedPipeline;
use crate::surface::{query_swapchain_support, SwapchainSupportDetails};
use crate::swapchain::ChainParams;

/// The logical device plus what the engine needs to drive it. Borrows the
/// surface from [`VulkanContext`], which must outlive it.
pub struct AshDevice {
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,

    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,

    swapchain_loader: swapchain::Device,
    cmd_pool: vk::CommandPool,
}

impl AshDevice {
    pub fn new(
        ctx: &VulkanContext,
        phys: vk::PhysicalDevice,
        logical: LogicalDevice,
        graphics_family: u32,
    ) -> EngineResult<Self> {
        let LogicalDevice {
            device,
            graphics_queue,
            present_queue,
        } = logical;

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: graphics_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let cmd_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(result) => {
                unsafe { device.destroy_device(None) };
                return Err(EngineError::Vulkan {
                    op: "create_command_pool",
                    result,
                });
            }
        };

        Ok(Self {
            surface_loader: ctx.surface_loader.clone(),
            surface: ctx.surface,
            phys,
            swapchain_loader: swapchain::Device::new(&ctx.instance, &device),
            device,
            graphics_queue,
            present_queue,
            cmd_pool,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Render targets bound to this device.
    pub fn fixed_pipeline(&self, clear_color: [f32; 4]) -> FixedPipeline {
        FixedPipeline::new(self.device.clone(), clear_color)
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.cmd_pool, None);
            self.device.destroy_device(None);
        }
        debug!("logical device destroyed");
    }
}

impl PresentDevice for AshDevice {
    fn surface_support(&self) -> EngineResult<SwapchainSupportDetails> {
        unsafe { query_swapchain_support(&self.surface_loader, self.phys, self.surface) }
    }

    fn create_swapchain(&self, params: &ChainParams) -> EngineResult<vk::SwapchainKHR> {
        let families = params.sharing.family_indices();
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: params.image_count,
            image_format: params.surface_format.format,
            image_color_space: params.surface_format.color_space,
            image_extent: params.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: params.sharing.mode(),
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: if families.is_empty() {
                std::ptr::null()
            } else {
                families.as_ptr()
            },
            pre_transform: params.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: params.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&swap_info, None) }.vk_op("create_swapchain")
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> EngineResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .vk_op("get_swapchain_images")
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> EngineResult<vk::ImageView> {
        let sub = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            subresource_range: sub,
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&iv_info, None) }.vk_op("create_image_view")
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_semaphore(&self) -> EngineResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }.vk_op("create_semaphore")
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> EngineResult<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&info, None) }.vk_op("create_fence")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> EngineResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, FENCE_TIMEOUT) }
            .vk_op("wait_for_fences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> EngineResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.vk_op("reset_fences")
    }

    fn allocate_command_buffers(&self, count: u32) -> EngineResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .vk_op("allocate_command_buffers")
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.cmd_pool, buffers) };
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .vk_op("reset_command_buffer")?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            self.device
                .begin_command_buffer(cmd, &begin)
                .vk_op("begin_command_buffer")
        }
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.vk_op("end_command_buffer")
    }

    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> EngineResult<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), fence)
        }
        .vk_op("queue_submit")
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> EngineResult<(u32, ChainStatus)> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, FENCE_TIMEOUT, signal, vk::Fence::null())
        }
        .vk_op("acquire_next_image")?;
        Ok((index, ChainStatus::from_suboptimal(suboptimal)))
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> EngineResult<ChainStatus> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let suboptimal = unsafe { self.swapchain_loader.queue_present(self.present_queue, &present) }
            .vk_op("queue_present")?;
        Ok(ChainStatus::from_suboptimal(suboptimal))
    }

    fn wait_idle(&self) -> EngineResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_op("device_wait_idle")
    }
}
