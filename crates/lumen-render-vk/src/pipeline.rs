// SPDX-License-Identifier: CEPL-1.0
//! Render pass, pipeline and per-image framebuffers for the single fixed
//! triangle draw.

use std::io::Cursor;

use ash::util::read_spv;
use ash::vk;
use tracing::debug;

use crate::backend::RenderTargets;
use crate::error::{EngineError, EngineResult, VkResultExt};

const VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
const FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// Objects that only depend on the chain format.
struct FormatBound {
    format: vk::Format,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

pub struct FixedPipeline {
    device: ash::Device,
    clear: vk::ClearValue,
    bound: Option<FormatBound>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl FixedPipeline {
    pub fn new(device: ash::Device, clear_color: [f32; 4]) -> Self {
        Self {
            device,
            clear: clear_value(clear_color),
            bound: None,
            framebuffers: Vec::new(),
        }
    }

    /// Takes effect on the next recorded frame.
    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = clear_value(rgba);
    }

    unsafe fn destroy_bound(&mut self) {
        if let Some(b) = self.bound.take() {
            unsafe {
                self.device.destroy_pipeline(b.pipeline, None);
                self.device.destroy_pipeline_layout(b.layout, None);
                self.device.destroy_render_pass(b.render_pass, None);
            }
        }
    }
}

fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

impl Drop for FixedPipeline {
    fn drop(&mut self) {
        self.release();
        unsafe { self.destroy_bound() };
    }
}

impl RenderTargets for FixedPipeline {
    fn rebuild(
        &mut self,
        format: vk::Format,
        extent: vk::Extent2D,
        views: &[vk::ImageView],
    ) -> EngineResult<()> {
        self.release();

        // Render pass and pipeline survive rebuilds unless the format moved.
        let render_pass = match self.bound.as_ref() {
            Some(b) if b.format == format => b.render_pass,
            _ => {
                unsafe { self.destroy_bound() };
                let bound = unsafe { create_format_bound(&self.device, format) }?;
                debug!("render pass + pipeline created for {:?}", format);
                let render_pass = bound.render_pass;
                self.bound = Some(bound);
                render_pass
            }
        };

        for view in views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.device.create_framebuffer(&fb_info, None) }
                .vk_op("create_framebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    fn release(&mut self) {
        for fb in self.framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(fb, None) };
        }
    }

    fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn record(&self, cmd: vk::CommandBuffer, image_index: usize, extent: vk::Extent2D) -> EngineResult<()> {
        let Some(bound) = self.bound.as_ref() else {
            return Err(EngineError::Vulkan {
                op: "record (no render pass)",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        };
        let d = &self.device;
        let clears = [self.clear];
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: bound.render_pass,
            framebuffer: self.framebuffers[image_index],
            render_area: area,
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, bound.pipeline);
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(cmd, 0, &[area]);
            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);
        }
        Ok(())
    }
}

unsafe fn create_format_bound(device: &ash::Device, format: vk::Format) -> EngineResult<FormatBound> {
    let render_pass = unsafe { create_render_pass(device, format) }?;
    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
        Ok(l) => l,
        Err(result) => {
            unsafe { device.destroy_render_pass(render_pass, None) };
            return Err(EngineError::Vulkan {
                op: "create_pipeline_layout",
                result,
            });
        }
    };
    match unsafe { create_pipeline(device, render_pass, layout) } {
        Ok(pipeline) => Ok(FormatBound {
            format,
            render_pass,
            layout,
            pipeline,
        }),
        Err(e) => {
            unsafe {
                device.destroy_pipeline_layout(layout, None);
                device.destroy_render_pass(render_pass, None);
            }
            Err(e)
        }
    }
}

// Render pass: single color attachment → present
unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> EngineResult<vk::RenderPass> {
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };
    // The image is only ours once the acquire semaphore (waited at this stage)
    // has signalled.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };
    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    unsafe { device.create_render_pass(&rp_info, None) }.vk_op("create_render_pass")
}

unsafe fn create_shader_module(device: &ash::Device, spv: &[u8]) -> EngineResult<vk::ShaderModule> {
    let words = read_spv(&mut Cursor::new(spv)).map_err(|_| EngineError::Vulkan {
        op: "read_spv",
        result: vk::Result::ERROR_INVALID_SHADER_NV,
    })?;
    let info = vk::ShaderModuleCreateInfo::default().code(&words);
    unsafe { device.create_shader_module(&info, None) }.vk_op("create_shader_module")
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
) -> EngineResult<vk::Pipeline> {
    let vert = unsafe { create_shader_module(device, VERT_SPV) }?;
    let frag = match unsafe { create_shader_module(device, FRAG_SPV) } {
        Ok(m) => m,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert, None) };
            return Err(e);
        }
    };

    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vert,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: frag,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    // Positions and colours come from the vertex shader itself.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };
    // Viewport and scissor are dynamic so a resize never rebuilds the pipeline.
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dynamic_states.len() as u32,
        p_dynamic_states: dynamic_states.as_ptr(),
        ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &blend,
        p_dynamic_state: &dynamic,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let result = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
    };
    unsafe {
        device.destroy_shader_module(vert, None);
        device.destroy_shader_module(frag, None);
    }
    let pipelines = result
        .map_err(|(_, result)| result)
        .vk_op("create_graphics_pipelines")?;
    Ok(pipelines[0])
}
