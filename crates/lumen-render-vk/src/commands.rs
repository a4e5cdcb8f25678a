// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::backend::{PresentDevice, RenderTargets};
use crate::error::EngineResult;
use crate::sync::FrameSlot;

/// One primary command buffer per chain image, re-recorded every frame.
#[derive(Debug, Default)]
pub struct CommandSubmitter {
    buffers: Vec<vk::CommandBuffer>,
    /// Fence of the last submission that used each image's buffer.
    image_fences: Vec<Option<vk::Fence>>,
}

impl CommandSubmitter {
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }

    /// Match the buffer count to the chain's image count. Called after every
    /// chain build while the device is idle.
    pub fn resize<D: PresentDevice>(&mut self, device: &D, image_count: usize) -> EngineResult<()> {
        if self.buffers.len() != image_count {
            self.release(device);
            self.buffers = device.allocate_command_buffers(image_count as u32)?;
            debug!("allocated {} command buffers", image_count);
        }
        self.image_fences = vec![None; image_count];
        Ok(())
    }

    /// Record the draw for `image_index` and submit it under `slot`.
    ///
    /// The slot's fence must already have been waited on; it is reset here,
    /// immediately before submission.
    pub fn submit<D, T>(
        &mut self,
        device: &D,
        targets: &T,
        image_index: u32,
        extent: vk::Extent2D,
        slot: &FrameSlot,
    ) -> EngineResult<()>
    where
        D: PresentDevice,
        T: RenderTargets,
    {
        let i = image_index as usize;
        let cmd = self.buffers[i];

        // A previous frame in another slot may still be reading this buffer.
        if let Some(fence) = self.image_fences[i] {
            if fence != slot.in_flight {
                device.wait_for_fence(fence)?;
            }
        }
        self.image_fences[i] = Some(slot.in_flight);

        device.begin_commands(cmd)?;
        targets.record(cmd, i, extent)?;
        device.end_commands(cmd)?;

        device.reset_fence(slot.in_flight)?;
        device.submit(cmd, slot.image_available, slot.render_finished, slot.in_flight)
    }

    pub fn release<D: PresentDevice>(&mut self, device: &D) {
        if !self.buffers.is_empty() {
            device.free_command_buffers(&self.buffers);
            self.buffers.clear();
        }
        self.image_fences.clear();
    }
}
