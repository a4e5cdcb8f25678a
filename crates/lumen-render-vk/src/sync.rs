// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::backend::PresentDevice;
use crate::error::EngineResult;

/// Frames the host may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame primitives. The fence starts signalled so the first pass over
/// the ring never blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    fn create<D: PresentDevice>(device: &D) -> EngineResult<Self> {
        // Each creation is checked on its own so a failure part-way through
        // still releases what was made.
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    fn destroy<D: PresentDevice>(self, device: &D) {
        device.destroy_fence(self.in_flight);
        device.destroy_semaphore(self.render_finished);
        device.destroy_semaphore(self.image_available);
    }
}

/// Fixed ring of [`FrameSlot`]s. Survives chain rebuilds.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
}

impl FrameSynchronizer {
    pub fn new<D: PresentDevice>(device: &D, count: usize) -> EngineResult<Self> {
        let mut ring = Self {
            slots: Vec::with_capacity(count),
        };
        for _ in 0..count {
            match FrameSlot::create(device) {
                Ok(slot) => ring.slots.push(slot),
                Err(e) => {
                    ring.destroy(device);
                    return Err(e);
                }
            }
        }
        debug!("created {} frame slots", count);
        Ok(ring)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot for `frame_index`, recycled modulo the ring size.
    pub fn acquire_slot(&self, frame_index: usize) -> FrameSlot {
        self.slots[frame_index % self.slots.len()]
    }

    /// Index of the slot after `frame_index`.
    pub fn advance(&self, frame_index: usize) -> usize {
        (frame_index + 1) % self.slots.len()
    }

    pub fn destroy<D: PresentDevice>(&mut self, device: &D) {
        for slot in self.slots.drain(..) {
            slot.destroy(device);
        }
    }
}
