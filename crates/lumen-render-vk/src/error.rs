// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to find GPUs with Vulkan support")]
    NoDevices,
    #[error("failed to find a suitable GPU")]
    NoSuitableDevice,
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
    #[error("validation layer {0} requested but not available")]
    MissingValidationLayer(&'static str),
    #[error("window handle unavailable: {0}")]
    Window(#[from] raw_window_handle::HandleError),
    #[error("{op} failed: {result}")]
    Vulkan {
        op: &'static str,
        result: vk::Result,
    },
    /// The chain no longer matches its surface and must be rebuilt.
    #[error("swapchain out of date")]
    OutOfDate,
    /// The surface has no drawable area; the chain is built once it does.
    #[error("surface extent is zero")]
    ZeroExtent,
}

impl EngineError {
    /// `OutOfDate` and `ZeroExtent` are absorbed by the presentation loop;
    /// everything else aborts it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::OutOfDate | EngineError::ZeroExtent)
    }
}

/// How acquire/present went when they did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Optimal,
    Suboptimal,
}

impl ChainStatus {
    pub fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            ChainStatus::Suboptimal
        } else {
            ChainStatus::Optimal
        }
    }
}

pub(crate) trait VkResultExt<T> {
    /// Tags a raw Vulkan failure with the call that produced it.
    fn vk_op(self, op: &'static str) -> EngineResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk_op(self, op: &'static str) -> EngineResult<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => EngineError::OutOfDate,
            result => EngineError::Vulkan { op, result },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_chain_invalidation_is_recoverable() {
        assert!(EngineError::OutOfDate.is_recoverable());
        assert!(EngineError::ZeroExtent.is_recoverable());
        assert!(!EngineError::NoSuitableDevice.is_recoverable());
        assert!(!EngineError::Vulkan {
            op: "queue_submit",
            result: vk::Result::ERROR_DEVICE_LOST
        }
        .is_recoverable());
    }

    #[test]
    fn out_of_date_result_maps_to_recoverable_kind() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(matches!(r.vk_op("queue_present"), Err(EngineError::OutOfDate)));

        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        match r.vk_op("queue_present") {
            Err(EngineError::Vulkan { op, result }) => {
                assert_eq!(op, "queue_present");
                assert_eq!(result, vk::Result::ERROR_SURFACE_LOST_KHR);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_names_the_failing_call() {
        let e = EngineError::Vulkan {
            op: "create_fence",
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        };
        assert!(e.to_string().starts_with("create_fence failed"));
    }
}
