//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, the per-swapchain-image frame
//! synchronization set, and [`FrameTracker`], a CPU-side ledger that refuses
//! to let a frame's command buffer be submitted unless that frame's fence was
//! waited on when the image was acquired.
//!
//! Frame lifecycle:
//! ```text
//! Idle --acquire (fence waited + reset)--> Recording --submit--> InFlight
//!   ^                                                              |
//!   +-------------- next acquire of the same index <---------------+
//! ```

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects shared by the frame loop
pub struct FrameSync {
    /// Signalled when the acquired swapchain image is ready
    pub image_available: Semaphore,
    /// Signalled when the frame's graphics work has finished
    pub render_finished: Semaphore,
    /// One fence per swapchain image, created signalled
    pub in_flight: Vec<Fence>,
}

impl FrameSync {
    /// Create the two semaphores and `image_count` signalled fences
    pub fn new(device: Device, image_count: usize) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = (0..image_count)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Fence guarding frame `index`
    pub fn fence(&self, index: usize) -> VulkanResult<&Fence> {
        self.in_flight.get(index).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No fence for frame {} ({} frames)", index, self.in_flight.len()),
        })
    }
}

/// Where one frame index is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Never used, or acquired and then abandoned
    Idle,
    /// Fence waited and reset; the command buffer may be recorded
    Recording,
    /// Submitted; the fence will signal when the GPU is done
    InFlight,
}

/// CPU-side ledger of which frame indices have work in flight
#[derive(Debug, Clone)]
pub struct FrameTracker {
    states: Vec<FrameState>,
    current: Option<usize>,
}

impl FrameTracker {
    /// Track `frame_count` frames, all idle
    pub fn new(frame_count: usize) -> Self {
        Self {
            states: vec![FrameState::Idle; frame_count],
            current: None,
        }
    }

    /// Number of tracked frames
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no frames are tracked
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of frame `index`
    pub fn state(&self, index: usize) -> Option<FrameState> {
        self.states.get(index).copied()
    }

    /// Frame currently being recorded
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Record that frame `index` was acquired and its fence waited on and reset
    ///
    /// Any other frame still marked as recording goes back to idle: it was
    /// acquired but never submitted.
    pub fn begin_frame(&mut self, index: usize) -> VulkanResult<()> {
        self.check_index(index)?;
        if let Some(previous) = self.current.take() {
            if self.states[previous] == FrameState::Recording {
                log::warn!("Frame {} was acquired but never submitted", previous);
                self.states[previous] = FrameState::Idle;
            }
        }
        self.states[index] = FrameState::Recording;
        self.current = Some(index);
        Ok(())
    }

    /// Record that frame `index` was submitted
    ///
    /// Fails unless the frame is recording, which is only true after its fence
    /// was waited on at acquire time.
    pub fn mark_submitted(&mut self, index: usize) -> VulkanResult<()> {
        self.check_index(index)?;
        match self.states[index] {
            FrameState::Recording => {
                self.states[index] = FrameState::InFlight;
                Ok(())
            }
            state => Err(VulkanError::InvalidOperation {
                reason: format!("Frame {} submitted while {:?}; acquire it first", index, state),
            }),
        }
    }

    fn check_index(&self, index: usize) -> VulkanResult<()> {
        if index < self.states.len() {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Frame index {} out of range ({} frames)",
                    index,
                    self.states.len()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_idle() {
        let tracker = FrameTracker::new(3);
        assert_eq!(tracker.len(), 3);
        assert!((0..3).all(|i| tracker.state(i) == Some(FrameState::Idle)));
        assert_eq!(tracker.current(), None);
        assert_eq!(tracker.state(3), None);
    }

    #[test]
    fn test_submit_without_acquire_is_rejected() {
        let mut tracker = FrameTracker::new(2);
        assert!(tracker.mark_submitted(0).is_err());
    }

    #[test]
    fn test_double_submit_is_rejected() {
        let mut tracker = FrameTracker::new(2);
        tracker.begin_frame(1).unwrap();
        tracker.mark_submitted(1).unwrap();
        assert_eq!(tracker.state(1), Some(FrameState::InFlight));
        assert!(tracker.mark_submitted(1).is_err());
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut tracker = FrameTracker::new(2);
        assert!(tracker.begin_frame(2).is_err());
        assert!(tracker.mark_submitted(5).is_err());
    }

    #[test]
    fn test_abandoned_frame_returns_to_idle() {
        let mut tracker = FrameTracker::new(2);
        tracker.begin_frame(0).unwrap();
        tracker.begin_frame(1).unwrap();
        assert_eq!(tracker.state(0), Some(FrameState::Idle));
        assert_eq!(tracker.current(), Some(1));
    }

    #[test]
    fn test_sequential_frames_always_wait_before_resubmit() {
        // Simulated acquire order of a driver cycling through three images
        let image_count = 3;
        let mut tracker = FrameTracker::new(image_count);
        let mut waits = vec![0usize; image_count];
        let mut submits = vec![0usize; image_count];

        for k in 0..50usize {
            let index = (k * 2 + k / 7) % image_count;

            // Resubmitting before the acquire-time wait is refused
            if submits[index] > 0 {
                assert!(tracker.mark_submitted(index).is_err());
            }

            waits[index] += 1;
            tracker.begin_frame(index).unwrap();
            tracker.mark_submitted(index).unwrap();
            submits[index] += 1;

            assert_eq!(waits[index], submits[index]);
            assert_eq!(tracker.state(index), Some(FrameState::InFlight));
        }
    }
}
