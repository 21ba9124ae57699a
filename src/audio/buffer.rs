use log::{debug, warn};

use crate::audio::driver::{BufferId, VoiceDriver};
use crate::error::DriverError;

/// Streaming buffers owned by one source while it holds a voice.
///
/// Buffers are either queued on the voice or parked as spares. Spares are
/// what is left when the decoder ran dry; they are refilled first once more
/// data can be produced.
#[derive(Debug, Default)]
pub struct BufferSet {
    owned: Vec<BufferId>,
    spare: Vec<BufferId>,
    underruns: u64,
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `count` driver buffers, all initially spare
    pub fn allocate(&mut self, driver: &mut dyn VoiceDriver, count: usize) -> Result<(), DriverError> {
        for _ in 0..count {
            match driver.create_buffer() {
                Ok(buffer) => {
                    self.owned.push(buffer);
                    self.spare.push(buffer);
                }
                Err(e) => {
                    warn!("Allocated {} of {} stream buffers: {}", self.owned.len(), count, e);
                    if self.owned.is_empty() {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        debug!("Allocated {} stream buffers", self.owned.len());
        Ok(())
    }

    /// Take a spare buffer, oldest first
    pub fn take_spare(&mut self) -> Option<BufferId> {
        if self.spare.is_empty() {
            None
        } else {
            Some(self.spare.remove(0))
        }
    }

    /// Park a buffer that could not be refilled
    pub fn park(&mut self, buffer: BufferId) {
        if self.owned.contains(&buffer) && !self.spare.contains(&buffer) {
            self.spare.push(buffer);
        }
    }

    /// Delete every buffer. They must already be off the voice queue.
    pub fn release_all(&mut self, driver: &mut dyn VoiceDriver) {
        for buffer in self.owned.drain(..) {
            driver.delete_buffer(buffer);
        }
        self.spare.clear();
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    pub fn spare_count(&self) -> usize {
        self.spare.len()
    }

    pub fn record_underrun(&mut self) {
        self.underruns += 1;
    }

    /// Times the voice starved and had to be restarted
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}
