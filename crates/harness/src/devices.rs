use std::sync::Arc;

use pomolog_engine::{EngineError, ManualClock};
use pomolog_storage::MemoryLog;

use crate::{TestClient, epoch};

/// Several devices of the same user writing to one log, all on one clock.
pub struct TestDevices {
    log: MemoryLog,
    clock: Arc<ManualClock>,
    devices: Vec<TestClient>,
}

impl Default for TestDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDevices {
    pub fn new() -> Self {
        Self {
            log: MemoryLog::new(),
            clock: Arc::new(ManualClock::new(epoch())),
            devices: Vec::new(),
        }
    }

    /// Starts a new device, which replays everything written so far.
    pub fn add_device(&mut self) -> Result<usize, EngineError> {
        let device = TestClient::over(Box::new(self.log.clone()), Arc::clone(&self.clock), &[])?;
        device.source.start()?;
        let index = self.devices.len();
        self.devices.push(device);
        Ok(index)
    }

    pub fn device(&self, index: usize) -> &TestClient {
        &self.devices[index]
    }

    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(seconds);
    }

    /// Lets every device pick up what the others appended. Returns how many strategies ran.
    pub fn sync(&self) -> Result<usize, EngineError> {
        let mut total = 0;
        for device in &self.devices {
            total += device.source.refresh()?;
        }
        Ok(total)
    }
}
