//! In-memory data source and sink.

use std::sync::Mutex;

use crate::data::{DataSink, DataSource, Frame};
use crate::TextClassError;

/// Holds a single frame in memory. Reads return a copy; writes replace it.
#[derive(Debug, Default)]
pub struct MemoryFrame {
    frame: Mutex<Frame>,
}

impl MemoryFrame {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Mutex::new(frame),
        }
    }

    /// Snapshot of the current contents.
    pub fn snapshot(&self) -> Result<Frame, TextClassError> {
        self.read()
    }
}

impl DataSource for MemoryFrame {
    fn read(&self) -> Result<Frame, TextClassError> {
        self.frame
            .lock()
            .map(|f| f.clone())
            .map_err(|e| TextClassError::Data(format!("Mutex lock failed: {}", e)))
    }
}

impl DataSink for MemoryFrame {
    fn write(&self, frame: &Frame) -> Result<(), TextClassError> {
        let mut guard = self
            .frame
            .lock()
            .map_err(|e| TextClassError::Data(format!("Mutex lock failed: {}", e)))?;
        *guard = frame.clone();
        Ok(())
    }
}
