use std::time::SystemTime;

/// One packet as handed over by a capture source.
///
/// Records move from the producer thread through the ring to the consumer; nothing else
/// holds a reference to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    pub capture_timestamp: SystemTime,
    pub data: Box<[u8]>,
    /// Length of the packet on the wire.
    pub original_length: u32,
    /// The device captured fewer bytes than `original_length` (snapshot length limit).
    pub truncated: bool,
}

impl CapturedRecord {
    pub fn new(capture_timestamp: SystemTime, data: Box<[u8]>, original_length: u32) -> Self {
        let truncated = (data.len() as u64) < u64::from(original_length);
        CapturedRecord {
            capture_timestamp,
            data,
            original_length,
            truncated,
        }
    }

    /// A record whose captured bytes are the whole packet.
    pub fn complete(capture_timestamp: SystemTime, data: impl Into<Box<[u8]>>) -> Self {
        let data = data.into();
        let original_length = u32::try_from(data.len()).unwrap_or(u32::MAX);
        Self::new(capture_timestamp, data, original_length)
    }

    pub fn captured_length(&self) -> usize {
        self.data.len()
    }
}
