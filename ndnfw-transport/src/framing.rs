use ndnfw_core::tlv::{self, TlvError};

/// Largest packet NDN allows on a link.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;

/// Packet boundary handling for a byte-stream transport
pub trait FramingLayer {
    /// Validate a packet before it is written to the stream
    fn frame_packet(&self, packet: &[u8]) -> Result<Vec<u8>, FramingError>;

    /// Remove and return every complete packet at the front of `buffer`
    fn extract_packets(&self, buffer: &mut Vec<u8>) -> Result<Vec<Vec<u8>>, FramingError>;

    /// Check if the buffer contains at least one complete packet
    fn has_complete_packet(&self, buffer: &[u8]) -> bool;

    /// Total size of the first packet, once its header has arrived
    fn get_packet_length(&self, buffer: &[u8]) -> Option<usize>;
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),
    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },
    #[error("Packet length {declared} does not match its {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Buffer overflow")]
    BufferOverflow,
}

/// NDN-TLV framing: packets are self-delimiting, so the stream is split on
/// each outer TLV's TYPE and LENGTH without any extra prefix.
#[derive(Debug, Clone)]
pub struct TlvFramer {
    max_packet_size: usize,
}

impl TlvFramer {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Size of the first packet, `Ok(None)` while its header is incomplete.
    fn first_packet_size(&self, buffer: &[u8]) -> Result<Option<usize>, FramingError> {
        let (_, length, header) = match tlv::decode_header(buffer) {
            Ok(parsed) => parsed,
            Err(TlvError::BufferTooShort) => return Ok(None),
            Err(e) => return Err(FramingError::InvalidHeader(e.to_string())),
        };

        let size = header.saturating_add(length);
        if size > self.max_packet_size {
            return Err(FramingError::PacketTooLarge {
                size,
                max: self.max_packet_size,
            });
        }
        Ok(Some(size))
    }
}

impl Default for TlvFramer {
    fn default() -> Self {
        Self::new(MAX_NDN_PACKET_SIZE)
    }
}

impl FramingLayer for TlvFramer {
    fn frame_packet(&self, packet: &[u8]) -> Result<Vec<u8>, FramingError> {
        match self.first_packet_size(packet)? {
            Some(size) if size == packet.len() => Ok(packet.to_vec()),
            Some(size) => Err(FramingError::LengthMismatch {
                declared: size,
                actual: packet.len(),
            }),
            None => Err(FramingError::InvalidHeader("truncated TLV header".to_string())),
        }
    }

    fn extract_packets(&self, buffer: &mut Vec<u8>) -> Result<Vec<Vec<u8>>, FramingError> {
        let mut packets = Vec::new();
        let mut offset = 0;

        while let Some(size) = self.first_packet_size(&buffer[offset..])? {
            if buffer.len() - offset < size {
                break;
            }
            packets.push(buffer[offset..offset + size].to_vec());
            offset += size;
        }

        buffer.drain(..offset);
        Ok(packets)
    }

    fn has_complete_packet(&self, buffer: &[u8]) -> bool {
        matches!(self.first_packet_size(buffer), Ok(Some(size)) if buffer.len() >= size)
    }

    fn get_packet_length(&self, buffer: &[u8]) -> Option<usize> {
        self.first_packet_size(buffer).ok().flatten()
    }
}

/// Streaming packet buffer for handling partial packet reception
pub struct PacketBuffer {
    buffer: Vec<u8>,
    framer: Box<dyn FramingLayer + Send + Sync>,
    max_buffer_size: usize,
}

impl PacketBuffer {
    pub fn new(framer: Box<dyn FramingLayer + Send + Sync>, max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            framer,
            max_buffer_size,
        }
    }

    /// Add incoming data to the buffer
    pub fn add_data(&mut self, data: &[u8]) -> Result<(), FramingError> {
        if self.buffer.len() + data.len() > self.max_buffer_size {
            return Err(FramingError::BufferOverflow);
        }

        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Extract all complete packets from the buffer
    pub fn extract_packets(&mut self) -> Result<Vec<Vec<u8>>, FramingError> {
        self.framer.extract_packets(&mut self.buffer)
    }

    pub fn has_complete_packet(&self) -> bool {
        self.framer.has_complete_packet(&self.buffer)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes that `add_data` still accepts.
    pub fn remaining_capacity(&self) -> usize {
        self.max_buffer_size.saturating_sub(self.buffer.len())
    }

    /// Clear the buffer (for error recovery)
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
