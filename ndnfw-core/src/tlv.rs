use std::io::{self, Write};

/// NDN-TLV element codec.
///
/// Wire format:
/// - Type: VAR-NUMBER
/// - Length: VAR-NUMBER
/// - Value: `Length` bytes
///
/// A VAR-NUMBER is one byte when below 253, otherwise a marker byte
/// (`0xFD`, `0xFE`, `0xFF`) followed by 2, 4 or 8 big-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u64,
    pub value: Vec<u8>,
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum TlvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Buffer too short")]
    BufferTooShort,
    #[error("Invalid TLV type: {0:#x}")]
    InvalidType(u64),
    #[error("Missing required element {0:#x}")]
    MissingElement(u64),
    #[error("Invalid non-negative integer of {0} bytes")]
    InvalidInteger(usize),
}

impl TlvElement {
    pub fn new(type_: u64, value: Vec<u8>) -> Self {
        Self { type_, value }
    }

    /// Element carrying a NonNegativeInteger in its shortest form.
    pub fn from_integer(type_: u64, value: u64) -> Self {
        Self::new(type_, encode_non_negative_integer(value))
    }

    /// Get the total encoded length of this TLV element
    pub fn encoded_length(&self) -> usize {
        var_number_size(self.type_) + var_number_size(self.value.len() as u64) + self.value.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<(), TlvError> {
        write_var_number(self.type_, writer)?;
        write_var_number(self.value.len() as u64, writer)?;
        writer.write_all(&self.value)?;
        Ok(())
    }

    /// Decode one element, returning it with the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (type_, length, header) = decode_header(data)?;
        let end = header.checked_add(length).ok_or(TlvError::BufferTooShort)?;
        if data.len() < end {
            return Err(TlvError::BufferTooShort);
        }

        Ok((TlvElement::new(type_, data[header..end].to_vec()), end))
    }

    /// Interpret the value as a NonNegativeInteger.
    pub fn as_integer(&self) -> Result<u64, TlvError> {
        decode_non_negative_integer(&self.value)
    }
}

/// Decode the TYPE and LENGTH of the element at the start of `data`.
///
/// Returns `(type, length, header_size)`; the value itself may not be
/// present yet, which lets stream framers size a packet before it arrives.
pub fn decode_header(data: &[u8]) -> Result<(u64, usize, usize), TlvError> {
    let (type_, type_size) = read_var_number(data)?;
    let (length, length_size) = read_var_number(&data[type_size..])?;
    let length = usize::try_from(length).map_err(|_| TlvError::BufferTooShort)?;
    Ok((type_, length, type_size + length_size))
}

fn read_var_number(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first_byte = *data.first().ok_or(TlvError::BufferTooShort)?;

    let width = match first_byte {
        0..=252 => return Ok((first_byte as u64, 1)),
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
    };
    if data.len() < 1 + width {
        return Err(TlvError::BufferTooShort);
    }

    let value = data[1..1 + width]
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
    Ok((value, 1 + width))
}

fn write_var_number<W: Write>(value: u64, writer: &mut W) -> Result<(), TlvError> {
    if value < 253 {
        writer.write_all(&[value as u8])?;
    } else if value <= u16::MAX as u64 {
        writer.write_all(&[0xFD])?;
        writer.write_all(&(value as u16).to_be_bytes())?;
    } else if value <= u32::MAX as u64 {
        writer.write_all(&[0xFE])?;
        writer.write_all(&(value as u32).to_be_bytes())?;
    } else {
        writer.write_all(&[0xFF])?;
        writer.write_all(&value.to_be_bytes())?;
    }
    Ok(())
}

fn var_number_size(value: u64) -> usize {
    if value < 253 {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

pub fn encode_non_negative_integer(value: u64) -> Vec<u8> {
    if value <= u8::MAX as u64 {
        vec![value as u8]
    } else if value <= u16::MAX as u64 {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= u32::MAX as u64 {
        (value as u32).to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

pub fn decode_non_negative_integer(bytes: &[u8]) -> Result<u64, TlvError> {
    match bytes.len() {
        1 | 2 | 4 | 8 => Ok(bytes.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64)),
        other => Err(TlvError::InvalidInteger(other)),
    }
}

/// Encode multiple TLV elements into a single buffer
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Result<Vec<u8>, TlvError> {
    let total_size = elements.iter().map(|e| e.encoded_length()).sum();
    let mut buffer = Vec::with_capacity(total_size);

    for element in elements {
        element.encode_to(&mut buffer)?;
    }

    Ok(buffer)
}

/// Decode multiple TLV elements from a buffer
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let (element, consumed) = TlvElement::decode(&data[offset..])?;
        elements.push(element);
        offset += consumed;
    }

    Ok(elements)
}
