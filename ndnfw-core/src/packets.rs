use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::tlv::{decode_tlv_sequence, encode_tlv_sequence, TlvElement, TlvError};

/// TLV Type constants for NDN packets
pub mod tlv_types {
    pub const INTEREST: u64 = 0x05;
    pub const DATA: u64 = 0x06;
    pub const NAME: u64 = 0x07;
    pub const GENERIC_NAME_COMPONENT: u64 = 0x08;
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u64 = 0x01;
    pub const PARAMETERS_SHA256_DIGEST_COMPONENT: u64 = 0x02;
    pub const CAN_BE_PREFIX: u64 = 0x21;
    pub const MUST_BE_FRESH: u64 = 0x12;
    pub const NONCE: u64 = 0x0A;
    pub const INTEREST_LIFETIME: u64 = 0x0C;
    pub const HOP_LIMIT: u64 = 0x22;
    pub const APPLICATION_PARAMETERS: u64 = 0x24;
    pub const META_INFO: u64 = 0x14;
    pub const CONTENT: u64 = 0x15;
    pub const SIGNATURE_INFO: u64 = 0x16;
    pub const SIGNATURE_VALUE: u64 = 0x17;
    pub const CONTENT_TYPE: u64 = 0x18;
    pub const FRESHNESS_PERIOD: u64 = 0x19;
}

/// Lifetime assumed for an Interest that does not carry one.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Interest packet structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub nonce: Option<u32>,
    pub interest_lifetime: Option<Duration>,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    /// Create a new Interest with the given name
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce: None,
            interest_lifetime: None,
            hop_limit: None,
            application_parameters: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    /// Declared lifetime, or the protocol default when absent.
    pub fn lifetime(&self) -> Duration {
        self.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }

    /// Encode Interest packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut elements = vec![self.name.to_element()?];

        if self.can_be_prefix {
            elements.push(TlvElement::new(tlv_types::CAN_BE_PREFIX, Vec::new()));
        }
        if self.must_be_fresh {
            elements.push(TlvElement::new(tlv_types::MUST_BE_FRESH, Vec::new()));
        }
        if let Some(nonce) = self.nonce {
            elements.push(TlvElement::new(tlv_types::NONCE, nonce.to_be_bytes().to_vec()));
        }
        if let Some(lifetime) = self.interest_lifetime {
            elements.push(TlvElement::from_integer(
                tlv_types::INTEREST_LIFETIME,
                lifetime.as_millis() as u64,
            ));
        }
        if let Some(hop_limit) = self.hop_limit {
            elements.push(TlvElement::new(tlv_types::HOP_LIMIT, vec![hop_limit]));
        }
        if let Some(params) = &self.application_parameters {
            elements.push(TlvElement::new(tlv_types::APPLICATION_PARAMETERS, params.clone()));
        }

        TlvElement::new(tlv_types::INTEREST, encode_tlv_sequence(&elements)?).encode()
    }

    /// Decode Interest packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (element, consumed) = TlvElement::decode(data)?;
        Ok((Self::from_element(&element)?, consumed))
    }

    fn from_element(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::INTEREST {
            return Err(TlvError::InvalidType(element.type_));
        }

        let mut name = None;
        let mut interest = Interest::new(Name::new());

        for inner in decode_tlv_sequence(&element.value)? {
            match inner.type_ {
                tlv_types::NAME => name = Some(Name::from_element(&inner)?),
                tlv_types::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tlv_types::MUST_BE_FRESH => interest.must_be_fresh = true,
                tlv_types::NONCE => {
                    if let Ok(bytes) = <[u8; 4]>::try_from(inner.value.as_slice()) {
                        interest.nonce = Some(u32::from_be_bytes(bytes));
                    }
                }
                tlv_types::INTEREST_LIFETIME => {
                    interest.interest_lifetime = Some(Duration::from_millis(inner.as_integer()?));
                }
                tlv_types::HOP_LIMIT => interest.hop_limit = inner.value.first().copied(),
                tlv_types::APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(inner.value);
                }
                _ => {} // Ignore unknown elements
            }
        }

        interest.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok(interest)
    }
}

/// Data packet structure
///
/// Signature fields are carried as opaque bytes; the firewall relays Data
/// without verifying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content_type: Option<u64>,
    pub freshness_period: Option<Duration>,
    pub content: Vec<u8>,
    pub signature_info: Option<Vec<u8>>,
    pub signature_value: Option<Vec<u8>>,
}

impl Data {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content_type: None,
            freshness_period: None,
            content,
            signature_info: None,
            signature_value: None,
        }
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = Some(freshness_period);
        self
    }

    /// Encode Data packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut elements = vec![self.name.to_element()?];

        if self.content_type.is_some() || self.freshness_period.is_some() {
            let mut meta = Vec::new();
            if let Some(content_type) = self.content_type {
                meta.push(TlvElement::from_integer(tlv_types::CONTENT_TYPE, content_type));
            }
            if let Some(freshness) = self.freshness_period {
                meta.push(TlvElement::from_integer(
                    tlv_types::FRESHNESS_PERIOD,
                    freshness.as_millis() as u64,
                ));
            }
            elements.push(TlvElement::new(tlv_types::META_INFO, encode_tlv_sequence(&meta)?));
        }

        elements.push(TlvElement::new(tlv_types::CONTENT, self.content.clone()));

        if let Some(info) = &self.signature_info {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_INFO, info.clone()));
        }
        if let Some(value) = &self.signature_value {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_VALUE, value.clone()));
        }

        TlvElement::new(tlv_types::DATA, encode_tlv_sequence(&elements)?).encode()
    }

    /// Decode Data packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (element, consumed) = TlvElement::decode(data)?;
        Ok((Self::from_element(&element)?, consumed))
    }

    fn from_element(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::DATA {
            return Err(TlvError::InvalidType(element.type_));
        }

        let mut name = None;
        let mut data = Data::new(Name::new(), Vec::new());

        for inner in decode_tlv_sequence(&element.value)? {
            match inner.type_ {
                tlv_types::NAME => name = Some(Name::from_element(&inner)?),
                tlv_types::META_INFO => {
                    for meta in decode_tlv_sequence(&inner.value)? {
                        match meta.type_ {
                            tlv_types::CONTENT_TYPE => data.content_type = Some(meta.as_integer()?),
                            tlv_types::FRESHNESS_PERIOD => {
                                data.freshness_period = Some(Duration::from_millis(meta.as_integer()?));
                            }
                            _ => {}
                        }
                    }
                }
                tlv_types::CONTENT => data.content = inner.value,
                tlv_types::SIGNATURE_INFO => data.signature_info = Some(inner.value),
                tlv_types::SIGNATURE_VALUE => data.signature_value = Some(inner.value),
                _ => {} // Ignore unknown elements
            }
        }

        data.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok(data)
    }
}

/// Packet types that can be sent over the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

impl Packet {
    /// Decode a single Interest or Data, dispatching on the outer type.
    pub fn decode(wire: &[u8]) -> Result<Self, TlvError> {
        let (element, _) = TlvElement::decode(wire)?;
        match element.type_ {
            tlv_types::INTEREST => Ok(Packet::Interest(Interest::from_element(&element)?)),
            tlv_types::DATA => Ok(Packet::Data(Data::from_element(&element)?)),
            other => Err(TlvError::InvalidType(other)),
        }
    }

    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}
