//! BACnet/IP wire codec
//!
//! NPDU and APDU framing comes from `bacnet-rs`; this module adds the
//! BVLC layer, the translation between the crate's network addresses and
//! the registry's, and the tagged bodies of the services the gateway
//! answers. Segmented messages are recognized but never produced.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bacnet_rs::app::{Apdu, MaxApduSize, MaxSegments};
use bacnet_rs::network::{NetworkAddress, Npdu};
use bacnet_rs::object::{ObjectIdentifier, ObjectType as BacnetObjectType};
use bacnet_rs::service::{AbortReason, IAmRequest, WhoIsRequest};
use bacnet_rs::{BACNET_MAX_APDU, BACNET_PROTOCOL_VERSION};
use bytes::{BufMut, BytesMut};

use crate::device::DeviceAddress;
use crate::error::CodecError;
use crate::object::{ActionCommand, ArrayIndex, ObjectId, PropertyError, PropertyId, PropertyValue};

pub const BVLC_TYPE: u8 = 0x81;

pub mod bvlc {
    pub const FORWARDED_NPDU: u8 = 0x04;
    pub const ORIGINAL_UNICAST: u8 = 0x0A;
    pub const ORIGINAL_BROADCAST: u8 = 0x0B;
}

pub mod service {
    use bacnet_rs::service::{ConfirmedServiceChoice, UnconfirmedServiceChoice};

    pub const CONFIRMED_COV_NOTIFICATION: u8 = 1;
    pub const SUBSCRIBE_COV: u8 = 5;
    pub const READ_PROPERTY: u8 = ConfirmedServiceChoice::ReadProperty as u8;
    pub const READ_PROPERTY_MULTIPLE: u8 = ConfirmedServiceChoice::ReadPropertyMultiple as u8;
    pub const WRITE_PROPERTY: u8 = ConfirmedServiceChoice::WriteProperty as u8;

    pub const I_AM: u8 = UnconfirmedServiceChoice::IAm as u8;
    pub const I_HAVE: u8 = 1;
    pub const UNCONFIRMED_COV_NOTIFICATION: u8 = 2;
    pub const WHO_HAS: u8 = 7;
    pub const WHO_IS: u8 = UnconfirmedServiceChoice::WhoIs as u8;
}

pub mod network_message {
    pub const WHO_IS_ROUTER_TO_NETWORK: u8 = 0x00;
    pub const I_AM_ROUTER_TO_NETWORK: u8 = 0x01;
}

pub const REJECT_INVALID_TAG: u8 = 4;
pub const REJECT_MISSING_REQUIRED_PARAMETER: u8 = 5;
pub const REJECT_UNRECOGNIZED_SERVICE: u8 = 9;
pub const ABORT_SEGMENTATION_NOT_SUPPORTED: u8 = AbortReason::SegmentationNotSupported as u8;
/// Global broadcast network number
pub const BROADCAST_NET: u16 = 0xFFFF;
/// Segmentation-supported value for "no segmentation"
pub const SEGMENTATION_NONE: u32 = 3;

const HOP_COUNT: u8 = 255;

mod app_tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const UNSIGNED: u8 = 2;
    pub const SIGNED: u8 = 3;
    pub const REAL: u8 = 4;
    pub const CHARACTER_STRING: u8 = 7;
    pub const BIT_STRING: u8 = 8;
    pub const ENUMERATED: u8 = 9;
    pub const OBJECT_ID: u8 = 12;
}

// ---------------------------------------------------------------- BVLC

/// A decoded BVLC header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bvlc<'a> {
    pub function: u8,
    /// Original sender of a forwarded NPDU
    pub origin: Option<SocketAddr>,
    pub npdu: &'a [u8],
}

pub fn decode_bvlc(data: &[u8]) -> Result<Bvlc<'_>, CodecError> {
    if data.len() < 4 {
        return Err(CodecError::Truncated);
    }
    if data[0] != BVLC_TYPE {
        return Err(CodecError::Bvlc(format!("type 0x{:02X}", data[0])));
    }
    let len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if len != data.len() {
        return Err(CodecError::Bvlc(format!("length {} for a {} byte packet", len, data.len())));
    }

    match data[1] {
        function @ (bvlc::ORIGINAL_UNICAST | bvlc::ORIGINAL_BROADCAST) => Ok(Bvlc {
            function,
            origin: None,
            npdu: &data[4..],
        }),
        bvlc::FORWARDED_NPDU => {
            if data.len() < 10 {
                return Err(CodecError::Truncated);
            }
            let ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
            let port = u16::from_be_bytes([data[8], data[9]]);
            Ok(Bvlc {
                function: bvlc::FORWARDED_NPDU,
                origin: Some(SocketAddr::V4(SocketAddrV4::new(ip, port))),
                npdu: &data[10..],
            })
        }
        other => Err(CodecError::Bvlc(format!("unsupported function 0x{:02X}", other))),
    }
}

pub fn encode_bvlc(function: u8, npdu: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + npdu.len());
    buf.put_u8(BVLC_TYPE);
    buf.put_u8(function);
    buf.put_u16((4 + npdu.len()) as u16);
    buf.put_slice(npdu);
    buf.to_vec()
}

/// BACnet/IP MAC of a socket address: IPv4 octets then port
pub fn socket_mac(addr: SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut mac = v4.ip().octets().to_vec();
            mac.extend_from_slice(&v4.port().to_be_bytes());
            mac
        }
        SocketAddr::V6(_) => Vec::new(),
    }
}

// ---------------------------------------------------------------- NPDU

/// The routing view of an NPDU header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NpduHeader {
    /// Message type of a network-layer message
    pub network_message: Option<u8>,
    pub expecting_reply: bool,
    pub priority: u8,
    pub destination: Option<DeviceAddress>,
    pub source: Option<DeviceAddress>,
}

impl NpduHeader {
    /// Header of a reply to `request`, sent from `source`
    pub fn reply_to(request: &NpduHeader, source: Option<DeviceAddress>) -> Self {
        Self {
            network_message: None,
            expecting_reply: false,
            priority: request.priority,
            destination: request.source.clone(),
            source,
        }
    }
}

fn network_address(address: &DeviceAddress) -> NetworkAddress {
    NetworkAddress {
        network: address.net,
        address: address.mac.clone(),
    }
}

fn device_address(address: &NetworkAddress) -> DeviceAddress {
    DeviceAddress {
        net: address.network,
        mac: address.address.clone(),
    }
}

/// Decode an NPDU header; returns it with the remaining bytes
pub fn decode_npdu(data: &[u8]) -> Result<(NpduHeader, &[u8]), CodecError> {
    match data.first() {
        None => return Err(CodecError::Truncated),
        Some(&version) if version != BACNET_PROTOCOL_VERSION => {
            return Err(CodecError::Npdu(format!("version {}", version)));
        }
        Some(_) => {}
    }
    let (npdu, _) = Npdu::decode(data).map_err(|e| CodecError::Npdu(format!("{:?}", e)))?;

    let destination = npdu.destination.as_ref().map(device_address);
    let source = npdu.source.as_ref().map(device_address);

    // Version, control, each address as DNET/SNET + length + MAC, hop count
    let mut offset = 2 + [&destination, &source]
        .into_iter()
        .flatten()
        .map(|address| 3 + address.mac.len())
        .sum::<usize>();
    if destination.is_some() {
        offset += 1;
    }
    let rest = data.get(offset..).ok_or(CodecError::Truncated)?;

    let (network_message, rest) = if npdu.control.network_message {
        let (&message, rest) = rest.split_first().ok_or(CodecError::Truncated)?;
        (Some(message), rest)
    } else {
        (None, rest)
    };

    let header = NpduHeader {
        network_message,
        expecting_reply: npdu.control.expecting_reply,
        priority: npdu.control.priority,
        destination,
        source,
    };
    Ok((header, rest))
}

pub fn encode_npdu(header: &NpduHeader) -> Vec<u8> {
    let mut npdu = Npdu::new();
    npdu.control.network_message = header.network_message.is_some();
    npdu.control.expecting_reply = header.expecting_reply;
    npdu.control.priority = header.priority;
    if let Some(destination) = &header.destination {
        npdu.control.destination_present = true;
        npdu.destination = Some(network_address(destination));
        npdu.hop_count = Some(HOP_COUNT);
    }
    if let Some(source) = &header.source {
        npdu.control.source_present = true;
        npdu.source = Some(network_address(source));
    }

    let mut bytes = npdu.encode();
    bytes.extend(header.network_message);
    bytes
}

// ---------------------------------------------------------------- APDU

pub fn decode_apdu(data: &[u8]) -> Result<Apdu, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Truncated);
    }
    Apdu::decode(data).map_err(|e| CodecError::Apdu(format!("{:?}", e)))
}

/// Largest response a confirmed request says its sender accepts
pub fn max_apdu_accepted(request: &[u8]) -> usize {
    let accepted = match request.get(1).map(|byte| byte & 0x0F) {
        Some(0) => 50,
        Some(1) => 128,
        Some(2) => 206,
        Some(3) => 480,
        Some(4) => 1024,
        _ => BACNET_MAX_APDU,
    };
    accepted.min(BACNET_MAX_APDU)
}

pub fn simple_ack(invoke_id: u8, service: u8) -> Vec<u8> {
    Apdu::SimpleAck {
        invoke_id,
        service_choice: service,
    }
    .encode()
}

pub fn complex_ack(invoke_id: u8, service: u8, service_data: Vec<u8>) -> Vec<u8> {
    Apdu::ComplexAck {
        segmented: false,
        more_follows: false,
        invoke_id,
        sequence_number: None,
        proposed_window_size: None,
        service_choice: service,
        service_data,
    }
    .encode()
}

pub fn error(invoke_id: u8, service: u8, error: PropertyError) -> Vec<u8> {
    Apdu::Error {
        invoke_id,
        service_choice: service,
        error_class: (error.class as u8).into(),
        error_code: (error.code as u8).into(),
    }
    .encode()
}

pub fn reject(invoke_id: u8, reason: u8) -> Vec<u8> {
    Apdu::Reject {
        invoke_id,
        reject_reason: reason,
    }
    .encode()
}

/// Abort sent by the server side
pub fn abort(invoke_id: u8, reason: u8) -> Vec<u8> {
    Apdu::Abort {
        server: true,
        invoke_id,
        abort_reason: reason,
    }
    .encode()
}

pub fn unconfirmed(service: u8, service_data: Vec<u8>) -> Vec<u8> {
    Apdu::UnconfirmedRequest {
        service_choice: service,
        service_data,
    }
    .encode()
}

/// A confirmed request originated by the gateway; no segmented replies
pub fn confirmed_request(invoke_id: u8, service: u8, service_data: Vec<u8>) -> Vec<u8> {
    Apdu::ConfirmedRequest {
        segmented: false,
        more_follows: false,
        segmented_response_accepted: false,
        max_segments: MaxSegments::Unspecified,
        max_response_size: MaxApduSize::Up1476,
        invoke_id,
        sequence_number: None,
        proposed_window_size: None,
        service_choice: service,
        service_data,
    }
    .encode()
}

pub fn decode_who_is(data: &[u8]) -> Result<WhoIsRequest, CodecError> {
    if data.is_empty() {
        return Ok(WhoIsRequest::new());
    }
    WhoIsRequest::decode(data).map_err(|e| CodecError::InvalidTag(format!("Who-Is: {:?}", e)))
}

/// Unconfirmed I-Am announcing `instance`
pub fn i_am(instance: u32, max_apdu: u32, vendor_id: u16) -> Result<Vec<u8>, CodecError> {
    let request = IAmRequest::new(
        ObjectIdentifier::new(BacnetObjectType::Device, instance),
        max_apdu as _,
        SEGMENTATION_NONE as _,
        vendor_id as _,
    );
    let mut service_data = Vec::new();
    request
        .encode(&mut service_data)
        .map_err(|e| CodecError::Apdu(format!("I-Am: {:?}", e)))?;
    Ok(unconfirmed(service::I_AM, service_data))
}

// ---------------------------------------------------------------- services

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyRequest {
    pub object: ObjectId,
    pub property: PropertyId,
    pub index: ArrayIndex,
}

impl ReadPropertyRequest {
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let object = r.context_object_id(0)?;
        let property = PropertyId::from_code(r.context_unsigned(1)?);
        let index = ArrayIndex::from_raw(r.optional_context_unsigned(2)?);
        Ok(Self { object, property, index })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyRequest {
    pub object: ObjectId,
    pub property: PropertyId,
    pub index: ArrayIndex,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

impl WritePropertyRequest {
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let object = r.context_object_id(0)?;
        let property = PropertyId::from_code(r.context_unsigned(1)?);
        let index = ArrayIndex::from_raw(r.optional_context_unsigned(2)?);
        r.expect_opening(3)?;
        let value = r.application_value()?;
        r.expect_closing(3)?;
        let priority = r.optional_context_unsigned(4)?.map(|p| p as u8);
        Ok(Self {
            object,
            property,
            index,
            value,
            priority,
        })
    }
}


pub fn encode_read_property_ack(request: &ReadPropertyRequest, value: &PropertyValue) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_context_object_id(&mut buf, 0, request.object);
    encode_context_unsigned(&mut buf, 1, request.property.code());
    if let ArrayIndex::Index(index) = request.index {
        encode_context_unsigned(&mut buf, 2, index);
    }
    encode_opening(&mut buf, 3);
    encode_application(&mut buf, value);
    encode_closing(&mut buf, 3);
    buf.to_vec()
}

/// One object and the properties read from it
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAccess {
    pub object: ObjectId,
    pub properties: Vec<(PropertyId, ArrayIndex)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMultipleRequest {
    pub specs: Vec<ReadAccess>,
}

impl ReadPropertyMultipleRequest {
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let mut specs = Vec::new();
        loop {
            let object = r.context_object_id(0)?;
            r.expect_opening(1)?;
            let mut properties = Vec::new();
            while r.peek_tag()? != Tag::Closing(1) {
                let property = PropertyId::from_code(r.context_unsigned(0)?);
                let index = ArrayIndex::from_raw(r.optional_context_unsigned(1)?);
                properties.push((property, index));
            }
            r.expect_closing(1)?;
            if properties.is_empty() {
                return Err(CodecError::InvalidTag("empty property reference list".to_string()));
            }
            specs.push(ReadAccess { object, properties });
            if r.is_empty() {
                return Ok(Self { specs });
            }
        }
    }
}

/// The outcome of reading one property of a read-access list
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResult {
    pub property: PropertyId,
    pub index: ArrayIndex,
    pub value: Result<PropertyValue, PropertyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadAccessResult {
    pub object: ObjectId,
    pub results: Vec<PropertyResult>,
}

pub fn encode_read_property_multiple_ack(results: &[ReadAccessResult]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for access in results {
        encode_context_object_id(&mut buf, 0, access.object);
        encode_opening(&mut buf, 1);
        for result in &access.results {
            encode_context_unsigned(&mut buf, 2, result.property.code());
            if let ArrayIndex::Index(index) = result.index {
                encode_context_unsigned(&mut buf, 3, index);
            }
            match &result.value {
                Ok(value) => {
                    encode_opening(&mut buf, 4);
                    encode_application(&mut buf, value);
                    encode_closing(&mut buf, 4);
                }
                Err(error) => {
                    encode_opening(&mut buf, 5);
                    encode_application(&mut buf, &PropertyValue::Enumerated(error.class as u32));
                    encode_application(&mut buf, &PropertyValue::Enumerated(error.code as u32));
                    encode_closing(&mut buf, 5);
                }
            }
        }
        encode_closing(&mut buf, 1);
    }
    buf.to_vec()
}

/// The object a Who-Has looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoHasObject {
    Id(ObjectId),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoHas {
    pub range: Option<(u32, u32)>,
    pub object: WhoHasObject,
}

impl WhoHas {
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let range = match (r.optional_context_unsigned(0)?, r.optional_context_unsigned(1)?) {
            (Some(low), Some(high)) => Some((low, high)),
            (None, None) => None,
            _ => return Err(CodecError::InvalidTag("half-open device range".to_string())),
        };
        let object = match r.peek_tag()? {
            Tag::Context { number: 2, .. } => WhoHasObject::Id(r.context_object_id(2)?),
            Tag::Context { number: 3, .. } => WhoHasObject::Name(r.context_character_string(3)?),
            other => return Err(CodecError::InvalidTag(format!("expected an object, got {:?}", other))),
        };
        Ok(Self { range, object })
    }

    pub fn matches(&self, instance: u32) -> bool {
        self.range.is_none_or(|(low, high)| (low..=high).contains(&instance))
    }
}

pub fn encode_i_have(device: ObjectId, object: ObjectId, name: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_application(&mut buf, &PropertyValue::ObjectIdentifier(device));
    encode_application(&mut buf, &PropertyValue::ObjectIdentifier(object));
    encode_application(&mut buf, &PropertyValue::CharacterString(name.to_string()));
    buf.to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeCovRequest {
    pub process_id: u32,
    pub object: ObjectId,
    pub confirmed: Option<bool>,
    /// Seconds; zero or absent means indefinite
    pub lifetime: Option<u32>,
}

impl SubscribeCovRequest {
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let process_id = r.context_unsigned(0)?;
        let object = r.context_object_id(1)?;
        let confirmed = r.optional_context_bool(2)?;
        let lifetime = r.optional_context_unsigned(3)?;
        Ok(Self {
            process_id,
            object,
            confirmed,
            lifetime,
        })
    }

    /// A request carrying neither flag nor lifetime cancels the subscription
    pub fn is_cancellation(&self) -> bool {
        self.confirmed.is_none() && self.lifetime.is_none()
    }
}

/// Body of a confirmed or unconfirmed COV notification
#[derive(Debug, Clone, PartialEq)]
pub struct CovNotification<'a> {
    pub process_id: u32,
    pub device: ObjectId,
    pub object: ObjectId,
    pub time_remaining: u32,
    pub values: &'a [(PropertyId, PropertyValue)],
}

impl CovNotification<'_> {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_context_unsigned(&mut buf, 0, self.process_id);
        encode_context_object_id(&mut buf, 1, self.device);
        encode_context_object_id(&mut buf, 2, self.object);
        encode_context_unsigned(&mut buf, 3, self.time_remaining);
        encode_opening(&mut buf, 4);
        for (property, value) in self.values {
            encode_context_unsigned(&mut buf, 0, property.code());
            encode_opening(&mut buf, 2);
            encode_application(&mut buf, value);
            encode_closing(&mut buf, 2);
        }
        encode_closing(&mut buf, 4);
        buf.to_vec()
    }
}

// ---------------------------------------------------------------- tags

/// A decoded tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// For application booleans `len` holds the value
    Application { number: u8, len: u32 },
    Context { number: u8, len: u32 },
    Opening(u8),
    Closing(u8),
}

/// Bounds-checked cursor over a tagged byte stream
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() < len {
            return Err(CodecError::Truncated);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub fn tag(&mut self) -> Result<Tag, CodecError> {
        let first = self.u8()?;
        let mut number = first >> 4;
        if number == 0x0F {
            number = self.u8()?;
        }
        let context = first & 0x08 != 0;
        let lvt = first & 0x07;

        if context && lvt == 6 {
            return Ok(Tag::Opening(number));
        }
        if context && lvt == 7 {
            return Ok(Tag::Closing(number));
        }
        if !context && number == app_tag::BOOLEAN {
            return Ok(Tag::Application {
                number,
                len: lvt.into(),
            });
        }

        let len = if lvt == 5 {
            match self.u8()? {
                254 => self.u16()?.into(),
                255 => {
                    let bytes = self.bytes(4)?;
                    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                }
                n => n.into(),
            }
        } else {
            lvt.into()
        };

        Ok(if context {
            Tag::Context { number, len }
        } else {
            Tag::Application { number, len }
        })
    }

    pub fn peek_tag(&self) -> Result<Tag, CodecError> {
        self.clone().tag()
    }

    fn unsigned(&mut self, len: u32) -> Result<u32, CodecError> {
        if !(1..=4).contains(&len) {
            return Err(CodecError::InvalidTag(format!("unsigned of {} bytes", len)));
        }
        Ok(self
            .bytes(len as usize)?
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
    }

    fn signed(&mut self, len: u32) -> Result<i32, CodecError> {
        let raw = self.unsigned(len)?;
        let shift = 32 - 8 * len;
        Ok(((raw << shift) as i32) >> shift)
    }

    fn context(&mut self, expected: u8) -> Result<u32, CodecError> {
        match self.tag()? {
            Tag::Context { number, len } if number == expected => Ok(len),
            other => Err(CodecError::InvalidTag(format!("expected context {}, got {:?}", expected, other))),
        }
    }

    pub fn context_unsigned(&mut self, number: u8) -> Result<u32, CodecError> {
        let len = self.context(number)?;
        self.unsigned(len)
    }

    pub fn optional_context_unsigned(&mut self, number: u8) -> Result<Option<u32>, CodecError> {
        if self.is_empty() {
            return Ok(None);
        }
        match self.peek_tag()? {
            Tag::Context { number: n, .. } if n == number => self.context_unsigned(number).map(Some),
            _ => Ok(None),
        }
    }

    pub fn context_object_id(&mut self, number: u8) -> Result<ObjectId, CodecError> {
        let len = self.context(number)?;
        if len != 4 {
            return Err(CodecError::InvalidTag(format!("object identifier of {} bytes", len)));
        }
        Ok(ObjectId::from_packed(self.unsigned(4)?))
    }

    pub fn optional_context_bool(&mut self, number: u8) -> Result<Option<bool>, CodecError> {
        if self.is_empty() {
            return Ok(None);
        }
        match self.peek_tag()? {
            Tag::Context { number: n, len: 1 } if n == number => {
                self.tag()?;
                Ok(Some(self.u8()? != 0))
            }
            Tag::Context { number: n, len } if n == number => {
                Err(CodecError::InvalidTag(format!("boolean of {} bytes", len)))
            }
            _ => Ok(None),
        }
    }

    pub fn context_character_string(&mut self, number: u8) -> Result<String, CodecError> {
        let len = self.context(number)?;
        self.character_string(len)
    }

    /// UTF-8 character string body: a charset byte, then the text
    fn character_string(&mut self, len: u32) -> Result<String, CodecError> {
        let bytes = self.bytes(len as usize)?;
        let Some((&charset, text)) = bytes.split_first() else {
            return Err(CodecError::InvalidTag("empty character string".to_string()));
        };
        if charset != 0 {
            return Err(CodecError::InvalidTag(format!("character set {}", charset)));
        }
        String::from_utf8(text.to_vec()).map_err(|_| CodecError::InvalidTag("character string is not UTF-8".to_string()))
    }

    pub fn expect_opening(&mut self, number: u8) -> Result<(), CodecError> {
        match self.tag()? {
            Tag::Opening(n) if n == number => Ok(()),
            other => Err(CodecError::InvalidTag(format!("expected opening {}, got {:?}", number, other))),
        }
    }

    pub fn expect_closing(&mut self, number: u8) -> Result<(), CodecError> {
        match self.tag()? {
            Tag::Closing(n) if n == number => Ok(()),
            other => Err(CodecError::InvalidTag(format!("expected closing {}, got {:?}", number, other))),
        }
    }

    /// Decode one application-tagged primitive
    pub fn application_value(&mut self) -> Result<PropertyValue, CodecError> {
        let Tag::Application { number, len } = self.tag()? else {
            return Err(CodecError::InvalidTag("expected an application tag".to_string()));
        };

        match number {
            app_tag::NULL => Ok(PropertyValue::Null),
            app_tag::BOOLEAN => Ok(PropertyValue::Boolean(len != 0)),
            app_tag::UNSIGNED => self.unsigned(len).map(PropertyValue::Unsigned),
            app_tag::SIGNED => self.signed(len).map(PropertyValue::Signed),
            app_tag::REAL => {
                if len != 4 {
                    return Err(CodecError::InvalidTag(format!("real of {} bytes", len)));
                }
                let bytes = self.bytes(4)?;
                Ok(PropertyValue::Real(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
            }
            app_tag::CHARACTER_STRING => self.character_string(len).map(PropertyValue::CharacterString),
            app_tag::BIT_STRING => {
                let bytes = self.bytes(len as usize)?;
                let Some((&unused, packed)) = bytes.split_first() else {
                    return Err(CodecError::InvalidTag("empty bit string".to_string()));
                };
                let total = (packed.len() * 8).saturating_sub(unused as usize);
                let bits = (0..total).map(|i| packed[i / 8] & (0x80 >> (i % 8)) != 0).collect();
                Ok(PropertyValue::BitString(bits))
            }
            app_tag::ENUMERATED => self.unsigned(len).map(PropertyValue::Enumerated),
            app_tag::OBJECT_ID => {
                if len != 4 {
                    return Err(CodecError::InvalidTag(format!("object identifier of {} bytes", len)));
                }
                Ok(PropertyValue::ObjectIdentifier(ObjectId::from_packed(self.unsigned(4)?)))
            }
            other => Err(CodecError::UnsupportedValue(other)),
        }
    }
}

fn encode_tag(buf: &mut BytesMut, number: u8, context: bool, len: u32) {
    let mut first = if context { 0x08 } else { 0x00 };
    first |= if number >= 0x0F { 0xF0 } else { number << 4 };
    first |= if len < 5 { len as u8 } else { 5 };
    buf.put_u8(first);
    if number >= 0x0F {
        buf.put_u8(number);
    }
    if len >= 5 {
        if len < 254 {
            buf.put_u8(len as u8);
        } else if len <= u16::MAX.into() {
            buf.put_u8(254);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(255);
            buf.put_u32(len);
        }
    }
}

fn encode_opening(buf: &mut BytesMut, number: u8) {
    encode_paired(buf, number, 0x0E);
}

fn encode_closing(buf: &mut BytesMut, number: u8) {
    encode_paired(buf, number, 0x0F);
}

fn encode_paired(buf: &mut BytesMut, number: u8, marker: u8) {
    if number >= 0x0F {
        buf.put_u8(0xF0 | marker);
        buf.put_u8(number);
    } else {
        buf.put_u8((number << 4) | marker);
    }
}

/// Shortest big-endian form of an unsigned value
fn unsigned_bytes(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Shortest two's-complement form of a signed value
fn signed_bytes(value: i32) -> Vec<u8> {
    let len = (1..4).find(|n| {
        let shift = 32 - 8 * n;
        (value << shift) >> shift == value
    });
    let len = len.unwrap_or(4) as usize;
    value.to_be_bytes()[4 - len..].to_vec()
}

fn encode_context_unsigned(buf: &mut BytesMut, number: u8, value: u32) {
    let bytes = unsigned_bytes(value);
    encode_tag(buf, number, true, bytes.len() as u32);
    buf.put_slice(&bytes);
}

fn encode_context_object_id(buf: &mut BytesMut, number: u8, id: ObjectId) {
    encode_tag(buf, number, true, 4);
    buf.put_u32(id.to_packed());
}

fn encode_context_bool(buf: &mut BytesMut, number: u8, value: bool) {
    encode_tag(buf, number, true, 1);
    buf.put_u8(value.into());
}

/// Application-tagged encoding of a property value; arrays are encoded
/// element after element
pub fn encode_application(buf: &mut BytesMut, value: &PropertyValue) {
    match value {
        PropertyValue::Null => encode_tag(buf, app_tag::NULL, false, 0),
        PropertyValue::Boolean(b) => encode_tag(buf, app_tag::BOOLEAN, false, (*b).into()),
        PropertyValue::Unsigned(v) => {
            let bytes = unsigned_bytes(*v);
            encode_tag(buf, app_tag::UNSIGNED, false, bytes.len() as u32);
            buf.put_slice(&bytes);
        }
        PropertyValue::Signed(v) => {
            let bytes = signed_bytes(*v);
            encode_tag(buf, app_tag::SIGNED, false, bytes.len() as u32);
            buf.put_slice(&bytes);
        }
        PropertyValue::Real(v) => {
            encode_tag(buf, app_tag::REAL, false, 4);
            buf.put_f32(*v);
        }
        PropertyValue::Enumerated(v) => {
            let bytes = unsigned_bytes(*v);
            encode_tag(buf, app_tag::ENUMERATED, false, bytes.len() as u32);
            buf.put_slice(&bytes);
        }
        PropertyValue::CharacterString(s) => {
            encode_tag(buf, app_tag::CHARACTER_STRING, false, s.len() as u32 + 1);
            buf.put_u8(0);
            buf.put_slice(s.as_bytes());
        }
        PropertyValue::BitString(bits) => {
            let packed_len = bits.len().div_ceil(8);
            encode_tag(buf, app_tag::BIT_STRING, false, packed_len as u32 + 1);
            buf.put_u8((packed_len * 8 - bits.len()) as u8);
            for chunk in bits.chunks(8) {
                let byte = chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, bit)| if *bit { acc | (0x80 >> i) } else { acc });
                buf.put_u8(byte);
            }
        }
        PropertyValue::ObjectIdentifier(id) => {
            encode_tag(buf, app_tag::OBJECT_ID, false, 4);
            buf.put_u32(id.to_packed());
        }
        PropertyValue::ActionList(actions) => {
            encode_opening(buf, 0);
            for action in actions {
                encode_action_command(buf, action);
            }
            encode_closing(buf, 0);
        }
        PropertyValue::Array(elements) => {
            for element in elements {
                encode_application(buf, element);
            }
        }
    }
}

fn encode_action_command(buf: &mut BytesMut, action: &ActionCommand) {
    encode_context_object_id(buf, 1, action.object);
    encode_context_unsigned(buf, 2, action.property.code());
    encode_opening(buf, 4);
    encode_application(buf, &action.value);
    encode_closing(buf, 4);
    encode_context_bool(buf, 7, action.quit_on_failure);
    encode_context_bool(buf, 8, action.write_successful);
}
