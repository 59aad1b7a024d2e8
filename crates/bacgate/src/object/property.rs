//! BACnet property identifiers, values and property-access errors

use std::fmt;

macro_rules! property_ids {
    ($($name:ident = $code:literal,)*) => {
        /// Property identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PropertyId {
            $($name,)*
            /// Any identifier this gateway has no name for
            Other(u32),
        }

        impl PropertyId {
            pub fn code(self) -> u32 {
                match self {
                    $(PropertyId::$name => $code,)*
                    PropertyId::Other(code) => code,
                }
            }

            pub fn from_code(code: u32) -> Self {
                match code {
                    $($code => PropertyId::$name,)*
                    other => PropertyId::Other(other),
                }
            }
        }
    };
}

property_ids! {
    Action = 2,
    ActiveText = 4,
    AllWritesSuccessful = 9,
    All = 8,
    ApplicationSoftwareVersion = 12,
    CovIncrement = 22,
    Description = 28,
    EventState = 36,
    FirmwareRevision = 44,
    InactiveText = 46,
    MaxApduLengthAccepted = 62,
    InProcess = 63,
    ModelName = 70,
    NumberOfStates = 74,
    ObjectIdentifier = 75,
    ObjectList = 76,
    ObjectName = 77,
    ObjectType = 79,
    Optional = 80,
    OutOfService = 81,
    Polarity = 84,
    PresentValue = 85,
    ProtocolVersion = 98,
    Reliability = 103,
    Required = 105,
    SegmentationSupported = 107,
    StateText = 110,
    StatusFlags = 111,
    SystemStatus = 112,
    Units = 117,
    VendorIdentifier = 120,
    VendorName = 121,
    ProtocolRevision = 139,
    DatabaseRevision = 155,
}

/// Object type, as carried in an object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    AnalogInput,
    BinaryInput,
    Command,
    Device,
    MultistateInput,
    CharacterStringValue,
    Other(u16),
}

impl ObjectType {
    /// Data-point kinds a routed device can hold, in object-list order
    pub const POINT_KINDS: [ObjectType; 5] = [
        ObjectType::AnalogInput,
        ObjectType::MultistateInput,
        ObjectType::Command,
        ObjectType::CharacterStringValue,
        ObjectType::BinaryInput,
    ];

    pub fn code(self) -> u16 {
        match self {
            ObjectType::AnalogInput => 0,
            ObjectType::BinaryInput => 3,
            ObjectType::Command => 7,
            ObjectType::Device => 8,
            ObjectType::MultistateInput => 13,
            ObjectType::CharacterStringValue => 40,
            ObjectType::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ObjectType::AnalogInput,
            3 => ObjectType::BinaryInput,
            7 => ObjectType::Command,
            8 => ObjectType::Device,
            13 => ObjectType::MultistateInput,
            40 => ObjectType::CharacterStringValue,
            other => ObjectType::Other(other),
        }
    }
}

/// Object identifier: type plus 22-bit instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self { object_type, instance }
    }

    /// Packed wire form: type in the top 10 bits, instance in the low 22
    pub fn to_packed(self) -> u32 {
        (u32::from(self.object_type.code()) << 22) | (self.instance & crate::object::MAX_INSTANCE)
    }

    pub fn from_packed(raw: u32) -> Self {
        Self {
            object_type: ObjectType::from_code((raw >> 22) as u16),
            instance: raw & crate::object::MAX_INSTANCE,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.object_type, self.instance)
    }
}

/// Array index of a property access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayIndex {
    All,
    Index(u32),
}

impl ArrayIndex {
    /// Wire sentinel meaning "whole array"
    pub const ALL_RAW: u32 = u32::MAX;

    pub fn from_raw(raw: Option<u32>) -> Self {
        match raw {
            None | Some(Self::ALL_RAW) => ArrayIndex::All,
            Some(index) => ArrayIndex::Index(index),
        }
    }
}

/// One entry of a command object's action list
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCommand {
    pub object: ObjectId,
    pub property: PropertyId,
    pub value: Box<PropertyValue>,
    pub quit_on_failure: bool,
    pub write_successful: bool,
}

/// A typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Enumerated(u32),
    CharacterString(String),
    BitString(Vec<bool>),
    ObjectIdentifier(ObjectId),
    ActionList(Vec<ActionCommand>),
    /// Whole-array read
    Array(Vec<PropertyValue>),
}

/// BACnet error class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Device = 0,
    Object = 1,
    Property = 2,
    Resources = 3,
    Services = 5,
}

/// BACnet error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Other = 0,
    InvalidDataType = 9,
    NoSpaceToAddListElement = 19,
    UnknownObject = 31,
    UnknownProperty = 32,
    UnsupportedObjectType = 36,
    ValueOutOfRange = 37,
    WriteAccessDenied = 40,
    InvalidArrayIndex = 42,
    OptionalFunctionalityNotSupported = 45,
    PropertyIsNotAnArray = 50,
    Busy = 82,
}

/// Error class/code pair returned from a property read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{class:?}: {code:?}")]
pub struct PropertyError {
    pub class: ErrorClass,
    pub code: ErrorCode,
}

impl PropertyError {
    pub const fn new(class: ErrorClass, code: ErrorCode) -> Self {
        Self { class, code }
    }

    pub const fn unknown_object() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::UnknownObject)
    }

    pub const fn unsupported_object_type() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::UnsupportedObjectType)
    }

    pub const fn unknown_property() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::UnknownProperty)
    }

    pub const fn write_access_denied() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::WriteAccessDenied)
    }

    pub const fn invalid_array_index() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::InvalidArrayIndex)
    }

    pub const fn not_an_array() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::PropertyIsNotAnArray)
    }

    pub const fn value_out_of_range() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::ValueOutOfRange)
    }

    pub const fn invalid_data_type() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::InvalidDataType)
    }

    pub const fn busy() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::Busy)
    }

    pub const fn not_supported() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::OptionalFunctionalityNotSupported)
    }

    pub const fn no_space() -> Self {
        Self::new(ErrorClass::Resources, ErrorCode::NoSpaceToAddListElement)
    }
}

/// Required/optional/proprietary property lists of one object kind
#[derive(Debug, Clone, Copy)]
pub struct PropertyLists {
    pub required: &'static [PropertyId],
    pub optional: &'static [PropertyId],
    pub proprietary: &'static [PropertyId],
}

impl PropertyLists {
    pub fn contains(&self, property: PropertyId) -> bool {
        self.required.contains(&property)
            || self.optional.contains(&property)
            || self.proprietary.contains(&property)
    }

    /// Properties selected by `All`, `Required` or `Optional`; `None` for any other identifier
    pub fn expand(&self, selector: PropertyId) -> Option<Vec<PropertyId>> {
        match selector {
            PropertyId::All => Some(
                self.required
                    .iter()
                    .chain(self.optional)
                    .chain(self.proprietary)
                    .copied()
                    .collect(),
            ),
            PropertyId::Required => Some(self.required.to_vec()),
            PropertyId::Optional => Some(self.optional.to_vec()),
            _ => None,
        }
    }
}

/// Apply BACnet array-index semantics to an array property
///
/// `All` returns every element, `0` the element count, `n` element `n`.
pub fn read_array(elements: Vec<PropertyValue>, index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
    match index {
        ArrayIndex::All => Ok(PropertyValue::Array(elements)),
        ArrayIndex::Index(0) => Ok(PropertyValue::Unsigned(elements.len() as u32)),
        ArrayIndex::Index(n) => elements
            .into_iter()
            .nth(n as usize - 1)
            .ok_or(PropertyError::invalid_array_index()),
    }
}
