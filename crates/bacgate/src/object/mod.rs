//! Routed data-point objects
//!
//! Every routed device owns an [`ObjectStore`] of [`RoutedObject`]s. Each
//! kind implements [`DataPoint`], which supplies the shared property
//! dispatch (identifier, name, type, status flags, ...) and leaves the
//! kind-specific properties to the implementor.

pub mod analog_input;
pub mod binary_input;
pub mod characterstring_value;
pub mod command;
pub mod multistate_input;
pub mod property;
pub mod store;
pub mod units;

use std::borrow::Cow;

pub use analog_input::AnalogInput;
pub use binary_input::BinaryInput;
pub use characterstring_value::CharacterStringValue;
pub use command::CommandObject;
pub use multistate_input::MultistateInput;
pub use property::{
    ActionCommand, ArrayIndex, ErrorClass, ErrorCode, ObjectId, ObjectType, PropertyError, PropertyId, PropertyLists,
    PropertyValue,
};
pub use store::ObjectStore;
pub use units::EngineeringUnits;

use crate::error::ObjectError;

/// Highest valid instance number; also the "no instance" sentinel
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    #[default]
    NoFaultDetected = 0,
    NoSensor = 1,
    OverRange = 2,
    UnderRange = 3,
    OpenLoop = 4,
    ShortedLoop = 5,
    UnreliableOther = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventState {
    #[default]
    Normal = 0,
    Fault = 1,
    Offnormal = 2,
    HighLimit = 3,
    LowLimit = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Normal = 0,
    Reverse = 1,
}

/// The four status-flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub in_alarm: bool,
    pub fault: bool,
    pub overridden: bool,
    pub out_of_service: bool,
}

impl From<StatusFlags> for PropertyValue {
    fn from(flags: StatusFlags) -> Self {
        PropertyValue::BitString(vec![flags.in_alarm, flags.fault, flags.overridden, flags.out_of_service])
    }
}

/// Fields shared by every routed object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCommon {
    pub instance: u32,
    pub name: String,
    pub description: String,
    pub reliability: Reliability,
    pub out_of_service: bool,
    pub changed: bool,
}

impl ObjectCommon {
    pub fn new(instance: u32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            instance,
            name: name.into(),
            description: description.into(),
            reliability: Reliability::NoFaultDetected,
            out_of_service: false,
            changed: false,
        }
    }
}

/// Result of an accepted property write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    /// A command object accepted a new present value and is now in progress
    CommandStarted(u32),
}

/// Behaviour shared by all data-point kinds
pub trait DataPoint {
    fn object_type(&self) -> ObjectType;

    fn common(&self) -> &ObjectCommon;

    fn common_mut(&mut self) -> &mut ObjectCommon;

    fn property_lists(&self) -> &'static PropertyLists;

    /// Kind-specific properties; anything unmatched is an unknown property
    fn read_specific(&self, property: PropertyId, index: ArrayIndex) -> Result<PropertyValue, PropertyError>;

    fn object_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.common().name)
    }

    fn is_array(&self, _property: PropertyId) -> bool {
        false
    }

    fn event_state(&self) -> EventState {
        EventState::Normal
    }

    fn status_flags(&self) -> StatusFlags {
        let common = self.common();
        StatusFlags {
            in_alarm: self.event_state() != EventState::Normal,
            fault: common.reliability != Reliability::NoFaultDetected,
            overridden: false,
            out_of_service: common.out_of_service,
        }
    }

    fn read_property(&self, property: PropertyId, index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        if !self.property_lists().contains(property) {
            return Err(PropertyError::unknown_property());
        }
        if index != ArrayIndex::All && !self.is_array(property) {
            return Err(PropertyError::not_an_array());
        }

        let common = self.common();
        match property {
            PropertyId::ObjectIdentifier => Ok(PropertyValue::ObjectIdentifier(ObjectId::new(
                self.object_type(),
                common.instance,
            ))),
            PropertyId::ObjectName => Ok(PropertyValue::CharacterString(self.object_name().into_owned())),
            PropertyId::ObjectType => Ok(PropertyValue::Enumerated(self.object_type().code().into())),
            PropertyId::Description => Ok(PropertyValue::CharacterString(common.description.clone())),
            PropertyId::StatusFlags => Ok(self.status_flags().into()),
            PropertyId::EventState => Ok(PropertyValue::Enumerated(self.event_state() as u32)),
            PropertyId::Reliability => Ok(PropertyValue::Enumerated(common.reliability as u32)),
            PropertyId::OutOfService => Ok(PropertyValue::Boolean(common.out_of_service)),
            _ => self.read_specific(property, index),
        }
    }

    /// Field-side writes are refused unless a kind says otherwise
    fn write_property(
        &mut self,
        property: PropertyId,
        _index: ArrayIndex,
        _value: &PropertyValue,
    ) -> Result<WriteOutcome, PropertyError> {
        if self.property_lists().contains(property) {
            Err(PropertyError::write_access_denied())
        } else {
            Err(PropertyError::unknown_property())
        }
    }

    /// Whether change-of-value tracking applies to this kind
    fn supports_cov(&self) -> bool {
        false
    }

    /// Present value and status flags, as carried in a COV notification
    fn value_list(&self) -> Option<Vec<(PropertyId, PropertyValue)>> {
        if !self.supports_cov() {
            return None;
        }
        let present_value = self.read_specific(PropertyId::PresentValue, ArrayIndex::All).ok()?;
        Some(vec![
            (PropertyId::PresentValue, present_value),
            (PropertyId::StatusFlags, self.status_flags().into()),
        ])
    }
}

/// A data point held in an object store
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedObject {
    AnalogInput(AnalogInput),
    MultistateInput(MultistateInput),
    BinaryInput(BinaryInput),
    CharacterStringValue(CharacterStringValue),
    Command(CommandObject),
}

impl RoutedObject {
    pub fn point(&self) -> &dyn DataPoint {
        match self {
            RoutedObject::AnalogInput(o) => o,
            RoutedObject::MultistateInput(o) => o,
            RoutedObject::BinaryInput(o) => o,
            RoutedObject::CharacterStringValue(o) => o,
            RoutedObject::Command(o) => o,
        }
    }

    pub fn point_mut(&mut self) -> &mut dyn DataPoint {
        match self {
            RoutedObject::AnalogInput(o) => o,
            RoutedObject::MultistateInput(o) => o,
            RoutedObject::BinaryInput(o) => o,
            RoutedObject::CharacterStringValue(o) => o,
            RoutedObject::Command(o) => o,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.point().object_type()
    }

    pub fn instance(&self) -> u32 {
        self.point().common().instance
    }

    pub fn is_changed(&self) -> bool {
        self.point().supports_cov() && self.point().common().changed
    }

    pub fn clear_changed(&mut self) {
        self.point_mut().common_mut().changed = false;
    }
}

/// Property lists of a data-point kind
pub fn property_lists(kind: ObjectType) -> Option<&'static PropertyLists> {
    match kind {
        ObjectType::AnalogInput => Some(&analog_input::PROPERTY_LISTS),
        ObjectType::MultistateInput => Some(&multistate_input::PROPERTY_LISTS),
        ObjectType::BinaryInput => Some(&binary_input::PROPERTY_LISTS),
        ObjectType::CharacterStringValue => Some(&characterstring_value::PROPERTY_LISTS),
        ObjectType::Command => Some(&command::PROPERTY_LISTS),
        ObjectType::Device | ObjectType::Other(_) => None,
    }
}

/// Reject instances at or above the sentinel before touching a store
pub(crate) fn check_instance(instance: u32) -> Result<(), ObjectError> {
    if instance >= MAX_INSTANCE {
        Err(ObjectError::InstanceExhausted(instance))
    } else {
        Ok(())
    }
}

/// Outcome of an idempotent create: the stored object must be of `kind`
pub(crate) fn created(object: &RoutedObject, kind: ObjectType) -> Result<u32, ObjectError> {
    if object.object_type() == kind {
        Ok(object.instance())
    } else {
        Err(ObjectError::InstanceTaken {
            instance: object.instance(),
            existing: object.object_type(),
        })
    }
}

pub(crate) fn require_text(field: &'static str, text: &str) -> Result<(), ObjectError> {
    if text.is_empty() {
        Err(ObjectError::MissingField(field))
    } else {
        Ok(())
    }
}
