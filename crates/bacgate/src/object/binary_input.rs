//! Binary input

use super::{
    check_instance, created, require_text, ArrayIndex, DataPoint, ObjectCommon, ObjectStore, ObjectType, Polarity,
    PropertyError, PropertyId, PropertyLists, PropertyValue, RoutedObject,
};
use crate::error::ObjectError;

pub(crate) static PROPERTY_LISTS: PropertyLists = PropertyLists {
    required: &[
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
        PropertyId::PresentValue,
        PropertyId::StatusFlags,
        PropertyId::EventState,
        PropertyId::OutOfService,
        PropertyId::Polarity,
    ],
    optional: &[
        PropertyId::Reliability,
        PropertyId::Description,
        PropertyId::ActiveText,
        PropertyId::InactiveText,
    ],
    proprietary: &[],
};

/// Fields of a new binary input
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInputSpec {
    pub name: String,
    pub description: String,
    pub active_text: String,
    pub inactive_text: String,
    pub polarity: Polarity,
    pub present_value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInput {
    common: ObjectCommon,
    present_value: bool,
    polarity: Polarity,
    active_text: String,
    inactive_text: String,
}

impl BinaryInput {
    /// Text length ceiling (name, description, active and inactive text), exclusive
    pub const MAX_TEXT_LEN: usize = 128;

    pub fn new(instance: u32, spec: BinaryInputSpec) -> Self {
        Self {
            common: ObjectCommon::new(instance, spec.name, spec.description),
            present_value: spec.present_value,
            polarity: spec.polarity,
            active_text: spec.active_text,
            inactive_text: spec.inactive_text,
        }
    }

    pub fn create(store: &mut ObjectStore, instance: u32, spec: BinaryInputSpec) -> Result<u32, ObjectError> {
        check_instance(instance)?;
        require_text("name", &spec.name)?;
        let object = store.insert_if_absent(instance, || RoutedObject::BinaryInput(Self::new(instance, spec)));
        created(object, ObjectType::BinaryInput)
    }

    pub fn present_value(&self) -> bool {
        self.present_value
    }

    pub fn set_present_value(&mut self, value: bool) {
        self.common.changed = self.present_value != value;
        self.present_value = value;
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

impl DataPoint for BinaryInput {
    fn object_type(&self) -> ObjectType {
        ObjectType::BinaryInput
    }

    fn common(&self) -> &ObjectCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut ObjectCommon {
        &mut self.common
    }

    fn property_lists(&self) -> &'static PropertyLists {
        &PROPERTY_LISTS
    }

    fn read_specific(&self, property: PropertyId, _index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        match property {
            PropertyId::PresentValue => Ok(PropertyValue::Enumerated(self.present_value.into())),
            PropertyId::Polarity => Ok(PropertyValue::Enumerated(self.polarity as u32)),
            PropertyId::ActiveText => Ok(PropertyValue::CharacterString(self.active_text.clone())),
            PropertyId::InactiveText => Ok(PropertyValue::CharacterString(self.inactive_text.clone())),
            _ => Err(PropertyError::unknown_property()),
        }
    }

    fn supports_cov(&self) -> bool {
        true
    }
}
