//! Routed analog input

use std::borrow::Cow;

use super::{
    check_instance, created, ArrayIndex, DataPoint, EngineeringUnits, EventState, ObjectCommon, ObjectStore,
    ObjectType, PropertyError, PropertyId, PropertyLists, PropertyValue, RoutedObject, WriteOutcome,
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
        PropertyId::Units,
    ],
    optional: &[PropertyId::Description, PropertyId::Reliability, PropertyId::CovIncrement],
    proprietary: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalogInput {
    common: ObjectCommon,
    present_value: f32,
    /// Value at the last reported change
    prior_value: f32,
    units: EngineeringUnits,
    cov_increment: f32,
    event_state: EventState,
}

impl AnalogInput {
    /// Name length ceiling, exclusive
    pub const MAX_NAME_LEN: usize = 32;

    pub fn new(instance: u32, name: &str, units: EngineeringUnits) -> Self {
        Self {
            common: ObjectCommon::new(instance, name, ""),
            present_value: 0.0,
            prior_value: 0.0,
            units,
            cov_increment: 1.0,
            event_state: EventState::Normal,
        }
    }

    /// Create in `store` unless present; an empty name falls back to the default
    pub fn create(store: &mut ObjectStore, instance: u32, name: &str, units: EngineeringUnits) -> Result<u32, ObjectError> {
        check_instance(instance)?;
        let object = store.insert_if_absent(instance, || RoutedObject::AnalogInput(Self::new(instance, name, units)));
        created(object, ObjectType::AnalogInput)
    }

    pub fn present_value(&self) -> f32 {
        self.present_value
    }

    /// Store a new reading; a move of at least the COV increment marks the object changed
    pub fn set_present_value(&mut self, value: f32) {
        if (value - self.prior_value).abs() >= self.cov_increment {
            self.common.changed = true;
            self.prior_value = value;
        }
        self.present_value = value;
    }

    pub fn units(&self) -> EngineeringUnits {
        self.units
    }

    pub fn cov_increment(&self) -> f32 {
        self.cov_increment
    }

    pub fn set_cov_increment(&mut self, increment: f32) {
        self.cov_increment = increment;
    }

    pub fn set_out_of_service(&mut self, out_of_service: bool) {
        if self.common.out_of_service != out_of_service {
            self.common.changed = true;
        }
        self.common.out_of_service = out_of_service;
    }
}

impl DataPoint for AnalogInput {
    fn object_type(&self) -> ObjectType {
        ObjectType::AnalogInput
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

    fn object_name(&self) -> Cow<'_, str> {
        if self.common.name.is_empty() {
            Cow::Owned(format!("ANALOG INPUT {}", self.common.instance))
        } else {
            Cow::Borrowed(&self.common.name)
        }
    }

    fn event_state(&self) -> EventState {
        self.event_state
    }

    fn read_specific(&self, property: PropertyId, _index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        match property {
            PropertyId::PresentValue => Ok(PropertyValue::Real(self.present_value)),
            PropertyId::Units => Ok(PropertyValue::Enumerated(self.units.code().into())),
            PropertyId::CovIncrement => Ok(PropertyValue::Real(self.cov_increment)),
            _ => Err(PropertyError::unknown_property()),
        }
    }

    /// COV increment and out-of-service are writable from the field
    fn write_property(
        &mut self,
        property: PropertyId,
        index: ArrayIndex,
        value: &PropertyValue,
    ) -> Result<WriteOutcome, PropertyError> {
        match (property, value) {
            (PropertyId::CovIncrement | PropertyId::OutOfService, _) if index != ArrayIndex::All => {
                Err(PropertyError::not_an_array())
            }
            (PropertyId::CovIncrement, PropertyValue::Real(increment)) => {
                if !increment.is_finite() || *increment < 0.0 {
                    return Err(PropertyError::value_out_of_range());
                }
                self.set_cov_increment(*increment);
                Ok(WriteOutcome::Stored)
            }
            (PropertyId::OutOfService, PropertyValue::Boolean(out_of_service)) => {
                self.set_out_of_service(*out_of_service);
                Ok(WriteOutcome::Stored)
            }
            (PropertyId::CovIncrement | PropertyId::OutOfService, _) => Err(PropertyError::invalid_data_type()),
            (other, _) if PROPERTY_LISTS.contains(other) => Err(PropertyError::write_access_denied()),
            _ => Err(PropertyError::unknown_property()),
        }
    }

    fn supports_cov(&self) -> bool {
        true
    }
}
