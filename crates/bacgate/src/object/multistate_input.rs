//! Routed multi-state input

use std::borrow::Cow;

use super::{
    check_instance, created, property::read_array, ArrayIndex, DataPoint, ObjectCommon, ObjectStore, ObjectType,
    PropertyError, PropertyId, PropertyLists, PropertyValue, RoutedObject, WriteOutcome,
};
use crate::error::ObjectError;

/// Text reported for any state while no state text has been configured
pub const DEFAULT_STATE_TEXT: &str = "State Not Set";

pub(crate) static PROPERTY_LISTS: PropertyLists = PropertyLists {
    required: &[
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
        PropertyId::PresentValue,
        PropertyId::StatusFlags,
        PropertyId::EventState,
        PropertyId::OutOfService,
        PropertyId::NumberOfStates,
    ],
    optional: &[PropertyId::Description, PropertyId::StateText],
    proprietary: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct MultistateInput {
    common: ObjectCommon,
    /// 1-based state number
    present_value: u32,
    /// `None` until a state list is configured
    state_text: Option<Vec<String>>,
    /// Field writes to the present value are accepted while out of service
    write_enabled: bool,
}

impl MultistateInput {
    /// Name length ceiling, exclusive
    pub const MAX_NAME_LEN: usize = 32;

    /// Build an input; the state list ends at the first empty entry
    pub fn new(instance: u32, name: &str, states: Vec<String>) -> Self {
        let states: Vec<String> = states.into_iter().take_while(|state| !state.is_empty()).collect();
        Self {
            common: ObjectCommon::new(instance, name, ""),
            present_value: 1,
            state_text: if states.is_empty() { None } else { Some(states) },
            write_enabled: false,
        }
    }

    pub fn create(store: &mut ObjectStore, instance: u32, name: &str, states: Vec<String>) -> Result<u32, ObjectError> {
        check_instance(instance)?;
        let object = store.insert_if_absent(instance, || RoutedObject::MultistateInput(Self::new(instance, name, states)));
        created(object, ObjectType::MultistateInput)
    }

    pub fn present_value(&self) -> u32 {
        self.present_value
    }

    pub fn set_present_value(&mut self, value: u32) {
        self.common.changed = self.present_value != value;
        self.present_value = value;
    }

    pub fn number_of_states(&self) -> u32 {
        self.state_text.as_ref().map_or(0, |states| states.len() as u32)
    }

    /// Text of state `index` (1-based)
    pub fn state_text(&self, index: u32) -> Option<&str> {
        if index == 0 {
            return None;
        }
        match &self.state_text {
            None => Some(DEFAULT_STATE_TEXT),
            Some(states) => states.get(index as usize - 1).map(String::as_str),
        }
    }

}

impl DataPoint for MultistateInput {
    fn object_type(&self) -> ObjectType {
        ObjectType::MultistateInput
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
            Cow::Owned(format!("MULTI-STATE INPUT {}", self.common.instance))
        } else {
            Cow::Borrowed(&self.common.name)
        }
    }

    fn is_array(&self, property: PropertyId) -> bool {
        property == PropertyId::StateText
    }

    fn read_specific(&self, property: PropertyId, index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        match property {
            PropertyId::PresentValue => Ok(PropertyValue::Unsigned(self.present_value)),
            PropertyId::NumberOfStates => Ok(PropertyValue::Unsigned(self.number_of_states())),
            PropertyId::StateText => {
                let states = (1..=self.number_of_states())
                    .filter_map(|i| self.state_text(i))
                    .map(|text| PropertyValue::CharacterString(text.to_string()))
                    .collect();
                read_array(states, index)
            }
            _ => Err(PropertyError::unknown_property()),
        }
    }

    fn write_property(
        &mut self,
        property: PropertyId,
        index: ArrayIndex,
        value: &PropertyValue,
    ) -> Result<WriteOutcome, PropertyError> {
        let writable = property == PropertyId::OutOfService || (property == PropertyId::PresentValue && self.write_enabled);
        if !writable {
            return if self.property_lists().contains(property) {
                Err(PropertyError::write_access_denied())
            } else {
                Err(PropertyError::unknown_property())
            };
        }
        if index != ArrayIndex::All {
            return Err(PropertyError::not_an_array());
        }
        match (property, value) {
            (PropertyId::OutOfService, PropertyValue::Boolean(out_of_service)) => {
                if self.common.out_of_service != *out_of_service {
                    self.common.changed = true;
                }
                self.common.out_of_service = *out_of_service;
                self.write_enabled = *out_of_service;
                Ok(WriteOutcome::Stored)
            }
            (PropertyId::PresentValue, PropertyValue::Unsigned(state)) if (1..=self.number_of_states()).contains(state) => {
                self.set_present_value(*state);
                Ok(WriteOutcome::Stored)
            }
            (PropertyId::PresentValue, PropertyValue::Unsigned(_)) => Err(PropertyError::value_out_of_range()),
            _ => Err(PropertyError::invalid_data_type()),
        }
    }

    fn supports_cov(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_state_text_lookup() {
        let input = MultistateInput::new(2, "Fan", states(&["off", "on"]));
        assert_eq!(input.number_of_states(), 2);
        assert_eq!(input.state_text(1), Some("off"));
        assert_eq!(input.state_text(2), Some("on"));
        assert_eq!(input.state_text(3), None);
        assert_eq!(input.state_text(0), None);
    }

    #[test]
    fn test_state_text_stops_at_empty_entry() {
        let input = MultistateInput::new(2, "Fan", states(&["off", "", "on"]));
        assert_eq!(input.number_of_states(), 1);
        assert_eq!(input.state_text(2), None);
    }

    #[test]
    fn test_unconfigured_states() {
        let input = MultistateInput::new(2, "", Vec::new());
        assert_eq!(input.number_of_states(), 0);
        assert_eq!(input.state_text(1), Some(DEFAULT_STATE_TEXT));
        assert_eq!(input.object_name(), "MULTI-STATE INPUT 2");
        assert_eq!(input.present_value(), 1);
    }

    #[test]
    fn test_read_state_text_array() {
        let input = MultistateInput::new(2, "Fan", states(&["off", "on"]));
        assert_eq!(
            input.read_property(PropertyId::StateText, ArrayIndex::Index(0)),
            Ok(PropertyValue::Unsigned(2))
        );
        assert_eq!(
            input.read_property(PropertyId::StateText, ArrayIndex::Index(1)),
            Ok(PropertyValue::CharacterString("off".into()))
        );
        assert_eq!(
            input.read_property(PropertyId::StateText, ArrayIndex::Index(3)),
            Err(PropertyError::invalid_array_index())
        );
        assert_eq!(
            input.read_property(PropertyId::NumberOfStates, ArrayIndex::Index(1)),
            Err(PropertyError::not_an_array())
        );
    }

    #[test]
    fn test_set_present_value_tracks_change() {
        let mut input = MultistateInput::new(2, "Fan", states(&["off", "on"]));
        input.set_present_value(1);
        assert!(!input.common().changed);
        input.set_present_value(2);
        assert!(input.common().changed);
        assert_eq!(input.present_value(), 2);
    }

    #[test]
    fn test_present_value_writable_only_out_of_service() {
        let mut input = MultistateInput::new(2, "Fan", states(&["off", "on"]));
        assert_eq!(
            input.write_property(PropertyId::PresentValue, ArrayIndex::All, &PropertyValue::Unsigned(2)),
            Err(PropertyError::write_access_denied())
        );

        assert_eq!(
            input.write_property(PropertyId::OutOfService, ArrayIndex::All, &PropertyValue::Boolean(true)),
            Ok(WriteOutcome::Stored)
        );
        assert!(input.common().changed);
        assert_eq!(
            input.write_property(PropertyId::PresentValue, ArrayIndex::All, &PropertyValue::Unsigned(3)),
            Err(PropertyError::value_out_of_range())
        );
        assert_eq!(
            input.write_property(PropertyId::PresentValue, ArrayIndex::All, &PropertyValue::Unsigned(2)),
            Ok(WriteOutcome::Stored)
        );
        assert_eq!(input.present_value(), 2);

        input.write_property(PropertyId::OutOfService, ArrayIndex::All, &PropertyValue::Boolean(false)).unwrap();
        assert_eq!(
            input.write_property(PropertyId::PresentValue, ArrayIndex::All, &PropertyValue::Unsigned(1)),
            Err(PropertyError::write_access_denied())
        );
    }
}
