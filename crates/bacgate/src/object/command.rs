//! Command object
//!
//! A field-side write of the present value starts a command: the object goes
//! in-process and the caller publishes a command event to the supervisor,
//! which later reports completion through `set_routed_command_status`.

use super::{
    check_instance, created, property::read_array, require_text, ActionCommand, ArrayIndex, DataPoint,
    ObjectCommon, ObjectStore, ObjectType, PropertyError, PropertyId, PropertyLists, PropertyValue, RoutedObject,
    WriteOutcome,
};
use crate::error::ObjectError;

/// Number of entries in the action array; present values must stay below it
pub const MAX_COMMAND_ACTIONS: usize = 8;

pub(crate) static PROPERTY_LISTS: PropertyLists = PropertyLists {
    required: &[
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
        PropertyId::PresentValue,
        PropertyId::InProcess,
        PropertyId::AllWritesSuccessful,
        PropertyId::Action,
    ],
    optional: &[PropertyId::Description],
    proprietary: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct CommandObject {
    common: ObjectCommon,
    present_value: u32,
    in_progress: bool,
    all_writes_successful: bool,
    actions: [Vec<ActionCommand>; MAX_COMMAND_ACTIONS],
}

impl CommandObject {
    /// Name length ceiling, exclusive
    pub const MAX_NAME_LEN: usize = 32;
    /// Description length ceiling, exclusive
    pub const MAX_DESCRIPTION_LEN: usize = 64;

    pub fn new(instance: u32, name: &str, description: &str, value: u32) -> Self {
        Self {
            common: ObjectCommon::new(instance, name, description),
            present_value: value,
            in_progress: false,
            all_writes_successful: true,
            actions: Default::default(),
        }
    }

    pub fn create(
        store: &mut ObjectStore,
        instance: u32,
        name: &str,
        description: &str,
        value: u32,
    ) -> Result<u32, ObjectError> {
        check_instance(instance)?;
        require_text("name", name)?;
        let object =
            store.insert_if_absent(instance, || RoutedObject::Command(Self::new(instance, name, description, value)));
        created(object, ObjectType::Command)
    }

    pub fn present_value(&self) -> u32 {
        self.present_value
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn all_writes_successful(&self) -> bool {
        self.all_writes_successful
    }

    /// Start executing action list `value`
    pub fn set_present_value(&mut self, value: u32) -> Result<(), ObjectError> {
        if self.in_progress {
            return Err(ObjectError::Busy(self.common.instance));
        }
        if value as usize >= MAX_COMMAND_ACTIONS {
            return Err(ObjectError::ValueOutOfRange(value));
        }
        self.present_value = value;
        self.in_progress = true;
        Ok(())
    }

    /// Record the outcome of the running command and return to idle
    pub fn update_status(&mut self, successful: bool) {
        self.in_progress = false;
        self.present_value = 0;
        self.all_writes_successful = successful;
    }
}

impl DataPoint for CommandObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Command
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

    fn is_array(&self, property: PropertyId) -> bool {
        property == PropertyId::Action
    }

    fn read_specific(&self, property: PropertyId, index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        match property {
            PropertyId::PresentValue => Ok(PropertyValue::Unsigned(self.present_value)),
            PropertyId::InProcess => Ok(PropertyValue::Boolean(self.in_progress)),
            PropertyId::AllWritesSuccessful => Ok(PropertyValue::Boolean(self.all_writes_successful)),
            PropertyId::Action => {
                let lists = self
                    .actions
                    .iter()
                    .map(|list| PropertyValue::ActionList(list.clone()))
                    .collect();
                read_array(lists, index)
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
        if index != ArrayIndex::All && !self.is_array(property) {
            return Err(PropertyError::not_an_array());
        }

        match property {
            PropertyId::PresentValue => {
                if self.in_progress {
                    return Err(PropertyError::busy());
                }
                let PropertyValue::Unsigned(requested) = value else {
                    return Err(PropertyError::write_access_denied());
                };
                self.set_present_value(*requested)
                    .map_err(|_| PropertyError::value_out_of_range())?;
                Ok(WriteOutcome::CommandStarted(*requested))
            }
            _ if self.property_lists().contains(property) => Err(PropertyError::write_access_denied()),
            _ => Err(PropertyError::unknown_property()),
        }
    }
}
