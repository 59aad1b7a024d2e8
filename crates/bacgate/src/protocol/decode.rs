//! Decoding of control-channel requests into [`Command`]s
//!
//! A request is a tuple `{Tag, Field1, Field2, ...}`. Fields are read in
//! order and must match their expected type exactly; text fields are
//! binaries under the ceiling of the buffer they end up in. Nothing is
//! returned unless the whole request decodes.

use bacgate_term::Term;

use super::command::{
    Command, CommandTag, CreateAnalogInput, CreateBinaryInput, CreateCharacterStringValue, CreateCommand,
    CreateMultistateInput, ObjectRef,
};
use crate::device::{DeviceSpec, MAX_DEVICE_TEXT_LEN};
use crate::error::DecodeError;
use crate::object::binary_input::BinaryInputSpec;
use crate::object::{
    AnalogInput, BinaryInput, CharacterStringValue, CommandObject, EngineeringUnits, MultistateInput, Polarity,
};

/// Decode the request part of a `$gen_call` envelope
pub fn decode_command(request: &Term) -> Result<Command, DecodeError> {
    let elements = request
        .as_tuple()
        .ok_or_else(|| DecodeError::Malformed("request is not a tuple".to_string()))?;
    if elements.len() < 2 {
        return Err(DecodeError::Malformed(format!(
            "request tuple has arity {}",
            elements.len()
        )));
    }

    let atom = elements[0]
        .as_atom()
        .ok_or_else(|| DecodeError::Malformed("request tag is not an atom".to_string()))?;
    let tag = CommandTag::from_atom(atom).ok_or_else(|| DecodeError::UnknownCommand(atom.to_string()))?;

    let mut fields = Fields::new(tag, &elements[1..]);
    let command = match tag {
        CommandTag::CreateGateway => Command::CreateGateway(device_spec(&mut fields)?),
        CommandTag::CreateRoutedDevice => Command::CreateRoutedDevice(device_spec(&mut fields)?),
        CommandTag::CreateRoutedAnalogInput => Command::CreateRoutedAnalogInput(CreateAnalogInput {
            target: fields.target()?,
            name: fields.text("name", AnalogInput::MAX_NAME_LEN)?,
            units: fields.units("unit")?,
        }),
        CommandTag::SetRoutedAnalogInputValue => Command::SetRoutedAnalogInputValue {
            target: fields.target()?,
            value: fields.float("value")?,
        },
        CommandTag::CreateRoutedMultistateInput => Command::CreateRoutedMultistateInput(CreateMultistateInput {
            target: fields.target()?,
            name: fields.text("name", MultistateInput::MAX_NAME_LEN)?,
            states: fields.states("states")?,
        }),
        CommandTag::SetRoutedMultistateInputValue => Command::SetRoutedMultistateInputValue {
            target: fields.target()?,
            value: fields.uint("value")?,
        },
        CommandTag::CreateRoutedCommand => Command::CreateRoutedCommand(CreateCommand {
            target: fields.target()?,
            name: fields.text("name", CommandObject::MAX_NAME_LEN)?,
            description: fields.text("description", CommandObject::MAX_DESCRIPTION_LEN)?,
            value: fields.optional_uint("value")?.unwrap_or(0),
        }),
        CommandTag::SetRoutedCommandStatus => Command::SetRoutedCommandStatus {
            target: fields.target()?,
            succeeded: fields.choice("status", "succeeded", "failed")?,
        },
        CommandTag::CreateCharacterStringValue => {
            Command::CreateCharacterStringValue(CreateCharacterStringValue {
                target: fields.target()?,
                name: fields.text("name", CharacterStringValue::MAX_TEXT_LEN)?,
                description: fields.text("description", CharacterStringValue::MAX_TEXT_LEN)?,
                value: fields.text("value", CharacterStringValue::MAX_TEXT_LEN)?,
            })
        }
        CommandTag::CreateBinaryInput => Command::CreateBinaryInput(CreateBinaryInput {
            target: fields.target()?,
            spec: BinaryInputSpec {
                name: fields.text("name", BinaryInput::MAX_TEXT_LEN)?,
                description: fields.text("description", BinaryInput::MAX_TEXT_LEN)?,
                active_text: fields.text("active_text", BinaryInput::MAX_TEXT_LEN)?,
                inactive_text: fields.text("inactive_text", BinaryInput::MAX_TEXT_LEN)?,
                polarity: if fields.choice("polarity", "reverse", "normal")? {
                    Polarity::Reverse
                } else {
                    Polarity::Normal
                },
                present_value: fields.boolean("value")?,
            },
        }),
        CommandTag::SetBinaryInputValue => Command::SetBinaryInputValue {
            target: fields.target()?,
            value: fields.boolean("value")?,
        },
    };
    fields.finish()?;

    Ok(command)
}

fn device_spec(fields: &mut Fields<'_>) -> Result<DeviceSpec, DecodeError> {
    Ok(DeviceSpec {
        instance: fields.uint("device_id")?,
        name: fields.text("name", MAX_DEVICE_TEXT_LEN)?,
        description: fields.text("description", MAX_DEVICE_TEXT_LEN)?,
        model: fields.text("model", MAX_DEVICE_TEXT_LEN)?,
        firmware_version: fields.text("firmware_version", MAX_DEVICE_TEXT_LEN)?,
    })
}

/// In-order reader over the payload fields of one request
struct Fields<'a> {
    tag: CommandTag,
    items: &'a [Term],
}

impl<'a> Fields<'a> {
    fn new(tag: CommandTag, items: &'a [Term]) -> Self {
        Self { tag, items }
    }

    fn malformed(&self, field: &str, problem: &str) -> DecodeError {
        DecodeError::Malformed(format!("{}: {} {}", self.tag.as_str(), field, problem))
    }

    fn next(&mut self, field: &str) -> Result<&'a Term, DecodeError> {
        let (first, rest) = self
            .items
            .split_first()
            .ok_or_else(|| self.malformed(field, "is missing"))?;
        self.items = rest;
        Ok(first)
    }

    fn uint(&mut self, field: &str) -> Result<u32, DecodeError> {
        let term = self.next(field)?;
        term.as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| self.malformed(field, "is not an unsigned integer"))
    }

    fn optional_uint(&mut self, field: &str) -> Result<Option<u32>, DecodeError> {
        match self.items.first() {
            None => Ok(None),
            Some(term) if term.is_atom("nil") || term.is_atom("undefined") => {
                self.items = &self.items[1..];
                Ok(None)
            }
            Some(_) => self.uint(field).map(Some),
        }
    }

    fn float(&mut self, field: &str) -> Result<f32, DecodeError> {
        let term = self.next(field)?;
        term.as_float()
            .map(|f| f as f32)
            .ok_or_else(|| self.malformed(field, "is not a float"))
    }

    fn atom(&mut self, field: &str) -> Result<&'a str, DecodeError> {
        let term = self.next(field)?;
        term.as_atom().ok_or_else(|| self.malformed(field, "is not an atom"))
    }

    fn boolean(&mut self, field: &str) -> Result<bool, DecodeError> {
        let term = self.next(field)?;
        term.as_bool().ok_or_else(|| self.malformed(field, "is not a boolean"))
    }

    /// Two-valued atom: `yes` maps to true, `no` to false
    fn choice(&mut self, field: &str, yes: &str, no: &str) -> Result<bool, DecodeError> {
        match self.atom(field)? {
            atom if atom == yes => Ok(true),
            atom if atom == no => Ok(false),
            _ => Err(self.malformed(field, &format!("must be {} or {}", yes, no))),
        }
    }

    fn units(&mut self, field: &str) -> Result<EngineeringUnits, DecodeError> {
        let atom = self.atom(field)?;
        EngineeringUnits::from_atom(atom).ok_or_else(|| self.malformed(field, &format!("unknown unit {}", atom)))
    }

    fn text(&mut self, field: &str, max_len: usize) -> Result<String, DecodeError> {
        let term = self.next(field)?;
        let bytes = term
            .as_binary()
            .ok_or_else(|| self.malformed(field, "is not a binary"))?;
        text_from(bytes, max_len).map_err(|problem| self.malformed(field, &problem))
    }

    fn states(&mut self, field: &str) -> Result<Vec<String>, DecodeError> {
        let term = self.next(field)?;
        let items = term
            .as_list()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| self.malformed(field, "is not a non-empty list"))?;
        items
            .iter()
            .map(|item| {
                let bytes = item
                    .as_binary()
                    .ok_or_else(|| self.malformed(field, "contains a non-binary"))?;
                text_from(bytes, usize::MAX).map_err(|problem| self.malformed(field, &problem))
            })
            .collect()
    }

    fn target(&mut self) -> Result<ObjectRef, DecodeError> {
        Ok(ObjectRef {
            device_id: self.uint("device_id")?,
            object_id: self.uint("object_id")?,
        })
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Malformed(format!(
                "{}: {} unexpected trailing fields",
                self.tag.as_str(),
                self.items.len()
            )))
        }
    }
}

fn text_from(bytes: &[u8], max_len: usize) -> Result<String, String> {
    if bytes.len() >= max_len {
        return Err(format!("is {} bytes, limit is {}", bytes.len(), max_len - 1));
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| "is not valid UTF-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tag: &str, fields: Vec<Term>) -> Term {
        let mut elements = vec![Term::atom(tag)];
        elements.extend(fields);
        Term::tuple(elements)
    }

    #[test]
    fn test_decode_create_gateway() {
        let term = request(
            "create_gateway",
            vec![
                Term::from(1000u32),
                Term::binary("Gateway"),
                Term::binary("Main gateway"),
                Term::binary("BG-1"),
                Term::binary("2.0.1"),
            ],
        );
        assert_eq!(
            decode_command(&term),
            Ok(Command::CreateGateway(DeviceSpec {
                instance: 1000,
                name: "Gateway".into(),
                description: "Main gateway".into(),
                model: "BG-1".into(),
                firmware_version: "2.0.1".into(),
            }))
        );
    }

    #[test]
    fn test_decode_analog_input_with_unit() {
        let term = request(
            "create_routed_analog_input",
            vec![
                Term::from(1000u32),
                Term::from(4u32),
                Term::binary("Zone Temp"),
                Term::atom("degrees_celsius"),
            ],
        );
        let Ok(Command::CreateRoutedAnalogInput(create)) = decode_command(&term) else {
            panic!("unexpected decode result");
        };
        assert_eq!(create.units, EngineeringUnits::DEGREES_CELSIUS);
        assert_eq!(create.target.object_id, 4);
    }

    #[test]
    fn test_decode_unknown_tag() {
        let term = request("reboot", vec![Term::from(1u32)]);
        assert_eq!(decode_command(&term), Err(DecodeError::UnknownCommand("reboot".into())));
    }

    #[test]
    fn test_decode_rejects_short_tuple() {
        let term = Term::tuple(vec![Term::atom("create_gateway")]);
        assert!(matches!(decode_command(&term), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_command(&Term::atom("create_gateway")), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        // Integer where a float is expected
        let term = request(
            "set_routed_analog_input_value",
            vec![Term::from(1u32), Term::from(2u32), Term::from(42u32)],
        );
        assert!(matches!(decode_command(&term), Err(DecodeError::Malformed(_))));

        // Negative instance
        let term = request(
            "set_routed_multistate_input_value",
            vec![Term::Integer(-1), Term::from(2u32), Term::from(1u32)],
        );
        assert!(matches!(decode_command(&term), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_enforces_text_ceiling() {
        let term = request(
            "create_routed_analog_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary(vec![b'x'; AnalogInput::MAX_NAME_LEN]),
                Term::atom("percent"),
            ],
        );
        assert!(matches!(decode_command(&term), Err(DecodeError::Malformed(_))));

        let term = request(
            "create_routed_analog_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary(vec![b'x'; AnalogInput::MAX_NAME_LEN - 1]),
                Term::atom("percent"),
            ],
        );
        assert!(decode_command(&term).is_ok());
    }

    #[test]
    fn test_decode_rejects_trailing_fields() {
        let term = request(
            "set_binary_input_value",
            vec![Term::from(1u32), Term::from(2u32), Term::from(true), Term::from(true)],
        );
        assert!(matches!(decode_command(&term), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_multistate_states() {
        let term = request(
            "create_routed_multistate_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary("Fan"),
                Term::List(vec![Term::binary("off"), Term::binary("on")]),
            ],
        );
        let Ok(Command::CreateRoutedMultistateInput(create)) = decode_command(&term) else {
            panic!("unexpected decode result");
        };
        assert_eq!(create.states, vec!["off".to_string(), "on".to_string()]);

        let empty = request(
            "create_routed_multistate_input",
            vec![Term::from(1u32), Term::from(2u32), Term::binary("Fan"), Term::nil()],
        );
        assert!(matches!(decode_command(&empty), Err(DecodeError::Malformed(_))));

        let mixed = request(
            "create_routed_multistate_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary("Fan"),
                Term::List(vec![Term::binary("off"), Term::atom("on")]),
            ],
        );
        assert!(matches!(decode_command(&mixed), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_command_optional_value() {
        let base = vec![Term::from(1u32), Term::from(7u32), Term::binary("Purge"), Term::binary("")];

        let Ok(Command::CreateRoutedCommand(without)) = decode_command(&request("create_routed_command", base.clone()))
        else {
            panic!("unexpected decode result");
        };
        assert_eq!(without.value, 0);

        let mut with_value = base.clone();
        with_value.push(Term::from(3u32));
        let Ok(Command::CreateRoutedCommand(with)) = decode_command(&request("create_routed_command", with_value))
        else {
            panic!("unexpected decode result");
        };
        assert_eq!(with.value, 3);

        let mut with_nil = base;
        with_nil.push(Term::atom("nil"));
        assert!(decode_command(&request("create_routed_command", with_nil)).is_ok());
    }

    #[test]
    fn test_decode_binary_input() {
        let term = request(
            "create_binary_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary("Door"),
                Term::binary("Front door"),
                Term::binary("open"),
                Term::binary("closed"),
                Term::atom("reverse"),
                Term::atom("true"),
            ],
        );
        let Ok(Command::CreateBinaryInput(create)) = decode_command(&term) else {
            panic!("unexpected decode result");
        };
        assert_eq!(create.spec.polarity, Polarity::Reverse);
        assert!(create.spec.present_value);

        let bad_polarity = request(
            "create_binary_input",
            vec![
                Term::from(1u32),
                Term::from(2u32),
                Term::binary("Door"),
                Term::binary(""),
                Term::binary("open"),
                Term::binary("closed"),
                Term::atom("inverted"),
                Term::atom("true"),
            ],
        );
        assert!(matches!(decode_command(&bad_polarity), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_command_status() {
        let term = request(
            "set_routed_command_status",
            vec![Term::from(1u32), Term::from(7u32), Term::atom("failed")],
        );
        assert_eq!(
            decode_command(&term),
            Ok(Command::SetRoutedCommandStatus {
                target: ObjectRef {
                    device_id: 1,
                    object_id: 7,
                },
                succeeded: false,
            })
        );
    }
}
