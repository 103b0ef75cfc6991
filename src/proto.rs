//! Structures and methods to frame and parse commands

use std::io;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::ser::Formatter;
use thiserror::Error;

use crate::commands;

/// A command sent over a node channel
///
/// On the wire it is one line holding the opcode, followed by one line of
/// JSON when the opcode carries a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    opcode: u8,
    payload: Option<String>,
}

impl Command {
    /// Create a command without payload
    pub fn new(opcode: u8) -> Result<Self, Error> {
        check_opcode(opcode)?;
        if commands::carries_payload(opcode) {
            return Err(Error::MissingPayload(opcode as char));
        }
        Ok(Self { opcode, payload: None })
    }

    /// Create a command followed by a raw payload line
    ///
    /// The payload must fit on a single line.
    pub fn with_payload(opcode: u8, payload: impl Into<String>) -> Result<Self, Error> {
        check_opcode(opcode)?;
        if !commands::carries_payload(opcode) {
            return Err(Error::UnexpectedPayload(opcode as char));
        }
        let payload = payload.into();
        if payload.contains(['\n', '\r']) {
            return Err(Error::EmbeddedNewline);
        }
        Ok(Self { opcode, payload: Some(payload) })
    }

    /// Create a command whose payload is `value` serialized as single-line JSON
    pub fn with_json<T: Serialize + ?Sized>(opcode: u8, value: &T) -> Result<Self, Error> {
        Self::with_payload(opcode, to_json_line(value)?)
    }

    /// Same as [Command::with_json], with every non-ASCII character escaped as `\uXXXX`
    pub fn with_ascii_json<T: Serialize + ?Sized>(opcode: u8, value: &T) -> Result<Self, Error> {
        Self::with_payload(opcode, to_ascii_json_line(value)?)
    }

    /// Replace the current image set
    pub fn update(set: &ImageSet) -> Result<Self, Error> {
        Self::with_json(commands::UPDATE, set)
    }

    /// Declare the next image set
    pub fn declare_next(set: &ImageSet) -> Result<Self, Error> {
        Self::with_json(commands::DECLARE_NEXT, set)
    }

    /// Opcode of this command
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Raw payload line, without its terminator
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Decode the payload as JSON
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        match &self.payload {
            Some(payload) => Ok(Some(serde_json::from_str(payload)?)),
            None => Ok(None),
        }
    }

    /// Convert this command into bytes ready to be sent
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload_len = self.payload.as_ref().map_or(0, |it| it.len() + 1);
        let mut bytes = Vec::with_capacity(2 + payload_len);
        bytes.push(self.opcode);
        bytes.push(b'\n');
        if let Some(payload) = &self.payload {
            bytes.extend_from_slice(payload.as_bytes());
            bytes.push(b'\n');
        }
        bytes
    }

    /// Parse a command from buffer, removing bytes associated to parsed command from buffer.
    ///
    /// Lines may end with `\n` or `\r\n`. Returns a command and the number of bytes removed from buffer.
    /// In case of error, buffer is not modified.
    pub fn from_bytes(input: &mut Vec<u8>) -> Result<(Self, usize), Error> {
        let Some(opcode_end) = input.iter().position(|it| *it == b'\n') else {
            return Err(Error::IncompleteInput);
        };

        let &[opcode] = trim_cr(&input[..opcode_end]) else {
            return Err(Error::MalformedOpcodeLine);
        };
        check_opcode(opcode)?;

        if !commands::carries_payload(opcode) {
            input.drain(..=opcode_end);
            return Ok((Self { opcode, payload: None }, opcode_end + 1));
        }

        let payload_start = opcode_end + 1;
        let Some(payload_len) = input[payload_start..].iter().position(|it| *it == b'\n') else {
            return Err(Error::IncompleteInput);
        };
        let payload_end = payload_start + payload_len;

        let payload = std::str::from_utf8(trim_cr(&input[payload_start..payload_end]))
            .map_err(|_| Error::InvalidUtf8)?
            .to_owned();

        input.drain(..=payload_end);

        Ok((Self { opcode, payload: Some(payload) }, payload_end + 1))
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn check_opcode(opcode: u8) -> Result<(), Error> {
    if opcode.is_ascii_graphic() {
        Ok(())
    } else {
        Err(Error::InvalidOpcode(opcode))
    }
}

/// Payload of the update and declare-next commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    /// Title shown with the set
    pub title: String,
    /// Image identifiers, in display order
    pub images: Vec<String>,
}

impl ImageSet {
    /// Create a new image set
    pub fn new<I, S>(title: impl Into<String>, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            images: images.into_iter().map(Into::into).collect(),
        }
    }
}

/// Writes JSON on one line with a space after each `,` and `:`
struct SpacedFormatter {
    ascii_only: bool,
}

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !self.ascii_only {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0_u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
                continue;
            }
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
        }
        Ok(())
    }
}

/// Serialize `value` into a single-line JSON document
///
/// Keys keep the order in which `value` serializes them. Control characters
/// inside strings are escaped, so the result never contains a raw newline.
pub fn to_json_line<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    write_json_line(value, false)
}

/// Serialize `value` like [to_json_line], escaping characters outside ASCII
/// as `\uXXXX` (UTF-16 surrogate pairs above the basic plane)
pub fn to_ascii_json_line<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    write_json_line(value, true)
}

fn write_json_line<T: Serialize + ?Sized>(value: &T, ascii_only: bool) -> Result<String, Error> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter { ascii_only });
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|_| Error::InvalidUtf8)
}

/// Remove the first complete line from buffer and return it without its terminator.
///
/// A trailing `\r` is stripped as well. Returns `None` if buffer holds no full line.
pub fn take_line(input: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = input.iter().position(|it| *it == b'\n')?;
    let line = trim_cr(&input[..end]).to_vec();
    input.drain(..=end);
    Some(line)
}

/// Error that can occur while framing or parsing commands
#[derive(Debug, Error)]
pub enum Error {
    /// Opcode is not a printable ASCII character
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),
    /// Opcode line does not hold exactly one character
    #[error("Opcode line should hold exactly one character")]
    MalformedOpcodeLine,
    /// Input buffer does not contain a full command yet
    #[error("Incomplete input")]
    IncompleteInput,
    /// Payload would span more than one line
    #[error("Payload contains an embedded newline")]
    EmbeddedNewline,
    /// Opcode requires a payload but none was given
    #[error("Opcode '{0}' requires a payload")]
    MissingPayload(char),
    /// Opcode never carries a payload
    #[error("Opcode '{0}' does not take a payload")]
    UnexpectedPayload(char),
    /// Payload is not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,
    /// Payload could not be (de)serialized
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn first_set() -> ImageSet {
        ImageSet::new("One set of images", ["0001", "0002", "0003", "0004", "0005"])
    }

    #[test]
    fn should_frame_update_like_the_reference_line() {
        let bytes = Command::update(&first_set()).unwrap().to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.split_terminator('\n');

        assert_eq!(lines.next(), Some("u"));
        assert_eq!(
            lines.next(),
            Some(r#"{"title": "One set of images", "images": ["0001", "0002", "0003", "0004", "0005"]}"#)
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn should_frame_command_without_payload() {
        assert_eq!(Command::new(commands::STEP).unwrap().to_bytes(), b"l\n".to_vec());
    }

    #[test]
    fn should_escape_newlines_inside_strings() {
        let set = ImageSet::new("two\nlines", ["a\r\nb"]);
        let command = Command::update(&set).unwrap();

        assert!(!command.payload().unwrap().contains('\n'));
        assert_eq!(command.payload_json::<ImageSet>().unwrap(), Some(set));
    }

    #[test]
    fn should_reject_embedded_newline() {
        assert!(matches!(
            Command::with_payload(commands::UPDATE, "{}\n{}"),
            Err(Error::EmbeddedNewline)
        ));
    }

    #[test]
    fn should_enforce_payload_presence() {
        assert!(matches!(Command::new(commands::UPDATE), Err(Error::MissingPayload('u'))));
        assert!(matches!(
            Command::with_payload(commands::OUT, "{}"),
            Err(Error::UnexpectedPayload('o'))
        ));
        assert!(matches!(Command::new(b'\n'), Err(Error::InvalidOpcode(b'\n'))));
    }

    #[test]
    fn should_preserve_image_order() {
        let set = ImageSet::new("t", ["0005", "0001", "0003"]);
        let parsed: ImageSet = serde_json::from_str(&to_json_line(&set).unwrap()).unwrap();

        assert_eq!(parsed.images, vec!["0005", "0001", "0003"]);
        assert_eq!(parsed, set);
    }

    #[test]
    fn should_parse_partial_bytes() {
        let mut input = b"l\nd\n{\"title\": \"x\", \"images\": []}\no".to_vec();

        let (step, read) = Command::from_bytes(&mut input).unwrap();
        assert_eq!(step, Command::new(commands::STEP).unwrap());
        assert_eq!(read, 2);

        let (declare, _) = Command::from_bytes(&mut input).unwrap();
        assert_eq!(declare.opcode(), commands::DECLARE_NEXT);
        assert_eq!(
            declare.payload_json::<ImageSet>().unwrap(),
            Some(ImageSet::new("x", Vec::<String>::new()))
        );

        assert!(matches!(Command::from_bytes(&mut input), Err(Error::IncompleteInput)));
        assert_eq!(input, b"o".to_vec());
    }

    #[test]
    fn should_wait_for_payload_line() {
        let mut input = b"u\n{\"title\"".to_vec();
        assert!(matches!(Command::from_bytes(&mut input), Err(Error::IncompleteInput)));
        assert_eq!(input, b"u\n{\"title\"".to_vec());
    }

    #[test]
    fn should_accept_crlf_line_endings() {
        let mut input = b"l\r\nu\r\n{\"title\": \"x\", \"images\": [\"1\"]}\r\n".to_vec();

        let (step, read) = Command::from_bytes(&mut input).unwrap();
        assert_eq!(step, Command::new(commands::STEP).unwrap());
        assert_eq!(read, 3);

        let (update, read) = Command::from_bytes(&mut input).unwrap();
        assert_eq!(update.payload(), Some(r#"{"title": "x", "images": ["1"]}"#));
        assert_eq!(read, 3 + 31 + 2);
        assert!(input.is_empty());
    }

    #[test]
    fn should_escape_non_ascii_on_request() {
        let set = ImageSet::new("Café 😀", ["ü"]);

        assert_eq!(
            to_ascii_json_line(&set).unwrap(),
            r#"{"title": "Caf\u00e9 \ud83d\ude00", "images": ["\u00fc"]}"#
        );
        assert_eq!(to_json_line(&set).unwrap(), r#"{"title": "Café 😀", "images": ["ü"]}"#);

        let command = Command::with_ascii_json(commands::UPDATE, &set).unwrap();
        assert!(command.payload().unwrap().is_ascii());
        assert_eq!(command.payload_json::<ImageSet>().unwrap(), Some(set));
    }

    #[test]
    fn should_reject_long_opcode_line() {
        let mut input = b"lo\n".to_vec();
        assert!(matches!(Command::from_bytes(&mut input), Err(Error::MalformedOpcodeLine)));
    }

    #[test]
    fn should_take_lines() {
        let mut input = b"ok!\r\nrest".to_vec();
        assert_eq!(take_line(&mut input), Some(b"ok!".to_vec()));
        assert_eq!(take_line(&mut input), None);
        assert_eq!(input, b"rest".to_vec());
    }
}
