//! Minimal DICOM Part-10 header reader.
//!
//! Reads only what identity derivation needs: the file meta group (to learn
//! the transfer syntax) and the dataset up to Series Instance UID. Elements
//! are visited in file order and the walk stops at the first tag past
//! (0020,000E), so pixel data is never touched.

use thiserror::Error;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DicomError {
    #[error("Not a DICOM Part-10 file")]
    NotDicom,

    #[error("Truncated element at offset {0}")]
    Truncated(usize),

    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),
}

type Result<T> = std::result::Result<T, DicomError>;

/// The four attributes that make up an instance's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DicomHierarchy {
    /// May be empty
    pub patient_id: String,
    pub study_uid: String,
    pub series_uid: String,
    pub sop_uid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Tag(u16, u16);

impl Tag {
    fn is_delimiter_group(self) -> bool {
        self.0 == 0xFFFE
    }
}

struct Header {
    tag: Tag,
    vr: Option<[u8; 2]>,
    length: u32,
}

/// Cheap check for the Part-10 magic after the preamble.
pub fn has_part10_magic(content: &[u8]) -> bool {
    content.len() >= PREAMBLE_LEN + MAGIC.len() && &content[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
}

/// Extract the identity attributes from a Part-10 buffer.
pub fn read_hierarchy(content: &[u8]) -> Result<DicomHierarchy> {
    if !has_part10_magic(content) {
        return Err(DicomError::NotDicom);
    }
    let mut cursor = Cursor {
        data: content,
        pos: PREAMBLE_LEN + MAGIC.len(),
    };

    let mut transfer_syntax = None;
    while cursor.remaining() >= 4 && cursor.peek_group()? == 0x0002 {
        let header = cursor.header(true)?;
        let value = cursor.take(header.length as usize)?;
        if header.tag == TRANSFER_SYNTAX_UID {
            transfer_syntax = Some(text_value(value));
        }
    }

    let transfer_syntax = transfer_syntax.unwrap_or_else(|| IMPLICIT_VR_LITTLE_ENDIAN.to_string());
    let explicit = match transfer_syntax.as_str() {
        IMPLICIT_VR_LITTLE_ENDIAN => false,
        EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => {
            return Err(DicomError::UnsupportedTransferSyntax(transfer_syntax));
        }
        _ => true,
    };

    let mut hierarchy = DicomHierarchy::default();
    while cursor.remaining() > 0 {
        let header = cursor.header(explicit)?;
        if header.tag > SERIES_INSTANCE_UID {
            break;
        }
        if header.length == UNDEFINED_LENGTH {
            // Undefined-length UN content is always implicit VR.
            let nested_explicit = explicit && header.vr != Some(*b"UN");
            cursor.skip_undefined(nested_explicit)?;
            continue;
        }
        let value = cursor.take(header.length as usize)?;
        match header.tag {
            SOP_INSTANCE_UID => hierarchy.sop_uid = text_value(value),
            PATIENT_ID => hierarchy.patient_id = text_value(value),
            STUDY_INSTANCE_UID => hierarchy.study_uid = text_value(value),
            SERIES_INSTANCE_UID => {
                hierarchy.series_uid = text_value(value);
                break;
            }
            _ => {}
        }
    }

    if hierarchy.sop_uid.is_empty() {
        return Err(DicomError::MissingAttribute("SOPInstanceUID"));
    }
    if hierarchy.study_uid.is_empty() {
        return Err(DicomError::MissingAttribute("StudyInstanceUID"));
    }
    if hierarchy.series_uid.is_empty() {
        return Err(DicomError::MissingAttribute("SeriesInstanceUID"));
    }
    Ok(hierarchy)
}

fn text_value(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn has_long_length(vr: [u8; 2]) -> bool {
    matches!(
        &vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR" | b"UT" | b"UV"
    )
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DicomError::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek_group(&self) -> Result<u16> {
        let b = self
            .data
            .get(self.pos..self.pos + 2)
            .ok_or(DicomError::Truncated(self.pos))?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn header(&mut self, explicit: bool) -> Result<Header> {
        let tag = Tag(self.u16()?, self.u16()?);
        // Items and delimiters never carry a VR.
        if tag.is_delimiter_group() || !explicit {
            return Ok(Header {
                tag,
                vr: None,
                length: self.u32()?,
            });
        }
        let vr_bytes = self.take(2)?;
        let vr = [vr_bytes[0], vr_bytes[1]];
        let length = if has_long_length(vr) {
            self.take(2)?;
            self.u32()?
        } else {
            u32::from(self.u16()?)
        };
        Ok(Header {
            tag,
            vr: Some(vr),
            length,
        })
    }

    /// Skip the body of an undefined-length element. Each nested
    /// undefined-length sequence or item opens a level; each delimiter
    /// closes one.
    fn skip_undefined(&mut self, explicit: bool) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            let header = self.header(explicit)?;
            if header.tag == SEQUENCE_DELIMITATION || header.tag == ITEM_DELIMITATION {
                depth -= 1;
            } else if header.length == UNDEFINED_LENGTH {
                depth += 1;
            } else {
                self.take(header.length as usize)?;
            }
        }
        Ok(())
    }
}
