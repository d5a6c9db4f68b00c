#![forbid(unsafe_code)]

//! Bit-level model of boxes and simple optionals. Generated code lays values
//! out exactly as encoded here; the backend uses the model to fold boxed
//! literals into constants.

use std::num::NonZeroU64;

use ember_types::{Type, TypeRegistry};

use crate::error::LayoutError;

pub const WORD_BYTES: u64 = 8;

/// Words of inline value storage in a box, after the meta pointer.
pub const BOX_VALUE_WORDS: usize = 4;

/// First code point past Unicode; never a valid symbol.
pub const SYMBOL_SENTINEL: u32 = 0x11_0000;

/// Enum cases are non-negative indices.
pub const ENUM_SENTINEL: i64 = -1;

/// How an optional of a simple type marks "no value".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionalLayout {
    /// Null reference.
    NullPointer,
    /// An integer no valid value of the type uses.
    Sentinel(i64),
    /// `{ i1, T }` with flag 0 meaning absent.
    Flagged,
}

impl OptionalLayout {
    /// Layout of `?ty`, `ty` being simple.
    pub fn of(ty: &Type) -> Self {
        match ty.unboxed() {
            Type::Class { .. } | Type::TypeAsValue(_) => OptionalLayout::NullPointer,
            Type::Symbol => OptionalLayout::Sentinel(i64::from(SYMBOL_SENTINEL)),
            Type::Enum(_) => OptionalLayout::Sentinel(ENUM_SENTINEL),
            _ => OptionalLayout::Flagged,
        }
    }
}

/// Machine words a simple value of `ty` occupies.
pub fn words_of(ty: &Type, registry: &TypeRegistry) -> usize {
    match ty.unboxed() {
        Type::Nothing => 0,
        Type::ValueType { .. } => registry.value_words(ty) as usize,
        _ => 1,
    }
}

/// Whether a value of `ty` fits the box's inline words.
pub fn stored_inline(ty: &Type, registry: &TypeRegistry) -> bool {
    words_of(ty, registry) <= BOX_VALUE_WORDS
}

/// A simple value as the words it is stored as.
#[derive(Clone, Debug, PartialEq)]
pub enum SimpleValue {
    Int(i64),
    Real(f64),
    Bool(bool),
    Byte(u8),
    Symbol(char),
    /// Case index.
    Enum(u32),
    /// Address of an object or meta.
    Reference(NonZeroU64),
    /// Inline words of a value type.
    Aggregate(Vec<u64>),
}

impl SimpleValue {
    pub fn to_words(&self) -> Vec<u64> {
        match self {
            SimpleValue::Int(v) => vec![*v as u64],
            SimpleValue::Real(v) => vec![v.to_bits()],
            SimpleValue::Bool(v) => vec![u64::from(*v)],
            SimpleValue::Byte(v) => vec![u64::from(*v)],
            SimpleValue::Symbol(c) => vec![u64::from(u32::from(*c))],
            SimpleValue::Enum(case) => vec![u64::from(*case)],
            SimpleValue::Reference(address) => vec![address.get()],
            SimpleValue::Aggregate(words) => words.clone(),
        }
    }

    /// Reads a value of `ty` back from its words.
    pub fn from_words(ty: &Type, words: &[u64]) -> Result<Self, LayoutError> {
        let ty = ty.unboxed();
        if let Type::ValueType { .. } = ty {
            return Ok(SimpleValue::Aggregate(words.to_vec()));
        }
        let [word] = words else {
            return Err(LayoutError::WidthMismatch {
                ty: ty.display(),
                expected: 1,
                actual: words.len(),
            });
        };
        let word = *word;
        let invalid = || LayoutError::InvalidPayload {
            ty: ty.display(),
            word,
        };
        match ty {
            Type::Int => Ok(SimpleValue::Int(word as i64)),
            Type::Real => Ok(SimpleValue::Real(f64::from_bits(word))),
            Type::Bool => match word {
                0 => Ok(SimpleValue::Bool(false)),
                1 => Ok(SimpleValue::Bool(true)),
                _ => Err(invalid()),
            },
            Type::Byte => u8::try_from(word).map(SimpleValue::Byte).map_err(|_| invalid()),
            Type::Symbol => u32::try_from(word)
                .ok()
                .and_then(char::from_u32)
                .map(SimpleValue::Symbol)
                .ok_or_else(invalid),
            Type::Enum(_) => u32::try_from(word).map(SimpleValue::Enum).map_err(|_| invalid()),
            Type::Class { .. } | Type::TypeAsValue(_) => {
                NonZeroU64::new(word).map(SimpleValue::Reference).ok_or_else(invalid)
            }
            other => Err(LayoutError::UnsupportedType { ty: other.display() }),
        }
    }
}

/// Contents of a box: the meta address (0 for "no value") and the value
/// words, inline or behind a separate allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxImage {
    pub meta: u64,
    pub words: [u64; BOX_VALUE_WORDS],
    pub out_of_line: Option<Vec<u64>>,
}

impl BoxImage {
    pub fn empty() -> Self {
        Self {
            meta: 0,
            words: [0; BOX_VALUE_WORDS],
            out_of_line: None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.meta != 0
    }
}

pub fn encode_box(meta: NonZeroU64, value: &SimpleValue) -> BoxImage {
    let words = value.to_words();
    let mut image = BoxImage {
        meta: meta.get(),
        ..BoxImage::empty()
    };
    if words.len() > BOX_VALUE_WORDS {
        image.out_of_line = Some(words);
    } else {
        image.words[..words.len()].copy_from_slice(&words);
    }
    image
}

/// `None` for a box holding no value. `width` is `words_of` the value type.
pub fn decode_box(
    image: &BoxImage,
    ty: &Type,
    width: usize,
) -> Result<Option<SimpleValue>, LayoutError> {
    if !image.has_value() {
        return Ok(None);
    }
    let words = match &image.out_of_line {
        Some(words) => words.as_slice(),
        None if width <= BOX_VALUE_WORDS => &image.words[..width],
        None => {
            return Err(LayoutError::WidthMismatch {
                ty: ty.display(),
                expected: width,
                actual: BOX_VALUE_WORDS,
            });
        }
    };
    SimpleValue::from_words(ty, words).map(Some)
}

/// A simple optional as stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionalImage {
    /// The payload word itself; absence is the niche.
    Niche(u64),
    Flagged { present: bool, words: Vec<u64> },
}

/// Niche layouts hold exactly one payload word; flagged ones hold `width`.
pub fn encode_optional(
    layout: OptionalLayout,
    value: Option<&SimpleValue>,
    width: usize,
) -> Result<OptionalImage, LayoutError> {
    let payload = value.map(SimpleValue::to_words);
    let image = match (layout, payload) {
        (OptionalLayout::NullPointer, None) => OptionalImage::Niche(0),
        (OptionalLayout::Sentinel(sentinel), None) => OptionalImage::Niche(sentinel as u64),
        (OptionalLayout::NullPointer | OptionalLayout::Sentinel(_), Some(words)) => {
            match words.as_slice() {
                [word] => OptionalImage::Niche(*word),
                _ => {
                    return Err(LayoutError::WidthMismatch {
                        ty: format!("{layout:?} optional payload"),
                        expected: 1,
                        actual: words.len(),
                    });
                }
            }
        }
        (OptionalLayout::Flagged, None) => OptionalImage::Flagged {
            present: false,
            words: vec![0; width],
        },
        (OptionalLayout::Flagged, Some(words)) if words.len() != width => {
            return Err(LayoutError::WidthMismatch {
                ty: "flagged optional payload".into(),
                expected: width,
                actual: words.len(),
            });
        }
        (OptionalLayout::Flagged, Some(words)) => OptionalImage::Flagged {
            present: true,
            words,
        },
    };
    Ok(image)
}

pub fn decode_optional(
    image: &OptionalImage,
    ty: &Type,
    layout: OptionalLayout,
) -> Result<Option<SimpleValue>, LayoutError> {
    match (image, layout) {
        (OptionalImage::Niche(0), OptionalLayout::NullPointer) => Ok(None),
        (OptionalImage::Niche(word), OptionalLayout::Sentinel(sentinel))
            if *word == sentinel as u64 =>
        {
            Ok(None)
        }
        (OptionalImage::Niche(word), OptionalLayout::NullPointer | OptionalLayout::Sentinel(_)) => {
            SimpleValue::from_words(ty, &[*word]).map(Some)
        }
        (OptionalImage::Flagged { present: false, .. }, OptionalLayout::Flagged) => Ok(None),
        (OptionalImage::Flagged { words, .. }, OptionalLayout::Flagged) => {
            SimpleValue::from_words(ty, words).map(Some)
        }
        _ => Err(LayoutError::UnsupportedType {
            ty: format!("?{}", ty.display()),
        }),
    }
}
