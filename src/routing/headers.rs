//! Request header extraction and response header writing.
//!
//! # Responsibilities
//! - `HeaderPattern`: pull a fixed list of request headers into capture slots
//! - `ResponseHeaderWriter`: hand the handler one scratch value per declared
//!   response header, then write the filled scratch values into the response
//!
//! # Design Decisions
//! - Header names are validated once, at compile time
//! - Multi-valued request headers are joined with `\n` in arrival order
//! - Scratch values are owned by the call, the writer itself stays immutable

use std::collections::BTreeMap;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::Serialize;

use crate::routing::error::PatternError;

/// Compiled request-header extractor.
#[derive(Debug, Clone)]
pub struct HeaderPattern {
    id: u32,
    names: Vec<HeaderName>,
}

impl HeaderPattern {
    pub fn compile<S: AsRef<str>>(names: &[S]) -> Result<Self, PatternError> {
        Self::compile_with_id(0, names)
    }

    pub(crate) fn compile_with_id<S: AsRef<str>>(id: u32, names: &[S]) -> Result<Self, PatternError> {
        if names.is_empty() {
            return Err(PatternError::EmptyParameters);
        }

        let names = names
            .iter()
            .enumerate()
            .map(|(index, name)| parse_header_name(index, name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { id, names })
    }

    /// Fill `captures[offset..offset + slot_count()]` from `headers`.
    ///
    /// # Panics
    /// If `captures` is shorter than `offset + slot_count()`.
    pub fn matches(&self, headers: &HeaderMap, captures: &mut [Option<String>], offset: usize) -> usize {
        for (index, name) in self.names.iter().enumerate() {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();

            captures[offset + index] = if values.is_empty() {
                None
            } else {
                Some(values.join("\n"))
            };
        }
        self.names.len()
    }

    pub fn slot_count(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

fn parse_header_name(index: usize, name: &str) -> Result<HeaderName, PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyParameter { index });
    }
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| PatternError::InvalidHeaderName {
        index,
        name: name.to_string(),
    })
}

/// Declared container type of one response header slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScratchKind {
    /// Single text value, written with `insert`.
    Text,
    /// Multiple values, each written with `append`.
    List,
    /// Structured value spread over several headers. `fields` are the header
    /// names, in write order.
    Record { fields: Vec<String> },
}

/// One declared response header slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSlot {
    /// Header name. Empty for a `Record` slot.
    pub name: String,
    pub kind: ScratchKind,
}

impl ResponseSlot {
    pub fn text(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ScratchKind::Text }
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ScratchKind::List }
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            kind: ScratchKind::Record {
                fields: fields.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Mutable per-call value for one response header slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scratch {
    Text(String),
    List(Vec<String>),
    /// Header name to value. `None` is written as `null`.
    Record(BTreeMap<String, Option<String>>),
}

impl Scratch {
    /// Append text to a `Text` scratch. Ignored for other kinds.
    pub fn push_str(&mut self, text: &str) {
        if let Scratch::Text(buf) = self {
            buf.push_str(text);
        }
    }

    /// Add one value to a `List` scratch. Ignored for other kinds.
    pub fn push(&mut self, value: impl Into<String>) {
        if let Scratch::List(values) = self {
            values.push(value.into());
        }
    }

    /// Set one field of a `Record` scratch. Unknown fields are ignored.
    pub fn set_field(&mut self, field: &str, value: Option<String>) {
        if let Scratch::Record(fields) = self {
            if let Some(slot) = fields.get_mut(field) {
                *slot = value;
            }
        }
    }

    /// Fill a `Record` scratch from a serializable value.
    ///
    /// Top-level keys of the serialized object are matched against the
    /// declared header names. Strings are written verbatim, `null` stays
    /// empty and anything else is written as its JSON text.
    pub fn fill_from<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let Scratch::Record(fields) = self else {
            return Ok(());
        };

        if let serde_json::Value::Object(object) = serde_json::to_value(value)? {
            for (key, slot) in fields.iter_mut() {
                if let Some(v) = object.get(key) {
                    *slot = match v {
                        serde_json::Value::Null => None,
                        serde_json::Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    };
                }
            }
        }
        Ok(())
    }
}

/// Compiled response header setter.
#[derive(Debug, Clone)]
pub struct ResponseHeaderWriter {
    id: u32,
    slots: Vec<ResponseSlot>,
    // Validated header names per slot: one for text and list slots, one per
    // field for the structured slot.
    names: Vec<Vec<HeaderName>>,
}

impl ResponseHeaderWriter {
    pub fn compile(slots: &[ResponseSlot]) -> Result<Self, PatternError> {
        Self::compile_with_id(0, slots)
    }

    pub(crate) fn compile_with_id(id: u32, slots: &[ResponseSlot]) -> Result<Self, PatternError> {
        if slots.is_empty() {
            return Err(PatternError::EmptyParameters);
        }

        let mut seen_record = false;
        let mut names = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            match &slot.kind {
                ScratchKind::Record { fields } => {
                    if !slot.name.is_empty() {
                        return Err(invalid_slot(index, "structured slot must have an empty name"));
                    }
                    if seen_record {
                        return Err(invalid_slot(index, "only one structured slot is allowed"));
                    }
                    if fields.is_empty() {
                        return Err(invalid_slot(index, "structured slot declares no header fields"));
                    }
                    names.push(
                        fields
                            .iter()
                            .map(|field| parse_header_name(index, field))
                            .collect::<Result<Vec<_>, _>>()?,
                    );
                    seen_record = true;
                }
                ScratchKind::Text | ScratchKind::List => {
                    names.push(vec![parse_header_name(index, &slot.name)?]);
                }
            }
        }

        Ok(Self {
            id,
            slots: slots.to_vec(),
            names,
        })
    }

    /// Fresh scratch values, one per slot.
    pub fn prepare(&self) -> Vec<Scratch> {
        self.slots
            .iter()
            .map(|slot| match &slot.kind {
                ScratchKind::Text => Scratch::Text(String::new()),
                ScratchKind::List => Scratch::List(Vec::new()),
                ScratchKind::Record { fields } => {
                    Scratch::Record(fields.iter().map(|f| (f.clone(), None)).collect())
                }
            })
            .collect()
    }

    /// Write `scratch` into `headers`.
    ///
    /// Empty text and empty lists are skipped. Every declared field of a
    /// structured slot is written, unset fields as `null`.
    pub fn commit(&self, headers: &mut HeaderMap, scratch: &[Scratch]) -> Result<(), InvalidHeaderValue> {
        for ((slot, names), value) in self.slots.iter().zip(&self.names).zip(scratch) {
            match (&slot.kind, value) {
                (ScratchKind::Text, Scratch::Text(text)) if !text.is_empty() => {
                    headers.insert(names[0].clone(), HeaderValue::from_str(text)?);
                }
                (ScratchKind::List, Scratch::List(values)) => {
                    for v in values {
                        headers.append(names[0].clone(), HeaderValue::from_str(v)?);
                    }
                }
                (ScratchKind::Record { fields }, Scratch::Record(values)) => {
                    for (field, name) in fields.iter().zip(names) {
                        let text = values.get(field).cloned().flatten();
                        headers.insert(
                            name.clone(),
                            HeaderValue::from_str(text.as_deref().unwrap_or("null"))?,
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn slots(&self) -> &[ResponseSlot] {
        &self.slots
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

fn invalid_slot(index: usize, reason: &str) -> PatternError {
    PatternError::InvalidResponseSlot {
        index,
        reason: reason.to_string(),
    }
}
