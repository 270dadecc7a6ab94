//! XML plumbing shared by the codec, the signer and the metadata model.
//!
//! Reading goes through `roxmltree` (no DTD support, so entity expansion
//! attacks are refused by the parser); writing goes through `quick-xml`.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};

use crate::error::{SamlError, SamlResult};

/// Parses `xml`, mapping any well-formedness failure to `MalformedMessage`.
pub(crate) fn parse_document(xml: &str) -> SamlResult<Document<'_>> {
    Ok(Document::parse(xml)?)
}

/// Drops sub-second precision; builders use it so issued messages carry
/// whole-second instants.
#[must_use]
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}

/// Formats an instant as an `xs:dateTime` in UTC. Fractional seconds are
/// written only when present, with as many digits as they need.
pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an `xs:dateTime`, accepting fractional seconds and offsets.
pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {value:?}: {e}"))
}

/// Returns true if `node` is the element `{ns}local`.
pub(crate) fn is_element(node: Node<'_, '_>, ns: &str, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(ns)
}

/// Returns the child elements named `{ns}local`.
pub(crate) fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: &'a str,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| is_element(*c, ns, local))
}

/// Returns the first child element named `{ns}local`.
pub(crate) fn child_element<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: &'a str,
    local: &'a str,
) -> Option<Node<'a, 'input>> {
    child_elements(node, ns, local).next()
}

/// Returns the concatenated, trimmed text content of an element.
pub(crate) fn element_text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Finds the element whose `ID` attribute equals `id`.
pub(crate) fn find_by_id<'a, 'input>(
    doc: &'a Document<'input>,
    id: &str,
) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.attribute("ID") == Some(id))
}

/// Rejects documents in which two elements share an `ID` value.
pub(crate) fn ensure_unique_ids(doc: &Document<'_>) -> SamlResult<()> {
    let mut seen = HashSet::new();
    for id in doc
        .descendants()
        .filter(Node::is_element)
        .filter_map(|n| n.attribute("ID"))
    {
        if !seen.insert(id) {
            return Err(SamlError::MalformedMessage(format!("duplicate ID {id:?}")));
        }
    }
    Ok(())
}

/// Thin wrapper over `quick_xml::Writer` with the few shapes SAML needs.
pub(crate) struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    pub(crate) fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> SamlResult<()> {
        self.write(Event::Start(Self::element(name, attrs)))
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> SamlResult<()> {
        self.write(Event::Empty(Self::element(name, attrs)))
    }

    pub(crate) fn end(&mut self, name: &str) -> SamlResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    pub(crate) fn text(&mut self, text: &str) -> SamlResult<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    pub(crate) fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> SamlResult<()> {
        self.start(name, attrs)?;
        self.text(text)?;
        self.end(name)
    }

    pub(crate) fn finish(self) -> SamlResult<String> {
        String::from_utf8(self.inner.into_inner())
            .map_err(|e| SamlError::Internal(format!("writer produced invalid UTF-8: {e}")))
    }

    fn element<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut element = BytesStart::new(name);
        for &(key, value) in attrs {
            element.push_attribute((key, value));
        }
        element
    }

    fn write(&mut self, event: Event<'_>) -> SamlResult<()> {
        self.inner
            .write_event(event)
            .map_err(|e| SamlError::Internal(format!("XML writer: {e}")))
    }
}
