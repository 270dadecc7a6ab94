//! Exclusive XML canonicalization (`xml-exc-c14n#`) over a parsed subtree.
//!
//! Output rules:
//! - elements are always written as start/end tag pairs
//! - a namespace declaration is emitted on the element that first
//!   visibly uses its prefix within the subtree, and only there
//! - namespace declarations sort by prefix (default first), attributes by
//!   namespace URI then local name
//! - comments are dropped unless the `WithComments` variant is chosen
//! - one excluded node (the enveloped `Signature`) may be skipped

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Node, NodeId, NodeType};

use super::CanonicalizationAlgorithm;
use crate::error::{SamlError, SamlResult};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalizes the element `node` and everything below it.
///
/// `exclude` names a descendant to leave out, as the enveloped-signature
/// transform requires.
///
/// # Errors
///
/// Returns `MalformedMessage` if `node` is not an element or uses a prefix
/// that is not in scope.
pub fn canonicalize(
    node: Node<'_, '_>,
    exclude: Option<NodeId>,
    algorithm: CanonicalizationAlgorithm,
) -> SamlResult<String> {
    if !node.is_element() {
        return Err(SamlError::MalformedMessage(
            "only elements can be canonicalized".into(),
        ));
    }
    let mut out = String::new();
    let ctx = Context {
        exclude,
        with_comments: algorithm.with_comments(),
    };
    ctx.write_element(node, &BTreeMap::new(), &mut out)?;
    Ok(out)
}

struct Context {
    exclude: Option<NodeId>,
    with_comments: bool,
}

impl Context {
    fn write_element(
        &self,
        node: Node<'_, '_>,
        rendered: &BTreeMap<String, String>,
        out: &mut String,
    ) -> SamlResult<()> {
        let qname = element_qname(node);
        let prefix = qname.split_once(':').map_or("", |(p, _)| p);

        let mut utilized = BTreeSet::from([prefix.to_string()]);
        let mut attrs = Vec::new();
        for attr in node.attributes() {
            let (ns, qualified) = match attr.namespace() {
                None => ("", attr.name().to_string()),
                Some(XML_NS) => (XML_NS, format!("xml:{}", attr.name())),
                Some(uri) => {
                    let qualified = &node.document().input_text()[attr.range_qname()];
                    let attr_prefix = qualified.split_once(':').map(|(p, _)| p).ok_or_else(
                        || SamlError::MalformedMessage(format!("unprefixed attribute in {uri}")),
                    )?;
                    utilized.insert(attr_prefix.to_string());
                    (uri, qualified.to_string())
                }
            };
            attrs.push((ns, attr.name(), qualified, attr.value()));
        }
        attrs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut scope = rendered.clone();
        let mut declarations = Vec::new();
        for p in utilized {
            let uri = if p.is_empty() {
                node.lookup_namespace_uri(None).unwrap_or("")
            } else {
                node.lookup_namespace_uri(Some(&p)).ok_or_else(|| {
                    SamlError::MalformedMessage(format!("prefix {p:?} is not declared"))
                })?
            };
            let current = scope.get(&p).map_or("", String::as_str);
            let needs_declaration = if p.is_empty() {
                uri != current
            } else {
                !scope.contains_key(&p) || uri != current
            };
            if needs_declaration {
                declarations.push((p.clone(), uri.to_string()));
                scope.insert(p, uri.to_string());
            }
        }

        out.push('<');
        out.push_str(qname);
        for (p, uri) in &declarations {
            if p.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(p);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }
        for (_, _, qualified, value) in &attrs {
            out.push(' ');
            out.push_str(qualified);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for child in node.children() {
            if Some(child.id()) == self.exclude {
                continue;
            }
            match child.node_type() {
                NodeType::Element => self.write_element(child, &scope, out)?,
                NodeType::Text => escape_text(child.text().unwrap_or_default(), out),
                NodeType::Comment if self.with_comments => {
                    out.push_str("<!--");
                    out.push_str(child.text().unwrap_or_default());
                    out.push_str("-->");
                }
                NodeType::PI => {
                    if let Some(pi) = child.pi() {
                        out.push_str("<?");
                        out.push_str(pi.target);
                        if let Some(value) = pi.value {
                            out.push(' ');
                            out.push_str(value);
                        }
                        out.push_str("?>");
                    }
                }
                _ => {}
            }
        }

        out.push_str("</");
        out.push_str(qname);
        out.push('>');
        Ok(())
    }
}

/// Returns the element's qualified name exactly as written in the source.
fn element_qname<'input>(node: Node<'_, 'input>) -> &'input str {
    let input = node.document().input_text();
    let rest = &input[node.range().start + 1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn c14n(xml: &str) -> String {
        let doc = Document::parse(xml).unwrap();
        canonicalize(doc.root_element(), None, CanonicalizationAlgorithm::ExclusiveC14n).unwrap()
    }

    #[test]
    fn sorts_attributes_and_drops_unused_namespaces() {
        let xml = r#"<root xmlns="urn:a" xmlns:b="urn:b" xmlns:unused="urn:u"><b:child  z="1" a="2" b:attr="x">text &amp; &gt; more</b:child><empty/><!-- c --></root>"#;
        assert_eq!(
            c14n(xml),
            r#"<root xmlns="urn:a"><b:child xmlns:b="urn:b" a="2" z="1" b:attr="x">text &amp; &gt; more</b:child><empty></empty></root>"#
        );
    }

    #[test]
    fn subtree_pulls_in_only_what_it_uses() {
        let xml = r#"<p:outer xmlns:p="urn:p" xmlns:q="urn:q"><p:inner q:flag="1"><p:leaf/></p:inner></p:outer>"#;
        let doc = Document::parse(xml).unwrap();
        let inner = doc.root_element().first_element_child().unwrap();
        let out = canonicalize(inner, None, CanonicalizationAlgorithm::ExclusiveC14n).unwrap();
        assert_eq!(
            out,
            r#"<p:inner xmlns:p="urn:p" xmlns:q="urn:q" q:flag="1"><p:leaf></p:leaf></p:inner>"#
        );
    }

    #[test]
    fn undeclares_default_namespace_when_needed() {
        assert_eq!(
            c14n(r#"<a xmlns="urn:x"><b xmlns=""/></a>"#),
            r#"<a xmlns="urn:x"><b xmlns=""></b></a>"#
        );
        assert_eq!(c14n(r#"<b xmlns=""/>"#), "<b></b>");
    }

    #[test]
    fn redeclared_prefix_is_emitted_again() {
        assert_eq!(
            c14n(r#"<p:a xmlns:p="urn:1"><p:b xmlns:p="urn:2"/></p:a>"#),
            r#"<p:a xmlns:p="urn:1"><p:b xmlns:p="urn:2"></p:b></p:a>"#
        );
    }

    #[test]
    fn escapes_attribute_values() {
        assert_eq!(
            c14n(r#"<a v="&quot;&lt;&amp;&gt;&#9;"/>"#),
            "<a v=\"&quot;&lt;&amp;>&#x9;\"></a>"
        );
    }

    #[test]
    fn comments_kept_only_with_comments_variant() {
        let doc = Document::parse("<a><!--x-->y</a>").unwrap();
        let root = doc.root_element();
        assert_eq!(
            canonicalize(root, None, CanonicalizationAlgorithm::ExclusiveC14n).unwrap(),
            "<a>y</a>"
        );
        assert_eq!(
            canonicalize(root, None, CanonicalizationAlgorithm::ExclusiveC14nWithComments)
                .unwrap(),
            "<a><!--x-->y</a>"
        );
    }

    #[test]
    fn excluded_node_is_skipped() {
        let doc = Document::parse("<a><sig>s</sig><b/></a>").unwrap();
        let root = doc.root_element();
        let sig = root.first_element_child().unwrap();
        assert_eq!(
            canonicalize(root, Some(sig.id()), CanonicalizationAlgorithm::ExclusiveC14n).unwrap(),
            "<a><b></b></a>"
        );
    }

    #[test]
    fn whitespace_between_elements_is_preserved() {
        assert_eq!(c14n("<a>\n  <b/>\n</a>"), "<a>\n  <b></b>\n</a>");
    }
}
