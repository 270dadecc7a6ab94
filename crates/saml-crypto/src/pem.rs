//! Minimal PEM armour decoding.
//!
//! Key and certificate files are read by the caller; this module only turns
//! the already-loaded text into DER.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::signature::SignatureError;

/// A decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    /// The label between `BEGIN` and the trailing dashes, e.g. `CERTIFICATE`.
    pub label: String,
    /// The decoded DER contents.
    pub der: Vec<u8>,
}

/// Decodes every PEM block found in `text`, in order of appearance.
///
/// # Errors
///
/// Returns an error if a block is unterminated, has mismatched labels or
/// carries invalid base64, or if no block is present at all.
pub fn parse_blocks(text: &str) -> Result<Vec<PemBlock>, SignatureError> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some(label) = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        else {
            continue;
        };

        let end_marker = format!("-----END {label}-----");
        let mut body = String::new();
        let mut terminated = false;
        for inner in lines.by_ref() {
            if inner == end_marker {
                terminated = true;
                break;
            }
            if inner.starts_with("-----") {
                return Err(SignatureError::InvalidPem(format!(
                    "mismatched end marker for {label}"
                )));
            }
            // Encapsulated headers (RFC 1421) are not supported.
            if inner.contains(':') {
                return Err(SignatureError::InvalidPem(format!(
                    "encrypted or annotated {label} blocks are not supported"
                )));
            }
            body.push_str(inner);
        }
        if !terminated {
            return Err(SignatureError::InvalidPem(format!("unterminated {label} block")));
        }

        let der = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| SignatureError::InvalidPem(format!("{label}: {e}")))?;
        blocks.push(PemBlock {
            label: label.to_string(),
            der,
        });
    }

    if blocks.is_empty() {
        return Err(SignatureError::InvalidPem("no PEM block found".into()));
    }
    Ok(blocks)
}

/// Decodes the first block whose label is one of `labels`.
///
/// # Errors
///
/// Returns an error if the text is not valid PEM or holds no matching block.
pub fn decode_first(text: &str, labels: &[&str]) -> Result<PemBlock, SignatureError> {
    parse_blocks(text)?
        .into_iter()
        .find(|block| labels.contains(&block.label.as_str()))
        .ok_or_else(|| {
            SignatureError::InvalidPem(format!("no block labelled {}", labels.join(" or ")))
        })
}
