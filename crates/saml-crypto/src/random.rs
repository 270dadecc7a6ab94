//! Random protocol identifiers.
//!
//! Request, response and assertion IDs, session indexes and transient
//! NameIDs all come from the thread-local CSPRNG.

use rand::distr::{Alphanumeric, SampleString};

const ID_CHARS: usize = 32;

/// A fresh `xs:ID`: an underscore (IDs may not start with a digit) and 32
/// alphanumerics, about 190 bits of entropy.
#[must_use]
pub fn generate_id() -> String {
    let mut id = String::with_capacity(ID_CHARS + 1);
    id.push('_');
    Alphanumeric.append_string(&mut rand::rng(), &mut id, ID_CHARS);
    id
}
